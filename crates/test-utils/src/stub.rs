//! Stub tile source backed by a local wiremock server.
//!
//! Serves a deterministic payload ([`tile_payload`]) for every
//! `/{z}/{x}/{y}.png` request unless a more specific mock overrides it.

use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use crate::fixtures::tile_payload;

/// Priority used for per-tile overrides (lower wins; wiremock defaults to 5).
const OVERRIDE_PRIORITY: u8 = 1;

/// A local HTTP server answering tile and HGT requests.
pub struct StubTileServer {
    server: MockServer,
}

impl StubTileServer {
    /// Start a server with no routes mounted.
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Start a server that answers every tile request with [`tile_payload`].
    pub async fn with_all_tiles() -> Self {
        let stub = Self::start().await;
        stub.serve_all_tiles().await;
        stub
    }

    /// Base URL of the server, e.g. `http://127.0.0.1:41234`.
    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// URL template for raster tiles served by this stub.
    pub fn tile_template(&self) -> String {
        format!("{}/{{z}}/{{x}}/{{y}}.png", self.server.uri())
    }

    /// URL template for HGT archives served by this stub.
    pub fn hgt_template(&self) -> String {
        format!("{}/skadi/{{band}}/{{cell}}.hgt.gz", self.server.uri())
    }

    /// Answer `/{z}/{x}/{y}.png` with the tile's deterministic payload.
    pub async fn serve_all_tiles(&self) {
        Mock::given(method("GET"))
            .and(path_regex(r"^/\d+/\d+/\d+\.png$"))
            .respond_with(|request: &Request| match parse_tile_path(request.url.path()) {
                Some((z, x, y)) => ResponseTemplate::new(200).set_body_bytes(tile_payload(z, x, y)),
                None => ResponseTemplate::new(400),
            })
            .mount(&self.server)
            .await;
    }

    /// Make one tile answer with a fixed status and empty body.
    pub async fn tile_status(&self, z: u8, x: u32, y: u32, status: u16) {
        Mock::given(method("GET"))
            .and(path(format!("/{z}/{x}/{y}.png")))
            .respond_with(ResponseTemplate::new(status))
            .with_priority(OVERRIDE_PRIORITY)
            .mount(&self.server)
            .await;
    }

    /// Make one tile answer 404 ("no data here").
    pub async fn missing_tile(&self, z: u8, x: u32, y: u32) {
        self.tile_status(z, x, y, 404).await;
    }

    /// Serve an HGT archive for a cell under `/skadi/{band}/{cell}.hgt.gz`.
    pub async fn serve_hgt(&self, band: &str, cell: &str, body: Vec<u8>) {
        Mock::given(method("GET"))
            .and(path(format!("/skadi/{band}/{cell}.hgt.gz")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
            .with_priority(OVERRIDE_PRIORITY)
            .mount(&self.server)
            .await;
    }

    /// Answer every HGT request not otherwise mounted with 404.
    pub async fn missing_hgt_by_default(&self) {
        Mock::given(method("GET"))
            .and(path_regex(r"^/skadi/.*\.hgt\.gz$"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&self.server)
            .await;
    }

    /// Number of requests the server has received so far.
    pub async fn request_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|requests| requests.len())
            .unwrap_or(0)
    }

    /// Number of requests received for one path.
    pub async fn requests_for(&self, request_path: &str) -> usize {
        self.server
            .received_requests()
            .await
            .map(|requests| {
                requests
                    .iter()
                    .filter(|r| r.url.path() == request_path)
                    .count()
            })
            .unwrap_or(0)
    }
}

/// Parse `/{z}/{x}/{y}.png`.
fn parse_tile_path(request_path: &str) -> Option<(u8, u32, u32)> {
    let mut parts = request_path.trim_start_matches('/').split('/');
    let z = parts.next()?.parse().ok()?;
    let x = parts.next()?.parse().ok()?;
    let y = parts.next()?.strip_suffix(".png")?.parse().ok()?;
    Some((z, x, y))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tile_path() {
        assert_eq!(parse_tile_path("/8/131/76.png"), Some((8, 131, 76)));
        assert_eq!(parse_tile_path("/8/131.png"), None);
        assert_eq!(parse_tile_path("/a/b/c.png"), None);
    }
}
