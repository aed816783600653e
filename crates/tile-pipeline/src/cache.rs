//! Advisory on-disk cache of fetched source bytes.
//!
//! Only saves network round-trips. Whether a key is already done is decided
//! by the sink, never by the cache.

use std::io;
use std::path::PathBuf;

use bytes::Bytes;
use tokio::fs;
use tracing::warn;

use crate::key::WorkKey;

#[derive(Debug, Clone)]
pub struct SourceCache {
    root: PathBuf,
}

impl SourceCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for<K: WorkKey>(&self, key: &K) -> PathBuf {
        self.root.join(key.cache_path())
    }

    /// Cached bytes for `key`, if any. Unreadable entries count as misses.
    pub async fn read<K: WorkKey>(&self, key: &K) -> Option<Bytes> {
        let path = self.path_for(key);
        match fs::read(&path).await {
            Ok(data) => Some(Bytes::from(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable cache entry");
                None
            }
        }
    }

    /// Store bytes for `key` via a temp file and rename.
    pub async fn write<K: WorkKey>(&self, key: &K, data: &[u8]) -> io::Result<()> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut temp = path.clone().into_os_string();
        temp.push(".partial");
        let temp = PathBuf::from(temp);

        fs::write(&temp, data).await?;
        fs::rename(&temp, &path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tile_common::TileCoord;

    #[tokio::test]
    async fn test_cache_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SourceCache::new(dir.path());
        let tile = TileCoord::new(3, 4, 2);

        assert!(cache.read(&tile).await.is_none());
        cache.write(&tile, b"payload").await.unwrap();
        assert_eq!(cache.read(&tile).await.unwrap(), Bytes::from_static(b"payload"));
        assert!(dir.path().join("3/4/2").exists());
        assert!(!dir.path().join("3/4/2.partial").exists());
    }

    #[test]
    fn test_cell_archives_are_grouped_by_band() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SourceCache::new(dir.path());
        let cell = tile_common::DemCell::new(57, 4).unwrap();

        tokio_test::block_on(cache.write(&cell, b"hgt")).unwrap();
        assert!(dir.path().join("N57/N57E004.hgt.gz").exists());
        assert_eq!(
            tokio_test::block_on(cache.read(&cell)),
            Some(Bytes::from_static(b"hgt"))
        );
    }
}
