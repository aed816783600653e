//! MBTiles tile store on SQLite.
//!
//! Tiles are buffered and committed in batches, one transaction per batch,
//! with `INSERT OR IGNORE` so a re-delivered tile never duplicates a row.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tile_common::{BoundingBox, TileCoord, ZoomRange};
use tracing::{debug, info};

use super::{Sink, SinkReport};
use crate::error::PipelineResult;
use crate::existing::ExistingSet;
use crate::worker::{Outcome, TileRecord};

pub const DEFAULT_BATCH_SIZE: usize = 250;

/// Values for the MBTiles `metadata` table.
#[derive(Debug, Clone)]
pub struct MbtilesMetadata {
    pub name: String,
    pub description: String,
    pub attribution: String,
    /// Tile format, e.g. `png` or `webp`.
    pub format: String,
    pub bounds: BoundingBox,
    pub zooms: ZoomRange,
}

impl MbtilesMetadata {
    /// `(name, value)` rows in the order they are written.
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        let (lon, lat) = self.bounds.center();
        vec![
            ("name", self.name.clone()),
            ("format", self.format.clone()),
            ("bounds", self.bounds.to_mbtiles_bounds()),
            ("center", format!("{lon:.6},{lat:.6},{}", self.zooms.min)),
            ("minzoom", self.zooms.min.to_string()),
            ("maxzoom", self.zooms.max.to_string()),
            ("attribution", self.attribution.clone()),
            ("type", "baselayer".to_string()),
            ("version", "1.0".to_string()),
            ("description", self.description.clone()),
        ]
    }
}

/// A row of the `tiles` table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct StoredTile {
    pub zoom: u8,
    pub column: u32,
    pub row: u32,
    pub data: Vec<u8>,
}

pub struct MbtilesSink {
    pool: SqlitePool,
    path: Option<PathBuf>,
    batch_size: usize,
    buffer: Vec<TileRecord>,
    written: u64,
}

impl MbtilesSink {
    /// Open or create the store at `path` and write its metadata.
    pub async fn open(
        path: &Path,
        metadata: &MbtilesMetadata,
        batch_size: usize,
    ) -> PipelineResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        // Single writer: the coordinator.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let sink = Self::init(pool, Some(path.to_path_buf()), metadata, batch_size).await?;
        info!(path = %path.display(), batch_size = sink.batch_size, "Opened MBTiles store");
        Ok(sink)
    }

    /// In-memory store (for testing).
    pub async fn open_memory(metadata: &MbtilesMetadata, batch_size: usize) -> PipelineResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::init(pool, None, metadata, batch_size).await
    }

    async fn init(
        pool: SqlitePool,
        path: Option<PathBuf>,
        metadata: &MbtilesMetadata,
        batch_size: usize,
    ) -> PipelineResult<Self> {
        sqlx::query("CREATE TABLE IF NOT EXISTS metadata (name TEXT PRIMARY KEY, value TEXT)")
            .execute(&pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tiles (
                zoom_level INTEGER NOT NULL,
                tile_column INTEGER NOT NULL,
                tile_row INTEGER NOT NULL,
                tile_data BLOB,
                PRIMARY KEY (zoom_level, tile_column, tile_row)
            )
            "#,
        )
        .execute(&pool)
        .await?;

        Self::write_metadata(&pool, metadata).await?;

        Ok(Self {
            pool,
            path,
            batch_size: batch_size.max(1),
            buffer: Vec::with_capacity(batch_size.max(1)),
            written: 0,
        })
    }

    /// Write metadata rows that are missing or differ. A reopened store with
    /// unchanged metadata is not written to at all.
    async fn write_metadata(pool: &SqlitePool, metadata: &MbtilesMetadata) -> PipelineResult<()> {
        let rows: Vec<(String, Option<String>)> = sqlx::query_as("SELECT name, value FROM metadata")
            .fetch_all(pool)
            .await?;
        let current: HashMap<String, Option<String>> = rows.into_iter().collect();

        let changed: Vec<(&'static str, String)> = metadata
            .entries()
            .into_iter()
            .filter(|(name, value)| {
                current.get(*name).and_then(|v| v.as_deref()) != Some(value.as_str())
            })
            .collect();

        if changed.is_empty() {
            return Ok(());
        }

        let mut tx = pool.begin().await?;
        for (name, value) in &changed {
            sqlx::query(
                "INSERT INTO metadata (name, value) VALUES (?, ?) \
                 ON CONFLICT(name) DO UPDATE SET value = excluded.value \
                 WHERE metadata.value IS NOT excluded.value",
            )
            .bind(*name)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        debug!(rows = changed.len(), "Updated MBTiles metadata");
        Ok(())
    }

    /// Commit buffered tiles in one transaction. On error the transaction is
    /// rolled back and the buffer kept.
    pub async fn flush(&mut self) -> PipelineResult<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;
        for record in &self.buffer {
            let result = sqlx::query(
                "INSERT OR IGNORE INTO tiles (zoom_level, tile_column, tile_row, tile_data) \
                 VALUES (?, ?, ?, ?)",
            )
            .bind(i64::from(record.zoom))
            .bind(i64::from(record.column))
            .bind(i64::from(record.row))
            .bind(record.data.as_ref())
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }
        tx.commit().await?;

        debug!(batch = self.buffer.len(), inserted, "Committed tile batch");
        self.written += inserted;
        self.buffer.clear();
        Ok(())
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub async fn tile_count(&self) -> PipelineResult<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tiles")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    /// Data for a tile addressed in XYZ numbering.
    pub async fn tile_data(&self, tile: &TileCoord) -> PipelineResult<Option<Vec<u8>>> {
        let row: Option<(Vec<u8>,)> = sqlx::query_as(
            "SELECT tile_data FROM tiles WHERE zoom_level = ? AND tile_column = ? AND tile_row = ?",
        )
        .bind(i64::from(tile.z))
        .bind(i64::from(tile.x))
        .bind(i64::from(tile.storage_row()))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(data,)| data))
    }

    /// Every stored tile, ordered by key.
    pub async fn tiles(&self) -> PipelineResult<Vec<StoredTile>> {
        let rows: Vec<(i64, i64, i64, Vec<u8>)> = sqlx::query_as(
            "SELECT zoom_level, tile_column, tile_row, tile_data FROM tiles \
             ORDER BY zoom_level, tile_column, tile_row",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(zoom, column, row, data)| StoredTile {
                zoom: zoom as u8,
                column: column as u32,
                row: row as u32,
                data,
            })
            .collect())
    }

    pub async fn metadata_value(&self, name: &str) -> PipelineResult<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM metadata WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(value,)| value))
    }

    pub async fn close(self) {
        self.pool.close().await;
    }

    fn location(&self) -> String {
        self.path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| ":memory:".to_string())
    }
}

#[async_trait]
impl Sink for MbtilesSink {
    type Key = TileCoord;
    type Output = TileRecord;

    async fn load_existing(&mut self, level: u8) -> PipelineResult<ExistingSet<(u32, u32)>> {
        let rows: Vec<(i64, i64)> =
            sqlx::query_as("SELECT tile_column, tile_row FROM tiles WHERE zoom_level = ?")
                .bind(i64::from(level))
                .fetch_all(&self.pool)
                .await?;

        let keys: HashSet<(u32, u32)> = rows
            .into_iter()
            .map(|(column, row)| (column as u32, row as u32))
            .collect();

        debug!(zoom = level, existing = keys.len(), "Loaded existing tiles");
        Ok(ExistingSet::new(keys))
    }

    async fn accept(&mut self, _tile: &TileCoord, outcome: Outcome<TileRecord>) -> PipelineResult<()> {
        if let Outcome::Stored(record) = outcome {
            self.buffer.push(record);
            if self.buffer.len() >= self.batch_size {
                self.flush().await?;
            }
        }
        Ok(())
    }

    async fn end_level(&mut self, _level: u8) -> PipelineResult<()> {
        self.flush().await
    }

    async fn finish(&mut self) -> PipelineResult<SinkReport> {
        self.flush().await?;
        Ok(SinkReport {
            written: self.written,
            location: self.location(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    use crate::error::PipelineError;

    fn metadata() -> MbtilesMetadata {
        MbtilesMetadata {
            name: "terrain".to_string(),
            description: "Elevation tiles".to_string(),
            attribution: "stub".to_string(),
            format: "png".to_string(),
            bounds: BoundingBox::new(4.0, 57.0, 6.0, 59.0).unwrap(),
            zooms: ZoomRange::new(8, 9).unwrap(),
        }
    }

    fn record(z: u8, x: u32, y: u32) -> TileRecord {
        TileRecord::new(&TileCoord::new(z, x, y), Bytes::from(format!("{z}/{x}/{y}")))
    }

    #[tokio::test]
    async fn test_metadata_written() {
        let sink = MbtilesSink::open_memory(&metadata(), 10).await.unwrap();
        assert_eq!(sink.metadata_value("format").await.unwrap().as_deref(), Some("png"));
        assert_eq!(sink.metadata_value("minzoom").await.unwrap().as_deref(), Some("8"));
        assert_eq!(
            sink.metadata_value("bounds").await.unwrap().as_deref(),
            Some("4.000000,57.000000,6.000000,59.000000")
        );
        assert_eq!(
            sink.metadata_value("center").await.unwrap().as_deref(),
            Some("5.000000,58.000000,8")
        );
    }

    #[tokio::test]
    async fn test_duplicate_insert_keeps_one_row() {
        let mut sink = MbtilesSink::open_memory(&metadata(), 10).await.unwrap();
        let tile = TileCoord::new(8, 131, 76);

        sink.accept(&tile, Outcome::Stored(record(8, 131, 76))).await.unwrap();
        sink.accept(&tile, Outcome::Stored(record(8, 131, 76))).await.unwrap();
        sink.end_level(8).await.unwrap();
        sink.accept(&tile, Outcome::Stored(record(8, 131, 76))).await.unwrap();
        let report = sink.finish().await.unwrap();

        assert_eq!(sink.tile_count().await.unwrap(), 1);
        assert_eq!(report.written, 1);
        assert_eq!(report.location, ":memory:");
    }

    #[tokio::test]
    async fn test_batches_commit_at_threshold() {
        let mut sink = MbtilesSink::open_memory(&metadata(), 3).await.unwrap();
        for y in 0..2 {
            let tile = TileCoord::new(4, 1, y);
            sink.accept(&tile, Outcome::Stored(record(4, 1, y))).await.unwrap();
        }
        assert_eq!(sink.tile_count().await.unwrap(), 0);

        let tile = TileCoord::new(4, 1, 2);
        sink.accept(&tile, Outcome::Stored(record(4, 1, 2))).await.unwrap();
        assert_eq!(sink.tile_count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_rows_are_flipped_and_existing_matches() {
        let mut sink = MbtilesSink::open_memory(&metadata(), 10).await.unwrap();
        let tile = TileCoord::new(8, 131, 76);
        sink.accept(&tile, Outcome::Stored(record(8, 131, 76))).await.unwrap();
        sink.end_level(8).await.unwrap();

        let tiles = sink.tiles().await.unwrap();
        assert_eq!((tiles[0].zoom, tiles[0].column, tiles[0].row), (8, 131, 179));
        assert_eq!(sink.tile_data(&tile).await.unwrap(), Some(b"8/131/76".to_vec()));

        let existing = sink.load_existing(8).await.unwrap();
        assert!(existing.contains(&(131, 179)));
        assert!(sink.load_existing(9).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_non_stored_outcomes_are_ignored() {
        let mut sink = MbtilesSink::open_memory(&metadata(), 1).await.unwrap();
        let tile = TileCoord::new(8, 131, 76);
        sink.accept(&tile, Outcome::Empty(crate::worker::EmptyReason::NotFound))
            .await
            .unwrap();
        assert_eq!(sink.finish().await.unwrap().written, 0);
    }

    #[tokio::test]
    async fn test_reopen_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/terrain.mbtiles");

        let mut sink = MbtilesSink::open(&path, &metadata(), 10).await.unwrap();
        let tile = TileCoord::new(9, 261, 151);
        sink.accept(&tile, Outcome::Stored(record(9, 261, 151))).await.unwrap();
        sink.finish().await.unwrap();
        sink.close().await;

        let reopened = MbtilesSink::open(&path, &metadata(), 10).await.unwrap();
        assert_eq!(reopened.tile_count().await.unwrap(), 1);
        assert_eq!(reopened.metadata_value("name").await.unwrap().as_deref(), Some("terrain"));
    }

    #[tokio::test]
    async fn test_reopen_with_same_metadata_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("terrain.mbtiles");

        let mut sink = MbtilesSink::open(&path, &metadata(), 10).await.unwrap();
        let tile = TileCoord::new(8, 131, 76);
        sink.accept(&tile, Outcome::Stored(record(8, 131, 76))).await.unwrap();
        sink.finish().await.unwrap();
        sink.close().await;
        let before = std::fs::read(&path).unwrap();

        let mut reopened = MbtilesSink::open(&path, &metadata(), 10).await.unwrap();
        assert!(reopened.load_existing(8).await.unwrap().contains(&(131, 179)));
        assert_eq!(reopened.finish().await.unwrap().written, 0);
        reopened.close().await;

        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[tokio::test]
    async fn test_changed_metadata_is_updated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("terrain.mbtiles");
        MbtilesSink::open(&path, &metadata(), 10).await.unwrap().close().await;

        let mut changed = metadata();
        changed.attribution = "updated".to_string();
        changed.zooms = ZoomRange::new(8, 10).unwrap();
        let sink = MbtilesSink::open(&path, &changed, 10).await.unwrap();

        assert_eq!(sink.metadata_value("attribution").await.unwrap().as_deref(), Some("updated"));
        assert_eq!(sink.metadata_value("maxzoom").await.unwrap().as_deref(), Some("10"));
        assert_eq!(sink.metadata_value("format").await.unwrap().as_deref(), Some("png"));
    }

    #[tokio::test]
    async fn test_failed_batch_is_rolled_back() {
        let mut sink = MbtilesSink::open_memory(&metadata(), 3).await.unwrap();
        sqlx::query(
            "CREATE TRIGGER reject_zoom_5 BEFORE INSERT ON tiles WHEN NEW.zoom_level = 5 \
             BEGIN SELECT RAISE(ABORT, 'rejected'); END",
        )
        .execute(&sink.pool)
        .await
        .unwrap();

        // The third tile fills the batch; its insert fails after two succeeded.
        for tile in [TileCoord::new(4, 1, 0), TileCoord::new(4, 1, 1)] {
            sink.accept(&tile, Outcome::Stored(record(tile.z, tile.x, tile.y)))
                .await
                .unwrap();
        }
        let bad = TileCoord::new(5, 2, 2);
        let result = sink.accept(&bad, Outcome::Stored(record(5, 2, 2))).await;

        assert!(matches!(result, Err(PipelineError::Database(_))));
        assert_eq!(sink.tile_count().await.unwrap(), 0);
        assert_eq!(sink.written(), 0);

        // The batch is kept and commits once the store accepts it.
        sqlx::query("DROP TRIGGER reject_zoom_5")
            .execute(&sink.pool)
            .await
            .unwrap();
        sink.flush().await.unwrap();
        assert_eq!(sink.tile_count().await.unwrap(), 3);
        assert_eq!(sink.written(), 3);
    }
}
