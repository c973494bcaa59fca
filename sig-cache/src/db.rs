//! SQLite-backed persistence for the RequiredFiles manifest and the local
//! blob cache: `(kind, id) -> {md5, size, media_type, hits, last_used}`,
//! plus a `dependants` table used for the layout-dependant reference
//! counting that drives garbage collection.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use sig_types::CacheKind;

use crate::error::Result;

/// One entry in the local blob cache.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub kind: CacheKind,
    pub id: String,
    pub media_type: String,
    pub blob_path: PathBuf,
    pub size: u64,
    pub md5: String,
    pub last_used: chrono::DateTime<Utc>,
}

pub struct CacheDb {
    conn: Mutex<Connection>,
}

impl CacheDb {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS manifest (
                kind TEXT NOT NULL,
                id TEXT NOT NULL,
                path TEXT NOT NULL,
                md5 TEXT NOT NULL,
                size INTEGER NOT NULL,
                file_type TEXT,
                code TEXT,
                PRIMARY KEY (kind, id)
            );
            CREATE TABLE IF NOT EXISTS cache_entries (
                kind TEXT NOT NULL,
                id TEXT NOT NULL,
                media_type TEXT NOT NULL,
                blob_path TEXT NOT NULL,
                size INTEGER NOT NULL,
                md5 TEXT NOT NULL,
                last_used TEXT NOT NULL,
                PRIMARY KEY (kind, id)
            );
            CREATE TABLE IF NOT EXISTS dependants (
                kind TEXT NOT NULL,
                id TEXT NOT NULL,
                layout_id TEXT NOT NULL,
                PRIMARY KEY (kind, id, layout_id)
            );
            CREATE INDEX IF NOT EXISTS idx_entries_last_used ON cache_entries (last_used ASC);
            CREATE INDEX IF NOT EXISTS idx_dependants_layout ON dependants (layout_id);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // --- manifest ----------------------------------------------------

    pub fn set_manifest(&self, files: &[sig_types::RequiredFile]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM manifest", [])?;
        for f in files {
            tx.execute(
                "INSERT INTO manifest (kind, id, path, md5, size, file_type, code)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    f.kind.wire_code(),
                    f.id,
                    f.path,
                    f.md5,
                    f.size as i64,
                    f.file_type,
                    f.code
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn manifest(&self) -> Result<Vec<sig_types::RequiredFile>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT kind, id, path, md5, size, file_type, code FROM manifest")?;
        let rows = stmt
            .query_map([], |row| {
                let kind_code: String = row.get(0)?;
                Ok(sig_types::RequiredFile {
                    kind: CacheKind::from_wire_code(&kind_code).unwrap_or(CacheKind::Media),
                    id: row.get(1)?,
                    path: row.get(2)?,
                    md5: row.get(3)?,
                    size: row.get::<_, i64>(4)? as u64,
                    file_type: row.get(5)?,
                    code: row.get(6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // --- cache entries -------------------------------------------------

    pub fn upsert_entry(&self, entry: &CacheEntry) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO cache_entries (kind, id, media_type, blob_path, size, md5, last_used)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(kind, id) DO UPDATE SET
                media_type = excluded.media_type,
                blob_path = excluded.blob_path,
                size = excluded.size,
                md5 = excluded.md5,
                last_used = excluded.last_used",
            params![
                entry.kind.wire_code(),
                entry.id,
                entry.media_type,
                entry.blob_path.to_string_lossy(),
                entry.size as i64,
                entry.md5,
                entry.last_used.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_entry(&self, kind: CacheKind, id: &str) -> Result<Option<CacheEntry>> {
        let conn = self.conn.lock().unwrap();
        let entry = conn
            .query_row(
                "SELECT kind, id, media_type, blob_path, size, md5, last_used
                 FROM cache_entries WHERE kind = ?1 AND id = ?2",
                params![kind.wire_code(), id],
                Self::row_to_entry,
            )
            .optional()?;
        Ok(entry)
    }

    pub fn touch_entry(&self, kind: CacheKind, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE cache_entries SET last_used = ?1 WHERE kind = ?2 AND id = ?3",
            params![Utc::now().to_rfc3339(), kind.wire_code(), id],
        )?;
        Ok(())
    }

    pub fn delete_entry(&self, kind: CacheKind, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM cache_entries WHERE kind = ?1 AND id = ?2",
            params![kind.wire_code(), id],
        )?;
        Ok(())
    }

    pub fn all_entries(&self) -> Result<Vec<CacheEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT kind, id, media_type, blob_path, size, md5, last_used FROM cache_entries",
        )?;
        let rows = stmt
            .query_map([], Self::row_to_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Entries with no layout dependant, oldest `last_used` first — the GC
    /// eviction candidate order.
    pub fn unreferenced_entries_lru(&self, limit: usize) -> Result<Vec<CacheEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT e.kind, e.id, e.media_type, e.blob_path, e.size, e.md5, e.last_used
             FROM cache_entries e
             WHERE NOT EXISTS (
                SELECT 1 FROM dependants d WHERE d.kind = e.kind AND d.id = e.id
             )
             ORDER BY e.last_used ASC
             LIMIT ?1",
        )?;
        let rows = stmt
            .query_map([limit as i64], Self::row_to_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<CacheEntry> {
        let kind_code: String = row.get(0)?;
        let blob_path: String = row.get(3)?;
        let last_used: String = row.get(6)?;
        Ok(CacheEntry {
            kind: CacheKind::from_wire_code(&kind_code).unwrap_or(CacheKind::Media),
            id: row.get(1)?,
            media_type: row.get(2)?,
            blob_path: PathBuf::from(blob_path),
            size: row.get::<_, i64>(4)? as u64,
            md5: row.get(5)?,
            last_used: chrono::DateTime::parse_from_rfc3339(&last_used)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        })
    }

    // --- dependant reference counting ---------------------------------

    pub fn add_dependant(&self, kind: CacheKind, id: &str, layout_id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO dependants (kind, id, layout_id) VALUES (?1, ?2, ?3)",
            params![kind.wire_code(), id, layout_id.to_string()],
        )?;
        Ok(())
    }

    pub fn remove_layout_dependants(&self, layout_id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM dependants WHERE layout_id = ?1",
            params![layout_id.to_string()],
        )?;
        Ok(())
    }

    pub fn has_dependants(&self, kind: CacheKind, id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM dependants WHERE kind = ?1 AND id = ?2",
            params![kind.wire_code(), id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_db() -> CacheDb {
        CacheDb::open(Path::new(":memory:")).unwrap()
    }

    #[test]
    fn manifest_round_trips() {
        let db = temp_db();
        let files = vec![sig_types::RequiredFile {
            kind: CacheKind::Media,
            id: "42".into(),
            path: "media/42.mp4".into(),
            md5: "abc".into(),
            size: 1024,
            file_type: Some("video/mp4".into()),
            code: None,
        }];
        db.set_manifest(&files).unwrap();
        let got = db.manifest().unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].id, "42");
    }

    #[test]
    fn dependant_refcount_gc_eligibility() {
        let db = temp_db();
        let entry = CacheEntry {
            kind: CacheKind::Media,
            id: "1".into(),
            media_type: "image/png".into(),
            blob_path: PathBuf::from("/tmp/1.png"),
            size: 10,
            md5: "x".into(),
            last_used: Utc::now(),
        };
        db.upsert_entry(&entry).unwrap();
        assert_eq!(db.unreferenced_entries_lru(10).unwrap().len(), 1);

        db.add_dependant(CacheKind::Media, "1", 7).unwrap();
        assert_eq!(db.unreferenced_entries_lru(10).unwrap().len(), 0);

        db.remove_layout_dependants(7).unwrap();
        assert_eq!(db.unreferenced_entries_lru(10).unwrap().len(), 1);
    }
}
