use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use strata_core::{
    Edge, EdgeType, FileRecord, SourceRange, Symbol, SymbolId, SymbolKind, SymbolMetrics,
    VersionRecord, Visibility,
};

use crate::{
    RepoCounts, StoreError, SymbolAttributes, SymbolLite, SymbolStore, SymbolStoreWriter,
    clamp_search_limit, merge_attributes, normalize_search_token, split_attributes,
};

const BATCH_CHUNK: usize = 500;

/// Sqlite-backed symbol store. One writer process populates it (an external
/// indexer); slice builds only read.
pub struct SqliteSymbolStore {
    conn: Mutex<Connection>,
}

impl SqliteSymbolStore {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        run_migrations(&conn)?;
        tracing::debug!(path = %db_path.display(), "opened symbol store");

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn repo_counts(&self, repo_id: &str) -> Result<RepoCounts, StoreError> {
        let conn = self.lock_conn();
        let symbols: u64 = conn.query_row(
            "SELECT COUNT(*) FROM symbols WHERE repo_id = ?1",
            params![repo_id],
            |row| row.get(0),
        )?;
        let edges: u64 = conn.query_row(
            "SELECT COUNT(*) FROM edges WHERE repo_id = ?1",
            params![repo_id],
            |row| row.get(0),
        )?;
        let files: u64 = conn.query_row(
            "SELECT COUNT(*) FROM files WHERE repo_id = ?1",
            params![repo_id],
            |row| row.get(0),
        )?;
        Ok(RepoCounts {
            symbols,
            edges,
            files,
        })
    }

    fn lock_conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn symbol_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(Symbol, Option<String>)> {
    let kind_raw: String = row.get(3)?;
    let kind = SymbolKind::from_str(&kind_raw).unwrap_or(SymbolKind::Variable);
    let visibility_raw: Option<String> = row.get(6)?;
    let visibility = visibility_raw.as_deref().and_then(|value| match value {
        "public" => Some(Visibility::Public),
        "private" => Some(Visibility::Private),
        "protected" => Some(Visibility::Protected),
        _ => None,
    });

    let symbol = Symbol {
        symbol_id: row.get(0)?,
        file_id: row.get(1)?,
        repo_id: row.get(2)?,
        kind,
        name: row.get(4)?,
        exported: row.get::<_, i64>(5)? != 0,
        visibility,
        range: SourceRange {
            start_line: row.get::<_, i64>(7)? as u32,
            start_col: row.get::<_, i64>(8)? as u32,
            end_line: row.get::<_, i64>(9)? as u32,
            end_col: row.get::<_, i64>(10)? as u32,
        },
        ast_fingerprint: row.get(11)?,
        signature: None,
        summary: None,
        invariants: Vec::new(),
        side_effects: Vec::new(),
    };
    let attributes: Option<String> = row.get(12)?;
    Ok((symbol, attributes))
}

fn hydrate_symbol(
    (mut symbol, attributes_json): (Symbol, Option<String>),
) -> Result<Symbol, StoreError> {
    if let Some(raw) = attributes_json.filter(|value| !value.trim().is_empty()) {
        let attributes: SymbolAttributes = serde_json::from_str(&raw)?;
        merge_attributes(&mut symbol, attributes);
    }
    Ok(symbol)
}

fn edge_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Edge> {
    let edge_type_raw: String = row.get(2)?;
    let edge_type = EdgeType::from_str(&edge_type_raw).unwrap_or(EdgeType::Call);
    Ok(Edge {
        from_symbol_id: row.get(0)?,
        to_symbol_id: row.get(1)?,
        edge_type,
        weight: row.get(3)?,
        confidence: row.get(4)?,
    })
}

const SYMBOL_COLUMNS: &str = "symbol_id, file_id, repo_id, kind, name, exported, visibility, \
     start_line, start_col, end_line, end_col, ast_fingerprint, attributes";

const EDGE_COLUMNS: &str = "from_symbol_id, to_symbol_id, edge_type, weight, confidence";

fn in_placeholders(count: usize) -> String {
    let mut placeholders = String::with_capacity(count * 2);
    for index in 0..count {
        if index > 0 {
            placeholders.push(',');
        }
        placeholders.push('?');
    }
    placeholders
}

impl SymbolStore for SqliteSymbolStore {
    fn symbols_by_repo(&self, repo_id: &str) -> Result<Vec<Symbol>, StoreError> {
        let conn = self.lock_conn();
        let sql = format!(
            "SELECT {SYMBOL_COLUMNS} FROM symbols WHERE repo_id = ?1 ORDER BY symbol_id"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![repo_id], symbol_from_row)?;

        let mut symbols = Vec::new();
        for row in rows {
            symbols.push(hydrate_symbol(row?)?);
        }
        Ok(symbols)
    }

    fn edges_by_repo(&self, repo_id: &str) -> Result<Vec<Edge>, StoreError> {
        let conn = self.lock_conn();
        let sql = format!(
            "SELECT {EDGE_COLUMNS} FROM edges WHERE repo_id = ?1 \
             ORDER BY from_symbol_id, to_symbol_id, edge_type"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![repo_id], edge_from_row)?;
        let edges = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(edges)
    }

    fn symbols_by_ids(&self, ids: &[SymbolId]) -> Result<Vec<Symbol>, StoreError> {
        let conn = self.lock_conn();
        let mut symbols = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(BATCH_CHUNK) {
            let sql = format!(
                "SELECT {SYMBOL_COLUMNS} FROM symbols WHERE symbol_id IN ({}) ORDER BY symbol_id",
                in_placeholders(chunk.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), symbol_from_row)?;
            for row in rows {
                symbols.push(hydrate_symbol(row?)?);
            }
        }
        Ok(symbols)
    }

    fn files_by_ids(&self, ids: &[String]) -> Result<Vec<FileRecord>, StoreError> {
        let conn = self.lock_conn();
        let mut files = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(BATCH_CHUNK) {
            let sql = format!(
                "SELECT file_id, repo_id, rel_path, language FROM files \
                 WHERE file_id IN ({}) ORDER BY file_id",
                in_placeholders(chunk.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), |row| {
                Ok(FileRecord {
                    file_id: row.get(0)?,
                    repo_id: row.get(1)?,
                    rel_path: row.get(2)?,
                    language: row.get(3)?,
                })
            })?;
            for row in rows {
                files.push(row?);
            }
        }
        Ok(files)
    }

    fn metrics_by_symbol_ids(
        &self,
        ids: &[SymbolId],
    ) -> Result<Vec<(SymbolId, SymbolMetrics)>, StoreError> {
        let conn = self.lock_conn();
        let mut metrics = Vec::new();
        for chunk in ids.chunks(BATCH_CHUNK) {
            let sql = format!(
                "SELECT symbol_id, fan_in, fan_out, churn_30d, test_refs FROM metrics \
                 WHERE symbol_id IN ({}) ORDER BY symbol_id",
                in_placeholders(chunk.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), |row| {
                let test_refs_raw: Option<String> = row.get(4)?;
                Ok((
                    row.get::<_, String>(0)?,
                    SymbolMetrics {
                        fan_in: row.get::<_, i64>(1)? as u32,
                        fan_out: row.get::<_, i64>(2)? as u32,
                        churn_30d: row.get::<_, i64>(3)? as u32,
                        test_refs: Vec::new(),
                    },
                    test_refs_raw,
                ))
            })?;
            for row in rows {
                let (symbol_id, mut record, test_refs_raw) = row?;
                if let Some(raw) = test_refs_raw.filter(|value| !value.trim().is_empty()) {
                    record.test_refs = serde_json::from_str(&raw)?;
                }
                metrics.push((symbol_id, record));
            }
        }
        Ok(metrics)
    }

    fn edges_from_symbols(&self, ids: &[SymbolId]) -> Result<Vec<Edge>, StoreError> {
        let conn = self.lock_conn();
        let mut edges = Vec::new();
        for chunk in ids.chunks(BATCH_CHUNK) {
            let sql = format!(
                "SELECT {EDGE_COLUMNS} FROM edges WHERE from_symbol_id IN ({}) \
                 ORDER BY from_symbol_id, to_symbol_id, edge_type",
                in_placeholders(chunk.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), edge_from_row)?;
            for row in rows {
                edges.push(row?);
            }
        }
        Ok(edges)
    }

    fn files_by_repo_lite(&self, repo_id: &str) -> Result<Vec<FileRecord>, StoreError> {
        let conn = self.lock_conn();
        let mut stmt = conn.prepare(
            "SELECT file_id, repo_id, rel_path, language FROM files \
             WHERE repo_id = ?1 ORDER BY rel_path",
        )?;
        let rows = stmt.query_map(params![repo_id], |row| {
            Ok(FileRecord {
                file_id: row.get(0)?,
                repo_id: row.get(1)?,
                rel_path: row.get(2)?,
                language: row.get(3)?,
            })
        })?;
        let files = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(files)
    }

    fn symbol_ids_by_file(&self, file_id: &str) -> Result<Vec<SymbolId>, StoreError> {
        let conn = self.lock_conn();
        let mut stmt = conn.prepare(
            "SELECT symbol_id FROM symbols WHERE file_id = ?1 ORDER BY symbol_id",
        )?;
        let rows = stmt.query_map(params![file_id], |row| row.get::<_, String>(0))?;
        let ids = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn search_symbols_lite(
        &self,
        repo_id: &str,
        token: &str,
        limit: u32,
    ) -> Result<Vec<SymbolLite>, StoreError> {
        let token = normalize_search_token(token);
        if token.is_empty() {
            return Ok(Vec::new());
        }
        let limit = clamp_search_limit(limit) as i64;
        let pattern = format!("%{token}%");

        let conn = self.lock_conn();
        let mut stmt = conn.prepare(
            "SELECT s.symbol_id, s.file_id, s.name, s.kind FROM symbols s \
             LEFT JOIN files f ON f.file_id = s.file_id \
             WHERE s.repo_id = ?1 AND (LOWER(s.name) LIKE ?2 OR LOWER(f.rel_path) LIKE ?2) \
             ORDER BY s.name ASC, s.symbol_id ASC LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![repo_id, pattern, limit], |row| {
            let kind_raw: String = row.get(3)?;
            Ok(SymbolLite {
                symbol_id: row.get(0)?,
                file_id: row.get(1)?,
                name: row.get(2)?,
                kind: SymbolKind::from_str(&kind_raw).unwrap_or(SymbolKind::Variable),
            })
        })?;
        let matches = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(matches)
    }

    fn latest_version(&self, repo_id: &str) -> Result<Option<VersionRecord>, StoreError> {
        let conn = self.lock_conn();
        let record = conn
            .query_row(
                "SELECT repo_id, version_id, indexed_at FROM versions WHERE repo_id = ?1",
                params![repo_id],
                |row| {
                    Ok(VersionRecord {
                        repo_id: row.get(0)?,
                        version_id: row.get(1)?,
                        indexed_at: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }
}

impl SymbolStoreWriter for SqliteSymbolStore {
    fn upsert_file(&self, record: FileRecord) -> Result<(), StoreError> {
        let conn = self.lock_conn();
        conn.execute(
            r#"
            INSERT INTO files (file_id, repo_id, rel_path, language)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(file_id) DO UPDATE SET
                repo_id = excluded.repo_id,
                rel_path = excluded.rel_path,
                language = excluded.language
            "#,
            params![
                record.file_id,
                record.repo_id,
                record.rel_path,
                record.language
            ],
        )?;
        Ok(())
    }

    fn upsert_symbol(&self, symbol: Symbol) -> Result<(), StoreError> {
        let attributes = split_attributes(&symbol);
        let attributes_json = if attributes.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&attributes)?)
        };

        let conn = self.lock_conn();
        conn.execute(
            r#"
            INSERT INTO symbols (
                symbol_id, file_id, repo_id, kind, name, exported, visibility,
                start_line, start_col, end_line, end_col, ast_fingerprint, attributes
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            ON CONFLICT(symbol_id) DO UPDATE SET
                file_id = excluded.file_id,
                repo_id = excluded.repo_id,
                kind = excluded.kind,
                name = excluded.name,
                exported = excluded.exported,
                visibility = excluded.visibility,
                start_line = excluded.start_line,
                start_col = excluded.start_col,
                end_line = excluded.end_line,
                end_col = excluded.end_col,
                ast_fingerprint = excluded.ast_fingerprint,
                attributes = excluded.attributes
            "#,
            params![
                symbol.symbol_id,
                symbol.file_id,
                symbol.repo_id,
                symbol.kind.as_str(),
                symbol.name,
                symbol.exported as i64,
                symbol.visibility.map(Visibility::as_str),
                symbol.range.start_line as i64,
                symbol.range.start_col as i64,
                symbol.range.end_line as i64,
                symbol.range.end_col as i64,
                symbol.ast_fingerprint,
                attributes_json,
            ],
        )?;
        Ok(())
    }

    fn upsert_edge(&self, edge: Edge) -> Result<(), StoreError> {
        // The repo owning an edge is the repo of its from-side; dangling
        // to-sides are legal.
        let conn = self.lock_conn();
        let repo_id: Option<String> = conn
            .query_row(
                "SELECT repo_id FROM symbols WHERE symbol_id = ?1",
                params![edge.from_symbol_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(repo_id) = repo_id else {
            return Err(StoreError::InvalidRecord(format!(
                "edge references unknown from-symbol '{}'",
                edge.from_symbol_id
            )));
        };

        conn.execute(
            r#"
            INSERT INTO edges (repo_id, from_symbol_id, to_symbol_id, edge_type, weight, confidence)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(from_symbol_id, to_symbol_id, edge_type) DO UPDATE SET
                repo_id = excluded.repo_id,
                weight = excluded.weight,
                confidence = excluded.confidence
            "#,
            params![
                repo_id,
                edge.from_symbol_id,
                edge.to_symbol_id,
                edge.edge_type.as_str(),
                edge.weight,
                edge.confidence,
            ],
        )?;
        Ok(())
    }

    fn upsert_metrics(&self, symbol_id: &str, metrics: SymbolMetrics) -> Result<(), StoreError> {
        let test_refs_json = if metrics.test_refs.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&metrics.test_refs)?)
        };

        let conn = self.lock_conn();
        conn.execute(
            r#"
            INSERT INTO metrics (symbol_id, fan_in, fan_out, churn_30d, test_refs)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(symbol_id) DO UPDATE SET
                fan_in = excluded.fan_in,
                fan_out = excluded.fan_out,
                churn_30d = excluded.churn_30d,
                test_refs = excluded.test_refs
            "#,
            params![
                symbol_id,
                metrics.fan_in as i64,
                metrics.fan_out as i64,
                metrics.churn_30d as i64,
                test_refs_json,
            ],
        )?;
        Ok(())
    }

    fn set_version(&self, record: VersionRecord) -> Result<(), StoreError> {
        let conn = self.lock_conn();
        conn.execute(
            r#"
            INSERT INTO versions (repo_id, version_id, indexed_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(repo_id) DO UPDATE SET
                version_id = excluded.version_id,
                indexed_at = excluded.indexed_at
            "#,
            params![record.repo_id, record.version_id, record.indexed_at],
        )?;
        Ok(())
    }
}

fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS versions (
            repo_id TEXT PRIMARY KEY,
            version_id TEXT NOT NULL,
            indexed_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS files (
            file_id TEXT PRIMARY KEY,
            repo_id TEXT NOT NULL,
            rel_path TEXT NOT NULL,
            language TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS symbols (
            symbol_id TEXT PRIMARY KEY,
            file_id TEXT NOT NULL,
            repo_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            name TEXT NOT NULL,
            exported INTEGER NOT NULL,
            visibility TEXT,
            start_line INTEGER NOT NULL,
            start_col INTEGER NOT NULL,
            end_line INTEGER NOT NULL,
            end_col INTEGER NOT NULL,
            ast_fingerprint TEXT NOT NULL,
            attributes TEXT
        );

        CREATE TABLE IF NOT EXISTS edges (
            repo_id TEXT NOT NULL,
            from_symbol_id TEXT NOT NULL,
            to_symbol_id TEXT NOT NULL,
            edge_type TEXT NOT NULL,
            weight REAL NOT NULL,
            confidence REAL,
            PRIMARY KEY (from_symbol_id, to_symbol_id, edge_type)
        );

        CREATE TABLE IF NOT EXISTS metrics (
            symbol_id TEXT PRIMARY KEY,
            fan_in INTEGER NOT NULL,
            fan_out INTEGER NOT NULL,
            churn_30d INTEGER NOT NULL,
            test_refs TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_symbols_repo ON symbols(repo_id);
        CREATE INDEX IF NOT EXISTS idx_symbols_file ON symbols(file_id);
        CREATE INDEX IF NOT EXISTS idx_files_repo ON files(repo_id);
        CREATE INDEX IF NOT EXISTS idx_edges_repo ON edges(repo_id);
        CREATE INDEX IF NOT EXISTS idx_edges_from ON edges(from_symbol_id);
        "#,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::memory::test_fixtures::{sample_edge, sample_file, sample_symbol};

    fn populated_store() -> SqliteSymbolStore {
        let store = SqliteSymbolStore::open_in_memory().expect("open in-memory store");
        store
            .upsert_file(sample_file("file-1", "repo-1", "src/auth/login.ts"))
            .expect("upsert file");
        store
            .upsert_file(sample_file("file-2", "repo-1", "src/auth/session.ts"))
            .expect("upsert file");
        store
            .upsert_symbol(sample_symbol("sym-a", "file-1", "repo-1", "loginUser"))
            .expect("upsert symbol");
        store
            .upsert_symbol(sample_symbol("sym-b", "file-2", "repo-1", "createSession"))
            .expect("upsert symbol");
        store
            .upsert_edge(sample_edge("sym-a", "sym-b", EdgeType::Call, 1.0, Some(0.9)))
            .expect("upsert edge");
        store
            .set_version(VersionRecord {
                repo_id: "repo-1".to_owned(),
                version_id: "v1".to_owned(),
                indexed_at: 1_700_000_000,
            })
            .expect("set version");
        store
    }

    #[test]
    fn open_creates_database_file_and_persists() {
        let temp = tempdir().expect("tempdir");
        let db_path = temp.path().join(".strata/graph.sqlite");

        let store = SqliteSymbolStore::open(&db_path).expect("open store");
        store
            .upsert_file(sample_file("file-1", "repo-1", "src/lib.rs"))
            .expect("upsert file");
        store
            .upsert_symbol(sample_symbol("sym-1", "file-1", "repo-1", "run"))
            .expect("upsert symbol");
        drop(store);

        assert!(db_path.exists());

        let reopened = SqliteSymbolStore::open(&db_path).expect("reopen store");
        let symbols = reopened.symbols_by_repo("repo-1").expect("symbols");
        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0].symbol_id, "sym-1");
    }

    #[test]
    fn symbols_round_trip_with_attributes() {
        let store = populated_store();
        let symbols = store.symbols_by_repo("repo-1").expect("symbols");
        assert_eq!(symbols.len(), 2);
        assert_eq!(symbols[0].symbol_id, "sym-a");
        assert!(symbols[0].signature.is_some());
        assert!(symbols[0].summary.is_some());
    }

    #[test]
    fn batch_lookups_filter_and_order() {
        let store = populated_store();

        let by_ids = store
            .symbols_by_ids(&["sym-b".to_owned(), "missing".to_owned()])
            .expect("symbols by ids");
        assert_eq!(by_ids.len(), 1);
        assert_eq!(by_ids[0].symbol_id, "sym-b");

        let files = store
            .files_by_ids(&["file-1".to_owned(), "file-2".to_owned()])
            .expect("files by ids");
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].file_id, "file-1");

        let edges = store
            .edges_from_symbols(&["sym-a".to_owned()])
            .expect("edges from symbols");
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].to_symbol_id, "sym-b");
    }

    #[test]
    fn search_symbols_lite_matches_name_and_path() {
        let store = populated_store();

        let by_name = store
            .search_symbols_lite("repo-1", "login", 10)
            .expect("search by name");
        // loginUser matches by name and by its login.ts path, as one row.
        assert_eq!(by_name.len(), 1);
        assert_eq!(by_name[0].symbol_id, "sym-a");

        let by_path = store
            .search_symbols_lite("repo-1", "session.ts", 10)
            .expect("search by path");
        assert_eq!(by_path.len(), 1);
        assert_eq!(by_path[0].symbol_id, "sym-b");

        let empty = store
            .search_symbols_lite("repo-1", "   ", 10)
            .expect("empty search");
        assert!(empty.is_empty());
    }

    #[test]
    fn latest_version_round_trips() {
        let store = populated_store();
        let version = store
            .latest_version("repo-1")
            .expect("latest version")
            .expect("version exists");
        assert_eq!(version.version_id, "v1");
        assert!(store
            .latest_version("repo-unknown")
            .expect("missing repo")
            .is_none());
    }

    #[test]
    fn edge_upsert_rejects_unknown_from_symbol() {
        let store = SqliteSymbolStore::open_in_memory().expect("open store");
        let result = store.upsert_edge(sample_edge(
            "ghost",
            "sym-b",
            EdgeType::Call,
            1.0,
            None,
        ));
        assert!(matches!(result, Err(StoreError::InvalidRecord(_))));
    }

    #[test]
    fn dangling_to_side_is_accepted() {
        let store = populated_store();
        store
            .upsert_edge(sample_edge(
                "sym-a",
                "not-indexed",
                EdgeType::Import,
                0.6,
                None,
            ))
            .expect("dangling to-side edge");
        let edges = store.edges_by_repo("repo-1").expect("edges");
        assert_eq!(edges.len(), 2);
    }

    #[test]
    fn repo_counts_reflect_contents() {
        let store = populated_store();
        let counts = store.repo_counts("repo-1").expect("counts");
        assert_eq!(counts.symbols, 2);
        assert_eq!(counts.edges, 1);
        assert_eq!(counts.files, 2);
    }
}
