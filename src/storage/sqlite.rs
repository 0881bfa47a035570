//! SQLite Persistent Storage
//!
//! One writer connection guarded by a mutex (the store's single-writer,
//! WAL-mode discipline — see the concurrency model in SPEC_FULL.md §5), plus
//! a small reader pool for concurrent reads outside a write transaction.
//! Every multi-statement unit of work (verify + store locked proofs + blob
//! insert, or rotate + swap + counter advance) runs through
//! [`SqliteStore::transaction`], which hands the caller a real
//! `rusqlite::Transaction` and commits or rolls it back for them.

use std::path::Path;
use std::sync::{Arc, Mutex};

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Transaction};

use super::traits::{StorageError, StorageResult};
use crate::types::{Blob, KeysetCounter, LockedProof, PubkeyVersion, SwappedProof};

pub struct SqliteStore {
    writer: Arc<Mutex<Connection>>,
    readers: Pool<SqliteConnectionManager>,
}

impl SqliteStore {
    /// Open (or create) the database at `db_path` and run migrations.
    pub fn new<P: AsRef<Path>>(db_path: P) -> StorageResult<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let writer =
            Connection::open(db_path).map_err(|e| StorageError::Connection(e.to_string()))?;
        writer
            .pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let manager = SqliteConnectionManager::file(db_path);
        let readers = Pool::builder()
            .max_size(8)
            .build(manager)
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let store = Self {
            writer: Arc::new(Mutex::new(writer)),
            readers,
        };
        store.run_migrations()?;
        Ok(store)
    }

    /// An in-memory store backed by a shared-cache SQLite database, for
    /// tests. All connections (writer and readers) see the same data.
    pub fn in_memory() -> StorageResult<Self> {
        let uri = "file:blossom-cashu-test?mode=memory&cache=shared";
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let writer = Connection::open_with_flags(uri, flags)
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let manager = SqliteConnectionManager::file(uri).with_flags(flags);
        let readers = Pool::builder()
            .max_size(4)
            .build(manager)
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let store = Self {
            writer: Arc::new(Mutex::new(writer)),
            readers,
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> StorageResult<()> {
        let writer = self.writer.lock().unwrap();
        writer
            .execute_batch(
                r#"
            CREATE TABLE IF NOT EXISTS blobs (
                sha256 TEXT PRIMARY KEY,
                size INTEGER NOT NULL,
                path TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                pubkey TEXT NOT NULL DEFAULT '',
                content_type TEXT NOT NULL DEFAULT ''
            );

            CREATE TABLE IF NOT EXISTS pubkey_versions (
                version INTEGER PRIMARY KEY,
                expiration INTEGER NOT NULL,
                active INTEGER NOT NULL DEFAULT 0
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_pubkey_versions_one_active
                ON pubkey_versions(active) WHERE active = 1;

            CREATE TABLE IF NOT EXISTS locked_proofs (
                amount INTEGER NOT NULL,
                keyset_id TEXT NOT NULL,
                secret TEXT NOT NULL,
                c TEXT NOT NULL UNIQUE,
                witness TEXT,
                redeemed INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                pubkey_version INTEGER NOT NULL,
                mint TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_locked_proofs_redeemed ON locked_proofs(redeemed);
            CREATE INDEX IF NOT EXISTS idx_locked_proofs_mint ON locked_proofs(mint);

            CREATE TABLE IF NOT EXISTS swapped_proofs (
                amount INTEGER NOT NULL,
                keyset_id TEXT NOT NULL,
                secret TEXT NOT NULL,
                c TEXT NOT NULL UNIQUE,
                witness TEXT,
                spent INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                mint TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_swapped_proofs_spent ON swapped_proofs(spent);

            CREATE TABLE IF NOT EXISTS keyset_counters (
                keyset_id TEXT PRIMARY KEY,
                counter INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS trusted_mints (
                url TEXT PRIMARY KEY,
                created_at INTEGER NOT NULL
            );
            "#,
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(())
    }

    /// Run `f` inside a single write transaction on the dedicated writer
    /// connection, committing on `Ok` and rolling back on `Err`. Runs on a
    /// blocking thread since `rusqlite` is synchronous.
    pub async fn transaction<F, T>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&Transaction<'_>) -> StorageResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let writer = self.writer.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = writer
                .lock()
                .map_err(|_| StorageError::Connection("writer mutex poisoned".into()))?;
            let tx = conn
                .transaction()
                .map_err(|e| StorageError::Database(e.to_string()))?;
            let result = f(&tx)?;
            tx.commit()
                .map_err(|e| StorageError::Database(e.to_string()))?;
            Ok(result)
        })
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?
    }

    fn reader(&self) -> StorageResult<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.readers
            .get()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }

    /// Read a blob outside any write transaction (concurrent reads are
    /// permitted by WAL mode).
    pub async fn get_blob(&self, sha256_hex: &str) -> StorageResult<Option<Blob>> {
        let readers = self.readers.clone();
        let sha256_hex = sha256_hex.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = readers
                .get()
                .map_err(|e| StorageError::Connection(e.to_string()))?;
            query_blob(&conn, &sha256_hex)
        })
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?
    }

    /// Check a nullifier against both proof tables outside any write
    /// transaction — the store-backed half of duplicate detection,
    /// consulted on a Bloom filter hit.
    pub async fn proof_c_exists(&self, c: &str) -> StorageResult<bool> {
        let readers = self.readers.clone();
        let c = c.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = readers
                .get()
                .map_err(|e| StorageError::Connection(e.to_string()))?;
            let in_locked: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM locked_proofs WHERE c = ?1",
                    params![c],
                    |row| row.get(0),
                )
                .map_err(|e| StorageError::Database(e.to_string()))?;
            if in_locked > 0 {
                return Ok(true);
            }
            let in_swapped: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM swapped_proofs WHERE c = ?1",
                    params![c],
                    |row| row.get(0),
                )
                .map_err(|e| StorageError::Database(e.to_string()))?;
            Ok(in_swapped > 0)
        })
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?
    }

    pub async fn list_trusted_mints(&self) -> StorageResult<Vec<String>> {
        let conn = self.reader()?;
        let mut stmt = conn
            .prepare("SELECT url FROM trusted_mints ORDER BY created_at ASC")
            .map_err(|e| StorageError::Database(e.to_string()))?;
        let urls = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| StorageError::Database(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(urls)
    }

    /// Seed a trusted mint if the table is empty (bootstraps `TRUSTED_MINT`
    /// on first run; see SPEC_FULL.md's supplemented trusted-mint table).
    pub async fn ensure_trusted_mint(&self, url: String, now: i64) -> StorageResult<()> {
        self.transaction(move |tx| {
            let existing: i64 = tx
                .query_row("SELECT COUNT(*) FROM trusted_mints", [], |row| row.get(0))
                .map_err(|e| StorageError::Database(e.to_string()))?;
            if existing == 0 {
                add_trusted_mint(tx, &url, now)?;
            }
            Ok(())
        })
        .await
    }
}

fn query_blob(conn: &Connection, sha256_hex: &str) -> StorageResult<Option<Blob>> {
    conn.query_row(
        "SELECT sha256, size, path, created_at, pubkey, content_type FROM blobs WHERE sha256 = ?1",
        params![sha256_hex],
        row_to_blob,
    )
    .optional()
    .map_err(|e| StorageError::Database(e.to_string()))
}

fn row_to_blob(row: &rusqlite::Row) -> rusqlite::Result<Blob> {
    let sha256_hex: String = row.get(0)?;
    let sha256_bytes = hex::decode(&sha256_hex).unwrap_or_else(|_| vec![0u8; 32]);
    let mut sha256 = [0u8; 32];
    sha256.copy_from_slice(&sha256_bytes[..32.min(sha256_bytes.len())]);
    Ok(Blob {
        sha256,
        size: row.get::<_, i64>(1)? as u64,
        path: row.get(2)?,
        created_at: row.get(3)?,
        pubkey: row.get(4)?,
        content_type: row.get(5)?,
    })
}

/// Insert a new blob row inside an in-progress write transaction.
pub fn insert_blob(tx: &Transaction<'_>, blob: &Blob) -> StorageResult<()> {
    tx.execute(
        "INSERT INTO blobs (sha256, size, path, created_at, pubkey, content_type)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            blob.sha256_hex(),
            blob.size as i64,
            blob.path,
            blob.created_at,
            blob.pubkey,
            blob.content_type,
        ],
    )
    .map_err(|e| {
        if is_duplicate(&e) {
            StorageError::Duplicate(blob.sha256_hex())
        } else {
            StorageError::Database(e.to_string())
        }
    })?;
    Ok(())
}

/// The sole active pubkey version, read inside a transaction.
pub fn get_active_pubkey_version(tx: &Transaction<'_>) -> StorageResult<Option<PubkeyVersion>> {
    tx.query_row(
        "SELECT version, expiration, active FROM pubkey_versions WHERE active = 1",
        [],
        row_to_pubkey_version,
    )
    .optional()
    .map_err(|e| StorageError::Database(e.to_string()))
}

fn row_to_pubkey_version(row: &rusqlite::Row) -> rusqlite::Result<PubkeyVersion> {
    Ok(PubkeyVersion {
        version: row.get::<_, i64>(0)? as u64,
        expiration: row.get(1)?,
        active: row.get::<_, i64>(2)? != 0,
    })
}

/// Flip the current active row to inactive and insert the next version,
/// atomically. Callers run this inside their own broader transaction.
pub fn rotate_pubkey(tx: &Transaction<'_>, expiration: i64) -> StorageResult<PubkeyVersion> {
    tx.execute(
        "UPDATE pubkey_versions SET active = 0 WHERE active = 1",
        [],
    )
    .map_err(|e| StorageError::Database(e.to_string()))?;

    let next_version: i64 = tx
        .query_row(
            "SELECT COALESCE(MAX(version), 0) + 1 FROM pubkey_versions",
            [],
            |row| row.get(0),
        )
        .map_err(|e| StorageError::Database(e.to_string()))?;

    tx.execute(
        "INSERT INTO pubkey_versions (version, expiration, active) VALUES (?1, ?2, 1)",
        params![next_version, expiration],
    )
    .map_err(|e| StorageError::Database(e.to_string()))?;

    Ok(PubkeyVersion {
        version: next_version as u64,
        expiration,
        active: true,
    })
}

/// Whether `c` already exists as a locked or swapped proof — the
/// store-backed half of duplicate detection, consulted on a Bloom filter
/// hit.
pub fn proof_c_exists(tx: &Transaction<'_>, c: &str) -> StorageResult<bool> {
    let in_locked: i64 = tx
        .query_row(
            "SELECT COUNT(*) FROM locked_proofs WHERE c = ?1",
            params![c],
            |row| row.get(0),
        )
        .map_err(|e| StorageError::Database(e.to_string()))?;
    if in_locked > 0 {
        return Ok(true);
    }
    let in_swapped: i64 = tx
        .query_row(
            "SELECT COUNT(*) FROM swapped_proofs WHERE c = ?1",
            params![c],
            |row| row.get(0),
        )
        .map_err(|e| StorageError::Database(e.to_string()))?;
    Ok(in_swapped > 0)
}

pub fn insert_locked_proofs(
    tx: &Transaction<'_>,
    proofs: &[LockedProof],
) -> StorageResult<()> {
    for proof in proofs {
        tx.execute(
            "INSERT INTO locked_proofs
                (amount, keyset_id, secret, c, witness, redeemed, created_at, pubkey_version, mint)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                proof.amount as i64,
                proof.keyset_id,
                proof.secret,
                proof.c,
                proof.witness,
                proof.redeemed as i64,
                proof.created_at,
                proof.pubkey_version as i64,
                proof.mint,
            ],
        )
        .map_err(|e| {
            if is_duplicate(&e) {
                StorageError::Duplicate(proof.c.clone())
            } else {
                StorageError::Database(e.to_string())
            }
        })?;
    }
    Ok(())
}

pub fn get_unredeemed_locked_proofs(tx: &Transaction<'_>) -> StorageResult<Vec<LockedProof>> {
    let mut stmt = tx
        .prepare(
            "SELECT amount, keyset_id, secret, c, witness, redeemed, created_at, pubkey_version, mint
             FROM locked_proofs WHERE redeemed = 0",
        )
        .map_err(|e| StorageError::Database(e.to_string()))?;
    let proofs = stmt
        .query_map([], row_to_locked_proof)
        .map_err(|e| StorageError::Database(e.to_string()))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| StorageError::Database(e.to_string()))?;
    Ok(proofs)
}

fn row_to_locked_proof(row: &rusqlite::Row) -> rusqlite::Result<LockedProof> {
    Ok(LockedProof {
        amount: row.get::<_, i64>(0)? as u64,
        keyset_id: row.get(1)?,
        secret: row.get(2)?,
        c: row.get(3)?,
        witness: row.get(4)?,
        redeemed: row.get::<_, i64>(5)? != 0,
        created_at: row.get(6)?,
        pubkey_version: row.get::<_, i64>(7)? as u64,
        mint: row.get(8)?,
    })
}

pub fn mark_locked_proofs_redeemed(tx: &Transaction<'_>, cs: &[String]) -> StorageResult<()> {
    for c in cs {
        tx.execute(
            "UPDATE locked_proofs SET redeemed = 1 WHERE c = ?1",
            params![c],
        )
        .map_err(|e| StorageError::Database(e.to_string()))?;
    }
    Ok(())
}

pub fn insert_swapped_proofs(tx: &Transaction<'_>, proofs: &[SwappedProof]) -> StorageResult<()> {
    for proof in proofs {
        tx.execute(
            "INSERT INTO swapped_proofs
                (amount, keyset_id, secret, c, witness, spent, created_at, mint)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                proof.amount as i64,
                proof.keyset_id,
                proof.secret,
                proof.c,
                proof.witness,
                proof.spent as i64,
                proof.created_at,
                proof.mint,
            ],
        )
        .map_err(|e| {
            if is_duplicate(&e) {
                StorageError::Duplicate(proof.c.clone())
            } else {
                StorageError::Database(e.to_string())
            }
        })?;
    }
    Ok(())
}

pub fn get_unspent_swapped_proofs_by_mint(
    tx: &Transaction<'_>,
    mint: &str,
) -> StorageResult<Vec<SwappedProof>> {
    let mut stmt = tx
        .prepare(
            "SELECT amount, keyset_id, secret, c, witness, spent, created_at, mint
             FROM swapped_proofs WHERE spent = 0 AND mint = ?1",
        )
        .map_err(|e| StorageError::Database(e.to_string()))?;
    let proofs = stmt
        .query_map(params![mint], row_to_swapped_proof)
        .map_err(|e| StorageError::Database(e.to_string()))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| StorageError::Database(e.to_string()))?;
    Ok(proofs)
}

fn row_to_swapped_proof(row: &rusqlite::Row) -> rusqlite::Result<SwappedProof> {
    Ok(SwappedProof {
        amount: row.get::<_, i64>(0)? as u64,
        keyset_id: row.get(1)?,
        secret: row.get(2)?,
        c: row.get(3)?,
        witness: row.get(4)?,
        spent: row.get::<_, i64>(5)? != 0,
        created_at: row.get(6)?,
        mint: row.get(7)?,
    })
}

pub fn mark_swapped_proofs_spent(tx: &Transaction<'_>, cs: &[String]) -> StorageResult<()> {
    for c in cs {
        tx.execute(
            "UPDATE swapped_proofs SET spent = 1 WHERE c = ?1",
            params![c],
        )
        .map_err(|e| StorageError::Database(e.to_string()))?;
    }
    Ok(())
}

pub fn get_keyset_counter(tx: &Transaction<'_>, keyset_id: &str) -> StorageResult<KeysetCounter> {
    let counter: Option<i64> = tx
        .query_row(
            "SELECT counter FROM keyset_counters WHERE keyset_id = ?1",
            params![keyset_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| StorageError::Database(e.to_string()))?;
    Ok(KeysetCounter {
        counter: counter.unwrap_or(0) as u64,
    })
}

/// Advance (or create) the per-keyset counter. Must be called in the same
/// tx as the swap that produced the outputs consuming it.
pub fn set_keyset_counter(
    tx: &Transaction<'_>,
    keyset_id: &str,
    counter: u64,
) -> StorageResult<()> {
    tx.execute(
        "INSERT INTO keyset_counters (keyset_id, counter) VALUES (?1, ?2)
         ON CONFLICT(keyset_id) DO UPDATE SET counter = excluded.counter",
        params![keyset_id, counter as i64],
    )
    .map_err(|e| StorageError::Database(e.to_string()))?;
    Ok(())
}

pub fn add_trusted_mint(tx: &Transaction<'_>, url: &str, created_at: i64) -> StorageResult<()> {
    tx.execute(
        "INSERT OR IGNORE INTO trusted_mints (url, created_at) VALUES (?1, ?2)",
        params![url, created_at],
    )
    .map_err(|e| StorageError::Database(e.to_string()))?;
    Ok(())
}

fn is_duplicate(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(err, _) if err.extended_code == 1555 || err.extended_code == 2067)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_blob(hash: &str) -> Blob {
        let mut sha256 = [0u8; 32];
        let bytes = hex::decode(hash).unwrap();
        sha256.copy_from_slice(&bytes);
        Blob {
            sha256,
            size: 2048,
            path: format!("/data/{hash}"),
            created_at: 1_700_000_000,
            pubkey: String::new(),
            content_type: "application/octet-stream".into(),
        }
    }

    #[tokio::test]
    async fn insert_and_get_blob() {
        let store = SqliteStore::in_memory().unwrap();
        let hash = "a".repeat(64);
        let blob = sample_blob(&hash);

        store
            .transaction({
                let blob = blob.clone();
                move |tx| insert_blob(tx, &blob)
            })
            .await
            .unwrap();

        let fetched = store.get_blob(&hash).await.unwrap().unwrap();
        assert_eq!(fetched.size, 2048);
    }

    #[tokio::test]
    async fn duplicate_blob_insert_is_rejected() {
        let store = SqliteStore::in_memory().unwrap();
        let hash = "b".repeat(64);

        store
            .transaction({
                let blob = sample_blob(&hash);
                move |tx| insert_blob(tx, &blob)
            })
            .await
            .unwrap();

        let result = store
            .transaction({
                let blob = sample_blob(&hash);
                move |tx| insert_blob(tx, &blob)
            })
            .await;

        assert!(matches!(result, Err(StorageError::Duplicate(_))));
    }

    #[tokio::test]
    async fn rotation_keeps_exactly_one_active_version() {
        let store = SqliteStore::in_memory().unwrap();

        let first = store
            .transaction(|tx| rotate_pubkey(tx, 1_700_003_600))
            .await
            .unwrap();
        assert_eq!(first.version, 1);

        let second = store
            .transaction(|tx| rotate_pubkey(tx, 1_700_007_200))
            .await
            .unwrap();
        assert_eq!(second.version, 2);

        let active = store
            .transaction(|tx| get_active_pubkey_version(tx))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(active.version, 2);
    }

    #[tokio::test]
    async fn duplicate_proof_c_is_detected() {
        let store = SqliteStore::in_memory().unwrap();
        let proof = LockedProof {
            amount: 10,
            keyset_id: "00deadbeef".into(),
            secret: "{}".into(),
            c: "02".to_string() + &"c".repeat(64),
            witness: None,
            redeemed: false,
            created_at: 1_700_000_000,
            pubkey_version: 1,
            mint: "https://mint.example".into(),
        };

        store
            .transaction({
                let proof = proof.clone();
                move |tx| insert_locked_proofs(tx, &[proof])
            })
            .await
            .unwrap();

        let seen = store
            .transaction({
                let c = proof.c.clone();
                move |tx| proof_c_exists(tx, &c)
            })
            .await
            .unwrap();
        assert!(seen);
    }

    #[tokio::test]
    async fn keyset_counter_advances_monotonically() {
        let store = SqliteStore::in_memory().unwrap();

        store
            .transaction(|tx| set_keyset_counter(tx, "00abc", 5))
            .await
            .unwrap();
        let counter = store
            .transaction(|tx| get_keyset_counter(tx, "00abc"))
            .await
            .unwrap();
        assert_eq!(counter.counter, 5);

        store
            .transaction(|tx| set_keyset_counter(tx, "00abc", 9))
            .await
            .unwrap();
        let counter = store
            .transaction(|tx| get_keyset_counter(tx, "00abc"))
            .await
            .unwrap();
        assert_eq!(counter.counter, 9);
    }
}
