use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Result as SqlResult, params};

use super::RemoteStore;
use crate::common::Document;
use crate::error::StoreError;

/// Base database connection wrapper
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn new<P: AsRef<Path>>(path: P) -> SqlResult<Self> {
        let conn = Connection::open(path)?;
        Ok(Self { conn })
    }

    pub fn in_memory() -> SqlResult<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

/// Single-document store backed by a local SQLite file, so several processes
/// on one machine can share a log. Each named document is one row holding
/// the JSON blob.
pub struct SqliteStore {
    db: Arc<Mutex<Database>>,
    document: String,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P, document: &str) -> Result<Self, StoreError> {
        let db = Database::new(path).map_err(sql_error)?;
        Self::with_database(db, document)
    }

    pub fn in_memory(document: &str) -> Result<Self, StoreError> {
        let db = Database::in_memory().map_err(sql_error)?;
        Self::with_database(db, document)
    }

    fn with_database(db: Database, document: &str) -> Result<Self, StoreError> {
        init_schema(&db).map_err(sql_error)?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            document: document.to_string(),
        })
    }

    async fn run_blocking<T, F>(&self, job: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection, &str) -> SqlResult<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        let document = self.document.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db
                .lock()
                .map_err(|_| StoreError::Storage("database mutex poisoned".to_string()))?;
            job(guard.connection(), &document).map_err(sql_error)
        })
        .await
        .map_err(|err| StoreError::Storage(format!("blocking task failed: {err}")))?
    }
}

fn init_schema(db: &Database) -> SqlResult<()> {
    db.connection().execute(
        "CREATE TABLE IF NOT EXISTS documents (
            name TEXT PRIMARY KEY,
            body TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        )",
        [],
    )?;
    Ok(())
}

fn sql_error(err: rusqlite::Error) -> StoreError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == rusqlite::ErrorCode::DatabaseBusy
                || failure.code == rusqlite::ErrorCode::DatabaseLocked =>
        {
            // Another process holds the file; back off like a rate limit.
            StoreError::Network(format!("database busy: {err}"))
        }
        _ => StoreError::Storage(err.to_string()),
    }
}

#[async_trait]
impl RemoteStore for SqliteStore {
    async fn read(&self) -> Result<Option<Document>, StoreError> {
        let body = self
            .run_blocking(|conn, name| {
                conn.query_row(
                    "SELECT body FROM documents WHERE name = ?1",
                    params![name],
                    |row| row.get::<_, String>(0),
                )
                .optional()
            })
            .await?;

        body.map(|body| Document::from_slice(body.as_bytes()))
            .transpose()
    }

    async fn write(&self, document: &Document) -> Result<(), StoreError> {
        let body = document.to_json()?;
        let updated_at = Utc::now().timestamp_millis();
        self.run_blocking(move |conn, name| {
            conn.execute(
                "INSERT OR REPLACE INTO documents (name, body, updated_at)
                 VALUES (?1, ?2, ?3)",
                params![name, body, updated_at],
            )
        })
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::StoredMessage;

    #[tokio::test]
    async fn missing_document_reads_as_absent() {
        let store = SqliteStore::in_memory("messages").unwrap();
        assert_eq!(store.read().await.unwrap(), None);
    }

    #[tokio::test]
    async fn write_then_read_returns_same_messages() {
        let store = SqliteStore::in_memory("messages").unwrap();
        let doc = Document::new()
            .with_appended("alice", StoredMessage::at("hi", 1))
            .with_appended("bob", StoredMessage::at("yo", 2));

        store.write(&doc).await.unwrap();
        let read = store.read().await.unwrap().unwrap();
        assert_eq!(read.flatten(), doc.flatten());
    }

    #[tokio::test]
    async fn write_replaces_previous_body() {
        let store = SqliteStore::in_memory("messages").unwrap();
        let first = Document::new().with_appended("alice", StoredMessage::at("one", 1));
        let second = Document::new().with_appended("bob", StoredMessage::at("two", 2));

        store.write(&first).await.unwrap();
        store.write(&second).await.unwrap();

        let read = store.read().await.unwrap().unwrap();
        assert_eq!(read, second);
    }

    #[tokio::test]
    async fn corrupt_body_is_malformed() {
        let store = SqliteStore::in_memory("messages").unwrap();
        store
            .run_blocking(|conn, name| {
                conn.execute(
                    "INSERT INTO documents (name, body, updated_at) VALUES (?1, '[]', 0)",
                    params![name],
                )
            })
            .await
            .unwrap();

        assert!(matches!(
            store.read().await,
            Err(StoreError::Malformed(_))
        ));
    }
}
