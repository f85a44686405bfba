//! SQLite persistence for the session registry.
//!
//! One row per session at `{data_dir}/bindery.db`, WAL mode. The stored
//! `structure` column is the last snapshot serialized as JSON, a
//! historical record, not a cache: every read path rescans the directory
//! before returning.

use std::path::Path;
use std::str::FromStr;

use anyhow::{Context as _, Result};
use sqlx::{sqlite::SqliteConnectOptions, SqlitePool};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SessionRow {
    pub session_id: String,
    /// Canonical absolute path of the bound directory.
    pub folder_path: String,
    /// JSON-serialized `Vec<Node>` snapshot from the last successful scan.
    pub structure: String,
    /// Unix epoch seconds.
    pub created_at: i64,
}

pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    /// Open (or create) the database under `data_dir` and run migrations.
    pub async fn open(data_dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(data_dir).await?;
        let db_path = data_dir.join("bindery.db");
        let opts =
            SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", db_path.display()))?
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .create_if_missing(true);
        let pool = SqlitePool::connect_with(opts).await?;
        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    /// In-memory database for tests.
    pub async fn open_in_memory() -> Result<Self> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?.create_if_missing(true);
        let pool = SqlitePool::connect_with(opts).await?;
        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    async fn migrate(pool: &SqlitePool) -> Result<()> {
        sqlx::migrate!("src/storage/migrations")
            .run(pool)
            .await
            .context("failed to run database migrations")?;
        Ok(())
    }

    // ─── Sessions ────────────────────────────────────────────────────────────

    pub async fn insert_session(
        &self,
        session_id: &str,
        folder_path: &str,
        structure_json: &str,
        created_at: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO sessions (session_id, folder_path, structure, created_at) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(session_id)
        .bind(folder_path)
        .bind(structure_json)
        .bind(created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Option<SessionRow>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM sessions WHERE session_id = ?")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn find_by_folder(&self, folder_path: &str) -> Result<Option<SessionRow>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM sessions WHERE folder_path = ?")
            .bind(folder_path)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn list_sessions(&self) -> Result<Vec<SessionRow>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM sessions ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await
    }

    /// Persist a rename: new canonical path plus the fresh snapshot.
    pub async fn update_folder(
        &self,
        session_id: &str,
        folder_path: &str,
        structure_json: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE sessions SET folder_path = ?, structure = ? WHERE session_id = ?")
            .bind(folder_path)
            .bind(structure_json)
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Remove the bookkeeping row. Returns false when no row existed.
    /// Never touches the real directory.
    pub async fn delete_session(&self, session_id: &str) -> Result<bool, sqlx::Error> {
        let rows = sqlx::query("DELETE FROM sessions WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(rows > 0)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_and_get() {
        let s = Storage::open_in_memory().await.unwrap();
        s.insert_session("abcd1234", "/books/demo", "[]", 100)
            .await
            .unwrap();
        let row = s.get_session("abcd1234").await.unwrap().expect("row");
        assert_eq!(row.folder_path, "/books/demo");
        assert_eq!(row.structure, "[]");
        assert_eq!(row.created_at, 100);
    }

    #[tokio::test]
    async fn folder_path_is_unique() {
        let s = Storage::open_in_memory().await.unwrap();
        s.insert_session("one", "/books/demo", "[]", 1).await.unwrap();
        let dup = s.insert_session("two", "/books/demo", "[]", 2).await;
        assert!(dup.is_err(), "second row for the same folder must fail");
    }

    #[tokio::test]
    async fn find_by_folder() {
        let s = Storage::open_in_memory().await.unwrap();
        s.insert_session("one", "/books/a", "[]", 1).await.unwrap();
        let hit = s.find_by_folder("/books/a").await.unwrap();
        assert_eq!(hit.map(|r| r.session_id).as_deref(), Some("one"));
        assert!(s.find_by_folder("/books/b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_folder_rewrites_path_and_snapshot() {
        let s = Storage::open_in_memory().await.unwrap();
        s.insert_session("one", "/books/a", "[]", 1).await.unwrap();
        s.update_folder("one", "/books/b", "[{}]").await.unwrap();
        let row = s.get_session("one").await.unwrap().unwrap();
        assert_eq!(row.folder_path, "/books/b");
        assert_eq!(row.structure, "[{}]");
    }

    #[tokio::test]
    async fn delete_returns_whether_row_existed() {
        let s = Storage::open_in_memory().await.unwrap();
        s.insert_session("one", "/books/a", "[]", 1).await.unwrap();
        assert!(s.delete_session("one").await.unwrap());
        assert!(!s.delete_session("one").await.unwrap());
        assert!(s.get_session("one").await.unwrap().is_none());
    }
}
