//! SQLite implementation of the document store
//!
//! Durable across restarts; the recovery sweep depends on this surviving a
//! crash while the in-memory queue does not.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::analysis::{AnalysisResult, Confidence, DetectedFields, DocumentType};
use crate::types::document::{
    DocumentFilter, DocumentRecord, DocumentStats, DocumentStatus, NewDocument,
};

use super::DocumentStore;

/// SQLite-backed document store
pub struct SqliteDocumentStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteDocumentStore {
    /// Create or open the database at the given path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)
            .map_err(|e| Error::Database(format!("Failed to open database: {}", e)))?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.migrate()?;
        Ok(store)
    }

    /// Create an in-memory database (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Database(format!("Failed to open in-memory database: {}", e)))?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.migrate()?;
        Ok(store)
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            "#,
        )
        .map_err(|e| Error::Database(format!("Failed to set pragmas: {}", e)))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                file_name TEXT NOT NULL,
                file_type TEXT NOT NULL,
                media_type TEXT NOT NULL,
                file_size INTEGER NOT NULL,
                file_path TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                attempts INTEGER NOT NULL DEFAULT 0,
                error_message TEXT,
                document_type TEXT,
                summary TEXT,
                extracted_text TEXT,
                detected_fields TEXT,
                confidence TEXT,
                analyzed_by TEXT,
                uploaded_by TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_documents_status ON documents(status);
            CREATE INDEX IF NOT EXISTS idx_documents_type ON documents(document_type);
            CREATE INDEX IF NOT EXISTS idx_documents_created ON documents(created_at);
            "#,
        )
        .map_err(|e| Error::Database(format!("Failed to run migrations: {}", e)))?;

        tracing::debug!("Document store migrations complete");
        Ok(())
    }

    fn row_to_record(row: &Row<'_>) -> rusqlite::Result<DocumentRecord> {
        let id: String = row.get("id")?;
        let status: String = row.get("status")?;
        let file_path: String = row.get("file_path")?;
        let created_at: String = row.get("created_at")?;
        let updated_at: String = row.get("updated_at")?;

        let document_type: Option<String> = row.get("document_type")?;
        let analysis = match document_type {
            Some(doc_type) => {
                let detected_json: Option<String> = row.get("detected_fields")?;
                let detected_fields = detected_json
                    .and_then(|json| serde_json::from_str::<DetectedFields>(&json).ok())
                    .unwrap_or_default();
                let confidence: Option<String> = row.get("confidence")?;
                Some(AnalysisResult {
                    document_type: DocumentType::parse(&doc_type),
                    summary: row.get::<_, Option<String>>("summary")?.unwrap_or_default(),
                    extracted_text: row
                        .get::<_, Option<String>>("extracted_text")?
                        .unwrap_or_default(),
                    detected_fields,
                    confidence: confidence
                        .map(|c| Confidence::parse(&c))
                        .unwrap_or_default(),
                    analyzed_by: row
                        .get::<_, Option<String>>("analyzed_by")?
                        .unwrap_or_default(),
                })
            }
            None => None,
        };

        Ok(DocumentRecord {
            id: Uuid::parse_str(&id).unwrap_or_default(),
            file_name: row.get("file_name")?,
            file_type: row.get("file_type")?,
            media_type: row.get("media_type")?,
            file_size: row.get::<_, i64>("file_size")? as u64,
            file_path: PathBuf::from(file_path),
            status: DocumentStatus::parse(&status).unwrap_or(DocumentStatus::Failed),
            attempts: row.get::<_, i64>("attempts")? as u32,
            error_message: row.get("error_message")?,
            analysis,
            uploaded_by: row.get("uploaded_by")?,
            created_at: created_at.parse().unwrap_or_else(|_| Utc::now()),
            updated_at: updated_at.parse().unwrap_or_else(|_| Utc::now()),
        })
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn create_record(&self, doc: &NewDocument) -> Result<DocumentRecord> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let conn = self.conn.lock();

        conn.execute(
            r#"
            INSERT INTO documents (
                id, file_name, file_type, media_type, file_size, file_path,
                status, attempts, uploaded_by, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', 0, ?7, ?8, ?9)
            "#,
            params![
                id.to_string(),
                doc.file_name,
                doc.file_type,
                doc.media_type,
                doc.file_size as i64,
                doc.file_path.to_string_lossy(),
                doc.uploaded_by,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )?;

        Ok(DocumentRecord {
            id,
            file_name: doc.file_name.clone(),
            file_type: doc.file_type.clone(),
            media_type: doc.media_type.clone(),
            file_size: doc.file_size,
            file_path: doc.file_path.clone(),
            status: DocumentStatus::Pending,
            attempts: 0,
            error_message: None,
            analysis: None,
            uploaded_by: doc.uploaded_by.clone(),
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_record(&self, id: Uuid) -> Result<Option<DocumentRecord>> {
        let conn = self.conn.lock();
        let record = conn
            .query_row(
                "SELECT * FROM documents WHERE id = ?1",
                params![id.to_string()],
                Self::row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    async fn list_records(&self, filter: &DocumentFilter) -> Result<(Vec<DocumentRecord>, u64)> {
        let mut conditions = Vec::new();
        let mut values: Vec<String> = Vec::new();

        if let Some(status) = filter.status {
            conditions.push(format!("status = ?{}", values.len() + 1));
            values.push(status.as_str().to_string());
        }
        if let Some(ref doc_type) = filter.document_type {
            conditions.push(format!("document_type = ?{}", values.len() + 1));
            values.push(doc_type.clone());
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };

        let conn = self.conn.lock();

        let total: u64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM documents{}", where_clause),
            rusqlite::params_from_iter(values.iter()),
            |row| row.get::<_, i64>(0),
        )? as u64;

        let limit = if filter.limit == 0 { 50 } else { filter.limit };
        let sql = format!(
            "SELECT * FROM documents{} ORDER BY created_at DESC LIMIT {} OFFSET {}",
            where_clause, limit, filter.offset
        );

        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map(rusqlite::params_from_iter(values.iter()), Self::row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok((records, total))
    }

    async fn stats(&self) -> Result<DocumentStats> {
        let conn = self.conn.lock();

        let total: u64 =
            conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get::<_, i64>(0))? as u64;

        let mut by_status = HashMap::new();
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM documents GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
        })?;
        for row in rows {
            let (status, count) = row?;
            by_status.insert(status, count);
        }

        let mut by_type = HashMap::new();
        let mut stmt = conn.prepare(
            "SELECT COALESCE(document_type, 'unknown'), COUNT(*) FROM documents GROUP BY document_type",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
        })?;
        for row in rows {
            let (doc_type, count) = row?;
            by_type.insert(doc_type, count);
        }

        Ok(DocumentStats {
            total,
            by_status,
            by_type,
        })
    }

    async fn set_status(
        &self,
        id: Uuid,
        status: DocumentStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE documents SET status = ?1, error_message = ?2, updated_at = ?3 WHERE id = ?4",
            params![
                status.as_str(),
                error_message,
                Utc::now().to_rfc3339(),
                id.to_string()
            ],
        )?;
        Ok(())
    }

    async fn complete_record(&self, id: Uuid, result: &AnalysisResult) -> Result<()> {
        let detected_json = serde_json::to_string(&result.detected_fields)?;
        let conn = self.conn.lock();
        conn.execute(
            r#"
            UPDATE documents SET
                status = 'completed',
                error_message = NULL,
                document_type = ?1,
                summary = ?2,
                extracted_text = ?3,
                detected_fields = ?4,
                confidence = ?5,
                analyzed_by = ?6,
                updated_at = ?7
            WHERE id = ?8
            "#,
            params![
                result.document_type.as_str(),
                result.summary,
                result.extracted_text,
                detected_json,
                result.confidence.as_str(),
                result.analyzed_by,
                Utc::now().to_rfc3339(),
                id.to_string(),
            ],
        )?;
        Ok(())
    }

    async fn increment_attempts(&self, id: Uuid) -> Result<u32> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE documents SET attempts = attempts + 1, updated_at = ?1 WHERE id = ?2",
            params![Utc::now().to_rfc3339(), id.to_string()],
        )?;
        let attempts: i64 = conn.query_row(
            "SELECT attempts FROM documents WHERE id = ?1",
            params![id.to_string()],
            |row| row.get(0),
        )?;
        Ok(attempts as u32)
    }

    async fn records_needing_recovery(&self, attempt_ceiling: u32) -> Result<Vec<DocumentRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r#"
            SELECT * FROM documents
            WHERE status IN ('pending', 'processing') AND attempts < ?1
            ORDER BY created_at ASC
            "#,
        )?;
        let records = stmt
            .query_map(params![attempt_ceiling as i64], Self::row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    async fn delete_record(&self, id: Uuid) -> Result<bool> {
        let conn = self.conn.lock();
        let deleted = conn.execute(
            "DELETE FROM documents WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_doc(name: &str) -> NewDocument {
        NewDocument {
            file_name: name.to_string(),
            file_type: "pdf".to_string(),
            media_type: "application/pdf".to_string(),
            file_size: 1234,
            file_path: PathBuf::from(format!("/tmp/uploads/{}", name)),
            uploaded_by: Some("admin".to_string()),
        }
    }

    #[tokio::test]
    async fn create_and_get_round_trip() {
        let store = SqliteDocumentStore::in_memory().unwrap();
        let created = store.create_record(&new_doc("a.pdf")).await.unwrap();

        let fetched = store.get_record(created.id).await.unwrap().unwrap();
        assert_eq!(fetched.file_name, "a.pdf");
        assert_eq!(fetched.status, DocumentStatus::Pending);
        assert_eq!(fetched.attempts, 0);
        assert!(fetched.analysis.is_none());
    }

    #[tokio::test]
    async fn attempts_increment_monotonically() {
        let store = SqliteDocumentStore::in_memory().unwrap();
        let record = store.create_record(&new_doc("a.pdf")).await.unwrap();

        assert_eq!(store.increment_attempts(record.id).await.unwrap(), 1);
        assert_eq!(store.increment_attempts(record.id).await.unwrap(), 2);
        assert_eq!(store.increment_attempts(record.id).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn complete_clears_error_and_stores_result() {
        let store = SqliteDocumentStore::in_memory().unwrap();
        let record = store.create_record(&new_doc("a.pdf")).await.unwrap();

        store
            .set_status(record.id, DocumentStatus::Pending, Some("attempt 1 failed"))
            .await
            .unwrap();

        let result = AnalysisResult {
            document_type: DocumentType::Invoice,
            summary: "An invoice.".to_string(),
            extracted_text: "Total: $5".to_string(),
            detected_fields: DetectedFields {
                amounts: vec!["$5".to_string()],
                ..Default::default()
            },
            confidence: Confidence::High,
            analyzed_by: "gemini-2.0-flash".to_string(),
        };
        store.complete_record(record.id, &result).await.unwrap();

        let fetched = store.get_record(record.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, DocumentStatus::Completed);
        assert!(fetched.error_message.is_none());
        let analysis = fetched.analysis.unwrap();
        assert_eq!(analysis.document_type, DocumentType::Invoice);
        assert_eq!(analysis.detected_fields.amounts, vec!["$5"]);
    }

    #[tokio::test]
    async fn recovery_listing_respects_status_and_ceiling() {
        let store = SqliteDocumentStore::in_memory().unwrap();

        let stuck = store.create_record(&new_doc("stuck.pdf")).await.unwrap();
        store.increment_attempts(stuck.id).await.unwrap();
        store
            .set_status(stuck.id, DocumentStatus::Processing, None)
            .await
            .unwrap();

        let exhausted = store.create_record(&new_doc("exhausted.pdf")).await.unwrap();
        for _ in 0..3 {
            store.increment_attempts(exhausted.id).await.unwrap();
        }
        store
            .set_status(exhausted.id, DocumentStatus::Processing, None)
            .await
            .unwrap();

        let done = store.create_record(&new_doc("done.pdf")).await.unwrap();
        store
            .set_status(done.id, DocumentStatus::Completed, None)
            .await
            .unwrap();

        let needing = store.records_needing_recovery(3).await.unwrap();
        let ids: Vec<Uuid> = needing.iter().map(|r| r.id).collect();
        assert!(ids.contains(&stuck.id));
        assert!(!ids.contains(&exhausted.id));
        assert!(!ids.contains(&done.id));
    }

    #[tokio::test]
    async fn list_filters_by_status() {
        let store = SqliteDocumentStore::in_memory().unwrap();
        let a = store.create_record(&new_doc("a.pdf")).await.unwrap();
        let _b = store.create_record(&new_doc("b.pdf")).await.unwrap();
        store
            .set_status(a.id, DocumentStatus::Failed, Some("boom"))
            .await
            .unwrap();

        let filter = DocumentFilter {
            status: Some(DocumentStatus::Failed),
            ..Default::default()
        };
        let (records, total) = store.list_records(&filter).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, a.id);
    }

    #[tokio::test]
    async fn delete_removes_record() {
        let store = SqliteDocumentStore::in_memory().unwrap();
        let record = store.create_record(&new_doc("a.pdf")).await.unwrap();
        assert!(store.delete_record(record.id).await.unwrap());
        assert!(!store.delete_record(record.id).await.unwrap());
        assert!(store.get_record(record.id).await.unwrap().is_none());
    }
}
