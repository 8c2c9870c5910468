//! Research history storage and management

use crate::audit::AuditLog;
use crate::engine::{PipelineFailure, PipelineRun};
use crate::{ResearchError, ResearchResult};
use chrono::{DateTime, Utc};
use deepcite_core::{ResearchDepth, ResearchState};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Persisted record of one research run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchHistoryRecord {
    /// Research session ID
    pub session_id: String,
    /// Query as the user typed it
    pub original_query: String,
    /// Query after correction passes
    pub final_query: String,
    pub status: ResearchStatus,
    /// State of the last completed stage
    pub state: ResearchState,
    pub audit: AuditLog,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub metadata: ResearchMetadata,
}

/// Research status enumeration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ResearchStatus {
    /// Research completed successfully
    Completed,
    /// Research was cancelled
    Cancelled,
    /// Research failed with error
    Failed(String),
}

impl std::fmt::Display for ResearchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResearchStatus::Completed => f.write_str("completed"),
            ResearchStatus::Cancelled => f.write_str("cancelled"),
            ResearchStatus::Failed(_) => f.write_str("failed"),
        }
    }
}

/// Research metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchMetadata {
    /// Research iterations performed
    pub total_iterations: usize,
    /// Unique sources gathered
    pub total_sources: usize,
    pub depth: ResearchDepth,
    /// Research duration in seconds
    pub duration_seconds: Option<u64>,
}

impl ResearchHistoryRecord {
    /// Build a record from a finished run
    pub fn from_run(run: &PipelineRun, status: ResearchStatus) -> Self {
        let now = Utc::now();
        Self {
            session_id: run.session_id.clone(),
            original_query: run.state.original_query.clone(),
            final_query: run.state.query.clone(),
            status,
            state: run.state.clone(),
            audit: run.audit.clone(),
            created_at: run.started_at,
            updated_at: now,
            completed_at: run.finished_at,
            metadata: ResearchMetadata {
                total_iterations: run.state.current_iteration,
                total_sources: run.state.research_data.len(),
                depth: run.state.research_depth,
                duration_seconds: run.duration().map(|d| d.num_seconds().max(0) as u64),
            },
        }
    }

    /// Build a record from a run that stopped early
    pub fn from_failure(failure: &PipelineFailure) -> Self {
        let status = if failure.is_cancelled() {
            ResearchStatus::Cancelled
        } else {
            ResearchStatus::Failed(failure.error.to_string())
        };
        Self::from_run(&failure.run, status)
    }
}

/// Research history storage interface
#[allow(async_fn_in_trait)]
pub trait ResearchHistoryStorage: Send + Sync {
    /// Save research record
    async fn save_record(&self, record: &ResearchHistoryRecord) -> ResearchResult<()>;

    /// Load research record by session ID
    async fn load_record(&self, session_id: &str) -> ResearchResult<Option<ResearchHistoryRecord>>;

    /// List research records, newest first
    async fn list_records(
        &self,
        filters: &ResearchHistoryFilters,
    ) -> ResearchResult<Vec<ResearchHistoryRecord>>;

    /// Delete research record, returning whether it existed
    async fn delete_record(&self, session_id: &str) -> ResearchResult<bool>;
}

/// Research history filters
#[derive(Debug, Clone, Default)]
pub struct ResearchHistoryFilters {
    /// Filter by status
    pub status: Option<ResearchStatus>,
    /// Limit number of results
    pub limit: Option<usize>,
    /// Offset for pagination
    pub offset: Option<usize>,
}

impl ResearchHistoryFilters {
    /// Filters selecting one page of `page_size` records (pages start at 1)
    pub fn page(page: usize, page_size: usize) -> Self {
        Self {
            status: None,
            limit: Some(page_size),
            offset: Some(page.saturating_sub(1) * page_size),
        }
    }
}

/// File-based research history storage
///
/// Clones share one index lock, so sessions saved concurrently from the same
/// storage handle never drop each other's index entries.
#[derive(Debug, Clone)]
pub struct FileResearchHistoryStorage {
    storage_dir: PathBuf,
    index_lock: Arc<Mutex<()>>,
}

/// Research index for fast lookups
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct ResearchIndex {
    sessions: HashMap<String, ResearchIndexEntry>,
    last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ResearchIndexEntry {
    session_id: String,
    original_query: String,
    status: ResearchStatus,
    created_at: DateTime<Utc>,
    /// File size in bytes
    file_size: u64,
}

impl FileResearchHistoryStorage {
    /// Create new file-based storage
    pub fn new<P: AsRef<Path>>(storage_dir: P) -> ResearchResult<Self> {
        let storage_dir = storage_dir.as_ref().to_path_buf();

        if !storage_dir.exists() {
            std::fs::create_dir_all(&storage_dir)?;
            info!(
                "Created research history storage directory: {}",
                storage_dir.display()
            );
        }

        Ok(Self {
            storage_dir,
            index_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    fn record_path(&self, session_id: &str) -> ResearchResult<PathBuf> {
        // Session IDs are UUIDs; anything else could escape the directory
        let valid = !session_id.is_empty()
            && session_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !valid {
            return Err(ResearchError::history(format!(
                "Invalid session id: {}",
                session_id
            )));
        }
        Ok(self.storage_dir.join(format!("{}.json", session_id)))
    }

    fn index_path(&self) -> PathBuf {
        self.storage_dir.join("index.json")
    }

    async fn load_index(&self) -> ResearchResult<ResearchIndex> {
        let index_path = self.index_path();

        if index_path.exists() {
            let content = tokio::fs::read_to_string(&index_path).await?;
            Ok(serde_json::from_str(&content)?)
        } else {
            Ok(ResearchIndex::default())
        }
    }

    /// Write the index beside its final path and rename it into place
    async fn save_index(&self, index: &ResearchIndex) -> ResearchResult<()> {
        let content = serde_json::to_string_pretty(index)?;
        let tmp_path = self.storage_dir.join("index.json.tmp");
        tokio::fs::write(&tmp_path, content).await?;
        tokio::fs::rename(&tmp_path, self.index_path()).await?;
        Ok(())
    }
}

impl ResearchHistoryStorage for FileResearchHistoryStorage {
    async fn save_record(&self, record: &ResearchHistoryRecord) -> ResearchResult<()> {
        let record_path = self.record_path(&record.session_id)?;
        let content = serde_json::to_string_pretty(record)?;
        tokio::fs::write(&record_path, &content).await?;

        let _guard = self.index_lock.lock().await;
        let mut index = self.load_index().await?;
        index.sessions.insert(
            record.session_id.clone(),
            ResearchIndexEntry {
                session_id: record.session_id.clone(),
                original_query: record.original_query.clone(),
                status: record.status.clone(),
                created_at: record.created_at,
                file_size: content.len() as u64,
            },
        );
        index.last_updated = Utc::now();
        self.save_index(&index).await?;

        debug!("Saved research record: {}", record.session_id);
        Ok(())
    }

    async fn load_record(&self, session_id: &str) -> ResearchResult<Option<ResearchHistoryRecord>> {
        let record_path = self.record_path(session_id)?;

        if !record_path.exists() {
            return Ok(None);
        }

        let content = tokio::fs::read_to_string(&record_path).await?;
        let record: ResearchHistoryRecord = serde_json::from_str(&content)?;

        debug!("Loaded research record: {}", session_id);
        Ok(Some(record))
    }

    async fn list_records(
        &self,
        filters: &ResearchHistoryFilters,
    ) -> ResearchResult<Vec<ResearchHistoryRecord>> {
        let index = {
            let _guard = self.index_lock.lock().await;
            self.load_index().await?
        };
        let mut entries: Vec<_> = index.sessions.values().collect();

        if let Some(ref status) = filters.status {
            entries.retain(|entry| &entry.status == status);
        }

        // Newest first
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let offset = filters.offset.unwrap_or(0);
        let limit = filters.limit.unwrap_or(usize::MAX);

        let mut records = Vec::new();
        for entry in entries.into_iter().skip(offset).take(limit) {
            match self.load_record(&entry.session_id).await {
                Ok(Some(record)) => records.push(record),
                Ok(None) => warn!("Indexed record missing on disk: {}", entry.session_id),
                Err(e) => warn!("Skipping unreadable record {}: {}", entry.session_id, e),
            }
        }

        Ok(records)
    }

    async fn delete_record(&self, session_id: &str) -> ResearchResult<bool> {
        let record_path = self.record_path(session_id)?;
        let existed = record_path.exists();

        if existed {
            tokio::fs::remove_file(&record_path).await?;
        }

        let _guard = self.index_lock.lock().await;
        let mut index = self.load_index().await?;
        let indexed = index.sessions.remove(session_id).is_some();
        index.last_updated = Utc::now();
        self.save_index(&index).await?;

        debug!("Deleted research record: {}", session_id);
        Ok(existed || indexed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn page_filters_use_one_based_pages() {
        let first = ResearchHistoryFilters::page(1, 10);
        assert_eq!(first.offset, Some(0));
        assert_eq!(first.limit, Some(10));

        let third = ResearchHistoryFilters::page(3, 10);
        assert_eq!(third.offset, Some(20));

        assert_eq!(ResearchHistoryFilters::page(0, 10).offset, Some(0));
    }

    #[tokio::test]
    async fn rejects_path_like_session_ids() {
        let dir = TempDir::new().unwrap();
        let storage = FileResearchHistoryStorage::new(dir.path()).unwrap();

        let result = storage.load_record("../secrets").await;
        assert!(matches!(result, Err(ResearchError::History { .. })));
    }

    #[tokio::test]
    async fn missing_records_load_as_none() {
        let dir = TempDir::new().unwrap();
        let storage = FileResearchHistoryStorage::new(dir.path().join("nested")).unwrap();

        assert!(storage.storage_dir().exists());
        assert!(storage.load_record("0000-1111").await.unwrap().is_none());
        assert!(!storage.delete_record("0000-1111").await.unwrap());
        assert!(storage
            .list_records(&ResearchHistoryFilters::default())
            .await
            .unwrap()
            .is_empty());
    }
}
