use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{StoreError, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Accepted,
    NeedsReview,
    Rejected,
    Failed,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Accepted => "accepted",
            RecordStatus::NeedsReview => "needs_review",
            RecordStatus::Rejected => "rejected",
            RecordStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "accepted" => Some(RecordStatus::Accepted),
            "needs_review" => Some(RecordStatus::NeedsReview),
            "rejected" => Some(RecordStatus::Rejected),
            "failed" => Some(RecordStatus::Failed),
            _ => None,
        }
    }
}

/// Job record for one generation, keyed by request fingerprint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub key: String,
    pub run_id: Uuid,
    pub template_id: String,
    pub status: RecordStatus,
    pub fields: Option<Value>,
    pub quality_score: Option<f64>,
    pub attempts: u32,
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl GenerationRecord {
    pub fn new(key: impl Into<String>, template_id: impl Into<String>, status: RecordStatus) -> Self {
        Self {
            key: key.into(),
            run_id: Uuid::new_v4(),
            template_id: template_id.into(),
            status,
            fields: None,
            quality_score: None,
            attempts: 0,
            error: None,
            updated_at: Utc::now(),
        }
    }
}

/// Key-based upsert interface to wherever generated content is persisted.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn upsert(&self, record: GenerationRecord) -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Option<GenerationRecord>, StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryContentStore {
    records: DashMap<String, GenerationRecord>,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn upsert(&self, record: GenerationRecord) -> Result<(), StoreError> {
        if record.key.trim().is_empty() {
            return Err(StoreError::InvalidKey(record.key));
        }
        self.records.insert(record.key.clone(), record);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<GenerationRecord>, StoreError> {
        Ok(self.records.get(key).map(|record| record.clone()))
    }
}
