// Repository trait for persisted activity reports
use crate::domain::report::{NewReport, ReportQuery, StoredReport};
use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("report store rejected the write: {0}")]
    Rejected(String),
    #[error("no report with id {0}")]
    NotFound(i64),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Persist a closed bucket, returning the id of the new row
    async fn insert(&self, report: &NewReport) -> Result<i64, StoreError>;

    /// Rows matching the query, oldest bucket first
    async fn query(&self, query: &ReportQuery) -> Result<Vec<StoredReport>, StoreError>;

    async fn delete(&self, id: i64) -> Result<(), StoreError>;

    async fn delete_all(&self) -> Result<(), StoreError>;
}
