// In-memory report store
use crate::application::report_store::{ReportStore, StoreError};
use crate::domain::report::{NewReport, ReportQuery, StoredReport};
use async_trait::async_trait;
use parking_lot::Mutex;

#[derive(Debug, Default)]
struct MemoryState {
    next_id: i64,
    rows: Vec<StoredReport>,
}

/// Process-local store. Rows live as long as the process does.
#[derive(Debug, Default)]
pub struct MemoryReportStore {
    state: Mutex<MemoryState>,
}

impl MemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.state.lock().rows.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ReportStore for MemoryReportStore {
    async fn insert(&self, report: &NewReport) -> Result<i64, StoreError> {
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = state.next_id;
        state.rows.push(StoredReport::from_new(id, report));
        Ok(id)
    }

    async fn query(&self, query: &ReportQuery) -> Result<Vec<StoredReport>, StoreError> {
        let state = self.state.lock();
        let mut rows: Vec<StoredReport> = state
            .rows
            .iter()
            .filter(|row| query.matches(row))
            .cloned()
            .collect();
        rows.sort_by_key(|row| (row.bucket_start, row.id));
        Ok(rows)
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        let before = state.rows.len();
        state.rows.retain(|row| row.id != id);
        if state.rows.len() == before {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn delete_all(&self) -> Result<(), StoreError> {
        self.state.lock().rows.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::report::ReportType;
    use chrono::NaiveDate;

    fn hour_report(hour: u32, calorie_total: i32) -> NewReport {
        NewReport {
            report_type: ReportType::Hour,
            bucket_start: NaiveDate::from_ymd_opt(2024, 5, 10)
                .unwrap()
                .and_hms_opt(hour, 0, 0)
                .unwrap(),
            year: 2024,
            month: 4,
            day: 9,
            hour,
            calorie_total,
        }
    }

    #[tokio::test]
    async fn test_ids_are_assigned_in_order() {
        let store = MemoryReportStore::new();
        assert_eq!(store.insert(&hour_report(3, 10)).await.unwrap(), 1);
        assert_eq!(store.insert(&hour_report(4, 10)).await.unwrap(), 2);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_query_sorts_by_bucket_start() {
        let store = MemoryReportStore::new();
        store.insert(&hour_report(7, 70)).await.unwrap();
        store.insert(&hour_report(2, 20)).await.unwrap();

        let rows = store
            .query(&ReportQuery::new(ReportType::Hour, 2024).month(4).day(9))
            .await
            .unwrap();
        let hours: Vec<u32> = rows.iter().map(|r| r.hour).collect();
        assert_eq!(hours, vec![2, 7]);
    }

    #[tokio::test]
    async fn test_delete_unknown_id() {
        let store = MemoryReportStore::new();
        assert!(matches!(store.delete(9).await, Err(StoreError::NotFound(9))));
    }
}
