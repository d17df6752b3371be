// Activity aggregator - Calendar buckets of burned calories
use crate::application::clock::Clock;
use crate::application::report_store::{ReportStore, StoreError};
use crate::domain::activity::ActivityReport;
use crate::domain::report::{BucketKind, NewReport, ReportQuery, ReportType, StoredReport};
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use parking_lot::Mutex;
use std::sync::Arc;

/// Zero-based calendar position of the buckets currently being filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketPointer {
    pub year: i32,
    pub month: usize,
    pub day: usize,
    pub hour: usize,
    pub minute: usize,
}

impl BucketPointer {
    pub fn at(time: NaiveDateTime) -> Self {
        Self {
            year: time.year(),
            month: time.month0() as usize,
            day: time.day0() as usize,
            hour: time.hour() as usize,
            minute: time.minute() as usize,
        }
    }

    /// Month rows are written with `day = 0, hour = 0` and start at 00:00:00 on
    /// the 1st. Databases exported from the phone app hold month rows with
    /// `day = 1` and a 00:00:01 start; month rows are keyed by month alone, so
    /// both layouts restore to the same slot.
    fn row_position(&self, report_type: ReportType) -> (u32, u32) {
        match report_type {
            ReportType::Month => (0, 0),
            ReportType::Day => (self.day as u32, 0),
            ReportType::Hour => (self.day as u32, self.hour as u32),
        }
    }

    fn bucket_start(&self, report_type: ReportType) -> Option<NaiveDateTime> {
        let (day, hour) = self.row_position(report_type);
        NaiveDate::from_ymd_opt(self.year, self.month as u32 + 1, day + 1)?.and_hms_opt(hour, 0, 0)
    }
}

struct BucketState {
    pointer: BucketPointer,
    months: [i32; 12],
    days: [i32; 31],
    hours: [i32; 24],
    minutes: [i32; 60],
}

impl BucketState {
    fn new(pointer: BucketPointer) -> Self {
        Self {
            pointer,
            months: [0; 12],
            days: [0; 31],
            hours: [0; 24],
            minutes: [0; 60],
        }
    }

    /// Fold one increment in, coarsest unit first. Returns the buckets closed
    /// by this call, valued before any clearing.
    ///
    /// A finer array is only cleared when the next coarser unit rolled: the
    /// month array on entering January, the day array on a month change, the
    /// hour array on a day change and the minute array on an hour change.
    fn apply(&mut self, calorie: f64, now: NaiveDateTime) -> Vec<NewReport> {
        let current = BucketPointer::at(now);
        let previous = self.pointer;
        let mut closed = Vec::new();

        let mut rolled = false;
        if previous.month != current.month {
            closed.extend(self.closed_bucket(ReportType::Month, previous));
            if current.month == 0 {
                self.months = [0; 12];
            }
            self.pointer.year = current.year;
            self.pointer.month = current.month;
            rolled = true;
        }
        accumulate(&mut self.months[self.pointer.month], calorie);

        if previous.day != current.day || rolled {
            closed.extend(self.closed_bucket(ReportType::Day, previous));
            if rolled {
                self.days = [0; 31];
            }
            self.pointer.day = current.day;
            rolled = true;
        }
        accumulate(&mut self.days[self.pointer.day], calorie);

        if previous.hour != current.hour || rolled {
            closed.extend(self.closed_bucket(ReportType::Hour, previous));
            if rolled {
                self.hours = [0; 24];
            }
            self.pointer.hour = current.hour;
            rolled = true;
        }
        accumulate(&mut self.hours[self.pointer.hour], calorie);

        // Minute buckets are display-only and never persisted.
        if previous.minute != current.minute || rolled {
            if rolled {
                self.minutes = [0; 60];
            }
            self.pointer.minute = current.minute;
        }
        accumulate(&mut self.minutes[self.pointer.minute], calorie);

        closed
    }

    fn closed_bucket(&self, report_type: ReportType, at: BucketPointer) -> Option<NewReport> {
        let calorie_total = match report_type {
            ReportType::Month => self.months[at.month],
            ReportType::Day => self.days[at.day],
            ReportType::Hour => self.hours[at.hour],
        };
        if calorie_total <= 0 {
            return None;
        }

        let (day, hour) = at.row_position(report_type);
        Some(NewReport {
            report_type,
            bucket_start: at.bucket_start(report_type)?,
            year: at.year,
            month: at.month as u32,
            day,
            hour,
            calorie_total,
        })
    }

    fn open_buckets(&self) -> Vec<NewReport> {
        [ReportType::Month, ReportType::Day, ReportType::Hour]
            .into_iter()
            .filter_map(|report_type| self.closed_bucket(report_type, self.pointer))
            .collect()
    }

    fn slots(&self, kind: BucketKind) -> &[i32] {
        match kind {
            BucketKind::Month => &self.months,
            BucketKind::Day => &self.days,
            BucketKind::Hour => &self.hours,
            BucketKind::Minute => &self.minutes,
        }
    }

    fn slots_mut(&mut self, report_type: ReportType) -> &mut [i32] {
        match report_type {
            ReportType::Month => &mut self.months,
            ReportType::Day => &mut self.days,
            ReportType::Hour => &mut self.hours,
        }
    }
}

/// Integer slots: the running sum is truncated after every increment.
fn accumulate(slot: &mut i32, calorie: f64) {
    *slot = (f64::from(*slot) + calorie) as i32;
}

fn load_rows(slots: &mut [i32], rows: &[StoredReport]) {
    for row in rows {
        let slot = row.slot();
        if row.calorie_total > 0 && slot < slots.len() {
            slots[slot] = row.calorie_total;
        }
    }
}

/// Rolls activity reports into month/day/hour/minute buckets and persists
/// buckets as they close.
///
/// The lock only guards array mutation; store calls happen after it is released.
pub struct ActivityAggregator {
    store: Arc<dyn ReportStore>,
    clock: Arc<dyn Clock>,
    state: Mutex<BucketState>,
}

impl ActivityAggregator {
    pub fn new(store: Arc<dyn ReportStore>, clock: Arc<dyn Clock>) -> Self {
        let pointer = BucketPointer::at(clock.now());
        Self {
            store,
            clock,
            state: Mutex::new(BucketState::new(pointer)),
        }
    }

    pub async fn record(&self, report: &ActivityReport) {
        let now = self.clock.now();
        let closed = {
            let mut state = self.state.lock();
            state.apply(report.calorie_increment, now)
        };

        for bucket in closed {
            self.persist(bucket).await;
        }
    }

    /// Persist the month, day and hour buckets in progress, whether or not
    /// they have closed. Called before the aggregator is dropped.
    pub async fn flush_all(&self) {
        let open = {
            let state = self.state.lock();
            state.open_buckets()
        };

        tracing::info!("Flushing {} open activity buckets", open.len());
        for bucket in open {
            self.persist(bucket).await;
        }
    }

    /// Copy of the live array for one granularity.
    pub fn snapshot(&self, kind: BucketKind) -> Vec<i32> {
        self.state.lock().slots(kind).to_vec()
    }

    pub fn pointer(&self) -> BucketPointer {
        self.state.lock().pointer
    }

    /// Reload the month, day and hour arrays for the current period from the store.
    pub async fn restore(&self) -> Result<(), StoreError> {
        let pointer = self.pointer();
        let month = pointer.month as u32;
        let day = pointer.day as u32;

        let months = self
            .store
            .query(&ReportQuery::new(ReportType::Month, pointer.year))
            .await?;
        let days = self
            .store
            .query(&ReportQuery::new(ReportType::Day, pointer.year).month(month))
            .await?;
        let hours = self
            .store
            .query(&ReportQuery::new(ReportType::Hour, pointer.year).month(month).day(day))
            .await?;

        {
            let mut state = self.state.lock();
            load_rows(state.slots_mut(ReportType::Month), &months);
            load_rows(state.slots_mut(ReportType::Day), &days);
            load_rows(state.slots_mut(ReportType::Hour), &hours);
        }

        tracing::info!(
            "Restored {} month, {} day and {} hour reports",
            months.len(),
            days.len(),
            hours.len()
        );
        Ok(())
    }

    /// Bucket array for a past period, built from stored rows only.
    pub async fn history(
        &self,
        report_type: ReportType,
        year: i32,
        month: Option<u32>,
        day: Option<u32>,
    ) -> Result<Vec<i32>, StoreError> {
        let query = ReportQuery {
            report_type,
            year,
            month,
            day,
            hour: None,
        };
        let rows = self.store.query(&query).await?;

        let mut slots = vec![0; report_type.bucket_kind().slots()];
        load_rows(&mut slots, &rows);
        Ok(slots)
    }

    pub async fn reports(&self, query: &ReportQuery) -> Result<Vec<StoredReport>, StoreError> {
        self.store.query(query).await
    }

    pub async fn delete_report(&self, id: i64) -> Result<(), StoreError> {
        self.store.delete(id).await
    }

    pub async fn delete_all_reports(&self) -> Result<(), StoreError> {
        self.store.delete_all().await
    }

    async fn persist(&self, bucket: NewReport) {
        match self.store.insert(&bucket).await {
            Ok(id) => tracing::info!(
                "Stored {} report #{} for {}: {} cal",
                bucket.report_type.as_str(),
                id,
                bucket.bucket_start,
                bucket.calorie_total
            ),
            Err(e) => tracing::warn!(
                "Failed to store {} report for {}: {}",
                bucket.report_type.as_str(),
                bucket.bucket_start,
                e
            ),
        }
    }
}
