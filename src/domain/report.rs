// Time bucket and persisted report domain models
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Calendar granularity of an in-memory bucket array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketKind {
    Month,
    Day,
    Hour,
    Minute,
}

impl BucketKind {
    /// Number of slots in the bucket array for this granularity.
    pub fn slots(self) -> usize {
        match self {
            BucketKind::Month => 12,
            BucketKind::Day => 31,
            BucketKind::Hour => 24,
            BucketKind::Minute => 60,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BucketKind::Month => "month",
            BucketKind::Day => "day",
            BucketKind::Hour => "hour",
            BucketKind::Minute => "minute",
        }
    }
}

impl FromStr for BucketKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "month" => Ok(BucketKind::Month),
            "day" => Ok(BucketKind::Day),
            "hour" => Ok(BucketKind::Hour),
            "minute" => Ok(BucketKind::Minute),
            other => Err(format!("unknown bucket kind: {}", other)),
        }
    }
}

impl fmt::Display for BucketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Granularity of a persisted report row. Minute buckets are never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportType {
    Month,
    Day,
    Hour,
}

impl ReportType {
    /// Stable numeric code used by stores that key rows by integer type.
    pub fn code(self) -> i64 {
        match self {
            ReportType::Month => 2,
            ReportType::Day => 3,
            ReportType::Hour => 4,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            2 => Some(ReportType::Month),
            3 => Some(ReportType::Day),
            4 => Some(ReportType::Hour),
            _ => None,
        }
    }

    pub fn bucket_kind(self) -> BucketKind {
        match self {
            ReportType::Month => BucketKind::Month,
            ReportType::Day => BucketKind::Day,
            ReportType::Hour => BucketKind::Hour,
        }
    }

    pub fn as_str(self) -> &'static str {
        self.bucket_kind().as_str()
    }
}

impl FromStr for ReportType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "month" => Ok(ReportType::Month),
            "day" => Ok(ReportType::Day),
            "hour" => Ok(ReportType::Hour),
            other => Err(format!("unknown report type: {}", other)),
        }
    }
}

/// A closed bucket on its way to the report store.
///
/// `month`, `day` and `hour` are zero-based, matching the bucket array indexes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewReport {
    pub report_type: ReportType,
    pub bucket_start: NaiveDateTime,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub calorie_total: i32,
}

/// A report row as held by the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredReport {
    pub id: i64,
    pub report_type: ReportType,
    pub bucket_start: NaiveDateTime,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub calorie_total: i32,
}

impl StoredReport {
    pub fn from_new(id: i64, report: &NewReport) -> Self {
        Self {
            id,
            report_type: report.report_type,
            bucket_start: report.bucket_start,
            year: report.year,
            month: report.month,
            day: report.day,
            hour: report.hour,
            calorie_total: report.calorie_total,
        }
    }

    /// Index of this row inside its bucket array.
    pub fn slot(&self) -> usize {
        match self.report_type {
            ReportType::Month => self.month as usize,
            ReportType::Day => self.day as usize,
            ReportType::Hour => self.hour as usize,
        }
    }
}

/// Filter for stored rows. `None` components match anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportQuery {
    pub report_type: ReportType,
    pub year: i32,
    pub month: Option<u32>,
    pub day: Option<u32>,
    pub hour: Option<u32>,
}

impl ReportQuery {
    pub fn new(report_type: ReportType, year: i32) -> Self {
        Self {
            report_type,
            year,
            month: None,
            day: None,
            hour: None,
        }
    }

    pub fn month(mut self, month: u32) -> Self {
        self.month = Some(month);
        self
    }

    pub fn day(mut self, day: u32) -> Self {
        self.day = Some(day);
        self
    }

    pub fn hour(mut self, hour: u32) -> Self {
        self.hour = Some(hour);
        self
    }

    pub fn matches(&self, row: &StoredReport) -> bool {
        row.report_type == self.report_type
            && row.year == self.year
            && self.month.is_none_or(|m| row.month == m)
            && self.day.is_none_or(|d| row.day == d)
            && self.hour.is_none_or(|h| row.hour == h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn row(report_type: ReportType, month: u32, day: u32, hour: u32) -> StoredReport {
        StoredReport {
            id: 1,
            report_type,
            bucket_start: NaiveDate::from_ymd_opt(2024, month + 1, day + 1)
                .unwrap()
                .and_hms_opt(hour, 0, 0)
                .unwrap(),
            year: 2024,
            month,
            day,
            hour,
            calorie_total: 50,
        }
    }

    #[test]
    fn test_query_matches_optional_components() {
        let hour_row = row(ReportType::Hour, 4, 9, 13);

        assert!(ReportQuery::new(ReportType::Hour, 2024).matches(&hour_row));
        assert!(ReportQuery::new(ReportType::Hour, 2024).month(4).day(9).matches(&hour_row));
        assert!(!ReportQuery::new(ReportType::Hour, 2024).day(10).matches(&hour_row));
        assert!(!ReportQuery::new(ReportType::Day, 2024).matches(&hour_row));
        assert!(!ReportQuery::new(ReportType::Hour, 2023).matches(&hour_row));
    }

    #[test]
    fn test_slot_follows_report_type() {
        assert_eq!(row(ReportType::Month, 4, 0, 0).slot(), 4);
        assert_eq!(row(ReportType::Day, 4, 9, 0).slot(), 9);
        assert_eq!(row(ReportType::Hour, 4, 9, 13).slot(), 13);
    }

    #[test]
    fn test_report_type_codes_round_trip() {
        for report_type in [ReportType::Month, ReportType::Day, ReportType::Hour] {
            assert_eq!(ReportType::from_code(report_type.code()), Some(report_type));
        }
        assert_eq!(ReportType::from_code(1), None);
    }

    #[test]
    fn test_bucket_kind_parse() {
        assert_eq!("minute".parse::<BucketKind>(), Ok(BucketKind::Minute));
        assert!("week".parse::<BucketKind>().is_err());
        assert_eq!(BucketKind::Day.slots(), 31);
    }
}
