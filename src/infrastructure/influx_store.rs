// InfluxDB report store implementation
use crate::application::report_store::{ReportStore, StoreError};
use crate::domain::report::{NewReport, ReportQuery, ReportType, StoredReport};
use crate::infrastructure::config::InfluxSettings;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime};
use serde::Deserialize;

/// Row ids pack the bucket start (ms) and the report type code. Bucket starts
/// are written as UTC so they read back unchanged.
const ID_TYPE_RADIX: i64 = 10;

#[derive(Debug, Clone)]
pub struct InfluxReportStore {
    host: String,
    token: String,
    database: String,
    retention_policy: String,
    measurement: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct InfluxQLResponse {
    results: Vec<InfluxQLResult>,
}

#[derive(Debug, Deserialize)]
struct InfluxQLResult {
    #[serde(default)]
    series: Option<Vec<InfluxQLSeries>>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InfluxQLSeries {
    columns: Vec<String>,
    values: Vec<Vec<serde_json::Value>>,
}

impl InfluxReportStore {
    pub fn new(settings: InfluxSettings) -> Self {
        Self {
            host: settings.host.trim_end_matches('/').to_string(),
            token: settings.token,
            database: settings.database,
            retention_policy: settings.retention_policy,
            measurement: settings.measurement,
            client: reqwest::Client::new(),
        }
    }

    fn build_query_url(&self, query: &str) -> String {
        let encoded_query = urlencoding::encode(query);
        format!(
            "{}/query?db={}&rp={}&q={}",
            self.host, self.database, self.retention_policy, encoded_query
        )
    }

    fn build_write_url(&self) -> String {
        format!(
            "{}/api/v2/write?bucket={}/{}&precision=ms",
            self.host,
            urlencoding::encode(&self.database),
            urlencoding::encode(&self.retention_policy)
        )
    }

    /// Run a read-only InfluxQL query
    async fn execute_query(&self, query: &str) -> Result<InfluxQLResponse> {
        let request = self.client.get(self.build_query_url(query));
        self.send_query(request).await
    }

    /// Run a mutating InfluxQL statement (DELETE, DROP)
    async fn execute_statement(&self, statement: &str) -> Result<InfluxQLResponse> {
        let request = self.client.post(self.build_query_url(statement));
        self.send_query(request).await
    }

    async fn send_query(&self, request: reqwest::RequestBuilder) -> Result<InfluxQLResponse> {
        let response = request
            .header("Authorization", format!("Token {}", self.token))
            .header("Accept", "application/json")
            .send()
            .await
            .context("Failed to send request to InfluxDB")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("InfluxDB query failed with status {}: {}", status, body);
        }

        let data = response
            .json::<InfluxQLResponse>()
            .await
            .context("Failed to parse InfluxDB response")?;

        if let Some(result) = data.results.first() {
            if let Some(error) = &result.error {
                anyhow::bail!("InfluxDB query error: {}", error);
            }
        }

        Ok(data)
    }

    fn select_statement(&self, query: &ReportQuery) -> String {
        let mut statement = format!(
            "SELECT \"calorie_total\", \"year\", \"month\", \"day\", \"hour\" FROM \"{}\" WHERE \"report_type\" = '{}' AND \"year\" = {}",
            self.measurement,
            query.report_type.as_str(),
            query.year
        );
        for (column, value) in [("month", query.month), ("day", query.day), ("hour", query.hour)] {
            if let Some(value) = value {
                statement.push_str(&format!(" AND \"{}\" = {}", column, value));
            }
        }
        statement.push_str(" ORDER BY time ASC");
        statement
    }
}

/// One point in line protocol, timestamped at the bucket start (ms).
fn line_protocol(measurement: &str, report: &NewReport) -> String {
    format!(
        "{},report_type={} year={}i,month={}i,day={}i,hour={}i,calorie_total={}i {}",
        measurement,
        report.report_type.as_str(),
        report.year,
        report.month,
        report.day,
        report.hour,
        report.calorie_total,
        report.bucket_start.and_utc().timestamp_millis()
    )
}

fn report_id(report_type: ReportType, bucket_start: NaiveDateTime) -> i64 {
    bucket_start.and_utc().timestamp_millis() * ID_TYPE_RADIX + report_type.code()
}

fn split_report_id(id: i64) -> Option<(ReportType, i64)> {
    let report_type = ReportType::from_code(id.rem_euclid(ID_TYPE_RADIX))?;
    Some((report_type, id.div_euclid(ID_TYPE_RADIX)))
}

fn rows_from_response(response: &InfluxQLResponse, report_type: ReportType) -> Vec<StoredReport> {
    let mut rows = Vec::new();
    let Some(result) = response.results.first() else {
        return rows;
    };
    let Some(series) = &result.series else {
        return rows;
    };

    for s in series {
        let column = |name: &str| s.columns.iter().position(|c| c == name);
        let (Some(time_idx), Some(calorie_idx), Some(year_idx), Some(month_idx), Some(day_idx), Some(hour_idx)) = (
            column("time"),
            column("calorie_total"),
            column("year"),
            column("month"),
            column("day"),
            column("hour"),
        ) else {
            tracing::warn!("Skipping InfluxDB series with unexpected columns: {:?}", s.columns);
            continue;
        };

        for value_row in &s.values {
            let int = |idx: usize| value_row.get(idx).and_then(|v| v.as_i64());
            let time = value_row
                .get(time_idx)
                .and_then(|v| v.as_str())
                .and_then(|t| DateTime::parse_from_rfc3339(t).ok());

            if let (Some(time), Some(calorie), Some(year), Some(month), Some(day), Some(hour)) = (
                time,
                int(calorie_idx),
                int(year_idx),
                int(month_idx),
                int(day_idx),
                int(hour_idx),
            ) {
                let bucket_start = time.naive_utc();
                rows.push(StoredReport {
                    id: report_id(report_type, bucket_start),
                    report_type,
                    bucket_start,
                    year: year as i32,
                    month: month as u32,
                    day: day as u32,
                    hour: hour as u32,
                    calorie_total: calorie as i32,
                });
            }
        }
    }

    rows
}

#[async_trait]
impl ReportStore for InfluxReportStore {
    async fn insert(&self, report: &NewReport) -> Result<i64, StoreError> {
        let line = line_protocol(&self.measurement, report);
        tracing::debug!("Writing activity report: {}", line);

        let response = self
            .client
            .post(self.build_write_url())
            .header("Authorization", format!("Token {}", self.token))
            .body(line)
            .send()
            .await
            .context("Failed to send write to InfluxDB")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Rejected(format!("status {}: {}", status, body)));
        }

        Ok(report_id(report.report_type, report.bucket_start))
    }

    async fn query(&self, query: &ReportQuery) -> Result<Vec<StoredReport>, StoreError> {
        let statement = self.select_statement(query);
        tracing::debug!("Executing report query: {}", statement);

        let response = self.execute_query(&statement).await?;
        Ok(rows_from_response(&response, query.report_type))
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        let (report_type, millis) = split_report_id(id).ok_or(StoreError::NotFound(id))?;
        let statement = format!(
            "DELETE FROM \"{}\" WHERE \"report_type\" = '{}' AND time = {}ms",
            self.measurement,
            report_type.as_str(),
            millis
        );
        self.execute_statement(&statement).await?;
        Ok(())
    }

    async fn delete_all(&self) -> Result<(), StoreError> {
        let statement = format!("DROP MEASUREMENT \"{}\"", self.measurement);
        self.execute_statement(&statement).await?;
        Ok(())
    }
}
