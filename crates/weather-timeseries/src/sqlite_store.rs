//! `SqliteTimeSeriesStore`: a reference [`TimeSeriesStore`] backed by
//! `rusqlite`, grounded on the teacher's `storage/journal.rs`/`db.rs`
//! pragma-on-open + prepared-statement style.
//!
//! Raw readings are stored one row per reading, JSON-encoded, and bucket
//! queries truncate the stored timestamp to the requested resolution. This
//! is an approximation of a continuous-aggregate engine, present only so
//! the rest of this workspace (upload controllers, the gRPC broadcast
//! sink's read-queries) has something concrete to run against in tests.
//! The production schema and its statistics internals live outside this
//! crate.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex;
use weather_types::{BucketReading, Reading};

use crate::store::{BucketResolution, TimeSeriesError, TimeSeriesStore};

impl From<rusqlite::Error> for TimeSeriesError {
    fn from(e: rusqlite::Error) -> Self {
        TimeSeriesError::Backend(e.to_string())
    }
}

pub struct SqliteTimeSeriesStore {
    conn: Arc<Mutex<Connection>>,
}

fn apply_pragmas(conn: &Connection) -> Result<(), TimeSeriesError> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "FULL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(())
}

fn apply_schema(conn: &Connection) -> Result<(), TimeSeriesError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS readings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            station_name TEXT NOT NULL,
            ts_millis INTEGER NOT NULL,
            rain_incremental REAL NOT NULL,
            reading_json TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_readings_station_ts ON readings(station_name, ts_millis);",
    )?;
    Ok(())
}

impl SqliteTimeSeriesStore {
    pub fn open(path: &Path) -> Result<Self, TimeSeriesError> {
        let conn = Connection::open(path)?;
        apply_pragmas(&conn)?;
        apply_schema(&conn)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    pub fn open_in_memory() -> Result<Self, TimeSeriesError> {
        let conn = Connection::open_in_memory()?;
        apply_pragmas(&conn)?;
        apply_schema(&conn)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }
}

fn truncate_to(ts: DateTime<Utc>, resolution_seconds: i64) -> DateTime<Utc> {
    let epoch = ts.timestamp();
    let truncated = epoch - epoch.rem_euclid(resolution_seconds);
    Utc.timestamp_opt(truncated, 0).single().unwrap_or(ts)
}

#[async_trait]
impl TimeSeriesStore for SqliteTimeSeriesStore {
    async fn write(&self, reading: &Reading) -> Result<(), TimeSeriesError> {
        let json = serde_json::to_string(reading).map_err(|e| TimeSeriesError::Decode(e.to_string()))?;
        let station = reading.station_name.clone();
        let ts_millis = reading.timestamp.timestamp_millis();
        let rain_incremental = reading.rain_incremental;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO readings (station_name, ts_millis, rain_incremental, reading_json) VALUES (?1, ?2, ?3, ?4)",
            params![station, ts_millis, rain_incremental, json],
        )?;
        Ok(())
    }

    async fn latest_bucket(
        &self,
        station: &str,
        resolution: BucketResolution,
    ) -> Result<Option<BucketReading>, TimeSeriesError> {
        let conn = self.conn.lock().await;
        let latest: Option<(i64, String)> = conn
            .query_row(
                "SELECT ts_millis, reading_json FROM readings WHERE station_name = ?1 ORDER BY ts_millis DESC LIMIT 1",
                params![station],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((ts_millis, json)) = latest else { return Ok(None) };
        let reading: Reading = serde_json::from_str(&json).map_err(|e| TimeSeriesError::Decode(e.to_string()))?;
        let resolution_seconds = resolution.as_seconds();
        let bucket = truncate_to(
            Utc.timestamp_millis_opt(ts_millis).single().unwrap_or(reading.timestamp),
            resolution_seconds,
        );
        let bucket_end_millis = (bucket.timestamp() + resolution_seconds) * 1000;
        let bucket_start_millis = bucket.timestamp() * 1000;

        let period_rain: f64 = conn.query_row(
            "SELECT COALESCE(SUM(rain_incremental), 0.0) FROM readings
             WHERE station_name = ?1 AND ts_millis >= ?2 AND ts_millis < ?3",
            params![station, bucket_start_millis, bucket_end_millis],
            |row| row.get(0),
        )?;

        Ok(Some(BucketReading { reading, bucket, period_rain }))
    }

    async fn span(&self, station: &str, duration: Duration) -> Result<Vec<BucketReading>, TimeSeriesError> {
        let since_millis = (Utc::now() - chrono::Duration::from_std(duration).unwrap_or_default()).timestamp_millis();
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT ts_millis, rain_incremental, reading_json FROM readings
             WHERE station_name = ?1 AND ts_millis >= ?2 ORDER BY ts_millis ASC",
        )?;
        let rows = stmt.query_map(params![station, since_millis], |row| {
            let ts_millis: i64 = row.get(0)?;
            let rain: f64 = row.get(1)?;
            let json: String = row.get(2)?;
            Ok((ts_millis, rain, json))
        })?;

        let one_minute = BucketResolution::OneMinute.as_seconds();
        let mut buckets: Vec<BucketReading> = Vec::new();
        for row in rows {
            let (ts_millis, rain, json) = row?;
            let reading: Reading = serde_json::from_str(&json).map_err(|e| TimeSeriesError::Decode(e.to_string()))?;
            let bucket = truncate_to(
                Utc.timestamp_millis_opt(ts_millis).single().unwrap_or(reading.timestamp),
                one_minute,
            );
            match buckets.last_mut() {
                Some(last) if last.bucket == bucket => {
                    last.reading = reading;
                    last.period_rain += rain;
                }
                _ => buckets.push(BucketReading { reading, bucket, period_rain: rain }),
            }
        }
        Ok(buckets)
    }

    async fn ping(&self) -> Result<(), TimeSeriesError> {
        let conn = self.conn.lock().await;
        let _: String = conn.pragma_query_value(None, "integrity_check", |row| row.get(0))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading_at(station: &str, ts: DateTime<Utc>, rain: f64) -> Reading {
        let mut r = Reading::new(station, "davis", ts);
        r.rain_incremental = rain;
        r.outside_temperature = 70.0;
        r
    }

    #[tokio::test]
    async fn latest_bucket_is_none_for_unknown_station() {
        let store = SqliteTimeSeriesStore::open_in_memory().unwrap();
        let result = store.latest_bucket("kxx", BucketResolution::OneMinute).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn latest_bucket_sums_rain_within_the_window() {
        let store = SqliteTimeSeriesStore::open_in_memory().unwrap();
        let base = Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap();
        store.write(&reading_at("k1", base, 0.1)).await.unwrap();
        store.write(&reading_at("k1", base + chrono::Duration::seconds(10), 0.2)).await.unwrap();

        let bucket = store
            .latest_bucket("k1", BucketResolution::OneMinute)
            .await
            .unwrap()
            .expect("bucket should exist");
        assert!((bucket.period_rain - 0.3).abs() < 1e-9);
        assert_eq!(bucket.reading.station_name, "k1");
    }

    #[tokio::test]
    async fn span_groups_rows_into_one_minute_buckets() {
        let store = SqliteTimeSeriesStore::open_in_memory().unwrap();
        let base = Utc::now() - chrono::Duration::seconds(30);
        store.write(&reading_at("k1", base, 0.1)).await.unwrap();
        store.write(&reading_at("k1", base + chrono::Duration::seconds(5), 0.1)).await.unwrap();

        let span = store.span("k1", Duration::from_secs(3600)).await.unwrap();
        assert_eq!(span.len(), 1);
        assert!((span[0].period_rain - 0.2).abs() < 1e-9);
    }

    #[tokio::test]
    async fn ping_succeeds_on_a_healthy_store() {
        let store = SqliteTimeSeriesStore::open_in_memory().unwrap();
        store.ping().await.unwrap();
    }
}
