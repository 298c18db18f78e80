use std::cmp::Ordering;
use std::fmt::Display;

use duckdb::{params, Connection};
use jiff::civil::{Date, DateTime};
use jiff::tz::TimeZone;
use jiff::Timestamp;
use log::{debug, error, info, warn};
use serde::Deserialize;
use serde_json::Value;

use super::lib_dsdev::{HttpGetter, LogsError};

#[derive(Clone)]
pub struct DsdevLogsArchive {
    pub base_url: String,
    pub duckdb_path: String,
}

impl DsdevLogsArchive {
    /// Return the request url for the day, e.g. `<base_url>20210123`.
    pub fn url(&self, date: &Date) -> String {
        self.base_url.to_owned() + &date.strftime("%Y%m%d").to_string()
    }

    /// Request one day of logs from the server and validate the envelope.
    ///
    /// A non-empty `error` field fails the run before any record is looked
    /// at.  A missing `error` key is only worth a warning.  A missing `logs`
    /// key means the response is not usable at all.
    pub fn request_logs(
        &self,
        getter: &dyn HttpGetter,
        date: &Date,
    ) -> Result<Vec<Value>, LogsError> {
        info!("Requesting {} logs from server ...", date);
        let body = getter.get_content(&self.url(date))?;
        let payload: Payload = serde_json::from_slice(&body)
            .map_err(|e| LogsError::MalformedResponse(e.to_string()))?;
        match &payload.error {
            None => warn!("No \"error\" key in response"),
            Some(error) if !error.is_empty() => {
                error!("Server responded with an error: {}", error);
                return Err(LogsError::ServerReported(error.clone()));
            }
            Some(_) => (),
        }
        match payload.logs {
            Some(logs) => Ok(logs),
            None => Err(LogsError::MalformedResponse(
                "no \"logs\" key in response".to_string(),
            )),
        }
    }

    /// Run the whole pipeline for one day: request, parse, sort, save.
    /// Returns the number of entries saved.  Nothing is written unless the
    /// whole batch goes in.
    pub fn get_logs(&self, getter: &dyn HttpGetter, date: Date) -> Result<usize, LogsError> {
        let records = self.request_logs(getter, &date)?;
        let entries = parse_entries(records);
        if entries.is_empty() {
            info!("There are no logs to save for {}", date);
            return Ok(0);
        }
        let entries = sort_by_created(entries);
        let mut conn = Connection::open(&self.duckdb_path)?;
        save_logs(&mut conn, &entries)?;
        Ok(entries.len())
    }
}

/// Server response envelope.
#[derive(Debug, Deserialize)]
struct Payload {
    error: Option<String>,
    logs: Option<Vec<Value>>,
}

/// One record as it arrives from the server, all fields still unchecked.
#[derive(Debug, Deserialize)]
struct RawEntry {
    created_at: Option<String>,
    first_name: Option<String>,
    second_name: Option<String>,
    message: Option<String>,
    user_id: Option<String>,
}

/// A validated log entry.  `created` is always present; the rest is
/// optional on the wire and stays optional here so absent fields remain
/// distinguishable from empty ones.
#[derive(Clone, Debug, PartialEq)]
pub struct LogEntry {
    pub created: DateTime,
    pub first_name: Option<String>,
    pub second_name: Option<String>,
    pub message: Option<String>,
    pub user_id: Option<String>,
}

impl Display for LogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "<{}, user: {} {}, ID: {}>",
            self.created,
            self.first_name.as_deref().unwrap_or(""),
            self.second_name.as_deref().unwrap_or(""),
            self.user_id.as_deref().unwrap_or(""),
        )
    }
}

/// Turn raw records into validated entries, in order of appearance.
///
/// A record without a usable `created_at` is dropped and the batch
/// continues.  Missing optional fields only get a warning.
pub fn parse_entries(records: Vec<Value>) -> Vec<LogEntry> {
    let mut entries: Vec<LogEntry> = Vec::with_capacity(records.len());
    for record in records {
        let raw = match serde_json::from_value::<RawEntry>(record) {
            Ok(raw) => raw,
            Err(e) => {
                error!("Unusable entry: {}. Entry skipped", e);
                continue;
            }
        };
        let created_at = match raw.created_at.as_deref() {
            Some(s) if !s.is_empty() => s,
            _ => {
                error!("Entry field \"created_at\" is empty or absent. Entry skipped");
                debug!("{:?}", raw);
                continue;
            }
        };
        let created = match created_at.parse::<DateTime>() {
            Ok(created) => created,
            Err(e) => {
                error!("Failed to parse \"created_at\": {}. Entry skipped", e);
                debug!("{:?}", raw);
                continue;
            }
        };
        if raw.first_name.is_none()
            || raw.second_name.is_none()
            || raw.message.is_none()
            || raw.user_id.is_none()
        {
            warn!("Some optional fields are absent for entry {}", created);
            debug!("{:?}", raw);
        }
        entries.push(LogEntry {
            created,
            first_name: raw.first_name,
            second_name: raw.second_name,
            message: raw.message,
            user_id: raw.user_id,
        });
    }
    info!("Total records: {}", entries.len());
    entries
}

enum Work {
    Unsorted(Vec<LogEntry>),
    Sorted(Vec<LogEntry>),
}

/// Order entries by `created`, ascending.
///
/// Three-way quicksort around the middle element of each segment, driven by
/// an explicit worklist so a large day cannot exhaust the stack.  Entries
/// equal to the pivot keep their scan order within the segment; ties are
/// not globally stable.
pub fn sort_by_created(entries: Vec<LogEntry>) -> Vec<LogEntry> {
    let mut out: Vec<LogEntry> = Vec::with_capacity(entries.len());
    let mut worklist = vec![Work::Unsorted(entries)];
    while let Some(work) = worklist.pop() {
        let batch = match work {
            Work::Sorted(run) => {
                out.extend(run);
                continue;
            }
            Work::Unsorted(batch) if batch.len() <= 1 => {
                out.extend(batch);
                continue;
            }
            Work::Unsorted(batch) => batch,
        };
        let pivot = batch[batch.len() / 2].created;
        let mut less = Vec::new();
        let mut equal = Vec::new();
        let mut greater = Vec::new();
        for entry in batch {
            match entry.created.cmp(&pivot) {
                Ordering::Less => less.push(entry),
                Ordering::Equal => equal.push(entry),
                Ordering::Greater => greater.push(entry),
            }
        }
        worklist.push(Work::Unsorted(greater));
        worklist.push(Work::Sorted(equal));
        worklist.push(Work::Unsorted(less));
    }
    out
}

const SCHEMA: &str = r"
CREATE SEQUENCE IF NOT EXISTS logs_id_seq;
CREATE TABLE IF NOT EXISTS logs (
    id BIGINT PRIMARY KEY DEFAULT nextval('logs_id_seq'),
    created TIMESTAMP NOT NULL,
    first_name VARCHAR,
    second_name VARCHAR,
    message VARCHAR,
    user_id VARCHAR,
);
";

/// Save one day of entries in a single transaction, one row per entry.
/// Either every row goes in or, on any failure, none do.
pub fn save_logs(conn: &mut Connection, entries: &[LogEntry]) -> Result<(), LogsError> {
    info!("Saving {} entries to DB ...", entries.len());
    let tx = conn.transaction()?;
    tx.execute_batch(SCHEMA)?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO logs (created, first_name, second_name, message, user_id)
        VALUES (?::TIMESTAMP, ?, ?, ?, ?);",
        )?;
        for entry in entries {
            stmt.execute(params![
                entry.created.to_string(),
                entry.first_name,
                entry.second_name,
                entry.message,
                entry.user_id,
            ])?;
        }
    }
    tx.commit()?;
    info!("All entries saved successfully");
    Ok(())
}

/// One persisted row from the logs table.
#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    pub id: i64,
    pub created: DateTime,
    pub first_name: Option<String>,
    pub second_name: Option<String>,
    pub message: Option<String>,
    pub user_id: Option<String>,
}

/// Read back all rows from the logs table, oldest first.
pub fn get_data(conn: &Connection) -> Result<Vec<Row>, LogsError> {
    let mut stmt = conn.prepare(
        "SELECT id, created, first_name, second_name, message, user_id
        FROM logs
        ORDER BY created, id;",
    )?;
    let rows = stmt.query_map([], |row| {
        let micros = row.get::<usize, i64>(1)?;
        let created = Timestamp::from_microsecond(micros)
            .unwrap()
            .to_zoned(TimeZone::UTC)
            .datetime();
        Ok(Row {
            id: row.get::<usize, i64>(0)?,
            created,
            first_name: row.get::<usize, Option<String>>(2)?,
            second_name: row.get::<usize, Option<String>>(3)?,
            message: row.get::<usize, Option<String>>(4)?,
            user_id: row.get::<usize, Option<String>>(5)?,
        })
    })?;
    let results: Vec<Row> = rows.collect::<Result<_, _>>()?;
    Ok(results)
}
