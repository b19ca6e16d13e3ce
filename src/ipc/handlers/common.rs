use rusqlite::Connection;
use serde_json::json;

use crate::calc;
use crate::ipc::error::err;

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn bad_params(message: impl Into<String>) -> Self {
        HandlerErr {
            code: "bad_params",
            message: message.into(),
            details: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        HandlerErr {
            code: "not_found",
            message: message.into(),
            details: None,
        }
    }

    pub fn db_query(e: rusqlite::Error) -> Self {
        HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        }
    }

    pub fn db_update(e: rusqlite::Error, table: &str) -> Self {
        HandlerErr {
            code: "db_update_failed",
            message: e.to_string(),
            details: Some(json!({ "table": table })),
        }
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_optional_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

pub fn get_required_u64(params: &serde_json::Value, key: &str) -> Result<u64, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_u64())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

/// Count fields on save rows: absent or null reads as zero, anything
/// else must be a non-negative integer.
pub fn get_count(row: &serde_json::Value, key: &str) -> Result<u64, HandlerErr> {
    match row.get(key) {
        None => Ok(0),
        Some(v) if v.is_null() => Ok(0),
        Some(v) => v
            .as_u64()
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a non-negative integer", key))),
    }
}

/// Course enum on the wire: BDS or MDS, case-insensitive, stored uppercase.
pub fn require_course(params: &serde_json::Value) -> Result<String, HandlerErr> {
    let raw = get_required_str(params, "course")?;
    let course = raw.trim().to_ascii_uppercase();
    match course.as_str() {
        "BDS" | "MDS" => Ok(course),
        _ => Err(HandlerErr::bad_params("course must be BDS or MDS")),
    }
}

/// Batch on the wire is always the literal "YYYY-YYYY" string; returns
/// it with its decomposed (start, end) years.
pub fn require_batch(params: &serde_json::Value) -> Result<(String, i32, i32), HandlerErr> {
    let batch = get_required_str(params, "batch")?;
    let Some((start, end)) = calc::parse_batch(&batch) else {
        return Err(HandlerErr::bad_params(
            "batch must be in YYYY-YYYY format (e.g., 2021-2025)",
        ));
    };
    Ok((batch, start, end))
}

pub fn require_month(params: &serde_json::Value, key: &str) -> Result<u32, HandlerErr> {
    let month = get_required_u64(params, key)?;
    if !(1..=12).contains(&month) {
        return Err(HandlerErr::bad_params(format!(
            "{} must be between 1 and 12",
            key
        )));
    }
    Ok(month as u32)
}

pub fn require_year(params: &serde_json::Value, key: &str) -> Result<i32, HandlerErr> {
    let year = get_required_u64(params, key)?;
    if !(1900..=9999).contains(&year) {
        return Err(HandlerErr::bad_params(format!(
            "{} must be a four-digit year",
            key
        )));
    }
    Ok(year as i32)
}

#[derive(Debug, Clone)]
pub struct RosterStudent {
    pub register_no: String,
    pub name: String,
}

/// All students enrolled in (course, batch), in enrollment order.
pub fn list_roster(
    conn: &Connection,
    course: &str,
    batch_start: i32,
    batch_end: i32,
) -> Result<Vec<RosterStudent>, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT register_no, name
             FROM students
             WHERE course = ? AND batch_start = ? AND batch_end = ?
             ORDER BY rowid",
        )
        .map_err(HandlerErr::db_query)?;
    stmt.query_map((course, batch_start, batch_end), |r| {
        Ok(RosterStudent {
            register_no: r.get(0)?,
            name: r.get(1)?,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(HandlerErr::db_query)
}

pub fn now_stamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

pub fn today() -> chrono::NaiveDate {
    chrono::Local::now().date_naive()
}
