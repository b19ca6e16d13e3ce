use rusqlite::Connection;
use serde_json::json;

use crate::ipc::error::{err, ok};
use crate::ipc::handlers::common::{
    get_required_str, list_roster, now_stamp, require_batch, require_course, HandlerErr,
};
use crate::ipc::types::{AppState, Request};

fn students_enroll(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let register_no = get_required_str(params, "registerNo")?;
    let name = get_required_str(params, "name")?;
    let course = require_course(params)?;
    let (batch, batch_start, batch_end) = require_batch(params)?;

    let inserted = conn
        .execute(
            "INSERT OR IGNORE INTO students(register_no, name, course, batch_start, batch_end, created_at)
             VALUES(?, ?, ?, ?, ?, ?)",
            (
                &register_no,
                &name,
                &course,
                batch_start,
                batch_end,
                now_stamp(),
            ),
        )
        .map_err(|e| HandlerErr::db_update(e, "students"))?;
    if inserted == 0 {
        return Err(HandlerErr {
            code: "conflict",
            message: format!("student {} already enrolled", register_no),
            details: None,
        });
    }

    Ok(json!({
        "registerNo": register_no,
        "name": name,
        "course": course,
        "batch": batch,
    }))
}

fn students_list(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let course = require_course(params)?;
    let (batch, batch_start, batch_end) = require_batch(params)?;

    let roster = list_roster(conn, &course, batch_start, batch_end)?;
    if roster.is_empty() {
        // Expected outcome for an unknown cohort, not a fault.
        return Err(HandlerErr::not_found("No students found"));
    }

    let students: Vec<serde_json::Value> = roster
        .iter()
        .map(|s| {
            json!({
                "registerNo": s.register_no,
                "name": s.name,
                "course": course,
                "batch": batch,
            })
        })
        .collect();
    Ok(json!({ "students": students }))
}

fn with_db(
    state: &mut AppState,
    req: &Request,
    f: fn(&Connection, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>,
) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.enroll" => Some(with_db(state, req, students_enroll)),
        "students.list" => Some(with_db(state, req, students_list)),
        _ => None,
    }
}
