use rusqlite::Connection;
use serde_json::json;
use std::collections::HashMap;
use uuid::Uuid;

use crate::calc::{self, AssessmentScores};
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::common::{
    get_count, get_required_str, list_roster, now_stamp, require_batch, require_course, today,
    HandlerErr,
};
use crate::ipc::types::{AppState, Request};

/// Closed two-value enum for the assessment label.
fn require_assessment_type(params: &serde_json::Value) -> Result<String, HandlerErr> {
    let raw = get_required_str(params, "assessmentType")?;
    match raw.as_str() {
        "Assessment I" | "Assessment II" => Ok(raw),
        _ => Err(HandlerErr::bad_params(
            "assessmentType must be 'Assessment I' or 'Assessment II'",
        )),
    }
}

fn assessment_open(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let course = require_course(params)?;
    let (batch, batch_start, batch_end) = require_batch(params)?;
    let assessment_type = require_assessment_type(params)?;

    let roster = list_roster(conn, &course, batch_start, batch_end)?;
    if roster.is_empty() {
        return Err(HandlerErr::not_found("No students found"));
    }

    let mut stmt = conn
        .prepare(
            "SELECT register_no, theory70, theory20, theory10, total_theory,
                    practical90, practical10, total_practical
             FROM assessments
             WHERE course = ? AND batch_start = ? AND batch_end = ?
               AND assessment_type = ?",
        )
        .map_err(HandlerErr::db_query)?;
    let stored: HashMap<String, serde_json::Value> = stmt
        .query_map((&course, batch_start, batch_end, &assessment_type), |r| {
            let register_no: String = r.get(0)?;
            Ok((
                register_no,
                json!({
                    "theory70": r.get::<_, i64>(1)?,
                    "theory20": r.get::<_, i64>(2)?,
                    "theory10": r.get::<_, i64>(3)?,
                    "totalTheory": r.get::<_, i64>(4)?,
                    "practical90": r.get::<_, i64>(5)?,
                    "practical10": r.get::<_, i64>(6)?,
                    "totalPractical": r.get::<_, i64>(7)?,
                }),
            ))
        })
        .and_then(|it| it.collect::<Result<HashMap<_, _>, _>>())
        .map_err(HandlerErr::db_query)?;

    let current_year = calc::academic_year_label(&batch, today());
    let students: Vec<serde_json::Value> = roster
        .iter()
        .map(|s| {
            let mut row = json!({
                "registerNo": s.register_no,
                "name": s.name,
                "currentYear": current_year,
                "assessmentType": assessment_type,
            });
            if let Some(scores) = stored.get(&s.register_no) {
                for (k, v) in scores.as_object().into_iter().flatten() {
                    row[k] = v.clone();
                }
            }
            row
        })
        .collect();

    Ok(json!({ "students": students }))
}

fn assessment_save(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let course = require_course(params)?;
    let (batch, batch_start, batch_end) = require_batch(params)?;
    let assessment_type = require_assessment_type(params)?;
    let Some(raw_rows) = params.get("students").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("missing students"));
    };
    if raw_rows.is_empty() {
        return Err(HandlerErr::bad_params("students must not be empty"));
    }

    // Whole-batch validation: required fields and sub-score maxima are
    // checked for every row before any write happens.
    let mut rows: Vec<(String, String, AssessmentScores)> = Vec::with_capacity(raw_rows.len());
    for raw in raw_rows {
        let register_no = get_required_str(raw, "registerNo")?;
        let name = get_required_str(raw, "name")?;
        let scores = AssessmentScores {
            theory70: get_count(raw, "theory70")?,
            theory20: get_count(raw, "theory20")?,
            theory10: get_count(raw, "theory10")?,
            practical90: get_count(raw, "practical90")?,
            practical10: get_count(raw, "practical10")?,
        };
        if let Some((field, value, max)) = scores.bounds_violation() {
            return Err(HandlerErr {
                code: "bad_params",
                message: format!("{}: {} = {} exceeds maximum {}", register_no, field, value, max),
                details: Some(json!({
                    "registerNo": register_no,
                    "field": field,
                    "max": max,
                })),
            });
        }
        rows.push((register_no, name, scores));
    }

    let current_year = calc::academic_year_label(&batch, today());
    let stamp = now_stamp();

    let mut written: usize = 0;
    let mut failed: Vec<String> = Vec::new();
    for (register_no, name, scores) in &rows {
        // Totals are recomputed from this call's sub-scores; stored
        // totals are never trusted or added to.
        let result = conn.execute(
            "INSERT INTO assessments(
                 id, register_no, name, current_year, course,
                 batch_start, batch_end, assessment_type,
                 theory70, theory20, theory10, total_theory,
                 practical90, practical10, total_practical, updated_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(register_no, assessment_type) DO UPDATE SET
               name = excluded.name,
               current_year = excluded.current_year,
               course = excluded.course,
               batch_start = excluded.batch_start,
               batch_end = excluded.batch_end,
               theory70 = excluded.theory70,
               theory20 = excluded.theory20,
               theory10 = excluded.theory10,
               total_theory = excluded.total_theory,
               practical90 = excluded.practical90,
               practical10 = excluded.practical10,
               total_practical = excluded.total_practical,
               updated_at = excluded.updated_at",
            rusqlite::params![
                Uuid::new_v4().to_string(),
                register_no,
                name,
                current_year,
                course,
                batch_start,
                batch_end,
                assessment_type,
                scores.theory70 as i64,
                scores.theory20 as i64,
                scores.theory10 as i64,
                scores.total_theory() as i64,
                scores.practical90 as i64,
                scores.practical10 as i64,
                scores.total_practical() as i64,
                stamp,
            ],
        );
        match result {
            Ok(_) => written += 1,
            Err(_) => failed.push(register_no.clone()),
        }
    }

    if !failed.is_empty() {
        return Err(HandlerErr {
            code: "db_update_failed",
            message: format!("failed to save {} of {} rows", failed.len(), rows.len()),
            details: Some(json!({ "failed": failed, "written": written })),
        });
    }

    Ok(json!({
        "message": "Assessments saved successfully",
        "count": written,
    }))
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
        "assessment.open" => Some(with_db(state, req, assessment_open)),
        "assessment.save" => Some(with_db(state, req, assessment_save)),
        _ => None,
    }
}
