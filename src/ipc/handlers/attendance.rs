use rusqlite::Connection;
use serde_json::json;
use std::collections::HashMap;
use uuid::Uuid;

use crate::calc;
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::common::{
    get_count, get_required_str, list_roster, now_stamp, require_batch, require_course,
    require_month, require_year, today, HandlerErr,
};
use crate::ipc::types::{AppState, Request};

#[derive(Debug, Clone, Default)]
struct PeriodCounts {
    theory_total: u64,
    theory_attended: u64,
    practical_total: u64,
    practical_attended: u64,
    clinical_total: u64,
    clinical_attended: u64,
}

impl PeriodCounts {
    fn from_row(row: &serde_json::Value) -> Result<Self, HandlerErr> {
        Ok(PeriodCounts {
            theory_total: get_count(row, "theoryTotal")?,
            theory_attended: get_count(row, "theoryAttended")?,
            practical_total: get_count(row, "practicalTotal")?,
            practical_attended: get_count(row, "practicalAttended")?,
            clinical_total: get_count(row, "clinicalTotal")?,
            clinical_attended: get_count(row, "clinicalAttended")?,
        })
    }

    /// Attended may only exceed total when total is zero; that case is
    /// let through so the percentage calculator's zero contract applies.
    fn check_bounds(&self, register_no: &str) -> Result<(), HandlerErr> {
        let pairs = [
            ("theory", self.theory_attended, self.theory_total),
            ("practical", self.practical_attended, self.practical_total),
            ("clinical", self.clinical_attended, self.clinical_total),
        ];
        for (category, attended, total) in pairs {
            if total > 0 && attended > total {
                return Err(HandlerErr::bad_params(format!(
                    "{}: {} attended ({}) exceeds total ({})",
                    register_no, category, attended, total
                )));
            }
        }
        Ok(())
    }
}

struct SaveRow {
    register_no: String,
    name: String,
    counts: PeriodCounts,
}

fn attendance_open(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let course = require_course(params)?;
    let (batch, batch_start, batch_end) = require_batch(params)?;
    let month = require_month(params, "month")?;
    let year = require_year(params, "year")?;

    let roster = list_roster(conn, &course, batch_start, batch_end)?;
    if roster.is_empty() {
        return Err(HandlerErr::not_found("No students found"));
    }

    let mut stmt = conn
        .prepare(
            "SELECT register_no, theory_total, theory_attended,
                    practical_total, practical_attended,
                    clinical_total, clinical_attended,
                    theory_percentage, practical_percentage,
                    clinical_percentage, average_percentage
             FROM attendance_records
             WHERE course = ? AND batch_start = ? AND batch_end = ?
               AND month = ? AND year = ?",
        )
        .map_err(HandlerErr::db_query)?;
    let stored: HashMap<String, serde_json::Value> = stmt
        .query_map((&course, batch_start, batch_end, month, year), |r| {
            let register_no: String = r.get(0)?;
            Ok((
                register_no,
                json!({
                    "theoryTotal": r.get::<_, i64>(1)?,
                    "theoryAttended": r.get::<_, i64>(2)?,
                    "practicalTotal": r.get::<_, i64>(3)?,
                    "practicalAttended": r.get::<_, i64>(4)?,
                    "clinicalTotal": r.get::<_, i64>(5)?,
                    "clinicalAttended": r.get::<_, i64>(6)?,
                    "theoryPercentage": r.get::<_, String>(7)?,
                    "practicalPercentage": r.get::<_, String>(8)?,
                    "clinicalPercentage": r.get::<_, String>(9)?,
                    "averagePercentage": r.get::<_, String>(10)?,
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
            });
            if let Some(counts) = stored.get(&s.register_no) {
                for (k, v) in counts.as_object().into_iter().flatten() {
                    row[k] = v.clone();
                }
            }
            row
        })
        .collect();

    Ok(json!({
        "month": month,
        "year": year,
        "students": students,
    }))
}

fn parse_save_rows(params: &serde_json::Value) -> Result<Vec<SaveRow>, HandlerErr> {
    let Some(raw_rows) = params.get("students").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("missing students"));
    };
    if raw_rows.is_empty() {
        return Err(HandlerErr::bad_params("students must not be empty"));
    }

    let mut rows = Vec::with_capacity(raw_rows.len());
    for raw in raw_rows {
        let register_no = get_required_str(raw, "registerNo")?;
        let name = get_required_str(raw, "name")?;
        let counts = PeriodCounts::from_row(raw)?;
        counts.check_bounds(&register_no)?;
        rows.push(SaveRow {
            register_no,
            name,
            counts,
        });
    }
    Ok(rows)
}

fn attendance_save(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let course = require_course(params)?;
    let (batch, batch_start, batch_end) = require_batch(params)?;
    let month = require_month(params, "month")?;
    let year = require_year(params, "year")?;
    // Whole-batch validation happens before any write.
    let rows = parse_save_rows(params)?;

    let current_year = calc::academic_year_label(&batch, today());
    let stamp = now_stamp();

    let mut written: usize = 0;
    let mut failed: Vec<String> = Vec::new();
    for row in &rows {
        let c = &row.counts;
        // Derived fields always come from this call's raw counts, never
        // from whatever a prior write stored.
        let theory_pct = calc::percentage(c.theory_attended, c.theory_total);
        let practical_pct = calc::percentage(c.practical_attended, c.practical_total);
        let clinical_pct = calc::percentage(c.clinical_attended, c.clinical_total);
        let average_pct = calc::format_percent(
            (calc::percentage_value(c.theory_attended, c.theory_total)
                + calc::percentage_value(c.practical_attended, c.practical_total)
                + calc::percentage_value(c.clinical_attended, c.clinical_total))
                / 3.0,
        );

        let result = conn.execute(
            "INSERT INTO attendance_records(
                 id, register_no, name, current_year, course,
                 batch_start, batch_end, month, year,
                 theory_total, theory_attended,
                 practical_total, practical_attended,
                 clinical_total, clinical_attended,
                 theory_percentage, practical_percentage,
                 clinical_percentage, average_percentage, updated_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(register_no, month, year) DO UPDATE SET
               name = excluded.name,
               current_year = excluded.current_year,
               course = excluded.course,
               batch_start = excluded.batch_start,
               batch_end = excluded.batch_end,
               theory_total = excluded.theory_total,
               theory_attended = excluded.theory_attended,
               practical_total = excluded.practical_total,
               practical_attended = excluded.practical_attended,
               clinical_total = excluded.clinical_total,
               clinical_attended = excluded.clinical_attended,
               theory_percentage = excluded.theory_percentage,
               practical_percentage = excluded.practical_percentage,
               clinical_percentage = excluded.clinical_percentage,
               average_percentage = excluded.average_percentage,
               updated_at = excluded.updated_at",
            rusqlite::params![
                Uuid::new_v4().to_string(),
                row.register_no,
                row.name,
                current_year,
                course,
                batch_start,
                batch_end,
                month,
                year,
                c.theory_total as i64,
                c.theory_attended as i64,
                c.practical_total as i64,
                c.practical_attended as i64,
                c.clinical_total as i64,
                c.clinical_attended as i64,
                theory_pct,
                practical_pct,
                clinical_pct,
                average_pct,
                stamp,
            ],
        );
        match result {
            Ok(_) => written += 1,
            Err(_) => failed.push(row.register_no.clone()),
        }
    }

    if !failed.is_empty() {
        // Best-effort bulk write: rows already written stay written.
        return Err(HandlerErr {
            code: "db_update_failed",
            message: format!("failed to save {} of {} rows", failed.len(), rows.len()),
            details: Some(json!({ "failed": failed, "written": written })),
        });
    }

    Ok(json!({
        "message": "Attendance saved successfully",
        "count": written,
    }))
}

fn attendance_average(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let course = require_course(params)?;
    let (_, batch_start, batch_end) = require_batch(params)?;
    let start_month = require_month(params, "startMonth")?;
    let start_year = require_year(params, "startYear")?;
    let end_month = require_month(params, "endMonth")?;
    let end_year = require_year(params, "endYear")?;
    if (start_year, start_month) > (end_year, end_month) {
        return Err(HandlerErr::bad_params("end period must not precede start period"));
    }

    let roster = list_roster(conn, &course, batch_start, batch_end)?;
    if roster.is_empty() {
        return Err(HandlerErr::not_found("No students found"));
    }

    let mut stmt = conn
        .prepare(
            "SELECT register_no, month, year,
                    theory_attended, theory_total,
                    practical_attended, practical_total,
                    clinical_attended, clinical_total
             FROM attendance_records
             WHERE course = ? AND batch_start = ? AND batch_end = ?",
        )
        .map_err(HandlerErr::db_query)?;
    let records = stmt
        .query_map((&course, batch_start, batch_end), |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, u32>(1)?,
                r.get::<_, i32>(2)?,
                [
                    r.get::<_, i64>(3)?,
                    r.get::<_, i64>(4)?,
                    r.get::<_, i64>(5)?,
                    r.get::<_, i64>(6)?,
                    r.get::<_, i64>(7)?,
                    r.get::<_, i64>(8)?,
                ],
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db_query)?;

    // Pool attended/total per student across every record in range;
    // percentages are computed once from the pooled counts.
    let mut tallies: HashMap<String, calc::AttendanceTally> = HashMap::new();
    for (register_no, month, year, counts) in records {
        if !calc::in_month_range(year, month, start_year, start_month, end_year, end_month) {
            continue;
        }
        let tally = tallies.entry(register_no).or_default();
        tally.theory.add(counts[0] as u64, counts[1] as u64);
        tally.practical.add(counts[2] as u64, counts[3] as u64);
        tally.clinical.add(counts[4] as u64, counts[5] as u64);
    }

    let averages: Vec<serde_json::Value> = roster
        .iter()
        .map(|s| {
            // A student with no records in range still gets a row, with
            // all-zero percentages.
            let summary = tallies
                .get(&s.register_no)
                .copied()
                .unwrap_or_default()
                .summary();
            json!({
                "registerNo": s.register_no,
                "name": s.name,
                "theoryPercentage": summary.theory_percentage,
                "practicalPercentage": summary.practical_percentage,
                "clinicalPercentage": summary.clinical_percentage,
                "averageAttendance": summary.average_percentage,
            })
        })
        .collect();

    Ok(json!({ "averages": averages }))
}

fn attendance_save_averages(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let course = require_course(params)?;
    let (_, batch_start, batch_end) = require_batch(params)?;
    let start_month = require_month(params, "startMonth")?;
    let start_year = require_year(params, "startYear")?;
    let end_month = require_month(params, "endMonth")?;
    let end_year = require_year(params, "endYear")?;
    let Some(raw_rows) = params.get("averages").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("missing averages"));
    };
    if raw_rows.is_empty() {
        return Err(HandlerErr::bad_params("averages must not be empty"));
    }

    let mut rows = Vec::with_capacity(raw_rows.len());
    for raw in raw_rows {
        let register_no = get_required_str(raw, "registerNo")?;
        let name = get_required_str(raw, "name")?;
        let theory = get_required_str(raw, "theoryPercentage")?;
        let practical = get_required_str(raw, "practicalPercentage")?;
        let clinical = get_required_str(raw, "clinicalPercentage")?;
        let average = get_required_str(raw, "averageAttendance")?;
        rows.push((register_no, name, theory, practical, clinical, average));
    }

    // A half-saved snapshot has no use, so this path is transactional.
    let tx = conn.unchecked_transaction().map_err(|e| HandlerErr {
        code: "db_tx_failed",
        message: e.to_string(),
        details: None,
    })?;
    let stamp = now_stamp();
    for (register_no, name, theory, practical, clinical, average) in &rows {
        tx.execute(
            "INSERT INTO attendance_averages(
                 id, register_no, name, course, batch_start, batch_end,
                 start_month, start_year, end_month, end_year,
                 theory_percentage, practical_percentage,
                 clinical_percentage, average_attendance, updated_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(register_no, start_month, start_year, end_month, end_year)
             DO UPDATE SET
               name = excluded.name,
               course = excluded.course,
               batch_start = excluded.batch_start,
               batch_end = excluded.batch_end,
               theory_percentage = excluded.theory_percentage,
               practical_percentage = excluded.practical_percentage,
               clinical_percentage = excluded.clinical_percentage,
               average_attendance = excluded.average_attendance,
               updated_at = excluded.updated_at",
            rusqlite::params![
                Uuid::new_v4().to_string(),
                register_no,
                name,
                course,
                batch_start,
                batch_end,
                start_month,
                start_year,
                end_month,
                end_year,
                theory,
                practical,
                clinical,
                average,
                stamp,
            ],
        )
        .map_err(|e| HandlerErr::db_update(e, "attendance_averages"))?;
    }
    tx.commit().map_err(|e| HandlerErr {
        code: "db_commit_failed",
        message: e.to_string(),
        details: None,
    })?;

    Ok(json!({
        "message": "Averages saved successfully",
        "count": rows.len(),
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
        "attendance.open" => Some(with_db(state, req, attendance_open)),
        "attendance.save" => Some(with_db(state, req, attendance_save)),
        "attendance.average" => Some(with_db(state, req, attendance_average)),
        "attendance.saveAverages" => Some(with_db(state, req, attendance_save_averages)),
        _ => None,
    }
}
