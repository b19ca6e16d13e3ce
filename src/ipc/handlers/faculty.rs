use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

use crate::ipc::error::{err, ok};
use crate::ipc::handlers::common::{
    get_optional_str, get_required_str, now_stamp, HandlerErr,
};
use crate::ipc::types::{AppState, Request};

fn faculty_create(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let name = get_required_str(params, "name")?;
    let designation = get_required_str(params, "designation")?;
    let department = get_optional_str(params, "department");
    let contact_no = get_optional_str(params, "contactNo");

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO faculty(id, name, designation, department, contact_no, activities, created_at)
         VALUES(?, ?, ?, ?, ?, '[]', ?)",
        (&id, &name, &designation, &department, &contact_no, now_stamp()),
    )
    .map_err(|e| HandlerErr::db_update(e, "faculty"))?;

    Ok(json!({ "facultyId": id, "name": name }))
}

fn faculty_list(conn: &Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT id, name, designation, department, contact_no
             FROM faculty
             ORDER BY name",
        )
        .map_err(HandlerErr::db_query)?;
    let rows: Vec<serde_json::Value> = stmt
        .query_map([], |r| {
            Ok(json!({
                "facultyId": r.get::<_, String>(0)?,
                "name": r.get::<_, String>(1)?,
                "designation": r.get::<_, String>(2)?,
                "department": r.get::<_, Option<String>>(3)?.unwrap_or_default(),
                "contactNo": r.get::<_, Option<String>>(4)?.unwrap_or_default(),
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db_query)?;

    Ok(json!({ "faculty": rows }))
}

fn faculty_set_activities(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let faculty_id = get_required_str(params, "facultyId")?;
    let Some(activities) = params.get("activities").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("missing activities"));
    };
    for entry in activities {
        if !entry.is_string() {
            return Err(HandlerErr::bad_params("activities must be strings"));
        }
    }
    let encoded = serde_json::Value::Array(activities.clone()).to_string();

    let updated = conn
        .execute(
            "UPDATE faculty SET activities = ? WHERE id = ?",
            (&encoded, &faculty_id),
        )
        .map_err(|e| HandlerErr::db_update(e, "faculty"))?;
    if updated == 0 {
        return Err(HandlerErr::not_found("faculty not found"));
    }

    let name: Option<String> = conn
        .query_row("SELECT name FROM faculty WHERE id = ?", [&faculty_id], |r| {
            r.get(0)
        })
        .optional()
        .map_err(HandlerErr::db_query)?;

    Ok(json!({
        "message": "Activities updated successfully",
        "name": name,
        "activities": activities,
    }))
}

/// Public listing: only faculty with at least one activity, sorted by name.
fn faculty_public_activities(
    conn: &Connection,
    _params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT name, designation, activities
             FROM faculty
             WHERE activities != '[]'
             ORDER BY name",
        )
        .map_err(HandlerErr::db_query)?;
    let rows: Vec<serde_json::Value> = stmt
        .query_map([], |r| {
            let name: String = r.get(0)?;
            let designation: String = r.get(1)?;
            let activities_raw: String = r.get(2)?;
            Ok((name, designation, activities_raw))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db_query)?
        .into_iter()
        .map(|(name, designation, activities_raw)| {
            let activities: serde_json::Value =
                serde_json::from_str(&activities_raw).unwrap_or_else(|_| json!([]));
            json!({
                "name": name,
                "designation": designation,
                "activities": activities,
            })
        })
        .collect();

    Ok(json!({ "faculty": rows }))
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
        "faculty.create" => Some(with_db(state, req, faculty_create)),
        "faculty.list" => Some(with_db(state, req, faculty_list)),
        "faculty.setActivities" => Some(with_db(state, req, faculty_set_activities)),
        "faculty.publicActivities" => Some(with_db(state, req, faculty_public_activities)),
        _ => None,
    }
}
