use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

use crate::ipc::error::{err, ok};
use crate::ipc::handlers::common::{
    get_optional_str, get_required_str, get_required_u64, now_stamp, require_course, HandlerErr,
};
use crate::ipc::types::{AppState, Request};

const DOCUMENT_EXTENSIONS: [&str; 5] = ["pdf", "doc", "docx", "ppt", "pptx"];
const VIDEO_EXTENSIONS: [&str; 3] = ["mp4", "webm", "ogg"];

fn extension_of(path: &str) -> Option<String> {
    path.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase())
}

/// The stored path's extension must agree with the declared file type.
fn check_file_type(file_type: &str, file_path: &str) -> Result<(), HandlerErr> {
    let ext = extension_of(file_path).unwrap_or_default();
    let allowed: &[&str] = match file_type {
        "pdf" => &DOCUMENT_EXTENSIONS,
        "video" => &VIDEO_EXTENSIONS,
        _ => return Err(HandlerErr::bad_params("fileType must be pdf or video")),
    };
    if !allowed.contains(&ext.as_str()) {
        return Err(HandlerErr::bad_params(format!(
            "file extension .{} does not match fileType {}",
            ext, file_type
        )));
    }
    Ok(())
}

fn resources_add(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let title = get_required_str(params, "title")?;
    if title.trim().is_empty() || title.len() > 200 {
        return Err(HandlerErr::bad_params("title must be 1-200 characters"));
    }
    let description = get_optional_str(params, "description");
    if description.as_deref().map(|d| d.len() > 500).unwrap_or(false) {
        return Err(HandlerErr::bad_params("description cannot exceed 500 characters"));
    }
    let file_type = get_required_str(params, "fileType")?;
    let course = require_course(params)?;
    let academic_year = get_required_u64(params, "academicYear")?;
    if !(1..=4).contains(&academic_year) {
        return Err(HandlerErr::bad_params("academicYear must be between 1 and 4"));
    }
    let file_path = get_required_str(params, "filePath")?;
    check_file_type(&file_type, &file_path)?;
    let original_file_name = get_required_str(params, "originalFileName")?;
    let file_size = get_required_u64(params, "fileSize")?;
    let uploaded_by = get_optional_str(params, "uploadedBy");

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO resources(
             id, title, description, file_type, course, academic_year,
             file_path, original_file_name, file_size, uploaded_by,
             downloads, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?)",
        rusqlite::params![
            id,
            title,
            description,
            file_type,
            course,
            academic_year as i64,
            file_path,
            original_file_name,
            file_size as i64,
            uploaded_by,
            now_stamp(),
        ],
    )
    .map_err(|e| HandlerErr::db_update(e, "resources"))?;

    Ok(json!({ "resourceId": id, "title": title }))
}

fn resources_list(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let course = get_optional_str(params, "course").map(|c| c.to_ascii_uppercase());
    let academic_year = params.get("academicYear").and_then(|v| v.as_u64());

    let mut stmt = conn
        .prepare(
            "SELECT id, title, description, file_type, course, academic_year,
                    file_path, original_file_name, file_size, uploaded_by,
                    downloads, created_at
             FROM resources
             WHERE (?1 IS NULL OR course = ?1)
               AND (?2 IS NULL OR academic_year = ?2)
             ORDER BY created_at DESC",
        )
        .map_err(HandlerErr::db_query)?;
    let rows: Vec<serde_json::Value> = stmt
        .query_map(
            rusqlite::params![course, academic_year.map(|y| y as i64)],
            |r| {
                Ok(json!({
                    "resourceId": r.get::<_, String>(0)?,
                    "title": r.get::<_, String>(1)?,
                    "description": r.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    "fileType": r.get::<_, String>(3)?,
                    "course": r.get::<_, String>(4)?,
                    "academicYear": r.get::<_, i64>(5)?,
                    "filePath": r.get::<_, String>(6)?,
                    "originalFileName": r.get::<_, String>(7)?,
                    "fileSize": r.get::<_, i64>(8)?,
                    "uploadedBy": r.get::<_, Option<String>>(9)?,
                    "downloads": r.get::<_, i64>(10)?,
                    "createdAt": r.get::<_, Option<String>>(11)?,
                }))
            },
        )
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db_query)?;

    Ok(json!({ "resources": rows }))
}

fn resources_record_download(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let resource_id = get_required_str(params, "resourceId")?;
    let updated = conn
        .execute(
            "UPDATE resources SET downloads = downloads + 1 WHERE id = ?",
            [&resource_id],
        )
        .map_err(|e| HandlerErr::db_update(e, "resources"))?;
    if updated == 0 {
        return Err(HandlerErr::not_found("resource not found"));
    }
    Ok(json!({ "ok": true }))
}

fn resources_delete(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let resource_id = get_required_str(params, "resourceId")?;
    let deleted = conn
        .execute("DELETE FROM resources WHERE id = ?", [&resource_id])
        .map_err(|e| HandlerErr::db_update(e, "resources"))?;
    if deleted == 0 {
        return Err(HandlerErr::not_found("resource not found"));
    }
    Ok(json!({ "ok": true }))
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
        "resources.add" => Some(with_db(state, req, resources_add)),
        "resources.list" => Some(with_db(state, req, resources_list)),
        "resources.recordDownload" => Some(with_db(state, req, resources_record_download)),
        "resources.delete" => Some(with_db(state, req, resources_delete)),
        _ => None,
    }
}
