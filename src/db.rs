use rusqlite::Connection;
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("registrar.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            register_no TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            course TEXT NOT NULL,
            batch_start INTEGER NOT NULL,
            batch_end INTEGER NOT NULL,
            created_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_cohort
         ON students(course, batch_start, batch_end)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance_records(
            id TEXT PRIMARY KEY,
            register_no TEXT NOT NULL,
            name TEXT NOT NULL,
            current_year TEXT,
            course TEXT NOT NULL,
            batch_start INTEGER NOT NULL,
            batch_end INTEGER NOT NULL,
            month INTEGER NOT NULL,
            year INTEGER NOT NULL,
            theory_total INTEGER NOT NULL DEFAULT 0,
            theory_attended INTEGER NOT NULL DEFAULT 0,
            practical_total INTEGER NOT NULL DEFAULT 0,
            practical_attended INTEGER NOT NULL DEFAULT 0,
            clinical_total INTEGER NOT NULL DEFAULT 0,
            clinical_attended INTEGER NOT NULL DEFAULT 0,
            theory_percentage TEXT NOT NULL DEFAULT '0.00',
            practical_percentage TEXT NOT NULL DEFAULT '0.00',
            clinical_percentage TEXT NOT NULL DEFAULT '0.00',
            average_percentage TEXT NOT NULL DEFAULT '0.00',
            updated_at TEXT,
            FOREIGN KEY(register_no) REFERENCES students(register_no),
            UNIQUE(register_no, month, year)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_cohort_period
         ON attendance_records(course, batch_start, batch_end, year, month)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance_averages(
            id TEXT PRIMARY KEY,
            register_no TEXT NOT NULL,
            name TEXT NOT NULL,
            course TEXT NOT NULL,
            batch_start INTEGER NOT NULL,
            batch_end INTEGER NOT NULL,
            start_month INTEGER NOT NULL,
            start_year INTEGER NOT NULL,
            end_month INTEGER NOT NULL,
            end_year INTEGER NOT NULL,
            theory_percentage TEXT NOT NULL DEFAULT '0.00',
            practical_percentage TEXT NOT NULL DEFAULT '0.00',
            clinical_percentage TEXT NOT NULL DEFAULT '0.00',
            average_attendance TEXT NOT NULL DEFAULT '0.00',
            updated_at TEXT,
            FOREIGN KEY(register_no) REFERENCES students(register_no),
            UNIQUE(register_no, start_month, start_year, end_month, end_year)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_averages_cohort
         ON attendance_averages(course, batch_start, batch_end)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assessments(
            id TEXT PRIMARY KEY,
            register_no TEXT NOT NULL,
            name TEXT NOT NULL,
            current_year TEXT,
            course TEXT NOT NULL,
            batch_start INTEGER NOT NULL,
            batch_end INTEGER NOT NULL,
            assessment_type TEXT NOT NULL,
            theory70 INTEGER NOT NULL DEFAULT 0,
            theory20 INTEGER NOT NULL DEFAULT 0,
            theory10 INTEGER NOT NULL DEFAULT 0,
            total_theory INTEGER NOT NULL DEFAULT 0,
            practical90 INTEGER NOT NULL DEFAULT 0,
            practical10 INTEGER NOT NULL DEFAULT 0,
            total_practical INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT,
            FOREIGN KEY(register_no) REFERENCES students(register_no),
            UNIQUE(register_no, assessment_type)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assessments_cohort
         ON assessments(course, batch_start, batch_end, assessment_type)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS faculty(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            designation TEXT NOT NULL,
            department TEXT,
            contact_no TEXT,
            activities TEXT NOT NULL DEFAULT '[]',
            created_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_faculty_name ON faculty(name)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS resources(
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT,
            file_type TEXT NOT NULL,
            course TEXT NOT NULL,
            academic_year INTEGER NOT NULL,
            file_path TEXT NOT NULL,
            original_file_name TEXT NOT NULL,
            file_size INTEGER NOT NULL,
            uploaded_by TEXT,
            downloads INTEGER NOT NULL DEFAULT 0,
            created_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_resources_course_year
         ON resources(course, academic_year)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_resources_created ON resources(created_at)",
        [],
    )?;

    Ok(conn)
}
