use anyhow::Context;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE_NAME: &str = "feeledger.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(&db_path)
        .with_context(|| format!("failed to open {}", db_path.to_string_lossy()))?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schools(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            name TEXT NOT NULL,
            FOREIGN KEY(school_id) REFERENCES schools(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_classes_school ON classes(school_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS fee_types(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            name TEXT NOT NULL,
            description TEXT,
            default_amount REAL,
            applicable_from TEXT,
            applicable_until TEXT,
            scheduled_date TEXT,
            FOREIGN KEY(school_id) REFERENCES schools(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_fee_types_school ON fee_types(school_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS fee_type_classes(
            fee_type_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            school_id TEXT NOT NULL,
            PRIMARY KEY(fee_type_id, class_id),
            FOREIGN KEY(fee_type_id) REFERENCES fee_types(id),
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_fee_type_classes_class ON fee_type_classes(class_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            class_id TEXT,
            name TEXT NOT NULL,
            roll_no TEXT,
            academic_year TEXT,
            FOREIGN KEY(school_id) REFERENCES schools(id),
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_school ON students(school_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class ON students(class_id)",
        [],
    )?;

    // No FOREIGN KEY on fee_type_id: a dangling reference is a legal state and
    // shows up in the ledger as an unknown fee type.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_fee_types(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            fee_type_id TEXT NOT NULL,
            assigned_amount REAL,
            discount REAL NOT NULL DEFAULT 0,
            discount_description TEXT,
            UNIQUE(student_id, fee_type_id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_student_fee_types_student ON student_fee_types(student_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_student_fee_types_fee_type ON student_fee_types(fee_type_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS payments(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            date TEXT NOT NULL,
            amount_paid REAL NOT NULL,
            mode_of_payment TEXT NOT NULL,
            receipt_number TEXT,
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_payments_student ON payments(student_id)",
        [],
    )?;

    ensure_payments_recorded_at(&conn)?;

    Ok(conn)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(
            serde_json::from_str(&s).with_context(|| format!("settings {} is not JSON", key))?,
        )),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

fn ensure_payments_recorded_at(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "payments", "recorded_at")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE payments ADD COLUMN recorded_at TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
