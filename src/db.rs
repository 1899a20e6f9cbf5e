use rusqlite::Connection;
use std::path::Path;

pub fn open_db(db_path: &Path) -> anyhow::Result<Connection> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn open_db_in_memory() -> anyhow::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    init_schema(&conn)?;
    Ok(conn)
}

fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS teachers(
            teacher_id TEXT,
            teacher_name TEXT NOT NULL,
            mobile TEXT NOT NULL UNIQUE CHECK(length(mobile) = 10),
            district TEXT NOT NULL,
            service_type TEXT NOT NULL,
            training_group TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_teachers_district ON teachers(district)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS batches(
            batch_name TEXT NOT NULL UNIQUE,
            district TEXT NOT NULL,
            coordinator_name TEXT NOT NULL,
            service_type TEXT NOT NULL,
            training_group TEXT NOT NULL
        )",
        [],
    )?;

    // Links are denormalized on purpose; no foreign keys back to teachers or
    // batches, so a link can land even when its referenced row's chunk was
    // discarded.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS batch_teachers(
            batch_name TEXT NOT NULL,
            teacher_mobile TEXT NOT NULL,
            teacher_name TEXT NOT NULL,
            district TEXT NOT NULL,
            UNIQUE(batch_name, teacher_mobile)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_batch_teachers_mobile ON batch_teachers(teacher_mobile)",
        [],
    )?;

    Ok(())
}
