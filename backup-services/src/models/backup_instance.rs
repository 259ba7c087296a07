use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupInstance {
    pub id: i64,
    pub created_at: String,
    pub total_size: i64,
    pub structure: String,
    pub auto_job_id: Option<i64>,
}

fn row_to_instance(row: &Row) -> rusqlite::Result<BackupInstance> {
    Ok(BackupInstance {
        id: row.get("id")?,
        created_at: row.get("created_at")?,
        total_size: row.get("total_size")?,
        structure: row.get("structure")?,
        auto_job_id: row.get("auto_job_id")?,
    })
}

pub fn find_by_id(conn: &Connection, id: i64) -> anyhow::Result<Option<BackupInstance>> {
    let mut stmt = conn.prepare("SELECT * FROM backup_instances WHERE id = ?")?;
    let mut rows = stmt.query_map(params![id], |row| row_to_instance(row))?;
    Ok(rows.next().transpose()?)
}

/// Newest first.
pub fn find_recent(conn: &Connection, limit: u32) -> anyhow::Result<Vec<BackupInstance>> {
    let mut stmt = conn.prepare("SELECT * FROM backup_instances ORDER BY id DESC LIMIT ?")?;
    let rows = stmt.query_map(params![limit], |row| row_to_instance(row))?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub struct CreateInstanceData<'a> {
    pub structure: &'a str,
    pub total_size: i64,
    pub auto_job_id: Option<i64>,
}

/// Insert an instance row and return its id.
pub fn create(conn: &Connection, data: &CreateInstanceData) -> anyhow::Result<i64> {
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO backup_instances (created_at, total_size, structure, auto_job_id)
         VALUES (?1, ?2, ?3, ?4)",
        params![now, data.total_size, data.structure, data.auto_job_id],
    )?;
    Ok(conn.last_insert_rowid())
}
