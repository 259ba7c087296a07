use backup_bus::protocol::FileDescriptor;
use rusqlite::{params, Connection, Row};

#[derive(Debug, Clone)]
pub struct BackedUpFile {
    pub id: i64,
    pub backup_instance_id: i64,
    pub relative_path: String,
    pub size: i64,
    pub file_hash: String,
}

impl From<BackedUpFile> for FileDescriptor {
    fn from(file: BackedUpFile) -> Self {
        FileDescriptor {
            relative_path: file.relative_path,
            hash: file.file_hash,
            size: file.size.max(0) as u64,
        }
    }
}

fn row_to_file(row: &Row) -> rusqlite::Result<BackedUpFile> {
    Ok(BackedUpFile {
        id: row.get("id")?,
        backup_instance_id: row.get("backup_instance_id")?,
        relative_path: row.get("relative_path")?,
        size: row.get("size")?,
        file_hash: row.get("file_hash")?,
    })
}

pub fn create(conn: &Connection, instance_id: i64, file: &FileDescriptor) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO backed_up_files (backup_instance_id, relative_path, size, file_hash)
         VALUES (?1, ?2, ?3, ?4)",
        params![instance_id, file.relative_path, file.size as i64, file.hash],
    )?;
    Ok(())
}

/// Files of one instance ordered by path, optionally restricted to one path.
pub fn find_by_instance(
    conn: &Connection,
    instance_id: i64,
    relative_path: Option<&str>,
) -> anyhow::Result<Vec<BackedUpFile>> {
    let rows = match relative_path {
        Some(path) => {
            let mut stmt = conn.prepare(
                "SELECT * FROM backed_up_files WHERE backup_instance_id = ? AND relative_path = ? ORDER BY relative_path",
            )?;
            let rows = stmt.query_map(params![instance_id, path], |row| row_to_file(row))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        }
        None => {
            let mut stmt = conn.prepare(
                "SELECT * FROM backed_up_files WHERE backup_instance_id = ? ORDER BY relative_path",
            )?;
            let rows = stmt.query_map(params![instance_id], |row| row_to_file(row))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        }
    };
    Ok(rows)
}
