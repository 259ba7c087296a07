use crate::db::connection::DbPool;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS backup_instances (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  created_at TEXT NOT NULL,
  total_size INTEGER NOT NULL DEFAULT 0,
  structure TEXT NOT NULL,
  auto_job_id INTEGER
);

CREATE TABLE IF NOT EXISTS backed_up_files (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  backup_instance_id INTEGER NOT NULL REFERENCES backup_instances(id) ON DELETE CASCADE,
  relative_path TEXT NOT NULL,
  size INTEGER NOT NULL,
  file_hash TEXT NOT NULL,
  UNIQUE(backup_instance_id, relative_path)
);

CREATE INDEX IF NOT EXISTS idx_backed_up_files_instance ON backed_up_files(backup_instance_id);
CREATE INDEX IF NOT EXISTS idx_backup_instances_created ON backup_instances(created_at DESC);
"#;

pub fn migrate(pool: &DbPool) -> anyhow::Result<()> {
    tracing::info!("[DB] Starting database migration...");

    let conn = pool.get()?;
    conn.execute_batch(SCHEMA)?;

    tracing::info!("[DB] Migration completed successfully");
    Ok(())
}
