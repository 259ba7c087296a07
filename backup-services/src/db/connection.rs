use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use std::path::Path;

pub type DbPool = Pool<SqliteConnectionManager>;

const PRAGMAS: &str = "PRAGMA journal_mode = DELETE;
     PRAGMA synchronous = FULL;
     PRAGMA foreign_keys = ON;";

pub fn create_pool(db_path: &Path) -> anyhow::Result<DbPool> {
    // Pragmas are per connection, so every pooled connection runs them
    let manager = SqliteConnectionManager::file(db_path).with_init(|conn| conn.execute_batch(PRAGMAS));
    let pool = Pool::builder().max_size(4).build(manager)?;
    Ok(pool)
}
