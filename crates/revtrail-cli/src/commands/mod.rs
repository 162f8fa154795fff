pub mod query;
pub mod record;

use std::path::Path;
use std::sync::Arc;

use revtrail_core::EntityRef;
use revtrail_store::SqliteHistoryStore;

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Open (creating if needed) the history database at `db`
pub fn open_store(db: &str) -> Result<Arc<SqliteHistoryStore>, Box<dyn std::error::Error>> {
    if let Some(parent) = Path::new(db).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(Arc::new(SqliteHistoryStore::open(db)?))
}

pub fn entity(collection: &str, id: &str) -> Result<EntityRef, Box<dyn std::error::Error>> {
    Ok(EntityRef::new(collection, id)?)
}

pub fn read_json(path: &Path) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}
