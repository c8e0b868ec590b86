mod record;
mod sqlite;
mod storage;

pub use record::{RunRecord, RunStatus};
pub use sqlite::SqliteStorage;
pub use storage::Storage;
