pub mod store;
pub mod sqlite;
pub mod memory;
pub mod schema;
pub mod record;

pub use memory::MemoryStore;
pub use record::{PersistedAgentState, SCHEMA_VERSION};
pub use sqlite::SqliteStore;
pub use store::StateStore;
