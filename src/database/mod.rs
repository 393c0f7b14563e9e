pub mod manager;
pub mod memory;
pub mod postgres;
pub mod store;

pub use manager::{DatabaseError, DatabaseManager};
pub use memory::{JournalEntry, MemoryStore};
pub use postgres::PgStore;
pub use store::{Document, Session, Store, StoreOp};
