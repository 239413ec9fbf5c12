pub mod db;
pub mod file_store;
pub mod memory;

pub use db::DbAdapter;
pub use file_store::FileStore;
pub use memory::MemoryStore;
