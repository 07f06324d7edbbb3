pub mod db;
pub mod embeddings;
pub mod memory;
pub mod metric;
pub mod models;
pub mod notes;
pub mod queue;
pub mod schema;
pub mod store;
pub mod vector;

mod error;

pub use error::Error;
pub use memory::MemoryStore;
pub use store::{BoxFuture, NoteStore, PgStore, UnitOfWork, VectorStore};

pub type Result<T, E = Error> = std::result::Result<T, E>;
