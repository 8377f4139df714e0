//! In-memory task store.
//!
//! All records and their secondary indexes sit behind one reader-writer
//! lock. Mutations hold the write lock for their whole read-modify-write
//! sequence; listings hold the read lock while they copy results out.

mod indexes;
mod queue;
mod store;

pub use store::InMemoryTaskStore;
