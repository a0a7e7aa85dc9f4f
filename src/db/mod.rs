//! Document storage
//!
//! The ODM talks to a [`DocumentStore`]. [`MongoStore`] is the production
//! backend, [`MemoryStore`] keeps everything in-process for tests and dev mode.

pub mod filter;
pub mod memory;
pub mod mongo;
pub mod store;

pub use memory::MemoryStore;
pub use mongo::{MongoClient, MongoStore};
pub use store::{DocumentStore, FindSpec};
