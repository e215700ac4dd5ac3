//! Store implementations shipped with the engine

pub mod in_memory;

pub use in_memory::InMemoryStore;
