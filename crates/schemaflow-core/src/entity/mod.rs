//! In-memory reference implementation of the entity-state repository
//! contract (spec §4.D), for exercising the engine without a database.

mod memory_store;

pub use memory_store::InMemoryEntityStateStore;
