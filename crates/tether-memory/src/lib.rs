mod exec;
mod store;

pub use store::MemoryStore;
