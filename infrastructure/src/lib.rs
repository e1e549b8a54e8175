// Module declarations
pub mod persistence;

// Re-export the store implementations
pub use persistence::InMemoryDocumentStore;
