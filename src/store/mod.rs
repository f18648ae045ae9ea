// Re-export the core store contract
pub use duetcore::store::*;

pub mod memory;

pub use memory::InMemorySignalingStore;
