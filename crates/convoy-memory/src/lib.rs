pub mod engine;
pub mod error;
pub mod triggers;
pub mod types;

pub use engine::MemoryEngine;
pub use types::WindowSelection;
