pub mod error;
pub mod retrieve;
pub mod types;

pub use retrieve::{prepare_stream_turn, retrieve_and_answer, RagRetriever};
pub use types::{RagAnswer, RagContext, RetrievedDocument};
