pub mod turn;
pub mod types;

pub use turn::{stream_chat_turn, StreamTurnContext};
pub use types::{Frame, FrameUsage};
