use serde::Serialize;

/// One SSE data frame, shaped exactly per §4.H. `token`/`done:false` for a
/// text delta, `done:true` plus `full_text` for the terminal frame.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Frame {
    Token {
        token: String,
        done: bool,
    },
    Completion {
        token: String,
        done: bool,
        #[serde(rename = "fullText")]
        full_text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        usage: Option<FrameUsage>,
        #[serde(skip_serializing_if = "Option::is_none")]
        rag_context: Option<serde_json::Value>,
    },
    Error {
        error: String,
        message: String,
    },
}

impl Frame {
    pub fn token(text: String) -> Self {
        Frame::Token { token: text, done: false }
    }

    pub fn completion(full_text: String, usage: Option<FrameUsage>, rag_context: Option<serde_json::Value>) -> Self {
        Frame::Completion {
            token: String::new(),
            done: true,
            full_text,
            usage,
            rag_context,
        }
    }

    pub fn error(message: String) -> Self {
        Frame::Error { error: "stream_error".to_string(), message }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FrameUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}
