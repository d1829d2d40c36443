use convoy_core::ids::{ChatId, DocumentId, MessageId, OrgId, PromptId, SummaryId, UserId};
use convoy_core::role::Role;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub id: OrgId,
    pub name: String,
    pub slug: String,
    pub deleted_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    /// Extensible attribute bag, stored as a JSON object.
    pub attributes: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub org_id: OrgId,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: ChatId,
    pub org_id: OrgId,
    pub user_id: UserId,
    pub title: String,
    pub deleted_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::System => write!(f, "system"),
        }
    }
}

impl std::str::FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            "system" => Ok(MessageRole::System),
            other => Err(format!("unknown message role: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub role: MessageRole,
    pub content: String,
    pub created_at: String,
    /// Historical rows created before token accounting existed may lack this.
    pub token_count: Option<u32>,
    pub attributes: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prompt {
    pub id: PromptId,
    pub name: String,
    pub version: u32,
    pub content: String,
    pub active: bool,
    pub created_by: String,
    pub metadata: serde_json::Value,
    pub invocation_count: u64,
    pub mean_tokens: f64,
    pub mean_latency_ms: f64,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub id: SummaryId,
    pub chat_id: ChatId,
    pub summary_text: String,
    pub start_message_id: MessageId,
    pub end_message_id: MessageId,
    pub covered_message_count: u32,
    pub original_tokens: u32,
    pub summary_tokens: u32,
    pub compression_ratio: f64,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentState {
    Uploaded,
    Processing,
    Parsed,
    Failed,
}

impl std::fmt::Display for DocumentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DocumentState::Uploaded => "uploaded",
            DocumentState::Processing => "processing",
            DocumentState::Parsed => "parsed",
            DocumentState::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for DocumentState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uploaded" => Ok(DocumentState::Uploaded),
            "processing" => Ok(DocumentState::Processing),
            "parsed" => Ok(DocumentState::Parsed),
            "failed" => Ok(DocumentState::Failed),
            other => Err(format!("unknown document state: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub org_id: OrgId,
    pub user_id: UserId,
    pub filename: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub state: DocumentState,
    pub blob_path: String,
    pub page_count: Option<u32>,
    pub parsed_at: Option<String>,
    pub failure_reason: Option<String>,
    pub deleted_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: String,
    pub document_id: DocumentId,
    pub chunk_index: u32,
    pub content: String,
    pub char_count: u32,
    pub token_count: Option<u32>,
    pub created_at: String,
}
