//! Persisted-session history source.
//!
//! History lives outside the core (the agent CLI persists transcripts); the
//! session only needs a way to fetch the full message list for a session id.
//! The bundled implementation reads Claude-CLI style JSONL transcripts from
//! `<root>/<munged project path>/<session id>.jsonl`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::DateTime;
use log::warn;
use serde::Deserialize;
use serde_json::Value;
use skiff_protocol::{ChatMessage, MessageKind};
use tokio::fs;

use crate::error::{Result, SkiffError};

#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Fetch the full transcript for a persisted session.
    ///
    /// Failure must not yield a partial transcript: callers rely on
    /// all-or-nothing semantics when replacing session history.
    async fn load(&self, session_id: &str, working_dir: &Path) -> Result<Vec<ChatMessage>>;
}

/// Reads agent-CLI transcript files from a projects directory.
pub struct JsonlHistorySource {
    root: PathBuf,
}

/// One line of a transcript file. Unknown record types are skipped.
#[derive(Debug, Deserialize)]
struct RawRecord {
    #[serde(rename = "type")]
    record_type: String,
    timestamp: Option<String>,
    message: Option<Value>,
}

impl JsonlHistorySource {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Default location under the user's home directory.
    pub fn default_root() -> Option<Self> {
        dirs::home_dir().map(|home| Self::new(home.join(".claude").join("projects")))
    }

    fn transcript_path(&self, session_id: &str, working_dir: &Path) -> PathBuf {
        self.root
            .join(project_dir_name(working_dir))
            .join(format!("{session_id}.jsonl"))
    }

    fn parse_line(line: &str) -> Option<ChatMessage> {
        let record: RawRecord = match serde_json::from_str(line) {
            Ok(record) => record,
            Err(err) => {
                let display: String = line.chars().take(120).collect();
                warn!("skipping malformed transcript line: {err}: {display}");
                return None;
            }
        };

        let kind = match record.record_type.as_str() {
            "user" => MessageKind::User,
            "assistant" => MessageKind::Assistant,
            "system" => MessageKind::System,
            _ => return None,
        };

        let message = record.message?;
        let content = extract_text(&message);
        let timestamp = record
            .timestamp
            .as_deref()
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map(|dt| dt.timestamp_millis())
            .unwrap_or(0);

        Some(
            ChatMessage::new(kind, timestamp, content)
                .with_raw(serde_json::json!({ "message": message })),
        )
    }
}

#[async_trait]
impl HistorySource for JsonlHistorySource {
    async fn load(&self, session_id: &str, working_dir: &Path) -> Result<Vec<ChatMessage>> {
        let path = self.transcript_path(session_id, working_dir);
        let contents = fs::read_to_string(&path).await.map_err(|err| {
            SkiffError::history(format!("cannot read {}: {err}", path.display()))
        })?;

        let messages = contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(Self::parse_line)
            .collect();

        Ok(messages)
    }
}

/// Munge a project path into its transcript directory name: every path
/// separator and dot becomes a dash, matching the agent CLI's layout.
fn project_dir_name(working_dir: &Path) -> String {
    working_dir
        .to_string_lossy()
        .chars()
        .map(|c| match c {
            '/' | '\\' | '.' | ':' => '-',
            other => other,
        })
        .collect()
}

/// Pull display text out of a backend message body: either a plain string
/// `content` or the concatenated `text` blocks.
fn extract_text(message: &Value) -> String {
    match message.get("content") {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(blocks)) => blocks
            .iter()
            .filter_map(|block| {
                if block.get("type").and_then(Value::as_str) == Some("text") {
                    block.get("text").and_then(Value::as_str)
                } else {
                    None
                }
            })
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}
