use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use strum::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Parts(Vec<Part>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    pub fn image(data_uri: String) -> Self {
        Part::ImageUrl {
            image_url: ImageUrl { url: data_uri },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: Content,
}

/// The full chat history, replayed to the model on every request.
///
/// Turns can only be appended. Serialises as a bare JSON array of turns, which
/// is both the `messages` field of a request and the transcript file format.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new(system_prompt: &str) -> Self {
        let mut conversation = Self::default();
        conversation.push(Role::System, Content::Text(system_prompt.to_owned()));
        conversation
    }

    pub fn ask(&mut self, content: Content) {
        self.push(Role::User, content);
    }

    pub fn answer(&mut self, reply: String) {
        self.push(Role::Assistant, Content::Text(reply));
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    fn push(&mut self, role: Role, content: Content) {
        log::debug!("Appending {role} turn #{}", self.turns.len() + 1);
        self.turns.push(Turn { role, content });
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        let serialized =
            serde_json::to_string_pretty(self).context("Failed to serialise transcript")?;
        tokio::fs::write(path, serialized)
            .await
            .with_context(|| format!("Failed to write transcript to {}", path.display()))
    }
}
