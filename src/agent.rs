/// Copilot Studio conversation client — start a conversation, ask questions.
///
/// A thin wrapper over the authenticated conversation endpoints of the Power
/// Platform API. The client owns the conversation identifier; callers thread
/// a bearer token through every call.
use std::sync::{Mutex, PoisonError};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde::Deserialize;

use crate::config::AgentConfig;

const API_VERSION: &str = "2022-03-01-preview";

/// Filler shown when a reply contained no message activities with text.
const EMPTY_REPLY_FALLBACK: &str = "I received your message but don't have a response.";

// ── Trait seam ────────────────────────────────────────────────────────────────

/// One conversation with a remote agent. Implementations own the conversation
/// identifier across calls.
#[async_trait]
pub trait AgentSession: Send + Sync {
    /// Open a new conversation. The reply's `content` is the greeting, empty
    /// when the agent offers none — the caller decides what to display.
    async fn start(&self, token: &str) -> Result<AgentReply>;

    /// Send one message within the conversation. A missing conversation id is
    /// tolerated on a first-ever call.
    async fn send(&self, text: &str, token: &str) -> Result<AgentReply>;
}

#[derive(Debug, Clone)]
pub struct AgentReply {
    pub content: String,
    pub conversation_id: Option<String>,
}

// ── Wire types ────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct ActivityEnvelope {
    #[serde(default)]
    activities: Vec<Activity>,
}

#[derive(Debug, Default, Deserialize)]
struct Activity {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    conversation: Option<ConversationAccount>,
}

#[derive(Debug, Default, Deserialize)]
struct ConversationAccount {
    #[serde(default)]
    id: String,
}

// ── Client ────────────────────────────────────────────────────────────────────

pub struct CopilotClient {
    http: reqwest::Client,
    config: AgentConfig,
    conversation_id: Mutex<Option<String>>,
}

impl CopilotClient {
    pub fn new(config: AgentConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            conversation_id: Mutex::new(None),
        }
    }

    /// Conversation id captured from the last start/send, if any.
    pub fn conversation_id(&self) -> Option<String> {
        self.conversation_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn conversations_url(&self, conversation: Option<&str>) -> String {
        let host = environment_host(&self.config.environment_id);
        let base = format!(
            "https://{host}/copilotstudio/dataverse-backed/authenticated/bots/{}/conversations",
            self.config.agent_id
        );
        match conversation {
            Some(id) => format!("{base}/{id}?api-version={API_VERSION}"),
            None => format!("{base}?api-version={API_VERSION}"),
        }
    }

    async fn post_activity(
        &self,
        url: &str,
        token: &str,
        body: serde_json::Value,
        op: &str,
    ) -> Result<ActivityEnvelope> {
        let resp = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| anyhow!("{op}: {e}"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("{op}: API error {status}: {text}"));
        }

        resp.json()
            .await
            .map_err(|e| anyhow!("{op}: invalid response: {e}"))
    }

    fn remember_conversation(&self, envelope: &ActivityEnvelope) {
        let id = envelope.activities.iter().find_map(|a| {
            a.conversation
                .as_ref()
                .filter(|c| !c.id.is_empty())
                .map(|c| c.id.clone())
        });
        if let Some(id) = id {
            *self
                .conversation_id
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(id);
        }
    }
}

#[async_trait]
impl AgentSession for CopilotClient {
    async fn start(&self, token: &str) -> Result<AgentReply> {
        let url = self.conversations_url(None);
        let body = serde_json::json!({ "emitStartConversationEvent": true });
        let envelope = self
            .post_activity(&url, token, body, "failed to start conversation")
            .await?;
        self.remember_conversation(&envelope);
        Ok(AgentReply {
            content: collect_reply(&envelope.activities),
            conversation_id: self.conversation_id(),
        })
    }

    async fn send(&self, text: &str, token: &str) -> Result<AgentReply> {
        let conversation = self.conversation_id();
        let url = self.conversations_url(conversation.as_deref());
        let body = serde_json::json!({
            "activity": { "type": "message", "text": text }
        });
        let envelope = self
            .post_activity(&url, token, body, "failed to send message")
            .await?;
        self.remember_conversation(&envelope);
        Ok(AgentReply {
            content: send_content(&envelope.activities),
            conversation_id: self.conversation_id(),
        })
    }
}

// ── Reply assembly ────────────────────────────────────────────────────────────

/// Concatenate the text of all message activities: each fragment trimmed,
/// joined by single spaces.
fn collect_reply(activities: &[Activity]) -> String {
    let mut out = String::new();
    for activity in activities {
        if activity.kind != "message" {
            continue;
        }
        let Some(text) = &activity.text else { continue };
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(trimmed);
    }
    out
}

fn send_content(activities: &[Activity]) -> String {
    let content = collect_reply(activities);
    if content.is_empty() {
        EMPTY_REPLY_FALLBACK.to_string()
    } else {
        content
    }
}

/// Derive the Power Platform API host for an environment id: the id
/// lowercased with hyphens removed, split before its last two characters.
fn environment_host(environment_id: &str) -> String {
    let normalized: String = environment_id
        .to_lowercase()
        .chars()
        .filter(|c| *c != '-')
        .collect();
    if normalized.len() > 2 {
        let split = normalized.len() - 2;
        format!(
            "{}.{}.environment.api.powerplatform.com",
            &normalized[..split],
            &normalized[split..]
        )
    } else {
        format!("{normalized}.environment.api.powerplatform.com")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(text: &str) -> Activity {
        Activity {
            kind: "message".to_string(),
            text: Some(text.to_string()),
            conversation: None,
        }
    }

    #[test]
    fn reply_fragments_are_trimmed_and_joined() {
        let activities = vec![message("  Hello  "), message("world.  ")];
        assert_eq!(collect_reply(&activities), "Hello world.");
    }

    #[test]
    fn non_message_activities_are_skipped() {
        let activities = vec![
            Activity {
                kind: "typing".to_string(),
                text: Some("ignored".to_string()),
                conversation: None,
            },
            message("kept"),
            Activity {
                kind: "message".to_string(),
                text: None,
                conversation: None,
            },
        ];
        assert_eq!(collect_reply(&activities), "kept");
    }

    #[test]
    fn empty_reply_falls_back_to_filler() {
        assert_eq!(send_content(&[]), EMPTY_REPLY_FALLBACK);
        assert_eq!(send_content(&[message("hi")]), "hi");
    }

    #[test]
    fn environment_host_splits_before_last_two_chars() {
        assert_eq!(
            environment_host("A1B2C3D4-E5F6-0708-090A-0B0C0D0E0F10"),
            "a1b2c3d4e5f60708090a0b0c0d0e0f.10.environment.api.powerplatform.com"
        );
    }

    #[test]
    fn conversation_id_is_captured_and_kept() {
        let client = CopilotClient::new(AgentConfig::default());
        assert_eq!(client.conversation_id(), None);

        let envelope = ActivityEnvelope {
            activities: vec![Activity {
                kind: "message".to_string(),
                text: Some("hi".to_string()),
                conversation: Some(ConversationAccount {
                    id: "conv-42".to_string(),
                }),
            }],
        };
        client.remember_conversation(&envelope);
        assert_eq!(client.conversation_id(), Some("conv-42".to_string()));

        // An envelope without an id leaves the stored one untouched.
        client.remember_conversation(&ActivityEnvelope::default());
        assert_eq!(client.conversation_id(), Some("conv-42".to_string()));
    }
}
