//! Chat transcript and session state
//!
//! An in-memory, append-only message log for one conversation over a
//! crawled site. The transcript always starts with a synthetic assistant
//! greeting; the greeting is excluded from the regenerate pairing search
//! and is never replaced. "Regenerate" replaces the content of exactly
//! one assistant message in place, preserving its id and the order of
//! every other message.

use crate::crawl::CrawledSite;
use crate::error::{Error, Result};
use crate::llm::{ChatBackend, ModelChoice};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Fallback text when a send fails mid-conversation
const SEND_ERROR_TEXT: &str =
    "Sorry, I encountered an error processing your request. Please try again.";

/// Fallback text when a regenerate attempt fails
const REGENERATE_ERROR_TEXT: &str =
    "Sorry, I encountered an error regenerating the response. Please try again.";

/// Author of a chat turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The human asking questions
    User,
    /// The model (or the synthetic greeting)
    Assistant,
}

/// One role/content pair as sent to the completion service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    /// Author of the turn
    pub role: Role,
    /// Text of the turn
    pub content: String,
}

/// One message in a transcript
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    /// Unique id, monotonic by creation order
    pub id: u64,

    /// Author of the message
    pub role: Role,

    /// Text content; may embed citation markers
    pub content: String,

    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    /// View of this message as a wire turn
    pub fn as_turn(&self) -> ChatTurn {
        ChatTurn {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

/// Where a regenerate attempt will read from and write to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegenerateTarget {
    /// Id of the most recent user message
    pub user_id: u64,

    /// Id of the assistant message to replace, if one exists after the
    /// greeting; otherwise the regenerated answer is appended
    pub assistant_id: Option<u64>,
}

/// An append-only chat transcript
#[derive(Debug)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
    next_id: u64,
}

impl Transcript {
    /// Create a transcript opened by a synthetic assistant greeting
    pub fn with_greeting(greeting: impl Into<String>) -> Self {
        let mut transcript = Self {
            messages: Vec::new(),
            next_id: 1,
        };
        transcript.push(Role::Assistant, greeting.into());
        transcript
    }

    fn push(&mut self, role: Role, content: String) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.messages.push(ChatMessage {
            id,
            role,
            content,
            created_at: Utc::now(),
        });
        id
    }

    /// Append a user turn, returning its id
    pub fn push_user(&mut self, content: impl Into<String>) -> u64 {
        self.push(Role::User, content.into())
    }

    /// Append an assistant turn, returning its id
    pub fn push_assistant(&mut self, content: impl Into<String>) -> u64 {
        self.push(Role::Assistant, content.into())
    }

    /// All messages in order
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Replace the content of the message with the given id in place
    ///
    /// Only the content changes; id, role, position, and every other
    /// message are untouched.
    pub fn replace_message(&mut self, id: u64, content: impl Into<String>) -> Result<()> {
        match self.messages.iter_mut().find(|m| m.id == id) {
            Some(message) => {
                message.content = content.into();
                Ok(())
            }
            None => Err(Error::InvalidRequest(format!("no message with id {}", id))),
        }
    }

    /// Locate the most recent user turn and the assistant turn to replace
    ///
    /// Scans from the end of the transcript, skipping the greeting. With
    /// no prior user turn there is nothing to regenerate.
    pub fn regenerate_target(&self) -> Result<RegenerateTarget> {
        let mut user_id = None;
        let mut assistant_id = None;

        // Index 0 is the greeting and never participates
        for message in self.messages.iter().skip(1).rev() {
            match message.role {
                Role::User if user_id.is_none() => user_id = Some(message.id),
                Role::Assistant if assistant_id.is_none() => assistant_id = Some(message.id),
                _ => {}
            }
            if user_id.is_some() && assistant_id.is_some() {
                break;
            }
        }

        match user_id {
            Some(user_id) => Ok(RegenerateTarget {
                user_id,
                assistant_id,
            }),
            None => Err(Error::NothingToRegenerate),
        }
    }

    /// The turns up to and including the message with the given id
    pub fn history_through(&self, id: u64) -> Vec<ChatTurn> {
        let mut turns = Vec::new();
        for message in &self.messages {
            turns.push(message.as_turn());
            if message.id == id {
                break;
            }
        }
        turns
    }
}

/// A conversation over one crawled site, driven against an LLM backend
pub struct ChatSession<B: ChatBackend> {
    transcript: Transcript,
    site: CrawledSite,
    language: String,
    model: ModelChoice,
    backend: B,
}

impl<B: ChatBackend> ChatSession<B> {
    /// Start a session with the standard greeting for the site
    pub fn new(backend: B, site: CrawledSite, language: impl Into<String>, model: ModelChoice) -> Self {
        let greeting = format!(
            "Hi there! I've analyzed the content from {}. What would you like to know about it?",
            site.url
        );
        Self {
            transcript: Transcript::with_greeting(greeting),
            site,
            language: language.into(),
            model,
            backend,
        }
    }

    /// The transcript so far
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Ask a question and append the answer to the transcript
    ///
    /// On failure the transcript still records an assistant turn with a
    /// terminal error text, so the conversation shape stays consistent.
    pub async fn send(&mut self, text: impl Into<String>) -> Result<String> {
        let text = text.into();
        let user_id = self.transcript.push_user(text.clone());
        let history = self.transcript.history_through(user_id);

        match self
            .backend
            .chat(&self.site, &history, &text, &self.language, self.model)
            .await
        {
            Ok(answer) => {
                self.transcript.push_assistant(answer.clone());
                Ok(answer)
            }
            Err(err) => {
                warn!("Chat turn failed: {}", err);
                self.transcript.push_assistant(SEND_ERROR_TEXT);
                Err(err)
            }
        }
    }

    /// Regenerate the most recent answer
    ///
    /// Resends the history up to the most recent user turn and replaces
    /// the located assistant message in place, keeping its id. On failure
    /// the located message is replaced with a terminal error text rather
    /// than left unchanged, so a regenerate attempt always has a visible
    /// outcome.
    pub async fn regenerate(&mut self) -> Result<String> {
        let target = self.transcript.regenerate_target()?;
        debug!(?target, "Regenerating last answer");

        let history = self.transcript.history_through(target.user_id);
        let last_message = history
            .last()
            .map(|turn| turn.content.clone())
            .unwrap_or_default();

        match self
            .backend
            .chat(&self.site, &history, &last_message, &self.language, self.model)
            .await
        {
            Ok(answer) => {
                match target.assistant_id {
                    Some(id) => self.transcript.replace_message(id, answer.clone())?,
                    None => {
                        self.transcript.push_assistant(answer.clone());
                    }
                }
                Ok(answer)
            }
            Err(err) => {
                warn!("Regenerate failed: {}", err);
                if let Some(id) = target.assistant_id {
                    self.transcript.replace_message(id, REGENERATE_ERROR_TEXT)?;
                } else {
                    self.transcript.push_assistant(REGENERATE_ERROR_TEXT);
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawl::Page;
    use std::future::Future;
    use std::sync::Mutex;

    fn site() -> CrawledSite {
        CrawledSite {
            url: "https://example.com".to_string(),
            title: "Example".to_string(),
            pages: vec![Page {
                url: "https://example.com/".to_string(),
                title: "Example".to_string(),
                content: "content".to_string(),
                description: None,
            }],
            total_pages: 1,
        }
    }

    /// Backend that returns scripted answers or errors
    struct FakeBackend {
        responses: Mutex<Vec<Result<String>>>,
    }

    impl FakeBackend {
        fn new(responses: Vec<Result<String>>) -> Self {
            Self {
                responses: Mutex::new(responses),
            }
        }
    }

    impl ChatBackend for FakeBackend {
        fn chat(
            &self,
            _site: &CrawledSite,
            _history: &[ChatTurn],
            _last_message: &str,
            _language: &str,
            _model: ModelChoice,
        ) -> impl Future<Output = Result<String>> + Send {
            let response = self.responses.lock().unwrap().remove(0);
            async move { response }
        }
    }

    #[test]
    fn test_regenerate_target_picks_most_recent_pair() {
        let mut transcript = Transcript::with_greeting("greeting");
        transcript.push_user("hi");
        let a1 = transcript.push_assistant("A1");
        transcript.push_user("bye");
        let a2 = transcript.push_assistant("A2");

        let target = transcript.regenerate_target().unwrap();
        assert_eq!(target.assistant_id, Some(a2));
        assert_ne!(target.assistant_id, Some(a1));
        assert_eq!(
            target.user_id,
            transcript.messages()[3].id,
            "targets the later user turn"
        );
    }

    #[test]
    fn test_regenerate_target_on_greeting_only_transcript() {
        let transcript = Transcript::with_greeting("greeting");
        let result = transcript.regenerate_target();
        assert!(matches!(result, Err(Error::NothingToRegenerate)));
        assert_eq!(transcript.messages().len(), 1);
    }

    #[test]
    fn test_greeting_is_never_the_replace_target() {
        let mut transcript = Transcript::with_greeting("greeting");
        transcript.push_user("hi");

        // No assistant answer yet: the pair search must not fall back to
        // the greeting.
        let target = transcript.regenerate_target().unwrap();
        assert_eq!(target.assistant_id, None);
    }

    #[test]
    fn test_replace_message_preserves_everything_else() {
        let mut transcript = Transcript::with_greeting("greeting");
        transcript.push_user("hi");
        let a1 = transcript.push_assistant("A1");
        transcript.push_user("bye");
        let a2 = transcript.push_assistant("A2");

        transcript.replace_message(a2, "A2 regenerated").unwrap();

        let messages = transcript.messages();
        assert_eq!(messages.len(), 5);
        assert_eq!(messages[0].content, "greeting");
        assert_eq!(messages[1].content, "hi");
        assert_eq!(messages[2].content, "A1");
        assert_eq!(messages[2].id, a1);
        assert_eq!(messages[3].content, "bye");
        assert_eq!(messages[4].content, "A2 regenerated");
        assert_eq!(messages[4].id, a2, "replaced message keeps its id");
    }

    #[tokio::test]
    async fn test_session_send_appends_both_turns() {
        let backend = FakeBackend::new(vec![Ok("the answer".to_string())]);
        let mut session = ChatSession::new(backend, site(), "en", ModelChoice::default());

        let answer = session.send("what is this?").await.unwrap();
        assert_eq!(answer, "the answer");

        let messages = session.transcript().messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].role, Role::User);
        assert_eq!(messages[2].content, "the answer");
    }

    #[tokio::test]
    async fn test_session_regenerate_replaces_in_place() {
        let backend = FakeBackend::new(vec![
            Ok("first answer".to_string()),
            Ok("better answer".to_string()),
        ]);
        let mut session = ChatSession::new(backend, site(), "en", ModelChoice::default());

        session.send("question").await.unwrap();
        let original_id = session.transcript().messages()[2].id;

        session.regenerate().await.unwrap();
        let messages = session.transcript().messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[2].content, "better answer");
        assert_eq!(messages[2].id, original_id);
    }

    #[tokio::test]
    async fn test_session_regenerate_failure_leaves_definitive_outcome() {
        let backend = FakeBackend::new(vec![
            Ok("first answer".to_string()),
            Err(Error::Upstream {
                status_code: 500,
                message: "boom".to_string(),
            }),
        ]);
        let mut session = ChatSession::new(backend, site(), "en", ModelChoice::default());

        session.send("question").await.unwrap();
        let original_id = session.transcript().messages()[2].id;

        let result = session.regenerate().await;
        assert!(result.is_err());

        let messages = session.transcript().messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[2].content, REGENERATE_ERROR_TEXT);
        assert_eq!(messages[2].id, original_id);
        // The rest of the transcript is untouched
        assert_eq!(messages[1].content, "question");
    }
}
