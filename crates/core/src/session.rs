//! Session and Turn domain types.
//!
//! A Session is the unit of interaction: it owns zero-or-one active
//! document and an append-only conversation history. Turns are never
//! reordered; truncation evicts oldest-first.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Subscription tier supplied by the external payment provider.
///
/// The service only consumes the flag: free sessions expire, and free
/// study-artifact generation is capped per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Free,
    Premium,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Premium => "premium",
        }
    }
}

impl std::str::FromStr for Tier {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "premium" | "paid" => Ok(Tier::Premium),
            "free" => Ok(Tier::Free),
            _ => Err(()),
        }
    }
}

/// The broad interaction mode a session was opened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// Ad-hoc Q&A over the active document (or ungrounded).
    Chat,
    /// Deep-study: quiz/flashcard/summary generation plus chat.
    Study,
}

impl SessionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionMode::Chat => "chat",
            SessionMode::Study => "study",
        }
    }
}

impl std::str::FromStr for SessionMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chat" => Ok(SessionMode::Chat),
            "study" => Ok(SessionMode::Study),
            _ => Err(()),
        }
    }
}

/// The role of a turn's author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single turn in a session's conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// Estimated token count of `text`, fixed at append time.
    pub token_count: usize,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    fn new(role: Role, text: impl Into<String>) -> Self {
        let text = text.into();
        let token_count = crate::token::estimate_turn_tokens(&text);
        Self {
            role,
            text,
            timestamp: Utc::now(),
            token_count,
        }
    }
}

/// A study session: one user, an optional active document, and history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,

    /// Verified user id from the external auth provider.
    pub user_id: String,

    /// Tier at last contact; refreshed per request.
    pub tier: Tier,

    pub mode: SessionMode,

    /// The currently ingested document, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_document_id: Option<String>,

    /// Ordered turns, append-only until truncation.
    pub history: Vec<Turn>,

    /// Study artifacts generated in this session (tier cap counts these).
    #[serde(default)]
    pub artifacts_generated: u32,

    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,

    /// Absent for premium sessions; free sessions expire after inactivity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(user_id: impl Into<String>, tier: Tier, mode: SessionMode) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            user_id: user_id.into(),
            tier,
            mode,
            active_document_id: None,
            history: Vec::new(),
            artifacts_generated: 0,
            created_at: now,
            last_active: now,
            expires_at: None,
        }
    }

    /// Append a turn and bump the activity timestamps.
    ///
    /// Expiry slides with activity: callers that enforce a TTL re-derive
    /// `expires_at` from `last_active` after each touch.
    pub fn push(&mut self, turn: Turn) {
        self.last_active = Utc::now();
        self.history.push(turn);
    }

    /// Refresh activity and, for free sessions, the sliding expiry.
    pub fn touch(&mut self, ttl: Option<Duration>) {
        self.last_active = Utc::now();
        self.expires_at = match (self.tier, ttl) {
            (Tier::Free, Some(ttl)) => Some(self.last_active + ttl),
            _ => None,
        };
    }

    /// Whether the session has passed its expiry.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Total estimated token count of the history.
    pub fn history_tokens(&self) -> usize {
        self.history.iter().map(|t| t.token_count).sum()
    }

    /// Trim oldest turns until at most `max_turns` remain.
    pub fn truncate_history(&mut self, max_turns: usize) {
        if self.history.len() > max_turns {
            let excess = self.history.len() - max_turns;
            self.history.drain(..excess);
        }
    }
}
