//! Agent configuration records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::id::generate_id;

/// Default sampling temperature for new agents
pub const DEFAULT_TEMPERATURE: f64 = 0.7;

/// Default completion budget for new agents
pub const DEFAULT_MAX_TOKENS: u32 = 1000;

/// Longest accepted agent name
pub const MAX_NAME_LEN: usize = 100;

/// Largest accepted completion budget
pub const MAX_TOKENS_LIMIT: u32 = 4000;

/// Agent lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    #[default]
    Active,
    Inactive,
    Archived,
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Inactive => write!(f, "inactive"),
            Self::Archived => write!(f, "archived"),
        }
    }
}

impl std::str::FromStr for AgentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            "archived" => Ok(Self::Archived),
            _ => Err(format!("Unknown agent status: {}", s)),
        }
    }
}

/// A user-owned LLM configuration
///
/// Agents are read-only inputs to task execution; the pipeline never
/// modifies them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Instruction prepended to every completion
    pub system_prompt: String,
    /// Model identifier resolved by the router
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub status: AgentStatus,
    #[serde(default)]
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    /// Create an active agent with default sampling settings
    pub fn new(
        user_id: impl Into<String>,
        name: impl Into<String>,
        system_prompt: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: generate_id(),
            user_id: user_id.into(),
            name: name.into(),
            description: None,
            system_prompt: system_prompt.into(),
            model: model.into(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            status: AgentStatus::Active,
            metadata: Value::Null,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Check field ranges, returning a message for the first violation
    pub fn validate(&self) -> Result<(), String> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err("Agent name must not be empty".to_string());
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(format!("Agent name must be at most {} characters", MAX_NAME_LEN));
        }
        if self.system_prompt.trim().is_empty() {
            return Err("Agent system prompt must not be empty".to_string());
        }
        if self.model.trim().is_empty() {
            return Err("Agent model must not be empty".to_string());
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(format!("Temperature {} is outside 0.0..=1.0", self.temperature));
        }
        if !(1..=MAX_TOKENS_LIMIT).contains(&self.max_tokens) {
            return Err(format!("max_tokens {} is outside 1..={}", self.max_tokens, MAX_TOKENS_LIMIT));
        }
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.status == AgentStatus::Active
    }
}
