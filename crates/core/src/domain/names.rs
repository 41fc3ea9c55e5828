// Queue, Topic and Namespace Domain Model

use crate::error::{AppError, Result};

/// Namespace applied when none is configured
pub const DEFAULT_NAMESPACE: &str = "feedq:";

/// Prefix isolating one logical deployment's keys inside a shared store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace(String);

impl Namespace {
    pub fn new(prefix: impl Into<String>) -> Result<Self> {
        let prefix = prefix.into();
        if prefix.is_empty() {
            return Err(AppError::Config(
                "namespace cannot be empty (use Namespace::none())".to_string(),
            ));
        }
        if prefix.chars().any(char::is_whitespace) {
            return Err(AppError::Config(format!(
                "namespace '{}' contains whitespace",
                prefix
            )));
        }
        Ok(Self(prefix))
    }

    /// No prefix at all: keys reach the store exactly as named
    pub fn none() -> Self {
        Self(String::new())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Store key for a logical name
    pub fn key(&self, name: &str) -> String {
        format!("{}{}", self.0, name)
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self(DEFAULT_NAMESPACE.to_string())
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn validate_name(kind: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(AppError::Validation(format!("{} name cannot be empty", kind)));
    }
    if name.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(AppError::Validation(format!(
            "{} name '{}' contains whitespace or control characters",
            kind, name
        )));
    }
    Ok(())
}

/// Logical name of a durable FIFO list
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueueName(String);

impl QueueName {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate_name("queue", &name)?;
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Logical name of a broadcast channel
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicName(String);

impl TopicName {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate_name("topic", &name)?;
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TopicName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
