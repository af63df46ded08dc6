//! Command registry: ordered (pattern -> handler) table built at startup.

use async_trait::async_trait;
use regex::Regex;
use std::fmt;
use std::sync::Arc;

use super::format::Reply;
use super::lease::LeaseManager;
use crate::cluster::ClusterGateway;
use crate::error::Result;

/// Everything a handler may touch while serving one message.
pub struct Context<'a> {
    /// Message text with the bot mention stripped.
    pub text: &'a str,
    /// Chat identity of the sender.
    pub requester: &'a str,
    pub registry: &'a Registry,
    pub gateway: &'a dyn ClusterGateway,
    pub leases: &'a LeaseManager,
}

/// A chat command implementation.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Name used in request logs.
    fn name(&self) -> &str;

    async fn handle(&self, ctx: &Context<'_>, captures: &[String]) -> Result<Reply>;
}

pub struct Command {
    pub pattern: Regex,
    pub handler: Arc<dyn Handler>,
    pub description: String,
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("pattern", &self.pattern.as_str())
            .field("handler", &self.handler.name())
            .field("description", &self.description)
            .finish()
    }
}

/// Commands in registration order.
#[derive(Debug, Default)]
pub struct Registry {
    commands: Vec<Command>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command. Re-registering a pattern replaces its handler and
    /// description but keeps its first position.
    pub fn register(
        &mut self,
        pattern: &str,
        handler: Arc<dyn Handler>,
        description: impl Into<String>,
    ) -> Result<()> {
        let description = description.into();

        if let Some(existing) = self
            .commands
            .iter_mut()
            .find(|c| c.pattern.as_str() == pattern)
        {
            tracing::warn!("command pattern '{}' registered twice, replacing", pattern);
            existing.handler = handler;
            existing.description = description;
            return Ok(());
        }

        self.commands.push(Command {
            pattern: Regex::new(pattern)?,
            handler,
            description,
        });
        Ok(())
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// One `pattern    description` line per command.
    pub fn help_lines(&self) -> Vec<String> {
        self.commands
            .iter()
            .map(|c| format!("{}    {}", c.pattern.as_str(), c.description))
            .collect()
    }
}
