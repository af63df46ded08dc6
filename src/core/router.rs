//! Command routing: pick the first registered pattern that matches.
//!
//! Overlapping patterns are resolved by registration order, never by
//! specificity. Routing performs no I/O.

use async_trait::async_trait;

use super::format::Reply;
use super::registry::{Context, Handler, Registry};
use crate::error::Result;

/// Result of routing one message.
pub struct DispatchOutcome<'r> {
    /// `None` when the fallback handler was selected.
    pub matched_pattern: Option<&'r str>,
    /// Capture groups, left to right. Groups that did not participate are empty.
    pub captures: Vec<String>,
    pub handler: &'r dyn Handler,
}

impl DispatchOutcome<'_> {
    pub fn is_fallback(&self) -> bool {
        self.matched_pattern.is_none()
    }
}

/// Replies to anything no registered pattern recognizes.
pub struct Unrecognized;

#[async_trait]
impl Handler for Unrecognized {
    fn name(&self) -> &str {
        "unsupported_command"
    }

    async fn handle(&self, ctx: &Context<'_>, _captures: &[String]) -> Result<Reply> {
        tracing::debug!("the message text not currently handled: {}", ctx.text);
        Ok(Reply::Text(format!("Sorry, I don't understand: {}", ctx.text)))
    }
}

static FALLBACK: Unrecognized = Unrecognized;

/// Select the handler for `text`.
pub fn dispatch<'r>(registry: &'r Registry, text: &str) -> DispatchOutcome<'r> {
    for command in registry.commands() {
        if let Some(caps) = command.pattern.captures(text) {
            let captures = caps
                .iter()
                .skip(1)
                .map(|m| m.map(|m| m.as_str().to_string()).unwrap_or_default())
                .collect();

            return DispatchOutcome {
                matched_pattern: Some(command.pattern.as_str()),
                captures,
                handler: command.handler.as_ref(),
            };
        }
    }

    DispatchOutcome {
        matched_pattern: None,
        captures: Vec::new(),
        handler: &FALLBACK,
    }
}
