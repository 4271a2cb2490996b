use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::feed::command::Command;
use crate::feed::error::FeedError;

/// Anything that accepts raw commands; implemented by every
/// [`FeedEngine`](crate::FeedEngine).
#[async_trait]
pub trait HandleCommand: Send + Sync {
    async fn handle_command(&self, cmd: Command) -> Result<(), FeedError>;
}

/// Routes commands to handlers by command name.
///
/// Names are matched case-insensitively and without the leading `/`, so
/// `/RSS`, `/rss` and `rss` reach the same handler.
#[derive(Clone, Default)]
pub struct CommandRouter {
    routes: BTreeMap<String, Arc<dyn HandleCommand>>,
}

fn normalize(name: &str) -> String {
    name.trim().trim_start_matches('/').to_lowercase()
}

impl CommandRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `name`, replacing any previous one.
    pub fn with_route(mut self, name: &str, handler: Arc<dyn HandleCommand>) -> Self {
        self.routes.insert(normalize(name), handler);
        self
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }

    pub async fn route(&self, cmd: Command) -> Result<(), FeedError> {
        let key = normalize(&cmd.name);
        let Some(handler) = self.routes.get(&key) else {
            debug!(command = %cmd.name, "no route");
            return Err(FeedError::UnknownCommand { name: cmd.name });
        };
        handler.handle_command(cmd).await
    }
}

#[async_trait]
impl HandleCommand for CommandRouter {
    async fn handle_command(&self, cmd: Command) -> Result<(), FeedError> {
        self.route(cmd).await
    }
}
