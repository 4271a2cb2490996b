use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::feed::command::{parse_command, Command, ParsedCommand};
use crate::feed::error::FeedError;
use crate::feed::subscription::{Content, FeedSubscription};

/// Source-specific plugin driven by a [`FeedEngine`](crate::FeedEngine).
///
/// The engine owns scheduling, persistence and command handling; a feeder
/// only knows how to fetch one subscription and, optionally, how to read its
/// own command syntax.
///
/// `fetch` should honor `token` and is responsible for deduplication, usually
/// through a [`SeenFilter`](crate::SeenFilter). Errors are logged by the
/// engine and retried on the next tick.
#[async_trait]
pub trait Feeder: Send + Sync + 'static {
    /// Short feed name (`rss`, `hn`); prefixes user-visible replies.
    fn name(&self) -> &str;

    /// Store table holding this feed's subscriptions.
    fn table_name(&self) -> &str;

    /// Fetches new items for `sub`.
    async fn fetch(&self, token: &CancellationToken, sub: &FeedSubscription) -> anyhow::Result<Vec<Content>>;

    /// Parses a raw command; the default grammar is [`parse_command`].
    fn parse_command(&self, cmd: &Command) -> Result<ParsedCommand, FeedError> {
        parse_command(self.name(), cmd)
    }
}
