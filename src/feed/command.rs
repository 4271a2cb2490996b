//! Inbound commands and the default text grammar.
//!
//! ```text
//! /rss add golang 90 https://go.dev/blog/feed.atom
//!  │    │   │     │  └─ url        (optional)
//!  │    │   │     └──── interval   (optional, minutes)
//!  │    │   └────────── name       (required for add/remove)
//!  │    └────────────── action     add | list | remove
//!  └─────────────────── command name, used by the router
//! ```
//!
//! A fifth token is taken as the platform. Validation against the configured
//! minimum interval happens in the engine, not here.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::feed::error::FeedError;
use crate::feed::ThreadId;

/// Raw command as received from a chat frontend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    /// Command name (`/rss`, `/hn`, ...).
    pub name: String,
    /// Thread the command came from; replies go there.
    pub thread_id: ThreadId,
    /// Arguments after the command name.
    pub text: String,
}

impl Command {
    pub fn new(name: impl Into<String>, thread_id: ThreadId, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            thread_id,
            text: text.into(),
        }
    }
}

/// What a command asks the engine to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    Add,
    List,
    Remove,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Add => "add",
            Action::List => "list",
            Action::Remove => "remove",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "add" => Ok(Action::Add),
            "list" => Ok(Action::List),
            "remove" => Ok(Action::Remove),
            other => Err(format!("unknown action {other:?}")),
        }
    }
}

/// A command after feed-specific parsing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedCommand {
    pub thread_id: ThreadId,
    pub action: Action,
    pub name: String,
    pub interval: Option<Duration>,
    pub url: Option<String>,
    pub platform: Option<String>,
}

impl ParsedCommand {
    pub fn new(thread_id: ThreadId, action: Action) -> Self {
        Self {
            thread_id,
            action,
            name: String::new(),
            interval: None,
            url: None,
            platform: None,
        }
    }
}

/// Parses `action [name [interval_minutes [url [platform]]]]`.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use feedvisor::{parse_command, Action, Command};
///
/// let cmd = Command::new("/rss", 7, "add golang 90 https://go.dev/blog/feed.atom");
/// let parsed = parse_command("rss", &cmd).unwrap();
///
/// assert_eq!(parsed.action, Action::Add);
/// assert_eq!(parsed.name, "golang");
/// assert_eq!(parsed.interval, Some(Duration::from_secs(90 * 60)));
/// ```
pub fn parse_command(feed: &str, cmd: &Command) -> Result<ParsedCommand, FeedError> {
    let invalid = |reason: String| FeedError::InvalidCommand {
        feed: feed.to_owned(),
        reason,
    };

    let mut tokens = cmd.text.split_whitespace();
    let action = tokens
        .next()
        .ok_or_else(|| invalid("missing action".into()))?
        .parse::<Action>()
        .map_err(invalid)?;

    let mut parsed = ParsedCommand::new(cmd.thread_id, action);
    if let Some(name) = tokens.next() {
        parsed.name = name.to_owned();
    }
    if let Some(raw) = tokens.next() {
        let secs = raw
            .parse::<u64>()
            .ok()
            .and_then(|minutes| minutes.checked_mul(60))
            .ok_or_else(|| invalid("invalid interval".into()))?;
        parsed.interval = Some(Duration::from_secs(secs));
    }
    parsed.url = tokens.next().map(str::to_owned);
    parsed.platform = tokens.next().map(str::to_owned);

    if parsed.name.is_empty() && action != Action::List {
        return Err(invalid("missing subscription name".into()));
    }
    Ok(parsed)
}

/// Renders a duration the way list replies show it: `24h0m0s`, `1h30m0s`, `45s`.
pub fn format_interval(d: Duration) -> String {
    if d.is_zero() {
        return "0s".into();
    }
    if d < Duration::from_secs(1) {
        return format!("{}ms", d.as_millis());
    }

    let total = d.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    let nanos = d.subsec_nanos();
    let secs = if nanos == 0 {
        seconds.to_string()
    } else {
        let frac = format!("{nanos:09}");
        format!("{seconds}.{}", frac.trim_end_matches('0'))
    };

    if hours > 0 {
        format!("{hours}h{minutes}m{secs}s")
    } else if minutes > 0 {
        format!("{minutes}m{secs}s")
    } else {
        format!("{secs}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(text: &str) -> Command {
        Command::new("/rss", 42, text)
    }

    #[test]
    fn test_full_add() {
        let parsed = parse_command("rss", &cmd("add golang 90 https://go.dev/feed youtube")).unwrap();
        assert_eq!(parsed.thread_id, 42);
        assert_eq!(parsed.url.as_deref(), Some("https://go.dev/feed"));
        assert_eq!(parsed.platform.as_deref(), Some("youtube"));
    }

    #[test]
    fn test_list_needs_no_name() {
        let parsed = parse_command("rss", &cmd("list")).unwrap();
        assert_eq!(parsed.action, Action::List);
        assert!(parsed.name.is_empty());
    }

    #[test]
    fn test_rejections() {
        let err = parse_command("rss", &cmd("add golang soon")).unwrap_err();
        assert_eq!(err.to_string(), "rss: invalid interval");

        let err = parse_command("rss", &cmd("")).unwrap_err();
        assert_eq!(err.to_string(), "rss: missing action");

        let err = parse_command("rss", &cmd("remove")).unwrap_err();
        assert_eq!(err.to_string(), "rss: missing subscription name");

        assert!(parse_command("rss", &cmd("edit golang")).is_err());

        let err = parse_command("rss", &cmd("add golang 18446744073709551615")).unwrap_err();
        assert_eq!(err.to_string(), "rss: invalid interval");
    }

    #[test]
    fn test_format_interval() {
        assert_eq!(format_interval(Duration::from_secs(24 * 3600)), "24h0m0s");
        assert_eq!(format_interval(Duration::from_secs(90 * 60)), "1h30m0s");
        assert_eq!(format_interval(Duration::from_secs(300)), "5m0s");
        assert_eq!(format_interval(Duration::from_secs(45)), "45s");
        assert_eq!(format_interval(Duration::from_millis(1500)), "1.5s");
        assert_eq!(format_interval(Duration::ZERO), "0s");
    }
}
