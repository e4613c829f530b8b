//! Per-account destination tables.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One routing rule: records from any of `accounts` go to `destination`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteEntry {
    pub accounts: Vec<String>,
    pub destination: String,
}

impl RouteEntry {
    pub fn new(accounts: Vec<String>, destination: impl Into<String>) -> Self {
        Self {
            accounts,
            destination: destination.into(),
        }
    }

    fn contains(&self, account_id: &str) -> bool {
        self.accounts.iter().any(|a| a == account_id)
    }
}

/// Ordered account routing table with a default destination.
///
/// Built once from configuration and read-only afterwards. The meaning of a
/// destination string (webhook URL, channel id, topic ARN) belongs to the
/// channel that owns the table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
    default: String,
}

impl RouteTable {
    /// Table with no account-specific entries.
    pub fn new(default: impl Into<String>) -> Self {
        Self {
            entries: Vec::new(),
            default: default.into(),
        }
    }

    pub fn with_entries(default: impl Into<String>, entries: Vec<RouteEntry>) -> Self {
        Self {
            entries,
            default: default.into(),
        }
    }

    /// Destination for `account_id`.
    ///
    /// The first entry listing the account wins. An empty account id never
    /// matches an entry and always resolves to the default.
    pub fn resolve(&self, account_id: &str) -> &str {
        if account_id.is_empty() {
            return &self.default;
        }
        self.entries
            .iter()
            .find(|entry| entry.contains(account_id))
            .map_or(self.default.as_str(), |entry| entry.destination.as_str())
    }

    pub fn default_destination(&self) -> &str {
        &self.default
    }

    pub fn entries(&self) -> &[RouteEntry] {
        &self.entries
    }
}

/// How Slack notifications are delivered.
///
/// Decided once at configuration load: a bot token selects [`SlackTarget::App`]
/// (threading capable), otherwise an incoming webhook is used.
#[derive(Clone, PartialEq, Eq)]
pub enum SlackTarget {
    /// Incoming webhooks; destinations are hook URLs.
    Webhook { routes: RouteTable },
    /// Bot API; destinations are channel ids.
    App { bot_token: String, routes: RouteTable },
}

impl SlackTarget {
    pub fn routes(&self) -> &RouteTable {
        match self {
            Self::Webhook { routes } | Self::App { routes, .. } => routes,
        }
    }

    /// Whether replies can be posted into an existing thread.
    pub fn supports_threads(&self) -> bool {
        matches!(self, Self::App { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Webhook { .. } => "webhook",
            Self::App { .. } => "app",
        }
    }
}

impl fmt::Debug for SlackTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Webhook { routes } => f
                .debug_struct("Webhook")
                .field("routes", &routes.entries().len())
                .finish(),
            Self::App { routes, .. } => f
                .debug_struct("App")
                .field("bot_token", &"<redacted>")
                .field("default_channel_id", &routes.default_destination())
                .field("routes", &routes.entries().len())
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RouteTable {
        RouteTable::with_entries(
            "default",
            vec![
                RouteEntry::new(vec!["111".to_owned(), "222".to_owned()], "first"),
                RouteEntry::new(vec!["222".to_owned()], "second"),
            ],
        )
    }

    #[test]
    fn resolves_listed_account() {
        assert_eq!(table().resolve("111"), "first");
    }

    #[test]
    fn first_entry_wins_on_overlap() {
        assert_eq!(table().resolve("222"), "first");
    }

    #[test]
    fn unknown_account_falls_back_to_default() {
        assert_eq!(table().resolve("999"), "default");
    }

    #[test]
    fn empty_account_uses_default() {
        let table = RouteTable::with_entries(
            "default",
            vec![RouteEntry::new(vec![String::new()], "odd")],
        );
        assert_eq!(table.resolve(""), "default");
    }

    #[test]
    fn app_target_supports_threads() {
        let app = SlackTarget::App {
            bot_token: "xoxb-secret".to_owned(),
            routes: RouteTable::new("C123"),
        };
        assert!(app.supports_threads());
        assert_eq!(app.kind(), "app");
        assert_eq!(app.routes().default_destination(), "C123");

        let hook = SlackTarget::Webhook {
            routes: RouteTable::new("https://hooks.slack.com/services/T/B/X"),
        };
        assert!(!hook.supports_threads());
    }

    #[test]
    fn debug_output_redacts_bot_token() {
        let app = SlackTarget::App {
            bot_token: "xoxb-secret".to_owned(),
            routes: RouteTable::new("C123"),
        };
        let rendered = format!("{app:?}");
        assert!(!rendered.contains("xoxb-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
