//! Typed settings models and well-known keys.

use serde::{Deserialize, Serialize};

/// Key selecting the active client in the directory.
pub const ACTIVE_CLIENT_KEY: &str = "torrenting.client";

/// Key holding the auto-stop policy.
pub const AUTO_STOP_KEY: &str = "torrenting.auto_stop";

/// Policy governing whether completed, seeding torrents get stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoStopPolicy {
    /// Never stop anything.
    #[default]
    Off,
    /// Stop every completed torrent, whoever started it.
    All,
    /// Stop only torrents this application launched (hash is in the ledger).
    Tracked,
}

impl AutoStopPolicy {
    /// Stable string form used as the stored settings value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::All => "all",
            Self::Tracked => "tracked",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_serde_uses_snake_case() {
        let json = serde_json::to_string(&AutoStopPolicy::Tracked).expect("serialize");
        assert_eq!(json, "\"tracked\"");
        let back: AutoStopPolicy = serde_json::from_str("\"all\"").expect("deserialize");
        assert_eq!(back, AutoStopPolicy::All);
    }

    #[test]
    fn policy_defaults_to_off() {
        assert_eq!(AutoStopPolicy::default(), AutoStopPolicy::Off);
        assert_eq!(AutoStopPolicy::Off.as_str(), "off");
    }
}
