use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Rules a match is played under.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    pub points_goal: u32,
    /// Round total a player must reach before their first bank. 0 disables.
    pub opening_threshold: u32,
    pub high_stakes: bool,
    pub welfare: bool,
    pub last_turn: bool,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self { points_goal: 4000, opening_threshold: 0, high_stakes: false, welfare: false, last_turn: false }
    }
}

/// Tunables for the match actors.
#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub hurry_after: Duration,
    pub min_action_interval: Duration,
    pub bot_delay: Duration,
    pub mailbox: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            hurry_after: Duration::from_secs(90),
            min_action_interval: Duration::from_millis(500),
            bot_delay: Duration::from_millis(1_000),
            mailbox: 64,
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            hurry_after: read_ms("FARKLE_HURRY_MS", defaults.hurry_after),
            min_action_interval: read_ms("FARKLE_MIN_ACTION_MS", defaults.min_action_interval),
            bot_delay: read_ms("FARKLE_BOT_DELAY_MS", defaults.bot_delay),
            mailbox: read_usize("FARKLE_MAILBOX", defaults.mailbox).max(1),
        }
    }
}

fn read_ms(key: &str, fallback: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(fallback)
}

fn read_usize(key: &str, fallback: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.parse::<usize>().ok())
        .unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_match_config_fills_defaults() {
        let cfg: MatchConfig = serde_json::from_str(r#"{"points_goal":1000,"welfare":true}"#).unwrap();
        assert_eq!(cfg.points_goal, 1000);
        assert!(cfg.welfare);
        assert!(!cfg.high_stakes);
        assert_eq!(cfg.opening_threshold, 0);
    }

    #[test]
    fn unset_env_uses_defaults() {
        assert_eq!(read_ms("FARKLE_TEST_UNSET_KEY", Duration::from_secs(3)), Duration::from_secs(3));
        assert_eq!(read_usize("FARKLE_TEST_UNSET_KEY", 7), 7);
    }
}
