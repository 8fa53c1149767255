use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;

use rivalis_feed::ConversationStrategy;
use rivalis_feed::retention::GLOBAL_CAPACITY;

/// Log filter used when `RUST_LOG` is unset. Every workspace crate is listed;
/// a target without a directive is silenced.
pub const DEFAULT_LOG_FILTER: &str =
    "rivalis=debug,rivalis_server=debug,rivalis_api=debug,rivalis_feed=debug,rivalis_db=debug,tower_http=debug";

/// Runtime settings, read from `RIVALIS_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub global_capacity: usize,
    pub conversation_strategy: ConversationStrategy,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unset keys take their defaults; set but
    /// unparsable values are errors.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let host = lookup("RIVALIS_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port = match lookup("RIVALIS_PORT") {
            Some(v) => v.parse().with_context(|| format!("invalid RIVALIS_PORT '{}'", v))?,
            None => 3000,
        };
        let db_path = lookup("RIVALIS_DB_PATH").unwrap_or_else(|| "rivalis.db".into()).into();
        let global_capacity = match lookup("RIVALIS_GLOBAL_CAPACITY") {
            Some(v) => v
                .parse()
                .with_context(|| format!("invalid RIVALIS_GLOBAL_CAPACITY '{}'", v))?,
            None => GLOBAL_CAPACITY,
        };
        let conversation_strategy = match lookup("RIVALIS_CONVERSATION_STRATEGY") {
            Some(v) => v
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid RIVALIS_CONVERSATION_STRATEGY: {}", e))?,
            None => ConversationStrategy::default(),
        };

        Ok(Self { host, port, db_path, global_capacity, conversation_strategy })
    }

    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.db_path, PathBuf::from("rivalis.db"));
        assert_eq!(config.global_capacity, 50);
        assert_eq!(config.conversation_strategy, ConversationStrategy::RawWindow);
        assert_eq!(config.addr().unwrap().port(), 3000);
    }

    #[test]
    fn overrides_are_applied() {
        let config = Config::from_lookup(lookup(&[
            ("RIVALIS_HOST", "127.0.0.1"),
            ("RIVALIS_PORT", "8080"),
            ("RIVALIS_DB_PATH", "/tmp/r.db"),
            ("RIVALIS_GLOBAL_CAPACITY", "10"),
            ("RIVALIS_CONVERSATION_STRATEGY", "pair-index"),
        ]))
        .unwrap();
        assert_eq!(config.addr().unwrap().to_string(), "127.0.0.1:8080");
        assert_eq!(config.global_capacity, 10);
        assert_eq!(config.conversation_strategy, ConversationStrategy::PairIndex);
    }

    #[test]
    fn default_log_filter_covers_every_crate() {
        for target in ["rivalis", "rivalis_server", "rivalis_api", "rivalis_feed", "rivalis_db"] {
            let directive = format!("{}=debug", target);
            assert!(
                DEFAULT_LOG_FILTER.split(',').any(|d| d == directive),
                "missing {}",
                directive
            );
        }
    }

    #[test]
    fn bad_values_are_errors() {
        assert!(Config::from_lookup(lookup(&[("RIVALIS_PORT", "http")])).is_err());
        assert!(Config::from_lookup(lookup(&[("RIVALIS_GLOBAL_CAPACITY", "-1")])).is_err());
        assert!(Config::from_lookup(lookup(&[("RIVALIS_CONVERSATION_STRATEGY", "magic")])).is_err());
    }
}
