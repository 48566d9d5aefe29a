//! Configuration for the replay binary.
//!
//! Configuration comes from two sources:
//! - Environment variables (via .env file or shell): retry tuning
//! - CLI arguments: input, exchanges and reconciliation policy

use std::path::PathBuf;

use clap::Parser;
use dex_indexer::{indexer::RetryPolicy, reconcile::Correlation, types::Dex};

/// Environment configuration.
#[derive(Debug, Default, serde::Deserialize)]
pub struct EnvConfig {
    /// Analyses of a transaction waiting for a pool (default: 4)
    pub retry_max_attempts: Option<usize>,

    /// First retry delay (default: 250ms)
    pub retry_base_delay_ms: Option<u64>,

    /// Longest retry delay (default: 5s)
    pub retry_max_delay_ms: Option<u64>,

    /// Default correlation of matches with recorded swaps
    pub correlation: Option<Correlation>,
}

impl EnvConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::from_env()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let default = RetryPolicy::default();
        RetryPolicy::new(
            self.retry_max_attempts.unwrap_or(default.max_attempts),
            self.retry_base_delay_ms.unwrap_or(default.base_delay_ms),
            self.retry_max_delay_ms.unwrap_or(default.max_delay_ms),
        )
    }
}

/// CLI arguments.
#[derive(Debug, Parser)]
#[command(name = "dex-replay")]
#[command(about = "Replays newline-delimited JSON blocks through the DEX analyzers")]
pub struct CliConfig {
    /// Blocks file, one JSON block per line. Reads stdin if not specified
    pub input: Option<PathBuf>,

    /// Exchanges to index (comma-separated, e.g., "Minswap,MuesliSwap")
    /// If not specified, indexes all supported exchanges
    #[arg(long, value_delimiter = ',')]
    pub exchanges: Vec<Dex>,

    /// Correlation of order book matches with recorded swaps
    /// (conjunctive or disjunctive)
    #[arg(long)]
    pub correlation: Option<Correlation>,

    /// Report operations waiting for a pool without retrying
    #[arg(long)]
    pub no_retry: bool,

    /// Skip blocks up to and including this slot
    #[arg(long)]
    pub after_slot: Option<u64>,
}

/// Settings the replay runs with.
#[derive(Clone, Debug, PartialEq)]
pub struct ReplayConfig {
    pub exchanges: Vec<Dex>,
    pub correlation: Correlation,
    pub retry: RetryPolicy,
    pub after_slot: Option<u64>,
}

impl CliConfig {
    /// Merges CLI arguments over the environment configuration.
    pub fn to_replay_config(&self, env: &EnvConfig) -> Result<ReplayConfig, ConfigError> {
        let mut exchanges: Vec<Dex> = vec![];
        for dex in &self.exchanges {
            if exchanges.contains(dex) {
                return Err(ConfigError::DuplicateExchange(*dex));
            }
            exchanges.push(*dex);
        }
        if exchanges.is_empty() {
            exchanges = Dex::ALL.to_vec();
        }

        let retry = if self.no_retry {
            RetryPolicy::none()
        } else {
            env.retry_policy()
        };

        Ok(ReplayConfig {
            exchanges,
            correlation: self.correlation.or(env.correlation).unwrap_or_default(),
            retry,
            after_slot: self.after_slot,
        })
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Exchange {0} listed more than once")]
    DuplicateExchange(Dex),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> CliConfig {
        CliConfig::parse_from(std::iter::once("dex-replay").chain(args.iter().copied()))
    }

    #[test]
    fn test_defaults() {
        let config = cli(&[]).to_replay_config(&EnvConfig::default()).unwrap();
        assert_eq!(config.exchanges, Dex::ALL.to_vec());
        assert_eq!(config.correlation, Correlation::Conjunctive);
        assert_eq!(config.retry, RetryPolicy::default());
        assert_eq!(config.after_slot, None);
    }

    #[test]
    fn test_cli_overrides_env() {
        let env = EnvConfig {
            retry_max_attempts: Some(2),
            correlation: Some(Correlation::Disjunctive),
            ..Default::default()
        };
        let config = cli(&["blocks.jsonl", "--exchanges", "minswap,GeniusYield"])
            .to_replay_config(&env)
            .unwrap();
        assert_eq!(config.exchanges, vec![Dex::Minswap, Dex::GeniusYield]);
        assert_eq!(config.correlation, Correlation::Disjunctive);
        assert_eq!(config.retry.max_attempts, 2);

        let config = cli(&["--correlation", "conjunctive", "--no-retry"])
            .to_replay_config(&env)
            .unwrap();
        assert_eq!(config.correlation, Correlation::Conjunctive);
        assert_eq!(config.retry, RetryPolicy::none());
    }

    #[test]
    fn test_duplicate_exchange() {
        assert!(matches!(
            cli(&["--exchanges", "splash,Splash"]).to_replay_config(&EnvConfig::default()),
            Err(ConfigError::DuplicateExchange(Dex::Splash))
        ));
    }
}
