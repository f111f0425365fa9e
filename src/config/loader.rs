//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, validating all parameters,
//! and providing clear error messages for misconfiguration.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use super::{AppConfig, FeedKind};

/// Upper bounds on the retry budget.
const MAX_RETRY_ATTEMPTS: u32 = 1_000;
const MAX_BACKOFF_MULTIPLIER: f64 = 10.0;
const MAX_RETRY_DELAY_MS: u64 = 600_000;

/// Load and validate configuration from a TOML file.
///
/// # Errors
/// Returns detailed error if:
/// - File doesn't exist or can't be read
/// - TOML parsing fails
/// - Validation rules are violated
pub fn load_config(path: &str) -> Result<AppConfig> {
  let path = Path::new(path);

  let content = std::fs::read_to_string(path)
    .with_context(|| format!("Failed to read config file: {}", path.display()))?;

  let config = parse_config(&content)?;

  info!(
    feeds = config.feeds.len(),
    enabled = config.feeds.iter().filter(|f| f.enabled).count(),
    max_attempts = config.retry.max_attempts,
    "Configuration loaded successfully"
  );

  Ok(config)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<AppConfig> {
  let config: AppConfig = toml::from_str(content)
    .with_context(|| "Failed to parse config.toml")?;

  validate_config(&config)?;
  Ok(config)
}

/// Validate all configuration parameters.
///
/// Checks for:
/// - A reachable broker URI
/// - Non-empty, unique feed names and queues
/// - Positive prefetch windows
/// - Positive, bounded retry budgets
/// - A ready job on every job-update feed
fn validate_config(config: &AppConfig) -> Result<()> {
  anyhow::ensure!(
    !config.broker.uri.is_empty(),
    "Broker URI must not be empty"
  );
  anyhow::ensure!(
    config.broker.uri.starts_with("amqp://") || config.broker.uri.starts_with("amqps://"),
    "Broker URI must use amqp:// or amqps://, got {}",
    config.broker.uri
  );

  // Retry validation
  anyhow::ensure!(
    config.retry.max_attempts > 0,
    "retry.max_attempts must be positive"
  );
  anyhow::ensure!(
    config.retry.max_attempts <= MAX_RETRY_ATTEMPTS,
    "retry.max_attempts must be <= {}, got {}",
    MAX_RETRY_ATTEMPTS,
    config.retry.max_attempts
  );
  anyhow::ensure!(
    (1.0..=MAX_BACKOFF_MULTIPLIER).contains(&config.retry.backoff_multiplier),
    "retry.backoff_multiplier must be within 1.0..={}, got {}",
    MAX_BACKOFF_MULTIPLIER,
    config.retry.backoff_multiplier
  );
  anyhow::ensure!(
    config.retry.delay_ms <= MAX_RETRY_DELAY_MS,
    "retry.delay_ms must be <= {}, got {}",
    MAX_RETRY_DELAY_MS,
    config.retry.delay_ms
  );

  // Feed validation
  anyhow::ensure!(
    !config.feeds.is_empty(),
    "At least one feed must be configured"
  );

  let mut names = HashSet::new();
  for (i, feed) in config.feeds.iter().enumerate() {
    anyhow::ensure!(!feed.name.is_empty(), "Feed {} has empty name", i);
    anyhow::ensure!(
      names.insert(feed.name.as_str()),
      "Feed name {} is configured twice",
      feed.name
    );
    anyhow::ensure!(
      !feed.queue.is_empty(),
      "Feed {} has empty queue name",
      feed.name
    );
    anyhow::ensure!(
      feed.prefetch() > 0,
      "Feed {} prefetch must be positive",
      feed.name
    );
    if feed.kind == FeedKind::JobUpdate {
      anyhow::ensure!(
        feed.ready_job.as_deref().is_some_and(|j| !j.is_empty()),
        "Job-update feed {} must set ready_job",
        feed.name
      );
    }
  }

  // Dispatch validation
  anyhow::ensure!(
    config.dispatch.min_interval_ms > 0,
    "dispatch.min_interval_ms must be positive"
  );
  anyhow::ensure!(
    config.dispatch.default_interval_ms >= config.dispatch.min_interval_ms,
    "dispatch.default_interval_ms must be >= min_interval_ms"
  );

  if let Some(tick) = config.market.tick_interval_ms {
    anyhow::ensure!(tick > 0, "market.tick_interval_ms must be positive");
  }

  Ok(())
}
