//! Engine configuration loaded from `REIMBURSE_*` environment variables.

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};

use reimburse_observability::LogFormat;

/// Upper bound applied to custom approval amounts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CustomAmountCap {
    /// A custom amount may not exceed the submitted amount.
    #[default]
    Submitted,
    Unbounded,
}

impl FromStr for CustomAmountCap {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "submitted" => Ok(CustomAmountCap::Submitted),
            "unbounded" | "none" => Ok(CustomAmountCap::Unbounded),
            other => bail!("unknown custom amount cap '{other}' (expected submitted|unbounded)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Timeout handed to collaborator adapters for every external call.
    pub call_timeout: Duration,
    pub signed_url_ttl: Duration,
    /// Re-read status before each transition update.
    pub optimistic_checks: bool,
    pub custom_amount_cap: CustomAmountCap,
    pub unknown_actor_name: String,
    pub log_format: LogFormat,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_millis(10_000),
            signed_url_ttl: Duration::from_secs(3_600),
            optimistic_checks: true,
            custom_amount_cap: CustomAmountCap::Submitted,
            unknown_actor_name: "Unknown User".to_string(),
            log_format: LogFormat::Json,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup("REIMBURSE_CALL_TIMEOUT_MS") {
            let ms: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("REIMBURSE_CALL_TIMEOUT_MS: invalid value '{raw}'"))?;
            config.call_timeout = Duration::from_millis(ms);
        }
        if let Some(raw) = lookup("REIMBURSE_SIGNED_URL_TTL_SECS") {
            let secs: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("REIMBURSE_SIGNED_URL_TTL_SECS: invalid value '{raw}'"))?;
            config.signed_url_ttl = Duration::from_secs(secs);
        }
        if let Some(raw) = lookup("REIMBURSE_OPTIMISTIC_CHECKS") {
            config.optimistic_checks = raw
                .trim()
                .to_ascii_lowercase()
                .parse()
                .with_context(|| format!("REIMBURSE_OPTIMISTIC_CHECKS: invalid value '{raw}'"))?;
        }
        if let Some(raw) = lookup("REIMBURSE_CUSTOM_AMOUNT_CAP") {
            config.custom_amount_cap = raw
                .parse()
                .context("REIMBURSE_CUSTOM_AMOUNT_CAP")?;
        }
        if let Some(raw) = lookup("REIMBURSE_UNKNOWN_ACTOR_NAME") {
            if !raw.trim().is_empty() {
                config.unknown_actor_name = raw.trim().to_string();
            }
        }
        if let Some(raw) = lookup("REIMBURSE_LOG_FORMAT") {
            config.log_format = raw
                .parse()
                .map_err(|e| anyhow::anyhow!("{e}"))
                .context("REIMBURSE_LOG_FORMAT")?;
        }

        Ok(config)
    }

    /// Install the process-wide subscriber in the configured format.
    pub fn init_logging(&self) {
        reimburse_observability::init_with(self.log_format);
    }
}
