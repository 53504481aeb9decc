//! Harvest run configuration.
//!
//! A [`HarvestConfig`] is an immutable snapshot threaded through every stage
//! of a run. Values are layered: built-in defaults, then an optional TOML
//! file, then `HARVEST_*` environment variables, then whatever the caller
//! sets explicitly.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::HarvestError;
use crate::backoff::{BackoffPolicy, Jitter};

/// Largest page size the catalog search endpoint accepts.
pub const MAX_PAGE_SIZE: u32 = 20;

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid TOML for [`HarvestConfig`].
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// An environment override could not be parsed.
    #[error("invalid value {value:?} for {name}")]
    InvalidEnv {
        /// Variable name.
        name: String,
        /// Offending value.
        value: String,
    },
}

/// Immutable settings for one harvest run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct HarvestConfig {
    /// Catalog API base URL.
    pub base_url: String,
    /// Marketplace every request is scoped to.
    pub marketplace_id: String,
    /// `includedData` requested for detail fetches.
    pub included_data: String,
    /// Prefix of the storefront URL; the identifier is appended.
    pub product_url_base: String,
    /// Width of the fetch and enrich worker pools.
    pub concurrency: usize,
    /// Requested search page size (capped at [`MAX_PAGE_SIZE`]).
    pub page_size: u32,
    /// Maximum pages walked per query term.
    pub max_pages: u32,
    /// Maximum identifiers carried from discovery into fetch.
    pub max_identifiers: usize,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Retries allowed per request after the first attempt.
    pub max_retries: u32,
    /// Upper bound on exponential backoff, in seconds.
    pub backoff_cap_secs: u64,
    /// Pause between search pages, in milliseconds.
    pub page_delay_ms: u64,
    /// Add sub-second random jitter to backoff delays.
    pub jitter: bool,
    /// Ask the review metrics provider for each record.
    pub fetch_reviews: bool,
    /// Ask the sales metrics provider for each record.
    pub fetch_sales: bool,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            base_url: "https://sellingpartnerapi-na.amazon.com".to_string(),
            marketplace_id: "ATVPDKIKX0DER".to_string(),
            included_data: "summaries,images,attributes,classifications,salesRanks".to_string(),
            product_url_base: "https://www.amazon.com/dp/".to_string(),
            concurrency: 12,
            page_size: MAX_PAGE_SIZE,
            max_pages: 500,
            max_identifiers: 200,
            request_timeout_secs: 30,
            max_retries: 6,
            backoff_cap_secs: 8,
            page_delay_ms: 100,
            jitter: true,
            fetch_reviews: false,
            fetch_sales: false,
        }
    }
}

impl HarvestConfig {
    /// Loads a TOML file on top of the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Applies `HARVEST_*` overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnv`] if a numeric variable does not
    /// parse.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Applies overrides from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnv`] if a numeric variable does not
    /// parse.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(url) = lookup("HARVEST_BASE_URL") {
            self.base_url = url;
        }
        if let Some(id) = lookup("HARVEST_MARKETPLACE_ID") {
            self.marketplace_id = id;
        }
        override_parsed(&lookup, "HARVEST_CONCURRENCY", &mut self.concurrency)?;
        override_parsed(&lookup, "HARVEST_PAGE_SIZE", &mut self.page_size)?;
        override_parsed(&lookup, "HARVEST_MAX_PAGES", &mut self.max_pages)?;
        override_parsed(&lookup, "HARVEST_MAX_IDENTIFIERS", &mut self.max_identifiers)?;
        override_parsed(&lookup, "HARVEST_TIMEOUT", &mut self.request_timeout_secs)?;
        override_parsed(&lookup, "HARVEST_MAX_RETRIES", &mut self.max_retries)?;
        Ok(self)
    }

    /// Rejects settings that would make a run meaningless.
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError::Configuration`] naming the first bad field.
    pub fn validate(&self) -> Result<(), HarvestError> {
        let problem = if self.base_url.trim().is_empty() {
            Some("base_url must not be empty")
        } else if self.concurrency == 0 {
            Some("concurrency must be at least 1")
        } else if self.page_size == 0 {
            Some("page_size must be at least 1")
        } else if self.max_pages == 0 {
            Some("max_pages must be at least 1")
        } else if self.request_timeout_secs == 0 {
            Some("request_timeout_secs must be at least 1")
        } else {
            None
        };

        problem.map_or(Ok(()), |message| {
            Err(HarvestError::Configuration(message.to_string()))
        })
    }

    /// Page size actually sent to the search endpoint.
    #[must_use]
    pub fn effective_page_size(&self) -> u32 {
        self.page_size.clamp(1, MAX_PAGE_SIZE)
    }

    /// Per-request timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Pause between search pages.
    #[must_use]
    pub const fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }

    /// Backoff policy derived from the retry settings.
    #[must_use]
    pub const fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            max_retries: self.max_retries,
            cap: Duration::from_secs(self.backoff_cap_secs),
            jitter: if self.jitter {
                Jitter::Uniform(Duration::from_secs(1))
            } else {
                Jitter::None
            },
        }
    }

    /// Storefront URL for `identifier`.
    #[must_use]
    pub fn product_url(&self, identifier: &str) -> String {
        format!("{}{identifier}", self.product_url_base)
    }
}

fn override_parsed<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    target: &mut T,
) -> Result<(), ConfigError> {
    let Some(value) = lookup(name) else {
        return Ok(());
    };
    *target = value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        name: name.to_string(),
        value,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: HarvestConfig = toml::from_str(
            r#"
            concurrency = 4
            fetch_reviews = true
            marketplace_id = "A1F83G8C2ARO7P"
            "#,
        )
        .unwrap();

        assert_eq!(config.concurrency, 4);
        assert!(config.fetch_reviews);
        assert_eq!(config.marketplace_id, "A1F83G8C2ARO7P");
        assert_eq!(config.max_identifiers, 200);
        assert_eq!(config.page_size, 20);
    }

    #[test]
    fn env_overrides_replace_values() {
        let config = HarvestConfig::default()
            .with_overrides(|name| match name {
                "HARVEST_CONCURRENCY" => Some("3".to_string()),
                "HARVEST_TIMEOUT" => Some(" 10 ".to_string()),
                _ => None,
            })
            .unwrap();

        assert_eq!(config.concurrency, 3);
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.max_retries, 6);
    }

    #[test]
    fn invalid_env_value_is_reported() {
        let err = HarvestConfig::default()
            .with_overrides(|name| (name == "HARVEST_MAX_PAGES").then(|| "many".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { ref name, .. } if name == "HARVEST_MAX_PAGES"));
    }

    #[test]
    fn validate_rejects_zero_concurrency() {
        let config = HarvestConfig {
            concurrency: 0,
            ..HarvestConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(HarvestError::Configuration(_))
        ));
        assert!(HarvestConfig::default().validate().is_ok());
    }

    #[test]
    fn page_size_is_capped() {
        let config = HarvestConfig {
            page_size: 50,
            ..HarvestConfig::default()
        };
        assert_eq!(config.effective_page_size(), MAX_PAGE_SIZE);
    }

    #[test]
    fn backoff_policy_follows_jitter_toggle() {
        let config = HarvestConfig {
            jitter: false,
            max_retries: 2,
            ..HarvestConfig::default()
        };
        let policy = config.backoff_policy();
        assert_eq!(policy.jitter, Jitter::None);
        assert_eq!(policy.max_retries, 2);
        assert_eq!(policy.cap, Duration::from_secs(8));
    }
}
