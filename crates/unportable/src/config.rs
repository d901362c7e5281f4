use std::time::Duration;

use anyhow::Context;
use unportable_contracts::{
    DEFAULT_SPILL_THRESHOLD_BYTES, REQUEST_STAGGER_BATCH, REQUEST_STAGGER_DELAY_MS,
};

pub const ENV_SPILL_THRESHOLD: &str = "UNPORTABLE_SPILL_THRESHOLD";
pub const ENV_FETCH_TIMEOUT_SECS: &str = "UNPORTABLE_FETCH_TIMEOUT_SECS";
pub const ENV_FETCH_STAGGER_MS: &str = "UNPORTABLE_FETCH_STAGGER_MS";
pub const ENV_LOG: &str = "UNPORTABLE_LOG";

/// Process-wide knobs. Read once before dispatch and passed down explicitly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub spill_threshold: usize,
    /// Used when `request_urls` gets no timeout (or zero). `None` waits forever.
    pub fetch_timeout: Option<Duration>,
    /// Delay added per batch of started fetch tasks. `None` starts them all at once.
    pub fetch_stagger: Option<Duration>,
    pub fetch_stagger_batch: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            spill_threshold: DEFAULT_SPILL_THRESHOLD_BYTES,
            fetch_timeout: None,
            fetch_stagger: Some(Duration::from_millis(REQUEST_STAGGER_DELAY_MS)),
            fetch_stagger_batch: REQUEST_STAGGER_BATCH,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut cfg = Config::default();
        if let Some(raw) = lookup(ENV_SPILL_THRESHOLD) {
            cfg.spill_threshold = parse_u64_env(ENV_SPILL_THRESHOLD, &raw)?
                .try_into()
                .with_context(|| format!("{ENV_SPILL_THRESHOLD} does not fit in usize"))?;
        }
        if let Some(raw) = lookup(ENV_FETCH_TIMEOUT_SECS) {
            let secs = parse_u64_env(ENV_FETCH_TIMEOUT_SECS, &raw)?;
            cfg.fetch_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(raw) = lookup(ENV_FETCH_STAGGER_MS) {
            let ms = parse_u64_env(ENV_FETCH_STAGGER_MS, &raw)?;
            cfg.fetch_stagger = (ms > 0).then(|| Duration::from_millis(ms));
        }
        Ok(cfg)
    }
}

fn parse_u64_env(name: &str, raw: &str) -> anyhow::Result<u64> {
    raw.trim().parse::<u64>().with_context(|| {
        format!("invalid environment variable {name}={raw:?} (expected a non-negative integer)")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |name| {
            pairs
                .iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.spill_threshold, 8 * 1024 * 1024);
        assert_eq!(cfg.fetch_stagger, Some(Duration::from_millis(400)));
    }

    #[test]
    fn reads_overrides() {
        let cfg = Config::from_lookup(lookup(&[
            (ENV_SPILL_THRESHOLD, "16"),
            (ENV_FETCH_TIMEOUT_SECS, " 3 "),
            (ENV_FETCH_STAGGER_MS, "0"),
        ]))
        .unwrap();
        assert_eq!(cfg.spill_threshold, 16);
        assert_eq!(cfg.fetch_timeout, Some(Duration::from_secs(3)));
        assert_eq!(cfg.fetch_stagger, None);
    }

    #[test]
    fn malformed_value_names_the_variable() {
        let err = Config::from_lookup(lookup(&[(ENV_FETCH_TIMEOUT_SECS, "soon")])).unwrap_err();
        assert!(
            err.to_string().contains(ENV_FETCH_TIMEOUT_SECS),
            "unexpected error: {err}"
        );
    }
}
