use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use filejump_core::pacer::{DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_SLEEP, DEFAULT_MIN_SLEEP};
use filejump_core::{DEFAULT_BASE_URL, DEFAULT_PER_PAGE, FileJumpClient, Pacer};
use tokio_util::sync::CancellationToken;

use crate::encoding::Encoder;
use crate::error::{BackendError, Result};

pub const DEFAULT_UPLOAD_CUTOFF: u64 = 50 * 1024 * 1024;

const ENV_PREFIX: &str = "FILEJUMP_";

#[derive(Clone)]
pub struct Options {
    pub access_token: String,
    pub upload_cutoff: u64,
    pub encoding: Encoder,
    pub base_url: String,
    pub list_chunk: u32,
    pub pacer_min_sleep: Duration,
    pub pacer_max_sleep: Duration,
    pub low_level_retries: u32,
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("access_token", &"<redacted>")
            .field("upload_cutoff", &self.upload_cutoff)
            .field("encoding", &self.encoding.to_string())
            .field("base_url", &self.base_url)
            .field("list_chunk", &self.list_chunk)
            .field("pacer_min_sleep", &self.pacer_min_sleep)
            .field("pacer_max_sleep", &self.pacer_max_sleep)
            .field("low_level_retries", &self.low_level_retries)
            .finish()
    }
}

impl Options {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            upload_cutoff: DEFAULT_UPLOAD_CUTOFF,
            encoding: Encoder::default(),
            base_url: DEFAULT_BASE_URL.to_string(),
            list_chunk: DEFAULT_PER_PAGE,
            pacer_min_sleep: DEFAULT_MIN_SLEEP,
            pacer_max_sleep: DEFAULT_MAX_SLEEP,
            low_level_retries: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Builds options from a remote's config section (`access_token`,
    /// `upload_cutoff`, `encoding`, ...). Unknown keys are ignored.
    pub fn from_map(map: &HashMap<String, String>) -> Result<Self> {
        Self::from_lookup(|key| map.get(key).cloned())
    }

    /// Same keys as [`Options::from_map`], read from `FILEJUMP_*` variables.
    /// Sleep durations are given in milliseconds (`FILEJUMP_PACER_MIN_SLEEP_MS`).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| {
            let name = match key {
                "pacer_min_sleep" | "pacer_max_sleep" => format!("{ENV_PREFIX}{key}_ms"),
                _ => format!("{ENV_PREFIX}{key}"),
            };
            std::env::var(name.to_ascii_uppercase()).ok()
        })
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let value = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let access_token = value("access_token")
            .ok_or_else(|| BackendError::Config("access_token is required".into()))?;
        let mut options = Self::new(access_token);
        if let Some(cutoff) = value("upload_cutoff") {
            options.upload_cutoff = parse_size(&cutoff)
                .ok_or_else(|| BackendError::Config(format!("invalid upload_cutoff {cutoff:?}")))?;
        }
        if let Some(encoding) = value("encoding") {
            options.encoding = encoding
                .parse()
                .map_err(|err| BackendError::Config(format!("{err}")))?;
        }
        if let Some(base_url) = value("base_url") {
            options.base_url = base_url;
        }
        if let Some(chunk) = value("list_chunk") {
            options.list_chunk = parse_positive(&chunk, "list_chunk")?;
        }
        if let Some(ms) = value("pacer_min_sleep") {
            options.pacer_min_sleep = Duration::from_millis(parse_positive(&ms, "pacer_min_sleep")?);
        }
        if let Some(ms) = value("pacer_max_sleep") {
            options.pacer_max_sleep = Duration::from_millis(parse_positive(&ms, "pacer_max_sleep")?);
        }
        if let Some(retries) = value("low_level_retries") {
            options.low_level_retries = parse_positive(&retries, "low_level_retries")?;
        }
        Ok(options)
    }

    pub(crate) fn build_client(&self, cancel: CancellationToken) -> Result<FileJumpClient> {
        let pacer = Pacer::new(
            self.pacer_min_sleep,
            self.pacer_max_sleep,
            self.low_level_retries,
        )
        .with_cancellation(cancel);
        Ok(FileJumpClient::with_base_url(&self.base_url, self.access_token.clone())?
            .with_pacer(pacer))
    }
}

fn parse_positive<T>(value: &str, key: &str) -> Result<T>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    value
        .parse::<T>()
        .ok()
        .filter(|parsed| *parsed > T::default())
        .ok_or_else(|| BackendError::Config(format!("invalid {key} {value:?}")))
}

/// Parses sizes such as `1048576`, `512K`, `50M`, `50Mi`, `1G`. Suffixes are
/// binary multiples, as is usual for sync tools.
pub fn parse_size(value: &str) -> Option<u64> {
    let value = value.trim();
    let digits_end = value
        .find(|ch: char| !ch.is_ascii_digit())
        .unwrap_or(value.len());
    let (number, suffix) = value.split_at(digits_end);
    let number: u64 = number.parse().ok()?;
    let multiplier: u64 = match suffix.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "k" | "ki" | "kib" => 1 << 10,
        "m" | "mi" | "mib" => 1 << 20,
        "g" | "gi" | "gib" => 1 << 30,
        "t" | "ti" | "tib" => 1 << 40,
        _ => return None,
    };
    number.checked_mul(multiplier)
}
