//! Human-readable durations ("5m", "30m", "24h") for cache TTLs and timeouts.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{de, Deserialize, Deserializer, Serializer};

/// Parse a duration string like "14d", "24h", "30m", "60s" or "250ms".
///
/// The input is case-insensitive and whitespace is trimmed.
///
/// ```
/// use lotfolio::duration::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
/// assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
/// ```
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim().to_lowercase();
    if let Some(num) = s.strip_suffix("ms") {
        let millis: u64 = num.trim().parse().context("Invalid number in duration")?;
        return Ok(Duration::from_millis(millis));
    }

    let (num, multiplier) = if let Some(n) = s.strip_suffix('d') {
        (n, 24 * 60 * 60)
    } else if let Some(n) = s.strip_suffix('h') {
        (n, 60 * 60)
    } else if let Some(n) = s.strip_suffix('m') {
        (n, 60)
    } else if let Some(n) = s.strip_suffix('s') {
        (n, 1)
    } else {
        anyhow::bail!("Duration must end with d, h, m, s or ms");
    };

    let num: u64 = num.trim().parse().context("Invalid number in duration")?;
    let secs = num
        .checked_mul(multiplier)
        .context("Duration is too large")?;
    Ok(Duration::from_secs(secs))
}

/// Format a duration using the largest unit that divides it evenly.
pub fn format_duration(d: Duration) -> String {
    const SECS_PER_DAY: u64 = 24 * 60 * 60;
    const SECS_PER_HOUR: u64 = 60 * 60;

    if d.subsec_millis() != 0 {
        return format!("{}ms", d.as_millis());
    }
    let secs = d.as_secs();
    if secs >= SECS_PER_DAY && secs % SECS_PER_DAY == 0 {
        format!("{}d", secs / SECS_PER_DAY)
    } else if secs >= SECS_PER_HOUR && secs % SECS_PER_HOUR == 0 {
        format!("{}h", secs / SECS_PER_HOUR)
    } else if secs >= 60 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}

/// Use with `#[serde(deserialize_with = "deserialize_duration")]`.
pub fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_duration(&s).map_err(de::Error::custom)
}

/// Use with `#[serde(serialize_with = "serialize_duration")]`.
pub fn serialize_duration<S>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format_duration(*d))
}
