//! Human duration parsing for `--older-than`

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid duration '{0}', expected a number followed by s, m, h or d (e.g. 30s, 15m, 24h, 7d)")]
pub struct DurationError(String);

/// Parse `30s`, `15m`, `24h` or `7d` into seconds
pub fn parse_duration_secs(input: &str) -> Result<u64, DurationError> {
    let input = input.trim();
    let invalid = || DurationError(input.to_string());

    let unit = input.chars().last().ok_or_else(invalid)?;
    let multiplier = match unit {
        's' => 1,
        'm' => 60,
        'h' => 3600,
        'd' => 86_400,
        _ => return Err(invalid()),
    };

    let value: u64 = input[..input.len() - 1].parse().map_err(|_| invalid())?;
    value.checked_mul(multiplier).ok_or_else(invalid)
}
