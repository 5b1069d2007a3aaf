//! Time formatting and parsing helpers.
//!
//! AVTransport carries times as `H+:MM:SS[.F+]` strings, players answer in
//! (possibly fractional) seconds. Everything inside the renderer is kept in
//! whole seconds and converted at the edges with these functions.

use crate::errors::RendererError;

/// Value reported by AVTransport for a time that is not known.
pub const NOT_IMPLEMENTED: &str = "NOT_IMPLEMENTED";

/// Formats a duration in seconds as HH:MM:SS.
///
/// # Examples
/// ```
/// # use pmomediarenderer::time_utils::format_hhmmss;
/// assert_eq!(format_hhmmss(0), "00:00:00");
/// assert_eq!(format_hhmmss(61), "00:01:01");
/// assert_eq!(format_hhmmss(3661), "01:01:01");
/// ```
pub fn format_hhmmss(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, secs)
}

/// Formats an optional duration, using [`NOT_IMPLEMENTED`] for unknown values.
///
/// # Examples
/// ```
/// # use pmomediarenderer::time_utils::format_optional;
/// assert_eq!(format_optional(Some(90)), "00:01:30");
/// assert_eq!(format_optional(None), "NOT_IMPLEMENTED");
/// ```
pub fn format_optional(seconds: Option<u64>) -> String {
    match seconds {
        Some(s) => format_hhmmss(s),
        None => NOT_IMPLEMENTED.to_string(),
    }
}

/// Parses an AVTransport / DIDL-Lite duration (`H+:MM:SS[.F+]` or
/// `H+:MM:SS[.F0/F1]`) into whole seconds.
///
/// The fractional part is dropped.
///
/// # Examples
/// ```
/// # use pmomediarenderer::time_utils::parse_upnp_duration;
/// assert_eq!(parse_upnp_duration("0:03:25.500").unwrap(), 205);
/// assert_eq!(parse_upnp_duration("01:00:00").unwrap(), 3600);
/// assert!(parse_upnp_duration("NOT_IMPLEMENTED").is_err());
/// ```
pub fn parse_upnp_duration(input: &str) -> Result<u64, RendererError> {
    let trimmed = input.trim();
    let whole = trimmed.split('.').next().unwrap_or(trimmed);
    let parts: Vec<&str> = whole.split(':').collect();

    if parts.len() != 3 {
        return Err(RendererError::ArgumentError(format!(
            "Invalid duration '{}': expected H+:MM:SS",
            input
        )));
    }

    let mut values = [0u64; 3];
    for (slot, part) in values.iter_mut().zip(&parts) {
        *slot = part.parse::<u64>().map_err(|_| {
            RendererError::ArgumentError(format!(
                "Invalid numeric value '{}' in duration '{}'",
                part, input
            ))
        })?;
    }

    let [hours, minutes, seconds] = values;
    if minutes >= 60 || seconds >= 60 {
        return Err(RendererError::ArgumentError(format!(
            "Invalid duration '{}': minutes and seconds must be < 60",
            input
        )));
    }

    hours
        .checked_mul(3600)
        .and_then(|h| h.checked_add(minutes * 60 + seconds))
        .ok_or_else(|| {
            RendererError::ArgumentError(format!("Duration '{}' is out of range", input))
        })
}

/// Parses a player-reported number of seconds such as `12.4` or `215`.
///
/// Negative, non-finite or non-numeric values give `None`.
pub fn parse_seconds(input: &str) -> Option<u64> {
    let value = input.trim().parse::<f64>().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    Some(value.floor() as u64)
}

/// Converts milliseconds to seconds (rounding down).
#[inline]
pub fn ms_to_seconds(milliseconds: u64) -> u64 {
    milliseconds / 1000
}
