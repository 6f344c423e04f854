//! Request field checks shared by the endpoint handlers.
//!
//! Each helper returns `ApiError::BadRequest` naming the offending field.

use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime, SubsecRound};
use regex::Regex;

use crate::api::error::ApiError;
use crate::crypto;
use crate::db::{DATETIME_FORMAT, DATE_FORMAT};

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$").unwrap()
});

static CLOCK_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([01][0-9]|2[0-3]):[0-5][0-9]$").unwrap());

pub const GENDERS: &[&str] = &["male", "female", "other", "prefer_not_to_say"];

/// Trimmed and lowercased.
pub fn normalize_email(raw: &str) -> Result<String, ApiError> {
    let email = raw.trim().to_lowercase();
    if email.len() > 254 || !EMAIL_PATTERN.is_match(&email) {
        return Err(ApiError::bad_request("Invalid email address"));
    }
    Ok(email)
}

pub fn full_name(raw: &str) -> Result<String, ApiError> {
    let name = raw.trim();
    let len = name.chars().count();
    if !(2..=120).contains(&len) {
        return Err(ApiError::bad_request(
            "Full name must be between 2 and 120 characters",
        ));
    }
    Ok(name.to_string())
}

pub fn password(raw: &str) -> Result<(), ApiError> {
    crypto::check_password_length(raw).map_err(ApiError::from)
}

/// Optional text capped at `max` characters; blank becomes `None`.
pub fn optional_text(raw: Option<&str>, field: &str, max: usize) -> Result<Option<String>, ApiError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) if s.chars().count() > max => Err(ApiError::bad_request(format!(
            "{field} must be at most {max} characters"
        ))),
        Some(s) => Ok(Some(s.to_string())),
    }
}

/// Required text between 1 and `max` characters.
pub fn required_text(raw: &str, field: &str, max: usize) -> Result<String, ApiError> {
    optional_text(Some(raw), field, max)?
        .ok_or_else(|| ApiError::bad_request(format!("{field} is required")))
}

pub fn gender(raw: Option<&str>) -> Result<Option<String>, ApiError> {
    match raw.map(|s| s.trim().to_lowercase()).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(g) if GENDERS.contains(&g.as_str()) => Ok(Some(g)),
        Some(_) => Err(ApiError::bad_request(
            "Gender must be one of: male, female, other, prefer_not_to_say",
        )),
    }
}

/// `YYYY-MM-DD`.
pub fn date(raw: &str, field: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
        .map_err(|_| ApiError::bad_request(format!("Invalid {field}. Use YYYY-MM-DD format")))
}

pub fn optional_date(raw: Option<&str>, field: &str) -> Result<Option<NaiveDate>, ApiError> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| date(s, field))
        .transpose()
}

/// ISO 8601 date-time. Accepts `T` or space, optional fractional seconds
/// and an optional `Z`/offset (converted to UTC).
pub fn datetime(raw: &str, field: &str) -> Result<NaiveDateTime, ApiError> {
    let raw = raw.trim();
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.naive_utc().trunc_subsecs(0));
    }
    for fmt in [DATETIME_FORMAT, "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(dt.trunc_subsecs(0));
        }
    }
    Err(ApiError::bad_request(format!(
        "Invalid {field}. Use ISO 8601, e.g. 2025-01-31T09:30:00"
    )))
}

/// `HH:MM`, 24-hour.
pub fn clock_time(raw: Option<&str>, field: &str) -> Result<Option<String>, ApiError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(t) if CLOCK_PATTERN.is_match(t) => Ok(Some(t.to_string())),
        Some(_) => Err(ApiError::bad_request(format!("{field} must be HH:MM"))),
    }
}

pub fn positive_amount(value: f64, field: &str) -> Result<f64, ApiError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(ApiError::bad_request(format!("{field} must be greater than 0")))
    }
}

pub fn in_range(value: i64, min: i64, max: i64, field: &str) -> Result<i64, ApiError> {
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(ApiError::bad_request(format!(
            "{field} must be between {min} and {max}"
        )))
    }
}

/// Parse one of the `str_enum!` wire names, 400 with the allowed values.
pub fn enum_value<T>(raw: &str, field: &str, allowed: &[T]) -> Result<T, ApiError>
where
    T: std::str::FromStr + std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|_| {
        let names: Vec<String> = allowed.iter().map(|v| v.to_string()).collect();
        ApiError::bad_request(format!("Invalid {field}. Must be one of: {}", names.join(", ")))
    })
}
