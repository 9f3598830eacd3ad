use crate::types::RateQuota;
use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;

pub const LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const RESET_HEADER: &str = "x-ratelimit-reset";

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum QuotaError {
    #[error("missing {0} header")]
    Missing(&'static str),
    #[error("unparsable {header} header: {value:?}")]
    Invalid { header: &'static str, value: String },
}

/// Reads the rate-limit headers of a response, relative to the current time.
pub fn parse_quota(headers: &HeaderMap) -> Result<RateQuota, QuotaError> {
    parse_quota_at(headers, Utc::now())
}

/// Like [`parse_quota`] with an explicit clock. Either all three headers are
/// valid or nothing is returned.
pub fn parse_quota_at(headers: &HeaderMap, now: DateTime<Utc>) -> Result<RateQuota, QuotaError> {
    let limit = header_value(headers, LIMIT_HEADER)?;
    let remaining = header_value(headers, REMAINING_HEADER)?;
    let reset = header_value(headers, RESET_HEADER)?;

    let limit = parse_num::<u32>(LIMIT_HEADER, limit)?;
    let remaining = parse_num::<u32>(REMAINING_HEADER, remaining)?;
    let reset_epoch = parse_num::<i64>(RESET_HEADER, reset)?;
    let reset_at =
        DateTime::<Utc>::from_timestamp(reset_epoch, 0).ok_or_else(|| QuotaError::Invalid {
            header: RESET_HEADER,
            value: reset.to_string(),
        })?;

    Ok(RateQuota::new(limit, remaining, reset_at, now))
}

fn header_value<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<&'a str, QuotaError> {
    let value = headers.get(name).ok_or(QuotaError::Missing(name))?;
    value.to_str().map_err(|_| QuotaError::Invalid {
        header: name,
        value: String::from_utf8_lossy(value.as_bytes()).into_owned(),
    })
}

fn parse_num<T: std::str::FromStr>(header: &'static str, value: &str) -> Result<T, QuotaError> {
    value.trim().parse::<T>().map_err(|_| QuotaError::Invalid {
        header,
        value: value.to_string(),
    })
}
