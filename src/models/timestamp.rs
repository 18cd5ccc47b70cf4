use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serializer};

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parses a backend timestamp, interpreting a missing timezone suffix as UTC.
///
/// The backend sometimes serializes `started_at` without `Z` or an offset.
/// Normalizing here keeps every other part of the engine on `DateTime<Utc>`.
pub fn parse_utc(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    let raw = raw.trim();
    match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => Ok(dt.with_timezone(&Utc)),
        Err(rfc_err) => {
            for format in NAIVE_FORMATS {
                if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
                    return Ok(naive.and_utc());
                }
            }
            Err(rfc_err)
        }
    }
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_utc(&raw).map_err(|e| {
        serde::de::Error::custom(format!("invalid timestamp {:?}: {}", raw, e))
    })
}

pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&value.to_rfc3339())
}
