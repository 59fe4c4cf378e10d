use std::collections::BTreeMap;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};

use crate::models::AnatomicalPart;
use crate::risk::DisabilityGrade;

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn parse_part(value: &str) -> Result<AnatomicalPart> {
    value.parse().context("failed to parse body_part")
}

pub fn parse_grade(value: i64) -> Result<DisabilityGrade> {
    let raw = u8::try_from(value).map_err(|_| anyhow!("gif contains invalid value {value}"))?;
    DisabilityGrade::try_from(raw).map_err(|err| anyhow!("gif: {err}"))
}

pub fn encode_points(points: &BTreeMap<String, u8>) -> Result<String> {
    serde_json::to_string(points).context("failed to encode points_data")
}

pub fn decode_points(raw: &str) -> Result<BTreeMap<String, u8>> {
    serde_json::from_str(raw).context("failed to decode points_data")
}
