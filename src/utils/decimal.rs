//! Exact decimal parsing for gateway payloads. Amounts may arrive as JSON
//! strings or numbers; both are parsed from their textual form so no value
//! passes through `f64`.

use bigdecimal::BigDecimal;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::str::FromStr;

pub fn from_json(value: &Value) -> Option<BigDecimal> {
    match value {
        Value::String(s) => BigDecimal::from_str(s.trim()).ok(),
        Value::Number(n) => BigDecimal::from_str(&n.to_string()).ok(),
        _ => None,
    }
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<BigDecimal, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    from_json(&value)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid decimal amount: {}", value)))
}

pub fn deserialize_opt<'de, D>(deserializer: D) -> Result<Option<BigDecimal>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(value) => from_json(&value)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid decimal amount: {}", value))),
    }
}
