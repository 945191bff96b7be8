//! Deserialization helpers for upstream payloads that do not respect their own schema.
//!
//! The main offender is MYM, which sometimes serializes lists as objects keyed by
//! position (`{"0": {...}, "1": {...}}`), sends `false` instead of an empty list,
//! or embeds a list as a JSON string. [`array_like`] turns all of those into a real
//! ordered sequence and is the only place where that cleanup happens.

use serde::de::{DeserializeOwned, Error as DeError};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Coerces an array-like value into an ordered list of items.
///
/// - arrays are returned unchanged
/// - objects whose keys are all integers become their values, ordered by key
/// - any other non-empty object is treated as a single item
/// - strings holding JSON are decoded and coerced again
/// - `null`, booleans, numbers and empty objects/strings yield an empty list
pub fn array_like(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Object(map) => {
            if map.is_empty() {
                return Vec::new();
            }
            if !map.keys().all(|key| key.trim().parse::<usize>().is_ok()) {
                return vec![Value::Object(map)];
            }
            let mut indexed: Vec<(usize, Value)> = map
                .into_iter()
                .filter_map(|(key, item)| key.trim().parse::<usize>().ok().map(|i| (i, item)))
                .collect();
            indexed.sort_by_key(|(index, _)| *index);
            indexed.into_iter().map(|(_, item)| item).collect()
        }
        Value::String(text) => {
            let trimmed = text.trim();
            if !(trimmed.starts_with('[') || trimmed.starts_with('{')) {
                return Vec::new();
            }
            match serde_json::from_str::<Value>(trimmed) {
                Ok(decoded) => array_like(decoded),
                Err(_) => Vec::new(),
            }
        }
        Value::Null | Value::Bool(_) | Value::Number(_) => Vec::new(),
    }
}

/// `deserialize_with` adapter applying [`array_like`] before decoding each item.
pub fn sequence<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    array_like(value)
        .into_iter()
        .map(|item| serde_json::from_value(item).map_err(D::Error::custom))
        .collect()
}

/// Parses an amount sent as a number, a numeric string (`"1.234,50"`) or null.
pub fn parse_amount(value: &Value) -> f64 {
    let amount = match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(text) => parse_amount_text(text),
        _ => 0.0,
    };
    if amount.is_finite() && amount > 0.0 {
        amount
    } else {
        0.0
    }
}

fn parse_amount_text(text: &str) -> f64 {
    let trimmed: String = text
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '$')
        .collect();
    let normalized = if trimmed.contains(',') {
        trimmed.replace('.', "").replace(',', ".")
    } else if dots_group_thousands(&trimmed) {
        trimmed.replace('.', "")
    } else {
        trimmed
    };
    match normalized.parse::<f64>() {
        Ok(amount) => amount,
        Err(_) => {
            tracing::warn!("⚠️ Unparseable amount '{}', counting it as 0", text);
            0.0
        }
    }
}

/// Without a decimal comma, dots are thousands separators when there are several
/// of them or when a single one is followed by exactly three digits (`12.500`).
fn dots_group_thousands(text: &str) -> bool {
    match text.matches('.').count() {
        0 => false,
        1 => text
            .split_once('.')
            .map(|(_, tail)| tail.len() == 3 && tail.chars().all(|c| c.is_ascii_digit()))
            .unwrap_or(false),
        _ => true,
    }
}

/// `deserialize_with` adapter for [`parse_amount`].
pub fn amount<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(parse_amount(&value))
}

/// Interprets the assorted deceased markers providers send.
pub fn is_truthy_marker(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::Number(n) => n.as_i64() == Some(1),
        Value::String(text) => matches!(
            text.trim().to_ascii_uppercase().as_str(),
            "S" | "SI" | "Y" | "YES" | "TRUE" | "1" | "FALLECIDO"
        ),
        _ => false,
    }
}
