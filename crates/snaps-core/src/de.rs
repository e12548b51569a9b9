//! Lenient field deserializers
//!
//! Deployment files are usually rendered from templates, so booleans and
//! integers frequently arrive as strings (`"true"`, `"1024"`). These helpers
//! accept both forms.

use serde::de::{Deserializer, Error};
use serde::Deserialize;
use serde_json::Value;

#[derive(Deserialize)]
#[serde(untagged)]
enum BoolOrText {
    Bool(bool),
    Text(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(serde_json::Number),
    Text(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn parse_bool<E: Error>(value: BoolOrText) -> Result<bool, E> {
    match value {
        BoolOrText::Bool(b) => Ok(b),
        BoolOrText::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(true),
            "false" | "no" | "0" => Ok(false),
            other => Err(E::custom(format!("expected a boolean, got '{}'", other))),
        },
    }
}

fn parse_u64<E: Error>(value: NumberOrText) -> Result<u64, E> {
    match value {
        NumberOrText::Number(n) => n
            .as_u64()
            .ok_or_else(|| E::custom(format!("expected a non-negative integer, got {}", n))),
        NumberOrText::Text(s) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| E::custom(format!("expected a non-negative integer, got '{}'", s))),
    }
}

fn parse_f64<E: Error>(value: NumberOrText) -> Result<f64, E> {
    match value {
        NumberOrText::Number(n) => n
            .as_f64()
            .ok_or_else(|| E::custom(format!("expected a number, got {}", n))),
        NumberOrText::Text(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| E::custom(format!("expected a number, got '{}'", s))),
    }
}

pub(crate) fn flexible_bool<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    parse_bool(BoolOrText::deserialize(d)?)
}

pub(crate) fn opt_bool<'de, D: Deserializer<'de>>(d: D) -> Result<Option<bool>, D::Error> {
    Option::<BoolOrText>::deserialize(d)?
        .map(parse_bool)
        .transpose()
}

pub(crate) fn flexible_u32<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
    let value = parse_u64(NumberOrText::deserialize(d)?)?;
    u32::try_from(value).map_err(|_| D::Error::custom(format!("{} is out of range", value)))
}

pub(crate) fn opt_u32<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u32>, D::Error> {
    match Option::<NumberOrText>::deserialize(d)? {
        None => Ok(None),
        Some(raw) => {
            let value = parse_u64(raw)?;
            u32::try_from(value)
                .map(Some)
                .map_err(|_| D::Error::custom(format!("{} is out of range", value)))
        }
    }
}

pub(crate) fn opt_u16<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u16>, D::Error> {
    match Option::<NumberOrText>::deserialize(d)? {
        None => Ok(None),
        Some(raw) => {
            let value = parse_u64(raw)?;
            u16::try_from(value)
                .map(Some)
                .map_err(|_| D::Error::custom(format!("{} is out of range", value)))
        }
    }
}

pub(crate) fn flexible_u64<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    parse_u64(NumberOrText::deserialize(d)?)
}

pub(crate) fn flexible_f64<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    parse_f64(NumberOrText::deserialize(d)?)
}

/// Accepts a single string or a list of strings.
pub(crate) fn string_or_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    Ok(match Option::<OneOrMany>::deserialize(d)? {
        None => Vec::new(),
        Some(OneOrMany::One(s)) => vec![s],
        Some(OneOrMany::Many(v)) => v,
    })
}

/// Version selectors such as `2.1` arrive as numbers or strings.
pub(crate) fn flexible_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    match NumberOrText::deserialize(d)? {
        NumberOrText::Number(n) => Ok(n.to_string()),
        NumberOrText::Text(s) => Ok(s),
    }
}

/// Map values rendered from templates may be numbers or booleans; the cloud
/// APIs only take strings.
pub(crate) fn string_map<'de, D: Deserializer<'de>>(
    d: D,
) -> Result<std::collections::BTreeMap<String, String>, D::Error> {
    let raw = Option::<std::collections::BTreeMap<String, Value>>::deserialize(d)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(k, v)| {
            let v = match v {
                Value::String(s) => s,
                other => other.to_string(),
            };
            (k, v)
        })
        .collect())
}

/// Strips a single-key wrapper such as `{subnet: {...}}` from an entry.
pub fn unwrap_entry(value: Value, key: &str) -> Value {
    match value {
        Value::Object(mut map) if map.len() == 1 && map.contains_key(key) => {
            map.remove(key).unwrap_or(Value::Null)
        }
        other => other,
    }
}
