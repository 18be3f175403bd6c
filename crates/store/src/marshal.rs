//! Structural marshaling between serde types and stored items
//!
//! Values travel through [`serde_json::Value`]: numbers become `N`, strings `S`,
//! booleans `BOOL`, `null` becomes `NULL`, sequences `L` and maps `M`. Field
//! names follow the serde attributes of the type (`#[serde(rename = "...")]`).

use crate::{AttributeValue, Item};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Number, Value};
use thiserror::Error;

/// Errors raised while converting between user types and items
#[derive(Error, Debug)]
pub enum MarshalError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Expected a map at the top level, found {0}")]
    NotAMap(&'static str),

    #[error("Invalid number: {0}")]
    InvalidNumber(String),
}

/// Result type for marshaling operations
pub type MarshalResult<T> = Result<T, MarshalError>;

/// Marshal a serializable value into an item
pub fn to_item<T: Serialize + ?Sized>(value: &T) -> MarshalResult<Item> {
    match serde_json::to_value(value)? {
        Value::Object(map) => map
            .into_iter()
            .map(|(k, v)| Ok::<_, MarshalError>((k, to_attribute(v)?)))
            .collect(),
        other => Err(MarshalError::NotAMap(json_kind(&other))),
    }
}

/// Unmarshal an item into a deserializable value
pub fn from_item<T: DeserializeOwned>(item: &Item) -> MarshalResult<T> {
    let mut map = Map::with_capacity(item.len());
    for (name, value) in item {
        map.insert(name.clone(), from_attribute(value)?);
    }
    Ok(serde_json::from_value(Value::Object(map))?)
}

/// Marshal a single serializable value
pub fn to_attribute_value<T: Serialize + ?Sized>(value: &T) -> MarshalResult<AttributeValue> {
    to_attribute(serde_json::to_value(value)?)
}

fn to_attribute(value: Value) -> MarshalResult<AttributeValue> {
    Ok(match value {
        Value::Null => AttributeValue::Null,
        Value::Bool(b) => AttributeValue::Bool(b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s),
        Value::Array(values) => AttributeValue::L(
            values
                .into_iter()
                .map(to_attribute)
                .collect::<MarshalResult<Vec<_>>>()?,
        ),
        Value::Object(map) => AttributeValue::M(
            map.into_iter()
                .map(|(k, v)| Ok::<_, MarshalError>((k, to_attribute(v)?)))
                .collect::<MarshalResult<_>>()?,
        ),
    })
}

fn from_attribute(value: &AttributeValue) -> MarshalResult<Value> {
    Ok(match value {
        AttributeValue::Null => Value::Null,
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::N(n) => Value::Number(parse_number(n)?),
        AttributeValue::B(bytes) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
        AttributeValue::L(values) => Value::Array(
            values
                .iter()
                .map(from_attribute)
                .collect::<MarshalResult<Vec<_>>>()?,
        ),
        AttributeValue::M(map) => {
            let mut out = Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), from_attribute(v)?);
            }
            Value::Object(out)
        }
        AttributeValue::Ss(values) => {
            Value::Array(values.iter().cloned().map(Value::String).collect())
        }
        AttributeValue::Ns(values) => Value::Array(
            values
                .iter()
                .map(|n| parse_number(n).map(Value::Number))
                .collect::<MarshalResult<Vec<_>>>()?,
        ),
        AttributeValue::Bs(values) => Value::Array(
            values
                .iter()
                .map(|bytes| Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()))
                .collect(),
        ),
    })
}

fn parse_number(text: &str) -> MarshalResult<Number> {
    let trimmed = text.trim();
    if let Ok(i) = trimmed.parse::<i64>() {
        return Ok(Number::from(i));
    }
    if let Ok(u) = trimmed.parse::<u64>() {
        return Ok(Number::from(u));
    }
    trimmed
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .ok_or_else(|| MarshalError::InvalidNumber(text.to_string()))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "map",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct User {
        #[serde(rename = "Id")]
        id: u64,
        name: String,
        tags: Vec<String>,
        active: bool,
        score: Option<f64>,
    }

    #[test]
    fn test_marshal_struct_fields() {
        let user = User {
            id: 7,
            name: "ada".to_string(),
            tags: vec!["admin".to_string()],
            active: true,
            score: None,
        };

        let item = to_item(&user).unwrap();
        assert_eq!(item.get("Id"), Some(&AttributeValue::N("7".to_string())));
        assert_eq!(item.get("name"), Some(&AttributeValue::s("ada")));
        assert_eq!(
            item.get("tags"),
            Some(&AttributeValue::L(vec![AttributeValue::s("admin")]))
        );
        assert_eq!(item.get("score"), Some(&AttributeValue::Null));

        let back: User = from_item(&item).unwrap();
        assert_eq!(back, user);
    }

    #[test]
    fn test_top_level_must_be_map() {
        let err = to_item(&42).unwrap_err();
        assert!(matches!(err, MarshalError::NotAMap("number")));

        let err = to_item(&vec![1, 2]).unwrap_err();
        assert!(matches!(err, MarshalError::NotAMap("sequence")));
    }

    #[test]
    fn test_single_value_marshaling() {
        assert_eq!(to_attribute_value(&3u64).unwrap(), AttributeValue::n(3));
        assert_eq!(to_attribute_value("ada").unwrap(), AttributeValue::s("ada"));
        assert_eq!(
            to_attribute_value(&vec![true, false]).unwrap(),
            AttributeValue::L(vec![AttributeValue::Bool(true), AttributeValue::Bool(false)])
        );
        assert_eq!(
            to_attribute_value(&Option::<String>::None).unwrap(),
            AttributeValue::Null
        );
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let mut item = Item::new();
        item.insert("Id".to_string(), AttributeValue::N("twelve".to_string()));
        let err = from_item::<serde_json::Value>(&item).unwrap_err();
        assert!(matches!(err, MarshalError::InvalidNumber(_)));
    }

    #[test]
    fn test_decode_type_mismatch() {
        let mut item = Item::new();
        item.insert("Id".to_string(), AttributeValue::s("not a number"));
        item.insert("name".to_string(), AttributeValue::s("x"));
        let result: MarshalResult<User> = from_item(&item);
        assert!(matches!(result, Err(MarshalError::Serialization(_))));
    }
}
