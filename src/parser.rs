//! Decoding of the availability endpoint's JSON body.
//!
//! The upstream shape is `{"skusAvailability":[{"sku":491652552,"availability":"in_stock"}]}`.
//! Nothing here fails: a body of the wrong shape is reported as
//! [`ParseOutcome::Unrecognized`], and individual bad entries are skipped.

use serde_json::{Map, Value};
use std::collections::HashMap;

/// Field holding the per-SKU availability list.
pub const AVAILABILITY_FIELD: &str = "skusAvailability";

/// SKU identifier to availability token, rebuilt on every successful parse.
pub type SkuStateMap = HashMap<u64, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    /// Top level was an object carrying an availability array. The map may
    /// still be empty if the array was empty or held only bad entries.
    Parsed(SkuStateMap),
    /// Empty body, not JSON, not an object, or no availability array.
    Unrecognized,
}

impl ParseOutcome {
    #[must_use]
    pub fn is_recognized(&self) -> bool {
        matches!(self, ParseOutcome::Parsed(_))
    }

    #[must_use]
    pub fn into_states(self) -> SkuStateMap {
        match self {
            ParseOutcome::Parsed(states) => states,
            ParseOutcome::Unrecognized => SkuStateMap::new(),
        }
    }
}

/// Classifies a raw body and extracts the SKU states it carries.
#[must_use]
pub fn parse_response(raw: &str) -> ParseOutcome {
    if raw.trim().is_empty() {
        return ParseOutcome::Unrecognized;
    }

    let Ok(Value::Object(top)) = serde_json::from_str::<Value>(raw) else {
        return ParseOutcome::Unrecognized;
    };

    let Some(Value::Array(entries)) = top.get(AVAILABILITY_FIELD) else {
        return ParseOutcome::Unrecognized;
    };

    let states = entries
        .iter()
        .filter_map(Value::as_object)
        .filter_map(entry_state)
        .collect();

    ParseOutcome::Parsed(states)
}

/// Same as [`parse_response`], but an unrecognized body yields an empty map.
#[must_use]
pub fn parse(raw: &str) -> SkuStateMap {
    parse_response(raw).into_states()
}

fn entry_state(entry: &Map<String, Value>) -> Option<(u64, String)> {
    let state = entry.get("availability")?.as_str()?;
    let sku = sku_id(entry.get("sku")?)?;
    Some((sku, state.to_string()))
}

// Integers and all-digit strings are accepted; anything else is dropped.
fn sku_id(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => sku_from_digits(s),
        _ => None,
    }
}

/// An all-digit string as a SKU; signs, whitespace and overflow are rejected.
pub(crate) fn sku_from_digits(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_bodies_yield_empty_map() {
        let bodies = [
            "",
            "   \n",
            "<html>Access Denied</html>",
            "{\"skusAvailability\": [",
            "[]",
            "[{\"sku\":1,\"availability\":\"in_stock\"}]",
            "\"skusAvailability\"",
            "42",
            "null",
            "{}",
            "{\"other\":[]}",
            "{\"skusAvailability\":{\"sku\":1}}",
            "{\"skusAvailability\":null}",
        ];
        for body in bodies {
            assert_eq!(parse_response(body), ParseOutcome::Unrecognized, "body: {body:?}");
            assert!(parse(body).is_empty(), "body: {body:?}");
        }
    }

    #[test]
    fn test_non_object_entries_are_skipped() {
        let outcome = parse_response(r#"{"skusAvailability":[1,"two",null,[3],true]}"#);
        assert_eq!(outcome, ParseOutcome::Parsed(SkuStateMap::new()));
        assert!(parse(r#"{"skusAvailability":[1,"two",null]}"#).is_empty());
    }

    #[test]
    fn test_numeric_string_sku_is_normalized() {
        let states = parse(r#"{"skusAvailability":[{"sku":"123","availability":"in_stock"}]}"#);
        assert_eq!(states, SkuStateMap::from([(123, "in_stock".to_string())]));
    }

    #[test]
    fn test_integer_and_string_skus_collide_on_same_key() {
        let states = parse(
            r#"{"skusAvailability":[
                {"sku":491652552,"availability":"out_of_stock"},
                {"sku":"491652553","availability":"in_stock"}
            ]}"#,
        );
        assert_eq!(states.get(&491_652_552).map(String::as_str), Some("out_of_stock"));
        assert_eq!(states.get(&491_652_553).map(String::as_str), Some("in_stock"));
    }

    #[test]
    fn test_bad_entries_are_dropped_individually() {
        let states = parse(
            r#"{"skusAvailability":[
                {"sku":"12a","availability":"in_stock"},
                {"sku":"","availability":"in_stock"},
                {"sku":-5,"availability":"in_stock"},
                {"sku":1.5,"availability":"in_stock"},
                {"sku":7,"availability":3},
                {"sku":8},
                {"availability":"in_stock"},
                {"sku":9,"availability":"low_on_stock"}
            ]}"#,
        );
        assert_eq!(states, SkuStateMap::from([(9, "low_on_stock".to_string())]));
    }

    #[test]
    fn test_empty_availability_list_is_recognized() {
        let outcome = parse_response(r#"{"skusAvailability":[]}"#);
        assert!(outcome.is_recognized());
        assert!(outcome.into_states().is_empty());
    }

    #[test]
    fn test_extra_fields_are_ignored() {
        let states = parse(
            r#"{"productId":1,"skusAvailability":[{"sku":5,"availability":"in_stock","extra":{}}]}"#,
        );
        assert_eq!(states, SkuStateMap::from([(5, "in_stock".to_string())]));
    }
}
