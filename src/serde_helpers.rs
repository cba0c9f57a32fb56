//! Serde helpers for decoding streamed payloads.
//!
//! Streamed entities are decoded leniently: a field whose value does not fit the
//! entity is dropped and takes its default, so a payload that is valid JSON always
//! produces an entity. When the `tracing` feature is enabled, every dropped field and
//! every unknown field is logged, which helps detect schema drift between fediverse
//! implementations.

#[cfg(feature = "tracing")]
use std::any::type_name;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use serde_path_to_error::{Path, Segment};

/// Upper bound on fields dropped from one payload before falling back to the default entity.
const MAX_REPAIRS: usize = 64;

/// One step into a JSON document.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    Key(String),
    Index(usize),
}

/// Decode an already-parsed JSON payload into an entity, never failing.
///
/// Each time decoding fails, the offending value is removed from the payload and
/// decoding is retried, so the field takes its default. A payload that cannot be
/// repaired this way (e.g. a bare number where an object is expected) yields
/// `T::default()`.
///
/// # Example
///
/// ```ignore
/// let json = serde_json::json!({ "id": "1", "account": "not-an-object" });
/// let status: Status = decode_lenient(json);
/// // Logs: WARN streamed payload field does not match entity schema path="account"
/// assert_eq!(status.account, Account::default());
/// ```
pub(crate) fn decode_lenient<T: DeserializeOwned + Default>(mut value: Value) -> T {
    #[cfg(feature = "tracing")]
    tracing::trace!(
        type_name = %type_name::<T>(),
        json = %value,
        "decoding streamed payload"
    );

    for _ in 0..MAX_REPAIRS {
        let steps = match serde_path_to_error::deserialize::<_, T>(&value) {
            Ok(entity) => {
                #[cfg(feature = "tracing")]
                warn_unknown_fields::<T>(&value);

                return entity;
            }
            Err(error) => {
                #[cfg(feature = "tracing")]
                {
                    let path = error.path().to_string();
                    tracing::warn!(
                        type_name = %type_name::<T>(),
                        path = %path,
                        value = %format_value(lookup_value(&value, &path)),
                        error = %error.inner(),
                        "streamed payload field does not match entity schema, using its default"
                    );
                }

                error_steps(error.path())
            }
        };

        if !steps.is_some_and(|steps| remove_at(&mut value, &steps)) {
            break;
        }
    }

    #[cfg(feature = "tracing")]
    tracing::warn!(
        type_name = %type_name::<T>(),
        "streamed payload does not match entity schema, using defaults"
    );

    T::default()
}

/// Accept an identifier sent either as a JSON string or as a JSON number.
pub(crate) fn string_or_number<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(text) => text,
        Id::Number(number) => number.to_string(),
    })
}

/// Steps to the value a decode error points at; `None` for the document root or
/// for paths through enum content.
fn error_steps(path: &Path) -> Option<Vec<Step>> {
    let steps = path
        .iter()
        .map(|segment| match segment {
            Segment::Map { key } => Some(Step::Key(key.clone())),
            Segment::Seq { index } => Some(Step::Index(*index)),
            Segment::Enum { .. } | Segment::Unknown => None,
        })
        .collect::<Option<Vec<_>>>()?;

    (!steps.is_empty()).then_some(steps)
}

/// Remove the value at `steps`, returning whether anything was removed.
fn remove_at(value: &mut Value, steps: &[Step]) -> bool {
    let Some((last, parents)) = steps.split_last() else {
        return false;
    };

    let mut current = value;
    for step in parents {
        let next = match (current, step) {
            (Value::Object(map), Step::Key(key)) => map.get_mut(key),
            (Value::Array(items), Step::Index(index)) => items.get_mut(*index),
            _ => None,
        };
        let Some(next) = next else {
            return false;
        };
        current = next;
    }

    match (current, last) {
        (Value::Object(map), Step::Key(key)) => map.remove(key).is_some(),
        (Value::Array(items), Step::Index(index)) if *index < items.len() => {
            items.remove(*index);
            true
        }
        _ => false,
    }
}

#[cfg(feature = "tracing")]
fn warn_unknown_fields<T: DeserializeOwned>(value: &Value) {
    let mut unknown_paths: Vec<String> = Vec::new();
    let _decoded: Result<T, serde_json::Error> = serde_ignored::deserialize(value, |path| {
        unknown_paths.push(path.to_string());
    });

    for path in unknown_paths {
        tracing::warn!(
            type_name = %type_name::<T>(),
            field = %path,
            value = %format_value(lookup_value(value, &path)),
            "unknown field in streamed payload"
        );
    }
}

/// Look up a value in a JSON structure by a `serde_ignored` / `serde_path_to_error` path.
///
/// `?` segments (Option wrappers) are skipped, numeric segments index arrays.
#[cfg(feature = "tracing")]
fn lookup_value<'value>(value: &'value Value, path: &str) -> Option<&'value Value> {
    let mut current = value;

    for segment in path_segments(path) {
        if segment.is_empty() || segment == "?" {
            continue;
        }

        match current {
            Value::Object(map) => current = map.get(&segment)?,
            Value::Array(arr) => current = arr.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        }
    }

    Some(current)
}

/// Split `account.emojis[0].shortcode` into `["account", "emojis", "0", "shortcode"]`.
#[cfg(feature = "tracing")]
fn path_segments(path: &str) -> Vec<String> {
    path.split(['.', '[', ']'])
        .filter(|segment| !segment.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

#[cfg(feature = "tracing")]
fn format_value(value: Option<&Value>) -> String {
    value.map_or_else(|| "<unable to retrieve>".to_owned(), Value::to_string)
}
