//! JSON file helpers.

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::ser::{CompactFormatter, Formatter, PrettyFormatter, Serializer};
use serde_json::Value;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;

/// Output formatting for [`dump_json`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonOptions {
    /// Spaces per nesting level. `None` writes everything on one line.
    pub indent: Option<usize>,
    /// Sort object keys. Otherwise keys keep their insertion order.
    pub sort_keys: bool,
    /// Escape every non-ASCII character as `\uXXXX`.
    pub ensure_ascii: bool,
}

impl Default for JsonOptions {
    fn default() -> Self {
        Self {
            indent: Some(4),
            sort_keys: false,
            ensure_ascii: false,
        }
    }
}

/// Loads a JSON file into any deserializable type.
#[tracing::instrument(skip(path), fields(path = %path.as_ref().display()))]
pub fn load_json<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let value = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse JSON from {}", path.display()))?;
    Ok(value)
}

/// Writes `value` as JSON to `path`, replacing any previous content.
#[tracing::instrument(skip(value, path), fields(path = %path.as_ref().display()))]
pub fn dump_json<T, P>(value: &T, path: P, options: &JsonOptions) -> Result<()>
where
    T: Serialize + ?Sized,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let json = to_json_string(value, options)?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Renders `value` the way [`dump_json`] would write it.
pub fn to_json_string<T>(value: &T, options: &JsonOptions) -> Result<String>
where
    T: Serialize + ?Sized,
{
    let mut out = Vec::new();

    if options.sort_keys {
        let mut tree = serde_json::to_value(value).context("Failed to serialize JSON")?;
        sort_keys(&mut tree);
        write_formatted(&mut out, &tree, options.indent)?;
    } else {
        write_formatted(&mut out, value, options.indent)?;
    }

    let json = String::from_utf8(out).context("Serialized JSON is not UTF-8")?;
    if options.ensure_ascii {
        Ok(escape_non_ascii(&json))
    } else {
        Ok(json)
    }
}

fn write_formatted<T>(out: &mut Vec<u8>, value: &T, indent: Option<usize>) -> Result<()>
where
    T: Serialize + ?Sized,
{
    match indent {
        Some(width) => {
            let indent = " ".repeat(width);
            serialize_with(out, value, PrettyFormatter::with_indent(indent.as_bytes()))
        }
        None => serialize_with(out, value, CompactFormatter),
    }
}

fn serialize_with<T, F>(out: &mut Vec<u8>, value: &T, formatter: F) -> Result<()>
where
    T: Serialize + ?Sized,
    F: Formatter,
{
    let mut serializer = Serializer::with_formatter(out, formatter);
    value
        .serialize(&mut serializer)
        .context("Failed to serialize JSON")
}

fn sort_keys(value: &mut Value) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = std::mem::take(map).into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            for (_, v) in entries.iter_mut() {
                sort_keys(v);
            }
            *map = entries.into_iter().collect();
        }
        Value::Array(items) => items.iter_mut().for_each(sort_keys),
        _ => {}
    }
}

/// Non-ASCII characters only ever occur inside JSON strings, so escaping them
/// in the rendered text keeps the document valid.
fn escape_non_ascii(json: &str) -> String {
    let mut escaped = String::with_capacity(json.len());
    let mut units = [0u16; 2];
    for c in json.chars() {
        if c.is_ascii() {
            escaped.push(c);
        } else {
            for unit in c.encode_utf16(&mut units) {
                escaped.push_str(&format!("\\u{:04x}", unit));
            }
        }
    }
    escaped
}
