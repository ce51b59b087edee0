//! Tab-delimited key/value maps.
//!
//! One `key<TAB>value<NEWLINE>` line per entry, keys in sorted order.
//! Strings are written in single quotes so that `'42'` stays a string;
//! unquoted values read back as an integer, then a float, then a string.

use std::collections::BTreeMap;

use bytes::{BufMut, BytesMut};

use crate::error::{Result, SerializeError};
use crate::value::Value;

const DELIMITER: char = '\t';
const NEWLINE: char = '\n';

/// An ordered key/value map.
pub type AsciiMap = BTreeMap<String, Value>;

/// Append the text form of `map` to `dst`.
pub fn encode_map(map: &AsciiMap, dst: &mut BytesMut) -> Result<()> {
    let mut out = String::new();
    for (key, value) in map {
        if key.is_empty() || key.contains([DELIMITER, NEWLINE]) {
            return Err(SerializeError::InvalidMapKey(key.clone()));
        }
        out.push_str(key);
        out.push(DELIMITER);
        match value {
            Value::Str(s) => {
                if s.contains([DELIMITER, NEWLINE]) {
                    return Err(SerializeError::InvalidMapValue(key.clone()));
                }
                out.push('\'');
                out.push_str(s);
                out.push('\'');
            }
            Value::Int(v) => out.push_str(&v.to_string()),
            // Debug keeps a decimal point on whole floats ("2.0"), so they
            // read back as floats.
            Value::Float(v) => out.push_str(&format!("{v:?}")),
        }
        out.push(NEWLINE);
    }
    dst.put_slice(out.as_bytes());
    Ok(())
}

/// Parse the text form of a map.
pub fn decode_map(src: &[u8]) -> Result<AsciiMap> {
    let text = std::str::from_utf8(src)
        .map_err(|err| SerializeError::parse(err.valid_up_to(), "input is not valid UTF-8"))?;

    let mut map = AsciiMap::new();
    let mut offset = 0usize;
    for raw in text.split_inclusive(NEWLINE) {
        let line_start = offset;
        offset += raw.len();

        let line = raw.trim_end_matches(NEWLINE).trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }

        let mut parts = line.split(DELIMITER);
        let key = parts.next().unwrap_or_default();
        let Some(value) = parts.next() else {
            return Err(SerializeError::parse(line_start, "missing tab delimiter"));
        };
        if parts.next().is_some() {
            return Err(SerializeError::parse(
                line_start,
                format!("more than one tab delimiter in line for key {key:?}"),
            ));
        }
        if key.is_empty() {
            return Err(SerializeError::parse(line_start, "empty key"));
        }
        if map.insert(key.to_string(), parse_value(value)).is_some() {
            return Err(SerializeError::parse(
                line_start,
                format!("duplicate key {key:?}"),
            ));
        }
    }
    Ok(map)
}

fn parse_value(text: &str) -> Value {
    for quote in ['\'', '"'] {
        if text.len() >= 2 && text.starts_with(quote) && text.ends_with(quote) {
            return Value::Str(text[1..text.len() - 1].to_string());
        }
    }
    if let Ok(v) = text.parse::<i64>() {
        return Value::Int(v);
    }
    if let Ok(v) = text.parse::<f64>() {
        return Value::Float(v);
    }
    Value::Str(text.to_string())
}
