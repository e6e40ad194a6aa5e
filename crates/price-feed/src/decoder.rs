//! Live frame decoding
//!
//! Frames are JSON objects mapping asset id to a decimal string price:
//! `{"bitcoin":"50123.45","ethereum":"3011.2"}`. A frame that is not valid
//! JSON, or not an object, fails as a whole. Inside a valid frame each entry
//! is checked on its own so one bad price does not drop the others.

use serde_json::Value;
use std::fmt;

use nexus_core::{DecodeError, DecodeResult, PriceTick};

/// Decode one text frame into a lazy sequence of per-entry results
pub fn decode_frame(text: &str) -> DecodeResult<FrameTicks> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| DecodeError::Malformed(e.to_string()))?;

    match value {
        Value::Object(map) => Ok(FrameTicks {
            entries: map.into_iter(),
        }),
        other => Err(DecodeError::NotAnObject(json_kind(&other))),
    }
}

/// Entries of one decoded frame. One-shot: consumed as it is iterated.
pub struct FrameTicks {
    entries: serde_json::map::IntoIter,
}

impl fmt::Debug for FrameTicks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameTicks")
            .field("remaining", &self.entries.size_hint().0)
            .finish()
    }
}

impl FrameTicks {
    /// Valid ticks only; each rejected entry is handed to `on_error`
    pub fn valid<F>(self, mut on_error: F) -> impl Iterator<Item = PriceTick>
    where
        F: FnMut(DecodeError),
    {
        self.filter_map(move |entry| match entry {
            Ok(tick) => Some(tick),
            Err(e) => {
                on_error(e);
                None
            }
        })
    }
}

impl Iterator for FrameTicks {
    type Item = DecodeResult<PriceTick>;

    fn next(&mut self) -> Option<Self::Item> {
        let (id, value) = self.entries.next()?;
        Some(decode_entry(id, value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entries.size_hint()
    }
}

fn decode_entry(id: String, value: Value) -> DecodeResult<PriceTick> {
    let Value::String(raw) = value else {
        return Err(DecodeError::InvalidEntry {
            id,
            value: value.to_string(),
        });
    };

    match raw.trim().parse::<f64>() {
        Ok(price) if price.is_finite() => Ok(PriceTick { id, price }),
        _ => Err(DecodeError::InvalidPrice { id, value: raw }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
