/// Stream entries as returned by the store
///
/// Decodes XREAD / XREADGROUP replies into ordered field/value messages

use serde::{Deserialize, Serialize};
use std::fmt;
use redis::Value;
use crate::error::{StreamError, StreamResult};

/// Last-id marker that asks a consumer group for never-delivered entries
pub const NEW_ENTRIES: &str = ">";

/// Store-assigned entry identifier (`<millis>-<seq>`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(String);

impl EntryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntryId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// One stream entry: an id plus its field/value pairs in store order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: EntryId,
    pub fields: Vec<(String, String)>,
}

impl Message {
    pub fn new(id: impl Into<String>, fields: Vec<(String, String)>) -> Self {
        Self {
            id: EntryId::new(id),
            fields,
        }
    }

    /// Value of the first pair named `field`
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value.as_str())
    }

    /// Serialize as a single JSON line
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {{", self.id)?;
        for (i, (name, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", name, value)?;
        }
        f.write_str("}")
    }
}

/// Decode an XREAD / XREADGROUP reply into messages.
///
/// The RESP2 shape is `[[stream, [[id, [f1, v1, f2, v2, ...]], ...]], ...]`;
/// RESP3 servers send the outer level as a map keyed by stream. A nil reply
/// (blocking read timed out) decodes to an empty batch. Entries whose field
/// list is nil (deleted while pending) decode with no fields.
pub fn decode_read_reply(reply: &Value) -> StreamResult<Vec<Message>> {
    let mut messages = Vec::new();

    match reply {
        Value::Nil => {}
        Value::Array(streams) => {
            for stream in streams {
                let parts = as_array(stream, "stream reply")?;
                if parts.len() != 2 {
                    return Err(StreamError::InvalidReply(format!(
                        "stream reply has {} elements, expected 2",
                        parts.len()
                    )));
                }
                decode_entries(&parts[1], &mut messages)?;
            }
        }
        Value::Map(streams) => {
            for (_, entries) in streams {
                decode_entries(entries, &mut messages)?;
            }
        }
        other => {
            return Err(StreamError::InvalidReply(format!(
                "expected array or map, got {:?}",
                other
            )));
        }
    }

    Ok(messages)
}

fn decode_entries(entries: &Value, out: &mut Vec<Message>) -> StreamResult<()> {
    for entry in as_array(entries, "entry list")? {
        let parts = as_array(entry, "entry")?;
        if parts.len() != 2 {
            return Err(StreamError::InvalidReply(format!(
                "entry has {} elements, expected 2",
                parts.len()
            )));
        }

        let id = as_string(&parts[0])?;
        let fields = match &parts[1] {
            Value::Nil => Vec::new(),
            Value::Map(pairs) => pairs
                .iter()
                .map(|(name, value)| Ok((as_string(name)?, as_string(value)?)))
                .collect::<StreamResult<Vec<_>>>()?,
            flat => decode_pairs(as_array(flat, "field list")?, &id)?,
        };

        out.push(Message::new(id, fields));
    }
    Ok(())
}

fn decode_pairs(flat: &[Value], id: &str) -> StreamResult<Vec<(String, String)>> {
    if flat.len() % 2 != 0 {
        return Err(StreamError::InvalidReply(format!(
            "entry {} has an odd number of field/value items ({})",
            id,
            flat.len()
        )));
    }

    flat.chunks(2)
        .map(|pair| Ok((as_string(&pair[0])?, as_string(&pair[1])?)))
        .collect()
}

fn as_array<'a>(value: &'a Value, what: &str) -> StreamResult<&'a [Value]> {
    match value {
        Value::Array(items) => Ok(items),
        other => Err(StreamError::InvalidReply(format!(
            "{} is not an array: {:?}",
            what, other
        ))),
    }
}

// Binary payloads from other producers are rendered lossily rather than rejected
fn as_string(value: &Value) -> StreamResult<String> {
    match value {
        Value::BulkString(bytes) => Ok(String::from_utf8_lossy(bytes).into_owned()),
        other => redis::from_redis_value::<String>(other)
            .map_err(|e| StreamError::InvalidReply(format!("expected string: {}", e))),
    }
}
