use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// One logged outgoing message, as written by the shim.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct Entry {
    pub id: String,
    pub to: String,
    pub subject: String,
    pub from: String,
    pub headers: String,
    pub message: String,
    pub attachments: Vec<String>,
    pub timestamp: String,
    pub timestamp_unix: Option<i64>,
}

impl Entry {
    pub fn sort_key(&self) -> i64 {
        self.timestamp_unix.unwrap_or(0)
    }

    pub fn display_timestamp(&self) -> String {
        if !self.timestamp.trim().is_empty() {
            return self.timestamp.clone();
        }
        self.timestamp_unix
            .and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok())
            .and_then(|at| at.format(&Rfc3339).ok())
            .unwrap_or_default()
    }
}

#[derive(Debug, Error)]
pub enum ParseEntryError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("entry is not a json object")]
    NotAnObject,

    #[error("entry id {found:?} does not match file name {expected:?}")]
    IdMismatch { expected: String, found: String },
}

#[derive(Debug, Deserialize)]
struct EntryFile {
    #[serde(default)]
    id: Option<String>,
    #[serde(default, deserialize_with = "joined_text::comma")]
    to: String,
    #[serde(default, deserialize_with = "text")]
    subject: String,
    #[serde(default, deserialize_with = "text")]
    from: String,
    #[serde(default, deserialize_with = "joined_text::newline")]
    headers: String,
    #[serde(default, deserialize_with = "text")]
    message: String,
    #[serde(default, deserialize_with = "text_list")]
    attachments: Vec<String>,
    #[serde(default, deserialize_with = "text")]
    timestamp: String,
    #[serde(default, deserialize_with = "lenient_unix")]
    timestamp_unix: Option<i64>,
}

/// Parses one entry file. `file_stem` is the file name without `.json` and
/// stands in for a missing `id`.
pub fn parse_entry(raw: &str, file_stem: &str) -> Result<Entry, ParseEntryError> {
    let value: Value = serde_json::from_str(raw)?;
    if !value.is_object() {
        return Err(ParseEntryError::NotAnObject);
    }
    let file = EntryFile::deserialize(value)?;

    let id = match file.id {
        Some(id) if id != file_stem => {
            return Err(ParseEntryError::IdMismatch {
                expected: file_stem.to_string(),
                found: id,
            });
        }
        Some(id) => id,
        None => file_stem.to_string(),
    };

    let from = if file.from.trim().is_empty() {
        from_header(&file.headers)
    } else {
        file.from
    };

    Ok(Entry {
        id,
        to: file.to,
        subject: file.subject,
        from,
        headers: file.headers,
        message: file.message,
        attachments: file.attachments,
        timestamp: file.timestamp,
        timestamp_unix: file.timestamp_unix,
    })
}

/// First `From:` header line wins; anything malformed is ignored.
pub fn from_header(headers: &str) -> String {
    headers
        .lines()
        .map(str::trim_start)
        .find(|line| {
            line.get(..5)
                .is_some_and(|prefix| prefix.eq_ignore_ascii_case("from:"))
        })
        .map(|line| line[5..].trim().to_string())
        .unwrap_or_default()
}

/// Newest first. The sort is stable, so equal timestamps keep input order.
pub fn sort_newest_first(entries: &mut [Entry]) {
    entries.sort_by_key(|entry| std::cmp::Reverse(entry.sort_key()));
}

fn text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn text_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

mod joined_text {
    use super::*;

    pub fn comma<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        joined(deserializer, ", ")
    }

    pub fn newline<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        joined(deserializer, "\n")
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum TextOrList {
        Text(String),
        List(Vec<String>),
    }

    fn joined<'de, D>(deserializer: D, separator: &str) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<TextOrList>::deserialize(deserializer)? {
            None => Ok(String::new()),
            Some(TextOrList::Text(text)) => Ok(text),
            Some(TextOrList::List(items)) => Ok(items.join(separator)),
        }
    }
}

fn lenient_unix<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|secs| secs as i64)),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    })
}
