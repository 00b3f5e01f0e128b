//! Shared primitive types used across the console core.

use crate::error::ConsoleError;
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Milliseconds on the console's virtual clock.
pub type Millis = u64;

/// One identifier per mounted view.
pub type SessionId = String;

/// Host-assigned identifier of the element the map is mounted into.
pub type ContainerId = String;

/// Opaque report identity.
///
/// The report API emits numeric ids while the scoring API may echo them
/// back as strings. Both decode to the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ReportId(String);

impl ReportId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<u64> for ReportId {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}

impl From<&str> for ReportId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for ReportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ReportId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            Int(i64),
            Text(String),
        }

        Ok(match Wire::deserialize(deserializer)? {
            Wire::Int(n) => Self(n.to_string()),
            Wire::Text(s) => Self(s),
        })
    }
}

/// Fraud-report category. Fixed set; the wire form is case-insensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Sms,
    Url,
    Voip,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Sms, Category::Url, Category::Voip];

    /// Lower-case wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sms  => "sms",
            Self::Url  => "url",
            Self::Voip => "voip",
        }
    }

    /// Upper-case display label, also used by the scoring API.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Sms  => "SMS",
            Self::Url  => "URL",
            Self::Voip => "VOIP",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Category {
    type Err = ConsoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sms"  => Ok(Self::Sms),
            "url"  => Ok(Self::Url),
            "voip" => Ok(Self::Voip),
            _ => Err(ConsoleError::UnknownCategory(s.to_string())),
        }
    }
}

impl<'de> Deserialize<'de> for Category {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// The independently refreshed data streams the console consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Points,
    Rows,
    Scoring,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Points  => "points",
            Self::Rows    => "rows",
            Self::Scoring => "scoring",
        })
    }
}

/// A batch decoded one record at a time.
///
/// A record that does not decode (unknown category, null id, wrong shape)
/// is dropped and counted in `rejected`; the rest of the batch still
/// applies.
#[derive(Debug, Clone, PartialEq)]
pub struct LooseBatch<T> {
    pub records:  Vec<T>,
    pub rejected: usize,
}

impl<T> LooseBatch<T> {
    /// Records received, decodable or not.
    pub fn received(&self) -> usize {
        self.records.len() + self.rejected
    }
}

impl<T> Default for LooseBatch<T> {
    fn default() -> Self {
        Self { records: Vec::new(), rejected: 0 }
    }
}

impl<T> From<Vec<T>> for LooseBatch<T> {
    fn from(records: Vec<T>) -> Self {
        Self { records, rejected: 0 }
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for LooseBatch<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Vec::<serde_json::Value>::deserialize(deserializer)?;
        let mut batch = Self { records: Vec::with_capacity(raw.len()), rejected: 0 };
        for value in raw {
            match serde_json::from_value(value) {
                Ok(record) => batch.records.push(record),
                Err(e) => {
                    log::debug!("dropping undecodable record: {e}");
                    batch.rejected += 1;
                }
            }
        }
        Ok(batch)
    }
}
