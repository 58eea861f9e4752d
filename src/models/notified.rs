//! Record of titles that have already been announced.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// One announced title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifiedRecord {
    pub identity: String,

    /// Display name, kept for human audit
    #[serde(default)]
    pub title: String,

    /// When the batch carrying this title was delivered
    #[serde(deserialize_with = "lenient_timestamp")]
    pub sent_at: DateTime<Utc>,
}

impl NotifiedRecord {
    pub fn new(identity: impl Into<String>, title: impl Into<String>, sent_at: DateTime<Utc>) -> Self {
        Self {
            identity: identity.into(),
            title: title.into(),
            sent_at,
        }
    }
}

/// Mapping from identity to record. Keys are unique; order is irrelevant.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct NotifiedSet {
    records: BTreeMap<String, NotifiedRecord>,
}

impl NotifiedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.records.contains_key(identity)
    }

    pub fn get(&self, identity: &str) -> Option<&NotifiedRecord> {
        self.records.get(identity)
    }

    pub fn records(&self) -> impl Iterator<Item = &NotifiedRecord> {
        self.records.values()
    }

    /// Most recently sent records first.
    pub fn most_recent(&self, limit: usize) -> Vec<&NotifiedRecord> {
        let mut records: Vec<&NotifiedRecord> = self.records().collect();
        records.sort_by(|a, b| b.sent_at.cmp(&a.sent_at));
        records.truncate(limit);
        records
    }

    /// Add records. Existing identities keep their original record.
    ///
    /// Returns the number of identities newly added.
    pub fn merge<I>(&mut self, records: I) -> usize
    where
        I: IntoIterator<Item = NotifiedRecord>,
    {
        let mut added = 0;
        for record in records {
            if !self.records.contains_key(&record.identity) {
                self.records.insert(record.identity.clone(), record);
                added += 1;
            }
        }
        added
    }
}

impl FromIterator<NotifiedRecord> for NotifiedSet {
    fn from_iter<T: IntoIterator<Item = NotifiedRecord>>(iter: T) -> Self {
        let mut set = NotifiedSet::new();
        set.merge(iter);
        set
    }
}

/// On-disk shapes the store has used over time.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredSet {
    Map(BTreeMap<String, StoredRecord>),
    Legacy(Vec<serde_json::Value>),
}

#[derive(Deserialize)]
struct StoredRecord {
    #[serde(default)]
    title: String,
    #[serde(default, deserialize_with = "lenient_optional_timestamp")]
    sent_at: Option<DateTime<Utc>>,
}

impl<'de> Deserialize<'de> for NotifiedSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let records = match StoredSet::deserialize(deserializer)? {
            // The key is authoritative for identity.
            StoredSet::Map(map) => map
                .into_iter()
                .map(|(identity, stored)| {
                    let sent_at = stored.sent_at.unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
                    let record = NotifiedRecord::new(identity.clone(), stored.title, sent_at);
                    (identity, record)
                })
                .collect(),
            // Bare id arrays carry no title or timestamp.
            StoredSet::Legacy(ids) => ids
                .into_iter()
                .filter_map(|value| match value {
                    serde_json::Value::String(s) => Some(s),
                    serde_json::Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .map(|identity| {
                    let record =
                        NotifiedRecord::new(identity.clone(), "", DateTime::<Utc>::UNIX_EPOCH);
                    (identity, record)
                })
                .collect(),
        };
        Ok(Self { records })
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    // Naive ISO timestamps are read as UTC.
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn lenient_timestamp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{raw}'")))
}

fn lenient_optional_timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_timestamp))
}
