//! Core value types shared across the embed core

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Opaque host participant identifier, stable for a session
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ParticipantId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for ParticipantId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// One row of the participant -> stream mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamBinding {
    pub participant_id: ParticipantId,
    pub raw_url: String,
}

impl StreamBinding {
    pub fn new(participant_id: impl Into<ParticipantId>, raw_url: impl Into<String>) -> Self {
        Self {
            participant_id: participant_id.into(),
            raw_url: raw_url.into(),
        }
    }
}

/// The externally-owned mapping of participant to raw stream URL.
///
/// At most one URL per participant. Blank values are kept as stored but read
/// back as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamMap(BTreeMap<ParticipantId, String>);

impl StreamMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a map from raw entries, trimming values and dropping blank ones
    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<ParticipantId>,
        V: AsRef<str>,
    {
        let mut map = BTreeMap::new();
        for (id, url) in entries {
            let url = url.as_ref().trim();
            if !url.is_empty() {
                map.insert(id.into(), url.to_string());
            }
        }
        Self(map)
    }

    /// Trimmed URL for the participant, `None` when missing or blank
    pub fn get(&self, id: &ParticipantId) -> Option<&str> {
        self.0
            .get(id)
            .map(|url| url.trim())
            .filter(|url| !url.is_empty())
    }

    pub fn insert(&mut self, id: impl Into<ParticipantId>, url: impl Into<String>) -> Option<String> {
        self.0.insert(id.into(), url.into())
    }

    pub fn remove(&mut self, id: &ParticipantId) -> Option<String> {
        self.0.remove(id)
    }

    /// Non-blank bindings in participant order
    pub fn bindings(&self) -> impl Iterator<Item = StreamBinding> + '_ {
        self.0.iter().filter_map(|(id, url)| {
            let url = url.trim();
            (!url.is_empty()).then(|| StreamBinding::new(id.clone(), url))
        })
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
