//! Batch model scoring: request payloads and the identity-keyed result
//! mapping that outlives polling cycles.
//!
//! RULE: the mapping only grows. A merge overwrites the entry for each
//! returned identity and never removes identities missing from the batch.

use crate::{
    table::ReportRow,
    types::{Category, ReportId},
};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;

/// One row's worth of input for the scoring collaborator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoringItem {
    pub id: ReportId,
    #[serde(rename = "type", serialize_with = "upper_label")]
    pub category: Category,
    pub text: String,
}

fn upper_label<S: Serializer>(category: &Category, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(category.label())
}

/// Build the scoring payload for `rows`, skipping rows with nothing to score.
pub fn extract_items<'a>(rows: impl IntoIterator<Item = &'a ReportRow>) -> Vec<ScoringItem> {
    rows.into_iter()
        .filter_map(|row| {
            let text = row.payload_text()?;
            Some(ScoringItem {
                id: row.id.clone(),
                category: row.category,
                text: text.to_string(),
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelResult {
    /// Results the collaborator could not attribute carry no id and are
    /// skipped by the merge.
    #[serde(default)]
    pub id: Option<ReportId>,
    #[serde(rename = "prediction")]
    pub predicted_label: String,
    pub score: f64,
    #[serde(rename = "model")]
    pub model_name: String,
    #[serde(rename = "version")]
    pub model_version: String,
}

/// What came back from one scoring request. `failure` is set when the
/// collaborator reported a partial failure; `results` still holds whatever
/// it did return.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoringReply {
    pub results: Vec<ModelResult>,
    #[serde(default)]
    pub failure: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    pub merged:  usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ModelResultMap {
    entries: BTreeMap<ReportId, ModelResult>,
}

impl ModelResultMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&mut self, batch: impl IntoIterator<Item = ModelResult>) -> MergeStats {
        let mut stats = MergeStats::default();
        for result in batch {
            match result.id.clone() {
                Some(id) => {
                    self.entries.insert(id, result);
                    stats.merged += 1;
                }
                None => stats.skipped += 1,
            }
        }
        stats
    }

    pub fn get(&self, id: &ReportId) -> Option<&ModelResult> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &ReportId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &ReportId> {
        self.entries.keys()
    }
}
