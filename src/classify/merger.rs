//! Classification merger
//!
//! Folds partial results into one verdict by label precedence. The fold is a
//! pure maximum, so it is commutative and associative over the partial list:
//! merging in any order or grouping yields the same `Verdict`.

use super::types::{ClassificationResult, FileEvent, Label, PartialResult};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// What one source contributed to a verdict.
#[derive(Debug, Clone, PartialEq)]
pub struct Contribution {
    pub label: Label,
    pub confidence: f64,
    pub evidence: serde_json::Value,
}

impl Contribution {
    /// Total order used to settle two contributions under one source id.
    fn rank(&self, other: &Self) -> Ordering {
        self.label
            .cmp(&other.label)
            .then(self.confidence.total_cmp(&other.confidence))
            .then_with(|| self.evidence.to_string().cmp(&other.evidence.to_string()))
    }
}

/// The merged state of zero or more partial results.
///
/// Holds the strongest contribution per source id. Label and confidence are
/// read off those contributions, so every reported confidence belongs to
/// evidence that is still present.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Verdict {
    contributions: BTreeMap<String, Contribution>,
}

impl Verdict {
    /// The verdict of an empty partial list.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Fold one partial result into the verdict.
    pub fn absorb(&mut self, partial: &PartialResult) {
        self.record(
            partial.source_id.clone(),
            Contribution {
                label: partial.label,
                confidence: partial.confidence,
                evidence: partial.evidence.clone(),
            },
        );
    }

    /// Combine two verdicts as if their partial lists had been merged together.
    pub fn combine(mut self, other: Verdict) -> Verdict {
        for (source_id, contribution) in other.contributions {
            self.record(source_id, contribution);
        }
        self
    }

    fn record(&mut self, source_id: String, contribution: Contribution) {
        match self.contributions.get(&source_id) {
            Some(existing) if existing.rank(&contribution) != Ordering::Less => {}
            _ => {
                self.contributions.insert(source_id, contribution);
            }
        }
    }

    /// Highest non-`None` label with the maximum confidence reported for it.
    fn top(&self) -> Option<(Label, f64)> {
        self.contributions
            .values()
            .filter(|c| c.label != Label::None)
            .fold(None, |top, c| match top {
                None => Some((c.label, c.confidence)),
                Some((label, _)) if c.label > label => Some((c.label, c.confidence)),
                Some((label, best)) if c.label == label => Some((label, best.max(c.confidence))),
                keep => keep,
            })
    }

    /// The chosen label: highest non-`None` contribution, else `Unknown`.
    pub fn label(&self) -> Label {
        self.top().map(|(label, _)| label).unwrap_or(Label::Unknown)
    }

    /// Maximum confidence among contributors agreeing with `label()`.
    pub fn confidence(&self) -> f64 {
        self.top().map(|(_, confidence)| confidence).unwrap_or(0.0)
    }

    /// Sources that produced a result, whatever their label.
    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.contributions.keys().map(String::as_str)
    }

    pub fn contribution(&self, source_id: &str) -> Option<&Contribution> {
        self.contributions.get(source_id)
    }

    /// Evidence keyed by the source that produced it.
    pub fn evidence_by_source(&self) -> BTreeMap<String, serde_json::Value> {
        self.contributions
            .iter()
            .map(|(source, c)| (source.clone(), c.evidence.clone()))
            .collect()
    }

    /// Attach the file identity and produce the dispatchable result.
    pub fn finalize(&self, event: &FileEvent, classified_at: DateTime<Utc>) -> ClassificationResult {
        ClassificationResult {
            file_path: event.file_path.clone(),
            file_locator: event.file_locator.clone(),
            size_bytes: event.size_bytes,
            label: self.label(),
            confidence: self.confidence(),
            evidence_by_source: self.evidence_by_source(),
            classified_at,
        }
    }
}

/// Merge partial results by label precedence.
///
/// `merge(&[])` is `Unknown` with confidence 0.0 and no evidence.
pub fn merge(partials: &[PartialResult]) -> Verdict {
    partials.iter().fold(Verdict::empty(), |mut verdict, partial| {
        verdict.absorb(partial);
        verdict
    })
}
