// Policies that reduce a run's segment times to what gets saved

use std::{fmt, str::FromStr};

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use super::RunRecord;
use crate::TimeTrialError;

/// What to keep of a finished run's segment times
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AggregationPolicy {
    /// Drop the run, nothing is saved
    Discard,
    /// Keep the fastest segment
    Best,
    /// Keep the final segment
    Last,
    /// Keep every segment
    All,
    /// Replace the segments with their arithmetic mean
    Mean,
    /// Replace the segments with their median
    Median,
}

impl AggregationPolicy {
    pub const ALL: [AggregationPolicy; 6] = [
        AggregationPolicy::Discard,
        AggregationPolicy::Best,
        AggregationPolicy::Last,
        AggregationPolicy::All,
        AggregationPolicy::Mean,
        AggregationPolicy::Median,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationPolicy::Discard => "discard",
            AggregationPolicy::Best => "best",
            AggregationPolicy::Last => "last",
            AggregationPolicy::All => "all",
            AggregationPolicy::Mean => "mean",
            AggregationPolicy::Median => "median",
        }
    }
}

impl fmt::Display for AggregationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggregationPolicy {
    type Err = TimeTrialError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|policy| policy.as_str() == wanted)
            .ok_or_else(|| TimeTrialError::UnknownPolicy {
                policy: s.to_string(),
            })
    }
}

/// Apply `policy` to the record's segment times.
///
/// Returns `None` for [`AggregationPolicy::Discard`]. Policies that reduce to a
/// single value leave an empty list empty.
pub fn process(policy: AggregationPolicy, mut record: RunRecord) -> Option<RunRecord> {
    let times = std::mem::take(&mut record.segment_times);
    record.segment_times = match policy {
        AggregationPolicy::Discard => return None,
        AggregationPolicy::All => times,
        AggregationPolicy::Best => times.into_iter().min_by(f32::total_cmp).into_iter().collect(),
        AggregationPolicy::Last => times.last().copied().into_iter().collect(),
        AggregationPolicy::Mean => mean(&times).into_iter().collect(),
        AggregationPolicy::Median => median(&times).into_iter().collect(),
    };
    Some(record)
}

fn mean(times: &[f32]) -> Option<f32> {
    if times.is_empty() {
        return None;
    }
    let sum: f64 = times.iter().map(|t| *t as f64).sum();
    Some((sum / times.len() as f64) as f32)
}

fn median(times: &[f32]) -> Option<f32> {
    let sorted = times.iter().copied().sorted_by(f32::total_cmp).collect_vec();
    let mid = sorted.len() / 2;
    match sorted.len() {
        0 => None,
        n if n % 2 == 1 => Some(sorted[mid]),
        _ => Some(((sorted[mid - 1] as f64 + sorted[mid] as f64) / 2.) as f32),
    }
}
