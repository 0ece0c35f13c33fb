//! Loader for the historical usage trace.
//!
//! The trace is a JSON array of records, one per computer and interval kind:
//!
//! ```json
//! [{"PC": "ws-01", "Type": "InactivityIntervals",
//!   "data": [{"Day": "Monday", "Hour": "08", "Intervals": [310.0, 95.5]}]}]
//! ```
//!
//! `OffIntervals` hold the lengths of user shutdowns and `OffFrequencies`
//! the shutdowns observed per hour. Records for the pseudo computer `_Total`
//! are summary rows and are skipped.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, warn};

use super::{ContextKey, ContextSamples, IntervalSamples};
use crate::error::TraceError;

const TOTAL_PSEUDO_COMPUTER: &str = "_Total";

#[derive(Debug, Deserialize)]
struct Record {
    #[serde(rename = "PC")]
    pc: String,
    #[serde(rename = "Type")]
    kind: RecordKind,
    data: Vec<Cell>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
enum RecordKind {
    ActivityIntervals,
    InactivityIntervals,
    OffIntervals,
    OffFrequencies,
}

#[derive(Debug, Deserialize)]
struct Cell {
    #[serde(rename = "Day")]
    day: String,
    #[serde(rename = "Hour")]
    hour: Hour,
    #[serde(rename = "Intervals")]
    intervals: Vec<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Hour {
    Number(u8),
    Text(String),
}

impl Hour {
    fn parse(&self) -> Result<u8, TraceError> {
        let h = match self {
            Self::Number(h) => Some(*h),
            Self::Text(s) => s.trim().parse::<u8>().ok(),
        };
        h.filter(|h| *h < 24).ok_or_else(|| {
            TraceError::InvalidHour(match self {
                Self::Number(h) => h.to_string(),
                Self::Text(s) => s.clone(),
            })
        })
    }
}

/// Quality filter applied while loading.
///
/// Inactivity gaps outside `[xmin, xmax]` are dropped, as is every
/// non-positive interval. Shutdown frequencies may be zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceFilter {
    pub xmin: f64,
    pub xmax: f64,
}

impl TraceFilter {
    fn keep(&self, kind: RecordKind, x: f64) -> bool {
        match kind {
            RecordKind::InactivityIntervals => x > 0.0 && (self.xmin..=self.xmax).contains(&x),
            RecordKind::OffFrequencies => x.is_finite() && x >= 0.0,
            _ => x > 0.0 && x.is_finite(),
        }
    }
}

/// Per-computer observations, restricted to complete contexts.
#[derive(Debug, Clone, Default)]
pub struct TraceDataset {
    computers: BTreeMap<String, ContextSamples>,
}

impl TraceDataset {
    /// Reads and parses the trace file at `path`.
    ///
    /// # Errors
    ///
    /// Returns `TraceError` if the file cannot be read or is malformed, or if
    /// no computer has a complete context after filtering.
    pub fn from_path(path: &Path, filter: &TraceFilter) -> Result<Self, TraceError> {
        let content = fs::read_to_string(path).map_err(|source| TraceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&content, filter)
    }

    /// Parses a trace held in memory.
    ///
    /// # Errors
    ///
    /// See [`from_path`](Self::from_path).
    pub fn from_json_str(s: &str, filter: &TraceFilter) -> Result<Self, TraceError> {
        let records: Vec<Record> = serde_json::from_str(s)?;

        let mut seen = BTreeSet::new();
        let mut computers: BTreeMap<String, ContextSamples> = BTreeMap::new();

        for record in records {
            if record.pc == TOTAL_PSEUDO_COMPUTER {
                continue;
            }
            if !seen.insert((record.pc.clone(), record.kind)) {
                return Err(TraceError::DuplicateComputer(
                    record.pc,
                    format!("{:?}", record.kind),
                ));
            }
            let contexts = computers.entry(record.pc).or_default();
            for cell in record.data {
                let day = ContextKey::day_from_name(&cell.day)
                    .ok_or_else(|| TraceError::UnknownDay(cell.day.clone()))?;
                let key = ContextKey {
                    day,
                    hour: cell.hour.parse()?,
                };
                let kept = cell.intervals.into_iter().filter(|&x| filter.keep(record.kind, x));
                let slot = contexts.entry(key).or_default();
                match record.kind {
                    RecordKind::ActivityIntervals => slot.activity.extend(kept),
                    RecordKind::InactivityIntervals => slot.inactivity.extend(kept),
                    RecordKind::OffIntervals => slot.off_durations.extend(kept),
                    RecordKind::OffFrequencies => slot.off_fractions.extend(kept),
                }
            }
        }

        for (pc, contexts) in &mut computers {
            contexts.retain(|_, s| s.is_complete());
            if contexts.is_empty() {
                warn!(computer = %pc, "no complete activity data, dropping computer");
            }
        }
        computers.retain(|_, c| !c.is_empty());
        if computers.is_empty() {
            return Err(TraceError::NoUsableComputers);
        }

        debug!(computers = computers.len(), "trace loaded");
        Ok(Self { computers })
    }

    /// Keeps only the computers present in both `self` and `other`.
    ///
    /// Returns the names that were dropped from either side.
    ///
    /// # Errors
    ///
    /// Returns `TraceError::NoUsableComputers` if no computer is shared.
    pub fn intersect(&mut self, other: &mut Self) -> Result<Vec<String>, TraceError> {
        let dropped: Vec<String> = self
            .computers
            .keys()
            .filter(|pc| !other.computers.contains_key(*pc))
            .chain(other.computers.keys().filter(|pc| !self.computers.contains_key(*pc)))
            .cloned()
            .collect();
        for pc in &dropped {
            warn!(computer = %pc, "computer missing from one of the traces, dropping it");
            self.computers.remove(pc);
            other.computers.remove(pc);
        }
        if self.computers.is_empty() {
            return Err(TraceError::NoUsableComputers);
        }
        Ok(dropped)
    }

    /// Observations of one computer.
    pub fn computer(&self, name: &str) -> Option<&ContextSamples> {
        self.computers.get(name)
    }

    /// Computers in name order with their observations.
    pub fn computers(&self) -> impl Iterator<Item = (&str, &ContextSamples)> {
        self.computers.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.computers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.computers.is_empty()
    }

    /// Observations of every computer merged per context.
    pub fn pooled(&self) -> ContextSamples {
        let mut merged = ContextSamples::new();
        for contexts in self.computers.values() {
            for (key, s) in contexts {
                merged.entry(*key).or_insert_with(IntervalSamples::default).extend(s);
            }
        }
        merged
    }

    /// Every inactivity gap of every computer.
    pub fn inactivity_samples(&self) -> Vec<f64> {
        self.computers
            .values()
            .flat_map(|c| c.values())
            .flat_map(|s| s.inactivity.iter().copied())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FILTER: TraceFilter = TraceFilter {
        xmin: 60.0,
        xmax: 3_600.0,
    };

    const TRACE: &str = r#"[
        {"PC": "ws-01", "Type": "ActivityIntervals",
         "data": [{"Day": "Monday", "Hour": "08", "Intervals": [30.0, 0.0, 45.0]},
                  {"Day": "Monday", "Hour": "09", "Intervals": [12.0]}]},
        {"PC": "ws-01", "Type": "InactivityIntervals",
         "data": [{"Day": "Monday", "Hour": "08", "Intervals": [10.0, 120.0, 9000.0]}]},
        {"PC": "ws-01", "Type": "OffIntervals",
         "data": [{"Day": "Monday", "Hour": "08", "Intervals": [3600.0, -5.0]}]},
        {"PC": "ws-01", "Type": "OffFrequencies",
         "data": [{"Day": "Monday", "Hour": "08", "Intervals": [0.0, 0.5]}]},
        {"PC": "ws-02", "Type": "ActivityIntervals",
         "data": [{"Day": "Tuesday", "Hour": 14, "Intervals": [5.0]}]},
        {"PC": "ws-02", "Type": "InactivityIntervals",
         "data": [{"Day": "Tuesday", "Hour": "14", "Intervals": [600.0]}]},
        {"PC": "_Total", "Type": "ActivityIntervals",
         "data": [{"Day": "Monday", "Hour": "08", "Intervals": [1.0]}]}
    ]"#;

    #[test]
    fn parses_and_filters() {
        let ds = TraceDataset::from_json_str(TRACE, &FILTER).unwrap();
        assert_eq!(ds.len(), 2);

        let (name, contexts) = ds.computers().next().unwrap();
        assert_eq!(name, "ws-01");
        // Monday 09 has no inactivity so it is incomplete and dropped
        assert_eq!(contexts.len(), 1);
        let s = &contexts[&ContextKey { day: 1, hour: 8 }];
        assert_eq!(s.activity, vec![30.0, 45.0]);
        assert_eq!(s.inactivity, vec![120.0]);
        assert_eq!(s.off_durations, vec![3_600.0]);
        assert_eq!(s.off_fractions, vec![0.0, 0.5]);
    }

    #[test]
    fn intersect_keeps_shared_computers() {
        let mut simulated = TraceDataset::from_json_str(TRACE, &FILTER).unwrap();
        let training_trace = r#"[
            {"PC": "ws-02", "Type": "ActivityIntervals",
             "data": [{"Day": "Friday", "Hour": "10", "Intervals": [8.0]}]},
            {"PC": "ws-02", "Type": "InactivityIntervals",
             "data": [{"Day": "Friday", "Hour": "10", "Intervals": [900.0]}]},
            {"PC": "ws-09", "Type": "ActivityIntervals",
             "data": [{"Day": "Friday", "Hour": "10", "Intervals": [8.0]}]},
            {"PC": "ws-09", "Type": "InactivityIntervals",
             "data": [{"Day": "Friday", "Hour": "10", "Intervals": [900.0]}]}
        ]"#;
        let mut training = TraceDataset::from_json_str(training_trace, &FILTER).unwrap();

        let dropped = simulated.intersect(&mut training).unwrap();
        assert_eq!(dropped, vec!["ws-01".to_string(), "ws-09".to_string()]);
        assert_eq!(simulated.computers().map(|(pc, _)| pc).collect::<Vec<_>>(), vec!["ws-02"]);
        assert_eq!(training.computers().map(|(pc, _)| pc).collect::<Vec<_>>(), vec!["ws-02"]);
        assert_eq!(training.inactivity_samples(), vec![900.0]);
    }

    #[test]
    fn disjoint_traces_do_not_intersect() {
        let mut a = TraceDataset::from_json_str(TRACE, &FILTER).unwrap();
        let other = r#"[
            {"PC": "ws-77", "Type": "ActivityIntervals",
             "data": [{"Day": "Friday", "Hour": "10", "Intervals": [8.0]}]},
            {"PC": "ws-77", "Type": "InactivityIntervals",
             "data": [{"Day": "Friday", "Hour": "10", "Intervals": [900.0]}]}
        ]"#;
        let mut b = TraceDataset::from_json_str(other, &FILTER).unwrap();
        assert!(matches!(a.intersect(&mut b), Err(TraceError::NoUsableComputers)));
    }

    #[test]
    fn numeric_hours_accepted() {
        let ds = TraceDataset::from_json_str(TRACE, &FILTER).unwrap();
        let pooled = ds.pooled();
        assert!(pooled.contains_key(&ContextKey { day: 2, hour: 14 }));
    }

    #[test]
    fn inactivity_samples_pool_all_computers() {
        let ds = TraceDataset::from_json_str(TRACE, &FILTER).unwrap();
        let mut xs = ds.inactivity_samples();
        xs.sort_by(f64::total_cmp);
        assert_eq!(xs, vec![120.0, 600.0]);
    }

    #[test]
    fn duplicate_record_rejected() {
        let trace = r#"[
            {"PC": "a", "Type": "ActivityIntervals", "data": []},
            {"PC": "a", "Type": "ActivityIntervals", "data": []}
        ]"#;
        let err = TraceDataset::from_json_str(trace, &FILTER);
        assert!(matches!(err, Err(TraceError::DuplicateComputer(ref pc, _)) if pc == "a"));
    }

    #[test]
    fn unknown_day_rejected() {
        let trace = r#"[{"PC": "a", "Type": "ActivityIntervals",
            "data": [{"Day": "Someday", "Hour": "01", "Intervals": [1.0]}]}]"#;
        let err = TraceDataset::from_json_str(trace, &FILTER);
        assert!(matches!(err, Err(TraceError::UnknownDay(_))));
    }

    #[test]
    fn bad_hour_rejected() {
        let trace = r#"[{"PC": "a", "Type": "ActivityIntervals",
            "data": [{"Day": "Monday", "Hour": "24", "Intervals": [1.0]}]}]"#;
        let err = TraceDataset::from_json_str(trace, &FILTER);
        assert!(matches!(err, Err(TraceError::InvalidHour(ref h)) if h == "24"));
    }

    #[test]
    fn unknown_type_is_malformed() {
        let trace = r#"[{"PC": "a", "Type": "Keystrokes", "data": []}]"#;
        assert!(matches!(
            TraceDataset::from_json_str(trace, &FILTER),
            Err(TraceError::Json(_))
        ));
    }

    #[test]
    fn trace_without_complete_context_is_unusable() {
        let trace = r#"[{"PC": "a", "Type": "ActivityIntervals",
            "data": [{"Day": "Monday", "Hour": "01", "Intervals": [1.0]}]}]"#;
        assert!(matches!(
            TraceDataset::from_json_str(trace, &FILTER),
            Err(TraceError::NoUsableComputers)
        ));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = TraceDataset::from_path(Path::new("/nonexistent/trace.json"), &FILTER);
        let msg = err.err().map(|e| e.to_string()).unwrap_or_default();
        assert!(msg.contains("/nonexistent/trace.json"), "{msg}");
    }
}
