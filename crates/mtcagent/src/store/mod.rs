// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Observation storage: ring-buffered history plus current/last hash maps.
//!
//! Single logical writer (the ingest sequencer) performs every mutation;
//! HTTP handlers only read. The agent wraps the store in an `RwLock`, so no
//! interior locking happens here.
//!
//! Storage model:
//! - `ring`: bounded FIFO of every recorded observation.
//! - `current`: dataitem id -> most recent observation (survives eviction).
//! - `last`: dataitem id -> previous observation.
//! - `active_conditions`: dataitem id -> active CONDITION set keyed by
//!   nativeCode.

mod buffer;
pub mod observation;

pub use buffer::ObservationRing;
pub use observation::{ConditionLevel, ConditionValue, Observation, Value};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{Error, Result};

/// Sequence bookkeeping reported in stream headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceInfo {
    /// Oldest retained sequence.
    pub first: u64,
    /// Newest assigned sequence (0 before the first observation).
    pub last: u64,
    /// Next sequence to be assigned.
    pub next: u64,
}

/// Ring + hash stores with monotonic sequence assignment.
#[derive(Debug)]
pub struct ObservationStore {
    ring: ObservationRing,
    current: HashMap<String, Arc<Observation>>,
    last: HashMap<String, Arc<Observation>>,
    active_conditions: HashMap<String, Vec<Arc<Observation>>>,
    /// Next sequence to assign. Starts at 1.
    next_seq: u64,
    /// Agent-run identifier carried in response headers.
    instance_id: u64,
}

impl ObservationStore {
    /// Create a store with the given ring capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let instance_id = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            ring: ObservationRing::new(capacity),
            current: HashMap::new(),
            last: HashMap::new(),
            active_conditions: HashMap::new(),
            next_seq: 1,
            instance_id,
        }
    }

    // -----------------------------------------------------------------------
    // Mutation (ingest sequencer only)
    // -----------------------------------------------------------------------

    /// Record one observation.
    ///
    /// Returns the assigned sequence, or `None` when the unchanged-value
    /// suppression rule applied (VALUE-representation tags whose value equals
    /// the current one; CONDITION and TIME_SERIES always record).
    pub fn update(&mut self, id: &str, name: &str, time: &str, value: Value) -> Option<u64> {
        if value.suppressible() {
            if let Some(prev) = self.current.get(id) {
                if prev.value == value {
                    log::trace!("[ObservationStore::update] Suppressed unchanged {}", id);
                    return None;
                }
            }
        }

        Some(self.record(id, name, time, value))
    }

    /// Record an observation with no suppression check. Used for discrete
    /// event channels (ASSET_CHANGED / ASSET_REMOVED), where every command
    /// must surface even when the value repeats.
    pub fn update_discrete(&mut self, id: &str, name: &str, time: &str, value: Value) -> u64 {
        self.record(id, name, time, value)
    }

    fn record(&mut self, id: &str, name: &str, time: &str, value: Value) -> u64 {
        let sequence = self.next_seq;
        self.next_seq += 1;

        let obs = Arc::new(Observation {
            sequence,
            time: time.to_string(),
            data_item_id: id.to_string(),
            name: name.to_string(),
            value,
        });

        if let Value::Condition(ref cond) = obs.value {
            self.apply_condition(id, cond, &obs);
        }

        if let Some(prev) = self.current.insert(id.to_string(), obs.clone()) {
            self.last.insert(id.to_string(), prev);
        }
        self.ring.push(obs);

        sequence
    }

    /// CONDITION channel semantics: NORMAL/UNAVAILABLE with empty nativeCode
    /// clears every active condition; anything else adds or replaces the
    /// condition keyed by its nativeCode.
    fn apply_condition(&mut self, id: &str, cond: &ConditionValue, obs: &Arc<Observation>) {
        let active = self.active_conditions.entry(id.to_string()).or_default();
        if cond.clears_all() {
            active.clear();
            active.push(obs.clone());
            return;
        }
        let existing = active.iter_mut().find(|o| {
            matches!(&o.value, Value::Condition(c) if c.native_code == cond.native_code)
        });
        match existing {
            Some(slot) => *slot = obs.clone(),
            None => {
                // A bare clearing entry is superseded by the first real one.
                active.retain(
                    |o| !matches!(&o.value, Value::Condition(c) if c.clears_all()),
                );
                active.push(obs.clone());
            }
        }
    }

    // -----------------------------------------------------------------------
    // Queries (read-only)
    // -----------------------------------------------------------------------

    /// Sequence bookkeeping for stream headers.
    #[must_use]
    pub fn sequence_info(&self) -> SequenceInfo {
        SequenceInfo {
            first: self.ring.first_sequence().unwrap_or(self.next_seq),
            last: self.next_seq - 1,
            next: self.next_seq,
        }
    }

    /// Most recent observation for a dataitem.
    #[must_use]
    pub fn current(&self, id: &str) -> Option<&Arc<Observation>> {
        self.current.get(id)
    }

    /// Previous observation for a dataitem.
    #[must_use]
    pub fn last(&self, id: &str) -> Option<&Arc<Observation>> {
        self.last.get(id)
    }

    /// Active condition set for a CONDITION dataitem, oldest first.
    #[must_use]
    pub fn active_conditions(&self, id: &str) -> &[Arc<Observation>] {
        self.active_conditions
            .get(id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Current observations for the given ids, in id order. Ids with no
    /// observation yet are skipped.
    #[must_use]
    pub fn snapshot_current(&self, ids: &[String]) -> Vec<Arc<Observation>> {
        ids.iter()
            .filter_map(|id| self.current.get(id).cloned())
            .collect()
    }

    /// Per-dataitem state reconstructed at sequence `at` from the ring.
    ///
    /// Fails with `OUT_OF_RANGE` when `at` is outside the retained window.
    pub fn snapshot_at(&self, ids: &[String], at: u64) -> Result<Vec<Arc<Observation>>> {
        let info = self.sequence_info();
        if self.ring.is_empty() || at < info.first || at > info.last {
            return Err(Error::OutOfRange(format!(
                "at={} outside [{}, {}]",
                at, info.first, info.last
            )));
        }

        let mut out = Vec::new();
        for id in ids {
            let found = self
                .ring
                .iter()
                .rev()
                .find(|o| o.sequence <= at && o.data_item_id == *id);
            if let Some(obs) = found {
                out.push(obs.clone());
            }
        }
        Ok(out)
    }

    /// Observations with `sequence in [from, from+count)`, restricted to an
    /// optional id set, in sequence order.
    ///
    /// `count` above the ring capacity is truncated, not an error. `from`
    /// outside `[firstSequence, nextSequence]` fails with `OUT_OF_RANGE`.
    pub fn sample_window(
        &self,
        ids: Option<&HashSet<String>>,
        from: u64,
        count: usize,
    ) -> Result<Vec<Arc<Observation>>> {
        let info = self.sequence_info();
        if from < info.first || from > info.next {
            return Err(Error::OutOfRange(format!(
                "from={} outside [{}, {}]",
                from, info.first, info.next
            )));
        }

        let effective = count.min(self.ring.capacity());
        if effective < count {
            log::debug!(
                "[ObservationStore::sample_window] count {} truncated to capacity {}",
                count,
                effective
            );
        }
        Ok(self.ring.window(from, effective, ids))
    }

    /// Ring capacity (fixed at start).
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Retained observation count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Agent-run identifier.
    #[must_use]
    pub fn instance_id(&self) -> u64 {
        self.instance_id
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar(v: &str) -> Value {
        Value::Scalar(v.to_string())
    }

    fn condition(level: ConditionLevel, code: &str, message: &str) -> Value {
        Value::Condition(ConditionValue {
            level,
            native_code: code.to_string(),
            native_severity: "1".to_string(),
            qualifier: "HIGH".to_string(),
            message: message.to_string(),
        })
    }

    const T: &str = "2014-08-11T08:32:54.028533Z";

    #[test]
    fn sequences_start_at_one_and_increase() {
        let mut store = ObservationStore::new(16);
        assert_eq!(store.update("avail", "avail", T, scalar("AVAILABLE")), Some(1));
        assert_eq!(store.update("estop", "estop", T, scalar("ARMED")), Some(2));
        let info = store.sequence_info();
        assert_eq!(info.first, 1);
        assert_eq!(info.last, 2);
        assert_eq!(info.next, 3);
    }

    #[test]
    fn unchanged_scalar_is_suppressed() {
        let mut store = ObservationStore::new(16);
        assert!(store.update("avail", "avail", T, scalar("AVAILABLE")).is_some());
        assert!(store.update("avail", "avail", T, scalar("AVAILABLE")).is_none());
        assert_eq!(store.len(), 1);
        assert!(store.last("avail").is_none());
    }

    #[test]
    fn changed_scalar_shifts_last() {
        let mut store = ObservationStore::new(16);
        store.update("avail", "avail", T, scalar("AVAILABLE"));
        store.update("avail", "avail", T, scalar("UNAVAILABLE"));

        let current = store.current("avail").expect("current exists");
        let last = store.last("avail").expect("last exists");
        assert_eq!(current.value, scalar("UNAVAILABLE"));
        assert_eq!(last.value, scalar("AVAILABLE"));
        assert!(last.sequence < current.sequence);
    }

    #[test]
    fn condition_never_suppressed() {
        let mut store = ObservationStore::new(16);
        let v = condition(ConditionLevel::Warning, "HTEMP", "Oil Temperature High");
        assert!(store.update("htemp", "htemp", T, v.clone()).is_some());
        assert!(store.update("htemp", "htemp", T, v).is_some());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn time_series_never_suppressed() {
        let mut store = ObservationStore::new(16);
        let v = Value::TimeSeries {
            sample_count: "3".to_string(),
            sample_rate: "100".to_string(),
            samples: "1 2 3".to_string(),
        };
        assert!(store.update("va", "Va", T, v.clone()).is_some());
        assert!(store.update("va", "Va", T, v).is_some());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn condition_channel_accumulates_by_native_code() {
        let mut store = ObservationStore::new(16);
        store.update("c", "c", T, condition(ConditionLevel::Warning, "A", "first"));
        store.update("c", "c", T, condition(ConditionLevel::Fault, "B", "second"));
        assert_eq!(store.active_conditions("c").len(), 2);

        // Same code replaces in place.
        store.update("c", "c", T, condition(ConditionLevel::Fault, "A", "worse"));
        let active = store.active_conditions("c");
        assert_eq!(active.len(), 2);
        let a = active
            .iter()
            .find(|o| matches!(&o.value, Value::Condition(c) if c.native_code == "A"))
            .expect("code A active");
        assert!(matches!(
            &a.value,
            Value::Condition(c) if c.level == ConditionLevel::Fault
        ));
    }

    #[test]
    fn normal_with_empty_code_clears_channel() {
        let mut store = ObservationStore::new(16);
        store.update("c", "c", T, condition(ConditionLevel::Warning, "A", "x"));
        store.update("c", "c", T, condition(ConditionLevel::Fault, "B", "y"));
        store.update("c", "c", T, condition(ConditionLevel::Normal, "", ""));

        let active = store.active_conditions("c");
        assert_eq!(active.len(), 1);
        assert!(matches!(
            &active[0].value,
            Value::Condition(c) if c.level == ConditionLevel::Normal
        ));
    }

    #[test]
    fn discrete_update_records_repeats() {
        let mut store = ObservationStore::new(16);
        let s1 = store.update_discrete("chg", "", T, scalar("EM233"));
        let s2 = store.update_discrete("chg", "", T, scalar("EM233"));
        assert!(s2 > s1);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn current_survives_eviction() {
        let mut store = ObservationStore::new(2);
        store.update("a", "a", T, scalar("1"));
        store.update("b", "b", T, scalar("2"));
        store.update("b", "b", T, scalar("3"));

        // "a" seq 1 evicted, yet current["a"] is retained.
        assert_eq!(store.sequence_info().first, 2);
        let current = store.current("a").expect("current retained after eviction");
        assert_eq!(current.sequence, 1);
    }

    #[test]
    fn sample_window_honors_bounds() {
        let mut store = ObservationStore::new(4);
        for i in 1..=6u64 {
            store.update("a", "a", T, scalar(&format!("{}", i)));
        }
        // Ring now holds sequences 3..=6.
        let info = store.sequence_info();
        assert_eq!(info.first, 3);
        assert_eq!(info.next, 7);

        let window = store.sample_window(None, 4, 2).expect("window in range");
        assert_eq!(
            window.iter().map(|o| o.sequence).collect::<Vec<_>>(),
            vec![4, 5]
        );

        let err = store.sample_window(None, 2, 1).expect_err("before first");
        assert_eq!(err.error_code(), Some("OUT_OF_RANGE"));
        let err = store.sample_window(None, 8, 1).expect_err("past next");
        assert_eq!(err.error_code(), Some("OUT_OF_RANGE"));
        // from == next is an empty, legal window.
        assert!(store.sample_window(None, 7, 1).expect("legal").is_empty());
    }

    #[test]
    fn sample_window_truncates_oversized_count() {
        let mut store = ObservationStore::new(3);
        for i in 1..=3u64 {
            store.update(&format!("d{}", i), "d", T, scalar("v"));
        }
        let window = store.sample_window(None, 1, 10_000).expect("in range");
        assert_eq!(window.len(), 3);
    }

    #[test]
    fn snapshot_at_reconstructs_history() {
        let mut store = ObservationStore::new(8);
        store.update("a", "a", T, scalar("1"));
        store.update("b", "b", T, scalar("x"));
        store.update("a", "a", T, scalar("2"));

        let ids = vec!["a".to_string(), "b".to_string()];
        let at2 = store.snapshot_at(&ids, 2).expect("at=2 in range");
        assert_eq!(at2.len(), 2);
        assert_eq!(at2[0].value, scalar("1"));

        let at3 = store.snapshot_at(&ids, 3).expect("at=3 in range");
        assert_eq!(at3[0].value, scalar("2"));

        assert!(store.snapshot_at(&ids, 9).is_err());
    }

    #[test]
    fn every_windowed_sequence_within_info_bounds() {
        let mut store = ObservationStore::new(8);
        for i in 0..20u64 {
            store.update("a", "a", T, scalar(&format!("{}", i)));
        }
        let info = store.sequence_info();
        let window = store
            .sample_window(None, info.first, 100)
            .expect("full window");
        for obs in window {
            assert!(obs.sequence >= info.first);
            assert!(obs.sequence <= info.next);
        }
    }
}
