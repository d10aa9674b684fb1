//! Counter reconstruction
//!
//! Counters are declared by definition records and fed by set records that
//! only carry `(id, raw value)` pairs. Reconstruction runs three passes:
//! definitions create the series and note which ids hold integers that
//! need byte swapping, sets append time-stamped values, and a final pass
//! orders each series by time and caches its range.

use super::{decode_at, Categories, Document};
use crate::capture::{ByteOrder, CounterType, CounterValue, FrameIndexEntry, Record};
use crate::domain::Timestamp;
use crate::strings::StringPool;
use log::debug;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// One reading of a counter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedValue {
    pub time: Timestamp,
    pub value: CounterValue,
}

/// A counter's definition and its time-ordered series
#[derive(Debug, Clone)]
pub struct Counter {
    id: u32,
    counter_type: CounterType,
    category: Arc<str>,
    name: Arc<str>,
    description: Arc<str>,
    values: Vec<TimedValue>,
    min: f64,
    max: f64,
}

impl Counter {
    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[must_use]
    pub fn counter_type(&self) -> CounterType {
        self.counter_type
    }

    #[must_use]
    pub fn category(&self) -> &str {
        &self.category
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Readings in time order
    #[must_use]
    pub fn values(&self) -> &[TimedValue] {
        &self.values
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Smallest reading as a double; 0 for an empty series
    #[must_use]
    pub fn min(&self) -> f64 {
        self.min
    }

    /// Largest reading as a double; 0 for an empty series
    #[must_use]
    pub fn max(&self) -> f64 {
        self.max
    }

    fn calculate_range(&mut self) {
        // Stable, so equal timestamps keep record order
        self.values.sort_by_key(|v| v.time);

        let mut readings = self.values.iter().map(|v| corrected(v.value));
        let Some(first) = readings.next() else { return };
        let (min, max) = readings.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)));
        self.min = min;
        self.max = max;
    }
}

/// Reading as a double, with out-of-range doubles treated as zero
#[allow(clippy::cast_precision_loss)]
fn corrected(value: CounterValue) -> f64 {
    match value {
        CounterValue::Double(v) if v > i64::MAX as f64 || v.is_nan() => 0.0,
        other => other.as_f64(),
    }
}

/// Rebuild every counter from the definition and set categories
pub(super) fn reconstruct(
    data: &[u8],
    order: ByteOrder,
    frames: &[FrameIndexEntry],
    categories: &Categories,
    strings: &StringPool,
) -> Vec<Counter> {
    let needs_swap = order.needs_swap();
    let mut counters: Vec<Counter> = Vec::new();
    // A redefined id feeds the latest definition
    let mut by_id: HashMap<u32, usize> = HashMap::new();
    let mut swap_ids: HashSet<u32> = HashSet::new();

    for position in categories.counter_definitions.iter() {
        let Some(frame) = decode_at(data, frames, order, position) else { continue };
        let Record::CounterDefine(define) = &frame.record else { continue };

        for def in &define.counters {
            if needs_swap && def.counter_type == CounterType::Int64 {
                swap_ids.insert(def.id);
            }
            by_id.insert(def.id, counters.len());
            counters.push(Counter {
                id: def.id,
                counter_type: def.counter_type,
                category: strings.intern(&def.category),
                name: strings.intern(&def.name),
                description: strings.intern(&def.description),
                values: Vec::new(),
                min: 0.0,
                max: 0.0,
            });
        }
    }

    let mut unknown = 0usize;
    for position in categories.counter_sets.iter() {
        let Some(frame) = decode_at(data, frames, order, position) else { continue };
        let Record::CounterSet(set) = &frame.record else { continue };
        let time = frame.time();

        for &(id, raw) in &set.values {
            let Some(counter) = by_id.get(&id).and_then(|&i| counters.get_mut(i)) else {
                unknown += 1;
                continue;
            };
            let value = CounterValue::from_raw(raw, counter.counter_type, swap_ids.contains(&id));
            counter.values.push(TimedValue { time, value });
        }
    }
    if unknown > 0 {
        debug!("Ignored {unknown} values for undefined counters");
    }

    for counter in &mut counters {
        counter.calculate_range();
    }
    counters
}

impl Document {
    /// Counters in definition order
    #[must_use]
    pub fn counters(&self) -> &[Counter] {
        &self.counters
    }

    /// First counter with the given category and name
    #[must_use]
    pub fn find_counter(&self, category: &str, name: &str) -> Option<&Counter> {
        self.counters.iter().find(|c| c.category() == category && c.name() == name)
    }
}
