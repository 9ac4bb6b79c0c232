use std::{collections::HashMap, fmt::Display, slice};

use serde_json::Value;
use tracing::debug;

use crate::fields::{self, Record};

/// An ordered label -> value mapping. Labels are unique and keep the order they were first seen in,
/// which is what ranking falls back on for ties.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tally {
    entries: Vec<(String, f64)>,
    index: HashMap<String, usize>,
}

impl<'a> IntoIterator for &'a Tally {
    type Item = &'a (String, f64);
    type IntoIter = slice::Iter<'a, (String, f64)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl IntoIterator for Tally {
    type Item = (String, f64);
    type IntoIter = std::vec::IntoIter<Self::Item>;
    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for Tally {
    fn from_iter<T: IntoIterator<Item = (S, f64)>>(iter: T) -> Self {
        let mut tally = Tally::default();
        for (label, value) in iter {
            tally.add(label, value);
        }
        tally
    }
}

impl Display for Tally {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (label, value) in &self.entries {
            writeln!(f, "\t{}: {}", label, value)?;
        }
        Ok(())
    }
}

impl Tally {
    /// A tally pre-seeded with zeroed labels, in the given order.
    pub fn with_labels<S: AsRef<str>>(labels: &[S]) -> Self {
        labels.iter().map(|l| (l.as_ref(), 0.0)).collect()
    }

    /// add `value` to the entry for `label`, creating it at the end if needed
    pub fn add(&mut self, label: impl Into<String>, value: f64) {
        let label = label.into();
        match self.index.get(&label) {
            Some(&idx) => self.entries[idx].1 += value,
            None => {
                self.index.insert(label.clone(), self.entries.len());
                self.entries.push((label, value));
            }
        }
    }

    pub fn iter(&self) -> slice::Iter<'_, (String, f64)> {
        self.entries.iter()
    }

    pub fn get(&self, label: &str) -> Option<f64> {
        self.index.get(label).map(|&idx| self.entries[idx].1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.entries.iter().map(|(_, v)| v).sum()
    }

    #[cfg(test)]
    pub fn labels(&self) -> Vec<String> {
        self.entries.iter().map(|(l, _)| l.clone()).collect()
    }

    #[cfg(test)]
    pub fn values(&self) -> Vec<f64> {
        self.entries.iter().map(|(_, v)| *v).collect()
    }

    fn map_values(mut self, f: impl Fn(&str, f64) -> f64) -> Self {
        for (label, value) in &mut self.entries {
            *value = f(label, *value);
        }
        self
    }
}

/// Where the number being averaged comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueSource {
    /// a numeric field, in dot-notation
    Field(String),
    /// hours elapsed between two timestamp fields
    ElapsedHours { start: String, end: String },
    /// a label looked up in a score table. Labels not in the table score 0,
    /// records without a label score `missing` or don't contribute
    Score { field: String, scores: Vec<(String, f64)>, missing: Option<f64> },
}

impl ValueSource {
    pub fn field(name: impl Into<String>) -> Self {
        ValueSource::Field(name.into())
    }

    pub fn elapsed_hours(start: impl Into<String>, end: impl Into<String>) -> Self {
        ValueSource::ElapsedHours { start: start.into(), end: end.into() }
    }

    pub fn score(field: impl Into<String>, scores: &[(&str, f64)], missing: Option<f64>) -> Self {
        ValueSource::Score {
            field: field.into(),
            scores: scores.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            missing,
        }
    }

    /// the value for one record, or None if the record can't contribute
    fn resolve(&self, record: &Record) -> Option<f64> {
        match self {
            ValueSource::Field(name) => fields::field_number(record, name),
            ValueSource::ElapsedHours { start, end } => {
                let start = fields::field_timestamp(record, start)?;
                let end = fields::field_timestamp(record, end)?;
                Some(fields::elapsed_hours(start, end))
            }
            ValueSource::Score { field, scores, missing } => match fields::field_label(record, field) {
                Some(label) => Some(scores.iter().find(|(k, _)| *k == label).map_or(0.0, |(_, v)| *v)),
                None => *missing,
            },
        }
    }
}

/// How each group is reduced to a single number.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregateMode {
    /// number of records in the group
    Count,
    /// sum of a numeric field
    Sum(String),
    /// mean of the value source over the records that have one
    Average(ValueSource),
}

/// Describes one aggregation: which field to group by, what to call records without one,
/// and how to reduce each group.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    pub key_field: String,
    pub fallback: Option<String>,
    pub mode: AggregateMode,
    /// zero values don't contribute, as if they were missing. Always on for sums.
    pub skip_zero: bool,
}

impl Aggregation {
    fn new(key_field: impl Into<String>, mode: AggregateMode) -> Self {
        let skip_zero = matches!(mode, AggregateMode::Sum(_));
        Aggregation { key_field: key_field.into(), fallback: None, mode, skip_zero }
    }

    pub fn count(key_field: impl Into<String>) -> Self {
        Aggregation::new(key_field, AggregateMode::Count)
    }

    pub fn sum(key_field: impl Into<String>, value_field: impl Into<String>) -> Self {
        Aggregation::new(key_field, AggregateMode::Sum(value_field.into()))
    }

    pub fn average(key_field: impl Into<String>, source: ValueSource) -> Self {
        Aggregation::new(key_field, AggregateMode::Average(source))
    }

    /// Treat zero values as missing
    pub fn skip_zero(mut self) -> Self {
        self.skip_zero = true;
        self
    }

    /// Label for records with no group key. Averages never use it.
    pub fn with_fallback(mut self, label: impl Into<String>) -> Self {
        self.fallback = Some(label.into());
        self
    }

    pub fn is_average(&self) -> bool {
        matches!(self.mode, AggregateMode::Average(_))
    }

    fn group_key(&self, record: &Record) -> Option<String> {
        let key = fields::field_label(record, &self.key_field);
        match self.mode {
            AggregateMode::Average(_) => key,
            _ => key.or_else(|| self.fallback.clone()),
        }
    }
}

/// Group `records` and reduce each group as described by `aggregation`.
///
/// A group only exists once a record contributes to it, so averages never divide by zero.
pub fn aggregate(records: &[Record], aggregation: &Aggregation) -> Tally {
    let mut sums = Tally::default();
    let mut members: HashMap<String, usize> = HashMap::new();
    let mut skipped = 0usize;

    for record in records {
        let Some(key) = aggregation.group_key(record) else {
            skipped += 1;
            continue;
        };

        let value = match &aggregation.mode {
            AggregateMode::Count => Some(1.0),
            AggregateMode::Sum(field) => fields::field_number(record, field),
            AggregateMode::Average(source) => source.resolve(record),
        }
        .filter(|v| !(aggregation.skip_zero && *v == 0.0));

        match value {
            Some(val) => {
                *members.entry(key.clone()).or_default() += 1;
                sums.add(key, val);
            }
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        debug!("{} of {} records did not contribute to {}", skipped, records.len(), aggregation.key_field);
    }

    if aggregation.is_average() {
        sums.map_values(|label, sum| sum / members.get(label).copied().unwrap_or(1) as f64)
    } else {
        sums
    }
}

/// A fixed, ordered set of buckets keyed by a raw field value.
#[derive(Debug, Clone, PartialEq)]
pub struct Buckets {
    /// (raw field value, display label)
    entries: Vec<(String, String)>,
}

impl<R: Into<String>, L: Into<String>> FromIterator<(R, L)> for Buckets {
    fn from_iter<T: IntoIterator<Item = (R, L)>>(iter: T) -> Self {
        Buckets { entries: iter.into_iter().map(|(r, l)| (r.into(), l.into())).collect() }
    }
}

impl Buckets {
    /// Customer rating scale, worst to excellent.
    pub fn ratings() -> Self {
        [("worst", "1"), ("bad", "2"), ("medium", "3"), ("good", "4"), ("excellent", "5")]
            .into_iter()
            .collect()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.entries.iter().map(|(_, l)| l.as_str()).collect()
    }

    /// the raw field value behind the bucket at `idx`
    pub fn raw_value(&self, idx: usize) -> Option<&str> {
        self.entries.get(idx).map(|(r, _)| r.as_str())
    }

    fn label_for(&self, raw: &str) -> Option<&str> {
        self.entries.iter().find(|(r, _)| r == raw).map(|(_, l)| l.as_str())
    }
}

/// Count records into `buckets` by the raw value of `field`. Every bucket is present,
/// in declared order, even at zero. Values that match no bucket are ignored.
pub fn count_buckets(records: &[Record], field: &str, buckets: &Buckets) -> Tally {
    let mut tally = Tally::with_labels(&buckets.labels());
    for record in records {
        let raw = match fields::get_root_elem(record, field) {
            Some(Value::String(s)) => s.as_str(),
            _ => continue,
        };
        if let Some(label) = buckets.label_for(raw) {
            tally.add(label, 1.0);
        }
    }
    tally
}
