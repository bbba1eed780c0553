//! Stale-aware gauge registry.
//!
//! A [`StaleGauge`] holds the current value of every label combination seen
//! for one metric together with the instant it was last observed. Series that
//! are not refreshed within the metric's time-to-live are removed by
//! [`StaleGauge::sweep`], so a device that vanishes from the tool output also
//! vanishes from the exposed metrics instead of being exported forever.
//!
//! The series table sits behind a reader/writer lock. The refresh loop takes
//! the write side for `set` and `sweep`, while the HTTP endpoint takes the
//! read side to render a snapshot at any time.

pub mod exposition;

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors raised by the gauge registry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("metric '{metric}' expects {expected} label values, got {actual}")]
    InvalidLabelCount {
        metric: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// Immutable descriptor of one named gauge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricDefinition<const N: usize> {
    pub name: &'static str,
    pub help: &'static str,
    pub label_names: [&'static str; N],
    /// Maximum time a series may go unrefreshed before it is swept.
    pub ttl: Duration,
}

/// The label values of one series, positionally matched to
/// [`MetricDefinition::label_names`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LabelKey<const N: usize>([String; N]);

impl<const N: usize> LabelKey<N> {
    pub fn new(values: [String; N]) -> Self {
        Self(values)
    }

    /// Builds a key from a dynamically sized slice, returning `None` when the
    /// slice does not hold exactly `N` values.
    ///
    /// The scrape pipeline builds fixed-size arrays and never needs this; it
    /// is the entry point for label values whose count is only known at
    /// runtime.
    pub fn from_slice(values: &[&str]) -> Option<Self> {
        if values.len() != N {
            return None;
        }
        Some(Self(std::array::from_fn(|i| values[i].to_string())))
    }

    pub fn values(&self) -> &[String; N] {
        &self.0
    }
}

impl<const N: usize> From<[&str; N]> for LabelKey<N> {
    fn from(values: [&str; N]) -> Self {
        Self(values.map(str::to_string))
    }
}

/// The stored state of one series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesEntry {
    pub value: f64,
    pub last_observed: Instant,
}

/// A gauge whose series expire when they stop being observed.
#[derive(Debug)]
pub struct StaleGauge<const N: usize> {
    definition: MetricDefinition<N>,
    series: RwLock<BTreeMap<LabelKey<N>, SeriesEntry>>,
}

impl<const N: usize> StaleGauge<N> {
    pub fn new(definition: MetricDefinition<N>) -> Self {
        Self {
            definition,
            series: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn definition(&self) -> &MetricDefinition<N> {
        &self.definition
    }

    /// Inserts or overwrites the series for `labels`, stamping it with
    /// `observed_at`.
    pub fn set(&self, labels: LabelKey<N>, value: f64, observed_at: Instant) {
        let mut series = self.series.write().unwrap_or_else(PoisonError::into_inner);
        series.insert(
            labels,
            SeriesEntry {
                value,
                last_observed: observed_at,
            },
        );
    }

    /// Like [`StaleGauge::set`], for callers holding label values as a slice.
    ///
    /// This is the dynamic-input entry point: a wrong number of values is
    /// reported as [`RegistryError::InvalidLabelCount`] instead of being
    /// rejected by the type system as it is for [`StaleGauge::set`].
    pub fn try_set(
        &self,
        labels: &[&str],
        value: f64,
        observed_at: Instant,
    ) -> Result<(), RegistryError> {
        let key = LabelKey::from_slice(labels).ok_or(RegistryError::InvalidLabelCount {
            metric: self.definition.name,
            expected: N,
            actual: labels.len(),
        })?;
        self.set(key, value, observed_at);
        Ok(())
    }

    /// Removes every series last observed more than `ttl` before `now` and
    /// returns how many were removed. A series exactly `ttl` old is kept.
    pub fn sweep(&self, now: Instant) -> usize {
        let ttl = self.definition.ttl;
        let mut series = self.series.write().unwrap_or_else(PoisonError::into_inner);
        let before = series.len();
        series.retain(|_, entry| now.saturating_duration_since(entry.last_observed) <= ttl);
        before - series.len()
    }

    /// Returns the current series in label order.
    pub fn snapshot(&self) -> Vec<(LabelKey<N>, f64)> {
        let series = self.series.read().unwrap_or_else(PoisonError::into_inner);
        series
            .iter()
            .map(|(labels, entry)| (labels.clone(), entry.value))
            .collect()
    }

    /// Like [`StaleGauge::snapshot`], but with the instant each series was
    /// last observed.
    pub fn entries(&self) -> Vec<(LabelKey<N>, SeriesEntry)> {
        let series = self.series.read().unwrap_or_else(PoisonError::into_inner);
        series
            .iter()
            .map(|(labels, entry)| (labels.clone(), *entry))
            .collect()
    }

    /// Returns the value currently stored for `labels`, if any.
    pub fn get(&self, labels: &LabelKey<N>) -> Option<f64> {
        let series = self.series.read().unwrap_or_else(PoisonError::into_inner);
        series.get(labels).map(|entry| entry.value)
    }

    pub fn len(&self) -> usize {
        self.series
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Object-safe view over a [`StaleGauge`] of any label arity, used by the
/// refresh loop to sweep and by the HTTP endpoint to render.
pub trait MetricFamily: Send + Sync {
    fn name(&self) -> &'static str;

    fn sweep(&self, now: Instant) -> usize;

    /// Appends the family in Prometheus text exposition format.
    fn encode(&self, out: &mut String);
}

impl<const N: usize> MetricFamily for StaleGauge<N> {
    fn name(&self) -> &'static str {
        self.definition.name
    }

    fn sweep(&self, now: Instant) -> usize {
        StaleGauge::sweep(self, now)
    }

    fn encode(&self, out: &mut String) {
        let definition = &self.definition;
        exposition::write_header(out, definition.name, definition.help, "gauge");
        for (labels, value) in self.snapshot() {
            exposition::write_sample(
                out,
                definition.name,
                &definition.label_names,
                labels.values(),
                value,
            );
        }
    }
}
