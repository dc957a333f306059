// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Client-side aggregation of raw values into per-minute distributions.
//!
//! Values recorded during a minute are summarized by a merging t-digest. Once the minute
//! is over its bin becomes reportable: [`WavefrontHistogram::flush_distributions`] hands
//! out the centroids of every completed minute, ready for
//! [`crate::WavefrontSender::send_distribution`].

use std::collections::{BTreeSet, VecDeque};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::entities::{Centroid, Distribution, HistogramGranularity, Tags};

/// Compression of each minute's digest. Higher keeps more centroids.
pub const ACCURACY: f64 = 100.0;

/// Completed minutes kept while waiting to be flushed; older ones are discarded first.
pub const MAX_BINS: usize = 10;

const MINUTE_MILLIS: i64 = 60_000;

/// Unmerged values buffered before a digest compresses.
const BUFFER_SIZE: usize = 5 * ACCURACY as usize;

#[derive(Debug, Clone, Copy, PartialEq)]
struct WeightedMean {
    mean: f64,
    weight: f64,
}

/// Merging t-digest with exact count, sum, min and max.
#[derive(Debug, Clone)]
struct Digest {
    compression: f64,
    merged: Vec<WeightedMean>,
    unmerged: Vec<WeightedMean>,
    count: f64,
    sum: f64,
    min: f64,
    max: f64,
}

impl Digest {
    fn new(compression: f64) -> Self {
        Digest {
            compression,
            merged: Vec::new(),
            unmerged: Vec::new(),
            count: 0.0,
            sum: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    fn is_empty(&self) -> bool {
        self.count == 0.0
    }

    fn add(&mut self, mean: f64, weight: f64) {
        self.count += weight;
        self.sum += mean * weight;
        self.min = self.min.min(mean);
        self.max = self.max.max(mean);
        self.unmerged.push(WeightedMean { mean, weight });
        if self.unmerged.len() >= BUFFER_SIZE {
            self.compress();
        }
    }

    fn merge(&mut self, other: &Digest) {
        if other.is_empty() {
            return;
        }
        self.count += other.count;
        self.sum += other.sum;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self.unmerged.extend(other.merged.iter().chain(&other.unmerged));
        self.compress();
    }

    /// Folds buffered values into the centroid list. Neighbours merge when they share a
    /// mean or while the combined weight stays under `4 * count * q * (1 - q) / compression`.
    fn compress(&mut self) {
        if self.unmerged.is_empty() {
            return;
        }
        let mut all = std::mem::take(&mut self.merged);
        all.append(&mut self.unmerged);
        all.sort_by(|a, b| a.mean.total_cmp(&b.mean));

        let total = self.count;
        let mut merged = Vec::with_capacity(all.len());
        let mut weight_before = 0.0;
        let mut all = all.into_iter();
        let Some(mut current) = all.next() else {
            return;
        };
        for next in all {
            let proposed = current.weight + next.weight;
            let q_left = weight_before / total;
            let q_right = (weight_before + proposed) / total;
            let limit = 4.0 * total * (q_left * (1.0 - q_left)).min(q_right * (1.0 - q_right))
                / self.compression;
            if next.mean == current.mean || proposed <= limit {
                current.mean += (next.mean - current.mean) * next.weight / proposed;
                current.weight = proposed;
            } else {
                weight_before += current.weight;
                merged.push(current);
                current = next;
            }
        }
        merged.push(current);
        self.merged = merged;
    }

    fn centroids(&mut self) -> &[WeightedMean] {
        self.compress();
        &self.merged
    }

    /// Interpolates between centroid centres, anchored at the exact min and max.
    fn quantile(&mut self, q: f64) -> Option<f64> {
        if self.is_empty() {
            return None;
        }
        if q <= 0.0 {
            return Some(self.min);
        }
        if q >= 1.0 {
            return Some(self.max);
        }
        let (total, min, max) = (self.count, self.min, self.max);
        let target = q * total;
        let centroids = self.centroids();

        let mut previous: Option<(f64, f64)> = None;
        let mut cumulative = 0.0;
        for centroid in centroids {
            let center = cumulative + centroid.weight / 2.0;
            if target < center {
                let (left_center, left_mean) = previous.unwrap_or((0.0, min));
                let fraction = (target - left_center) / (center - left_center);
                return Some(left_mean + fraction * (centroid.mean - left_mean));
            }
            previous = Some((center, centroid.mean));
            cumulative += centroid.weight;
        }
        let (last_center, last_mean) = previous.unwrap_or((0.0, min));
        if total <= last_center {
            return Some(max);
        }
        let fraction = (target - last_center) / (total - last_center);
        Some(last_mean + fraction * (max - last_mean))
    }
}

/// Statistics over the completed minutes of a histogram.
#[derive(Debug, Clone)]
pub struct Snapshot {
    digest: Digest,
}

impl Snapshot {
    pub fn count(&self) -> u64 {
        self.digest.count as u64
    }

    pub fn sum(&self) -> f64 {
        self.digest.sum
    }

    pub fn min(&self) -> Option<f64> {
        (!self.digest.is_empty()).then_some(self.digest.min)
    }

    pub fn max(&self) -> Option<f64> {
        (!self.digest.is_empty()).then_some(self.digest.max)
    }

    pub fn mean(&self) -> Option<f64> {
        (!self.digest.is_empty()).then(|| self.digest.sum / self.digest.count)
    }

    /// Population standard deviation, approximated from the centroids. Zero when empty.
    pub fn std_dev(&self) -> f64 {
        let Some(mean) = self.mean() else {
            return 0.0;
        };
        let mut digest = self.digest.clone();
        let variance_sum: f64 = digest
            .centroids()
            .iter()
            .map(|c| c.weight * (c.mean - mean).powi(2))
            .sum();
        (variance_sum / self.digest.count).sqrt()
    }

    /// Estimated value at `quantile`, between 0 and 1.
    pub fn value(&self, quantile: f64) -> Option<f64> {
        self.digest.clone().quantile(quantile)
    }
}

/// Centroids of one completed minute.
#[derive(Debug, Clone, PartialEq)]
pub struct MinuteDistribution {
    /// Start of the minute, in milliseconds since the epoch.
    pub timestamp_millis: i64,
    pub centroids: Vec<Centroid>,
}

impl MinuteDistribution {
    /// Builds a distribution point stamped with the start of the minute.
    pub fn into_distribution(
        self,
        name: &str,
        granularities: BTreeSet<HistogramGranularity>,
        source: Option<String>,
        tags: Tags,
    ) -> Distribution {
        Distribution {
            name: name.to_string(),
            centroids: self.centroids,
            granularities,
            timestamp: Some(self.timestamp_millis / 1000),
            source,
            tags,
        }
    }
}

#[derive(Debug)]
struct MinuteBin {
    minute_millis: i64,
    digest: Digest,
}

impl MinuteBin {
    fn new(minute_millis: i64) -> Self {
        MinuteBin {
            minute_millis,
            digest: Digest::new(ACCURACY),
        }
    }

    fn into_distribution(mut self) -> MinuteDistribution {
        let centroids = self
            .digest
            .centroids()
            .iter()
            .map(|c| Centroid::new(c.mean, c.weight.round() as u32))
            .collect();
        MinuteDistribution {
            timestamp_millis: self.minute_millis,
            centroids,
        }
    }
}

#[derive(Debug)]
struct Bins {
    current: MinuteBin,
    completed: VecDeque<MinuteBin>,
}

impl Bins {
    /// Moves the current bin to the completed ones once its minute is over.
    fn roll(&mut self, minute_millis: i64) {
        if self.current.minute_millis == minute_millis {
            return;
        }
        let finished = std::mem::replace(&mut self.current, MinuteBin::new(minute_millis));
        if finished.digest.is_empty() {
            return;
        }
        if self.completed.len() >= MAX_BINS {
            if let Some(oldest) = self.completed.pop_front() {
                debug!(
                    "Discarding unflushed histogram minute {}",
                    oldest.minute_millis
                );
            }
        }
        self.completed.push_back(finished);
    }
}

type Clock = Box<dyn Fn() -> i64 + Send + Sync>;

fn system_clock_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or_default()
}

/// A histogram of raw values, binned per minute and safe to update from any thread.
///
/// Statistics and flushes only cover completed minutes, since the current one may still
/// be receiving values.
pub struct WavefrontHistogram {
    clock: Clock,
    bins: Mutex<Bins>,
}

impl Default for WavefrontHistogram {
    fn default() -> Self {
        Self::new()
    }
}

impl WavefrontHistogram {
    pub fn new() -> Self {
        Self::with_clock(system_clock_millis)
    }

    /// Uses `clock_millis` as the source of milliseconds since the epoch.
    pub fn with_clock(clock_millis: impl Fn() -> i64 + Send + Sync + 'static) -> Self {
        let minute = minute_of(clock_millis());
        WavefrontHistogram {
            clock: Box::new(clock_millis),
            bins: Mutex::new(Bins {
                current: MinuteBin::new(minute),
                completed: VecDeque::new(),
            }),
        }
    }

    fn with_bins<T>(&self, f: impl FnOnce(&mut Bins) -> T) -> T {
        let minute = minute_of((self.clock)());
        #[allow(clippy::expect_used)]
        let mut bins = self.bins.lock().expect("lock poisoned");
        bins.roll(minute);
        f(&mut bins)
    }

    /// Records one value. Non-finite values are ignored.
    pub fn update(&self, value: f64) {
        if !value.is_finite() {
            debug!("Ignoring non-finite histogram value {}", value);
            return;
        }
        self.with_bins(|bins| bins.current.digest.add(value, 1.0));
    }

    /// Records pre-aggregated centroids, pairing `means` and `counts` up to the shorter.
    pub fn bulk_update(&self, means: &[f64], counts: &[u32]) {
        self.with_bins(|bins| {
            for (&mean, &count) in means.iter().zip(counts) {
                if mean.is_finite() && count > 0 {
                    bins.current.digest.add(mean, f64::from(count));
                }
            }
        });
    }

    /// Removes and returns every completed minute, oldest first.
    pub fn flush_distributions(&self) -> Vec<MinuteDistribution> {
        self.with_bins(|bins| {
            bins.completed
                .drain(..)
                .map(MinuteBin::into_distribution)
                .collect()
        })
    }

    /// Statistics over the completed minutes not yet flushed.
    pub fn snapshot(&self) -> Snapshot {
        self.with_bins(|bins| {
            let mut digest = Digest::new(ACCURACY);
            for bin in &bins.completed {
                digest.merge(&bin.digest);
            }
            Snapshot { digest }
        })
    }

    pub fn count(&self) -> u64 {
        self.snapshot().count()
    }

    pub fn sum(&self) -> f64 {
        self.snapshot().sum()
    }

    pub fn min(&self) -> Option<f64> {
        self.snapshot().min()
    }

    pub fn max(&self) -> Option<f64> {
        self.snapshot().max()
    }

    pub fn mean(&self) -> Option<f64> {
        self.snapshot().mean()
    }

    pub fn std_dev(&self) -> f64 {
        self.snapshot().std_dev()
    }
}

fn minute_of(millis: i64) -> i64 {
    millis.div_euclid(MINUTE_MILLIS) * MINUTE_MILLIS
}
