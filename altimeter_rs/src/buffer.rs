use std::collections::VecDeque;

use crate::error::Result;
use crate::smoothing::SmoothingFilter;
use crate::types::TimestampedSample;

/// Bounded sliding window of one stream's raw and filtered samples.
///
/// The four sequences stay aligned: entry `i` of each belongs to the same
/// sample. Once at capacity the oldest entry is evicted before a new one is
/// appended.
#[derive(Clone, Debug)]
pub struct StreamBuffer {
    capacity: usize,
    raw_values: VecDeque<f64>,
    raw_times: VecDeque<f64>,
    filtered_values: VecDeque<f64>,
    filtered_times: VecDeque<f64>,
}

impl StreamBuffer {
    /// `capacity` must be at least 1; the engine validates this before
    /// building its buffers.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            raw_values: VecDeque::with_capacity(capacity),
            raw_times: VecDeque::with_capacity(capacity),
            filtered_values: VecDeque::with_capacity(capacity),
            filtered_times: VecDeque::with_capacity(capacity),
        }
    }

    /// Append a raw sample, filter the updated raw history and append the
    /// filtered value. Returns the filtered value.
    pub fn push(&mut self, timestamp: f64, value: f64, filter: &dyn SmoothingFilter) -> f64 {
        if self.raw_values.len() == self.capacity {
            self.raw_values.pop_front();
            self.raw_times.pop_front();
            self.filtered_values.pop_front();
            self.filtered_times.pop_front();
        }
        self.raw_values.push_back(value);
        self.raw_times.push_back(timestamp);

        let filtered = filter.apply(&self.raw_values, &self.filtered_values);
        self.filtered_values.push_back(filtered);
        self.filtered_times.push_back(timestamp);
        filtered
    }

    /// Like `push`, but `accept` sees the filtered value before it is stored.
    /// If `accept` fails the buffer is restored exactly, evicted entry
    /// included, and the error is returned.
    pub fn push_checked<F>(
        &mut self,
        timestamp: f64,
        value: f64,
        filter: &dyn SmoothingFilter,
        accept: F,
    ) -> Result<f64>
    where
        F: FnOnce(f64) -> Result<()>,
    {
        let evicted = if self.raw_values.len() == self.capacity {
            match (
                self.raw_values.pop_front(),
                self.raw_times.pop_front(),
                self.filtered_values.pop_front(),
                self.filtered_times.pop_front(),
            ) {
                (Some(rv), Some(rt), Some(fv), Some(ft)) => Some((rv, rt, fv, ft)),
                _ => None,
            }
        } else {
            None
        };
        self.raw_values.push_back(value);
        self.raw_times.push_back(timestamp);

        let filtered = filter.apply(&self.raw_values, &self.filtered_values);
        if let Err(e) = accept(filtered) {
            self.raw_values.pop_back();
            self.raw_times.pop_back();
            if let Some((rv, rt, fv, ft)) = evicted {
                self.raw_values.push_front(rv);
                self.raw_times.push_front(rt);
                self.filtered_values.push_front(fv);
                self.filtered_times.push_front(ft);
            }
            return Err(e);
        }

        self.filtered_values.push_back(filtered);
        self.filtered_times.push_back(timestamp);
        Ok(filtered)
    }

    pub fn len(&self) -> usize {
        self.raw_values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw_values.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn raw_values(&self) -> &VecDeque<f64> {
        &self.raw_values
    }

    pub fn raw_times(&self) -> &VecDeque<f64> {
        &self.raw_times
    }

    pub fn filtered_values(&self) -> &VecDeque<f64> {
        &self.filtered_values
    }

    pub fn filtered_times(&self) -> &VecDeque<f64> {
        &self.filtered_times
    }

    pub fn latest_filtered(&self) -> Option<TimestampedSample> {
        match (self.filtered_times.back(), self.filtered_values.back()) {
            (Some(&timestamp), Some(&value)) => Some(TimestampedSample { timestamp, value }),
            _ => None,
        }
    }

    pub fn oldest_time(&self) -> Option<f64> {
        self.raw_times.front().copied()
    }

    /// Arithmetic mean of the filtered sequence, `None` while empty.
    pub fn mean_filtered(&self) -> Option<f64> {
        mean(self.filtered_values.iter().copied())
    }
}

pub(crate) fn mean<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = f64>,
{
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}
