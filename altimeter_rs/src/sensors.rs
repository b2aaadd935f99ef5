use crossbeam::channel::{self, Receiver, Sender, TryRecvError};

use crate::types::{RawReading, SensorPayload, TimestampedReading};

/// Non-blocking access to one sensor's queued readings.
pub trait SensorSource {
    /// Returns the next queued reading, or `None` when nothing is queued.
    /// Placeholder (absent) entries are consumed and also yield `None`.
    fn poll(&mut self) -> Option<TimestampedReading>;

    fn name(&self) -> &str;
}

/// Producer half of a sensor queue. Cheap to clone and `Send`, so a capture
/// thread or a replay loader can fill the queue while the engine polls.
#[derive(Clone, Debug)]
pub struct SensorFeed {
    name: String,
    tx: Sender<RawReading>,
}

impl SensorFeed {
    /// Queue a reading. Returns `false` once the consuming source is gone.
    pub fn push(&self, reading: RawReading) -> bool {
        self.tx.send(reading).is_ok()
    }

    pub fn push_value(&self, timestamp: f64, payload: SensorPayload) -> bool {
        self.push(RawReading::present(timestamp, payload))
    }

    pub fn push_absent(&self, timestamp: f64) -> bool {
        self.push(RawReading::absent(timestamp))
    }

    pub fn extend<I>(&self, readings: I) -> usize
    where
        I: IntoIterator<Item = RawReading>,
    {
        readings.into_iter().take_while(|r| self.push(r.clone())).count()
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Consumer half of a sensor queue.
#[derive(Debug)]
pub struct ChannelSource {
    name: String,
    rx: Receiver<RawReading>,
    consumed: u64,
    absent: u64,
}

impl ChannelSource {
    /// Number of queued entries, placeholders included.
    pub fn queued(&self) -> usize {
        self.rx.len()
    }

    /// Entries taken off the queue so far, placeholders included.
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    pub fn absent_count(&self) -> u64 {
        self.absent
    }
}

impl SensorSource for ChannelSource {
    fn poll(&mut self) -> Option<TimestampedReading> {
        match self.rx.try_recv() {
            Ok(RawReading { timestamp, payload }) => {
                self.consumed += 1;
                match payload {
                    Some(payload) => Some(TimestampedReading { timestamp, payload }),
                    None => {
                        self.absent += 1;
                        None
                    }
                }
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Create a connected (feed, source) pair backed by an unbounded queue.
pub fn sensor_channel(name: &str) -> (SensorFeed, ChannelSource) {
    let (tx, rx) = channel::unbounded();
    (
        SensorFeed { name: name.to_string(), tx },
        ChannelSource { name: name.to_string(), rx, consumed: 0, absent: 0 },
    )
}

/// Convenience: a source pre-filled with `readings`.
pub fn replay_source<I>(name: &str, readings: I) -> ChannelSource
where
    I: IntoIterator<Item = RawReading>,
{
    let (feed, source) = sensor_channel(name);
    feed.extend(readings);
    source
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_source_yields_nothing() {
        let (_feed, mut source) = sensor_channel("pressure");
        assert!(source.poll().is_none());
    }

    #[test]
    fn test_absent_reading_is_consumed_as_no_data() {
        let (feed, mut source) = sensor_channel("pressure");
        feed.push_value(1.0, SensorPayload::Scalar(10.0));
        feed.push_absent(2.0);
        feed.push_value(3.0, SensorPayload::Scalar(30.0));
        assert_eq!(source.queued(), 3);

        let first = source.poll().unwrap();
        assert_eq!(first.timestamp, 1.0);
        assert_eq!(first.payload, SensorPayload::Scalar(10.0));

        assert!(source.poll().is_none());

        let third = source.poll().unwrap();
        assert_eq!(third.timestamp, 3.0);
        assert_eq!(third.payload, SensorPayload::Scalar(30.0));

        assert_eq!(source.queued(), 0);
        assert!(source.poll().is_none());
        assert_eq!(source.consumed(), 3);
        assert_eq!(source.absent_count(), 1);
    }

    #[test]
    fn test_gps_readings_keep_fifo_order() {
        let readings = vec![
            RawReading::present(1.0, SensorPayload::Vector(vec![1.0, 2.0, 3.0])),
            RawReading::present(2.0, SensorPayload::Vector(vec![3.0, 5.0, 6.0])),
            RawReading::absent(3.0),
        ];
        let mut source = replay_source("gps", readings);

        assert_eq!(source.poll().unwrap().timestamp, 1.0);
        let second = source.poll().unwrap();
        assert_eq!(second.payload, SensorPayload::Vector(vec![3.0, 5.0, 6.0]));
        assert!(source.poll().is_none());
        assert!(source.poll().is_none());
    }

    #[test]
    fn test_feed_from_another_thread() {
        let (feed, mut source) = sensor_channel("pressure");
        let handle = std::thread::spawn(move || {
            for i in 0..10 {
                feed.push_value(i as f64, SensorPayload::Scalar(i as f64));
            }
        });
        handle.join().unwrap();

        let times: Vec<f64> = std::iter::from_fn(|| source.poll()).map(|r| r.timestamp).collect();
        assert_eq!(times, (0..10).map(|i| i as f64).collect::<Vec<_>>());
    }
}
