// A polled measurement paired with the time it was taken.

use std::time::Instant;

/// A sensor value with the monotonic timestamp of the sample.
///
/// Immutable after construction. Unit conversions go through [`map`], which
/// carries the original timestamp so latency compensation downstream still
/// refers to the actual sample time.
///
/// [`map`]: TimestampedSignal::map
#[derive(Debug, Clone, Copy)]
pub struct TimestampedSignal<T> {
    value: T,
    timestamp: Instant,
}

impl<T> TimestampedSignal<T> {
    /// Wrap a value sampled just now.
    pub fn now(value: T) -> Self {
        Self {
            value,
            timestamp: Instant::now(),
        }
    }

    pub fn new(value: T, timestamp: Instant) -> Self {
        Self { value, timestamp }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    /// Convert the value while keeping the sample timestamp.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> TimestampedSignal<U> {
        TimestampedSignal {
            value: f(self.value),
            timestamp: self.timestamp,
        }
    }

    pub fn into_value(self) -> T {
        self.value
    }
}

impl<T: Copy> TimestampedSignal<T> {
    pub fn get(&self) -> T {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_keeps_timestamp() {
        let signal = TimestampedSignal::now(2048.0_f64);
        let stamp = signal.timestamp();
        let meters = signal.map(|nu| nu / 2048.0);
        assert_eq!(meters.get(), 1.0);
        assert_eq!(meters.timestamp(), stamp);
    }
}
