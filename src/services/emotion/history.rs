//! Bounded stimulus history buffer.

use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;

use crate::domain::models::StimulusRecord;

/// In-memory FIFO of recent stimuli, bounded by count.
#[derive(Debug, Default)]
pub struct StimulusBuffer {
    records: VecDeque<StimulusRecord>,
    capacity: usize,
}

impl StimulusBuffer {
    pub const DEFAULT_CAPACITY: usize = 50;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { records: VecDeque::with_capacity(capacity), capacity }
    }

    pub fn add(&mut self, record: StimulusRecord) {
        if self.records.len() >= self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    /// Stimuli newer than the window.
    pub fn recent(&self, window: Duration) -> Vec<StimulusRecord> {
        let cutoff = Utc::now() - window;
        self.records.iter().filter(|r| r.timestamp > cutoff).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Seed the buffer from persisted records (oldest first).
    pub fn hydrate(&mut self, records: Vec<StimulusRecord>) {
        for record in records {
            self.add(record);
        }
    }
}

pub fn make_record(
    stimulus_type: impl Into<String>,
    valence: f64,
    intensity: f64,
    context: serde_json::Value,
    timestamp: DateTime<Utc>,
) -> StimulusRecord {
    StimulusRecord {
        stimulus_type: stimulus_type.into(),
        valence: valence.clamp(-10.0, 10.0),
        intensity: intensity.clamp(0.0, 100.0),
        timestamp,
        context,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(minutes_ago: i64) -> StimulusRecord {
        make_record("message", 2.0, 30.0, serde_json::Value::Null, Utc::now() - Duration::minutes(minutes_ago))
    }

    #[test]
    fn buffer_is_bounded_fifo() {
        let mut buffer = StimulusBuffer::with_capacity(3);
        for i in 0..5 {
            let mut r = record(0);
            r.intensity = f64::from(i);
            buffer.add(r);
        }
        assert_eq!(buffer.len(), 3);
        // Oldest entries were evicted.
        assert!((buffer.records[0].intensity - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn recent_filters_by_window() {
        let mut buffer = StimulusBuffer::new();
        buffer.add(record(60));
        buffer.add(record(2));
        let recent = buffer.recent(Duration::minutes(10));
        assert_eq!(recent.len(), 1);
    }

    #[test]
    fn make_record_clamps() {
        let r = make_record("x", 25.0, 150.0, serde_json::Value::Null, Utc::now());
        assert!((r.valence - 10.0).abs() < f64::EPSILON);
        assert!((r.intensity - 100.0).abs() < f64::EPSILON);
    }
}
