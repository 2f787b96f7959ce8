//! Bucketed sliding-window counter of call outcomes.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

/// Success and failure totals over the live part of a window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventCount {
    pub success: u64,
    pub failure: u64,
}

impl EventCount {
    pub fn total(&self) -> u64 {
        self.success + self.failure
    }

    pub fn failure_rate(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => self.failure as f64 / total as f64,
        }
    }
}

#[derive(Debug)]
struct Bucket {
    started_at: Instant,
    count: EventCount,
}

/// Counts outcomes in buckets of `bucket_width`; buckets older than `window`
/// are dropped lazily on every access.
#[derive(Debug)]
pub struct SlidingWindow {
    window: Duration,
    bucket_width: Duration,
    buckets: VecDeque<Bucket>,
}

impl SlidingWindow {
    pub fn new(window: Duration, bucket_width: Duration) -> Self {
        Self {
            window,
            bucket_width: bucket_width.min(window),
            buckets: VecDeque::new(),
        }
    }

    pub fn record(&mut self, now: Instant, failed: bool) {
        self.expire(now);

        let needs_bucket = self
            .buckets
            .back()
            .map_or(true, |b| now.duration_since(b.started_at) >= self.bucket_width);
        if needs_bucket {
            self.buckets.push_back(Bucket {
                started_at: now,
                count: EventCount::default(),
            });
        }

        if let Some(bucket) = self.buckets.back_mut() {
            if failed {
                bucket.count.failure += 1;
            } else {
                bucket.count.success += 1;
            }
        }
    }

    pub fn count(&mut self, now: Instant) -> EventCount {
        self.expire(now);
        self.buckets
            .iter()
            .fold(EventCount::default(), |acc, b| EventCount {
                success: acc.success + b.count.success,
                failure: acc.failure + b.count.failure,
            })
    }

    pub fn reset(&mut self) {
        self.buckets.clear();
    }

    fn expire(&mut self, now: Instant) {
        while let Some(front) = self.buckets.front() {
            if now.duration_since(front.started_at) >= self.window {
                self.buckets.pop_front();
            } else {
                break;
            }
        }
    }
}
