// Copyright (c) 2023 The TQUIC Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A windowed min RTT estimator.
//!
//! The filter keeps the smallest RTT sample seen within a wall-clock window.
//! When the window elapses without a smaller sample, the next sample is
//! accepted unconditionally, so a minimum that became unreachable after a
//! route change does not persist.

use std::time::Duration;
use std::time::Instant;

#[derive(Debug)]
pub struct MinRttFilter {
    /// BBR.min_rtt: The smallest RTT in the window, or None if no RTT was
    /// measured yet.
    min_rtt: Option<Duration>,

    /// BBR.min_rtt_stamp: The wall clock time at which the current min_rtt
    /// was obtained.
    min_rtt_stamp: Instant,

    /// The length of the filter window.
    window: Duration,
}

impl MinRttFilter {
    pub fn new(window: Duration, now: Instant) -> Self {
        Self {
            min_rtt: None,
            min_rtt_stamp: now,
            window,
        }
    }

    /// Update the filter with an RTT sample. An absent sample is ignored.
    pub fn update(&mut self, sample_rtt: Option<Duration>, now: Instant) {
        let sample_rtt = match sample_rtt {
            Some(rtt) => rtt,
            None => return,
        };

        let is_new_min = self.min_rtt.map_or(true, |min_rtt| sample_rtt < min_rtt);
        if is_new_min || self.is_expired(now) {
            self.min_rtt = Some(sample_rtt);
            self.min_rtt_stamp = now;
        }
    }

    /// Whether the window has elapsed since the current min RTT was recorded.
    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.min_rtt_stamp) >= self.window
    }

    /// Start a new window at `now` while keeping the current min RTT.
    pub fn restart_window(&mut self, now: Instant) {
        self.min_rtt_stamp = now;
    }

    /// Get the min RTT.
    pub fn min_rtt(&self) -> Option<Duration> {
        self.min_rtt
    }

    /// Get the min RTT in microseconds, `u32::MAX` if it is unknown.
    pub fn min_rtt_us(&self) -> u32 {
        self.min_rtt.map_or(u32::MAX, |rtt| {
            u32::try_from(rtt.as_micros()).unwrap_or(u32::MAX - 1)
        })
    }

    /// Get the time at which the current min RTT was recorded.
    pub fn min_rtt_stamp(&self) -> Instant {
        self.min_rtt_stamp
    }

    /// Get the length of the filter window.
    pub fn window(&self) -> Duration {
        self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(5);

    #[test]
    fn min_rtt_initial() {
        let now = Instant::now();
        let mut filter = MinRttFilter::new(WINDOW, now);
        assert_eq!(filter.min_rtt(), None);
        assert_eq!(filter.min_rtt_us(), u32::MAX);
        assert_eq!(filter.min_rtt_stamp(), now);
        assert_eq!(filter.window(), WINDOW);

        // Absent samples never touch the filter.
        filter.update(None, now + Duration::from_secs(1));
        assert_eq!(filter.min_rtt(), None);
        assert_eq!(filter.min_rtt_stamp(), now);

        // Any measured sample is smaller than the unknown min.
        filter.update(Some(Duration::from_millis(300)), now + Duration::from_secs(1));
        assert_eq!(filter.min_rtt(), Some(Duration::from_millis(300)));
        assert_eq!(filter.min_rtt_us(), 300_000);
        assert_eq!(filter.min_rtt_stamp(), now + Duration::from_secs(1));
    }

    #[test]
    fn min_rtt_update() {
        let now = Instant::now();
        let mut filter = MinRttFilter::new(WINDOW, now);

        filter.update(Some(Duration::from_millis(100)), now);
        assert_eq!(filter.min_rtt(), Some(Duration::from_millis(100)));

        // Larger sample within the window.
        filter.update(Some(Duration::from_millis(120)), now + Duration::from_secs(1));
        assert_eq!(filter.min_rtt(), Some(Duration::from_millis(100)));
        assert_eq!(filter.min_rtt_stamp(), now);

        // Equal sample is not a new min.
        filter.update(Some(Duration::from_millis(100)), now + Duration::from_secs(2));
        assert_eq!(filter.min_rtt_stamp(), now);

        // Smaller sample.
        filter.update(Some(Duration::from_millis(80)), now + Duration::from_secs(3));
        assert_eq!(filter.min_rtt(), Some(Duration::from_millis(80)));
        assert_eq!(filter.min_rtt_stamp(), now + Duration::from_secs(3));

        // A zero RTT is a valid measurement.
        filter.update(Some(Duration::ZERO), now + Duration::from_secs(4));
        assert_eq!(filter.min_rtt(), Some(Duration::ZERO));
        assert_eq!(filter.min_rtt_us(), 0);
    }

    #[test]
    fn min_rtt_expiry() {
        let now = Instant::now();
        let mut filter = MinRttFilter::new(WINDOW, now);

        filter.update(Some(Duration::from_millis(100)), now);
        assert!(!filter.is_expired(now + WINDOW - Duration::from_millis(1)));
        assert!(filter.is_expired(now + WINDOW));

        // The stale min is replaced by a larger sample after expiry.
        let t = now + WINDOW + Duration::from_secs(1);
        filter.update(Some(Duration::from_millis(200)), t);
        assert_eq!(filter.min_rtt(), Some(Duration::from_millis(200)));
        assert_eq!(filter.min_rtt_stamp(), t);
        assert!(!filter.is_expired(t));

        // The new window starts at the replacement.
        filter.update(Some(Duration::from_millis(250)), t + Duration::from_secs(1));
        assert_eq!(filter.min_rtt(), Some(Duration::from_millis(200)));
    }

    #[test]
    fn min_rtt_restart_window() {
        let now = Instant::now();
        let mut filter = MinRttFilter::new(WINDOW, now);
        filter.update(Some(Duration::from_millis(100)), now);

        let t = now + WINDOW;
        assert!(filter.is_expired(t));
        filter.restart_window(t);
        assert!(!filter.is_expired(t));
        assert_eq!(filter.min_rtt(), Some(Duration::from_millis(100)));

        filter.update(Some(Duration::from_millis(150)), t + Duration::from_secs(1));
        assert_eq!(filter.min_rtt(), Some(Duration::from_millis(100)));
    }
}
