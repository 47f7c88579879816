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

//! Bandwidth estimation and full pipe detection.
//!
//! Bandwidth is kept as a fixed-point rate of segments per microsecond,
//! scaled by `BW_UNIT`, so that no floating point is needed on the ACK path.

/// Scaling factor for bandwidth: segments per microsecond << 24.
pub const BW_SCALE: u32 = 24;

/// One segment per microsecond.
pub const BW_UNIT: u64 = 1 << BW_SCALE;

/// Max count of non-growing samples before the pipe is supposed to be
/// filled. This three-round threshold was validated by YouTube experimental
/// data.
const FULL_BW_COUNT_THRESHOLD: u8 = 3;

/// Bandwidth estimator, used mainly during Startup mode.
#[derive(Debug, Default)]
pub struct BandwidthEstimator {
    /// Baseline level delivery rate, in `BW_UNIT` scaled segments per
    /// microsecond.
    full_bw: u64,

    /// The number of samples without growth of the delivery rate.
    full_bw_count: u8,

    /// BBR.filled_pipe: Whether BBR estimates that it has ever fully
    /// utilized its available bandwidth. Never cleared once set.
    full_bw_reached: bool,
}

impl BandwidthEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update the estimate with `delivered` segments over `interval_us`
    /// microseconds. A negative delivered count or a non-positive interval
    /// is not a valid observation and leaves the estimator untouched.
    pub fn update(&mut self, delivered: i64, interval_us: i64) {
        if delivered < 0 || interval_us <= 0 {
            return;
        }

        let bw = Self::delivery_rate(delivered as u64, interval_us as u64);
        if self.full_bw_reached {
            return;
        }

        // Still growing?
        if bw >= self.full_bw {
            // Record new baseline level.
            self.full_bw = bw;
            self.full_bw_count = 0;
            return;
        }

        // Another sample without growth.
        self.full_bw_count += 1;
        if self.full_bw_count >= FULL_BW_COUNT_THRESHOLD {
            self.full_bw_reached = true;
        }
    }

    /// Convert a sample to a `BW_UNIT` scaled rate.
    pub fn delivery_rate(delivered: u64, interval_us: u64) -> u64 {
        delivered.saturating_mul(BW_UNIT) / interval_us.max(1)
    }

    /// Convert a `BW_UNIT` scaled rate to bytes per second.
    pub fn bytes_per_sec(bw: u64, mss: u32) -> u64 {
        let rate = (bw as u128 * mss as u128 * 1_000_000) >> BW_SCALE;
        u64::try_from(rate).unwrap_or(u64::MAX)
    }

    /// Get the bandwidth estimate.
    pub fn bw(&self) -> u64 {
        self.full_bw
    }

    /// Get the number of samples without growth.
    pub fn full_bw_count(&self) -> u8 {
        self.full_bw_count
    }

    /// Whether the pipe is estimated to be full.
    pub fn full_bw_reached(&self) -> bool {
        self.full_bw_reached
    }
}
