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

//! Delivery rate sample handed over by the host after it processed an ACK.
//!
//! See
//! <https://datatracker.ietf.org/doc/html/draft-cheng-iccrg-delivery-rate-estimation-02#section-3.1.3>.

use std::time::Duration;

/// Rate sample input.
///
/// The signed fields keep the host's conventions: a negative `delivered` or
/// a non-positive `interval_us` marks a sample that must not be used to
/// estimate bandwidth.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RateSample {
    /// rs.delivered: The amount of data in segments marked as delivered
    /// over the sampling interval.
    pub delivered: i64,

    /// rs.interval: The length of the sampling interval in microseconds.
    pub interval_us: i64,

    /// rs.rtt: The RTT sample, or None if it was not measured.
    pub rtt: Option<Duration>,

    /// The number of segments newly acknowledged or SACKed.
    pub acked_sacked: u32,

    /// rs.is_app_limited: Whether the sender was application-limited during
    /// the sample.
    pub is_app_limited: bool,
}

impl RateSample {
    pub fn new(
        delivered: i64,
        interval_us: i64,
        rtt: Option<Duration>,
        acked_sacked: u32,
        is_app_limited: bool,
    ) -> Self {
        Self {
            delivered,
            interval_us,
            rtt,
            acked_sacked,
            is_app_limited,
        }
    }

    /// Whether the sample can be used to estimate the delivery rate.
    pub fn is_valid(&self) -> bool {
        self.delivered >= 0 && self.interval_us > 0
    }
}
