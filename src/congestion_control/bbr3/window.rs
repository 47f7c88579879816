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

use std::time::Duration;

use super::BbrPhase;
use super::BBR_SCALE;
use crate::congestion_control::bandwidth::BW_SCALE;
use crate::congestion_control::BbrVersion;
use crate::MIN_CWND;

/// Extra segments added to the BDP target to keep the pipe full while
/// delayed or stretched ACKs are outstanding.
const TARGET_CWND_HEADROOM: u32 = 3;

/// Congestion window controller, in segments.
#[derive(Debug)]
pub struct WindowController {
    /// Current congestion window.
    cwnd: u32,

    /// The BDP target computed on the latest sample, 0 if none.
    target_cwnd: u32,
}

impl WindowController {
    pub fn new(initial_cwnd: u32) -> Self {
        Self {
            cwnd: initial_cwnd,
            target_cwnd: 0,
        }
    }

    /// Compute the congestion window after `acked` segments were newly
    /// acknowledged, and return it.
    ///
    /// In Startup the window grows by `acked` with no upper target. In the
    /// other phases it grows toward the BDP target and is cut to it at once
    /// when above. Without a usable model the window grows additively.
    #[allow(clippy::too_many_arguments)]
    pub fn compute(
        &mut self,
        phase: BbrPhase,
        acked: u32,
        bw: u64,
        min_rtt: Option<Duration>,
        gain: u32,
        clamp: u32,
        version: BbrVersion,
    ) -> u32 {
        self.target_cwnd = 0;
        if acked == 0 {
            self.cwnd = self.cwnd.max(MIN_CWND).min(clamp);
            return self.cwnd;
        }

        let grown = self.cwnd.saturating_add(acked);
        let cwnd = match phase {
            BbrPhase::Startup => grown,
            _ => match Self::bdp_target(bw, min_rtt, gain, version) {
                Some(target) => {
                    self.target_cwnd = target;
                    grown.min(target)
                }
                None => grown,
            },
        };

        self.cwnd = cwnd.max(MIN_CWND).min(clamp);
        self.cwnd
    }

    /// Return the BDP scaled by `gain` plus headroom, or None if either the
    /// bandwidth or the min RTT is unknown.
    pub fn bdp_target(
        bw: u64,
        min_rtt: Option<Duration>,
        gain: u32,
        version: BbrVersion,
    ) -> Option<u32> {
        let min_rtt = min_rtt?;
        if bw == 0 {
            return None;
        }

        let bdp = (bw as u128 * min_rtt.as_micros()) >> BW_SCALE;
        let mut target = ((bdp * gain as u128) >> BBR_SCALE) + TARGET_CWND_HEADROOM as u128;

        // Allow enough full-sized skbs in flight to utilize end systems.
        if version.rounds_target_to_even() {
            target = (target + 1) & !1;
        }

        Some(u32::try_from(target).unwrap_or(u32::MAX))
    }

    /// Raise the window to `prior_cwnd` without exceeding `clamp`.
    pub fn restore(&mut self, prior_cwnd: u32, clamp: u32) {
        self.cwnd = self.cwnd.max(prior_cwnd).min(clamp);
    }

    pub fn cwnd(&self) -> u32 {
        self.cwnd
    }

    pub fn target_cwnd(&self) -> u32 {
        self.target_cwnd
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::congestion_control::bandwidth::BandwidthEstimator;
    use crate::congestion_control::bandwidth::BW_UNIT;
    use crate::congestion_control::bbr3::BBR_UNIT;
    use crate::congestion_control::bbr3::HIGH_GAIN;

    const RTT: Option<Duration> = Some(Duration::from_millis(10));

    #[test]
    fn window_bdp_target() {
        // 2 segments per ms over 10 ms.
        let bw = BandwidthEstimator::delivery_rate(20, 10_000);
        assert_eq!(bw, 33554);

        // 33554 * 10000 >> 24 = 19, plus 3.
        assert_eq!(
            WindowController::bdp_target(bw, RTT, BBR_UNIT, BbrVersion::V1),
            Some(22)
        );
        assert_eq!(
            WindowController::bdp_target(bw, RTT, BBR_UNIT, BbrVersion::V2),
            Some(22)
        );

        // 19 * 739 >> 8 = 54, plus 3 = 57.
        assert_eq!(
            WindowController::bdp_target(bw, RTT, HIGH_GAIN, BbrVersion::V1),
            Some(57)
        );
        assert_eq!(
            WindowController::bdp_target(bw, RTT, HIGH_GAIN, BbrVersion::V3),
            Some(58)
        );

        // Unknown model.
        assert_eq!(
            WindowController::bdp_target(0, RTT, BBR_UNIT, BbrVersion::V3),
            None
        );
        assert_eq!(
            WindowController::bdp_target(bw, None, BBR_UNIT, BbrVersion::V3),
            None
        );

        // Zero RTT leaves only the headroom.
        assert_eq!(
            WindowController::bdp_target(bw, Some(Duration::ZERO), BBR_UNIT, BbrVersion::V1),
            Some(3)
        );

        // Saturated.
        assert_eq!(
            WindowController::bdp_target(u64::MAX, Some(Duration::from_secs(100)), BBR_UNIT * 4, BbrVersion::V3),
            Some(u32::MAX)
        );
    }

    #[test]
    fn window_startup() {
        let mut w = WindowController::new(10);
        assert_eq!(w.compute(BbrPhase::Startup, 20, 33554, RTT, HIGH_GAIN, 65535, BbrVersion::V3), 30);
        assert_eq!(w.target_cwnd(), 0);

        // No acked segments, no change.
        assert_eq!(w.compute(BbrPhase::Startup, 0, 33554, RTT, HIGH_GAIN, 65535, BbrVersion::V3), 30);

        // Clamped.
        assert_eq!(w.compute(BbrPhase::Startup, 100, 0, None, HIGH_GAIN, 64, BbrVersion::V3), 64);
    }

    #[test]
    fn window_toward_target() {
        let bw = BW_UNIT / 1000; // 1 segment per ms
        let rtt = Some(Duration::from_millis(100));
        let target = WindowController::bdp_target(bw, rtt, BBR_UNIT, BbrVersion::V3);
        // 16777 * 100000 >> 24 = 99, plus 3 rounded to even.
        assert_eq!(target, Some(102));

        let mut w = WindowController::new(10);
        assert_eq!(w.compute(BbrPhase::ProbeBw, 50, bw, rtt, BBR_UNIT, 65535, BbrVersion::V3), 60);
        assert_eq!(w.target_cwnd(), 102);
        assert_eq!(w.compute(BbrPhase::ProbeBw, 50, bw, rtt, BBR_UNIT, 65535, BbrVersion::V3), 102);
        assert_eq!(w.compute(BbrPhase::ProbeBw, 50, bw, rtt, BBR_UNIT, 65535, BbrVersion::V3), 102);

        // Cut to the target at once when the gain drops: 99 * 128 >> 8 = 49,
        // plus 3 rounded to even.
        assert_eq!(w.compute(BbrPhase::ProbeRtt, 1, bw, rtt, BBR_UNIT / 2, 65535, BbrVersion::V3), 52);

        // Additive growth without a model.
        assert_eq!(w.compute(BbrPhase::ProbeBw, 3, 0, rtt, BBR_UNIT, 65535, BbrVersion::V3), 55);
        assert_eq!(w.compute(BbrPhase::Drain, 3, bw, None, BBR_UNIT, 65535, BbrVersion::V3), 58);
    }

    #[test]
    fn window_bounds() {
        let versions = [BbrVersion::V1, BbrVersion::V2, BbrVersion::V3];
        let phases = [BbrPhase::Startup, BbrPhase::Drain, BbrPhase::ProbeBw, BbrPhase::ProbeRtt];
        let clamp = 500;

        for version in versions {
            for phase in phases {
                let mut w = WindowController::new(MIN_CWND);
                for i in 0..200u32 {
                    let bw = (i as u64 * 7919) % 100_000;
                    let rtt = if i % 5 == 0 { None } else { Some(Duration::from_micros(i as u64 * 331)) };
                    let cwnd = w.compute(phase, i % 13, bw, rtt, (i * 37) % 1024, clamp, version);
                    assert!(cwnd >= MIN_CWND && cwnd <= clamp);
                    assert_eq!(cwnd, w.cwnd());
                }

                // Nothing acked still bounds an out of range window.
                let mut w = WindowController::new(2);
                assert_eq!(w.compute(phase, 0, 0, RTT, BBR_UNIT, 65535, version), MIN_CWND);
                assert_eq!(w.target_cwnd(), 0);

                let mut w = WindowController::new(100);
                assert_eq!(w.compute(phase, 0, 0, RTT, BBR_UNIT, 50, version), 50);
                assert_eq!(w.cwnd(), 50);

                // In range, unchanged.
                assert_eq!(w.compute(phase, 0, 0, RTT, BBR_UNIT, 65535, version), 50);
            }
        }
    }

    #[test]
    fn window_restore() {
        let mut w = WindowController::new(10);
        w.restore(40, 65535);
        assert_eq!(w.cwnd(), 40);

        // Never lowered.
        w.restore(20, 65535);
        assert_eq!(w.cwnd(), 40);

        w.restore(100, 64);
        assert_eq!(w.cwnd(), 64);
    }
}
