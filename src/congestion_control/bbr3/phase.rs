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

//! BBR3 state machine.
//!
//! ```text
//!  Startup --(full bw reached)--> Drain --(inflight <= drain target)--> ProbeBW
//!                                                                     |    ^
//!                                                (min rtt expired)    v    | (probe rtt done)
//!                                                                   ProbeRTT
//! ```
//!
//! ProbeBW holds unity gains and does not cycle the pacing gain to
//! re-probe bandwidth.

use std::time::Duration;
use std::time::Instant;

use log::*;
use serde::Serialize;
use strum_macros::EnumIter;

use super::BBR_UNIT;
use super::DRAIN_GAIN;
use super::HIGH_GAIN;
use super::PROBE_RTT_CWND_GAIN;

/// BBR State Machine.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, Serialize)]
pub enum BbrPhase {
    /// Ramp up the sending rate rapidly to fill the pipe.
    Startup,

    /// Drain any queue created during startup.
    Drain,

    /// Cruise at the estimated bandwidth.
    ProbeBw,

    /// Cut inflight to the minimum to probe the min RTT.
    ProbeRtt,
}

impl BbrPhase {
    /// The pacing gain and cwnd gain tied to the phase.
    pub fn gains(&self) -> (u32, u32) {
        match self {
            BbrPhase::Startup => (HIGH_GAIN, HIGH_GAIN),
            BbrPhase::Drain => (DRAIN_GAIN, HIGH_GAIN),
            BbrPhase::ProbeBw => (BBR_UNIT, BBR_UNIT),
            BbrPhase::ProbeRtt => (BBR_UNIT, PROBE_RTT_CWND_GAIN),
        }
    }
}

/// Estimator outputs consumed by the state machine on each sample.
#[derive(Debug, Clone, Copy)]
pub struct PhaseSignals {
    /// Whether the full bandwidth latch is set.
    pub full_bw_reached: bool,

    /// Segments in flight reported by the host.
    pub in_flight: u32,

    /// Inflight level at or below which Drain is done.
    pub drain_target: u32,

    /// Whether the min RTT filter window has elapsed.
    pub min_rtt_expired: bool,

    /// The current congestion window in segments.
    pub cwnd: u32,
}

#[derive(Debug)]
pub struct PhaseController {
    /// Current phase.
    phase: BbrPhase,

    /// BBR.pacing_gain in `BBR_UNIT`.
    pacing_gain: u32,

    /// BBR.cwnd_gain in `BBR_UNIT`.
    cwnd_gain: u32,

    /// Time when the current phase was entered.
    cycle_start: Instant,

    /// Time when ProbeRTT ends.
    probe_rtt_done_stamp: Option<Instant>,

    /// Last-known good cwnd, saved before ProbeRTT or an idle restart.
    prior_cwnd: u32,
}

impl PhaseController {
    pub fn new(now: Instant) -> Self {
        let (pacing_gain, cwnd_gain) = BbrPhase::Startup.gains();
        Self {
            phase: BbrPhase::Startup,
            pacing_gain,
            cwnd_gain,
            cycle_start: now,
            probe_rtt_done_stamp: None,
            prior_cwnd: 0,
        }
    }

    /// Evaluate the transition out of the current phase. At most one
    /// transition happens per sample. Return the previous phase if the phase
    /// changed.
    pub fn advance(
        &mut self,
        signals: &PhaseSignals,
        probe_rtt_duration: Duration,
        now: Instant,
    ) -> Option<BbrPhase> {
        let prev = self.phase;

        match self.phase {
            BbrPhase::Startup => {
                if signals.full_bw_reached {
                    self.enter_drain(now);
                }
            }

            BbrPhase::Drain => {
                if signals.in_flight <= signals.drain_target {
                    self.enter_probe_bw(now);
                }
            }

            BbrPhase::ProbeBw => {
                if signals.min_rtt_expired {
                    self.enter_probe_rtt(signals.cwnd, probe_rtt_duration, now);
                }
            }

            BbrPhase::ProbeRtt => {
                if self.probe_rtt_done_stamp.map_or(true, |done| now > done) {
                    self.exit_probe_rtt(now);
                }
            }
        }

        if self.phase == prev {
            return None;
        }

        debug!(
            "BBR3 phase {:?} -> {:?}, pacing_gain={}, cwnd_gain={}",
            prev, self.phase, self.pacing_gain, self.cwnd_gain
        );
        Some(prev)
    }

    /// Pace slowly to drain the queue, but keep the cwnd high so that only
    /// pacing limits the sending rate.
    fn enter_drain(&mut self, now: Instant) {
        self.set_phase(BbrPhase::Drain, now);
        self.pacing_gain = DRAIN_GAIN;
        self.cwnd_gain = HIGH_GAIN;
    }

    fn enter_probe_bw(&mut self, now: Instant) {
        self.set_phase(BbrPhase::ProbeBw, now);
        self.pacing_gain = BBR_UNIT;
        self.cwnd_gain = BBR_UNIT;
    }

    fn enter_probe_rtt(&mut self, cwnd: u32, probe_rtt_duration: Duration, now: Instant) {
        // Remember the last-known good cwnd and restore it when exiting
        // ProbeRTT.
        self.prior_cwnd = cwnd;

        self.set_phase(BbrPhase::ProbeRtt, now);
        self.pacing_gain = BBR_UNIT;
        self.cwnd_gain = PROBE_RTT_CWND_GAIN;
        self.probe_rtt_done_stamp = Some(now + probe_rtt_duration);
    }

    /// Only the pacing gain is reset here. The owner restores the cwnd gain
    /// together with the saved window.
    fn exit_probe_rtt(&mut self, now: Instant) {
        self.set_phase(BbrPhase::ProbeBw, now);
        self.pacing_gain = BBR_UNIT;
        self.probe_rtt_done_stamp = None;
    }

    fn set_phase(&mut self, phase: BbrPhase, now: Instant) {
        self.phase = phase;
        self.cycle_start = now;
    }

    /// Restore the cwnd gain of the current phase.
    pub fn restore_cwnd_gain(&mut self) {
        self.cwnd_gain = self.phase.gains().1;
    }

    /// Record the cwnd to restore later without re-probing.
    pub fn save_cwnd(&mut self, cwnd: u32) {
        self.prior_cwnd = cwnd;
    }

    pub fn phase(&self) -> BbrPhase {
        self.phase
    }

    pub fn pacing_gain(&self) -> u32 {
        self.pacing_gain
    }

    pub fn cwnd_gain(&self) -> u32 {
        self.cwnd_gain
    }

    pub fn cycle_start(&self) -> Instant {
        self.cycle_start
    }

    pub fn probe_rtt_done_stamp(&self) -> Option<Instant> {
        self.probe_rtt_done_stamp
    }

    pub fn prior_cwnd(&self) -> u32 {
        self.prior_cwnd
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    const PROBE_RTT_DURATION: Duration = Duration::from_millis(200);

    fn signals() -> PhaseSignals {
        PhaseSignals {
            full_bw_reached: false,
            in_flight: 100,
            drain_target: 10,
            min_rtt_expired: false,
            cwnd: 20,
        }
    }

    #[test]
    fn phase_gains() {
        assert_eq!(BbrPhase::Startup.gains(), (739, 739));
        assert_eq!(BbrPhase::Drain.gains(), (88, 739));
        assert_eq!(BbrPhase::ProbeBw.gains(), (256, 256));
        assert_eq!(BbrPhase::ProbeRtt.gains(), (256, 128));
    }

    #[test]
    fn phase_startup() {
        let now = Instant::now();
        let mut pc = PhaseController::new(now);
        assert_eq!(pc.phase(), BbrPhase::Startup);
        assert_eq!(pc.pacing_gain(), HIGH_GAIN);
        assert_eq!(pc.cwnd_gain(), HIGH_GAIN);
        assert_eq!(pc.cycle_start(), now);
        assert_eq!(pc.prior_cwnd(), 0);

        // Inflight and min rtt expiry do not matter in Startup.
        let mut s = signals();
        s.in_flight = 0;
        s.min_rtt_expired = true;
        assert_eq!(pc.advance(&s, PROBE_RTT_DURATION, now), None);
        assert_eq!(pc.phase(), BbrPhase::Startup);

        s.full_bw_reached = true;
        let t = now + Duration::from_millis(10);
        assert_eq!(pc.advance(&s, PROBE_RTT_DURATION, t), Some(BbrPhase::Startup));
        assert_eq!(pc.phase(), BbrPhase::Drain);
        assert_eq!(pc.pacing_gain(), DRAIN_GAIN);
        assert_eq!(pc.cwnd_gain(), HIGH_GAIN);
        assert_eq!(pc.cycle_start(), t);
    }

    #[test]
    fn phase_drain() {
        let now = Instant::now();
        let mut pc = PhaseController::new(now);
        let mut s = signals();
        s.full_bw_reached = true;

        // One transition per sample, even if Drain is already done.
        s.in_flight = 0;
        pc.advance(&s, PROBE_RTT_DURATION, now);
        assert_eq!(pc.phase(), BbrPhase::Drain);

        s.in_flight = 11;
        assert_eq!(pc.advance(&s, PROBE_RTT_DURATION, now), None);
        assert_eq!(pc.phase(), BbrPhase::Drain);

        s.in_flight = 10;
        assert_eq!(pc.advance(&s, PROBE_RTT_DURATION, now), Some(BbrPhase::Drain));
        assert_eq!(pc.phase(), BbrPhase::ProbeBw);
        assert_eq!(pc.pacing_gain(), BBR_UNIT);
        assert_eq!(pc.cwnd_gain(), BBR_UNIT);
    }

    #[test]
    fn phase_probe_bw_holds() {
        let now = Instant::now();
        let mut pc = PhaseController::new(now);
        let mut s = signals();
        s.full_bw_reached = true;
        s.in_flight = 0;
        pc.advance(&s, PROBE_RTT_DURATION, now);
        pc.advance(&s, PROBE_RTT_DURATION, now);
        assert_eq!(pc.phase(), BbrPhase::ProbeBw);

        // No gain cycling.
        for i in 1..100 {
            s.in_flight = i * 7;
            let t = now + Duration::from_millis(i as u64 * 100);
            assert_eq!(pc.advance(&s, PROBE_RTT_DURATION, t), None);
            assert_eq!(pc.pacing_gain(), BBR_UNIT);
            assert_eq!(pc.cwnd_gain(), BBR_UNIT);
        }
    }

    #[test]
    fn phase_probe_rtt() {
        let now = Instant::now();
        let mut pc = PhaseController::new(now);
        let mut s = signals();
        s.full_bw_reached = true;
        s.in_flight = 0;
        pc.advance(&s, PROBE_RTT_DURATION, now);
        pc.advance(&s, PROBE_RTT_DURATION, now);
        assert_eq!(pc.phase(), BbrPhase::ProbeBw);

        s.min_rtt_expired = true;
        s.cwnd = 42;
        let t = now + Duration::from_secs(5);
        assert_eq!(pc.advance(&s, PROBE_RTT_DURATION, t), Some(BbrPhase::ProbeBw));
        assert_eq!(pc.phase(), BbrPhase::ProbeRtt);
        assert_eq!(pc.pacing_gain(), BBR_UNIT);
        assert_eq!(pc.cwnd_gain(), PROBE_RTT_CWND_GAIN);
        assert_eq!(pc.prior_cwnd(), 42);
        assert_eq!(pc.probe_rtt_done_stamp(), Some(t + PROBE_RTT_DURATION));

        // Not done before the deadline has passed.
        assert_eq!(pc.advance(&s, PROBE_RTT_DURATION, t + PROBE_RTT_DURATION), None);
        assert_eq!(pc.phase(), BbrPhase::ProbeRtt);

        let t = t + PROBE_RTT_DURATION + Duration::from_millis(1);
        assert_eq!(pc.advance(&s, PROBE_RTT_DURATION, t), Some(BbrPhase::ProbeRtt));
        assert_eq!(pc.phase(), BbrPhase::ProbeBw);
        assert_eq!(pc.pacing_gain(), BBR_UNIT);
        assert_eq!(pc.probe_rtt_done_stamp(), None);

        // The owner restores the cwnd gain.
        assert_eq!(pc.cwnd_gain(), PROBE_RTT_CWND_GAIN);
        pc.restore_cwnd_gain();
        assert_eq!(pc.cwnd_gain(), BBR_UNIT);
    }

    #[test]
    fn phase_reachable_transitions() {
        // Drive every combination of signals from every phase and check that
        // only the enumerated transitions occur.
        let allowed = [
            (BbrPhase::Startup, BbrPhase::Drain),
            (BbrPhase::Drain, BbrPhase::ProbeBw),
            (BbrPhase::ProbeBw, BbrPhase::ProbeRtt),
            (BbrPhase::ProbeRtt, BbrPhase::ProbeBw),
        ];

        let now = Instant::now();
        for bits in 0..8u32 {
            let s = PhaseSignals {
                full_bw_reached: bits & 1 != 0,
                in_flight: if bits & 2 != 0 { 0 } else { 100 },
                drain_target: 10,
                min_rtt_expired: bits & 4 != 0,
                cwnd: 20,
            };

            let mut pc = PhaseController::new(now);
            let mut t = now;
            for _ in 0..10 {
                t += Duration::from_millis(150);
                let from = pc.phase();
                if let Some(prev) = pc.advance(&s, PROBE_RTT_DURATION, t) {
                    assert_eq!(prev, from);
                    assert!(allowed.contains(&(from, pc.phase())));
                }
            }
        }

        for phase in BbrPhase::iter() {
            let (pacing_gain, cwnd_gain) = phase.gains();
            assert!(pacing_gain > 0 && cwnd_gain > 0);
        }
    }
}
