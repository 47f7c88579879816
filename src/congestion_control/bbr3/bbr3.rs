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

//! BBR Congestion Control
//!
//! VERSION 3
//!
//! BBR uses recent measurements of a transport connection's delivery rate
//! and round-trip time to build an explicit model that includes both the
//! maximum recent bandwidth available to that connection, and its
//! minimum recent round-trip delay.  BBR then uses this model to control
//! both how fast it sends data and the maximum amount of data it allows
//! in flight in the network at any time.
//!
//! This is the estimation core only: loss, ECN and the ProbeBW gain cycle
//! are not modeled.
//!
//! See <https://datatracker.ietf.org/doc/html/draft-cardwell-iccrg-bbr-congestion-control-02>.

use std::time::Duration;
use std::time::Instant;

use enumflags2::BitFlags;
use log::*;
use serde::Serialize;

use super::bandwidth::BandwidthEstimator;
use super::min_rtt::MinRttFilter;
use super::BbrVersion;
use super::CaEvent;
use super::CongestionController;
use super::RateSample;
use crate::diag::BbrInfo;
use crate::diag::DiagExtension;
use crate::Config;
use crate::MIN_CWND;
pub use phase::BbrPhase;
pub use phase::PhaseController;
pub use phase::PhaseSignals;
pub use window::WindowController;

/// Scale factor for rate in pkt/uSec unit to avoid truncation in bandwidth
/// estimation. The gains are fixed point values in `BBR_UNIT`.
pub const BBR_SCALE: u32 = 8;

/// A gain of 1.0.
pub const BBR_UNIT: u32 = 1 << BBR_SCALE;

/// The gain used in Startup: 2/ln(2) ~= 2.89 to double the sending rate
/// every round.
pub const HIGH_GAIN: u32 = BBR_UNIT * 2885 / 1000 + 1;

/// The pacing gain used in Drain: the inverse of the startup gain, to drain
/// the queue created in Startup within one round.
pub const DRAIN_GAIN: u32 = BBR_UNIT * 1000 / 2885;

/// The cwnd gain used in ProbeRTT.
pub const PROBE_RTT_CWND_GAIN: u32 = BBR_UNIT / 2;

/// The floor of the Drain reduction target in segments.
const DRAIN_TARGET_FLOOR: u32 = 2;

/// Per-connection parameters, copied from the process-wide [`Config`] when
/// the connection is created.
#[derive(Debug, Clone)]
pub struct Bbr3Config {
    /// Algorithm version.
    version: BbrVersion,

    /// Restore the pre-probe window when ProbeRTT ends.
    fast_convergence: bool,

    /// Leave Drain when inflight falls to the window reduction target
    /// rather than to the BDP.
    drain_to_target: bool,

    /// Length of the min RTT filter window.
    min_rtt_win: Duration,

    /// Initial congestion window in segments.
    initial_cwnd: u32,

    /// Upper clamp of the congestion window in segments.
    cwnd_clamp: u32,

    /// Maximum segment size in bytes.
    mss: u32,

    /// Probe RTT duration.
    probe_rtt_duration: Duration,
}

impl From<&Config> for Bbr3Config {
    fn from(conf: &Config) -> Self {
        Self {
            version: conf.bbr_version(),
            fast_convergence: conf.fast_convergence(),
            drain_to_target: conf.drain_to_target(),
            min_rtt_win: Duration::from_secs(conf.min_rtt_win_sec() as u64),
            initial_cwnd: conf.initial_cwnd(),
            cwnd_clamp: conf.cwnd_clamp(),
            mss: conf.mss(),
            probe_rtt_duration: conf.probe_rtt_duration(),
        }
    }
}

impl Default for Bbr3Config {
    fn default() -> Self {
        Self::from(&Config::new())
    }
}

impl Bbr3Config {
    pub fn version(&self) -> BbrVersion {
        self.version
    }

    pub fn fast_convergence(&self) -> bool {
        self.fast_convergence
    }

    pub fn drain_to_target(&self) -> bool {
        self.drain_to_target
    }

    pub fn min_rtt_win(&self) -> Duration {
        self.min_rtt_win
    }

    pub fn initial_cwnd(&self) -> u32 {
        self.initial_cwnd
    }

    pub fn cwnd_clamp(&self) -> u32 {
        self.cwnd_clamp
    }

    pub fn mss(&self) -> u32 {
        self.mss
    }

    pub fn probe_rtt_duration(&self) -> Duration {
        self.probe_rtt_duration
    }
}

/// Externally visible state after a sample, for tracing and replay tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Bbr3Snapshot {
    pub phase: BbrPhase,
    pub cwnd: u32,
    pub target_cwnd: u32,
    pub prior_cwnd: u32,
    pub pacing_rate: u64,
    pub full_bw_reached: bool,
    pub full_bw_count: u8,
    pub info: BbrInfo,
}

/// BBR3 per-connection state.
///
/// The state is sized to fit the private slot the host reserves for each
/// connection, see [`crate::register`].
#[derive(Debug)]
pub struct Bbr3 {
    /// Configurable parameters.
    config: Bbr3Config,

    /// Windowed min RTT estimator.
    min_rtt: MinRttFilter,

    /// Bandwidth estimator and full pipe detector.
    bandwidth: BandwidthEstimator,

    /// State machine and gains.
    phase: PhaseController,

    /// Congestion window.
    window: WindowController,
}

impl Bbr3 {
    pub fn new(config: Bbr3Config, now: Instant) -> Self {
        let min_rtt = MinRttFilter::new(config.min_rtt_win, now);
        let window = WindowController::new(config.initial_cwnd);
        Self {
            config,
            min_rtt,
            bandwidth: BandwidthEstimator::new(),
            phase: PhaseController::new(now),
            window,
        }
    }

    /// Inflight level at or below which Drain is done.
    fn drain_target(&self) -> u32 {
        let cwnd = self.window.cwnd();
        if self.config.drain_to_target {
            // The window reduction target used by the host.
            return (cwnd >> 1).max(DRAIN_TARGET_FLOOR);
        }

        WindowController::bdp_target(
            self.bandwidth.bw(),
            self.min_rtt.min_rtt(),
            BBR_UNIT,
            self.config.version,
        )
        .unwrap_or(cwnd)
    }

    fn on_phase_change(&mut self, prev: BbrPhase, now: Instant) {
        if prev != BbrPhase::ProbeRtt {
            return;
        }

        // Exiting ProbeRTT.
        self.phase.restore_cwnd_gain();
        self.min_rtt.restart_window(now);
        if self.config.fast_convergence {
            self.window
                .restore(self.phase.prior_cwnd(), self.config.cwnd_clamp);
        }
    }

    /// Pacing rate in bytes per second.
    ///
    /// Before any bandwidth is measured, the rate is derived from the
    /// initial window over the min RTT, or over 1ms if no RTT is known.
    fn bbr_pacing_rate(&self) -> u64 {
        let bw = self.bandwidth.bw();
        let rate = if bw > 0 {
            BandwidthEstimator::bytes_per_sec(bw, self.config.mss)
        } else {
            let rtt_us = self
                .min_rtt
                .min_rtt()
                .map_or(1000, |rtt| rtt.as_micros().max(1));
            let rate =
                self.config.initial_cwnd as u128 * self.config.mss as u128 * 1_000_000 / rtt_us;
            u64::try_from(rate).unwrap_or(u64::MAX)
        };

        let rate = (rate as u128 * self.phase.pacing_gain() as u128) >> BBR_SCALE;
        u64::try_from(rate).unwrap_or(u64::MAX)
    }

    /// Diagnostic record of the current state.
    pub fn info(&self) -> BbrInfo {
        BbrInfo::new(
            BandwidthEstimator::bytes_per_sec(self.bandwidth.bw(), self.config.mss),
            self.min_rtt.min_rtt_us(),
            self.phase.pacing_gain(),
            self.phase.cwnd_gain(),
        )
    }

    /// Snapshot of the current state.
    pub fn snapshot(&self) -> Bbr3Snapshot {
        Bbr3Snapshot {
            phase: self.phase.phase(),
            cwnd: self.window.cwnd(),
            target_cwnd: self.window.target_cwnd(),
            prior_cwnd: self.phase.prior_cwnd(),
            pacing_rate: self.bbr_pacing_rate(),
            full_bw_reached: self.bandwidth.full_bw_reached(),
            full_bw_count: self.bandwidth.full_bw_count(),
            info: self.info(),
        }
    }

    pub fn config(&self) -> &Bbr3Config {
        &self.config
    }

    pub fn phase(&self) -> BbrPhase {
        self.phase.phase()
    }

    pub fn pacing_gain(&self) -> u32 {
        self.phase.pacing_gain()
    }

    pub fn cwnd_gain(&self) -> u32 {
        self.phase.cwnd_gain()
    }

    pub fn target_cwnd(&self) -> u32 {
        self.window.target_cwnd()
    }

    pub fn prior_cwnd(&self) -> u32 {
        self.phase.prior_cwnd()
    }

    pub fn probe_rtt_done_stamp(&self) -> Option<Instant> {
        self.phase.probe_rtt_done_stamp()
    }

    /// Bandwidth estimate in `BW_UNIT` scaled segments per microsecond.
    pub fn bandwidth(&self) -> u64 {
        self.bandwidth.bw()
    }

    pub fn min_rtt(&self) -> Option<Duration> {
        self.min_rtt.min_rtt()
    }

    pub fn is_filled_pipe(&self) -> bool {
        self.bandwidth.full_bw_reached()
    }
}

impl CongestionController for Bbr3 {
    fn name(&self) -> &str {
        "BBR3"
    }

    fn on_sample(&mut self, rs: &RateSample, in_flight: u32, now: Instant) {
        // Update model.
        self.bandwidth.update(rs.delivered, rs.interval_us);

        // Staleness is judged before the sample may refresh the filter.
        let min_rtt_expired = self.min_rtt.is_expired(now);
        self.min_rtt.update(rs.rtt, now);

        // Update state.
        let signals = PhaseSignals {
            full_bw_reached: self.bandwidth.full_bw_reached(),
            in_flight,
            drain_target: self.drain_target(),
            min_rtt_expired,
            cwnd: self.window.cwnd(),
        };
        if let Some(prev) = self
            .phase
            .advance(&signals, self.config.probe_rtt_duration, now)
        {
            self.on_phase_change(prev, now);
        }

        // Update control parameters.
        self.window.compute(
            self.phase.phase(),
            rs.acked_sacked,
            self.bandwidth.bw(),
            self.min_rtt.min_rtt(),
            self.phase.cwnd_gain(),
            self.config.cwnd_clamp,
            self.config.version,
        );

        trace!(
            "{}. phase={:?} cwnd={} target={} bw={} min_rtt_us={} pacing_gain={} cwnd_gain={} in_flight={} delivered={} interval_us={}",
            self.name(),
            self.phase.phase(),
            self.window.cwnd(),
            self.window.target_cwnd(),
            self.bandwidth.bw(),
            self.min_rtt.min_rtt_us(),
            self.phase.pacing_gain(),
            self.phase.cwnd_gain(),
            in_flight,
            rs.delivered,
            rs.interval_us,
        );
    }

    fn on_cwnd_event(&mut self, event: CaEvent, app_limited: bool) {
        // Remember the window before an idle restart.
        if event == CaEvent::TxStart && app_limited {
            self.phase.save_cwnd(self.window.cwnd());
        }
    }

    fn undo_cwnd(&self) -> u32 {
        self.window.cwnd().max(self.phase.prior_cwnd())
    }

    fn congestion_window(&self) -> u32 {
        self.window.cwnd()
    }

    fn pacing_rate(&self) -> Option<u64> {
        Some(self.bbr_pacing_rate())
    }

    fn initial_window(&self) -> u32 {
        self.config.initial_cwnd
    }

    fn minimal_window(&self) -> u32 {
        MIN_CWND
    }

    fn in_slow_start(&self) -> bool {
        self.phase.phase() == BbrPhase::Startup
    }

    fn get_info(&self, ext: BitFlags<DiagExtension>) -> Option<BbrInfo> {
        if ext.intersects(DiagExtension::BbrInfo | DiagExtension::VegasInfo) {
            return Some(self.info());
        }
        None
    }
}


mod phase;
mod window;
