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

//! TCP BBR3 is the estimation engine and state machine of a BBR-family
//! congestion control algorithm for TCP senders.
//!
//! On every processed acknowledgment the host transport hands a delivery
//! rate sample to a per-connection [`Bbr3`] instance, which updates its
//! bandwidth and minimum RTT model, advances its phase (Startup, Drain,
//! ProbeBW or ProbeRTT) and derives a congestion window and a pacing rate.
//!
//! ## Get started
//!
//! ```
//! use std::time::{Duration, Instant};
//! use tcp_bbr3::{CongestionController, RateSample};
//!
//! let conf = tcp_bbr3::Config::new();
//! let registration = tcp_bbr3::register(&conf)?;
//!
//! let now = Instant::now();
//! let mut cc = registration.new_connection(now);
//! let rs = RateSample::new(20, 10_000, Some(Duration::from_millis(10)), 20, false);
//! cc.on_sample(&rs, 10, now);
//! assert_eq!(cc.congestion_window(), 30);
//! # Ok::<(), tcp_bbr3::Error>(())
//! ```
//!
//! Nothing in this crate is shared between connections. The [`Config`] is a
//! read-only set of defaults that is copied into each connection when it is
//! created.

use std::time::Duration;

use log::*;

/// The hard floor of the congestion window in segments.
pub const MIN_CWND: u32 = 4;

/// The default initial congestion window in segments.
pub const DEFAULT_INITIAL_CWND: u32 = 10;

/// The default upper clamp of the congestion window in segments.
pub const DEFAULT_CWND_CLAMP: u32 = 65535;

/// The default maximum segment size in bytes.
pub const DEFAULT_MSS: u32 = 1448;

/// The smallest maximum segment size accepted, as TCP_MIN_MSS.
const MIN_MSS: u32 = 88;

/// Bytes used to size the initial window from the MSS, see RFC 3390.
const INITIAL_WINDOW_BYTES: u32 = 4380;

/// Default length of the min RTT filter window in seconds.
const DEFAULT_MIN_RTT_WIN_SEC: u32 = 5;

/// Default duration of the ProbeRTT phase.
const DEFAULT_PROBE_RTT_DURATION: Duration = Duration::from_millis(200);

/// Size of the private slot a host reserves for each connection's
/// congestion control state, in bytes.
pub const CA_PRIV_SIZE: usize = 32 * std::mem::size_of::<u64>();

/// A specialized [`Result`] type for bbr3 operations.
///
/// [`Result`]: https://doc.rust-lang.org/std/result/enum.Result.html
pub type Result<T> = std::result::Result<T, Error>;

/// Process-wide defaults for the algorithm.
///
/// A `Config` is built once, customized by calling the related set methods
/// and never changed afterwards. Every connection copies the values it needs
/// when it is created.
#[derive(Debug, Clone)]
pub struct Config {
    /// Algorithm version selector.
    bbr_version: BbrVersion,

    /// Restore the pre-probe window as soon as ProbeRTT ends.
    fast_convergence: bool,

    /// Leave Drain only when inflight falls to the window reduction target.
    drain_to_target: bool,

    /// Length of the min RTT filter window in seconds.
    min_rtt_win_sec: u32,

    /// Initial congestion window in segments.
    initial_cwnd: u32,

    /// Upper clamp of the congestion window in segments.
    cwnd_clamp: u32,

    /// Maximum segment size in bytes.
    mss: u32,

    /// Duration of the ProbeRTT phase.
    probe_rtt_duration: Duration,

    /// Size of the per-connection private slot in bytes.
    ca_priv_size: usize,
}

impl Config {
    /// Create default configuration.
    ///
    /// ## Examples:
    ///
    /// ```
    /// let mut conf = tcp_bbr3::Config::new();
    /// conf.set_min_rtt_win_sec(10);
    /// conf.set_drain_to_target(false);
    /// ```
    pub fn new() -> Self {
        Self {
            bbr_version: BbrVersion::default(),
            fast_convergence: true,
            drain_to_target: true,
            min_rtt_win_sec: DEFAULT_MIN_RTT_WIN_SEC,
            initial_cwnd: DEFAULT_INITIAL_CWND,
            cwnd_clamp: DEFAULT_CWND_CLAMP,
            mss: DEFAULT_MSS,
            probe_rtt_duration: DEFAULT_PROBE_RTT_DURATION,
            ca_priv_size: CA_PRIV_SIZE,
        }
    }

    /// Create configuration from integer module parameters, as exposed by an
    /// operator through `sysctl` or module options.
    ///
    /// `mode` is `0` for BBRv1, `1` for BBRv2 and `2` for BBRv3. The toggles
    /// are enabled by any non-zero value.
    pub fn from_module_params(
        mode: i32,
        fast_convergence: i32,
        drain_to_target: i32,
        min_rtt_win_sec: i32,
    ) -> Result<Self> {
        let bbr_version = u8::try_from(mode)
            .map_err(|_| Error::InvalidConfig(format!("bbr_mode {}", mode)))
            .and_then(BbrVersion::try_from)?;
        let min_rtt_win_sec = u32::try_from(min_rtt_win_sec)
            .map_err(|_| Error::InvalidConfig(format!("min_rtt_win_sec {}", min_rtt_win_sec)))?;

        let mut conf = Self::new();
        conf.set_bbr_version(bbr_version);
        conf.set_fast_convergence(fast_convergence != 0);
        conf.set_drain_to_target(drain_to_target != 0);
        conf.set_min_rtt_win_sec(min_rtt_win_sec);
        Ok(conf)
    }

    /// Set the algorithm version.
    pub fn set_bbr_version(&mut self, v: BbrVersion) {
        self.bbr_version = v;
    }

    /// Enable or disable fast convergence. Enabled by default.
    pub fn set_fast_convergence(&mut self, v: bool) {
        self.fast_convergence = v;
    }

    /// Enable or disable draining to the window reduction target. Enabled by
    /// default.
    pub fn set_drain_to_target(&mut self, v: bool) {
        self.drain_to_target = v;
    }

    /// Set the min RTT filter window length in seconds. The default value is
    /// `5`. A zero value is raised to one second.
    pub fn set_min_rtt_win_sec(&mut self, v: u32) {
        if v == 0 {
            warn!("min_rtt_win_sec 0 is invalid, use 1");
        }
        self.min_rtt_win_sec = v.max(1);
    }

    /// Set the initial congestion window in segments. The value is bounded
    /// to `[MIN_CWND, cwnd_clamp]`.
    pub fn set_initial_cwnd(&mut self, v: u32) {
        let cwnd = v.clamp(MIN_CWND, self.cwnd_clamp);
        if cwnd != v {
            warn!("initial_cwnd {} is out of range, use {}", v, cwnd);
        }
        self.initial_cwnd = cwnd;
    }

    /// Derive the initial congestion window from the current MSS, as
    /// `min(10, max(2, 4380 / mss))` segments, raised to `MIN_CWND`.
    pub fn set_initial_cwnd_from_mss(&mut self) {
        let cwnd = (INITIAL_WINDOW_BYTES / self.mss).clamp(2, DEFAULT_INITIAL_CWND);
        self.initial_cwnd = cwnd.clamp(MIN_CWND, self.cwnd_clamp);
    }

    /// Set the upper clamp of the congestion window in segments. The default
    /// value is `65535`. The clamp is never lower than `MIN_CWND`.
    pub fn set_cwnd_clamp(&mut self, v: u32) {
        if v < MIN_CWND {
            warn!("cwnd_clamp {} is below the floor, use {}", v, MIN_CWND);
        }
        self.cwnd_clamp = v.max(MIN_CWND);
        self.initial_cwnd = self.initial_cwnd.min(self.cwnd_clamp);
    }

    /// Set the maximum segment size in bytes. The default value is `1448`.
    pub fn set_mss(&mut self, v: u32) {
        if v < MIN_MSS {
            warn!("mss {} is too small, use {}", v, MIN_MSS);
        }
        self.mss = v.max(MIN_MSS);
    }

    /// Set the ProbeRTT duration in milliseconds. The default value is `200`.
    pub fn set_probe_rtt_duration(&mut self, v: u64) {
        self.probe_rtt_duration = Duration::from_millis(v);
    }

    /// Set the size of the per-connection private slot in bytes. The state
    /// size is checked against it in [`register`].
    pub fn set_ca_priv_size(&mut self, v: usize) {
        self.ca_priv_size = v;
    }

    /// Return the algorithm version.
    pub fn bbr_version(&self) -> BbrVersion {
        self.bbr_version
    }

    /// Return whether fast convergence is enabled.
    pub fn fast_convergence(&self) -> bool {
        self.fast_convergence
    }

    /// Return whether draining to the reduction target is enabled.
    pub fn drain_to_target(&self) -> bool {
        self.drain_to_target
    }

    /// Return the min RTT filter window length in seconds.
    pub fn min_rtt_win_sec(&self) -> u32 {
        self.min_rtt_win_sec
    }

    /// Return the initial congestion window in segments.
    pub fn initial_cwnd(&self) -> u32 {
        self.initial_cwnd
    }

    /// Return the upper clamp of the congestion window in segments.
    pub fn cwnd_clamp(&self) -> u32 {
        self.cwnd_clamp
    }

    /// Return the maximum segment size in bytes.
    pub fn mss(&self) -> u32 {
        self.mss
    }

    /// Return the ProbeRTT duration.
    pub fn probe_rtt_duration(&self) -> Duration {
        self.probe_rtt_duration
    }

    /// Return the size of the per-connection private slot in bytes.
    pub fn ca_priv_size(&self) -> usize {
        self.ca_priv_size
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}


pub use crate::congestion_control::build_congestion_controller;
pub use crate::congestion_control::BandwidthEstimator;
pub use crate::congestion_control::BbrPhase;
pub use crate::congestion_control::BbrVersion;
pub use crate::congestion_control::Bbr3;
pub use crate::congestion_control::Bbr3Config;
pub use crate::congestion_control::Bbr3Snapshot;
pub use crate::congestion_control::CaEvent;
pub use crate::congestion_control::CongestionController;
pub use crate::congestion_control::MinRttFilter;
pub use crate::congestion_control::PhaseController;
pub use crate::congestion_control::PhaseSignals;
pub use crate::congestion_control::RateSample;
pub use crate::congestion_control::WindowController;
pub use crate::diag::BbrInfo;
pub use crate::diag::DiagExtension;
pub use crate::error::Error;
pub use crate::registry::register;
pub use crate::registry::Registration;

#[path = "congestion_control/congestion_control.rs"]
pub mod congestion_control;

pub mod diag;
pub mod error;
pub mod registry;
