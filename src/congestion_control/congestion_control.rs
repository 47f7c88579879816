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

#![allow(unused_variables)]

use core::str::FromStr;
use std::fmt;
use std::time::Duration;
use std::time::Instant;

use enumflags2::BitFlags;
use serde::Serialize;
use strum_macros::EnumIter;

use crate::diag::BbrInfo;
use crate::diag::DiagExtension;
use crate::Config;
use crate::Error;
use crate::Result;
pub use bandwidth::BandwidthEstimator;
pub use bandwidth::BW_SCALE;
pub use bandwidth::BW_UNIT;
pub use bbr3::Bbr3;
pub use bbr3::Bbr3Config;
pub use bbr3::Bbr3Snapshot;
pub use bbr3::BbrPhase;
pub use bbr3::PhaseController;
pub use bbr3::PhaseSignals;
pub use bbr3::WindowController;
pub use bbr3::BBR_SCALE;
pub use bbr3::BBR_UNIT;
pub use bbr3::DRAIN_GAIN;
pub use bbr3::HIGH_GAIN;
pub use bbr3::PROBE_RTT_CWND_GAIN;
pub use min_rtt::MinRttFilter;
pub use rate_sample::RateSample;

/// Available BBR versions.
///
/// The versions share the same model and state machine and only differ in
/// the constant factors of the congestion window target.
#[repr(u8)]
#[derive(Eq, PartialEq, Debug, Clone, Copy, Default, EnumIter, Serialize)]
pub enum BbrVersion {
    /// BBRv1. The BDP target is used as computed.
    V1 = 0,

    /// BBRv2. The BDP target is rounded up to an even number of segments,
    /// so that a receiver acking every other segment is not starved.
    V2 = 1,

    /// BBRv3. The window target follows BBRv2.
    #[default]
    V3 = 2,
}

impl BbrVersion {
    /// Return whether the window target is rounded up to an even number of
    /// segments.
    pub fn rounds_target_to_even(&self) -> bool {
        !matches!(self, BbrVersion::V1)
    }
}

impl FromStr for BbrVersion {
    type Err = Error;

    fn from_str(version: &str) -> Result<BbrVersion> {
        if version.eq_ignore_ascii_case("bbr") || version.eq_ignore_ascii_case("v1") {
            Ok(BbrVersion::V1)
        } else if version.eq_ignore_ascii_case("bbr2") || version.eq_ignore_ascii_case("v2") {
            Ok(BbrVersion::V2)
        } else if version.eq_ignore_ascii_case("bbr3") || version.eq_ignore_ascii_case("v3") {
            Ok(BbrVersion::V3)
        } else {
            Err(Error::InvalidConfig("unknown".into()))
        }
    }
}

impl TryFrom<u8> for BbrVersion {
    type Error = Error;

    fn try_from(mode: u8) -> Result<BbrVersion> {
        match mode {
            0 => Ok(BbrVersion::V1),
            1 => Ok(BbrVersion::V2),
            2 => Ok(BbrVersion::V3),
            _ => Err(Error::InvalidConfig(format!("bbr_mode {}", mode))),
        }
    }
}

/// Congestion control events reported by the host.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum CaEvent {
    /// First transmission when no packets are in flight.
    TxStart,

    /// Congestion window restart after idle.
    CwndRestart,

    /// End of congestion window reduction.
    CompleteCwr,

    /// Loss timeout.
    Loss,

    /// ECN CE marked packet received.
    EcnIsCe,

    /// ECN non-CE marked packet received.
    EcnNoCe,
}

/// Congestion control interfaces between the host transport and an
/// algorithm instance.
///
/// The host creates one instance per connection and delivers events to it
/// one at a time. None of the callbacks may fail.
pub trait CongestionController {
    /// Name of congestion control algorithm.
    fn name(&self) -> &str;

    /// Callback for processing a delivery rate sample, after the host has
    /// handled an acknowledgment. `in_flight` is the number of segments in
    /// flight reported by the host.
    fn on_sample(&mut self, rs: &RateSample, in_flight: u32, now: Instant);

    /// Callback for congestion control events.
    fn on_cwnd_event(&mut self, event: CaEvent, app_limited: bool) {}

    /// Callback for each batch of acknowledged packets.
    fn on_pkts_acked(&mut self, acked: u32, rtt: Option<Duration>) {}

    /// Callback for the classic congestion avoidance hook.
    fn cong_avoid(&mut self, ack: u32, acked: u32) {}

    /// Slow start threshold to apply after a loss, given the current one.
    fn ssthresh(&self, current: u32) -> u32 {
        current
    }

    /// Congestion window to restore when the host undoes a reduction.
    fn undo_cwnd(&self) -> u32;

    /// Current congestion window in segments.
    fn congestion_window(&self) -> u32;

    /// Current pacing rate in bytes per second estimated by the algorithm.
    /// If the algorithm does not estimate pacing rate, return None.
    fn pacing_rate(&self) -> Option<u64> {
        None
    }

    /// Initial congestion window in segments.
    fn initial_window(&self) -> u32;

    /// Minimal congestion window in segments.
    fn minimal_window(&self) -> u32;

    /// Check if in slow start.
    fn in_slow_start(&self) -> bool {
        false
    }

    /// Minimal number of segments per TSO burst.
    fn min_tso_segs(&self) -> u32 {
        1
    }

    /// Diagnostic record for the requested extensions. Return None if none
    /// of the requested extensions is supported.
    fn get_info(&self, ext: BitFlags<DiagExtension>) -> Option<BbrInfo> {
        None
    }

    /// Write the diagnostic record for the requested extensions into `buf`.
    /// Return the attribute of the record and the number of bytes written,
    /// or `Error::Done` if none of the requested extensions is supported.
    fn write_info(&self, ext: BitFlags<DiagExtension>, buf: &mut [u8]) -> Result<(u16, usize)> {
        match self.get_info(ext) {
            Some(info) => Ok((BbrInfo::ATTR, info.encode(buf)?)),
            None => Err(Error::Done),
        }
    }
}

impl fmt::Debug for dyn CongestionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "congestion controller {}.", self.name())
    }
}

/// Build a congestion controller for a new connection.
pub fn build_congestion_controller(conf: &Config, now: Instant) -> Box<dyn CongestionController> {
    Box::new(Bbr3::new(Bbr3Config::from(conf), now))
}


#[path = "bbr3/bbr3.rs"]
mod bbr3;

mod bandwidth;
mod min_rtt;
mod rate_sample;
