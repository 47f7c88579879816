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

//! Connection introspection record, as exported to `ss`-style tools.

use bytes::Buf;
use bytes::BufMut;
use enumflags2::bitflags;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Diagnostic extensions a tool may request. Each flag is the bit
/// `1 << (attribute - 1)` of the matching attribute.
#[bitflags]
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiagExtension {
    MemInfo = 1 << 0,
    Info = 1 << 1,
    VegasInfo = 1 << 2,
    Cong = 1 << 3,
    Tos = 1 << 4,
    TClass = 1 << 5,
    SkMemInfo = 1 << 6,
    Shutdown = 1 << 7,
    DctcpInfo = 1 << 8,
    Protocol = 1 << 9,
    SkV6Only = 1 << 10,
    Locals = 1 << 11,
    Peers = 1 << 12,
    Pad = 1 << 13,
    Mark = 1 << 14,
    BbrInfo = 1 << 15,
}

/// BBR diagnostic record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BbrInfo {
    /// Lower 32 bits of the bandwidth estimate in bytes per second.
    pub bw_lo: u32,

    /// Upper 32 bits of the bandwidth estimate in bytes per second.
    pub bw_hi: u32,

    /// Min RTT in microseconds, `u32::MAX` if unknown.
    pub min_rtt: u32,

    /// Pacing gain shifted left 8 bits.
    pub pacing_gain: u32,

    /// Cwnd gain shifted left 8 bits.
    pub cwnd_gain: u32,
}

impl BbrInfo {
    /// Attribute identifying the record in a diagnostic reply.
    pub const ATTR: u16 = 16;

    /// Encoded length of the record in bytes.
    pub const LEN: usize = 20;

    pub fn new(bw: u64, min_rtt: u32, pacing_gain: u32, cwnd_gain: u32) -> Self {
        Self {
            bw_lo: bw as u32,
            bw_hi: (bw >> 32) as u32,
            min_rtt,
            pacing_gain,
            cwnd_gain,
        }
    }

    /// Bandwidth estimate in bytes per second.
    pub fn bw(&self) -> u64 {
        (self.bw_hi as u64) << 32 | self.bw_lo as u64
    }

    /// Write the record in little-endian byte order, and return the number
    /// of bytes written.
    pub fn encode(&self, mut buf: &mut [u8]) -> Result<usize> {
        if buf.remaining_mut() < Self::LEN {
            return Err(Error::BufferTooShort);
        }

        buf.put_u32_le(self.bw_lo);
        buf.put_u32_le(self.bw_hi);
        buf.put_u32_le(self.min_rtt);
        buf.put_u32_le(self.pacing_gain);
        buf.put_u32_le(self.cwnd_gain);
        Ok(Self::LEN)
    }

    /// Read a record written by [`BbrInfo::encode`].
    pub fn decode(mut buf: &[u8]) -> Result<BbrInfo> {
        if buf.remaining() < Self::LEN {
            return Err(Error::BufferTooShort);
        }

        Ok(BbrInfo {
            bw_lo: buf.get_u32_le(),
            bw_hi: buf.get_u32_le(),
            min_rtt: buf.get_u32_le(),
            pacing_gain: buf.get_u32_le(),
            cwnd_gain: buf.get_u32_le(),
        })
    }
}
