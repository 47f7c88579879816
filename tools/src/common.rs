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

use std::fs::File;
use std::io::BufRead;
use std::time::Duration;
use std::time::Instant;

use log::debug;
use serde::Deserialize;
use serde::Serialize;

use tcp_bbr3::Bbr3;
use tcp_bbr3::Bbr3Config;
use tcp_bbr3::Bbr3Snapshot;
use tcp_bbr3::CaEvent;
use tcp_bbr3::CongestionController;
use tcp_bbr3::RateSample;

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// One event of a recorded connection, as a line of JSON.
///
/// ```text
/// {"t_us":10000,"delivered":20,"interval_us":10000,"rtt_us":10000,"acked":20,"in_flight":10}
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct TraceRecord {
    /// Time of the event in microseconds since the start of the trace.
    pub t_us: u64,

    /// Segments delivered over the sampling interval.
    pub delivered: i64,

    /// Length of the sampling interval in microseconds.
    pub interval_us: i64,

    /// RTT sample in microseconds, if measured.
    #[serde(default)]
    pub rtt_us: Option<u64>,

    /// Segments newly acknowledged or SACKed.
    #[serde(default)]
    pub acked: u32,

    /// Segments in flight.
    #[serde(default)]
    pub in_flight: u32,

    /// Whether the sender was application-limited.
    #[serde(default)]
    pub app_limited: bool,

    /// Whether transmission restarted from idle before this sample.
    #[serde(default)]
    pub tx_start: bool,
}

impl TraceRecord {
    pub fn rate_sample(&self) -> RateSample {
        RateSample::new(
            self.delivered,
            self.interval_us,
            self.rtt_us.map(Duration::from_micros),
            self.acked,
            self.app_limited,
        )
    }
}

/// Read a trace of JSON lines. Blank lines and lines starting with `#` are
/// skipped.
pub fn parse_trace<R: BufRead>(reader: R) -> Result<Vec<TraceRecord>> {
    let mut records = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let record: TraceRecord = serde_json::from_str(line)
            .map_err(|e| format!("line {}: {}", i + 1, e))?;
        records.push(record);
    }

    debug!("parsed {} trace records", records.len());
    Ok(records)
}

/// Output line of the replay.
#[derive(Clone, Debug, Serialize)]
pub struct ReplayLine {
    pub t_us: u64,

    #[serde(flatten)]
    pub snapshot: Bbr3Snapshot,
}

/// Feed trace records to a connection one at a time.
pub struct Replay {
    bbr: Bbr3,
    start: Instant,
}

impl Replay {
    pub fn new(config: Bbr3Config, start: Instant) -> Self {
        Replay {
            bbr: Bbr3::new(config, start),
            start,
        }
    }

    pub fn step(&mut self, record: &TraceRecord) -> ReplayLine {
        if record.tx_start {
            self.bbr
                .on_cwnd_event(CaEvent::TxStart, record.app_limited);
        }

        let now = self.start + Duration::from_micros(record.t_us);
        self.bbr
            .on_sample(&record.rate_sample(), record.in_flight, now);

        ReplayLine {
            t_us: record.t_us,
            snapshot: self.bbr.snapshot(),
        }
    }

    pub fn bbr(&self) -> &Bbr3 {
        &self.bbr
    }
}

/// Return the log target for the given log file, `stderr` if unspecified.
pub fn log_target(log_file: &Option<String>) -> Result<env_logger::Target> {
    if let Some(log_file) = log_file {
        let file = File::create(log_file)?;
        return Ok(env_logger::Target::Pipe(Box::new(file)));
    }
    Ok(env_logger::Target::Stderr)
}
