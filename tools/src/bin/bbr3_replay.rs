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
use std::io::stdin;
use std::io::stdout;
use std::io::BufReader;
use std::io::Write;
use std::time::Instant;

use clap::Parser;
use log::*;

use tcp_bbr3::Bbr3Config;
use tcp_bbr3::BbrVersion;
use tcp_bbr3::Config;
use tcp_bbr3_tools::Replay;
use tcp_bbr3_tools::Result;

#[derive(Parser, Debug, Clone)]
#[clap(name = "bbr3_replay")]
pub struct ReplayOpt {
    /// Trace file of JSON lines. If no file is specified, the trace is read
    /// from `stdin`.
    #[clap(value_name = "FILE")]
    pub trace_file: Option<String>,

    /// Algorithm version, support bbr/bbr2/bbr3.
    #[clap(long, default_value = "bbr3", value_name = "STR")]
    pub bbr_version: BbrVersion,

    /// Initial congestion window in segments.
    #[clap(long, default_value = "10", value_name = "NUM")]
    pub initial_cwnd: u32,

    /// Upper clamp of the congestion window in segments.
    #[clap(long, default_value = "65535", value_name = "NUM")]
    pub cwnd_clamp: u32,

    /// Maximum segment size in bytes.
    #[clap(long, default_value = "1448", value_name = "NUM")]
    pub mss: u32,

    /// Length of the min RTT filter window in seconds.
    #[clap(long, default_value = "5", value_name = "NUM")]
    pub min_rtt_win_sec: u32,

    /// Duration of the ProbeRTT phase in milliseconds.
    #[clap(long, default_value = "200", value_name = "NUM")]
    pub probe_rtt_duration: u64,

    /// Disable restoring the pre-probe window when ProbeRTT ends.
    #[clap(long)]
    pub disable_fast_convergence: bool,

    /// Leave Drain when inflight falls to the BDP rather than to the window
    /// reduction target.
    #[clap(long)]
    pub disable_drain_to_target: bool,

    /// Log level, support OFF/ERROR/WARN/INFO/DEBUG/TRACE.
    #[clap(long, default_value = "INFO", value_name = "STR")]
    pub log_level: log::LevelFilter,

    /// Log file path. If no file is specified, logs will be written to `stderr`.
    #[clap(long, value_name = "FILE")]
    pub log_file: Option<String>,
}

fn build_config(option: &ReplayOpt) -> Config {
    let mut conf = Config::new();
    conf.set_bbr_version(option.bbr_version);
    conf.set_cwnd_clamp(option.cwnd_clamp);
    conf.set_initial_cwnd(option.initial_cwnd);
    conf.set_mss(option.mss);
    conf.set_min_rtt_win_sec(option.min_rtt_win_sec);
    conf.set_probe_rtt_duration(option.probe_rtt_duration);
    conf.set_fast_convergence(!option.disable_fast_convergence);
    conf.set_drain_to_target(!option.disable_drain_to_target);
    conf
}

fn main() -> Result<()> {
    let option = ReplayOpt::parse();

    env_logger::builder()
        .target(tcp_bbr3_tools::log_target(&option.log_file)?)
        .filter_level(option.log_level)
        .format_timestamp_millis()
        .init();

    let conf = build_config(&option);
    let registration = tcp_bbr3::register(&conf)?;

    let records = match &option.trace_file {
        Some(path) => tcp_bbr3_tools::parse_trace(BufReader::new(File::open(path)?))?,
        None => tcp_bbr3_tools::parse_trace(stdin().lock())?,
    };

    let mut replay = Replay::new(Bbr3Config::from(registration.config()), Instant::now());
    let mut out = stdout().lock();
    for record in records.iter() {
        let line = replay.step(record);
        writeln!(out, "{}", serde_json::to_string(&line)?)?;
    }

    info!(
        "replayed {} records, final phase {:?} cwnd {}",
        records.len(),
        replay.bbr().phase(),
        replay.bbr().snapshot().cwnd
    );
    Ok(())
}
