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

#![no_main]

use std::time::Duration;
use std::time::Instant;

use libfuzzer_sys::fuzz_target;

use tcp_bbr3::Bbr3;
use tcp_bbr3::Bbr3Config;
use tcp_bbr3::CongestionController;
use tcp_bbr3::RateSample;
use tcp_bbr3::MIN_CWND;

const CWND_CLAMP: u32 = 1000;

// Each sample is made of 16 bytes: delivered, interval, rtt, time step,
// acked, in_flight and flags.
fuzz_target!(|data: &[u8]| {
    let mut conf = tcp_bbr3::Config::new();
    conf.set_cwnd_clamp(CWND_CLAMP);

    let start = Instant::now();
    let mut bbr = Bbr3::new(Bbr3Config::from(&conf), start);
    let mut now = start;

    for chunk in data.chunks_exact(16) {
        let delivered = i16::from_le_bytes([chunk[0], chunk[1]]) as i64;
        let interval_us = i32::from_le_bytes([chunk[2], chunk[3], chunk[4], chunk[5]]) as i64;
        let rtt_us = u32::from_le_bytes([chunk[6], chunk[7], chunk[8], 0]);
        let step_us = u16::from_le_bytes([chunk[9], chunk[10]]) as u64 * 100;
        let acked = u16::from_le_bytes([chunk[11], chunk[12]]) as u32;
        let in_flight = u16::from_le_bytes([chunk[13], chunk[14]]) as u32;
        let flags = chunk[15];

        let rtt = if flags & 1 != 0 {
            Some(Duration::from_micros(rtt_us as u64))
        } else {
            None
        };
        let rs = RateSample::new(delivered, interval_us, rtt, acked, flags & 2 != 0);

        now += Duration::from_micros(step_us);
        bbr.on_sample(&rs, in_flight, now);

        let cwnd = bbr.congestion_window();
        assert!((MIN_CWND..=CWND_CLAMP).contains(&cwnd));
        assert_eq!(bbr.snapshot().cwnd, cwnd);
    }
});
