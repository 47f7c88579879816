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

//! Registration of the algorithm with a host transport.

use std::time::Instant;

use log::*;

use crate::congestion_control::build_congestion_controller;
use crate::Bbr3;
use crate::CongestionController;
use crate::Config;
use crate::Error;
use crate::Result;
use crate::CA_PRIV_SIZE;

/// Name the algorithm is registered under.
pub const CA_NAME: &str = "bbr3";

/// Algorithm version string.
pub const BBR3_VERSION: &str = "3.0";

// The state must fit the default private slot.
const _: () = assert!(std::mem::size_of::<Bbr3>() <= CA_PRIV_SIZE);

/// A registered algorithm, used to set up new connections.
#[derive(Debug)]
pub struct Registration {
    config: Config,
}

impl Registration {
    pub fn name(&self) -> &'static str {
        CA_NAME
    }

    pub fn version(&self) -> &'static str {
        BBR3_VERSION
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Create the congestion controller of a new connection.
    pub fn new_connection(&self, now: Instant) -> Box<dyn CongestionController> {
        build_congestion_controller(&self.config, now)
    }
}

/// Register the algorithm with the given defaults.
///
/// Fails if the per-connection state does not fit the private slot size of
/// `conf`, in which case no connection may use the algorithm.
pub fn register(conf: &Config) -> Result<Registration> {
    check_state_size(std::mem::size_of::<Bbr3>(), conf.ca_priv_size())?;

    info!(
        "TCP BBRv3: Bottleneck Bandwidth and RTT v{}",
        BBR3_VERSION
    );
    info!(
        "TCP BBRv3: Mode set to {} (0=BBRv1, 1=BBRv2, 2=BBRv3)",
        conf.bbr_version() as u8
    );

    Ok(Registration {
        config: conf.clone(),
    })
}

fn check_state_size(size: usize, budget: usize) -> Result<()> {
    if size > budget {
        error!(
            "{} state of {} bytes exceeds the private slot of {} bytes",
            CA_NAME, size, budget
        );
        return Err(Error::StateTooLarge { size, budget });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BbrVersion;

    #[test]
    fn register_default() -> Result<()> {
        let mut conf = Config::new();
        conf.set_bbr_version(BbrVersion::V2);
        conf.set_initial_cwnd(12);

        let reg = register(&conf)?;
        assert_eq!(reg.name(), "bbr3");
        assert_eq!(reg.version(), "3.0");
        assert_eq!(reg.config().bbr_version(), BbrVersion::V2);

        // Each connection gets its own state.
        let now = Instant::now();
        let mut a = reg.new_connection(now);
        let b = reg.new_connection(now);
        let rs = crate::RateSample::new(20, 10_000, None, 20, false);
        a.on_sample(&rs, 10, now);
        assert_eq!(a.congestion_window(), 32);
        assert_eq!(b.congestion_window(), 12);

        Ok(())
    }

    #[test]
    fn register_state_too_large() {
        let size = std::mem::size_of::<Bbr3>();

        let mut conf = Config::new();
        conf.set_ca_priv_size(size);
        assert!(register(&conf).is_ok());

        conf.set_ca_priv_size(size - 1);
        assert_eq!(
            register(&conf).unwrap_err(),
            Error::StateTooLarge {
                size,
                budget: size - 1
            }
        );

        assert_eq!(check_state_size(0, 0), Ok(()));
        assert!(check_state_size(257, CA_PRIV_SIZE).is_err());
    }
}
