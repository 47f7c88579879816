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

//! Error type for congestion control registration and diagnostics.
//!
//! Nothing on the per-ACK path returns an error: degenerate samples are
//! ignored and the window is always left valid.

/// BBR3 error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// The configuration is invalid.
    InvalidConfig(String),

    /// The per-connection state does not fit the private slot reserved for
    /// it by the host.
    StateTooLarge {
        /// Size of the per-connection state in bytes.
        size: usize,

        /// Size of the reserved slot in bytes.
        budget: usize,
    },

    /// The provided buffer is too short.
    BufferTooShort,

    /// There is no data to produce.
    Done,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}
