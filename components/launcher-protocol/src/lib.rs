// Copyright (c) 2017 Chef Software Inc. and/or applicable contributors
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

//! Wire protocol shared by the supervisor daemon, the client library, and
//! the agent binary: a small hand-rolled framing over `TcpStream` (no
//! protobuf/ipc-channel — those belong to the generated message types this
//! crate used to carry, which assumed a local IPC pipe to a child process,
//! not a TCP control channel to remote clients and agents).

#[macro_use]
extern crate log;

pub mod error;
pub mod transport;
pub mod types;

pub use error::{Error, Result};
pub use transport::{Connection, Listener};
pub use types::{Command, ProcessConfig, Role, TerminationOutcome};
