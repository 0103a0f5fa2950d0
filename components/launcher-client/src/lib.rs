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

//! Typed Rust API over the supervisor's wire protocol (C13), grounded on
//! `original_source/include/clauncher-client.hpp` and
//! `source/clauncher-client.cpp`'s `CheckTcpClient` lazy-reconnect pattern.
//! Unlike the original, `args` travel as `argc` separate string records
//! (per `SPEC_FULL.md` §6/§13), not joined with a `Unite()`-style delimiter.

#[macro_use]
extern crate log;
extern crate sv_core;
extern crate sv_protocol;

use sv_protocol::{Command, Connection, ProcessConfig, Role, TerminationOutcome};

pub use sv_protocol::Error;
pub type Result<T> = ::std::result::Result<T, Error>;

/// A connection to a supervisor's control port. Reconnects lazily: a
/// `ConnectionBreak` surfaced by any call drops the underlying connection,
/// and the next call re-dials before retrying the exchange.
pub struct LauncherClient {
    port: u16,
    conn: Option<Connection>,
}

impl LauncherClient {
    /// Connect to a supervisor already listening on `port` and perform the
    /// `ROLE_CLIENT` handshake.
    pub fn connect(port: u16) -> Result<LauncherClient> {
        let mut client = LauncherClient { port, conn: None };
        client.ensure_connected()?;
        Ok(client)
    }

    fn ensure_connected(&mut self) -> Result<&mut Connection> {
        if self.conn.is_none() {
            debug!("(re)connecting to supervisor on port {}", self.port);
            let mut conn = Connection::connect(self.port)?;
            conn.send_i32(Role::Client.to_i32())?;
            self.conn = Some(conn);
        }
        Ok(self.conn.as_mut().unwrap())
    }

    /// Run `op` against the current connection, dropping it so the next
    /// call reconnects if `op` reports `ConnectionBreak`.
    fn with_conn<T, F>(&mut self, op: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let result = {
            let conn = self.ensure_connected()?;
            op(conn)
        };
        if let Err(Error::ConnectionBreak) = result {
            self.conn = None;
        }
        result
    }

    /// `Load` (command 0). See `SPEC_FULL.md` §4.8.
    pub fn load(&mut self, name: &str, config: &ProcessConfig, wait: bool) -> Result<bool> {
        self.with_conn(|conn| {
            conn.send_i32(Command::Load.to_i32())?;
            conn.send_string(name)?;
            conn.send_i32(config.args.len() as i32)?;
            conn.send_bool(config.launch_on_boot)?;
            conn.send_bool(config.term_rerun)?;
            conn.send_i32(config.time_to_stop_ms.map(|ms| ms as i32).unwrap_or(0))?;
            conn.send_bool(wait)?;
            for arg in &config.args {
                conn.send_string(arg)?;
            }
            conn.recv_bool()
        })
    }

    /// `Stop` (command 1).
    pub fn stop(&mut self, name: &str, wait: bool) -> Result<TerminationOutcome> {
        self.with_conn(|conn| {
            conn.send_i32(Command::Stop.to_i32())?;
            conn.send_string(name)?;
            conn.send_bool(wait)?;
            let code = conn.recv_i32()?;
            Ok(TerminationOutcome::from_i32(code).unwrap_or(TerminationOutcome::TermError))
        })
    }

    /// `Rerun` (command 2).
    pub fn rerun(&mut self, name: &str, wait: bool) -> Result<bool> {
        self.with_conn(|conn| {
            conn.send_i32(Command::Rerun.to_i32())?;
            conn.send_string(name)?;
            conn.send_bool(wait)?;
            conn.recv_bool()
        })
    }

    /// `IsRunning` (command 3).
    pub fn is_running(&mut self, name: &str) -> Result<bool> {
        self.with_conn(|conn| {
            conn.send_i32(Command::IsRunning.to_i32())?;
            conn.send_string(name)?;
            conn.recv_bool()
        })
    }

    /// `GetPid` (command 4). `None` means the binary has no live entry.
    pub fn get_pid(&mut self, name: &str) -> Result<Option<sv_core::Pid>> {
        self.with_conn(|conn| {
            conn.send_i32(Command::GetPid.to_i32())?;
            conn.send_string(name)?;
            let pid = conn.recv_i32()?;
            Ok(if pid == 0 { None } else { Some(pid as sv_core::Pid) })
        })
    }
}
