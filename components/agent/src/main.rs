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

//! The agent helper (C14): `sv-agent <port> <name> [arg1 arg2 ...]`.
//!
//! Grounded on `original_source/source/launch_agent.cpp` in full: connect
//! to the supervisor, report this process's own pid, wait for a `should_run`
//! reply, then `exec` the target in place so the reported pid stays valid.
//! The original's post-exec-failure report reconnects to port 0 (a bug in
//! the source); this binary reconnects to the same supervisor port instead,
//! per `SPEC_FULL.md` §13.

extern crate env_logger;
#[macro_use]
extern crate log;
extern crate sv_protocol;

use std::os::unix::process::CommandExt;
use std::process::{self, Command};

use sv_protocol::{Connection, Role};

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!("usage: {} <port> <bin_name> [arg1 arg2 ...]", args.get(0).map(String::as_str).unwrap_or("sv-agent"));
        process::exit(1);
    }
    let port: u16 = match args[1].parse() {
        Ok(p) => p,
        Err(_) => {
            eprintln!("invalid port: {}", args[1]);
            process::exit(1);
        }
    };
    let bin_name = &args[2];
    let bin_args = &args[3..];
    let pid = process::id() as i32;

    match report(port, bin_name, pid, 0) {
        Ok(true) => {}
        Ok(false) => {
            debug!("supervisor declined to run '{}'", bin_name);
            process::exit(0);
        }
        Err(err) => {
            warn!("unable to reach supervisor on port {}: {}", port, err);
            process::exit(2);
        }
    }

    // `exec` replaces this process's image in place; if it returns at all,
    // it failed, and our own pid is still the one the supervisor recorded.
    let exec_err = Command::new(bin_name).args(bin_args).exec();
    let errno = exec_err.raw_os_error().unwrap_or(-1);
    warn!("exec of '{}' failed: {}", bin_name, exec_err);

    if let Err(err) = report(port, bin_name, pid, errno) {
        warn!("unable to report exec failure to supervisor: {}", err);
    }
    process::exit(3);
}

/// One `(name, pid, error)` report over a fresh connection. Returns the
/// `should_run` reply when `error == 0` (the pre-exec report); the
/// post-exec-failure report (`error != 0`) never reads a reply, matching
/// the original's fire-and-forget second connection, so this always
/// returns `true` in that case without blocking on a read.
fn report(port: u16, name: &str, pid: i32, error: i32) -> sv_protocol::Result<bool> {
    let mut conn = Connection::connect(port)?;
    conn.send_i32(Role::Agent.to_i32())?;
    conn.send_string(name)?;
    conn.send_i32(pid)?;
    conn.send_i32(error)?;
    if error != 0 {
        let _ = conn.close();
        return Ok(true);
    }
    let should_run = conn.recv_bool()?;
    let _ = conn.close();
    Ok(should_run)
}
