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

//! Client RPC handlers (C8): one atomic operation per command, dispatched
//! off the command code read from the wire. A handler consumes its input
//! record and writes exactly one response record before returning; it never
//! loops back for a second command on its own — the receiver loop (C6)
//! spawns a fresh handler for each subsequent command it sees available on
//! the same connection.

use sv_protocol::{Command, Connection, ProcessConfig, TerminationOutcome};

use error::Result;
use table::Tables;

/// Sentinel written in place of a real response for the reserved
/// `GetConfig`/`SetConfig` codes, so a client that sends them gets a
/// well-formed reply rather than a dropped connection.
const NOT_IMPLEMENTED: i32 = -1;

/// Read one command off `conn` and serve it. Returns `Err` only on a
/// transport failure (the connection should be dropped by the caller);
/// application-level outcomes (duplicate requests, unknown targets, ...)
/// are always written back as a normal response record.
pub fn dispatch(conn: &mut Connection, tables: &Tables) -> Result<()> {
    let code = conn.recv_i32()?;
    match Command::from_i32(code) {
        Some(Command::Load) => handle_load(conn, tables),
        Some(Command::Stop) => handle_stop(conn, tables),
        Some(Command::Rerun) => handle_rerun(conn, tables),
        Some(Command::IsRunning) => handle_is_running(conn, tables),
        Some(Command::GetPid) => handle_get_pid(conn, tables),
        Some(Command::GetConfig) | Some(Command::SetConfig) => {
            debug!("reserved command {} dispatched; replying NotImplemented", code);
            conn.send_i32(NOT_IMPLEMENTED)?;
            Ok(())
        }
        None => {
            warn!("client sent unknown command code {}", code);
            Err(::error::Error::UnknownCommand(code))
        }
    }
}

fn handle_load(conn: &mut Connection, tables: &Tables) -> Result<()> {
    let name = conn.recv_string()?;
    let argc = conn.recv_i32()? as usize;
    let launch_on_boot = conn.recv_bool()?;
    let term_rerun = conn.recv_bool()?;
    let time_to_stop_ms = conn.recv_i32()?;
    let wait = conn.recv_bool()?;
    let mut args = Vec::with_capacity(argc);
    for _ in 0..argc {
        args.push(conn.recv_string()?);
    }
    let time_to_stop_ms = if time_to_stop_ms <= 0 { None } else { Some(time_to_stop_ms as u64) };
    let config = ProcessConfig::new(args, launch_on_boot, term_rerun, time_to_stop_ms);

    debug!("Load '{}' (wait={})", name, wait);
    let (immediate, rx) = tables.load(name, config, wait);
    let result = match immediate {
        Some(result) => result,
        None => match rx {
            Some(rx) => rx.wait().unwrap_or(false),
            None => true,
        },
    };
    conn.send_bool(result)?;
    Ok(())
}

fn handle_stop(conn: &mut Connection, tables: &Tables) -> Result<()> {
    let name = conn.recv_string()?;
    let wait = conn.recv_bool()?;

    debug!("Stop '{}' (wait={})", name, wait);
    let (immediate, rx) = tables.stop(name, wait);
    let outcome = match immediate {
        Some(outcome) => outcome,
        None => match rx {
            Some(rx) => rx.wait().unwrap_or(TerminationOutcome::TermError),
            None => TerminationOutcome::NoCheck,
        },
    };
    conn.send_i32(outcome.to_i32())?;
    Ok(())
}

fn handle_rerun(conn: &mut Connection, tables: &Tables) -> Result<()> {
    let name = conn.recv_string()?;
    let wait = conn.recv_bool()?;

    debug!("Rerun '{}' (wait={})", name, wait);
    let config = match tables.main_config(&name) {
        Some(config) => config,
        None => {
            conn.send_bool(false)?;
            return Ok(());
        }
    };

    // The blocking Stop always waits, regardless of the RPC's own `wait`
    // flag, so the subsequent Load never races the old instance's exit.
    let (immediate, rx) = tables.stop(name.clone(), true);
    let _ = match immediate {
        Some(outcome) => outcome,
        None => rx.and_then(|rx| rx.wait()).unwrap_or(TerminationOutcome::TermError),
    };

    let (immediate, rx) = tables.load(name, config, wait);
    let result = match immediate {
        Some(result) => result,
        None => match rx {
            Some(rx) => rx.wait().unwrap_or(false),
            None => true,
        },
    };
    conn.send_bool(result)?;
    Ok(())
}

fn handle_is_running(conn: &mut Connection, tables: &Tables) -> Result<()> {
    let name = conn.recv_string()?;
    conn.send_bool(tables.is_running(&name))?;
    Ok(())
}

fn handle_get_pid(conn: &mut Connection, tables: &Tables) -> Result<()> {
    let name = conn.recv_string()?;
    conn.send_i32(tables.get_pid(&name))?;
    Ok(())
}
