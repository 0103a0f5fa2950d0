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

//! The acceptor loop (C5): accepts connections off the single control
//! listener and routes each to either the long-lived client path or the
//! one-shot agent-report path, keyed off a one-byte (well, one-`i32`) role
//! tag read as the very first frame. See `SPEC_FULL.md` §4.5.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use sv_protocol::{Connection, Error as ProtoError, Listener, Role};

use clients::Clients;
use table::Tables;

pub fn run(listener: Listener, active: Arc<AtomicBool>, tables: Arc<Tables>, clients: Arc<Clients>) {
    loop {
        match listener.accept(&active) {
            Ok(conn) => {
                let tables = tables.clone();
                let clients = clients.clone();
                thread::spawn(move || handle_new_connection(conn, &tables, &clients));
            }
            Err(ProtoError::ConnectionBreak) => {
                info!("acceptor loop exiting: listener closed");
                break;
            }
            Err(err) => {
                warn!("transient accept error: {}", err);
                continue;
            }
        }
    }
}

fn handle_new_connection(mut conn: Connection, tables: &Tables, clients: &Clients) {
    let role = match conn.recv_i32() {
        Ok(raw) => raw,
        Err(err) => {
            debug!("connection dropped before role handshake: {}", err);
            return;
        }
    };
    match Role::from_i32(role) {
        Some(Role::Client) => clients.register(conn),
        Some(Role::Agent) => handle_agent_report(conn, tables),
        None => warn!("connection sent unknown role tag {}", role),
    }
}

/// §4.5c: a single `(name, pid, error)` record, answered with one `bool`
/// telling the agent whether to proceed with `exec`. The agent never reads
/// a reply on its post-exec-failure path, so a write failure here is
/// logged and swallowed rather than propagated.
fn handle_agent_report(mut conn: Connection, tables: &Tables) {
    let report = (|| -> Result<(String, i32, i32), ProtoError> {
        let name = conn.recv_string()?;
        let pid = conn.recv_i32()?;
        let error = conn.recv_i32()?;
        Ok((name, pid, error))
    })();

    match report {
        Ok((name, pid, error)) => {
            let should_run = tables.agent_report(&name, pid, error);
            if let Err(err) = conn.send_bool(should_run) {
                warn!("best-effort reply to agent for '{}' failed: {}", name, err);
            }
        }
        Err(err) => debug!("agent report connection dropped mid-read: {}", err),
    }
    let _ = conn.close();
}
