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

//! The client registry (`clients`) and receiver loop (C6).
//!
//! Per `SPEC_FULL.md` §9's design note, a client connection is never
//! shared with a worker thread as a borrowed position in a list (the
//! source's "pointer-to-iterator" hazard). Instead each registered client
//! gets a stable integer handle and a slot holding the connection behind a
//! `Mutex` plus an `AtomicBool` the handler flips on completion; the
//! receiver loop only ever touches slots through that handle.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use sv_protocol::Connection;

use handlers;
use table::{Tables, LOOP_WAIT};

type ClientId = usize;

struct ClientSlot {
    conn: Arc<Mutex<Connection>>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

#[derive(Default)]
pub struct Clients {
    next_id: AtomicUsize,
    slots: Mutex<HashMap<ClientId, ClientSlot>>,
}

impl Clients {
    pub fn new() -> Self {
        Clients::default()
    }

    /// Called from the acceptor (C5) once a connection's role handshake
    /// reads `Client`. The connection is now long-lived: the receiver loop
    /// polls it for availability and spawns one handler per command.
    pub fn register(&self, conn: Connection) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let slot = ClientSlot {
            conn: Arc::new(Mutex::new(conn)),
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        };
        self.slots.lock().unwrap().insert(id, slot);
    }

    pub fn client_count(&self) -> usize {
        self.slots.lock().unwrap().len()
    }

    /// Shutdown step 8: close every registered connection and join its
    /// handler thread, if one is still running.
    pub fn shutdown(&self) {
        let mut slots = self.slots.lock().unwrap();
        for (_, slot) in slots.iter_mut() {
            let _ = slot.conn.lock().unwrap().close();
            if let Some(handle) = slot.handle.take() {
                let _ = handle.join();
            }
        }
        slots.clear();
    }

    /// One receiver-loop pass (§4.6): for each idle slot, reap its last
    /// handler, drop the slot if the connection is gone, otherwise spawn a
    /// handler if a full command is already readable.
    fn tick(&self, tables: &Arc<Tables>) {
        let mut dead = Vec::new();
        let mut to_spawn = Vec::new();
        {
            let mut slots = self.slots.lock().unwrap();
            for (&id, slot) in slots.iter_mut() {
                if slot.running.load(Ordering::SeqCst) {
                    continue;
                }
                if let Some(handle) = slot.handle.take() {
                    let _ = handle.join();
                }
                let available = {
                    let conn = slot.conn.lock().unwrap();
                    conn.is_available()
                };
                match available {
                    Ok(true) => to_spawn.push(id),
                    Ok(false) => {}
                    Err(err) => {
                        debug!("client {} connection gone: {}", id, err);
                        dead.push(id);
                    }
                }
            }
            for id in &to_spawn {
                let slot = slots.get_mut(id).unwrap();
                slot.running.store(true, Ordering::SeqCst);
                let conn = slot.conn.clone();
                let running = slot.running.clone();
                let tables = tables.clone();
                slot.handle = Some(thread::spawn(move || {
                    let mut conn = conn.lock().unwrap();
                    if let Err(err) = handlers::dispatch(&mut conn, &tables) {
                        debug!("client handler ended: {}", err);
                    }
                    running.store(false, Ordering::SeqCst);
                }));
            }
            for id in &dead {
                slots.remove(id);
            }
        }
    }
}

/// The receiver loop itself (C6): runs `Clients::tick` every `LoopWait`
/// while `active`, plus one final pass after `active` flips false so any
/// in-flight command still gets picked up before shutdown closes things
/// down around it.
pub fn run(clients: Arc<Clients>, tables: Arc<Tables>, active: Arc<AtomicBool>) {
    loop {
        clients.tick(&tables);
        if !active.load(Ordering::SeqCst) {
            break;
        }
        thread::sleep(LOOP_WAIT);
    }
}
