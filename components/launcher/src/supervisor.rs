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

//! Supervisor lifecycle (C9): construction, the three worker loops, and the
//! eight-step graceful shutdown sequence from `SPEC_FULL.md` §4.9.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use sv_protocol::Listener;

use acceptor;
use clients::{self, Clients};
use config;
use error::{Error, Result};
use spawner::Spawner;
use table::{self, Tables};

pub struct Supervisor {
    config_path: PathBuf,
    tables: Arc<Tables>,
    clients: Arc<Clients>,
    active: Arc<AtomicBool>,
    acceptor: JoinHandle<()>,
    receiver: JoinHandle<()>,
    control: JoinHandle<()>,
}

impl Supervisor {
    /// Construction: open the listener, replay the boot config into `Run`,
    /// and spawn the acceptor, receiver, and control-loop threads. Any
    /// failure here is fatal, per §4.9.
    pub fn start(port: u16, config_path: PathBuf, agent_binary: String) -> Result<Supervisor> {
        let listener = Listener::bind(port).map_err(|e| {
            error!("unable to bind control listener on port {}: {}", port, e);
            Error::Bind(e)
        })?;
        info!("control listener bound on 127.0.0.1:{}", port);

        let tables = Arc::new(Tables::new());
        match config::load(&config_path) {
            Ok(entries) => {
                for (name, cfg) in entries {
                    debug!("boot replay: seeding '{}' into Run", name);
                    tables.seed_run(name, cfg);
                }
            }
            Err(err) => warn!("boot config unreadable, starting with an empty boot list: {}", err),
        }

        let clients = Arc::new(Clients::new());
        let active = Arc::new(AtomicBool::new(true));
        let spawner = Spawner::new(agent_binary, port);

        let acceptor = {
            let active = active.clone();
            let tables = tables.clone();
            let clients = clients.clone();
            thread::Builder::new()
                .name("acceptor".into())
                .spawn(move || acceptor::run(listener, active, tables, clients))
                .map_err(Error::ThreadSpawn)?
        };
        let receiver = {
            let active = active.clone();
            let tables = tables.clone();
            let clients = clients.clone();
            thread::Builder::new()
                .name("receiver".into())
                .spawn(move || clients::run(clients, tables, active))
                .map_err(Error::ThreadSpawn)?
        };
        let control = {
            let active = active.clone();
            let tables = tables.clone();
            thread::Builder::new()
                .name("control".into())
                .spawn(move || table::run(tables, spawner, active))
                .map_err(Error::ThreadSpawn)?
        };

        Ok(Supervisor {
            config_path,
            tables,
            clients,
            active,
            acceptor,
            receiver,
            control,
        })
    }

    /// Drive the eight-step shutdown sequence from §4.9. Blocks until every
    /// worker thread has joined and every pending waiter has been resolved.
    pub fn shutdown(self) {
        info!("shutdown requested");

        // 1. Stop admitting new work.
        self.active.store(false, Ordering::SeqCst);

        // 2. The receiver loop observes `active` at the top of its next
        //    pass (after one last drain of any already-available command)
        //    and exits.
        if self.receiver.join().is_err() {
            warn!("receiver loop thread panicked during shutdown");
        }

        // 3. The acceptor loop observes `active` inside `Listener::accept`
        //    (it polls the flag between non-blocking accept attempts).
        if self.acceptor.join().is_err() {
            warn!("acceptor loop thread panicked during shutdown");
        }

        // 4. Persist the boot config. A failure here is logged as data
        //    loss, per the error taxonomy in §7, not propagated.
        let boot = self.tables.boot_snapshot();
        if let Err(err) = config::save(&self.config_path, &boot) {
            warn!("failed to persist boot config, data loss: {}", err);
        } else {
            info!("boot config persisted with {} entries", boot.len());
        }

        // 5. Ask every live process to stop.
        self.tables.stop_all_main();

        // 6. The control loop keeps ticking Phase T/M until Main drains,
        //    then exits on its own (see `table::run`).
        if self.control.join().is_err() {
            warn!("control loop thread panicked during shutdown");
        }

        // 7. Anything still pending past the control loop's own drain
        //    (e.g. a Load that never got an agent report) is failed now.
        self.tables.fail_all_waiters();

        // 8. Close out every client connection and its handler thread.
        self.clients.shutdown();

        info!("shutdown complete");
    }
}
