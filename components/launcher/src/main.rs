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

//! `supervisor <port> <config_file> <agent_binary>` — see `SPEC_FULL.md` §6/§12.
//! No flags; `RUST_LOG` is the only environment override, consumed by
//! `env_logger`.

extern crate env_logger;
#[macro_use]
extern crate log;
extern crate libc;
extern crate sv_core;
extern crate sv_protocol;

mod acceptor;
mod clients;
mod config;
mod error;
mod handlers;
mod signals;
mod spawner;
mod supervisor;
mod table;
mod waiter;

use std::path::PathBuf;
use std::process;
use std::thread;
use std::time::Duration;

use supervisor::Supervisor;

const SIGNAL_POLL: Duration = Duration::from_millis(250);

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() != 4 {
        eprintln!("usage: {} <port> <config_file> <agent_binary>", args.get(0).map(String::as_str).unwrap_or("supervisor"));
        process::exit(1);
    }
    let port: u16 = match args[1].parse() {
        Ok(p) => p,
        Err(_) => {
            eprintln!("invalid port: {}", args[1]);
            process::exit(1);
        }
    };
    let config_path = PathBuf::from(&args[2]);
    let agent_binary = args[3].clone();

    signals::install();

    let supervisor = match Supervisor::start(port, config_path, agent_binary) {
        Ok(supervisor) => supervisor,
        Err(err) => {
            error!("{}", err);
            process::exit(1);
        }
    };

    while !signals::shutdown_requested() {
        thread::sleep(SIGNAL_POLL);
    }

    supervisor.shutdown();
    process::exit(0);
}
