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

//! The process table trio (C3) and the control-loop phases that drive them
//! (C7). Lock ordering is a hard correctness property: acquire in the order
//! `MAIN < RUN < TERM < BOOT`; any code path may acquire a suffix of that
//! chain, never a prefix out of order. See `SPEC_FULL.md` §4.3/§9.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use sv_core::{is_alive, signal, Pid, Signal};
use sv_protocol::{ProcessConfig, TerminationOutcome};

use config::BinName;
use error::Error;
use spawner::Spawner;
use waiter::{waiter, WaiterRx, WaiterTx};

/// Upper bound on how long an agent has to report before its launch is
/// retried, and the pause between control-loop passes.
pub const LOOP_WAIT: Duration = Duration::from_millis(100);
pub const WAIT_TO_RERUN: Duration = Duration::from_millis(100);

pub struct RunEntry {
    pub config: ProcessConfig,
    pub pid: Option<Pid>,
    pub last_run: Option<Instant>,
    pub waiter: Option<WaiterTx<bool>>,
}

pub struct MainEntry {
    pub config: ProcessConfig,
    pub pid: Pid,
}

pub struct TermEntry {
    pub term_sent: Option<Instant>,
    pub waiter: Option<WaiterTx<TerminationOutcome>>,
}

#[derive(Default)]
pub struct Tables {
    main: Mutex<HashMap<BinName, MainEntry>>,
    run: Mutex<HashMap<BinName, RunEntry>>,
    term: Mutex<HashMap<BinName, TermEntry>>,
    boot: Mutex<Vec<(BinName, ProcessConfig)>>,
}

impl Tables {
    pub fn new() -> Self {
        Tables::default()
    }

    /// Seed the `Run` table directly at construction time, bypassing the
    /// waiter/duplicate-check machinery of `load()` — boot replay is not a
    /// client RPC and must not block daemon startup on any one entry.
    pub fn seed_run(&self, name: BinName, config: ProcessConfig) {
        let mut run = self.run.lock().unwrap();
        run.entry(name).or_insert_with(|| RunEntry {
            config,
            pid: None,
            last_run: None,
            waiter: None,
        });
    }

    // ---- C8 client RPC operations -------------------------------------

    /// `Load`. Returns `(immediate_result, waiter)`: `immediate_result` is
    /// `Some(false)` on a duplicate (no waiter created); otherwise `None`
    /// and the caller blocks on `waiter` when `wait` is true, or treats the
    /// request as fired-and-forget (success) when it is not.
    pub fn load(&self, name: BinName, config: ProcessConfig, wait: bool) -> (Option<bool>, Option<WaiterRx<bool>>) {
        let main = self.main.lock().unwrap();
        let mut run = self.run.lock().unwrap();
        if main.contains_key(&name) || run.contains_key(&name) {
            return (Some(false), None);
        }
        drop(main);

        let (tx, rx) = if wait {
            let (tx, rx) = waiter();
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };
        run.insert(
            name.clone(),
            RunEntry {
                config: config.clone(),
                pid: None,
                last_run: None,
                waiter: tx,
            },
        );
        drop(run);

        let mut boot = self.boot.lock().unwrap();
        boot.retain(|(n, _)| n != &name);
        if config.launch_on_boot {
            boot.push((name, config));
        }
        (None, rx)
    }

    /// `Stop`. Returns `Some(AlreadyTerminating)` immediately on a
    /// duplicate; otherwise `None` and a waiter (when `wait`), or nothing to
    /// wait on (the control loop will still process the request; a
    /// non-blocking stop reports `NoCheck` to the caller per the reference
    /// implementation's placeholder reply).
    pub fn stop(&self, name: BinName, wait: bool) -> (Option<TerminationOutcome>, Option<WaiterRx<TerminationOutcome>>) {
        let mut term = self.term.lock().unwrap();
        if term.contains_key(&name) {
            return (Some(TerminationOutcome::AlreadyTerminating), None);
        }
        let (tx, rx) = if wait {
            let (tx, rx) = waiter();
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };
        term.insert(name.clone(), TermEntry { term_sent: None, waiter: tx });
        drop(term);

        let mut boot = self.boot.lock().unwrap();
        boot.retain(|(n, _)| n != &name);
        (None, rx)
    }

    /// Snapshot of a live entry's config, used by `Rerun` to carry it
    /// across the blocking Stop that precedes the Load.
    pub fn main_config(&self, name: &str) -> Option<ProcessConfig> {
        self.main.lock().unwrap().get(name).map(|e| e.config.clone())
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.main.lock().unwrap().contains_key(name) || self.run.lock().unwrap().contains_key(name)
    }

    pub fn get_pid(&self, name: &str) -> i32 {
        self.main.lock().unwrap().get(name).map(|e| e.pid).unwrap_or(0)
    }

    // ---- C5 agent-report path -------------------------------------------

    /// Applied under `lock_run` when an agent's report connection lands
    /// (§4.5c). Returns the `should_run` bool to write back to the agent:
    /// `true` only when a pending `Run` entry actually wanted this PID.
    /// Promotion to `Main` (and waiter release) is left to the next Phase R
    /// tick, not done here, so a blocking `Load` only unblocks once
    /// `IsRunning`/`GetPid` can actually observe the `Main` entry.
    pub fn agent_report(&self, name: &str, pid: Pid, error: i32) -> bool {
        let mut run = self.run.lock().unwrap();
        if error != 0 {
            warn!("agent for '{}' reported post-exec error {}", name, error);
            return false;
        }
        match run.get_mut(name) {
            Some(entry) => {
                entry.pid = Some(pid);
                true
            }
            None => false,
        }
    }

    // ---- C7 control loop phases ----------------------------------------

    /// Phase R. `active` is the daemon's overall shutdown flag: once
    /// false, new agent spawns stop, but retries already in flight still
    /// get to report.
    pub fn phase_run(&self, active: bool, spawner: &Spawner) {
        let mut run = self.run.lock().unwrap();
        let mut promoted = Vec::new();
        for (name, entry) in run.iter_mut() {
            if let Some(pid) = entry.pid {
                promoted.push((name.clone(), entry.config.clone(), pid, entry.waiter.take()));
                continue;
            }
            if let Some(last_run) = entry.last_run {
                if last_run.elapsed() >= WAIT_TO_RERUN {
                    entry.last_run = None;
                }
            } else if active {
                if let Err(err) = spawner.send_run(name, &entry.config) {
                    warn!("{}", Error::Spawn(err));
                }
                entry.last_run = Some(Instant::now());
            }
        }
        for (name, ..) in &promoted {
            run.remove(name);
        }
        drop(run);

        if !promoted.is_empty() {
            let mut main = self.main.lock().unwrap();
            for (name, config, pid, waiter) in promoted {
                info!("'{}' promoted to Main with pid {}", name, pid);
                main.insert(name, MainEntry { config, pid });
                if let Some(tx) = waiter {
                    tx.signal(true);
                }
            }
        }
    }

    /// Phase T. Acquires `lock_main` then `lock_run` then `lock_term`, as
    /// required by the total lock order.
    pub fn phase_term(&self) {
        let mut main = self.main.lock().unwrap();
        let mut run = self.run.lock().unwrap();
        let mut term = self.term.lock().unwrap();

        let names: Vec<BinName> = term.keys().cloned().collect();
        for name in names {
            if let Some(main_entry) = main.get(&name) {
                if !is_alive(main_entry.pid) {
                    main.remove(&name);
                    finish_term(&mut term, &name, TerminationOutcome::SigTerm);
                    continue;
                }
                let term_entry = term.get_mut(&name).unwrap();
                match term_entry.term_sent {
                    None => {
                        debug!("sending SIGTERM to '{}' (pid {})", name, main_entry.pid);
                        if let Err(err) = signal(main_entry.pid, Signal::TERM) {
                            warn!("SIGTERM to '{}' failed: {}", name, err);
                        }
                        if main_entry.config.time_to_stop_ms.is_none() {
                            main.remove(&name);
                            finish_term(&mut term, &name, TerminationOutcome::NoCheck);
                        } else {
                            term_entry.term_sent = Some(Instant::now());
                        }
                    }
                    Some(sent) => {
                        let deadline = Duration::from_millis(main_entry.config.time_to_stop_ms.unwrap_or(0));
                        if sent.elapsed() > deadline {
                            debug!("escalating '{}' to SIGKILL", name);
                            if let Err(err) = signal(main_entry.pid, Signal::KILL) {
                                warn!("SIGKILL to '{}' failed: {}", name, err);
                            }
                            main.remove(&name);
                            finish_term(&mut term, &name, TerminationOutcome::SigKill);
                        }
                    }
                }
            } else if let Some(run_entry) = run.get(&name) {
                if run_entry.pid.is_none() {
                    run.remove(&name);
                    finish_term(&mut term, &name, TerminationOutcome::NotRun);
                }
            } else {
                finish_term(&mut term, &name, TerminationOutcome::NotRunning);
            }
        }
    }

    /// Phase M. Reads `term_rerun` before erasing the entry, then enqueues
    /// to `Run` only after releasing `lock_main`, per the spec's fixed
    /// resolution of the original's read/erase ordering ambiguity.
    pub fn phase_main(&self) {
        let mut to_requeue = Vec::new();
        {
            let mut main = self.main.lock().unwrap();
            let term = self.term.lock().unwrap();
            let dead: Vec<BinName> = main
                .iter()
                .filter(|(name, entry)| !term.contains_key(*name) && !is_alive(entry.pid))
                .map(|(name, _)| name.clone())
                .collect();
            for name in dead {
                let entry = main.remove(&name).unwrap();
                info!("'{}' (pid {}) is no longer alive", name, entry.pid);
                if entry.config.term_rerun {
                    to_requeue.push((name, entry.config));
                }
            }
        }
        if !to_requeue.is_empty() {
            let mut run = self.run.lock().unwrap();
            for (name, config) in to_requeue {
                info!("auto-rerunning '{}'", name);
                run.insert(
                    name,
                    RunEntry {
                        config,
                        pid: None,
                        last_run: None,
                        waiter: None,
                    },
                );
            }
        }
    }

    // ---- lifecycle (C9) --------------------------------------------------

    pub fn boot_snapshot(&self) -> Vec<(BinName, ProcessConfig)> {
        self.boot.lock().unwrap().clone()
    }

    pub fn is_main_empty(&self) -> bool {
        self.main.lock().unwrap().is_empty()
    }

    /// Shutdown step 5: insert a non-blocking Stop for every live entry.
    pub fn stop_all_main(&self) {
        let names: Vec<BinName> = self.main.lock().unwrap().keys().cloned().collect();
        for name in names {
            self.stop(name, false);
        }
    }

    /// Shutdown step 7: release every still-pending waiter with a failure
    /// outcome so no RPC thread blocks forever past shutdown.
    pub fn fail_all_waiters(&self) {
        let mut run = self.run.lock().unwrap();
        for (_, entry) in run.iter_mut() {
            if let Some(tx) = entry.waiter.take() {
                tx.signal(false);
            }
        }
        let mut term = self.term.lock().unwrap();
        for (_, entry) in term.iter_mut() {
            if let Some(tx) = entry.waiter.take() {
                tx.signal(TerminationOutcome::TermError);
            }
        }
    }
}

fn finish_term(term: &mut HashMap<BinName, TermEntry>, name: &str, outcome: TerminationOutcome) {
    if let Some(entry) = term.remove(name) {
        if let Some(tx) = entry.waiter {
            tx.signal(outcome);
        }
    }
}

/// The control loop itself (C7): runs Phase R, T, M in fixed order every
/// `LOOP_WAIT`, while `active` is true or `Main` is still nonempty (the
/// graceful-drain condition from `SPEC_FULL.md` §4.7/§4.9 step 6).
pub fn run(tables: Arc<Tables>, spawner: Spawner, active: Arc<AtomicBool>) {
    loop {
        let is_active = active.load(Ordering::SeqCst);
        tables.phase_run(is_active, &spawner);
        tables.phase_term();
        tables.phase_main();
        if !is_active && tables.is_main_empty() {
            info!("control loop exiting: Main has drained");
            break;
        }
        thread::sleep(LOOP_WAIT);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(term_rerun: bool, time_to_stop_ms: Option<u64>) -> ProcessConfig {
        ProcessConfig::new(vec!["x".to_string()], false, term_rerun, time_to_stop_ms)
    }

    #[test]
    fn load_duplicate_in_run_returns_false_immediately() {
        let tables = Tables::new();
        let (first, _rx) = tables.load("a".to_string(), cfg(false, None), false);
        assert_eq!(first, None);
        let (second, rx) = tables.load("a".to_string(), cfg(false, None), false);
        assert_eq!(second, Some(false));
        assert!(rx.is_none());
    }

    #[test]
    fn stop_duplicate_returns_already_terminating() {
        let tables = Tables::new();
        let (first, _rx) = tables.stop("a".to_string(), false);
        assert_eq!(first, None);
        let (second, rx) = tables.stop("a".to_string(), false);
        assert_eq!(second, Some(TerminationOutcome::AlreadyTerminating));
        assert!(rx.is_none());
    }

    #[test]
    fn is_running_true_while_in_run_table() {
        let tables = Tables::new();
        assert!(!tables.is_running("a"));
        tables.load("a".to_string(), cfg(false, None), false);
        assert!(tables.is_running("a"));
    }

    #[test]
    fn get_pid_zero_when_not_in_main() {
        let tables = Tables::new();
        assert_eq!(tables.get_pid("missing"), 0);
    }
}
