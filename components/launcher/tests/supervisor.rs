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

//! End-to-end scenarios from `SPEC_FULL.md` §8, driving a real supervisor
//! binary over real `TcpStream`s with a real agent process and real
//! `/bin/sleep`/`/bin/true` targets — no mocked transport or process layer.

extern crate libc;
extern crate sv_client;
extern crate sv_protocol;

use std::fs;
use std::io::Write;
use std::net::TcpListener;
use std::path::PathBuf;
use std::process::{Child, Command};
use std::thread;
use std::time::Duration;

use sv_client::LauncherClient;
use sv_protocol::{ProcessConfig, TerminationOutcome};

struct TestSupervisor {
    child: Child,
    config_path: PathBuf,
    port: u16,
}

impl TestSupervisor {
    fn start() -> TestSupervisor {
        let port = free_port();
        let config_path = scratch_path(&format!("boot-{}", port));
        let _ = fs::remove_file(&config_path);

        let child = Command::new(supervisor_bin())
            .arg(port.to_string())
            .arg(&config_path)
            .arg(agent_bin())
            .spawn()
            .expect("failed to spawn supervisor binary");

        // Give the listener a moment to bind before the first client dials.
        thread::sleep(Duration::from_millis(150));

        TestSupervisor { child, config_path, port }
    }

    fn client(&self) -> LauncherClient {
        LauncherClient::connect(self.port).expect("failed to connect to supervisor")
    }
}

impl Drop for TestSupervisor {
    fn drop(&mut self) {
        unsafe {
            libc::kill(self.child.id() as i32, libc::SIGTERM);
        }
        let _ = self.child.wait();
        let _ = fs::remove_file(&self.config_path);
    }
}

fn supervisor_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_supervisor"))
}

fn agent_bin() -> PathBuf {
    let mut path = supervisor_bin();
    path.pop();
    path.push(if cfg!(windows) { "sv-agent.exe" } else { "sv-agent" });
    path
}

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port()
}

fn scratch_path(name: &str) -> PathBuf {
    let mut p = std::env::temp_dir();
    p.push(format!("sv-integration-{}-{}", name, std::process::id()));
    p
}

/// A trivial shell script that ignores SIGTERM, used to exercise the
/// SIGKILL escalation path. Returns the script's path.
fn trap_script() -> PathBuf {
    let path = scratch_path("trap-term.sh");
    let mut file = fs::File::create(&path).unwrap();
    writeln!(file, "#!/bin/sh").unwrap();
    writeln!(file, "trap '' TERM").unwrap();
    writeln!(file, "sleep 5").unwrap();
    drop(file);
    let mut perms = fs::metadata(&path).unwrap().permissions();
    use std::os::unix::fs::PermissionsExt;
    perms.set_mode(0o755);
    fs::set_permissions(&path, &perms).unwrap();
    path
}

fn wait_until<F: FnMut() -> bool>(mut pred: F, timeout: Duration) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    loop {
        if pred() {
            return true;
        }
        if std::time::Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(20));
    }
}

#[test]
fn happy_load_reports_a_real_pid() {
    let sup = TestSupervisor::start();
    let mut client = sup.client();

    let config = ProcessConfig::new(vec!["5".to_string()], false, false, None);
    let loaded = client.load("/bin/sleep", &config, true).unwrap();
    assert!(loaded);

    let pid = client.get_pid("/bin/sleep").unwrap();
    assert!(pid.is_some());
    assert!(pid.unwrap() > 0);
}

#[test]
fn duplicate_load_returns_false_without_disturbing_the_original() {
    let sup = TestSupervisor::start();
    let mut client = sup.client();

    let config = ProcessConfig::new(vec!["5".to_string()], false, false, None);
    assert!(client.load("/bin/sleep", &config, true).unwrap());
    let first_pid = client.get_pid("/bin/sleep").unwrap();

    assert_eq!(client.load("/bin/sleep", &config, false).unwrap(), false);
    assert_eq!(client.get_pid("/bin/sleep").unwrap(), first_pid);
}

#[test]
fn clean_stop_without_deadline_sends_exactly_one_sigterm() {
    let sup = TestSupervisor::start();
    let mut client = sup.client();

    let config = ProcessConfig::new(vec!["5".to_string()], false, false, None);
    assert!(client.load("/bin/sleep", &config, true).unwrap());

    let outcome = client.stop("/bin/sleep", true).unwrap();
    assert_eq!(outcome, TerminationOutcome::NoCheck);
    assert_eq!(client.is_running("/bin/sleep").unwrap(), false);
}

#[test]
fn stop_escalates_to_sigkill_when_the_target_ignores_sigterm() {
    let sup = TestSupervisor::start();
    let mut client = sup.client();
    let script = trap_script();

    let config = ProcessConfig::new(vec![], false, false, Some(50));
    assert!(client.load(script.to_str().unwrap(), &config, true).unwrap());

    let start = std::time::Instant::now();
    let outcome = client.stop(script.to_str().unwrap(), true).unwrap();
    assert_eq!(outcome, TerminationOutcome::SigKill);
    assert!(start.elapsed() >= Duration::from_millis(50));

    let _ = fs::remove_file(&script);
}

#[test]
fn is_running_and_get_pid_are_false_zero_for_unknown_targets() {
    let sup = TestSupervisor::start();
    let mut client = sup.client();

    assert_eq!(client.is_running("/no/such/binary").unwrap(), false);
    assert_eq!(client.get_pid("/no/such/binary").unwrap(), None);
}

#[test]
fn stop_of_unknown_target_reports_not_running() {
    let sup = TestSupervisor::start();
    let mut client = sup.client();

    let outcome = client.stop("/no/such/binary", true).unwrap();
    assert_eq!(outcome, TerminationOutcome::NotRunning);
}

#[test]
fn rerun_of_a_target_not_in_main_returns_false() {
    let sup = TestSupervisor::start();
    let mut client = sup.client();

    assert_eq!(client.rerun("/no/such/binary", true).unwrap(), false);
}

#[test]
fn auto_rerun_promotes_a_replacement_with_a_different_pid() {
    let sup = TestSupervisor::start();
    let mut client = sup.client();

    // A target that exits almost immediately; `term_rerun` should bring it
    // straight back up under a fresh pid within a couple of control ticks.
    let config = ProcessConfig::new(vec!["0.1".to_string()], false, true, None);
    assert!(client.load("/bin/sleep", &config, true).unwrap());
    let first_pid = client.get_pid("/bin/sleep").unwrap().unwrap();

    let promoted_again = wait_until(
        || {
            client
                .get_pid("/bin/sleep")
                .ok()
                .and_then(|p| p)
                .map(|pid| pid != first_pid)
                .unwrap_or(false)
        },
        Duration::from_millis(2000),
    );
    assert!(promoted_again, "expected a new pid for an auto-rerun target");

    // Clean up so the supervisor's shutdown drain doesn't have to chase a
    // `term_rerun` target that keeps coming back.
    let _ = client.stop("/bin/sleep", true);
}
