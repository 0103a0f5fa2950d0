// Copyright (c) 2016-2017 Chef Software Inc. and/or applicable contributors
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

use std::fmt::{self, Display, Formatter};
use std::io;

/// OS process identifier. Signed because the supervisor's own lock-ordering
/// code occasionally needs to distinguish "no pid" (0) without an Option.
pub type Pid = libc::pid_t;

#[allow(non_snake_case)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Signal {
    TERM,
    KILL,
}

impl From<Signal> for libc::c_int {
    fn from(value: Signal) -> libc::c_int {
        match value {
            Signal::TERM => libc::SIGTERM,
            Signal::KILL => libc::SIGKILL,
        }
    }
}

impl Display for Signal {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let s = match *self {
            Signal::TERM => "TERM",
            Signal::KILL => "KILL",
        };
        write!(f, "{}", s)
    }
}

/// Send `sig` to `pid`. Mirrors the reference implementation's direct use of
/// `kill(2)`; does not negate the pid to target a process group, since every
/// supervised process here is spawned singly (no shell pipeline children).
pub fn signal(pid: Pid, sig: Signal) -> io::Result<()> {
    let code: libc::c_int = sig.into();
    match unsafe { libc::kill(pid, code) } {
        0 => Ok(()),
        _ => Err(io::Error::last_os_error()),
    }
}

/// `kill(pid, 0)` liveness probe: succeeds without actually signaling the
/// process, failing only if the pid doesn't exist or isn't ours to signal.
pub fn is_alive(pid: Pid) -> bool {
    unsafe { libc::kill(pid, 0) == 0 }
}

pub fn current_pid() -> Pid {
    unsafe { libc::getpid() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    #[test]
    fn current_pid_matches_kills_own_process() {
        assert!(is_alive(current_pid()));
    }

    #[test]
    fn is_alive_false_once_a_real_child_has_exited() {
        let mut child = Command::new("/bin/sleep").arg("5").spawn().unwrap();
        let pid = child.id() as Pid;
        assert!(is_alive(pid));

        signal(pid, Signal::KILL).unwrap();
        child.wait().unwrap();
        assert!(!is_alive(pid));
    }

    #[test]
    fn signal_on_a_nonexistent_pid_is_an_error() {
        // A pid this large is vanishingly unlikely to be in use.
        assert!(signal(999_999, Signal::TERM).is_err());
    }
}
