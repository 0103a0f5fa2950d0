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

//! The agent spawner (C4): launches `AGENT_BIN PORT name arg1 arg2 ...`
//! detached from the supervisor. Grounded on the reference implementation's
//! `system(3)` call (`original_source/source/clauncher-server.cpp`), which
//! backgrounds the agent under an intermediate shell rather than fork/exec
//! directly: the shell forks the agent, backgrounds it with `&`, and exits
//! immediately, so the agent is reparented away from the supervisor instead
//! of lingering as the supervisor's own zombie once it exits — `kill(pid, 0)`
//! liveness checks in Phase M/T would otherwise keep reporting a reaped-but-
//! not-yet-collected child as alive forever. `owned_pgid`/`pre_exec` (the
//! same technique `components/launcher/src/sys/unix/service.rs` used in the
//! teacher) additionally keeps the whole chain out of the supervisor's own
//! process group, so a group-wide signal aimed at the supervisor can never
//! reach it.

use std::io;
use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};

use sv_protocol::ProcessConfig;

/// Constructs and fires off the agent command line described in the
/// spec's C4: the spawner does not wait for the agent itself, and success
/// only means the OS accepted the spawn request. Correlation happens
/// later, out of band, via the agent's own report over the control
/// connection.
pub struct Spawner {
    agent_binary: String,
    port: u16,
}

impl Spawner {
    pub fn new(agent_binary: String, port: u16) -> Self {
        Spawner { agent_binary, port }
    }

    pub fn send_run(&self, name: &str, config: &ProcessConfig) -> io::Result<()> {
        debug!("spawning agent for '{}'", name);

        let mut command_line = shell_quote(&self.agent_binary);
        command_line.push(' ');
        command_line.push_str(&self.port.to_string());
        command_line.push(' ');
        command_line.push_str(&shell_quote(name));
        for arg in &config.args {
            command_line.push(' ');
            command_line.push_str(&shell_quote(arg));
        }
        command_line.push_str(" &");

        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command_line);
        cmd.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());
        unsafe {
            cmd.pre_exec(owned_pgid);
        }
        // `sh -c "... &"` forks the agent and exits right away; waiting on
        // it here only blocks for that fork-and-background step, not for
        // the agent (now an orphan of `init`) itself.
        let mut child = cmd.spawn()?;
        child.wait()?;
        Ok(())
    }
}

/// Put the shell (and everything it backgrounds) in its own process group
/// so it can never be caught by a signal aimed at the supervisor's group.
fn owned_pgid() -> io::Result<()> {
    unsafe {
        libc::setpgid(0, 0);
    }
    Ok(())
}

/// Single-quote `s` for inclusion in a `sh -c` command line, escaping any
/// embedded single quotes. Argument whitespace is representable here even
/// though the boot-config file format (§4.1) can't carry it.
fn shell_quote(s: &str) -> String {
    let mut quoted = String::with_capacity(s.len() + 2);
    quoted.push('\'');
    for ch in s.chars() {
        if ch == '\'' {
            quoted.push_str("'\\''");
        } else {
            quoted.push(ch);
        }
    }
    quoted.push('\'');
    quoted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_quote_escapes_embedded_single_quotes() {
        assert_eq!(shell_quote("plain"), "'plain'");
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
    }
}
