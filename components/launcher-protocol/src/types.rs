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

use std::fmt;

/// Sender role read off the first frame of every connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Agent,
    Client,
}

impl Role {
    pub fn to_i32(self) -> i32 {
        match self {
            Role::Agent => 0,
            Role::Client => 1,
        }
    }

    pub fn from_i32(v: i32) -> Option<Role> {
        match v {
            0 => Some(Role::Agent),
            1 => Some(Role::Client),
            _ => None,
        }
    }
}

/// Client command code, indexing the fixed dispatch table in `§4.8`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Load,
    Stop,
    Rerun,
    IsRunning,
    GetPid,
    GetConfig,
    SetConfig,
}

impl Command {
    pub fn to_i32(self) -> i32 {
        match self {
            Command::Load => 0,
            Command::Stop => 1,
            Command::Rerun => 2,
            Command::IsRunning => 3,
            Command::GetPid => 4,
            Command::GetConfig => 5,
            Command::SetConfig => 6,
        }
    }

    pub fn from_i32(v: i32) -> Option<Command> {
        match v {
            0 => Some(Command::Load),
            1 => Some(Command::Stop),
            2 => Some(Command::Rerun),
            3 => Some(Command::IsRunning),
            4 => Some(Command::GetPid),
            5 => Some(Command::GetConfig),
            6 => Some(Command::SetConfig),
            _ => None,
        }
    }
}

/// Outcome of a `Stop`. Also doubles as the status written into a `Term`
/// waiter's slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TerminationOutcome {
    SigTerm,
    SigKill,
    NoCheck,
    NotRun,
    NotRunning,
    AlreadyTerminating,
    TermError,
}

impl TerminationOutcome {
    pub fn to_i32(self) -> i32 {
        match self {
            TerminationOutcome::SigTerm => 0,
            TerminationOutcome::SigKill => 1,
            TerminationOutcome::NoCheck => 2,
            TerminationOutcome::NotRun => 3,
            TerminationOutcome::NotRunning => 4,
            TerminationOutcome::AlreadyTerminating => 5,
            TerminationOutcome::TermError => 6,
        }
    }

    pub fn from_i32(v: i32) -> Option<TerminationOutcome> {
        match v {
            0 => Some(TerminationOutcome::SigTerm),
            1 => Some(TerminationOutcome::SigKill),
            2 => Some(TerminationOutcome::NoCheck),
            3 => Some(TerminationOutcome::NotRun),
            4 => Some(TerminationOutcome::NotRunning),
            5 => Some(TerminationOutcome::AlreadyTerminating),
            6 => Some(TerminationOutcome::TermError),
            _ => None,
        }
    }
}

impl fmt::Display for TerminationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match *self {
            TerminationOutcome::SigTerm => "SigTerm",
            TerminationOutcome::SigKill => "SigKill",
            TerminationOutcome::NoCheck => "NoCheck",
            TerminationOutcome::NotRun => "NotRun",
            TerminationOutcome::NotRunning => "NotRunning",
            TerminationOutcome::AlreadyTerminating => "AlreadyTerminating",
            TerminationOutcome::TermError => "TermError",
        };
        write!(f, "{}", s)
    }
}

/// Per-binary launch/termination policy, shared verbatim by `Run` and
/// `Main` entries (`Main`'s copy is taken at promotion time).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessConfig {
    pub args: Vec<String>,
    pub launch_on_boot: bool,
    pub term_rerun: bool,
    /// Absent (`None`) means "fire SIGTERM and consider the stop done".
    pub time_to_stop_ms: Option<u64>,
}

impl ProcessConfig {
    pub fn new(args: Vec<String>, launch_on_boot: bool, term_rerun: bool, time_to_stop_ms: Option<u64>) -> Self {
        ProcessConfig {
            args,
            launch_on_boot,
            term_rerun,
            time_to_stop_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips() {
        assert_eq!(Role::from_i32(Role::Client.to_i32()), Some(Role::Client));
        assert_eq!(Role::from_i32(Role::Agent.to_i32()), Some(Role::Agent));
        assert_eq!(Role::from_i32(42), None);
    }

    #[test]
    fn command_round_trips() {
        let all = [
            Command::Load,
            Command::Stop,
            Command::Rerun,
            Command::IsRunning,
            Command::GetPid,
            Command::GetConfig,
            Command::SetConfig,
        ];
        for cmd in &all {
            assert_eq!(Command::from_i32(cmd.to_i32()), Some(*cmd));
        }
        assert_eq!(Command::from_i32(99), None);
    }

    #[test]
    fn termination_outcome_round_trips() {
        let all = [
            TerminationOutcome::SigTerm,
            TerminationOutcome::SigKill,
            TerminationOutcome::NoCheck,
            TerminationOutcome::NotRun,
            TerminationOutcome::NotRunning,
            TerminationOutcome::AlreadyTerminating,
            TerminationOutcome::TermError,
        ];
        for outcome in &all {
            assert_eq!(TerminationOutcome::from_i32(outcome.to_i32()), Some(*outcome));
        }
        assert_eq!(TerminationOutcome::from_i32(-1), None);
    }
}
