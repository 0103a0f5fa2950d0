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

use std::error;
use std::fmt;
use std::io;
use std::path::PathBuf;

use sv_protocol;

#[derive(Debug)]
pub enum Error {
    /// Listener couldn't be opened on the requested port; fatal to
    /// construction.
    Bind(sv_protocol::Error),
    /// Reading or writing the boot-config file failed; callers downgrade
    /// this to "treat as empty" (load) or "data loss" (save) per the error
    /// taxonomy, logging it first.
    ConfigIo { path: PathBuf, source: io::Error },
    /// A boot-config record couldn't be parsed; the offending line is
    /// reported but the rest of the file is still honored.
    ConfigParse { path: PathBuf, line: usize },
    /// The OS refused to spawn an agent process.
    Spawn(io::Error),
    /// A worker thread (acceptor, receiver, control loop) could not be
    /// started during construction; this is always fatal.
    ThreadSpawn(io::Error),
    /// A client sent a command code outside the fixed dispatch table.
    UnknownCommand(i32),
    Protocol(sv_protocol::Error),
}

pub type Result<T> = ::std::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Bind(ref e) => write!(f, "unable to bind control listener: {}", e),
            Error::ConfigIo { ref path, ref source } => {
                write!(f, "I/O error on boot config {}: {}", path.display(), source)
            }
            Error::ConfigParse { ref path, line } => {
                write!(f, "malformed boot config record at {}:{}", path.display(), line)
            }
            Error::Spawn(ref e) => write!(f, "unable to spawn agent: {}", e),
            Error::ThreadSpawn(ref e) => write!(f, "unable to spawn worker thread: {}", e),
            Error::UnknownCommand(code) => write!(f, "unknown client command code {}", code),
            Error::Protocol(ref e) => write!(f, "{}", e),
        }
    }
}

impl error::Error for Error {
    fn cause(&self) -> Option<&error::Error> {
        match *self {
            Error::Bind(ref e) => Some(e),
            Error::Spawn(ref e) | Error::ThreadSpawn(ref e) => Some(e),
            Error::ConfigIo { ref source, .. } => Some(source),
            Error::ConfigParse { .. } => None,
            Error::UnknownCommand(_) => None,
            Error::Protocol(ref e) => Some(e),
        }
    }
}

impl From<sv_protocol::Error> for Error {
    fn from(err: sv_protocol::Error) -> Error {
        Error::Protocol(err)
    }
}
