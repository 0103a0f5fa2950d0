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
use std::string::FromUtf8Error;

#[derive(Debug)]
pub enum Error {
    /// The peer disconnected, the listener was closed, or a frame was
    /// truncated mid-read. Not fatal to the caller; drop the connection.
    ConnectionBreak,
    /// A length-prefixed string frame claimed a size past our sanity
    /// ceiling; treated the same as a broken connection rather than
    /// trusted for an allocation.
    FrameTooLarge(u32),
    Io(io::Error),
    Utf8(FromUtf8Error),
}

pub type Result<T> = ::std::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::ConnectionBreak => write!(f, "connection closed or frame truncated"),
            Error::FrameTooLarge(n) => write!(f, "frame length {} exceeds sanity ceiling", n),
            Error::Io(ref e) => write!(f, "transport I/O error: {}", e),
            Error::Utf8(ref e) => write!(f, "frame was not valid UTF-8: {}", e),
        }
    }
}

impl error::Error for Error {
    fn cause(&self) -> Option<&error::Error> {
        match *self {
            Error::Io(ref e) => Some(e),
            Error::Utf8(ref e) => Some(e),
            Error::ConnectionBreak | Error::FrameTooLarge(_) => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        match err.kind() {
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => Error::ConnectionBreak,
            _ => Error::Io(err),
        }
    }
}

impl From<FromUtf8Error> for Error {
    fn from(err: FromUtf8Error) -> Error {
        Error::Utf8(err)
    }
}
