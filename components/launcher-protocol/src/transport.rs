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

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use error::{Error, Result};

/// Frames above this size are refused outright; nothing in this protocol
/// ever needs more than a handful of argv strings.
const MAX_FRAME_LEN: u32 = 64 * 1024;

const ACCEPT_POLL: Duration = Duration::from_millis(50);

/// A length-framed TCP connection carrying `int32`/`bool`/`string` records.
pub struct Connection {
    stream: TcpStream,
}

impl Connection {
    fn from_stream(stream: TcpStream) -> Result<Self> {
        stream.set_nodelay(true).ok();
        Ok(Connection { stream })
    }

    /// Outbound half of the handshake: used by the client library and the
    /// agent binary to open a fresh control connection before sending the
    /// role tag.
    pub fn connect(port: u16) -> Result<Self> {
        let stream = TcpStream::connect(("127.0.0.1", port))?;
        Connection::from_stream(stream)
    }

    /// Non-blocking: true if a full next record is at least startable (there
    /// is *some* unread byte). A clean peer shutdown is reported as
    /// `Err(ConnectionBreak)` rather than `Ok(true)`: `peek` returns `Ok(0)`
    /// at EOF exactly as `read` would, and treating that as "available"
    /// would spawn a handler whose first `recv_*` immediately fails instead
    /// of letting the caller drop the connection outright.
    pub fn is_available(&self) -> Result<bool> {
        self.stream.set_nonblocking(true)?;
        let mut peek_buf = [0u8; 1];
        let result = match self.stream.peek(&mut peek_buf) {
            Ok(0) => {
                debug!("peer closed the connection cleanly");
                Err(Error::ConnectionBreak)
            }
            Ok(_) => Ok(true),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Ok(false),
            Err(e) => Err(Error::from(e)),
        };
        self.stream.set_nonblocking(false)?;
        result
    }

    pub fn send_i32(&mut self, v: i32) -> Result<()> {
        self.stream.write_all(&v.to_be_bytes())?;
        Ok(())
    }

    pub fn recv_i32(&mut self) -> Result<i32> {
        let mut buf = [0u8; 4];
        self.stream.read_exact(&mut buf)?;
        Ok(i32::from_be_bytes(buf))
    }

    pub fn send_bool(&mut self, v: bool) -> Result<()> {
        self.send_i32(if v { 1 } else { 0 })
    }

    pub fn recv_bool(&mut self) -> Result<bool> {
        Ok(self.recv_i32()? != 0)
    }

    pub fn send_string(&mut self, s: &str) -> Result<()> {
        let bytes = s.as_bytes();
        self.stream.write_all(&(bytes.len() as u32).to_be_bytes())?;
        self.stream.write_all(bytes)?;
        Ok(())
    }

    pub fn recv_string(&mut self) -> Result<String> {
        let mut len_buf = [0u8; 4];
        self.stream.read_exact(&mut len_buf)?;
        let len = u32::from_be_bytes(len_buf);
        if len > MAX_FRAME_LEN {
            warn!("rejecting oversized string frame: {} bytes exceeds {} byte ceiling", len, MAX_FRAME_LEN);
            return Err(Error::FrameTooLarge(len));
        }
        let mut bytes = vec![0u8; len as usize];
        self.stream.read_exact(&mut bytes)?;
        Ok(String::from_utf8(bytes)?)
    }

    pub fn close(&self) -> Result<()> {
        match self.stream.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            Err(ref e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(Error::from(e)),
        }
    }
}

/// Listens on a single local port for both client and agent connections.
pub struct Listener {
    inner: TcpListener,
}

impl Listener {
    pub fn bind(port: u16) -> Result<Self> {
        let inner = TcpListener::bind(("127.0.0.1", port))?;
        Ok(Listener { inner })
    }

    /// Block until a connection arrives, polling `active` every
    /// `ACCEPT_POLL` so that shutdown can unblock the acceptor without
    /// relying on platform-specific "interrupt a blocked accept" tricks.
    pub fn accept(&self, active: &AtomicBool) -> Result<Connection> {
        self.inner.set_nonblocking(true)?;
        loop {
            if !active.load(Ordering::SeqCst) {
                return Err(Error::ConnectionBreak);
            }
            match self.inner.accept() {
                Ok((stream, _addr)) => {
                    stream.set_nonblocking(false)?;
                    return Connection::from_stream(stream);
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL);
                    continue;
                }
                Err(e) => return Err(Error::from(e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpStream;
    use std::sync::atomic::AtomicBool;

    fn pair() -> (Connection, Connection) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = thread::spawn(move || TcpStream::connect(addr).unwrap());
        let (server_stream, _) = listener.accept().unwrap();
        let client_stream = client.join().unwrap();
        (
            Connection::from_stream(server_stream).unwrap(),
            Connection::from_stream(client_stream).unwrap(),
        )
    }

    #[test]
    fn round_trips_primitives_over_a_real_socket() {
        let (mut a, mut b) = pair();
        a.send_i32(-42).unwrap();
        assert_eq!(b.recv_i32().unwrap(), -42);

        a.send_bool(true).unwrap();
        assert_eq!(b.recv_bool().unwrap(), true);

        a.send_string("hello there").unwrap();
        assert_eq!(b.recv_string().unwrap(), "hello there");
    }

    #[test]
    fn oversized_string_frame_is_a_connection_break() {
        let (mut a, mut b) = pair();
        a.send_i32((MAX_FRAME_LEN + 1) as i32).unwrap();
        match b.recv_string() {
            Err(Error::FrameTooLarge(n)) => assert_eq!(n, MAX_FRAME_LEN + 1),
            other => panic!("expected FrameTooLarge, got {:?}", other),
        }
    }

    #[test]
    fn is_available_false_until_a_frame_is_written() {
        let (mut a, b) = pair();
        assert_eq!(b.is_available().unwrap(), false);
        a.send_i32(7).unwrap();
        assert_eq!(b.is_available().unwrap(), true);
    }

    #[test]
    fn is_available_reports_connection_break_once_the_peer_hangs_up() {
        let (a, b) = pair();
        a.close().unwrap();
        drop(a);
        match b.is_available() {
            Err(Error::ConnectionBreak) => {}
            other => panic!("expected ConnectionBreak, got {:?}", other),
        }
    }

    #[test]
    fn accept_returns_connection_break_once_inactive() {
        let listener = Listener::bind(0).unwrap();
        let active = AtomicBool::new(false);
        match listener.accept(&active) {
            Err(Error::ConnectionBreak) => {}
            other => panic!("expected ConnectionBreak, got {:?}", other.map(|_| ())),
        }
    }
}
