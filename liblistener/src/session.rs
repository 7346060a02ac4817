//! One accepted connection, driven as an owned state machine.
//!
//! ```text
//! Reading --"GET / "--> Responding --written--> Closed
//!    |
//!    +--anything else--> Idle --peer hangup | idle timeout--> Closed
//! ```
//!
//! An unsupported request gets no response and the connection is not
//! closed by us until the idle timeout fires. While idle the socket is
//! only polled to notice the peer hanging up; whatever it sends is dropped.

use std::fmt;
use std::time::Duration;

use log::{debug, trace};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{Instant, timeout, timeout_at};

pub const REQUEST_PREFIX: &[u8] = b"GET / ";

pub const RESPONSE: &[u8] =
    b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 2\r\n\r\nHi";

const BUFFER_SIZE: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(pub u64);

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    Root,
    Unsupported,
}

pub fn classify(received: &[u8]) -> Request {
    if received.starts_with(REQUEST_PREFIX) {
        Request::Root
    } else {
        Request::Unsupported
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Reading,
    Responding,
    Idle,
    Closed,
}

impl SessionState {
    /// Transition once the single read completes. Zero bytes means the peer
    /// closed before sending anything.
    pub fn on_read(self, received: &[u8]) -> SessionState {
        match self {
            SessionState::Reading if received.is_empty() => SessionState::Closed,
            SessionState::Reading => match classify(received) {
                Request::Root => SessionState::Responding,
                Request::Unsupported => SessionState::Idle,
            },
            other => other,
        }
    }

    pub fn on_written(self) -> SessionState {
        match self {
            SessionState::Responding => SessionState::Closed,
            other => other,
        }
    }

    /// Peer hung up, or the idle timer fired.
    pub fn on_idle_end(self) -> SessionState {
        match self {
            SessionState::Idle => SessionState::Closed,
            other => other,
        }
    }
}

pub struct Session {
    id: ConnId,
    stream: TcpStream,
    buffer: [u8; BUFFER_SIZE],
    state: SessionState,
    idle_timeout: Duration,
}

impl Session {
    pub fn new(id: ConnId, stream: TcpStream, idle_timeout: Duration) -> Self {
        Session {
            id,
            stream,
            buffer: [0; BUFFER_SIZE],
            state: SessionState::Reading,
            idle_timeout,
        }
    }

    pub fn id(&self) -> ConnId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Drives the session to `Closed`. An I/O error drops it on the spot.
    pub async fn run(mut self) -> SessionState {
        while self.state != SessionState::Closed {
            let before = self.state;
            if let Err(e) = self.step().await {
                debug!("[{}] aborted while {:?}: {e}", self.id, before);
                return before;
            }
            trace!("[{}] {:?} -> {:?}", self.id, before, self.state);
        }
        SessionState::Closed
    }

    async fn step(&mut self) -> std::io::Result<()> {
        self.state = match self.state {
            SessionState::Reading => {
                match timeout(self.idle_timeout, self.stream.read(&mut self.buffer)).await {
                    Ok(n) => {
                        let n = n?;
                        self.state.on_read(&self.buffer[..n])
                    }
                    Err(_) => {
                        debug!("[{}] no request within {:?}", self.id, self.idle_timeout);
                        SessionState::Closed
                    }
                }
            }
            SessionState::Responding => {
                self.stream.write_all(RESPONSE).await?;
                self.stream.shutdown().await?;
                self.state.on_written()
            }
            SessionState::Idle => {
                let deadline = Instant::now() + self.idle_timeout;
                let mut discard = [0u8; 256];
                loop {
                    match timeout_at(deadline, self.stream.read(&mut discard)).await {
                        Ok(Ok(0)) | Err(_) => break self.state.on_idle_end(),
                        Ok(Ok(_)) => continue,
                        Ok(Err(e)) => return Err(e),
                    }
                }
            }
            SessionState::Closed => SessionState::Closed,
        };
        Ok(())
    }
}
