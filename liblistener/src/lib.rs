//! A connection-per-client TCP listener on non-blocking I/O. It answers
//! `GET / ` with a fixed response and ignores everything else.

pub mod config;
pub mod server;
pub mod session;

pub use config::ListenerConfig;
pub use server::{Listener, serve_blocking};
pub use session::{ConnId, RESPONSE, Request, Session, SessionState, classify};
