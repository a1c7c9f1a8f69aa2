//! Control socket: newline-delimited JSON requests over a Unix socket.

pub mod dispatch;
pub mod runtime;
pub mod server;

pub use runtime::socket_path;
pub use server::{ControlServer, client_request};
