//! Debug tools for globestream - TCP debug server for remote inspection
//!
//! Start the debug server next to the engine:
//! ```ignore
//! let handler = Arc::new(Mutex::new(MyHandler::new()));
//! let _server = DebugServer::start(handler, DEFAULT_PORT);
//! ```
//!
//! Clients send one JSON command per line, for example
//! `{"cmd": "get_resource", "params": {"name": "terrain/0-0-0.meta"}}`,
//! and get one JSON response per line back.

pub mod protocol;
pub mod server;

pub use protocol::*;
pub use server::{DebugHandler, DebugServer};

/// Default debug server port
pub const DEFAULT_PORT: u16 = 9743;
