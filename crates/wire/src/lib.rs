//! Transport layer for taktgeber.
//!
//! Provides the [`Session`] / [`Connector`] seam the dispatcher core talks
//! through, plus a ZeroMQ implementation of it:
//! - [`ZmqSession`] multiplexes RPC calls over a DEALER socket and topic
//!   delivery over a SUB socket
//! - [`ServiceHost`] is the ROUTER + PUB counterpart, used to stand in for
//!   remote services

pub mod error;
pub mod host;
pub mod message;
pub mod protocol;
pub mod session;
pub mod traits;
pub mod transport;

pub use error::WireError;
pub use host::{IncomingCall, ServiceHost};
pub use message::Message;
pub use protocol::{CallOutcome, Event};
pub use session::{ZmqConnector, ZmqSession};
pub use traits::{Connector, Session};
pub use transport::Transport;
