//! Request/response transport to the floating license server.
//!
//! Every lease operation is one independent exchange with the server at the
//! configured `host:port`:
//! - Requests carry `{op, handle, identity, client, key?}`
//! - Responses carry `{status, payload?}`
//!
//! Frames are a 4-byte big-endian length followed by a JSON body.
//!
//! # Components
//!
//! - **Protocol**: request/response message types
//! - **Codec**: length-prefixed JSON framing
//! - **Transport**: the [`LeaseTransport`] trait the lease client drives
//! - **Tcp**: [`TcpTransport`], the production implementation
//! - **Pool**: process-wide keep-alive connections and [`global_cleanup`]

pub mod clock;
pub mod codec;
pub mod pool;
pub mod protocol;
pub mod tcp;
pub mod transport;

pub use clock::{ClockWatch, DEFAULT_CLOCK_TOLERANCE};
pub use pool::{ConnectionPool, global_cleanup};
pub use protocol::{ClientInfo, LeaseRequest, LeaseResponse, Operation, MAX_FRAME_SIZE, PROTOCOL_VERSION};
pub use tcp::{TcpTransport, TcpTransportConfig};
pub use transport::LeaseTransport;
