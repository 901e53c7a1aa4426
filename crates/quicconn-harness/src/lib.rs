//! Test doubles for the quicconn adapters.
//!
//! - [`MockSession`]: in-memory session, optionally paired with a peer
//! - [`MockTransport`] / [`MockListener`]: dial and listen without a network
//!   stack, with handshake progress scripted per session
//! - [`random_payload`]: seeded payloads for transfer tests
//!
//! Every injected failure is stored as an error kind and message and rebuilt
//! on each call, so the same failure can be observed repeatedly.

pub mod payload;
pub mod session;
pub mod transport;

pub use payload::random_payload;
pub use session::{MockSession, PIPE_CAPACITY};
pub use transport::{HandshakeStep, MockListener, MockTransport};
