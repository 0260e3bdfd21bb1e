//! Inbound push notifications.
//!
//! [`TriggerListener`] accepts plain TCP connections, reads one bounded
//! payload from each, acknowledges it, and passes the raw bytes to a
//! [`PayloadHandler`].  [`ResyncTrigger`] is the handler that turns authorized
//! payloads into mirror update cycles, one at a time.

pub mod listener;
pub mod resync;

pub use listener::{
    PayloadHandler, RunningListener, TriggerListener, ACKNOWLEDGEMENT, MAX_PAYLOAD_BYTES,
};
pub use resync::ResyncTrigger;
