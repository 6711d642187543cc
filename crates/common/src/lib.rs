//! Common utilities for the flightstick driver
//!
//! This crate defines the two capabilities the polling engine consumes, a
//! [`Transport`] that runs asynchronous transfers and an [`EventSink`] that
//! receives decoded input, together with the channel bridge that carries
//! input frames out of the completion context, error handling, logging
//! setup, and test doubles.

pub mod channel;
pub mod error;
pub mod logging;
pub mod sink;
pub mod test_utils;
pub mod transport;

pub use channel::{ChannelSink, DEFAULT_QUEUE_CAPACITY, EventStream, create_event_bridge};
pub use error::{Error, Result};
pub use logging::{LogFormat, setup_logging};
pub use sink::EventSink;
pub use transport::{
    AllocMode, Completion, CompletionHandler, SubmitError, TransferRequest, TransferSlot,
    Transport,
};
