//! Request engine integration tests.

mod fetch;
mod realtime;

#[cfg(feature = "emitter")]
mod views;

#[cfg(feature = "http")]
mod http;
