//! Client-side core of a chat-platform API wrapper: permission resolution over
//! cached overrides and a rate-limit aware pipeline for deferred actions.

pub mod client;
pub mod config;
pub mod entities;
pub mod error;
pub mod logging;
pub mod managers;
pub mod permissions;
pub mod requests;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use client::Client;
pub use error::{ClientError, RemoteError, Result, ValidationError};
