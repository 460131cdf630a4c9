//! HTTP transport used by the XML-RPC client.

mod basic;
mod client;
#[cfg(test)]
pub(crate) mod mock;

pub use basic::{BasicClient, DEFAULT_CONNECT_TIMEOUT, DEFAULT_TIMEOUT};
pub use client::HttpClient;
