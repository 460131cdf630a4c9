//! Minimal XML-RPC client for the FAMAS pGuide service.
//!
//! Only the subset of XML-RPC the parking endpoint speaks is supported:
//! scalar values, arrays and structs, plus fault envelopes. There is no
//! multicall, no introspection and no extension types.
//!
//! - [`Value`] is the decoded value tree.
//! - [`encode_call`] / [`decode_response`] are the wire codec.
//! - [`RpcClient`] runs a single call over any [`HttpClient`](crate::fetch::HttpClient).

mod client;
mod decode;
mod encode;
mod error;
mod message;
mod value;

pub use client::RpcClient;
pub use decode::decode_response;
pub use encode::encode_call;
pub use error::RpcError;
pub use message::{Fault, MethodCall, MethodResponse};
pub use value::{Member, Value, members_by_name};
