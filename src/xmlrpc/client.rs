//! XML-RPC client over an [`HttpClient`].

use reqwest::header::{CONTENT_TYPE, HeaderValue};
use reqwest::{Method, Request, StatusCode, Url};
use tracing::debug;

use crate::fetch::HttpClient;

use super::decode::decode_response;
use super::encode::encode_call;
use super::error::RpcError;
use super::message::MethodCall;
use super::value::Value;

/// Runs XML-RPC calls against one endpoint.
///
/// Each call is a single POST. Nothing is retried here; the poll cycle is
/// simply run again on the next schedule.
pub struct RpcClient<C> {
    http: C,
    endpoint: Url,
}

impl<C: HttpClient> RpcClient<C> {
    pub fn new(http: C, endpoint: &str) -> Result<Self, RpcError> {
        let endpoint = Url::parse(endpoint).map_err(|e| RpcError::Endpoint {
            url: endpoint.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self { http, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Calls `method` with `params` and returns the result value.
    ///
    /// # Errors
    ///
    /// - [`RpcError::Encode`] when a parameter has no wire form (non-finite double)
    /// - [`RpcError::Transport`] / [`RpcError::Status`] on network or HTTP failure
    /// - [`RpcError::Malformed`] when the body cannot be decoded
    /// - [`RpcError::Fault`] when the server answers with a fault envelope
    pub async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcError> {
        let call = MethodCall {
            method_name: method.to_string(),
            params,
        };
        let body = encode_call(&call)?;
        debug!(method, req = %String::from_utf8_lossy(&body), "Dumping request xml");

        let mut req = Request::new(Method::POST, self.endpoint.clone());
        req.headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("text/xml"));
        *req.body_mut() = Some(body.into());

        let resp = self.http.execute(req).await?;
        let status = resp.status();
        if status != StatusCode::OK {
            return Err(RpcError::Status(status.as_u16()));
        }

        let bytes = resp.bytes().await?;
        debug!(method, body = %String::from_utf8_lossy(&bytes), "Dumping response xml");

        decode_response(&bytes)?.into_result()
    }
}
