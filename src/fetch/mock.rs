//! Scripted transport for unit tests.
//!
//! Serves canned XML-RPC responses keyed by method name and the first
//! integer parameter of the call, and records every call it sees.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::{Request, Response};

use super::client::HttpClient;

/// What the scripted server answers for one call.
#[derive(Debug, Clone)]
pub enum Canned {
    /// 200 with this body.
    Xml(String),
    /// Bare status code with an empty body.
    Status(u16),
}

type Key = (String, Option<i32>);

/// [`HttpClient`] answering from a fixed script. Unscripted calls get a 404.
#[derive(Debug, Clone, Default)]
pub struct ScriptedClient {
    responses: HashMap<Key, Canned>,
    calls: Arc<Mutex<Vec<Key>>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `method` called without an integer parameter.
    pub fn on(mut self, method: &str, canned: Canned) -> Self {
        self.responses.insert((method.to_string(), None), canned);
        self
    }

    /// Answer `method` called with `id` as first integer parameter.
    pub fn on_id(mut self, method: &str, id: i32, canned: Canned) -> Self {
        self.responses.insert((method.to_string(), Some(id)), canned);
        self
    }

    /// Calls received so far, in order, as `(method, first int param)`.
    pub fn calls(&self) -> Vec<(String, Option<i32>)> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl HttpClient for ScriptedClient {
    async fn execute(&self, req: Request) -> reqwest::Result<Response> {
        let body = req
            .body()
            .and_then(|b| b.as_bytes())
            .map(String::from_utf8_lossy)
            .unwrap_or_default();
        let key = (
            between(&body, "<methodName>", "</methodName>")
                .unwrap_or_default()
                .to_string(),
            between(&body, "<int>", "</int>").and_then(|s| s.trim().parse().ok()),
        );

        let canned = self.responses.get(&key).cloned();
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(key);

        let (status, body) = match canned {
            Some(Canned::Xml(xml)) => (200, xml),
            Some(Canned::Status(status)) => (status, String::new()),
            None => (404, String::new()),
        };
        let mut resp = http::Response::new(body);
        *resp.status_mut() =
            http::StatusCode::from_u16(status).unwrap_or(http::StatusCode::INTERNAL_SERVER_ERROR);
        Ok(Response::from(resp))
    }
}

fn between<'a>(haystack: &'a str, open: &str, close: &str) -> Option<&'a str> {
    let start = haystack.find(open)? + open.len();
    let len = haystack[start..].find(close)?;
    Some(&haystack[start..start + len])
}

/// A success response carrying `value_xml` inside `<value>`.
pub fn success_xml(value_xml: &str) -> String {
    format!(
        "<?xml version=\"1.0\"?><methodResponse><params><param><value>{value_xml}</value>\
         </param></params></methodResponse>"
    )
}

/// A fault response.
pub fn fault_xml(code: i32, message: &str) -> String {
    format!(
        "<?xml version=\"1.0\"?><methodResponse><fault><value><struct>\
         <member><name>faultCode</name><value><int>{code}</int></value></member>\
         <member><name>faultString</name><value><string>{message}</string></value></member>\
         </struct></value></fault></methodResponse>"
    )
}
