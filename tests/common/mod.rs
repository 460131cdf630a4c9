//! Fixture-backed pGuide server for the integration tests.

use std::collections::HashMap;
use std::fs;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use famas_parking::fetch::HttpClient;
use reqwest::{Request, Response};

type Key = (String, Option<i32>);

/// Reads `tests/fixtures/<name>`.
pub fn fixture(name: &str) -> String {
    let path = format!("{}/tests/fixtures/{name}", env!("CARGO_MANIFEST_DIR"));
    fs::read_to_string(&path).expect("fixture missing")
}

/// Answers calls with canned XML keyed by method and first int param.
/// Unscripted calls get a 404.
#[derive(Clone, Default)]
pub struct ScriptedClient {
    responses: HashMap<Key, String>,
    calls: Arc<Mutex<Vec<Key>>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, method: &str, xml: String) -> Self {
        self.responses.insert((method.to_string(), None), xml);
        self
    }

    pub fn on_id(mut self, method: &str, id: i32, xml: String) -> Self {
        self.responses.insert((method.to_string(), Some(id)), xml);
        self
    }

    pub fn calls(&self) -> Vec<Key> {
        self.calls.lock().unwrap().clone()
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
        self.calls.lock().unwrap().push(key);

        let mut resp = http::Response::new(canned.clone().unwrap_or_default());
        if canned.is_none() {
            *resp.status_mut() = http::StatusCode::NOT_FOUND;
        }
        Ok(Response::from(resp))
    }
}

fn between<'a>(haystack: &'a str, open: &str, close: &str) -> Option<&'a str> {
    let start = haystack.find(open)? + open.len();
    let len = haystack[start..].find(close)?;
    Some(&haystack[start..start + len])
}
