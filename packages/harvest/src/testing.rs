//! Scripted transport and fixtures shared by the unit tests.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::backoff::{BackoffPolicy, Jitter};
use crate::config::HarvestConfig;
use crate::transport::{ApiRequest, RawResponse, Transport, TransportError};

#[derive(Debug, Clone)]
enum Step {
    Respond(RawResponse),
    Fail,
    Hang,
}

/// A [`Transport`] that replays scripted responses per route.
///
/// A route is the request path, suffixed with `?pageToken=<token>` when the
/// request carries a page token. Steps are consumed in order; the last step
/// of a route repeats forever. Unknown routes answer 404.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    routes: Mutex<BTreeMap<String, VecDeque<Step>>>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, route: &str, step: Step) {
        self.routes
            .lock()
            .unwrap()
            .entry(route.to_string())
            .or_default()
            .push_back(step);
    }

    pub fn respond(&self, route: &str, response: RawResponse) {
        self.push(route, Step::Respond(response));
    }

    pub fn fail(&self, route: &str) {
        self.push(route, Step::Fail);
    }

    pub fn hang(&self, route: &str) {
        self.push(route, Step::Hang);
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self, route: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| route_key(r) == route)
            .count()
    }

    fn next_step(&self, route: &str) -> Option<Step> {
        let mut routes = self.routes.lock().unwrap();
        let queue = routes.get_mut(route)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

fn route_key(request: &ApiRequest) -> String {
    match request.query_param("pageToken") {
        Some(token) => format!("{}?pageToken={token}", request.path),
        None => request.path.clone(),
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(&self, request: &ApiRequest) -> Result<RawResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        let route = route_key(request);

        match self.next_step(&route) {
            Some(Step::Respond(response)) => Ok(response),
            Some(Step::Fail) => Err(TransportError::Timeout(Duration::from_secs(30))),
            Some(Step::Hang) => std::future::pending().await,
            None => Ok(RawResponse {
                status: 404,
                retry_after: None,
                body: "{}".to_string(),
            }),
        }
    }
}

pub fn ok_json(value: &serde_json::Value) -> RawResponse {
    RawResponse {
        status: 200,
        retry_after: None,
        body: value.to_string(),
    }
}

pub const fn deterministic_policy(max_retries: u32) -> BackoffPolicy {
    BackoffPolicy {
        max_retries,
        cap: Duration::from_secs(8),
        jitter: Jitter::None,
    }
}

/// Configuration with no jitter, no page delay and a small retry budget.
pub fn test_config() -> HarvestConfig {
    HarvestConfig {
        concurrency: 1,
        max_retries: 2,
        jitter: false,
        page_delay_ms: 0,
        ..HarvestConfig::default()
    }
}

/// A catalog detail payload with a name, images and sales ranks.
pub fn detail_payload(identifier: &str, ranks: &[i64]) -> serde_json::Value {
    let ranks: Vec<serde_json::Value> = ranks
        .iter()
        .enumerate()
        .map(|(i, rank)| serde_json::json!({"title": format!("Category {i}"), "rank": rank}))
        .collect();
    serde_json::json!({
        "asin": identifier,
        "summaries": [{"itemName": format!("Item {identifier}"), "brand": "Acme"}],
        "images": [{
            "marketplaceId": "ATVPDKIKX0DER",
            "images": [
                {"variant": "MAIN", "link": format!("https://img.example.com/{identifier}-main.jpg"), "width": 500, "height": 500},
                {"variant": "SWATCH", "link": format!("https://img.example.com/{identifier}-swatch.jpg"), "width": 30, "height": 30}
            ]
        }],
        "salesRanks": [{"marketplaceId": "ATVPDKIKX0DER", "classificationRanks": ranks}]
    })
}
