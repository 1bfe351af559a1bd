//! Shared test support: a scripted in-process transport.
//!
//! Routes are matched in registration order; each route holds a queue of
//! scripted outcomes. The last outcome of a route is sticky so a route can
//! model "fail twice, then succeed forever".

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use syncline::{SyncError, Transport, TransportRequest, TransportResponse};

type Matcher = Box<dyn Fn(&TransportRequest) -> bool + Send + Sync>;

/// One scripted transport outcome.
#[derive(Debug, Clone)]
pub enum Scripted {
    Respond { status: u16, headers: Vec<(String, String)>, body: String },
    Fail(SyncError),
    Delayed { delay: Duration, status: u16, body: String },
}

/// A 200 response with the given JSON body.
pub fn ok_json(body: impl Into<String>) -> Scripted {
    Scripted::Respond { status: 200, headers: Vec::new(), body: body.into() }
}

/// A response with the given status and body.
pub fn status(code: u16, body: impl Into<String>) -> Scripted {
    Scripted::Respond { status: code, headers: Vec::new(), body: body.into() }
}

/// A response with the given status, a single header, and an empty body.
pub fn status_with_header(code: u16, name: &str, value: &str) -> Scripted {
    Scripted::Respond {
        status: code,
        headers: vec![(name.to_string(), value.to_string())],
        body: String::new(),
    }
}

/// A transport-level failure.
pub fn fail(error: SyncError) -> Scripted {
    Scripted::Fail(error)
}

/// A response delivered only after the given delay.
pub fn delayed(delay_ms: u64, code: u16, body: impl Into<String>) -> Scripted {
    Scripted::Delayed { delay: Duration::from_millis(delay_ms), status: code, body: body.into() }
}

/// Standard login response body.
pub fn login_body(expires_in: i64) -> String {
    format!(
        r#"{{"access_token": "tok-test", "token_type": "Bearer", "expires_in": {expires_in}}}"#
    )
}

struct Route {
    name: String,
    matcher: Matcher,
    responses: VecDeque<Scripted>,
}

/// Scripted transport for deterministic pipeline tests.
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<Vec<Route>>,
    hits: Mutex<HashMap<String, usize>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a route. Routes are tried in registration order.
    pub fn on<M>(&self, name: &str, matcher: M, responses: Vec<Scripted>)
    where
        M: Fn(&TransportRequest) -> bool + Send + Sync + 'static,
    {
        assert!(!responses.is_empty(), "route '{name}' needs at least one response");
        self.routes.lock().unwrap().push(Route {
            name: name.to_string(),
            matcher: Box::new(matcher),
            responses: responses.into(),
        });
    }

    /// Register the standard login route with a long-lived token.
    pub fn on_login(&self) {
        self.on(
            "login",
            |request| request.url.contains("/auth/login"),
            vec![ok_json(login_body(3600))],
        );
    }

    /// Number of times the named route was hit.
    pub fn hits(&self, name: &str) -> usize {
        self.hits.lock().unwrap().get(name).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, SyncError> {
        let scripted = {
            let mut routes = self.routes.lock().unwrap();
            let route = routes
                .iter_mut()
                .find(|route| (route.matcher)(&request))
                .unwrap_or_else(|| {
                    panic!("no scripted route for {} {}", request.method, request.url)
                });

            *self.hits.lock().unwrap().entry(route.name.clone()).or_insert(0) += 1;

            if route.responses.len() > 1 {
                route.responses.pop_front().expect("non-empty response queue")
            } else {
                route.responses.front().expect("non-empty response queue").clone()
            }
        };

        match scripted {
            Scripted::Respond { status, headers, body } => {
                Ok(TransportResponse::new(status, headers, body))
            }
            Scripted::Fail(error) => Err(error),
            Scripted::Delayed { delay, status, body } => {
                tokio::time::sleep(delay).await;
                Ok(TransportResponse::new(status, Vec::new(), body))
            }
        }
    }
}
