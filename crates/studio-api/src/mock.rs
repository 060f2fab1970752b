/// Scripted Request port for tests and offline demos
///
/// Routes match on method + longest path prefix. Each route answers from a
/// queue of one-shot envelopes, then from its sticky fallback. A route can be
/// gated so calls park until the test opens the gate.
use crate::{
    ApiError, Envelope, Method, NoticeKind, Notifier, RequestPort, UnauthorizedHandler,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

/// Holds matching calls until [`Gate::open`] is called.
#[derive(Clone)]
pub struct Gate {
    tx: Arc<watch::Sender<bool>>,
}

impl Gate {
    fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn open(&self) {
        self.tx.send_replace(true);
    }

    async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|open| *open).await;
    }
}

struct Route {
    method: Method,
    prefix: String,
    queued: VecDeque<Result<Envelope, ApiError>>,
    fallback: Option<Result<Envelope, ApiError>>,
    gate: Option<Gate>,
}

#[derive(Default)]
struct MockState {
    routes: Vec<Route>,
    calls: Vec<RecordedCall>,
}

impl MockState {
    fn route_mut(&mut self, method: Method, prefix: &str) -> &mut Route {
        let idx = match self
            .routes
            .iter()
            .position(|r| r.method == method && r.prefix == prefix)
        {
            Some(idx) => idx,
            None => {
                self.routes.push(Route {
                    method,
                    prefix: prefix.to_string(),
                    queued: VecDeque::new(),
                    fallback: None,
                    gate: None,
                });
                self.routes.len() - 1
            }
        };
        &mut self.routes[idx]
    }

    fn best_match(&mut self, method: Method, path: &str) -> Option<&mut Route> {
        self.routes
            .iter_mut()
            .filter(|r| r.method == method && path.starts_with(&r.prefix))
            .max_by_key(|r| r.prefix.len())
    }
}

#[derive(Default)]
pub struct MockRequestPort {
    state: Mutex<MockState>,
}

impl MockRequestPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a one-shot envelope for the next matching call.
    pub fn respond(&self, method: Method, prefix: &str, envelope: Envelope) {
        self.state
            .lock()
            .route_mut(method, prefix)
            .queued
            .push_back(Ok(envelope));
    }

    /// Queue a one-shot transport-level failure.
    pub fn fail(&self, method: Method, prefix: &str, error: ApiError) {
        self.state
            .lock()
            .route_mut(method, prefix)
            .queued
            .push_back(Err(error));
    }

    /// Answer every matching call once the queue is drained.
    pub fn respond_always(&self, method: Method, prefix: &str, envelope: Envelope) {
        self.state.lock().route_mut(method, prefix).fallback = Some(Ok(envelope));
    }

    /// Park matching calls until the returned gate is opened.
    pub fn gate(&self, method: Method, prefix: &str) -> Gate {
        let gate = Gate::new();
        self.state.lock().route_mut(method, prefix).gate = Some(gate.clone());
        gate
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().calls.clone()
    }

    pub fn calls_to(&self, prefix: &str) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.path.starts_with(prefix))
            .count()
    }

    pub fn last_call_to(&self, prefix: &str) -> Option<RecordedCall> {
        self.state
            .lock()
            .calls
            .iter()
            .rev()
            .find(|c| c.path.starts_with(prefix))
            .cloned()
    }
}

#[async_trait::async_trait]
impl RequestPort for MockRequestPort {
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Envelope, ApiError> {
        let (reply, gate) = {
            let mut state = self.state.lock();
            state.calls.push(RecordedCall {
                method,
                path: path.to_string(),
                body,
            });
            match state.best_match(method, path) {
                Some(route) => {
                    let reply = route
                        .queued
                        .pop_front()
                        .or_else(|| route.fallback.clone());
                    (reply, route.gate.clone())
                }
                None => (None, None),
            }
        };

        if let Some(gate) = gate {
            gate.wait().await;
        }

        reply.unwrap_or_else(|| {
            Ok(Envelope::rejected(
                404,
                format!("no mock route for {method} {path}"),
            ))
        })
    }
}

/// Notifier that keeps every toast for later assertions.
#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<(NoticeKind, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<(NoticeKind, String)> {
        self.notices.lock().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.notices
            .lock()
            .iter()
            .filter(|(kind, _)| *kind == NoticeKind::Error)
            .map(|(_, text)| text.clone())
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, kind: NoticeKind, text: &str) {
        self.notices.lock().push((kind, text.to_string()));
    }
}

/// Counts unauthorized callbacks.
#[derive(Default)]
pub struct CountingUnauthorized {
    hits: AtomicUsize,
}

impl CountingUnauthorized {
    pub fn count(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

impl UnauthorizedHandler for CountingUnauthorized {
    fn on_unauthorized(&self) {
        self.hits.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_queue_then_fallback() {
        let port = MockRequestPort::new();
        port.respond(Method::Get, "/scene", Envelope::ok(json!(1)));
        port.respond_always(Method::Get, "/scene", Envelope::ok(json!(2)));

        let first = port.request(Method::Get, "/scene/list", None).await.unwrap();
        let second = port.request(Method::Get, "/scene/list", None).await.unwrap();
        let third = port.request(Method::Get, "/scene/list", None).await.unwrap();
        assert_eq!(first.data, Some(json!(1)));
        assert_eq!(second.data, Some(json!(2)));
        assert_eq!(third.data, Some(json!(2)));
        assert_eq!(port.calls_to("/scene"), 3);
    }

    #[tokio::test]
    async fn test_longest_prefix_wins() {
        let port = MockRequestPort::new();
        port.respond_always(Method::Post, "/content", Envelope::ok(json!("generic")));
        port.respond_always(Method::Post, "/content/sort", Envelope::ok(json!("sort")));

        let reply = port.request(Method::Post, "/content/sort", None).await.unwrap();
        assert_eq!(reply.data, Some(json!("sort")));
        let reply = port.request(Method::Post, "/content/create", None).await.unwrap();
        assert_eq!(reply.data, Some(json!("generic")));
    }

    #[tokio::test]
    async fn test_unrouted_call_rejected() {
        let port = MockRequestPort::new();
        let reply = port.request(Method::Delete, "/nowhere", None).await.unwrap();
        assert_eq!(reply.code, 404);
    }

    #[tokio::test]
    async fn test_gate_parks_until_open() {
        let port = Arc::new(MockRequestPort::new());
        port.respond(Method::Get, "/slow", Envelope::ok_empty());
        let gate = port.gate(Method::Get, "/slow");

        let (reply, _) = tokio::join!(port.request(Method::Get, "/slow", None), async {
            tokio::task::yield_now().await;
            assert_eq!(port.calls_to("/slow"), 1);
            gate.open();
        });
        assert!(reply.unwrap().is_ok());
    }
}
