#![allow(dead_code)]

// In-memory stand-ins for the native collaborators at the transport
// boundary: a recording transport for controller-level tests, plus
// channel-free mock socket servers/connections and an RPC session.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use polyroute_core::{
    Action, ActionError, AuthGate, DispatchFn, Result, RouteSpec, Scope, Transport,
};
use polyroute_transports::{
    EmitConnection, EmitServer, FrameConnection, FrameServer, MessageHandler, PayloadHandler,
    RpcCallee, RpcRegistration, RpcSession,
};

/// Route tracing output through the test harness. Idempotent.
pub fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Poll until `cond` holds; panics after ~1s. Socket dispatch is spawned,
/// so replies land asynchronously.
pub async fn wait_until<F: Fn() -> bool>(cond: F) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met in time");
}

struct MockScopeData {
    body: Value,
    params: Value,
    query: Value,
}

/// A transport that records every add/remove call and every sent result,
/// and lets tests drive a registered dispatch function directly.
pub struct RecordingTransport {
    log: Mutex<Vec<String>>,
    routes: Mutex<HashMap<String, (Arc<Action>, DispatchFn)>>,
    sent: Mutex<Vec<(Option<Value>, Option<u16>)>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(RecordingTransport {
            log: Mutex::new(Vec::new()),
            routes: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    pub fn route_count(&self) -> usize {
        self.routes.lock().len()
    }

    pub fn route_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.routes.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn sent(&self) -> Vec<(Option<Value>, Option<u16>)> {
        self.sent.lock().clone()
    }

    /// Drive the dispatch registered under `key` with an empty request.
    pub async fn invoke(self: &Arc<Self>, key: &str) -> Option<(Option<Value>, Option<u16>)> {
        self.invoke_with(key, Value::Null, Value::Null, Value::Null)
            .await
    }

    pub async fn invoke_with(
        self: &Arc<Self>,
        key: &str,
        body: Value,
        params: Value,
        query: Value,
    ) -> Option<(Option<Value>, Option<u16>)> {
        let (action, dispatch) = self.routes.lock().get(key).cloned()?;
        let scope = Scope::new(
            action,
            Arc::clone(self) as Arc<dyn Transport>,
            Box::new(MockScopeData { body, params, query }),
        );
        dispatch(scope).await;
        self.sent.lock().last().cloned()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn add_route(self: Arc<Self>, route: &RouteSpec, dispatch: DispatchFn) -> Result<()> {
        for path in route.full_paths() {
            let key = format!("{}:{}", route.method, path);
            self.log.lock().push(format!("add {}", key));
            self.routes
                .lock()
                .insert(key, (Arc::clone(&route.action), Arc::clone(&dispatch)));
        }
        Ok(())
    }

    fn remove_route(&self, route: &RouteSpec) -> Result<()> {
        for path in route.full_paths() {
            let key = format!("{}:{}", route.method, path);
            self.log.lock().push(format!("remove {}", key));
            self.routes.lock().remove(&key);
        }
        Ok(())
    }

    fn get_body(&self, scope: &Scope) -> Value {
        scope
            .transport_data::<MockScopeData>()
            .map(|d| d.body.clone())
            .unwrap_or(Value::Null)
    }

    fn get_params(&self, scope: &Scope) -> Value {
        scope
            .transport_data::<MockScopeData>()
            .map(|d| d.params.clone())
            .unwrap_or(Value::Null)
    }

    fn get_query(&self, scope: &Scope) -> Value {
        scope
            .transport_data::<MockScopeData>()
            .map(|d| d.query.clone())
            .unwrap_or(Value::Null)
    }

    fn set_res_data(&self, data: Option<&Value>, scope: &Scope, status: u16) {
        scope.buffer(data.cloned(), status);
    }

    async fn send_result(&self, result: Option<Value>, scope: &Scope) {
        self.sent.lock().push((result, scope.status()));
    }

    fn auth_gate(&self, _action: &Action) -> Option<AuthGate> {
        None
    }
}

/// Frame-socket connection mock: frames out are collected, frames in are
/// injected by the test.
pub struct MockFrameConnection {
    handler: Mutex<Option<MessageHandler>>,
    sent: Mutex<Vec<String>>,
}

impl MockFrameConnection {
    pub fn new() -> Arc<Self> {
        Arc::new(MockFrameConnection {
            handler: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn inject(&self, frame: &str) {
        let handler = self.handler.lock().clone();
        if let Some(handler) = handler {
            handler(frame);
        }
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn last_frame(&self) -> Option<Value> {
        self.sent
            .lock()
            .last()
            .and_then(|frame| serde_json::from_str(frame).ok())
    }
}

impl FrameConnection for MockFrameConnection {
    fn send(&self, frame: &str) -> std::io::Result<()> {
        self.sent.lock().push(frame.to_string());
        Ok(())
    }

    fn on_message(&self, handler: MessageHandler) {
        *self.handler.lock() = Some(handler);
    }
}

pub struct MockFrameServer {
    listeners: Mutex<Vec<Arc<dyn Fn(Arc<dyn FrameConnection>) + Send + Sync>>>,
    subscriptions: AtomicUsize,
}

impl MockFrameServer {
    pub fn new() -> Arc<Self> {
        Arc::new(MockFrameServer {
            listeners: Mutex::new(Vec::new()),
            subscriptions: AtomicUsize::new(0),
        })
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }

    /// Simulate a client connecting: every subscribed listener sees it.
    pub fn connect(&self) -> Arc<MockFrameConnection> {
        let connection = MockFrameConnection::new();
        for listener in self.listeners.lock().iter() {
            listener(Arc::clone(&connection) as Arc<dyn FrameConnection>);
        }
        connection
    }
}

impl FrameServer for MockFrameServer {
    fn on_connection(&self, listener: Arc<dyn Fn(Arc<dyn FrameConnection>) + Send + Sync>) {
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        self.listeners.lock().push(listener);
    }
}

/// Emit-socket connection mock: named-event handlers in, emits out.
pub struct MockEmitConnection {
    handlers: Mutex<HashMap<String, PayloadHandler>>,
    emitted: Mutex<Vec<(String, Value)>>,
}

impl MockEmitConnection {
    pub fn new() -> Arc<Self> {
        Arc::new(MockEmitConnection {
            handlers: Mutex::new(HashMap::new()),
            emitted: Mutex::new(Vec::new()),
        })
    }

    pub fn inject(&self, event: &str, payload: Value) {
        let handler = self.handlers.lock().get(event).cloned();
        if let Some(handler) = handler {
            handler(payload);
        }
    }

    pub fn emitted(&self) -> Vec<(String, Value)> {
        self.emitted.lock().clone()
    }

    pub fn last_emit(&self) -> Option<(String, Value)> {
        self.emitted.lock().last().cloned()
    }
}

impl EmitConnection for MockEmitConnection {
    fn emit(&self, event: &str, payload: &Value) -> std::io::Result<()> {
        self.emitted.lock().push((event.to_string(), payload.clone()));
        Ok(())
    }

    fn on(&self, event: &str, handler: PayloadHandler) {
        self.handlers.lock().insert(event.to_string(), handler);
    }
}

pub struct MockEmitServer {
    listeners: Mutex<Vec<Arc<dyn Fn(Arc<dyn EmitConnection>) + Send + Sync>>>,
    subscriptions: AtomicUsize,
}

impl MockEmitServer {
    pub fn new() -> Arc<Self> {
        Arc::new(MockEmitServer {
            listeners: Mutex::new(Vec::new()),
            subscriptions: AtomicUsize::new(0),
        })
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }

    pub fn connect(&self) -> Arc<MockEmitConnection> {
        let connection = MockEmitConnection::new();
        for listener in self.listeners.lock().iter() {
            listener(Arc::clone(&connection) as Arc<dyn EmitConnection>);
        }
        connection
    }
}

impl EmitServer for MockEmitServer {
    fn on_connection(&self, listener: Arc<dyn Fn(Arc<dyn EmitConnection>) + Send + Sync>) {
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        self.listeners.lock().push(listener);
    }
}

/// RPC session mock: callables registered by name, invoked by the test.
pub struct MockRpcSession {
    next_id: AtomicU64,
    callees: Mutex<HashMap<String, (RpcRegistration, RpcCallee)>>,
    unregistered: Mutex<Vec<String>>,
}

impl MockRpcSession {
    pub fn new() -> Arc<Self> {
        Arc::new(MockRpcSession {
            next_id: AtomicU64::new(1),
            callees: Mutex::new(HashMap::new()),
            unregistered: Mutex::new(Vec::new()),
        })
    }

    pub fn registered(&self) -> Vec<String> {
        let mut names: Vec<String> = self.callees.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn unregistered(&self) -> Vec<String> {
        self.unregistered.lock().clone()
    }

    pub async fn call(&self, name: &str, payload: Value) -> Option<Value> {
        let callee = self.callees.lock().get(name).map(|(_, c)| Arc::clone(c))?;
        Some(callee(payload).await)
    }
}

impl RpcSession for MockRpcSession {
    fn register(&self, name: &str, callee: RpcCallee) -> RpcRegistration {
        let registration = RpcRegistration {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            name: name.to_string(),
        };
        self.callees
            .lock()
            .insert(name.to_string(), (registration.clone(), callee));
        registration
    }

    fn unregister(&self, registration: &RpcRegistration) {
        self.callees.lock().remove(&registration.name);
        self.unregistered.lock().push(registration.name.clone());
    }
}

/// Handler failing with a bare message and no attached status.
pub fn failing_handler(message: &'static str) -> polyroute_core::Handler {
    polyroute_core::handler(move |_scope| async move { Err(ActionError::new(message)) })
}
