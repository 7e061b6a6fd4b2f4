// HTTP request/response adapter.
//
// The concrete HTTP server is an external collaborator: whatever listens
// on the wire turns a native request into an `HttpRequest` (path params
// already extracted by its router) and calls `handle`, which resolves the
// registered route, runs the auth gate, dispatches, and resolves to the
// buffered `HttpResponse`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use polyroute_core::{
    Action, ActionError, AuthGate, DispatchFn, Error, HttpStatus, Result, RouteSpec, Scope,
    Transport,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    /// Path parameters, extracted by the server's router.
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub query: Value,
    #[serde(default)]
    pub body: Value,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl HttpRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        HttpRequest {
            method: method.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    pub fn params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }

    pub fn query(mut self, query: Value) -> Self {
        self.query = query;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Option<Value>,
}

/// Per-action auth gate factory installed on the transport.
pub type AuthGateFactory = Arc<dyn Fn(&Action) -> Option<AuthGate> + Send + Sync>;

struct HttpScopeData {
    request: HttpRequest,
    reply: Mutex<Option<oneshot::Sender<HttpResponse>>>,
}

#[derive(Clone)]
struct HttpRoute {
    auth: Option<AuthGate>,
    dispatch: DispatchFn,
    action: Arc<Action>,
}

/// The request/response transport variant.
pub struct HttpTransport {
    routes: RwLock<HashMap<(String, String), HttpRoute>>,
    auth: Option<AuthGateFactory>,
}

impl HttpTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(HttpTransport {
            routes: RwLock::new(HashMap::new()),
            auth: None,
        })
    }

    pub fn with_auth(auth: AuthGateFactory) -> Arc<Self> {
        Arc::new(HttpTransport {
            routes: RwLock::new(HashMap::new()),
            auth: Some(auth),
        })
    }

    pub fn route_count(&self) -> usize {
        self.routes.read().len()
    }

    pub fn has_route(&self, method: &str, path: &str) -> bool {
        self.routes
            .read()
            .contains_key(&(method.to_ascii_lowercase(), path.to_string()))
    }

    /// Native entry point: one inbound request, one structured response.
    pub async fn handle(self: &Arc<Self>, request: HttpRequest) -> HttpResponse {
        let key = (request.method.to_ascii_lowercase(), request.path.clone());
        let Some(route) = self.routes.read().get(&key).cloned() else {
            let err = ActionError::with_status(
                HttpStatus::NOT_FOUND,
                format!("no route for {} {}", request.method, request.path),
            );
            let (status, body) = err.to_response();
            return HttpResponse {
                status,
                body: Some(body),
            };
        };

        if let Some(gate) = &route.auth {
            let summary = json!({
                "method": request.method,
                "path": request.path,
                "query": request.query,
                "headers": request.headers,
            });
            if let Err(err) = gate(&summary) {
                debug!("auth gate rejected {} {}", request.method, request.path);
                let (status, body) = err.to_response();
                return HttpResponse {
                    status,
                    body: Some(body),
                };
            }
        }

        let (tx, rx) = oneshot::channel();
        let scope = Scope::new(
            Arc::clone(&route.action),
            Arc::clone(self) as Arc<dyn Transport>,
            Box::new(HttpScopeData {
                request,
                reply: Mutex::new(Some(tx)),
            }),
        );
        (route.dispatch)(scope).await;

        rx.await.unwrap_or_else(|_| {
            let (status, body) = ActionError::internal().to_response();
            HttpResponse {
                status,
                body: Some(body),
            }
        })
    }

    fn data<'a>(&self, scope: &'a Scope) -> Option<&'a HttpScopeData> {
        scope.transport_data::<HttpScopeData>()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    fn add_route(self: Arc<Self>, route: &RouteSpec, dispatch: DispatchFn) -> Result<()> {
        let auth = self.auth_gate(&route.action);
        let mut routes = self.routes.write();
        for path in route.full_paths() {
            let key = (route.method.to_ascii_lowercase(), path.clone());
            if routes.contains_key(&key) {
                return Err(Error::Transport(format!(
                    "route already registered: {} {}",
                    route.method, path
                )));
            }
            routes.insert(
                key,
                HttpRoute {
                    auth: auth.clone(),
                    dispatch: Arc::clone(&dispatch),
                    action: Arc::clone(&route.action),
                },
            );
        }
        Ok(())
    }

    fn remove_route(&self, route: &RouteSpec) -> Result<()> {
        let mut routes = self.routes.write();
        for path in route.full_paths() {
            routes.remove(&(route.method.to_ascii_lowercase(), path));
        }
        Ok(())
    }

    fn get_body(&self, scope: &Scope) -> Value {
        self.data(scope)
            .map(|d| d.request.body.clone())
            .unwrap_or(Value::Null)
    }

    fn get_params(&self, scope: &Scope) -> Value {
        self.data(scope)
            .map(|d| d.request.params.clone())
            .unwrap_or(Value::Null)
    }

    fn get_query(&self, scope: &Scope) -> Value {
        self.data(scope)
            .map(|d| d.request.query.clone())
            .unwrap_or(Value::Null)
    }

    fn set_res_data(&self, data: Option<&Value>, scope: &Scope, status: u16) {
        // HEAD replies carry the status but never a body.
        let head = self
            .data(scope)
            .map(|d| d.request.method.eq_ignore_ascii_case("head"))
            .unwrap_or(false);
        let payload = if head { None } else { data.cloned() };
        scope.buffer(payload, status);
    }

    async fn send_result(&self, result: Option<Value>, scope: &Scope) {
        let Some(data) = self.data(scope) else {
            return;
        };
        let sender = data.reply.lock().take();
        match sender {
            Some(tx) => {
                let response = HttpResponse {
                    status: scope.status().unwrap_or(HttpStatus::OK.code),
                    body: result.or_else(|| scope.result()),
                };
                let _ = tx.send(response);
            }
            None => warn!("response already sent for scope {}", scope.id()),
        }
    }

    fn auth_gate(&self, action: &Action) -> Option<AuthGate> {
        self.auth.as_ref().and_then(|factory| factory(action))
    }
}
