// RPC-registration adapter.
//
// Routes become callables registered with an external session object
// under composed names `<prefix>.<method>.<route path>`. The reply is the
// RPC return payload itself; there is no native status channel, so the
// status code travels inside the structured result as `statusCode`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::oneshot;

use polyroute_core::{
    DispatchFn, Error, Result, RouteSpec, Scope, Transport,
};

/// A registered RPC callable: inbound payload to reply payload.
pub type RpcCallee = Arc<dyn Fn(Value) -> BoxFuture<'static, Value> + Send + Sync>;

/// Opaque handle returned by a session registration, needed to undo it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcRegistration {
    pub id: u64,
    pub name: String,
}

/// The RPC session boundary: whatever protocol object accepts named
/// callables (registration-style RPC).
pub trait RpcSession: Send + Sync {
    fn register(&self, name: &str, callee: RpcCallee) -> RpcRegistration;
    fn unregister(&self, registration: &RpcRegistration);
}

struct RpcScopeData {
    payload: Value,
    reply: Mutex<Option<oneshot::Sender<Value>>>,
}

/// The RPC-registration transport variant.
pub struct RpcTransport {
    session: Arc<dyn RpcSession>,
    prefix: String,
    registrations: Mutex<HashMap<String, RpcRegistration>>,
}

impl RpcTransport {
    pub fn new(session: Arc<dyn RpcSession>, prefix: impl Into<String>) -> Arc<Self> {
        Arc::new(RpcTransport {
            session,
            prefix: prefix.into(),
            registrations: Mutex::new(HashMap::new()),
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn registration_count(&self) -> usize {
        self.registrations.lock().len()
    }

    fn route_name(&self, route: &RouteSpec) -> Result<String> {
        let prefix = route.paths.first().ok_or_else(|| {
            Error::Transport(format!("no mount path for action {}", route.action.name))
        })?;
        Ok(format!(
            "{}.{}.{}",
            self.prefix,
            route.method,
            route.full_path(prefix)
        ))
    }

    fn data<'a>(&self, scope: &'a Scope) -> Option<&'a RpcScopeData> {
        scope.transport_data::<RpcScopeData>()
    }
}

#[async_trait]
impl Transport for RpcTransport {
    fn name(&self) -> &'static str {
        "rpc"
    }

    fn add_route(self: Arc<Self>, route: &RouteSpec, dispatch: DispatchFn) -> Result<()> {
        let name = self.route_name(route)?;
        let action = Arc::clone(&route.action);
        let transport: Arc<dyn Transport> = Arc::clone(&self) as Arc<dyn Transport>;

        let callee: RpcCallee = Arc::new(move |payload: Value| {
            let action = Arc::clone(&action);
            let transport = Arc::clone(&transport);
            let dispatch = Arc::clone(&dispatch);
            Box::pin(async move {
                let (tx, rx) = oneshot::channel();
                let scope = Scope::new(
                    action,
                    transport,
                    Box::new(RpcScopeData {
                        payload,
                        reply: Mutex::new(Some(tx)),
                    }),
                );
                dispatch(scope).await;
                rx.await.unwrap_or(Value::Null)
            })
        });

        let registration = self.session.register(&name, callee);
        self.registrations.lock().insert(name, registration);
        Ok(())
    }

    fn remove_route(&self, route: &RouteSpec) -> Result<()> {
        let name = self.route_name(route)?;
        let registration = self.registrations.lock().remove(&name).ok_or_else(|| {
            Error::Transport(format!("no registration for {}", name))
        })?;
        self.session.unregister(&registration);
        Ok(())
    }

    fn get_body(&self, scope: &Scope) -> Value {
        self.data(scope)
            .and_then(|d| d.payload.get("body").cloned())
            .unwrap_or(Value::Null)
    }

    fn get_params(&self, scope: &Scope) -> Value {
        self.data(scope)
            .and_then(|d| d.payload.get("params").cloned())
            .unwrap_or_else(|| json!({}))
    }

    fn get_query(&self, scope: &Scope) -> Value {
        self.data(scope)
            .and_then(|d| d.payload.get("query").cloned())
            .unwrap_or(Value::Null)
    }

    fn set_res_data(&self, data: Option<&Value>, scope: &Scope, status: u16) {
        scope.buffer(data.cloned(), status);
    }

    async fn send_result(&self, result: Option<Value>, scope: &Scope) {
        let Some(data) = self.data(scope) else {
            return;
        };
        let result = result.or_else(|| scope.result());
        let reply = json!({
            "data": result,
            "statusCode": scope.status(),
        });
        if let Some(tx) = data.reply.lock().take() {
            let _ = tx.send(reply);
        }
    }
}
