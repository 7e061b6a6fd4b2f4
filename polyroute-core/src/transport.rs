use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;

use crate::action::Action;
use crate::error::{ActionError, Result};
use crate::scope::Scope;

/// The transport-agnostic dispatch wrapper built by `Controller::bind`:
/// runs the handler, translates the outcome, sends the result.
pub type DispatchFn = Arc<dyn Fn(Arc<Scope>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Pre-handler authorization gate. The transport hands it a JSON summary
/// of the native request; a returned error becomes the response.
pub type AuthGate =
    Arc<dyn Fn(&Value) -> std::result::Result<(), ActionError> + Send + Sync>;

/// Everything needed to register or deregister one route. `add_route` and
/// `remove_route` receive the same composition, which is what makes
/// bind/unbind exact inverses.
#[derive(Clone)]
pub struct RouteSpec {
    pub method: String,
    /// Controller mount prefixes.
    pub paths: Vec<String>,
    pub action: Arc<Action>,
}

impl RouteSpec {
    /// One full path per mount prefix: `<prefix>/<action path>`, or just
    /// the prefix when the action path is empty.
    pub fn full_paths(&self) -> Vec<String> {
        self.paths.iter().map(|p| self.full_path(p)).collect()
    }

    pub fn full_path(&self, prefix: &str) -> String {
        if self.action.path.is_empty() {
            prefix.to_string()
        } else {
            format!("{}/{}", prefix, self.action.path)
        }
    }

    /// Dispatch-table key used by the socket-style transports:
    /// `<method>:<first full path>`.
    pub fn socket_key(&self) -> Result<String> {
        let prefix = self.paths.first().ok_or_else(|| {
            crate::error::Error::Transport(format!(
                "no mount path for action {}",
                self.action.name
            ))
        })?;
        Ok(format!("{}:{}", self.method, self.full_path(prefix)))
    }
}

impl std::fmt::Debug for RouteSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteSpec")
            .field("method", &self.method)
            .field("paths", &self.paths)
            .field("action", &self.action.name)
            .finish()
    }
}

/// The capability contract every transport adapter satisfies.
///
/// One trait, four variants (HTTP request/response, two event-socket
/// flavors, RPC registration); the dispatch wrapper never branches on
/// which one it is talking to.
#[async_trait]
pub trait Transport: Send + Sync {
    fn name(&self) -> &'static str;

    /// Register a protocol-native route that, on invocation, builds a
    /// `Scope` and hands it to `dispatch`.
    fn add_route(self: Arc<Self>, route: &RouteSpec, dispatch: DispatchFn) -> Result<()>;

    /// Exact inverse of `add_route` for the same spec.
    fn remove_route(&self, route: &RouteSpec) -> Result<()>;

    fn get_body(&self, scope: &Scope) -> Value;
    fn get_params(&self, scope: &Scope) -> Value;
    fn get_query(&self, scope: &Scope) -> Value;

    /// Buffer outgoing payload and status on the scope.
    fn set_res_data(&self, data: Option<&Value>, scope: &Scope, status: u16);

    /// Emit the buffered result on the native channel. Called exactly once
    /// per invocation.
    async fn send_result(&self, result: Option<Value>, scope: &Scope);

    /// Optional pre-handler authorization gate for an action.
    fn auth_gate(&self, _action: &Action) -> Option<AuthGate> {
        None
    }

    /// Lifecycle no-ops kept for adapters that need setup/teardown hooks.
    fn pre(&self) {}
    fn post(&self) {}
}
