use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::error::{ActionError, ParseErrorFn};
use crate::scope::Scope;
use crate::transport::Transport;

/// What an action handler is: async work over a scope, resolving to an
/// optional payload or a request-time failure.
pub type Handler = Arc<
    dyn Fn(Arc<Scope>) -> BoxFuture<'static, std::result::Result<Option<Value>, ActionError>>
        + Send
        + Sync,
>;

/// Wrap an async closure into a boxed [`Handler`].
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(Arc<Scope>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<Option<Value>, ActionError>> + Send + 'static,
{
    Arc::new(move |scope| Box::pin(f(scope)))
}

/// Per-action override of the controller's buffered-data translation.
pub type SetResDataFn = Arc<dyn Fn(Option<Value>, &Scope, Option<u16>) + Send + Sync>;
/// Per-action override of the controller's error translation.
pub type SetResErrorFn = Arc<dyn Fn(ActionError, &Scope) + Send + Sync>;
/// Per-action override of the controller's result sending.
pub type SendResultFn = Arc<dyn Fn(Arc<Scope>) -> BoxFuture<'static, ()> + Send + Sync>;

/// HTTP-verb-like method configuration: a single verb or a list.
#[derive(Debug, Clone)]
pub enum MethodSpec {
    One(String),
    Many(Vec<String>),
}

impl MethodSpec {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            MethodSpec::One(m) => vec![m],
            MethodSpec::Many(ms) => ms,
        }
    }
}

impl From<&str> for MethodSpec {
    fn from(m: &str) -> Self {
        MethodSpec::One(m.to_string())
    }
}

impl From<String> for MethodSpec {
    fn from(m: String) -> Self {
        MethodSpec::One(m)
    }
}

impl From<Vec<&str>> for MethodSpec {
    fn from(ms: Vec<&str>) -> Self {
        MethodSpec::Many(ms.into_iter().map(str::to_string).collect())
    }
}

impl From<Vec<String>> for MethodSpec {
    fn from(ms: Vec<String>) -> Self {
        MethodSpec::Many(ms)
    }
}

/// Raw per-action configuration. Every field is optional; unset fields
/// fall back to the controller's action defaults, which in turn sit on
/// top of the built-ins (`enabled=true`, `method=get`, `priority=1`).
#[derive(Clone, Default)]
pub struct ActionOptions {
    pub enabled: Option<bool>,
    pub method: Option<MethodSpec>,
    /// Path suffix under the controller prefix; defaults to the action key.
    pub path: Option<String>,
    pub priority: Option<i32>,
    /// Subset of the controller's transports; defaults to all of them.
    pub transports: Option<Vec<Arc<dyn Transport>>>,
    pub handler: Option<Handler>,
    /// Name to resolve in the controller's handler map when no closure is
    /// given; the action key itself is tried last.
    pub handler_name: Option<String>,
    pub parse_error: Option<ParseErrorFn>,
    pub set_res_data: Option<SetResDataFn>,
    pub set_res_error: Option<SetResErrorFn>,
    pub send_result: Option<SendResultFn>,
}

impl ActionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    pub fn method(mut self, method: impl Into<MethodSpec>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn transports(mut self, transports: Vec<Arc<dyn Transport>>) -> Self {
        self.transports = Some(transports);
        self
    }

    pub fn handler(mut self, handler: Handler) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn handler_name(mut self, name: impl Into<String>) -> Self {
        self.handler_name = Some(name.into());
        self
    }

    pub fn parse_error(mut self, hook: ParseErrorFn) -> Self {
        self.parse_error = Some(hook);
        self
    }

    /// Explicit options win field by field over `defaults`.
    pub fn overlaid_on(self, defaults: &ActionOptions) -> ActionOptions {
        ActionOptions {
            enabled: self.enabled.or(defaults.enabled),
            method: self.method.or_else(|| defaults.method.clone()),
            path: self.path.or_else(|| defaults.path.clone()),
            priority: self.priority.or(defaults.priority),
            transports: self.transports.or_else(|| defaults.transports.clone()),
            handler: self.handler.or_else(|| defaults.handler.clone()),
            handler_name: self.handler_name.or_else(|| defaults.handler_name.clone()),
            parse_error: self.parse_error.or_else(|| defaults.parse_error.clone()),
            set_res_data: self.set_res_data.or_else(|| defaults.set_res_data.clone()),
            set_res_error: self.set_res_error.or_else(|| defaults.set_res_error.clone()),
            send_result: self.send_result.or_else(|| defaults.send_result.clone()),
        }
    }
}

/// An action entry in the controller configuration. A bare boolean is an
/// enabled/disabled toggle over the defaults.
#[derive(Clone)]
pub enum ActionConfig {
    Toggle(bool),
    Options(ActionOptions),
}

impl From<bool> for ActionConfig {
    fn from(enabled: bool) -> Self {
        ActionConfig::Toggle(enabled)
    }
}

impl From<ActionOptions> for ActionConfig {
    fn from(options: ActionOptions) -> Self {
        ActionConfig::Options(options)
    }
}

/// Response-pipeline overrides an action may carry. Checked before
/// delegating to the owning controller.
#[derive(Clone, Default)]
pub struct ResponseOverrides {
    pub set_res_data: Option<SetResDataFn>,
    pub set_res_error: Option<SetResErrorFn>,
    pub send_result: Option<SendResultFn>,
}

/// A named, fully-resolved unit of request handling.
///
/// Built once during controller construction from the merged controller
/// defaults and per-action options; immutable afterwards. Routes derived
/// from it live from `bind()` to `unbind()`.
pub struct Action {
    pub name: String,
    /// Path suffix appended to each controller mount prefix.
    pub path: String,
    pub methods: Vec<String>,
    /// Bind ordering only; does not affect request routing.
    pub priority: i32,
    pub enabled: bool,
    pub transports: Vec<Arc<dyn Transport>>,
    pub handler: Handler,
    pub parse_error: Option<ParseErrorFn>,
    pub overrides: ResponseOverrides,
}

impl std::fmt::Debug for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("methods", &self.methods)
            .field("priority", &self.priority)
            .field("enabled", &self.enabled)
            .field("transports", &self.transports.iter().map(|t| t.name()).collect::<Vec<_>>())
            .finish()
    }
}
