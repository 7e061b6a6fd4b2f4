use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::error;

use crate::action::{
    Action, ActionConfig, ActionOptions, Handler, MethodSpec, ResponseOverrides,
};
use crate::error::{ActionError, Error, ParseErrorFn, Result};
use crate::scope::Scope;
use crate::stacktrace::{self, StackReport};
use crate::status::HttpStatus;
use crate::transport::{DispatchFn, RouteSpec, Transport};

/// Controller mount point(s): a single prefix or a list.
#[derive(Debug, Clone)]
pub enum PathSpec {
    One(String),
    Many(Vec<String>),
}

impl PathSpec {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            PathSpec::One(p) => vec![p],
            PathSpec::Many(ps) => ps,
        }
    }
}

impl From<&str> for PathSpec {
    fn from(p: &str) -> Self {
        PathSpec::One(p.to_string())
    }
}

impl From<String> for PathSpec {
    fn from(p: String) -> Self {
        PathSpec::One(p)
    }
}

impl From<Vec<&str>> for PathSpec {
    fn from(ps: Vec<&str>) -> Self {
        PathSpec::Many(ps.into_iter().map(str::to_string).collect())
    }
}

impl From<Vec<String>> for PathSpec {
    fn from(ps: Vec<String>) -> Self {
        PathSpec::Many(ps)
    }
}

/// Construction-time extension hook: runs once with the controller before
/// it is frozen, may add or mutate actions.
pub type PluginFn = Arc<dyn Fn(&mut Controller, &Value) -> Result<()> + Send + Sync>;

pub struct PluginEntry {
    pub plugin: PluginFn,
    pub options: Value,
}

/// Everything a controller is built from.
#[derive(Default)]
pub struct ControllerConfig {
    pub path: Option<PathSpec>,
    pub transports: Vec<Arc<dyn Transport>>,
    /// Action key -> configuration. The reserved `"default"` key holds
    /// defaults shared by every action.
    pub actions: Vec<(String, ActionConfig)>,
    /// Named handlers looked up when an action carries no closure.
    pub handlers: HashMap<String, Handler>,
    pub parse_error: Option<ParseErrorFn>,
    pub plugins: Vec<PluginEntry>,
}

impl ControllerConfig {
    pub fn new(path: impl Into<PathSpec>) -> Self {
        ControllerConfig {
            path: Some(path.into()),
            ..Default::default()
        }
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transports.push(transport);
        self
    }

    pub fn action(mut self, name: impl Into<String>, config: impl Into<ActionConfig>) -> Self {
        self.actions.push((name.into(), config.into()));
        self
    }

    pub fn handler(mut self, name: impl Into<String>, handler: Handler) -> Self {
        self.handlers.insert(name.into(), handler);
        self
    }

    pub fn parse_error(mut self, hook: ParseErrorFn) -> Self {
        self.parse_error = Some(hook);
        self
    }

    pub fn plugin(mut self, plugin: PluginFn, options: Value) -> Self {
        self.plugins.push(PluginEntry { plugin, options });
        self
    }
}

/// Owner of one or more mount prefixes, a set of usable transports, and a
/// name -> action map. Hosts the response/error translation every action
/// delegates to unless it carries an override.
pub struct Controller {
    paths: Vec<String>,
    transports: Vec<Arc<dyn Transport>>,
    actions: HashMap<String, Arc<Action>>,
    defaults: ActionOptions,
    handlers: HashMap<String, Handler>,
    parse_error: Option<ParseErrorFn>,
}

impl Controller {
    /// Built-in action defaults, sitting under the configured `"default"`
    /// entry, which in turn sits under each action's explicit options.
    fn builtin_defaults() -> ActionOptions {
        ActionOptions::new().enabled(true).method("get").priority(1)
    }

    pub fn new(config: ControllerConfig) -> Result<Arc<Self>> {
        let path = config
            .path
            .ok_or_else(|| Error::Config("\"path\" is required".to_string()))?;
        if config.transports.is_empty() {
            return Err(Error::Config("\"transports\" is required".to_string()));
        }

        let mut defaults = Self::builtin_defaults();
        let mut entries = Vec::new();
        for (name, action) in config.actions {
            if name == "default" {
                if let ActionConfig::Options(options) = action {
                    defaults = options.overlaid_on(&defaults);
                }
            } else {
                entries.push((name, action));
            }
        }
        if entries.is_empty() && config.plugins.is_empty() {
            return Err(Error::Config("\"actions\" is required".to_string()));
        }

        let mut controller = Controller {
            paths: path.into_vec(),
            transports: config.transports,
            actions: HashMap::new(),
            defaults,
            handlers: config.handlers,
            parse_error: config.parse_error,
        };

        for (name, action) in entries {
            controller.add_action(&name, action)?;
        }

        for entry in &config.plugins {
            (entry.plugin)(&mut controller, &entry.options)?;
        }

        Ok(Arc::new(controller))
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn transports(&self) -> &[Arc<dyn Transport>] {
        &self.transports
    }

    pub fn actions(&self) -> &HashMap<String, Arc<Action>> {
        &self.actions
    }

    pub fn action(&self, name: &str) -> Option<&Arc<Action>> {
        self.actions.get(name)
    }

    /// Register a named handler; plugins use this before adding actions
    /// that resolve by name.
    pub fn register_handler(&mut self, name: impl Into<String>, handler: Handler) {
        self.handlers.insert(name.into(), handler);
    }

    /// Materialize one action from its raw options merged over the
    /// controller defaults. Fails when no handler resolves.
    pub fn add_action(&mut self, key: &str, config: ActionConfig) -> Result<Arc<Action>> {
        let options = match config {
            ActionConfig::Toggle(enabled) => ActionOptions::new().enabled(enabled),
            ActionConfig::Options(options) => options,
        };
        let merged = options.overlaid_on(&self.defaults);

        let handler = merged
            .handler
            .clone()
            .or_else(|| {
                merged
                    .handler_name
                    .as_deref()
                    .and_then(|name| self.handlers.get(name).cloned())
            })
            .or_else(|| self.handlers.get(key).cloned())
            .ok_or_else(|| Error::Handler {
                action: key.to_string(),
            })?;

        let action = Arc::new(Action {
            name: key.to_string(),
            path: merged.path.unwrap_or_else(|| key.to_string()),
            methods: merged
                .method
                .map(MethodSpec::into_vec)
                .unwrap_or_else(|| vec!["get".to_string()]),
            priority: merged.priority.unwrap_or(1),
            enabled: merged.enabled.unwrap_or(true),
            transports: merged
                .transports
                .unwrap_or_else(|| self.transports.clone()),
            handler,
            parse_error: merged.parse_error,
            overrides: ResponseOverrides {
                set_res_data: merged.set_res_data,
                set_res_error: merged.set_res_error,
                send_result: merged.send_result,
            },
        });
        self.actions.insert(key.to_string(), Arc::clone(&action));
        Ok(action)
    }

    /// Actions in bind order: ascending priority, ties broken by name so
    /// bind and unbind walk the same sequence.
    fn actions_by_priority(&self) -> Vec<Arc<Action>> {
        let mut actions: Vec<Arc<Action>> = self.actions.values().cloned().collect();
        actions.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| a.name.cmp(&b.name))
        });
        actions
    }

    /// Register every enabled action's routes on every transport it is
    /// exposed on. Not best-effort: the first failure is logged with the
    /// action's name and path and propagated.
    pub fn bind(self: &Arc<Self>) -> Result<()> {
        for action in self.actions_by_priority() {
            if !action.enabled {
                continue;
            }
            if let Err(err) = self.bind_action(&action) {
                error!(
                    "Cannot set route for action {} at {}/{}: {}",
                    action.name,
                    self.paths.join(","),
                    action.path,
                    err
                );
                return Err(err);
            }
        }
        Ok(())
    }

    /// Exact inverse of `bind`: same ordering, same key composition.
    pub fn unbind(self: &Arc<Self>) -> Result<()> {
        for action in self.actions_by_priority() {
            if !action.enabled {
                continue;
            }
            if let Err(err) = self.unbind_action(&action) {
                error!(
                    "Cannot unset route for action {} at {}/{}: {}",
                    action.name,
                    self.paths.join(","),
                    action.path,
                    err
                );
                return Err(err);
            }
        }
        Ok(())
    }

    fn bind_action(self: &Arc<Self>, action: &Arc<Action>) -> Result<()> {
        let dispatch = self.dispatch_fn(action);
        for method in &action.methods {
            for transport in &action.transports {
                let route = RouteSpec {
                    method: method.clone(),
                    paths: self.paths.clone(),
                    action: Arc::clone(action),
                };
                Arc::clone(transport).add_route(&route, Arc::clone(&dispatch))?;
            }
        }
        Ok(())
    }

    fn unbind_action(self: &Arc<Self>, action: &Arc<Action>) -> Result<()> {
        for method in &action.methods {
            for transport in &action.transports {
                let route = RouteSpec {
                    method: method.clone(),
                    paths: self.paths.clone(),
                    action: Arc::clone(action),
                };
                transport.remove_route(&route)?;
            }
        }
        Ok(())
    }

    /// The transport-agnostic dispatch wrapper: run the handler, translate
    /// the outcome, send the result exactly once.
    fn dispatch_fn(self: &Arc<Self>, action: &Arc<Action>) -> DispatchFn {
        let controller = Arc::clone(self);
        let action = Arc::clone(action);
        Arc::new(move |scope: Arc<Scope>| {
            let controller = Arc::clone(&controller);
            let action = Arc::clone(&action);
            Box::pin(async move {
                match (action.handler)(Arc::clone(&scope)).await {
                    Ok(data) => controller.set_res_data(&action, data, &scope, None),
                    Err(err) => controller.set_res_error(&action, err, &scope),
                }
                controller.send_result(&action, &scope).await;
            })
        })
    }

    /// Buffer a successful payload. Status, when not given: no content for
    /// an empty payload, created when the scope carries the new-resource
    /// flag, ok otherwise.
    pub fn set_res_data(
        &self,
        action: &Action,
        data: Option<Value>,
        scope: &Scope,
        status: Option<u16>,
    ) {
        if let Some(hook) = &action.overrides.set_res_data {
            return hook(data, scope, status);
        }
        let status = status.unwrap_or_else(|| match data {
            Some(_) if scope.created() => HttpStatus::CREATED.code,
            Some(_) => HttpStatus::OK.code,
            None => HttpStatus::NO_CONTENT.code,
        });
        scope.transport().set_res_data(data.as_ref(), scope, status);
    }

    /// Translate a handler failure into the uniform structured response
    /// and log it. Does not send anything; `send_result` stays the single
    /// sender.
    pub fn set_res_error(&self, action: &Action, err: ActionError, scope: &Scope) {
        if let Some(hook) = &action.overrides.set_res_error {
            return hook(err, scope);
        }

        let mut kind = err.kind.clone();
        let mut status: Option<u16> = err.http_status.map(|s| s.code);
        let mut error_value = err.error.clone();
        let mut message = err
            .message
            .clone()
            .or_else(|| err.http_status.map(|s| s.reason.to_string()));
        let mut details = err.details.clone();

        if status.is_none() {
            let hook = action.parse_error.as_ref().or(self.parse_error.as_ref());
            if let Some(patch) = hook.and_then(|h| h(&err)) {
                if let Some(k) = patch.kind {
                    kind = k;
                }
                if let Some(s) = patch.status {
                    status = Some(s.code());
                }
                if let Some(e) = patch.error {
                    error_value = Some(e);
                }
                if let Some(m) = patch.message {
                    message = Some(m);
                }
                if let Some(d) = patch.details {
                    details = Some(d);
                }
            }
        }
        let status = status.unwrap_or(HttpStatus::INTERNAL_SERVER_ERROR.code);
        if message.is_none() {
            message = HttpStatus::reason_for(status).map(str::to_string);
        }

        let body = json!({
            "type": kind,
            "status": status,
            "error": error_value,
            "message": message,
            "details": details,
        });
        scope.transport().set_res_data(Some(&body), scope, status);

        error!(
            "Error({}): {}: {}",
            status,
            message.as_deref().unwrap_or(""),
            serde_json::to_string_pretty(&details).unwrap_or_else(|_| "null".to_string())
        );
        self.log_stack(err.stack.as_deref());
    }

    /// Emit the buffered result on the scope's transport. Unconditional
    /// and exactly-once per invocation.
    pub async fn send_result(&self, action: &Action, scope: &Arc<Scope>) {
        if let Some(hook) = &action.overrides.send_result {
            return hook(Arc::clone(scope)).await;
        }
        if !scope.mark_sent() {
            return;
        }
        let result = scope.result();
        scope.transport().send_result(result, scope).await;
    }

    /// Stack diagnostics for a failed handler. Decoding failures are
    /// contained here; they log a meta-failure and the raw stack text.
    fn log_stack(&self, stack: Option<&str>) {
        let Some(stack) = stack else { return };
        let report =
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| stacktrace::extract(stack)));
        match report {
            Ok(StackReport::Frame {
                method,
                file,
                line,
                pos,
                stack,
            }) => {
                error!("at {} ({}:{}:{})", method, file, line, pos);
                error!("{}", stack);
            }
            Ok(StackReport::Raw(raw)) => error!("{}", raw),
            Err(_) => {
                error!("Error in error handler!");
                error!("{}", stack);
            }
        }
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("paths", &self.paths)
            .field("actions", &self.actions.keys().collect::<Vec<_>>())
            .finish()
    }
}
