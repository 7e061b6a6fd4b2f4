// Emit-socket adapter: the sibling of the frame-socket variant for
// servers whose connections speak named events with structured payloads
// instead of raw text frames.
//
// Inbound: payload object arriving on the prefix event,
// {"route": "<method>:<path>", "params"?, "body"?, "query"?}.
// Outbound reply: emit(prefix, {"method", "path", "result": {"body",
// "statusCode"}}). Errors: emit("error", {...}) on the same connection.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::task;
use tracing::{debug, warn};

use polyroute_core::{
    ActionError, DispatchFn, Result, RouteSpec, Scope, Transport,
};

use crate::table::DispatchTable;

/// Handler for payloads arriving on one subscribed event.
pub type PayloadHandler = Arc<dyn Fn(Value) + Send + Sync>;

/// One live event-socket connection.
pub trait EmitConnection: Send + Sync {
    fn emit(&self, event: &str, payload: &Value) -> std::io::Result<()>;
    /// Subscribe a handler to a named event on this connection.
    fn on(&self, event: &str, handler: PayloadHandler);
}

/// The event-socket server boundary.
pub trait EmitServer: Send + Sync {
    fn on_connection(&self, listener: Arc<dyn Fn(Arc<dyn EmitConnection>) + Send + Sync>);
}

pub type EmitHandler = Arc<dyn Fn(Arc<dyn EmitConnection>, Value) + Send + Sync>;

struct EventScopeData {
    connection: Arc<dyn EmitConnection>,
    payload: Value,
    method: String,
    path: String,
}

/// The structured-emit event-socket transport variant.
pub struct EventSocketTransport {
    prefix: String,
    table: Arc<DispatchTable<EmitHandler>>,
}

fn shared_table() -> Arc<DispatchTable<EmitHandler>> {
    static TABLE: OnceLock<Arc<DispatchTable<EmitHandler>>> = OnceLock::new();
    Arc::clone(TABLE.get_or_init(|| Arc::new(DispatchTable::new())))
}

impl EventSocketTransport {
    pub fn new(server: Arc<dyn EmitServer>, prefix: impl Into<String>) -> Arc<Self> {
        Self::with_table(server, prefix, shared_table())
    }

    pub fn with_table(
        server: Arc<dyn EmitServer>,
        prefix: impl Into<String>,
        table: Arc<DispatchTable<EmitHandler>>,
    ) -> Arc<Self> {
        let transport = Arc::new(EventSocketTransport {
            prefix: prefix.into(),
            table,
        });
        let listener_table = Arc::clone(&transport.table);
        let listener_prefix = transport.prefix.clone();
        transport.table.subscribe_once(|| {
            server.on_connection(Arc::new(move |connection: Arc<dyn EmitConnection>| {
                let table = Arc::clone(&listener_table);
                let conn = Arc::clone(&connection);
                connection.on(
                    &listener_prefix,
                    Arc::new(move |payload: Value| {
                        handle_payload(&table, &conn, payload);
                    }),
                );
            }));
        });
        transport
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn table(&self) -> &Arc<DispatchTable<EmitHandler>> {
        &self.table
    }

    fn data<'a>(&self, scope: &'a Scope) -> Option<&'a EventScopeData> {
        scope.transport_data::<EventScopeData>()
    }
}

/// Resolve an inbound payload against the shared table. Unknown routes
/// are answered with an error emit on the same connection.
fn handle_payload(
    table: &DispatchTable<EmitHandler>,
    connection: &Arc<dyn EmitConnection>,
    payload: Value,
) {
    let Some(route) = payload.get("route").and_then(Value::as_str) else {
        emit_error(connection, "missing route key");
        return;
    };
    match table.resolve(route) {
        Some(handler) => handler(Arc::clone(connection), payload),
        None => {
            debug!("unhandled event route: {}", route);
            emit_error(connection, &format!("unhandled route: {}", route));
        }
    }
}

fn emit_error(connection: &Arc<dyn EmitConnection>, message: &str) {
    let err = ActionError::new(message);
    let (_, body) = err.to_response();
    if let Err(io) = connection.emit("error", &body) {
        warn!("failed to emit error event: {}", io);
    }
}

#[async_trait]
impl Transport for EventSocketTransport {
    fn name(&self) -> &'static str {
        "events"
    }

    fn add_route(self: Arc<Self>, route: &RouteSpec, dispatch: DispatchFn) -> Result<()> {
        let key = route.socket_key()?;
        let action = Arc::clone(&route.action);
        let method = route.method.clone();
        let path = route
            .paths
            .first()
            .map(|p| route.full_path(p))
            .unwrap_or_default();
        let transport: Arc<dyn Transport> = Arc::clone(&self) as Arc<dyn Transport>;

        let handler: EmitHandler = Arc::new(move |connection, payload| {
            let mut payload = if payload.is_object() {
                payload
            } else {
                json!({})
            };
            if let Some(map) = payload.as_object_mut() {
                map.entry("params").or_insert_with(|| Value::Object(Map::new()));
            }

            let scope = Scope::new(
                Arc::clone(&action),
                Arc::clone(&transport),
                Box::new(EventScopeData {
                    connection: Arc::clone(&connection),
                    payload,
                    method: method.clone(),
                    path: path.clone(),
                }),
            );
            let dispatch = Arc::clone(&dispatch);
            task::spawn(async move {
                dispatch(scope).await;
            });
        });

        self.table.register(key, handler);
        Ok(())
    }

    fn remove_route(&self, route: &RouteSpec) -> Result<()> {
        self.table.unregister(&route.socket_key()?);
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
            "method": data.method,
            "path": data.path,
            "result": {
                "body": result,
                "statusCode": scope.status(),
            },
        });
        if let Err(io) = data.connection.emit(&self.prefix, &reply) {
            warn!(
                "failed to emit reply for scope {}: {}",
                scope.id(),
                io
            );
        }
    }
}
