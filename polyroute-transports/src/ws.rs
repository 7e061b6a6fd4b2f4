// Frame-socket adapter: request/ack over a persistent socket speaking
// stringified two-element envelopes.
//
// Inbound text frame:  ["<prefix>", {"route": "<method>:<path>", ...}]
// Outbound reply:      ["<prefix>", {"method", "path", "result": {"body", "statusCode"}}]
// Errors go back on the same connection as ["error", {...}]; a bad frame
// never tears the connection down.
//
// All instances of this variant share one process-scoped dispatch table;
// the first constructed instance subscribes the connection listener.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::task;
use tracing::{debug, warn};

use polyroute_core::{
    ActionError, DispatchFn, Result, RouteSpec, Scope, Transport,
};

use crate::table::DispatchTable;

/// Handler for inbound text frames on one connection.
pub type MessageHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// One live socket, as the adapter sees it.
pub trait FrameConnection: Send + Sync {
    fn send(&self, frame: &str) -> std::io::Result<()>;
    /// Install the handler invoked for every inbound text frame.
    fn on_message(&self, handler: MessageHandler);
}

/// The socket server boundary: yields connections as they arrive.
pub trait FrameServer: Send + Sync {
    fn on_connection(&self, listener: Arc<dyn Fn(Arc<dyn FrameConnection>) + Send + Sync>);
}

/// Dispatch-table entry: builds a scope for the payload and spawns the
/// dispatch wrapper.
pub type FrameHandler = Arc<dyn Fn(Arc<dyn FrameConnection>, Value) + Send + Sync>;

struct WsScopeData {
    connection: Arc<dyn FrameConnection>,
    payload: Value,
    method: String,
    path: String,
}

/// The text-frame event-socket transport variant.
pub struct WsTransport {
    prefix: String,
    table: Arc<DispatchTable<FrameHandler>>,
}

fn shared_table() -> Arc<DispatchTable<FrameHandler>> {
    static TABLE: OnceLock<Arc<DispatchTable<FrameHandler>>> = OnceLock::new();
    Arc::clone(TABLE.get_or_init(|| Arc::new(DispatchTable::new())))
}

impl WsTransport {
    /// Build an instance on the process-wide table for this variant.
    pub fn new(server: Arc<dyn FrameServer>, prefix: impl Into<String>) -> Arc<Self> {
        Self::with_table(server, prefix, shared_table())
    }

    /// Build an instance on an explicit table; instances given the same
    /// table see each other's routes.
    pub fn with_table(
        server: Arc<dyn FrameServer>,
        prefix: impl Into<String>,
        table: Arc<DispatchTable<FrameHandler>>,
    ) -> Arc<Self> {
        let transport = Arc::new(WsTransport {
            prefix: prefix.into(),
            table,
        });
        let listener_table = Arc::clone(&transport.table);
        let listener_prefix = transport.prefix.clone();
        transport.table.subscribe_once(|| {
            server.on_connection(Arc::new(move |connection: Arc<dyn FrameConnection>| {
                let table = Arc::clone(&listener_table);
                let prefix = listener_prefix.clone();
                let conn = Arc::clone(&connection);
                connection.on_message(Arc::new(move |frame: &str| {
                    handle_frame(&table, &prefix, &conn, frame);
                }));
            }));
        });
        transport
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn table(&self) -> &Arc<DispatchTable<FrameHandler>> {
        &self.table
    }

    fn data<'a>(&self, scope: &'a Scope) -> Option<&'a WsScopeData> {
        scope.transport_data::<WsScopeData>()
    }
}

/// Decode one inbound frame and dispatch it. Every failure is answered on
/// the same connection; nothing escapes to the connection handler.
fn handle_frame(
    table: &DispatchTable<FrameHandler>,
    prefix: &str,
    connection: &Arc<dyn FrameConnection>,
    frame: &str,
) {
    let envelope: Value = match serde_json::from_str(frame) {
        Ok(v) => v,
        Err(err) => {
            send_error(connection, &format!("malformed frame: {}", err));
            return;
        }
    };
    let Some(items) = envelope.as_array() else {
        return;
    };
    // Frames for other protocols on the same socket are not ours to answer.
    if items.first().and_then(Value::as_str) != Some(prefix) {
        return;
    }
    let payload = items.get(1).cloned().unwrap_or_else(|| json!({}));

    let Some(route) = payload.get("route").and_then(Value::as_str) else {
        send_error(connection, "missing route key");
        return;
    };
    match table.resolve(route) {
        Some(handler) => handler(Arc::clone(connection), payload),
        None => {
            debug!("unhandled frame route: {}", route);
            send_error(connection, &format!("unhandled route: {}", route));
        }
    }
}

fn send_error(connection: &Arc<dyn FrameConnection>, message: &str) {
    let err = ActionError::new(message);
    let (_, body) = err.to_response();
    let frame = json!(["error", body]).to_string();
    if let Err(io) = connection.send(&frame) {
        warn!("failed to send error frame: {}", io);
    }
}

#[async_trait]
impl Transport for WsTransport {
    fn name(&self) -> &'static str {
        "ws"
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

        let handler: FrameHandler = Arc::new(move |connection, payload| {
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
                Box::new(WsScopeData {
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
        let envelope = json!([
            self.prefix,
            {
                "method": data.method,
                "path": data.path,
                "result": {
                    "body": result,
                    "statusCode": scope.status(),
                },
            }
        ]);
        if let Err(io) = data.connection.send(&envelope.to_string()) {
            warn!("failed to send reply frame for scope {}: {}", scope.id(), io);
        }
    }
}
