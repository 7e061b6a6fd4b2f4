use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use uuid::Uuid;

use crate::action::Action;
use crate::transport::Transport;

/// Buffered response state: what the translation pipeline wrote, waiting
/// for the one unconditional `send_result`.
#[derive(Debug, Default)]
pub struct ResponseSlot {
    pub data: Option<Value>,
    pub status: Option<u16>,
    pub sent: bool,
}

/// Per-invocation execution context.
///
/// Created by the transport adapter that received the request, carried
/// through the action handler and the response pipeline, dropped once the
/// reply is out. `body`/`params`/`query` are never cached here; every read
/// delegates to the owning transport.
pub struct Scope {
    id: Uuid,
    action: Arc<Action>,
    transport: Arc<dyn Transport>,
    data: Box<dyn Any + Send + Sync>,
    slot: Mutex<ResponseSlot>,
    new_resource: AtomicBool,
}

impl Scope {
    pub fn new(
        action: Arc<Action>,
        transport: Arc<dyn Transport>,
        transport_data: Box<dyn Any + Send + Sync>,
    ) -> Arc<Self> {
        Arc::new(Scope {
            id: Uuid::new_v4(),
            action,
            transport,
            data: transport_data,
            slot: Mutex::new(ResponseSlot::default()),
            new_resource: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn action(&self) -> &Arc<Action> {
        &self.action
    }

    pub fn action_name(&self) -> &str {
        &self.action.name
    }

    /// True when this scope belongs to one of the named actions.
    pub fn is_action(&self, names: &[&str]) -> bool {
        names.contains(&self.action.name.as_str())
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// The transport-native request data, downcast to the adapter's own
    /// type. Only the adapter that built the scope knows `T`.
    pub fn transport_data<T: 'static>(&self) -> Option<&T> {
        self.data.downcast_ref::<T>()
    }

    pub fn body(&self) -> Value {
        self.transport.get_body(self)
    }

    pub fn params(&self) -> Value {
        self.transport.get_params(self)
    }

    pub fn query(&self) -> Value {
        self.transport.get_query(self)
    }

    /// Signal that the handler created a new resource; a successful reply
    /// with data then reports "created" instead of "ok".
    pub fn mark_created(&self) {
        self.new_resource.store(true, Ordering::Relaxed);
    }

    pub fn created(&self) -> bool {
        self.new_resource.load(Ordering::Relaxed)
    }

    /// Buffer the outgoing payload and status. Called by transports from
    /// their `set_res_data`; overwrites any previous buffer.
    pub fn buffer(&self, data: Option<Value>, status: u16) {
        let mut slot = self.slot.lock();
        slot.data = data;
        slot.status = Some(status);
    }

    pub fn result(&self) -> Option<Value> {
        self.slot.lock().data.clone()
    }

    pub fn status(&self) -> Option<u16> {
        self.slot.lock().status
    }

    /// Flip the sent latch. Returns false if the response went out
    /// already, so replies stay exactly-once.
    pub fn mark_sent(&self) -> bool {
        let mut slot = self.slot.lock();
        if slot.sent {
            return false;
        }
        slot.sent = true;
        true
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.id)
            .field("action", &self.action.name)
            .field("transport", &self.transport.name())
            .finish()
    }
}
