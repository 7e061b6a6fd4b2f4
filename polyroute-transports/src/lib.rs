// Transport adapters bridging concrete protocols to the polyroute action
// model. Four variants: HTTP request/response, two event-socket flavors
// (text frames and structured emits), and RPC registration.

pub mod table;
pub mod http;
pub mod ws;
pub mod events;
pub mod rpc;

pub use table::DispatchTable;
pub use http::{AuthGateFactory, HttpRequest, HttpResponse, HttpTransport};
pub use ws::{FrameConnection, FrameHandler, FrameServer, MessageHandler, WsTransport};
pub use events::{
    EmitConnection, EmitHandler, EmitServer, EventSocketTransport, PayloadHandler,
};
pub use rpc::{RpcCallee, RpcRegistration, RpcSession, RpcTransport};
