pub mod error;
pub mod status;
pub mod stacktrace;
pub mod scope;
pub mod transport;
pub mod action;
pub mod controller;
pub mod registry;

pub use error::{
    ActionError, Error, ErrorPatch, ParseErrorFn, Result, StatusPatch, ERROR_KIND,
};
pub use status::HttpStatus;
pub use scope::Scope;
pub use transport::{AuthGate, DispatchFn, RouteSpec, Transport};
pub use action::{handler, Action, ActionConfig, ActionOptions, Handler, MethodSpec};
pub use controller::{Controller, ControllerConfig, PathSpec, PluginEntry, PluginFn};
pub use registry::Registry;
