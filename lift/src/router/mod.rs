//! The dual router: path/method for HTTP, patterns for events, route keys
//! for WebSocket

pub mod event;
pub mod http;
pub mod pattern;
pub mod websocket;

pub use event::{EventRouteInfo, EventRouter};
pub use http::HttpRouter;
pub use pattern::{object_store_match, wildcard_match};
pub use websocket::{WebSocketRouter, ROUTE_CONNECT, ROUTE_DEFAULT, ROUTE_DISCONNECT};
