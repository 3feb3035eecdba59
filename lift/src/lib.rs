//! # lift
//!
//! Request-dispatch and cross-cutting-concerns core for serverless functions
//! on AWS Lambda. One deployed function may be invoked by HTTP proxies,
//! WebSocket routes, queue batches, object-store notifications, event-bus
//! messages and scheduled timers; lift recognizes the raw envelope,
//! normalizes it, routes it through a composable middleware chain to a user
//! handler, and emits the correctly shaped response envelope, all within the
//! cold-start and memory constraints of a short-lived process.
//!
//! ## Features
//!
//! - **Adapter registry**: conservative detection and normalization of the
//!   six trigger envelope classes
//! - **Dual router**: path/method routing for HTTP, pattern routing for
//!   events, route-key routing for WebSocket
//! - **Handler kernel**: typed handler shapes, outer-to-inner middleware
//!   composition, opt-in response buffering for interception
//! - **Resource pool**: bounded checkout/return with idle, lifetime and
//!   health eviction, pre-warming and graceful shutdown
//! - **Observability sink**: non-blocking buffered shipping of structured
//!   logs and aggregated metrics with backpressure by dropping
//!
//! ## Example
//!
//! ```rust,no_run
//! use lift::prelude::*;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::load()?;
//!     init_tracing(&config)?;
//!
//!     let app = App::new();
//!     app.use_middleware(RequestLogger);
//!     app.get("/users/:id", producing_fn(|ctx: Context| async move {
//!         Ok(json!({"id": ctx.param("id")}))
//!     }));
//!     app.start();
//!
//!     // Per invocation, the platform runtime hands over the raw envelope:
//!     let envelope = app.handle_request(json!({
//!         "httpMethod": "GET",
//!         "path": "/users/42",
//!     })).await;
//!     println!("{envelope}");
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod app;
pub mod config;
pub mod connection;
pub mod context;
pub mod error;
pub mod handler;
pub mod middleware;
pub mod observability;
pub mod pool;
pub mod request;
pub mod response;
pub mod router;
pub mod sanitize;
pub mod ws;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::adapter::{default_registry, AdapterRegistry, EventAdapter};
    pub use crate::app::{App, RouteGroup};
    pub use crate::config::{Config, Environment};
    pub use crate::connection::{Connection, ConnectionStore, InMemoryConnectionStore};
    pub use crate::context::{Claims, Context};
    pub use crate::error::{codes, LiftError, Result};
    pub use crate::handler::{
        from_fn, handler_fn, producing_fn, typed_fn, typed_producing_fn, Handler, Middleware,
        Next, Validate,
    };
    pub use crate::middleware::{MetricsMiddleware, RecoveryMiddleware, RequestLogger};
    pub use crate::observability::{
        init_tracing, LogEntry, LogLevel, LogTransport, Logger, LoggerConfig, MetricDatum,
        MetricUnit, MetricsCollector, MetricsConfig, MetricsTransport,
    };
    pub use crate::pool::{
        ManagedPool, Pool, PoolConfig, PoolManager, PoolResource, PoolStats, ResourceFactory,
    };
    pub use crate::request::{Request, TriggerType};
    pub use crate::response::{Response, ResponseBuffer};
    pub use crate::router::{
        EventRouter, HttpRouter, WebSocketRouter, ROUTE_CONNECT, ROUTE_DEFAULT, ROUTE_DISCONNECT,
    };
    pub use crate::ws::{BroadcastResult, HttpManagementClient, ManagementApi, WsContext};

    pub use serde::{Deserialize, Serialize};

    // Re-export tracing macros and types
    pub use tracing::{debug, error, info, instrument, trace, warn, Level, Span};

    // Re-export tokio for async runtime
    pub use tokio;

    // Re-export async-trait for async trait definitions
    pub use async_trait::async_trait;

    // Re-export error handling utilities
    pub use anyhow::{self, Context as AnyhowContext};
    pub use thiserror::Error;

    // Re-export time utilities
    pub use chrono::{DateTime, Duration as ChronoDuration, Utc};

    // Re-export UUID
    pub use uuid::Uuid;

    // Re-export futures utilities
    pub use futures::{future, stream, Future, Stream, StreamExt, TryFutureExt, TryStreamExt};

    // Re-export HTTP types
    pub use http::{HeaderMap, HeaderValue, Method, StatusCode};
}
