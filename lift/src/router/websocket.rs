//! Route-key router for WebSocket triggers
//!
//! Resolution order: exact route key, then the configured default handler,
//! then the registered `$default` route, then a 404 envelope. With auto
//! connection management enabled, successful `$connect` handlers persist a
//! [`Connection`] derived from context values and the WebSocket metadata,
//! and `$disconnect` best-effort deletes it before the handler runs; store
//! failures on delete never fail the handler.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::connection::{Connection, ConnectionStore};
use crate::context::Context;
use crate::error::{LiftError, Result};
use crate::handler::{compose, Handler, Middleware};

/// Reserved route key for connection establishment
pub const ROUTE_CONNECT: &str = "$connect";
/// Reserved route key for disconnection
pub const ROUTE_DISCONNECT: &str = "$disconnect";
/// Reserved fallback route key
pub const ROUTE_DEFAULT: &str = "$default";

/// WebSocket route-key router
#[derive(Default)]
pub struct WebSocketRouter {
    routes: RwLock<HashMap<String, Arc<dyn Handler>>>,
    default_handler: RwLock<Option<Arc<dyn Handler>>>,
    middleware: RwLock<Vec<Arc<dyn Middleware>>>,
    auto_store: RwLock<Option<Arc<dyn ConnectionStore>>>,
}

impl WebSocketRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a route key
    pub fn add(&self, route_key: &str, handler: Arc<dyn Handler>) {
        self.routes
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(route_key.to_string(), handler);
    }

    /// Configure the catch-all handler consulted before `$default`
    pub fn set_default_handler(&self, handler: Arc<dyn Handler>) {
        *self
            .default_handler
            .write()
            .unwrap_or_else(|e| e.into_inner()) = Some(handler);
    }

    /// Install the application middleware chain
    pub fn set_middleware(&self, middleware: Vec<Arc<dyn Middleware>>) {
        *self.middleware.write().unwrap_or_else(|e| e.into_inner()) = middleware;
    }

    /// Persist connections automatically around `$connect`/`$disconnect`
    pub fn enable_auto_connection_management(&self, store: Arc<dyn ConnectionStore>) {
        *self.auto_store.write().unwrap_or_else(|e| e.into_inner()) = Some(store);
    }

    /// Resolve a handler for a route key
    pub fn find(&self, route_key: &str) -> Option<Arc<dyn Handler>> {
        let routes = self.routes.read().unwrap_or_else(|e| e.into_inner());
        if let Some(handler) = routes.get(route_key) {
            return Some(handler.clone());
        }
        if let Some(handler) = self
            .default_handler
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
        {
            return Some(handler);
        }
        routes.get(ROUTE_DEFAULT).cloned()
    }

    /// Route and run the composed chain for this invocation
    pub async fn handle(&self, ctx: Context) -> Result<()> {
        let route_key = ctx
            .request()
            .meta("routeKey")
            .unwrap_or(ROUTE_DEFAULT)
            .to_string();

        let handler = self
            .find(&route_key)
            .ok_or_else(|| LiftError::websocket_route_not_found(&route_key))?;

        let store = self
            .auto_store
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        let connection_id = ctx.request().meta("connectionId").map(str::to_string);

        // Disconnects are swept from the store before the handler sees the
        // event; a failing store must not fail the disconnect itself.
        if route_key == ROUTE_DISCONNECT {
            if let (Some(store), Some(id)) = (store.as_ref(), connection_id.as_deref()) {
                if let Err(err) = store.delete(id).await {
                    tracing::warn!(connection_id = id, error = %err, "connection delete failed");
                }
            }
        }

        let chain = {
            let middleware = self.middleware.read().unwrap_or_else(|e| e.into_inner());
            compose(&middleware, handler)
        };
        chain.call(ctx.clone()).await?;

        if route_key == ROUTE_CONNECT {
            if let (Some(store), Some(id)) = (store.as_ref(), connection_id) {
                let connection = connection_from_context(&ctx, id);
                store.save(connection).await?;
            }
        }
        Ok(())
    }
}

/// Build the connection record persisted after a successful `$connect`
///
/// Context values set by the handler win over extracted claims.
fn connection_from_context(ctx: &Context, id: String) -> Connection {
    let mut connection = Connection::new(id);
    connection.user_id = ctx.value_str("user_id").or_else(|| ctx.user_id());
    connection.tenant_id = ctx.value_str("tenant_id").or_else(|| ctx.tenant_id());
    connection
}
