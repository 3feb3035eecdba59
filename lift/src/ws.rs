//! WebSocket management-API surface for handlers
//!
//! A [`WsContext`] wraps the invocation context with a client for the
//! platform's connection-management API, bound to
//! `https://<domainName>/<stage>`. Gone peers (HTTP 410) are idempotent
//! success on [`WsContext::disconnect`] and non-fatal on broadcast, where
//! they are collected separately so callers can sweep stale connections.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::context::Context;
use crate::error::{codes, LiftError, Result};

/// Connection details reported by the management API
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub connection_id: String,
    /// Raw attributes as returned by the backend
    pub attributes: Value,
}

/// Port over the platform's connection-management API
#[async_trait]
pub trait ManagementApi: Send + Sync {
    /// Deliver bytes to one connection
    async fn post_to_connection(&self, connection_id: &str, data: &[u8]) -> Result<()>;

    /// Force-close a connection
    async fn delete_connection(&self, connection_id: &str) -> Result<()>;

    /// Fetch connection details
    async fn get_connection(&self, connection_id: &str) -> Result<ConnectionInfo>;
}

/// HTTP client for the management API
///
/// Maps HTTP 410 to `CONNECTION_GONE` so callers can tell a departed peer
/// from a hard failure.
pub struct HttpManagementClient {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpManagementClient {
    /// Bind a client to a management endpoint (`https://<domain>/<stage>`)
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    fn connection_url(&self, connection_id: &str) -> String {
        format!(
            "{}/@connections/{connection_id}",
            self.endpoint.trim_end_matches('/')
        )
    }

    fn map_status(connection_id: &str, status: reqwest::StatusCode) -> Result<()> {
        if status.as_u16() == 410 {
            return Err(LiftError::connection_gone(connection_id));
        }
        if !status.is_success() {
            return Err(LiftError::network(format!(
                "management API returned {status}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ManagementApi for HttpManagementClient {
    async fn post_to_connection(&self, connection_id: &str, data: &[u8]) -> Result<()> {
        let response = self
            .client
            .post(self.connection_url(connection_id))
            .body(data.to_vec())
            .send()
            .await?;
        Self::map_status(connection_id, response.status())
    }

    async fn delete_connection(&self, connection_id: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.connection_url(connection_id))
            .send()
            .await?;
        Self::map_status(connection_id, response.status())
    }

    async fn get_connection(&self, connection_id: &str) -> Result<ConnectionInfo> {
        let response = self
            .client
            .get(self.connection_url(connection_id))
            .send()
            .await?;
        Self::map_status(connection_id, response.status())?;
        let attributes = response.json().await?;
        Ok(ConnectionInfo {
            connection_id: connection_id.to_string(),
            attributes,
        })
    }
}

/// Outcome of a broadcast: gone peers are reported, not failed
#[derive(Debug, Default)]
pub struct BroadcastResult {
    /// Connections the message reached
    pub sent: Vec<String>,
    /// Departed connections, candidates for store sweeping
    pub gone: Vec<String>,
    /// Hard failures
    pub failed: Vec<(String, LiftError)>,
}

impl BroadcastResult {
    /// True when nothing hard-failed
    pub fn is_ok(&self) -> bool {
        self.failed.is_empty()
    }
}

/// WebSocket-aware view over the invocation context
#[derive(Clone)]
pub struct WsContext {
    ctx: Context,
    client: Arc<dyn ManagementApi>,
}

impl WsContext {
    /// Wrap a context with an explicit management client
    pub fn new(ctx: Context, client: Arc<dyn ManagementApi>) -> Self {
        Self { ctx, client }
    }

    /// Wrap a context, building an HTTP client from the adapter metadata
    ///
    /// Fails when the request did not come through the WebSocket adapter.
    pub fn from_context(ctx: Context) -> Result<Self> {
        let endpoint = ctx
            .request()
            .meta("managementEndpoint")
            .ok_or_else(|| LiftError::validation("not a WebSocket invocation"))?
            .to_string();
        Ok(Self {
            ctx,
            client: Arc::new(HttpManagementClient::new(endpoint)),
        })
    }

    /// The underlying invocation context
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// This invocation's connection id
    pub fn connection_id(&self) -> Result<String> {
        self.ctx
            .request()
            .meta("connectionId")
            .map(str::to_string)
            .ok_or_else(|| LiftError::validation("connectionId missing from metadata"))
    }

    /// This invocation's route key
    pub fn route_key(&self) -> Option<String> {
        self.ctx.request().meta("routeKey").map(str::to_string)
    }

    /// Management endpoint the client is bound to
    pub fn management_endpoint(&self) -> Option<String> {
        self.ctx
            .request()
            .meta("managementEndpoint")
            .map(str::to_string)
    }

    /// Send bytes back to the invoking connection
    pub async fn send_message(&self, data: &[u8]) -> Result<()> {
        let connection_id = self.connection_id()?;
        self.client.post_to_connection(&connection_id, data).await
    }

    /// Send a JSON value back to the invoking connection
    pub async fn send_json_message<T: Serialize>(&self, value: &T) -> Result<()> {
        let encoded = serde_json::to_vec(value)?;
        self.send_message(&encoded).await
    }

    /// Send bytes to many connections, collecting gone peers separately
    pub async fn broadcast_message(&self, connection_ids: &[String], data: &[u8]) -> BroadcastResult {
        let mut result = BroadcastResult::default();
        for connection_id in connection_ids {
            match self.client.post_to_connection(connection_id, data).await {
                Ok(()) => result.sent.push(connection_id.clone()),
                Err(err) if err.is_code(codes::CONNECTION_GONE) => {
                    result.gone.push(connection_id.clone());
                }
                Err(err) => result.failed.push((connection_id.clone(), err)),
            }
        }
        result
    }

    /// Force-close a connection; a gone peer counts as success
    pub async fn disconnect(&self, connection_id: &str) -> Result<()> {
        match self.client.delete_connection(connection_id).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_code(codes::CONNECTION_GONE) => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Fetch connection details from the management API
    pub async fn get_connection_info(&self, connection_id: &str) -> Result<ConnectionInfo> {
        self.client.get_connection(connection_id).await
    }
}
