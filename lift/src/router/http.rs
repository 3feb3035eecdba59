//! Path/method router for HTTP proxy triggers
//!
//! Two tables per method: a string-keyed exact map and an ordered list of
//! parameterized routes (`:name` segments). Exact matches win; among
//! parameterized routes the first registered wins. Route tables take
//! concurrent `add` and `find`; in practice mutation happens during init,
//! but nothing here assumes it.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::context::Context;
use crate::error::{LiftError, Result};
use crate::handler::{compose, Handler, Middleware};

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Param(String),
}

fn parse_segments(pattern: &str) -> Vec<Segment> {
    pattern
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| match s.strip_prefix(':') {
            Some(name) => Segment::Param(name.to_string()),
            None => Segment::Literal(s.to_string()),
        })
        .collect()
}

struct ParamRoute {
    method: String,
    pattern: String,
    segments: Vec<Segment>,
    handler: Arc<dyn Handler>,
}

#[derive(Default)]
struct Tables {
    exact: HashMap<String, Arc<dyn Handler>>,
    params: Vec<ParamRoute>,
}

fn exact_key(method: &str, path: &str) -> String {
    format!("{method} {path}")
}

/// HTTP router with exact and parameterized tables
#[derive(Default)]
pub struct HttpRouter {
    tables: RwLock<Tables>,
    middleware: RwLock<Vec<Arc<dyn Middleware>>>,
}

impl HttpRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a route; `:name` segments bind path parameters
    pub fn add(&self, method: &str, pattern: &str, handler: Arc<dyn Handler>) {
        let mut tables = self.tables.write().unwrap_or_else(|e| e.into_inner());
        if pattern.contains(':') {
            tables.params.push(ParamRoute {
                method: method.to_uppercase(),
                pattern: pattern.to_string(),
                segments: parse_segments(pattern),
                handler,
            });
        } else {
            tables.exact.insert(exact_key(&method.to_uppercase(), pattern), handler);
        }
    }

    /// Install the application middleware chain
    pub fn set_middleware(&self, middleware: Vec<Arc<dyn Middleware>>) {
        *self.middleware.write().unwrap_or_else(|e| e.into_inner()) = middleware;
    }

    /// Resolve a handler and its bound path parameters
    pub fn find(
        &self,
        method: &str,
        path: &str,
    ) -> Option<(Arc<dyn Handler>, HashMap<String, String>)> {
        let method = method.to_uppercase();
        let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());

        if let Some(handler) = tables.exact.get(&exact_key(&method, path)) {
            return Some((handler.clone(), HashMap::new()));
        }

        let path_segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        for route in &tables.params {
            if route.method != method || route.segments.len() != path_segments.len() {
                continue;
            }
            let mut params = HashMap::new();
            let matched = route
                .segments
                .iter()
                .zip(&path_segments)
                .all(|(segment, actual)| match segment {
                    Segment::Literal(expected) => expected == actual,
                    Segment::Param(name) => {
                        params.insert(name.clone(), (*actual).to_string());
                        true
                    }
                });
            if matched {
                return Some((route.handler.clone(), params));
            }
        }
        None
    }

    /// Route and run the composed chain for this invocation
    pub async fn handle(&self, ctx: Context) -> Result<()> {
        let method = ctx.request().method.clone();
        let path = ctx.request().path.clone();

        let (handler, params) = self
            .find(&method, &path)
            .ok_or_else(|| LiftError::route_not_found(&method, &path))?;

        ctx.set_params(params);
        let chain = {
            let middleware = self.middleware.read().unwrap_or_else(|e| e.into_inner());
            compose(&middleware, handler)
        };
        chain.call(ctx).await
    }

    /// Registered patterns, copied out for introspection
    pub fn routes(&self) -> Vec<(String, String)> {
        let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
        let mut routes: Vec<(String, String)> = tables
            .exact
            .keys()
            .filter_map(|key| {
                key.split_once(' ')
                    .map(|(m, p)| (m.to_string(), p.to_string()))
            })
            .collect();
        routes.extend(
            tables
                .params
                .iter()
                .map(|r| (r.method.clone(), r.pattern.clone())),
        );
        routes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;
    use crate::request::{Request, TriggerType};
    use serde_json::json;

    fn tagged(tag: &'static str) -> Arc<dyn Handler> {
        Arc::new(handler_fn(move |ctx: Context| async move {
            ctx.set_value("handled_by", tag);
            Ok(())
        }))
    }

    fn http_ctx(method: &str, path: &str) -> Context {
        let mut request = Request::new(TriggerType::HttpV1);
        request.method = method.to_string();
        request.path = path.to_string();
        Context::new(request)
    }

    #[test]
    fn exact_match_binds_no_params() {
        let router = HttpRouter::new();
        router.add("GET", "/health", tagged("health"));
        let (_, params) = router.find("GET", "/health").unwrap();
        assert!(params.is_empty());
    }

    #[test]
    fn param_segments_bind_values() {
        let router = HttpRouter::new();
        router.add("GET", "/users/:id/orders/:order_id", tagged("orders"));
        let (_, params) = router.find("GET", "/users/42/orders/o-7").unwrap();
        assert_eq!(params["id"], "42");
        assert_eq!(params["order_id"], "o-7");
    }

    #[test]
    fn segment_count_must_match() {
        let router = HttpRouter::new();
        router.add("GET", "/users/:id", tagged("user"));
        assert!(router.find("GET", "/users").is_none());
        assert!(router.find("GET", "/users/1/extra").is_none());
    }

    #[test]
    fn literal_segments_must_equal() {
        let router = HttpRouter::new();
        router.add("GET", "/users/:id", tagged("user"));
        assert!(router.find("GET", "/orders/1").is_none());
    }

    #[test]
    fn method_scopes_routes() {
        let router = HttpRouter::new();
        router.add("GET", "/thing", tagged("get"));
        assert!(router.find("POST", "/thing").is_none());
        assert!(router.find("get", "/thing").is_some());
    }

    #[tokio::test]
    async fn exact_beats_parameterized() {
        let router = HttpRouter::new();
        router.add("GET", "/users/:id", tagged("param"));
        router.add("GET", "/users/me", tagged("exact"));

        let ctx = http_ctx("GET", "/users/me");
        router.handle(ctx.clone()).await.unwrap();
        assert_eq!(ctx.value("handled_by"), Some(json!("exact")));
    }

    #[tokio::test]
    async fn first_registered_param_route_wins() {
        let router = HttpRouter::new();
        router.add("GET", "/items/:a", tagged("first"));
        router.add("GET", "/items/:b", tagged("second"));

        let ctx = http_ctx("GET", "/items/9");
        router.handle(ctx.clone()).await.unwrap();
        assert_eq!(ctx.value("handled_by"), Some(json!("first")));
        assert_eq!(ctx.param("a").as_deref(), Some("9"));
    }

    #[tokio::test]
    async fn miss_returns_route_not_found() {
        let router = HttpRouter::new();
        let ctx = http_ctx("GET", "/nowhere");
        let err = router.handle(ctx).await.unwrap_err();
        assert!(err.is_code(crate::error::codes::ROUTE_NOT_FOUND));
        assert_eq!(err.status(), 404);
    }

    #[tokio::test]
    async fn params_are_bound_before_the_chain_runs() {
        let router = HttpRouter::new();
        router.add(
            "GET",
            "/test/:id",
            Arc::new(handler_fn(|ctx: Context| async move {
                assert_eq!(ctx.param("id").as_deref(), Some("123"));
                ctx.ok(&json!({"id": ctx.param("id")}))
            })),
        );

        let ctx = http_ctx("GET", "/test/123");
        router.handle(ctx.clone()).await.unwrap();
        assert_eq!(ctx.response_envelope()["statusCode"], 200);
    }

    #[test]
    fn concurrent_add_and_find() {
        let router = Arc::new(HttpRouter::new());
        let mut handles = Vec::new();
        for i in 0..8 {
            let router = router.clone();
            handles.push(std::thread::spawn(move || {
                router.add("GET", &format!("/r{i}/:id"), tagged("t"));
                for _ in 0..50 {
                    let _ = router.find("GET", &format!("/r{i}/1"));
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(router.routes().len(), 8);
    }
}
