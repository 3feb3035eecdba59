//! Handler and middleware traits plus the composition kernel
//!
//! The source of truth for handler shapes is a small closed set of adapter
//! constructors rather than runtime reflection: [`handler_fn`],
//! [`producing_fn`], [`typed_fn`] and [`typed_producing_fn`] each accept one
//! calling convention and normalize it to [`Handler`]. An unsupported shape
//! fails at the registration call site, at compile time.
//!
//! Middleware composes outer-to-inner in registration order:
//! `[m1, m2, m3]` runs `m1 → m2 → m3 → handler` on the way in and unwinds in
//! reverse on the way out.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::context::Context;
use crate::error::{LiftError, Result};

/// A normalized request handler
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, ctx: Context) -> Result<()>;
}

/// Optional semantic validation for typed request models
///
/// The default implementation accepts everything; implement `validate` to
/// reject semantically invalid payloads with a message that surfaces as
/// `VALIDATION_ERROR` (422).
pub trait Validate {
    fn validate(&self) -> std::result::Result<(), String> {
        Ok(())
    }
}

/// The rest of the chain, handed to middleware
#[derive(Clone)]
pub struct Next {
    handler: Arc<dyn Handler>,
}

impl Next {
    /// Invoke the remainder of the chain
    pub async fn run(&self, ctx: Context) -> Result<()> {
        self.handler.call(ctx).await
    }
}

/// A handler transformer in the chain
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn call(&self, ctx: Context, next: Next) -> Result<()>;

    /// Whether this middleware needs to inspect the final response payload
    ///
    /// When any registered middleware returns true, the application shell
    /// enables response buffering for every invocation.
    fn needs_response_interception(&self) -> bool {
        false
    }
}

// ----------------------------------------------------------------------
// Handler shape adapters
// ----------------------------------------------------------------------

/// `Fn(Context) -> Result<()>` passthrough shape
pub struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn call(&self, ctx: Context) -> Result<()> {
        (self.f)(ctx).await
    }
}

/// Wrap a plain `Fn(Context) -> Result<()>` handler
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    FnHandler { f }
}

/// Value-producing shape: the returned value becomes the JSON body
pub struct ProducingHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut, T> Handler for ProducingHandler<F>
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
    T: Serialize + Send + 'static,
{
    async fn call(&self, ctx: Context) -> Result<()> {
        let value = (self.f)(ctx.clone()).await?;
        // A handler that already wrote keeps its body; the produced value
        // is only the default.
        if !ctx.is_written() {
            ctx.json(&value)?;
        }
        Ok(())
    }
}

/// Wrap a handler whose return value is JSON-encoded into the response
pub fn producing_fn<F, Fut, T>(f: F) -> ProducingHandler<F>
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
    T: Serialize + Send + 'static,
{
    ProducingHandler { f }
}

/// Typed shape: the request body is bound into `Req` before the call
pub struct TypedHandler<F, Req> {
    f: F,
    _req: PhantomData<fn() -> Req>,
}

#[async_trait]
impl<F, Fut, Req> Handler for TypedHandler<F, Req>
where
    F: Fn(Context, Req) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
    Req: DeserializeOwned + Validate + Send + 'static,
{
    async fn call(&self, ctx: Context) -> Result<()> {
        let req: Req = ctx.bind_json()?;
        req.validate()
            .map_err(LiftError::validation_failed)?;
        (self.f)(ctx, req).await
    }
}

/// Wrap a handler taking a deserialized, validated request model
pub fn typed_fn<F, Fut, Req>(f: F) -> TypedHandler<F, Req>
where
    F: Fn(Context, Req) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
    Req: DeserializeOwned + Validate + Send + 'static,
{
    TypedHandler { f, _req: PhantomData }
}

/// Typed and value-producing shape
pub struct TypedProducingHandler<F, Req> {
    f: F,
    _req: PhantomData<fn() -> Req>,
}

#[async_trait]
impl<F, Fut, Req, Resp> Handler for TypedProducingHandler<F, Req>
where
    F: Fn(Context, Req) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Resp>> + Send + 'static,
    Req: DeserializeOwned + Validate + Send + 'static,
    Resp: Serialize + Send + 'static,
{
    async fn call(&self, ctx: Context) -> Result<()> {
        let req: Req = ctx.bind_json()?;
        req.validate()
            .map_err(LiftError::validation_failed)?;
        let resp = (self.f)(ctx.clone(), req).await?;
        if !ctx.is_written() {
            ctx.json(&resp)?;
        }
        Ok(())
    }
}

/// Wrap a handler taking a request model and producing a response model
pub fn typed_producing_fn<F, Fut, Req, Resp>(f: F) -> TypedProducingHandler<F, Req>
where
    F: Fn(Context, Req) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Resp>> + Send + 'static,
    Req: DeserializeOwned + Validate + Send + 'static,
    Resp: Serialize + Send + 'static,
{
    TypedProducingHandler { f, _req: PhantomData }
}

// ----------------------------------------------------------------------
// Middleware adapters and composition
// ----------------------------------------------------------------------

/// Bare-closure middleware wrapper
pub struct FnMiddleware<F> {
    f: F,
    intercepts: bool,
}

impl<F> FnMiddleware<F> {
    /// Declare that this middleware inspects the final response payload
    pub fn with_interception(mut self) -> Self {
        self.intercepts = true;
        self
    }
}

#[async_trait]
impl<F, Fut> Middleware for FnMiddleware<F>
where
    F: Fn(Context, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn call(&self, ctx: Context, next: Next) -> Result<()> {
        (self.f)(ctx, next).await
    }

    fn needs_response_interception(&self) -> bool {
        self.intercepts
    }
}

/// Wrap a bare closure as middleware
pub fn from_fn<F, Fut>(f: F) -> FnMiddleware<F>
where
    F: Fn(Context, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    FnMiddleware { f, intercepts: false }
}

struct MiddlewareLink {
    middleware: Arc<dyn Middleware>,
    next: Arc<dyn Handler>,
}

#[async_trait]
impl Handler for MiddlewareLink {
    async fn call(&self, ctx: Context) -> Result<()> {
        let next = Next {
            handler: self.next.clone(),
        };
        self.middleware.call(ctx, next).await
    }
}

/// Compose a middleware chain around a handler
///
/// The first registered middleware becomes the outermost: it runs first on
/// entry and last on exit. Each layer finishes before its wrapper returns.
pub fn compose(middleware: &[Arc<dyn Middleware>], handler: Arc<dyn Handler>) -> Arc<dyn Handler> {
    let mut wrapped = handler;
    for layer in middleware.iter().rev() {
        wrapped = Arc::new(MiddlewareLink {
            middleware: layer.clone(),
            next: wrapped,
        });
    }
    wrapped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{Request, TriggerType};
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::Mutex;

    fn context_with_body(body: &str) -> Context {
        let mut request = Request::new(TriggerType::HttpV1);
        request.body = Some(body.as_bytes().to_vec());
        Context::new(request)
    }

    #[derive(Debug, Deserialize)]
    struct CreateOrder {
        sku: String,
        quantity: u32,
    }

    impl Validate for CreateOrder {
        fn validate(&self) -> std::result::Result<(), String> {
            if self.quantity == 0 {
                return Err("quantity must be positive".to_string());
            }
            Ok(())
        }
    }

    #[derive(Debug, Serialize)]
    struct OrderCreated {
        sku: String,
    }

    #[tokio::test]
    async fn plain_handler_runs() {
        let handler = handler_fn(|ctx: Context| async move { ctx.ok(&json!({"ok": true})) });
        let ctx = Context::new(Request::new(TriggerType::HttpV1));
        handler.call(ctx.clone()).await.unwrap();
        assert_eq!(ctx.response_envelope()["statusCode"], 200);
    }

    #[tokio::test]
    async fn producing_handler_encodes_return_value() {
        let handler = producing_fn(|_ctx: Context| async move { Ok(json!({"status": "ok"})) });
        let ctx = Context::new(Request::new(TriggerType::HttpV1));
        handler.call(ctx.clone()).await.unwrap();
        assert_eq!(ctx.response_envelope()["body"], r#"{"status":"ok"}"#);
    }

    #[tokio::test]
    async fn producing_handler_defers_to_explicit_write() {
        let handler = producing_fn(|ctx: Context| async move {
            ctx.created(&json!({"explicit": true}))?;
            Ok(json!({"ignored": true}))
        });
        let ctx = Context::new(Request::new(TriggerType::HttpV1));
        handler.call(ctx.clone()).await.unwrap();
        let envelope = ctx.response_envelope();
        assert_eq!(envelope["statusCode"], 201);
        assert_eq!(envelope["body"], r#"{"explicit":true}"#);
    }

    #[tokio::test]
    async fn typed_handler_binds_and_validates() {
        let handler = typed_producing_fn(|_ctx: Context, req: CreateOrder| async move {
            Ok(OrderCreated { sku: req.sku })
        });

        let ctx = context_with_body(r#"{"sku": "A-1", "quantity": 2}"#);
        handler.call(ctx.clone()).await.unwrap();
        assert_eq!(ctx.response_envelope()["body"], r#"{"sku":"A-1"}"#);
    }

    #[tokio::test]
    async fn typed_handler_rejects_invalid_json() {
        let handler =
            typed_fn(|_ctx: Context, _req: CreateOrder| async move { Ok(()) });
        let ctx = context_with_body("{broken");
        let err = handler.call(ctx).await.unwrap_err();
        assert!(err.is_code(crate::error::codes::INVALID_JSON));
    }

    #[tokio::test]
    async fn typed_handler_rejects_empty_body() {
        let handler =
            typed_fn(|_ctx: Context, _req: CreateOrder| async move { Ok(()) });
        let ctx = Context::new(Request::new(TriggerType::HttpV1));
        let err = handler.call(ctx).await.unwrap_err();
        assert!(err.is_code(crate::error::codes::EMPTY_BODY));
    }

    #[tokio::test]
    async fn typed_handler_runs_semantic_validation() {
        let handler =
            typed_fn(|_ctx: Context, _req: CreateOrder| async move { Ok(()) });
        let ctx = context_with_body(r#"{"sku": "A-1", "quantity": 0}"#);
        let err = handler.call(ctx).await.unwrap_err();
        assert!(err.is_code(crate::error::codes::VALIDATION_ERROR));
        assert_eq!(err.status(), 422);
    }

    #[tokio::test]
    async fn middleware_nests_strictly_in_registration_order() {
        let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

        fn marker(
            name: &'static str,
            log: Arc<Mutex<Vec<String>>>,
        ) -> Arc<dyn Middleware> {
            Arc::new(from_fn(move |ctx: Context, next: Next| {
                let log = log.clone();
                async move {
                    log.lock().unwrap().push(format!("{name}:enter"));
                    let result = next.run(ctx).await;
                    log.lock().unwrap().push(format!("{name}:exit"));
                    result
                }
            }))
        }

        let middleware = vec![
            marker("m1", log.clone()),
            marker("m2", log.clone()),
            marker("m3", log.clone()),
        ];
        let inner_log = log.clone();
        let handler: Arc<dyn Handler> = Arc::new(handler_fn(move |_ctx: Context| {
            let log = inner_log.clone();
            async move {
                log.lock().unwrap().push("handler".to_string());
                Ok(())
            }
        }));

        let chain = compose(&middleware, handler);
        chain
            .call(Context::new(Request::new(TriggerType::HttpV1)))
            .await
            .unwrap();

        let order = log.lock().unwrap().clone();
        assert_eq!(
            order,
            [
                "m1:enter", "m2:enter", "m3:enter", "handler", "m3:exit", "m2:exit", "m1:exit"
            ]
        );
    }

    #[tokio::test]
    async fn middleware_may_short_circuit() {
        let gate: Arc<dyn Middleware> = Arc::new(from_fn(|ctx: Context, _next: Next| async move {
            ctx.forbidden("blocked")
        }));
        let handler: Arc<dyn Handler> = Arc::new(handler_fn(|_ctx: Context| async move {
            panic!("handler must not run");
        }));

        let chain = compose(&[gate], handler);
        let ctx = Context::new(Request::new(TriggerType::HttpV1));
        chain.call(ctx.clone()).await.unwrap();
        assert_eq!(ctx.response_envelope()["statusCode"], 403);
    }

    #[test]
    fn interception_flag_defaults_off_and_toggles() {
        let plain = from_fn(|ctx: Context, next: Next| async move { next.run(ctx).await });
        assert!(!plain.needs_response_interception());
        let intercepting = from_fn(|ctx: Context, next: Next| async move { next.run(ctx).await })
            .with_interception();
        assert!(intercepting.needs_response_interception());
    }
}
