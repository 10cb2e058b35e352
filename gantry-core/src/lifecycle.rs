//! Lifecycle hooks and the per-request lifecycle runner.
//!
//! Providers participate in the request and application lifecycles through a
//! closed set of optional capability traits. A provider declares a
//! capability by overriding the matching `as_*` accessor on [`Provider`] to
//! return itself; the runner checks capabilities through those accessors
//! instead of probing by name.
//!
//! Request path hooks, in execution order:
//!
//! - [`BeforeRequest`] - runs before the handler, for every provider
//! - [`AfterRequest`] - success path; each hook may transform the result
//! - [`OnRequestError`] - failure path; first defined result wins
//! - [`OnRequestComplete`] - always runs, success or failure
//!
//! Application path hooks: [`OnModuleInit`], [`OnApplicationBootstrap`],
//! [`BeforeApplicationShutdown`], [`OnModuleDestroy`].

use crate::adapter::HttpAdapter;
use crate::container::{Container, ContextGuard};
use crate::http::RequestContext;
use crate::params::ParamResolver;
use crate::routes::RouteDescriptor;
use crate::{Error, HttpException};
use async_trait::async_trait;
use serde_json::Value;
use std::any::Any;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Result type for application lifecycle hooks
pub type LifecycleResult = Result<(), Error>;

/// Hook invoked before the route handler runs
#[async_trait]
pub trait BeforeRequest: Send + Sync {
    async fn before_request(&self, ctx: &mut RequestContext) -> Result<(), Error>;
}

/// Hook invoked after a successful handler; the returned value replaces the
/// current result and feeds the next hook
#[async_trait]
pub trait AfterRequest: Send + Sync {
    async fn after_request(&self, ctx: &mut RequestContext, result: Value) -> Result<Value, Error>;
}

/// Hook invoked when the handler or a before-hook fails. Returning
/// `Some(value)` short-circuits remaining error hooks and becomes the
/// response body.
#[async_trait]
pub trait OnRequestError: Send + Sync {
    async fn on_request_error(
        &self,
        ctx: &mut RequestContext,
        error: &HttpException,
    ) -> Result<Option<Value>, Error>;
}

/// Hook invoked once per request after the response is decided, on both the
/// success and failure paths
#[async_trait]
pub trait OnRequestComplete: Send + Sync {
    async fn on_request_complete(&self, ctx: &mut RequestContext) -> Result<(), Error>;
}

/// Hook called once the module tree has been registered
#[async_trait]
pub trait OnModuleInit: Send + Sync {
    async fn on_module_init(&self) -> LifecycleResult;
}

/// Hook called after the application has fully started
#[async_trait]
pub trait OnApplicationBootstrap: Send + Sync {
    async fn on_application_bootstrap(&self) -> LifecycleResult;
}

/// Hook called first during graceful shutdown
#[async_trait]
pub trait BeforeApplicationShutdown: Send + Sync {
    async fn before_application_shutdown(&self, signal: Option<String>) -> LifecycleResult;
}

/// Hook called before the provider is discarded at shutdown
#[async_trait]
pub trait OnModuleDestroy: Send + Sync {
    async fn on_module_destroy(&self) -> LifecycleResult;
}

/// Base trait for anything constructible by the container.
///
/// `into_any` supports typed downcasts; the `as_*` accessors are the
/// capability checks for the hook set above. All accessors default to
/// `None`; use [`crate::impl_provider!`] to implement the trait and opt in
/// to capabilities without boilerplate.
pub trait Provider: Any + Send + Sync {
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    fn as_before_request(self: Arc<Self>) -> Option<Arc<dyn BeforeRequest>> {
        None
    }
    fn as_after_request(self: Arc<Self>) -> Option<Arc<dyn AfterRequest>> {
        None
    }
    fn as_request_error(self: Arc<Self>) -> Option<Arc<dyn OnRequestError>> {
        None
    }
    fn as_request_complete(self: Arc<Self>) -> Option<Arc<dyn OnRequestComplete>> {
        None
    }
    fn as_module_init(self: Arc<Self>) -> Option<Arc<dyn OnModuleInit>> {
        None
    }
    fn as_application_bootstrap(self: Arc<Self>) -> Option<Arc<dyn OnApplicationBootstrap>> {
        None
    }
    fn as_before_shutdown(self: Arc<Self>) -> Option<Arc<dyn BeforeApplicationShutdown>> {
        None
    }
    fn as_module_destroy(self: Arc<Self>) -> Option<Arc<dyn OnModuleDestroy>> {
        None
    }
}

impl std::fmt::Debug for dyn Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("dyn Provider").finish_non_exhaustive()
    }
}

#[doc(hidden)]
#[macro_export]
macro_rules! __provider_capability {
    (before_request) => {
        fn as_before_request(
            self: ::std::sync::Arc<Self>,
        ) -> Option<::std::sync::Arc<dyn $crate::BeforeRequest>> {
            Some(self)
        }
    };
    (after_request) => {
        fn as_after_request(
            self: ::std::sync::Arc<Self>,
        ) -> Option<::std::sync::Arc<dyn $crate::AfterRequest>> {
            Some(self)
        }
    };
    (on_request_error) => {
        fn as_request_error(
            self: ::std::sync::Arc<Self>,
        ) -> Option<::std::sync::Arc<dyn $crate::OnRequestError>> {
            Some(self)
        }
    };
    (on_request_complete) => {
        fn as_request_complete(
            self: ::std::sync::Arc<Self>,
        ) -> Option<::std::sync::Arc<dyn $crate::OnRequestComplete>> {
            Some(self)
        }
    };
    (on_module_init) => {
        fn as_module_init(
            self: ::std::sync::Arc<Self>,
        ) -> Option<::std::sync::Arc<dyn $crate::OnModuleInit>> {
            Some(self)
        }
    };
    (on_application_bootstrap) => {
        fn as_application_bootstrap(
            self: ::std::sync::Arc<Self>,
        ) -> Option<::std::sync::Arc<dyn $crate::OnApplicationBootstrap>> {
            Some(self)
        }
    };
    (before_application_shutdown) => {
        fn as_before_shutdown(
            self: ::std::sync::Arc<Self>,
        ) -> Option<::std::sync::Arc<dyn $crate::BeforeApplicationShutdown>> {
            Some(self)
        }
    };
    (on_module_destroy) => {
        fn as_module_destroy(
            self: ::std::sync::Arc<Self>,
        ) -> Option<::std::sync::Arc<dyn $crate::OnModuleDestroy>> {
            Some(self)
        }
    };
}

/// Implement [`Provider`] for a type, declaring the lifecycle capabilities
/// it participates in.
///
/// ```ignore
/// impl_provider!(AuditService: before_request, on_request_complete);
/// impl_provider!(UserService);
/// ```
#[macro_export]
macro_rules! impl_provider {
    ($ty:ty) => {
        impl $crate::Provider for $ty {
            fn into_any(
                self: ::std::sync::Arc<Self>,
            ) -> ::std::sync::Arc<dyn ::std::any::Any + Send + Sync> {
                self
            }
        }
    };
    ($ty:ty : $($cap:ident),+ $(,)?) => {
        impl $crate::Provider for $ty {
            fn into_any(
                self: ::std::sync::Arc<Self>,
            ) -> ::std::sync::Arc<dyn ::std::any::Any + Send + Sync> {
                self
            }
            $( $crate::__provider_capability!($cap); )+
        }
    };
}

/// Runs the per-request lifecycle across all registered providers.
///
/// Hooks execute in provider-registration order. The runner guarantees a
/// response is always produced and that the request-scoped instance cache
/// is evicted exactly once per request, whatever path the request takes.
pub struct RequestLifecycle {
    container: Container,
    providers: Arc<Vec<String>>,
}

impl RequestLifecycle {
    pub fn new(container: Container, providers: Vec<String>) -> Self {
        Self {
            container,
            providers: Arc::new(providers),
        }
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    /// Run one request to completion and return the finalized context.
    pub async fn run(
        &self,
        route: &RouteDescriptor,
        resolver: &ParamResolver,
        adapter: &dyn HttpAdapter,
        mut ctx: RequestContext,
    ) -> RequestContext {
        // Evicts the request-scoped cache when it drops, on every path out.
        let _guard = ContextGuard::new(self.container.clone(), ctx.context_id.clone());

        let outcome = self.execute(route, resolver, adapter, &mut ctx).await;

        match outcome {
            Ok(result) => {
                adapter.set_response(&mut ctx, result);
            }
            Err(err) => {
                let body = self.handle_error(&mut ctx, err).await;
                let status = body
                    .get("status")
                    .and_then(Value::as_u64)
                    .map(|s| s as u16)
                    .unwrap_or(500);
                ctx.set_status(status);
                adapter.set_response(&mut ctx, body);
            }
        }

        self.on_complete(&mut ctx).await;
        ctx
    }

    async fn execute(
        &self,
        route: &RouteDescriptor,
        resolver: &ParamResolver,
        adapter: &dyn HttpAdapter,
        ctx: &mut RequestContext,
    ) -> Result<Value, Error> {
        self.before_request(ctx).await?;

        let controller = self
            .container
            .get(&route.controller, Some(&ctx.context_id))?;
        let args = resolver.resolve(&route.params, ctx, adapter)?;

        debug!(
            handler = %route.handler_name,
            controller = %route.controller,
            context_id = %ctx.context_id,
            "invoking route handler"
        );
        let result = (route.invoker)(controller, args).await?;

        self.after_request(ctx, result).await
    }

    /// Invoke `before_request` on every provider exposing it, in
    /// registration order. Errors enter the request error path.
    pub async fn before_request(&self, ctx: &mut RequestContext) -> Result<(), Error> {
        for token in self.providers.iter() {
            let instance = self.container.get(token, Some(&ctx.context_id))?;
            if let Some(hook) = instance.as_before_request() {
                hook.before_request(ctx).await?;
            }
        }
        Ok(())
    }

    /// Fold the handler result through every `after_request` hook; each
    /// hook's return value feeds the next.
    pub async fn after_request(
        &self,
        ctx: &mut RequestContext,
        result: Value,
    ) -> Result<Value, Error> {
        let mut processed = result;
        for token in self.providers.iter() {
            let instance = self.container.get(token, Some(&ctx.context_id))?;
            if let Some(hook) = instance.as_after_request() {
                processed = hook.after_request(ctx, processed).await?;
            }
        }
        Ok(processed)
    }

    /// Normalize the error and offer it to every `on_request_error` hook in
    /// registration order. The first defined result becomes the response
    /// body; a failing hook is logged and skipped. Falls back to the
    /// normalized error's default body.
    pub async fn handle_error(&self, ctx: &mut RequestContext, err: Error) -> Value {
        let exception = HttpException::from_error(err);
        warn!(
            status = exception.status,
            code = %exception.code,
            message = %exception.message,
            context_id = %ctx.context_id,
            "request failed"
        );

        for token in self.providers.iter() {
            let instance = match self.container.get(token, Some(&ctx.context_id)) {
                Ok(instance) => instance,
                Err(resolve_err) => {
                    error!(provider = %token, error = %resolve_err, "error hook unavailable");
                    continue;
                }
            };
            if let Some(hook) = instance.as_request_error() {
                match hook.on_request_error(ctx, &exception).await {
                    Ok(Some(result)) => return result,
                    Ok(None) => {}
                    Err(hook_err) => {
                        error!(provider = %token, error = %hook_err, "error hook failed");
                    }
                }
            }
        }

        exception.to_body()
    }

    /// Invoke `on_request_complete` on every provider exposing it. Hook
    /// failures are logged and never abort remaining hooks.
    pub async fn on_complete(&self, ctx: &mut RequestContext) {
        for token in self.providers.iter() {
            let instance = match self.container.get(token, Some(&ctx.context_id)) {
                Ok(instance) => instance,
                Err(resolve_err) => {
                    error!(provider = %token, error = %resolve_err, "complete hook unavailable");
                    continue;
                }
            };
            if let Some(hook) = instance.as_request_complete() {
                if let Err(hook_err) = hook.on_request_complete(ctx).await {
                    error!(provider = %token, error = %hook_err, "complete hook failed");
                }
            }
        }
    }
}
