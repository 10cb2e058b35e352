// Middleware: sequential chain execution and the route-scoped planner

use crate::adapter::HttpAdapter;
use crate::annotations::{AnnotationStore, CONTROLLER_PREFIX};
use crate::http::RequestContext;
use crate::Error;
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use regex::Regex;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, warn};

/// Type alias for the next handler in the middleware chain
pub type Next = Box<
    dyn FnOnce(RequestContext) -> Pin<Box<dyn Future<Output = Result<RequestContext, Error>> + Send>>
        + Send,
>;

/// Terminal handler a chain dispatches into once all middleware has run
pub type ChainHandlerFn = Arc<
    dyn Fn(RequestContext) -> BoxFuture<'static, Result<RequestContext, Error>> + Send + Sync,
>;

/// Middleware trait for processing requests before they reach the handler
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Process the context and optionally pass to the next middleware
    async fn handle(&self, ctx: RequestContext, next: Next) -> Result<RequestContext, Error>;
}

/// Sequential middleware chain executor
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    middlewares: Arc<Vec<Arc<dyn Middleware>>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Append a middleware to the chain
    pub fn use_middleware(&mut self, middleware: Arc<dyn Middleware>) {
        let mut middlewares = (*self.middlewares).clone();
        middlewares.push(middleware);
        self.middlewares = Arc::new(middlewares);
    }

    /// Execute the chain, ending in the terminal handler
    pub async fn apply(
        &self,
        ctx: RequestContext,
        handler: ChainHandlerFn,
    ) -> Result<RequestContext, Error> {
        debug!(
            middleware_count = self.middlewares.len(),
            path = %ctx.request.path,
            method = %ctx.request.method,
            "executing middleware chain"
        );
        self.execute_from(0, ctx, handler).await
    }

    fn execute_from(
        &self,
        index: usize,
        ctx: RequestContext,
        handler: ChainHandlerFn,
    ) -> BoxFuture<'static, Result<RequestContext, Error>> {
        if index >= self.middlewares.len() {
            handler(ctx)
        } else {
            let middleware = self.middlewares[index].clone();
            let chain = self.clone();
            let handler_clone = handler.clone();

            Box::pin(async move {
                middleware
                    .handle(
                        ctx,
                        Box::new(move |ctx| chain.execute_from(index + 1, ctx, handler_clone)),
                    )
                    .await
            })
        }
    }
}

/// Match a request path against a middleware route pattern.
///
/// Both sides are normalized to begin with `/`. A pattern ending in `/*`
/// matches strict sub-paths only, never the bare prefix. A pattern with a
/// `*` elsewhere is compiled to a regular expression. Any other pattern
/// matches exactly or as a path-segment prefix.
pub fn match_path(path: &str, pattern: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    let path = ensure_leading_slash(path);
    let pattern = ensure_leading_slash(pattern);

    if let Some(prefix) = pattern.strip_suffix("/*") {
        return path.len() > prefix.len() + 1 && path.starts_with(&format!("{}/", prefix));
    }

    if pattern.contains('*') {
        let escaped = pattern.replace('/', "\\/").replace('*', ".*");
        return Regex::new(&format!("^{}$", escaped))
            .map(|re| re.is_match(&path))
            .unwrap_or(false);
    }

    path == pattern
        || (path.starts_with(&pattern) && path.as_bytes().get(pattern.len()) == Some(&b'/'))
}

fn ensure_leading_slash(s: &str) -> String {
    if s.starts_with('/') {
        s.to_string()
    } else {
        format!("/{}", s)
    }
}

/// Reference to a middleware in a binding: a token with a zero-argument
/// constructor, or a live instance used as-is. Token construction never
/// goes through the container.
#[derive(Clone)]
pub enum MiddlewareRef {
    Factory {
        token: String,
        construct: Arc<dyn Fn() -> Arc<dyn Middleware> + Send + Sync>,
    },
    Instance(Arc<dyn Middleware>),
}

/// Where a middleware binding applies
#[derive(Debug, Clone)]
pub enum RouteMatcher {
    /// Every request path
    All,
    /// Paths matched by [`match_path`]
    Path(String),
    /// Paths under a controller's declared prefix
    Controller(String),
}

impl RouteMatcher {
    pub fn path(pattern: impl Into<String>) -> Self {
        Self::Path(pattern.into())
    }

    pub fn controller(token: impl Into<String>) -> Self {
        Self::Controller(token.into())
    }
}

/// One middleware with its route matchers and exclusion patterns
#[derive(Clone)]
pub struct MiddlewareBinding {
    pub middleware: MiddlewareRef,
    pub matchers: Vec<RouteMatcher>,
    pub excludes: Vec<String>,
}

/// Accumulates middleware declarations and builds the executable plan.
///
/// Declaration order is preserved: every binding is registered with the
/// adapter's global hook in the order it was applied, and the route and
/// exclusion gating happens inside the wrapped middleware at request time.
#[derive(Default)]
pub struct MiddlewareBuilder {
    bindings: Vec<MiddlewareBinding>,
}

impl MiddlewareBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bindings(&self) -> &[MiddlewareBinding] {
        &self.bindings
    }

    /// Apply a live middleware instance
    pub fn apply<M: Middleware + 'static>(&mut self, middleware: M) -> MiddlewareConfig<'_> {
        self.apply_ref(MiddlewareRef::Instance(Arc::new(middleware)))
    }

    /// Apply a middleware by token; it will be instantiated once through
    /// its zero-argument constructor, without dependency resolution.
    pub fn apply_factory<M: Middleware + Default + 'static>(
        &mut self,
        token: impl Into<String>,
    ) -> MiddlewareConfig<'_> {
        self.apply_ref(MiddlewareRef::Factory {
            token: token.into(),
            construct: Arc::new(|| Arc::new(M::default()) as Arc<dyn Middleware>),
        })
    }

    fn apply_ref(&mut self, middleware: MiddlewareRef) -> MiddlewareConfig<'_> {
        self.bindings.push(MiddlewareBinding {
            middleware,
            matchers: Vec::new(),
            excludes: Vec::new(),
        });
        let index = self.bindings.len() - 1;
        MiddlewareConfig {
            builder: self,
            index,
        }
    }

    /// Wrap every binding in its request-path gate and register it with the
    /// adapter's global middleware hook, in declaration order.
    pub fn build(&self, store: &AnnotationStore, adapter: &dyn HttpAdapter) {
        let mut prefix_cache: HashMap<String, Option<String>> = HashMap::new();

        for binding in &self.bindings {
            if binding.matchers.is_empty() {
                debug!("middleware declared without routes, skipping");
                continue;
            }

            let (name, instance) = match &binding.middleware {
                MiddlewareRef::Factory { token, construct } => (token.clone(), construct()),
                MiddlewareRef::Instance(instance) => ("<instance>".to_string(), instance.clone()),
            };

            let matchers = binding
                .matchers
                .iter()
                .map(|matcher| Self::compile_matcher(matcher, store, &mut prefix_cache))
                .collect();

            debug!(middleware = %name, "registering route-scoped middleware");
            adapter.use_middleware(Arc::new(RouteScopedMiddleware {
                inner: instance,
                matchers,
                excludes: binding.excludes.clone(),
            }));
        }
    }

    fn compile_matcher(
        matcher: &RouteMatcher,
        store: &AnnotationStore,
        prefix_cache: &mut HashMap<String, Option<String>>,
    ) -> CompiledMatcher {
        match matcher {
            RouteMatcher::All => CompiledMatcher::All,
            RouteMatcher::Path(pattern) => CompiledMatcher::Pattern(pattern.clone()),
            RouteMatcher::Controller(token) => {
                let prefix = prefix_cache
                    .entry(token.clone())
                    .or_insert_with(|| {
                        store
                            .get_annotation::<String>(CONTROLLER_PREFIX, token, None)
                            .map(|p| (*p).clone())
                            .filter(|p| !p.is_empty())
                    })
                    .clone();
                match prefix {
                    Some(prefix) => CompiledMatcher::Pattern(prefix),
                    None => {
                        // A controller without a prefix scopes to everything.
                        warn!(controller = %token, "controller matcher has no prefix, matching all paths");
                        CompiledMatcher::All
                    }
                }
            }
        }
    }
}

/// Handle for refining the most recently applied middleware
pub struct MiddlewareConfig<'a> {
    builder: &'a mut MiddlewareBuilder,
    index: usize,
}

impl MiddlewareConfig<'_> {
    /// Scope the middleware to the given route matchers
    pub fn for_routes(self, matchers: impl IntoIterator<Item = RouteMatcher>) -> Self {
        self.builder.bindings[self.index]
            .matchers
            .extend(matchers);
        self
    }

    /// Exclude request paths matching any of the given patterns
    pub fn exclude<S: Into<String>>(self, patterns: impl IntoIterator<Item = S>) -> Self {
        self.builder.bindings[self.index]
            .excludes
            .extend(patterns.into_iter().map(Into::into));
        self
    }
}

#[derive(Debug, Clone)]
enum CompiledMatcher {
    All,
    Pattern(String),
}

impl CompiledMatcher {
    fn matches(&self, path: &str) -> bool {
        match self {
            CompiledMatcher::All => true,
            CompiledMatcher::Pattern(pattern) => match_path(path, pattern),
        }
    }
}

/// Wraps a middleware in its route/exclusion gate. When the gate does not
/// pass, the next hop proceeds unmodified.
struct RouteScopedMiddleware {
    inner: Arc<dyn Middleware>,
    matchers: Vec<CompiledMatcher>,
    excludes: Vec<String>,
}

#[async_trait]
impl Middleware for RouteScopedMiddleware {
    async fn handle(&self, ctx: RequestContext, next: Next) -> Result<RequestContext, Error> {
        let path = ctx.path().to_string();

        if !self.matchers.iter().any(|matcher| matcher.matches(&path)) {
            return next(ctx).await;
        }
        if self
            .excludes
            .iter()
            .any(|pattern| match_path(&path, pattern))
        {
            return next(ctx).await;
        }

        self.inner.handle(ctx, next).await
    }
}
