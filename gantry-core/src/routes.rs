// Route compilation: controller declarations become an immutable dispatch
// table

use crate::annotations::{
    AnnotationStore, CONTROLLER_PREFIX, CONTROLLER_ROUTES, ROUTE_HANDLER, ROUTE_PARAMS,
};
use crate::http::HttpMethod;
use crate::lifecycle::Provider;
use crate::params::{DeclaredType, ParamBinding, ParamKey, ParamSource};
use crate::Error;
use futures_util::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, warn};

/// Invokes the bound handler method on a resolved controller instance with
/// the coerced argument vector.
pub type HandlerInvoker = Arc<
    dyn Fn(Arc<dyn Provider>, Vec<Value>) -> BoxFuture<'static, Result<Value, Error>>
        + Send
        + Sync,
>;

/// One route as declared on a controller, before path composition
#[derive(Debug, Clone)]
pub struct RouteSpec {
    pub method: HttpMethod,
    pub path: String,
    pub handler_name: String,
}

/// Compiled record of one HTTP method + full path + handler + parameter
/// bindings
#[derive(Clone)]
pub struct RouteDescriptor {
    pub method: HttpMethod,
    pub path: String,
    pub controller: String,
    pub handler_name: String,
    pub params: Vec<ParamBinding>,
    pub(crate) invoker: HandlerInvoker,
}

impl std::fmt::Debug for RouteDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteDescriptor")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("controller", &self.controller)
            .field("handler_name", &self.handler_name)
            .field("params", &self.params.len())
            .finish()
    }
}

/// Ordered, immutable dispatch table built once at startup
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<RouteDescriptor>,
}

impl RouteTable {
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RouteDescriptor> {
        self.routes.iter()
    }

    /// Find the first route matching the request method and path, returning
    /// the captured path parameters.
    pub fn match_route(
        &self,
        method: &str,
        path: &str,
    ) -> Option<(&RouteDescriptor, HashMap<String, String>)> {
        self.routes
            .iter()
            .filter(|route| route.method.as_str().eq_ignore_ascii_case(method))
            .find_map(|route| match_route_path(&route.path, path).map(|params| (route, params)))
    }
}

/// Match a `:name` segment pattern against a request path.
/// Returns the captured parameters on a match.
pub fn match_route_path(pattern: &str, path: &str) -> Option<HashMap<String, String>> {
    let pattern_parts: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
    let path_parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    if pattern_parts.len() != path_parts.len() {
        return None;
    }

    let mut params = HashMap::new();
    for (pattern_part, path_part) in pattern_parts.iter().zip(path_parts.iter()) {
        if let Some(param_name) = pattern_part.strip_prefix(':') {
            params.insert(param_name.to_string(), path_part.to_string());
        } else if pattern_part != path_part {
            return None;
        }
    }

    Some(params)
}

/// Reads controller annotations and produces the route table.
pub struct RouteCompiler;

impl RouteCompiler {
    pub fn compile(store: &AnnotationStore, controllers: &[String]) -> RouteTable {
        let mut routes = Vec::new();

        for token in controllers {
            let prefix = store
                .get_annotation::<String>(CONTROLLER_PREFIX, token, None)
                .map(|p| (*p).clone())
                .unwrap_or_default();
            let specs = store
                .get_annotation::<Vec<RouteSpec>>(CONTROLLER_ROUTES, token, None)
                .map(|specs| (*specs).clone())
                .unwrap_or_default();

            for spec in specs {
                let suffix = if spec.path == "/" { "" } else { spec.path.as_str() };
                let full_path = format!("{}{}", prefix, suffix);
                if full_path.is_empty() {
                    // An empty composed path disables the route.
                    debug!(
                        controller = %token,
                        handler = %spec.handler_name,
                        "skipping route with empty composed path"
                    );
                    continue;
                }

                let invoker = match store.get_annotation::<HandlerInvoker>(
                    ROUTE_HANDLER,
                    token,
                    Some(&spec.handler_name),
                ) {
                    Some(invoker) => (*invoker).clone(),
                    None => {
                        warn!(
                            controller = %token,
                            handler = %spec.handler_name,
                            "route declared without a handler, skipping"
                        );
                        continue;
                    }
                };

                let mut params = store
                    .get_annotation::<Vec<ParamBinding>>(
                        ROUTE_PARAMS,
                        token,
                        Some(&spec.handler_name),
                    )
                    .map(|params| (*params).clone())
                    .unwrap_or_default();
                // Align bindings positionally with the handler signature.
                params.sort_by_key(|binding| binding.index);

                debug!(
                    method = %spec.method,
                    path = %full_path,
                    controller = %token,
                    handler = %spec.handler_name,
                    "route compiled"
                );
                routes.push(RouteDescriptor {
                    method: spec.method,
                    path: full_path,
                    controller: token.clone(),
                    handler_name: spec.handler_name,
                    params,
                    invoker,
                });
            }
        }

        RouteTable { routes }
    }
}

/// Collected controller declarations, ready to be written into the
/// annotation store at assembly time.
pub struct ControllerMeta {
    pub token: String,
    pub prefix: String,
    routes: Vec<RouteSpec>,
    params: HashMap<String, Vec<ParamBinding>>,
    invokers: HashMap<String, HandlerInvoker>,
}

impl ControllerMeta {
    pub fn write_annotations(&self, store: &AnnotationStore) {
        store.set_annotation(CONTROLLER_PREFIX, self.prefix.clone(), &self.token, None);
        store.set_annotation(CONTROLLER_ROUTES, self.routes.clone(), &self.token, None);
        for (handler_name, bindings) in &self.params {
            store.set_annotation(
                ROUTE_PARAMS,
                bindings.clone(),
                &self.token,
                Some(handler_name),
            );
        }
        for (handler_name, invoker) in &self.invokers {
            store.set_annotation(
                ROUTE_HANDLER,
                invoker.clone(),
                &self.token,
                Some(handler_name),
            );
        }
    }
}

/// Fluent declaration surface for one controller: path prefix, verb-mapped
/// handlers and their parameter bindings.
pub struct ControllerBuilder<C> {
    meta: ControllerMeta,
    _marker: PhantomData<fn() -> C>,
}

impl<C: Provider> ControllerBuilder<C> {
    pub fn new(token: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            meta: ControllerMeta {
                token: token.into(),
                prefix: prefix.into(),
                routes: Vec::new(),
                params: HashMap::new(),
                invokers: HashMap::new(),
            },
            _marker: PhantomData,
        }
    }

    pub fn token(&self) -> &str {
        &self.meta.token
    }

    pub fn route(self, method: HttpMethod, path: impl Into<String>, name: impl Into<String>) -> RouteBuilder<C> {
        RouteBuilder {
            owner: self,
            spec: RouteSpec {
                method,
                path: path.into(),
                handler_name: name.into(),
            },
            bindings: Vec::new(),
        }
    }

    pub fn get(self, path: impl Into<String>, name: impl Into<String>) -> RouteBuilder<C> {
        self.route(HttpMethod::GET, path, name)
    }

    pub fn post(self, path: impl Into<String>, name: impl Into<String>) -> RouteBuilder<C> {
        self.route(HttpMethod::POST, path, name)
    }

    pub fn put(self, path: impl Into<String>, name: impl Into<String>) -> RouteBuilder<C> {
        self.route(HttpMethod::PUT, path, name)
    }

    pub fn delete(self, path: impl Into<String>, name: impl Into<String>) -> RouteBuilder<C> {
        self.route(HttpMethod::DELETE, path, name)
    }

    pub fn patch(self, path: impl Into<String>, name: impl Into<String>) -> RouteBuilder<C> {
        self.route(HttpMethod::PATCH, path, name)
    }

    pub fn into_meta(self) -> ControllerMeta {
        self.meta
    }
}

/// Builder for one route on a controller
pub struct RouteBuilder<C> {
    owner: ControllerBuilder<C>,
    spec: RouteSpec,
    bindings: Vec<ParamBinding>,
}

impl<C: Provider> RouteBuilder<C> {
    fn push(mut self, source: ParamSource, key: ParamKey, declared: DeclaredType) -> Self {
        let index = self.bindings.len();
        self.bindings
            .push(ParamBinding::new(source, key, declared, index));
        self
    }

    /// Bind a named path parameter
    pub fn param(self, name: impl Into<String>, declared: DeclaredType) -> Self {
        self.push(ParamSource::Param, ParamKey::Named(name.into()), declared)
    }

    /// Bind the entire path-parameter map
    pub fn param_full(self) -> Self {
        self.push(ParamSource::Param, ParamKey::Full, DeclaredType::Raw)
    }

    /// Bind a named query-string field
    pub fn query(self, name: impl Into<String>, declared: DeclaredType) -> Self {
        self.push(ParamSource::Query, ParamKey::Named(name.into()), declared)
    }

    /// Bind the entire query map
    pub fn query_full(self) -> Self {
        self.push(ParamSource::Query, ParamKey::Full, DeclaredType::Raw)
    }

    /// Bind a named field of the parsed body
    pub fn body(self, name: impl Into<String>) -> Self {
        self.push(ParamSource::Body, ParamKey::Named(name.into()), DeclaredType::Raw)
    }

    /// Bind the entire parsed body
    pub fn body_full(self) -> Self {
        self.push(ParamSource::Body, ParamKey::Full, DeclaredType::Raw)
    }

    /// Declare a fallback value substituted when the bound field is absent.
    /// Applies to the most recently declared binding.
    pub fn or_default(mut self, value: Value) -> Self {
        if let Some(last) = self.bindings.pop() {
            self.bindings.push(last.or_default(value));
        }
        self
    }

    /// Attach the handler and return to the controller builder.
    pub fn handler<F, Fut>(mut self, f: F) -> ControllerBuilder<C>
    where
        F: Fn(Arc<C>, Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Value, Error>> + Send + 'static,
    {
        let f = Arc::new(f);
        let invoker: HandlerInvoker = Arc::new(move |instance: Arc<dyn Provider>, args| {
            let f = f.clone();
            match instance.into_any().downcast::<C>() {
                Ok(controller) => Box::pin(async move { f(controller, args).await }),
                Err(_) => Box::pin(async move {
                    Err(Error::Internal(format!(
                        "resolved instance is not a {}",
                        std::any::type_name::<C>()
                    )))
                }),
            }
        });

        let name = self.spec.handler_name.clone();
        self.owner.meta.routes.push(self.spec);
        self.owner.meta.params.insert(name.clone(), self.bindings);
        self.owner.meta.invokers.insert(name, invoker);
        self.owner
    }
}
