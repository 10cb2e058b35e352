//! Gantry core: a scoped dependency-injection container and the request
//! pipeline built on top of it.
//!
//! The container resolves string-token registrations recursively with cycle
//! detection and three instance lifetimes (singleton, request, transient).
//! The pipeline compiles controller declarations into an immutable route
//! table, extracts and coerces handler arguments, gates middleware by
//! request path, and runs before/after/error/complete hooks across all
//! registered providers for every request.

pub mod adapter;
pub mod annotations;
pub mod application;
pub mod container;
pub mod error;
pub mod exception;
pub mod http;
pub mod lifecycle;
pub mod logging;
pub mod middleware;
pub mod module;
pub mod params;
pub mod routes;
pub mod scope;

pub use adapter::{HttpAdapter, HyperAdapter, Router, TestAdapter};
pub use annotations::AnnotationStore;
pub use application::{Application, ApplicationOptions};
pub use container::{Container, ContextGuard, ProviderFactory};
pub use error::Error;
pub use exception::HttpException;
pub use http::{HttpMethod, HttpRequest, HttpResponse, RequestContext};
pub use lifecycle::{
    AfterRequest, BeforeApplicationShutdown, BeforeRequest, LifecycleResult,
    OnApplicationBootstrap, OnModuleDestroy, OnModuleInit, OnRequestComplete, OnRequestError,
    Provider, RequestLifecycle,
};
pub use middleware::{
    match_path, Middleware, MiddlewareBinding, MiddlewareBuilder, MiddlewareChain, MiddlewareRef,
    Next, RouteMatcher,
};
pub use module::{dep, ControllerDef, ModuleDef, ProviderDef};
pub use params::{CoercionPolicy, DeclaredType, ParamBinding, ParamKey, ParamResolver, ParamSource};
pub use routes::{
    match_route_path, ControllerBuilder, RouteCompiler, RouteDescriptor, RouteTable,
};
pub use scope::Scope;
