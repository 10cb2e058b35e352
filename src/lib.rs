// Gantry - a modular HTTP runtime for Rust
//
// Scoped dependency injection, compiled routing, path-gated middleware and
// per-request lifecycle hooks behind a narrow transport adapter contract.

// Re-export core functionality
pub use gantry_core::*;

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        impl_provider, AfterRequest, Application, ApplicationOptions, BeforeRequest,
        CoercionPolicy, Container, ControllerBuilder, ControllerDef, DeclaredType, Error,
        HttpAdapter, HttpException, HttpMethod, HttpRequest, HttpResponse, HyperAdapter,
        Middleware, MiddlewareBuilder, ModuleDef, Next, OnModuleDestroy, OnModuleInit,
        OnRequestComplete, OnRequestError, Provider, ProviderDef, RequestContext, RouteMatcher,
        Scope, TestAdapter,
    };
}
