// Transport adapter contract, router dispatch, and the bundled hyper and
// in-memory adapters

use crate::http::{parse_query_string, HttpRequest, HttpResponse, RequestContext};
use crate::lifecycle::RequestLifecycle;
use crate::middleware::{ChainHandlerFn, Middleware, MiddlewareChain};
use crate::params::ParamResolver;
use crate::routes::RouteTable;
use crate::{Error, HttpException};
use async_trait::async_trait;
use http_body_util::{BodyExt, Full};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{body::Incoming as IncomingBody, Request, Response};
use hyper_util::rt::TokioIo;
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use tokio::net::TcpListener;
use tracing::{debug, error, info};

/// Narrow contract between the runtime and the underlying transport.
///
/// The runtime never parses raw bytes: it reads already-decoded maps and
/// values through these accessors and writes a response value back. The
/// bundled implementations are [`HyperAdapter`] for real sockets and
/// [`TestAdapter`] for in-memory dispatch.
#[async_trait]
pub trait HttpAdapter: Send + Sync + 'static {
    /// Decoded query-string map for the in-flight request
    fn get_request_query(&self, ctx: &RequestContext) -> HashMap<String, String> {
        ctx.request.query_params.clone()
    }

    /// Captured path-parameter map for the matched route
    fn get_request_params(&self, ctx: &RequestContext) -> HashMap<String, String> {
        ctx.request.path_params.clone()
    }

    /// Parsed request body; an absent or unparsable body reads as null
    fn get_request_body(&self, ctx: &RequestContext) -> Value {
        if ctx.request.body.is_empty() {
            return Value::Null;
        }
        serde_json::from_slice(&ctx.request.body).unwrap_or_else(|err| {
            debug!(error = %err, "request body is not valid JSON");
            Value::Null
        })
    }

    /// Write the response value into the context
    fn set_response(&self, ctx: &mut RequestContext, value: Value) {
        ctx.response = Some(value);
    }

    /// Register a middleware with the global chain
    fn use_middleware(&self, middleware: Arc<dyn Middleware>);

    /// Build a router over a compiled route table
    fn create_router(
        &self,
        table: RouteTable,
        lifecycle: RequestLifecycle,
        resolver: ParamResolver,
    ) -> Arc<Router> {
        Arc::new(Router::new(table, lifecycle, resolver))
    }

    /// Install the router as the chain's terminal dispatcher
    fn apply_router(&self, router: Arc<Router>);

    /// Serve until the process stops
    async fn listen(self: Arc<Self>, port: u16) -> Result<(), Error>;
}

/// Matches requests against the route table and runs the per-request
/// lifecycle for the matched route.
pub struct Router {
    table: Arc<RouteTable>,
    lifecycle: Arc<RequestLifecycle>,
    resolver: ParamResolver,
}

impl Router {
    pub fn new(table: RouteTable, lifecycle: RequestLifecycle, resolver: ParamResolver) -> Self {
        Self {
            table: Arc::new(table),
            lifecycle: Arc::new(lifecycle),
            resolver,
        }
    }

    pub fn table(&self) -> &RouteTable {
        &self.table
    }

    /// Open a request context with a freshly minted context id.
    pub fn create_context(&self, request: HttpRequest) -> RequestContext {
        let context_id = self.lifecycle.container().create_context_id();
        RequestContext::new(context_id, request)
    }

    /// Route one request. Unmatched requests produce the uniform 404 body;
    /// matched requests run the full lifecycle.
    pub async fn dispatch(
        &self,
        mut ctx: RequestContext,
        adapter: &dyn HttpAdapter,
    ) -> Result<RequestContext, Error> {
        let (path, query) = match ctx.request.path.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query.to_string())),
            None => (ctx.request.path.clone(), None),
        };
        if let Some(query) = query {
            ctx.request.query_params = parse_query_string(&query);
        }

        match self.table.match_route(&ctx.request.method, &path) {
            Some((route, path_params)) => {
                ctx.request.path_params = path_params;
                Ok(self
                    .lifecycle
                    .run(route, &self.resolver, adapter, ctx)
                    .await)
            }
            None => {
                debug!(method = %ctx.request.method, path = %path, "no route matched");
                let exception = HttpException::not_found(format!(
                    "Cannot {} {}",
                    ctx.request.method, path
                ));
                ctx.set_status(exception.status);
                ctx.response = Some(exception.to_body());
                Ok(ctx)
            }
        }
    }
}

/// Run the global chain with router dispatch as the terminal and convert
/// the finished context into a transport response.
async fn drive(
    chain: MiddlewareChain,
    router: Arc<Router>,
    adapter: Arc<dyn HttpAdapter>,
    request: HttpRequest,
) -> HttpResponse {
    let ctx = router.create_context(request);

    let terminal: ChainHandlerFn = {
        let router = router.clone();
        let adapter = adapter.clone();
        Arc::new(move |ctx| {
            let router = router.clone();
            let adapter = adapter.clone();
            Box::pin(async move { router.dispatch(ctx, adapter.as_ref()).await })
        })
    };

    match chain.apply(ctx, terminal).await {
        Ok(ctx) => finalize(ctx),
        Err(err) => {
            // A middleware failed outside the lifecycle runner.
            let exception = HttpException::from_error(err);
            error!(status = exception.status, message = %exception.message, "middleware chain failed");
            HttpResponse::new(exception.status)
                .with_json(&exception.to_body())
                .unwrap_or_else(|_| HttpResponse::internal_server_error())
        }
    }
}

fn finalize(ctx: RequestContext) -> HttpResponse {
    let status = ctx.status.unwrap_or(200);
    match ctx.response {
        Some(value) => HttpResponse::new(status)
            .with_json(&value)
            .unwrap_or_else(|_| HttpResponse::internal_server_error()),
        None => HttpResponse::new(status),
    }
}

/// In-memory adapter: drives the identical pipeline without sockets.
#[derive(Default)]
pub struct TestAdapter {
    chain: RwLock<MiddlewareChain>,
    router: RwLock<Option<Arc<Router>>>,
}

impl TestAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inject a request and collect the response the transport would have
    /// written.
    pub async fn inject(self: Arc<Self>, request: HttpRequest) -> HttpResponse {
        let router = match self.router.read().unwrap().clone() {
            Some(router) => router,
            None => {
                return HttpResponse::internal_server_error()
                    .with_json(&HttpException::internal_server_error("no router applied").to_body())
                    .unwrap_or_else(|_| HttpResponse::internal_server_error());
            }
        };
        let chain = self.chain.read().unwrap().clone();
        drive(chain, router, self, request).await
    }
}

#[async_trait]
impl HttpAdapter for TestAdapter {
    fn use_middleware(&self, middleware: Arc<dyn Middleware>) {
        self.chain.write().unwrap().use_middleware(middleware);
    }

    fn apply_router(&self, router: Arc<Router>) {
        *self.router.write().unwrap() = Some(router);
    }

    async fn listen(self: Arc<Self>, _port: u16) -> Result<(), Error> {
        Err(Error::Internal(
            "the in-memory adapter does not bind sockets".to_string(),
        ))
    }
}

/// Tokio + hyper http1 transport.
#[derive(Default)]
pub struct HyperAdapter {
    chain: RwLock<MiddlewareChain>,
    router: RwLock<Option<Arc<Router>>>,
}

impl HyperAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    async fn handle(self: Arc<Self>, request: HttpRequest) -> HttpResponse {
        let router = match self.router.read().unwrap().clone() {
            Some(router) => router,
            None => return HttpResponse::internal_server_error(),
        };
        let chain = self.chain.read().unwrap().clone();
        drive(chain, router, self, request).await
    }
}

#[async_trait]
impl HttpAdapter for HyperAdapter {
    fn use_middleware(&self, middleware: Arc<dyn Middleware>) {
        self.chain.write().unwrap().use_middleware(middleware);
    }

    fn apply_router(&self, router: Arc<Router>) {
        *self.router.write().unwrap() = Some(router);
    }

    async fn listen(self: Arc<Self>, port: u16) -> Result<(), Error> {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = TcpListener::bind(addr).await?;
        info!(%addr, "server listening");

        loop {
            let (stream, _) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let adapter = self.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req: Request<IncomingBody>| {
                    let adapter = adapter.clone();
                    async move { serve_one(req, adapter).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    error!(error = ?err, "error serving connection");
                }
            });
        }
    }
}

async fn serve_one(
    req: Request<IncomingBody>,
    adapter: Arc<HyperAdapter>,
) -> Result<Response<Full<bytes::Bytes>>, hyper::Error> {
    let method = req.method().to_string();
    let path = req
        .uri()
        .path_and_query()
        .map(|pq| pq.to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    let mut request = HttpRequest::new(method, path);
    for (name, value) in req.headers() {
        if let Ok(value) = value.to_str() {
            request.headers.insert(name.to_string(), value.to_string());
        }
    }
    request.body = req.collect().await?.to_bytes().to_vec();

    let response = adapter.handle(request).await;

    let mut builder = Response::builder().status(response.status);
    for (key, value) in response.headers {
        builder = builder.header(key, value);
    }
    let body = Full::new(bytes::Bytes::from(response.body));
    Ok(builder
        .body(body)
        .unwrap_or_else(|_| Response::new(Full::new(bytes::Bytes::new()))))
}
