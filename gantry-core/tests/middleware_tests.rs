use async_trait::async_trait;
use gantry_core::{
    impl_provider, match_path, Application, ControllerBuilder, ControllerDef, Error, HttpRequest,
    Middleware, ModuleDef, Next, RequestContext, RouteMatcher, TestAdapter,
};
use serde_json::json;
use std::sync::{Arc, Mutex};

type Log = Arc<Mutex<Vec<String>>>;

struct Tagger {
    name: &'static str,
    log: Log,
}

#[async_trait]
impl Middleware for Tagger {
    async fn handle(&self, ctx: RequestContext, next: Next) -> Result<RequestContext, Error> {
        self.log.lock().unwrap().push(self.name.to_string());
        next(ctx).await
    }
}

#[derive(Default)]
struct StampMiddleware;

#[async_trait]
impl Middleware for StampMiddleware {
    async fn handle(&self, mut ctx: RequestContext, next: Next) -> Result<RequestContext, Error> {
        ctx.state.insert("stamped".to_string(), json!(true));
        next(ctx).await
    }
}

struct Blocker;

#[async_trait]
impl Middleware for Blocker {
    async fn handle(&self, mut ctx: RequestContext, _next: Next) -> Result<RequestContext, Error> {
        ctx.set_status(403);
        ctx.response = Some(json!({"status": 403, "message": "blocked"}));
        Ok(ctx)
    }
}

struct PingController;
impl_provider!(PingController);

fn controller(token: &str, prefix: &str) -> ControllerDef {
    let builder = ControllerBuilder::<PingController>::new(token, prefix)
        .get("/", "index")
        .handler(|_ctrl, _args| async { Ok(json!("pong")) })
        .get("/:id", "show")
        .handler(|_ctrl, _args| async { Ok(json!("pong")) });
    ControllerDef::new(builder, |_deps| Ok(PingController))
}

#[test]
fn test_match_path_properties() {
    assert!(match_path("/users/123", "/users"));
    assert!(!match_path("/userservice", "/users"));
    assert!(match_path("/users/123", "/users/*"));
    assert!(!match_path("/users", "/users/*"));
}

#[tokio::test]
async fn test_global_and_scoped_middleware_with_exclusion() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));

    let module = ModuleDef::new("AppModule")
        .controller(controller("UsersController", "/users"))
        .controller(controller("HealthController", "/health"))
        .configure({
            let log = log.clone();
            move |mw| {
                mw.apply(Tagger { name: "A", log: log.clone() })
                    .for_routes([RouteMatcher::All]);
                mw.apply(Tagger { name: "B", log: log.clone() })
                    .for_routes([RouteMatcher::path("/users")])
                    .exclude(["/users/secret"]);
            }
        });

    let adapter = Arc::new(TestAdapter::new());
    let _app = Application::create(module, adapter.clone()).await.unwrap();

    adapter.clone().inject(HttpRequest::new("GET", "/users/1")).await;
    assert_eq!(log.lock().unwrap().clone(), vec!["A", "B"]);

    log.lock().unwrap().clear();
    adapter.clone().inject(HttpRequest::new("GET", "/users/secret")).await;
    assert_eq!(log.lock().unwrap().clone(), vec!["A"]);

    log.lock().unwrap().clear();
    adapter.clone().inject(HttpRequest::new("GET", "/health")).await;
    assert_eq!(log.lock().unwrap().clone(), vec!["A"]);
}

#[tokio::test]
async fn test_middleware_runs_in_declaration_order() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));

    let module = ModuleDef::new("AppModule")
        .controller(controller("UsersController", "/users"))
        .configure({
            let log = log.clone();
            move |mw| {
                for name in ["first", "second", "third"] {
                    mw.apply(Tagger { name, log: log.clone() })
                        .for_routes([RouteMatcher::All]);
                }
            }
        });

    let adapter = Arc::new(TestAdapter::new());
    let _app = Application::create(module, adapter.clone()).await.unwrap();

    adapter.clone().inject(HttpRequest::new("GET", "/users")).await;
    assert_eq!(
        log.lock().unwrap().clone(),
        vec!["first", "second", "third"]
    );
}

#[tokio::test]
async fn test_controller_matcher_uses_declared_prefix() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));

    let module = ModuleDef::new("AppModule")
        .controller(controller("UsersController", "/users"))
        .controller(controller("AdminController", "/admin"))
        .configure({
            let log = log.clone();
            move |mw| {
                mw.apply(Tagger { name: "users-only", log: log.clone() })
                    .for_routes([RouteMatcher::controller("UsersController")]);
            }
        });

    let adapter = Arc::new(TestAdapter::new());
    let _app = Application::create(module, adapter.clone()).await.unwrap();

    adapter.clone().inject(HttpRequest::new("GET", "/users/1")).await;
    adapter.clone().inject(HttpRequest::new("GET", "/admin/1")).await;
    assert_eq!(log.lock().unwrap().clone(), vec!["users-only"]);
}

#[tokio::test]
async fn test_controller_matcher_without_prefix_matches_everything() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));

    let module = ModuleDef::new("AppModule")
        .controller(controller("RootController", ""))
        .controller(controller("UsersController", "/users"))
        .configure({
            let log = log.clone();
            move |mw| {
                mw.apply(Tagger { name: "everywhere", log: log.clone() })
                    .for_routes([RouteMatcher::controller("RootController")]);
            }
        });

    let adapter = Arc::new(TestAdapter::new());
    let _app = Application::create(module, adapter.clone()).await.unwrap();

    adapter.clone().inject(HttpRequest::new("GET", "/users/1")).await;
    assert_eq!(log.lock().unwrap().clone(), vec!["everywhere"]);
}

#[tokio::test]
async fn test_middleware_can_short_circuit() {
    let module = ModuleDef::new("AppModule")
        .controller(controller("UsersController", "/users"))
        .configure(|mw| {
            mw.apply(Blocker)
                .for_routes([RouteMatcher::path("/users/*")]);
        });

    let adapter = Arc::new(TestAdapter::new());
    let _app = Application::create(module, adapter.clone()).await.unwrap();

    let blocked = adapter.clone().inject(HttpRequest::new("GET", "/users/42")).await;
    assert_eq!(blocked.status, 403);

    // The bare prefix is outside the wildcard pattern.
    let allowed = adapter.clone().inject(HttpRequest::new("GET", "/users")).await;
    assert_eq!(allowed.status, 200);
}

#[tokio::test]
async fn test_factory_middleware_is_constructed_without_di() {
    let module = ModuleDef::new("AppModule")
        .controller(controller("UsersController", "/users"))
        .configure(|mw| {
            mw.apply_factory::<StampMiddleware>("StampMiddleware")
                .for_routes([RouteMatcher::All]);
        });

    let adapter = Arc::new(TestAdapter::new());
    let _app = Application::create(module, adapter.clone()).await.unwrap();

    let response = adapter.clone().inject(HttpRequest::new("GET", "/users")).await;
    assert_eq!(response.status, 200);
}

#[tokio::test]
async fn test_middleware_without_routes_is_never_registered() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));

    let module = ModuleDef::new("AppModule")
        .controller(controller("UsersController", "/users"))
        .configure({
            let log = log.clone();
            move |mw| {
                // apply without for_routes: matches nothing
                mw.apply(Tagger { name: "orphan", log: log.clone() });
            }
        });

    let adapter = Arc::new(TestAdapter::new());
    let _app = Application::create(module, adapter.clone()).await.unwrap();

    adapter.clone().inject(HttpRequest::new("GET", "/users")).await;
    assert!(log.lock().unwrap().is_empty());
}
