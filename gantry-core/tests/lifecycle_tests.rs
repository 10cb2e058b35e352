use async_trait::async_trait;
use gantry_core::{
    impl_provider, Application, ControllerBuilder, ControllerDef, Error, HttpException,
    HttpRequest, ModuleDef, ProviderDef, RequestContext, Scope, TestAdapter,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

type Log = Arc<Mutex<Vec<String>>>;

fn record(log: &Log, entry: impl Into<String>) {
    log.lock().unwrap().push(entry.into());
}

struct Recorder {
    name: &'static str,
    log: Log,
}
impl_provider!(Recorder: before_request, after_request);

#[async_trait]
impl gantry_core::BeforeRequest for Recorder {
    async fn before_request(&self, _ctx: &mut RequestContext) -> Result<(), Error> {
        record(&self.log, format!("{}.before", self.name));
        Ok(())
    }
}

#[async_trait]
impl gantry_core::AfterRequest for Recorder {
    async fn after_request(&self, _ctx: &mut RequestContext, result: Value) -> Result<Value, Error> {
        record(&self.log, format!("{}.after", self.name));
        let current = result.as_str().unwrap_or_default().to_string();
        Ok(json!(format!("{}+{}", current, self.name)))
    }
}

struct SilentErrorHook {
    log: Log,
}
impl_provider!(SilentErrorHook: on_request_error);

#[async_trait]
impl gantry_core::OnRequestError for SilentErrorHook {
    async fn on_request_error(
        &self,
        _ctx: &mut RequestContext,
        _error: &HttpException,
    ) -> Result<Option<Value>, Error> {
        record(&self.log, "E1.error");
        Ok(None)
    }
}

struct TeapotErrorHook {
    log: Log,
}
impl_provider!(TeapotErrorHook: on_request_error);

#[async_trait]
impl gantry_core::OnRequestError for TeapotErrorHook {
    async fn on_request_error(
        &self,
        _ctx: &mut RequestContext,
        _error: &HttpException,
    ) -> Result<Option<Value>, Error> {
        record(&self.log, "E2.error");
        Ok(Some(json!({"status": 418})))
    }
}

struct FaultyErrorHook {
    log: Log,
}
impl_provider!(FaultyErrorHook: on_request_error);

#[async_trait]
impl gantry_core::OnRequestError for FaultyErrorHook {
    async fn on_request_error(
        &self,
        _ctx: &mut RequestContext,
        _error: &HttpException,
    ) -> Result<Option<Value>, Error> {
        record(&self.log, "E0.error");
        Err(Error::Internal("error hook exploded".into()))
    }
}

struct CompletionCounter {
    count: Arc<AtomicUsize>,
}
impl_provider!(CompletionCounter: on_request_complete);

#[async_trait]
impl gantry_core::OnRequestComplete for CompletionCounter {
    async fn on_request_complete(&self, _ctx: &mut RequestContext) -> Result<(), Error> {
        self.count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct Gatekeeper;
impl_provider!(Gatekeeper: before_request);

#[async_trait]
impl gantry_core::BeforeRequest for Gatekeeper {
    async fn before_request(&self, ctx: &mut RequestContext) -> Result<(), Error> {
        if ctx.request.query("token").is_none() {
            return Err(HttpException::unauthorized("missing token").into());
        }
        Ok(())
    }
}

struct EchoController {
    log: Option<Log>,
}
impl_provider!(EchoController);

fn echo_controller(log: Option<Log>, fail: bool) -> ControllerDef {
    let builder = ControllerBuilder::<EchoController>::new("EchoController", "/echo")
        .get("/", "echo")
        .handler(move |ctrl: Arc<EchoController>, _args| {
            async move {
                if let Some(log) = &ctrl.log {
                    record(log, "handler");
                }
                if fail {
                    Err(Error::Internal("boom".into()))
                } else {
                    Ok(json!("X"))
                }
            }
        });
    ControllerDef::new(builder, move |_deps| Ok(EchoController { log: log.clone() }))
}

async fn run_once(module: ModuleDef, path: &str) -> gantry_core::HttpResponse {
    let adapter = Arc::new(TestAdapter::new());
    let app = Application::create(module, adapter.clone()).await.unwrap();
    let response = adapter.clone().inject(HttpRequest::new("GET", path)).await;
    drop(app);
    response
}

#[tokio::test]
async fn test_hook_ordering_on_success() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));

    let module = ModuleDef::new("AppModule")
        .provider(ProviderDef::from_instance(
            "L1",
            Recorder { name: "L1", log: log.clone() },
        ))
        .provider(ProviderDef::from_instance(
            "L2",
            Recorder { name: "L2", log: log.clone() },
        ))
        .controller(echo_controller(Some(log.clone()), false));

    let response = run_once(module, "/echo").await;
    assert_eq!(response.status, 200);

    // Each after-hook feeds the next; the final transform is the body.
    let body: String = response.json().unwrap();
    assert_eq!(body, "X+L1+L2");

    let entries = log.lock().unwrap().clone();
    assert_eq!(
        entries,
        vec!["L1.before", "L2.before", "handler", "L1.after", "L2.after"]
    );
}

#[tokio::test]
async fn test_error_hook_short_circuit() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));

    let module = ModuleDef::new("AppModule")
        .provider(ProviderDef::from_instance("E1", SilentErrorHook { log: log.clone() }))
        .provider(ProviderDef::from_instance("E2", TeapotErrorHook { log: log.clone() }))
        .controller(echo_controller(None, true));

    let response = run_once(module, "/echo").await;
    assert_eq!(response.status, 418);

    let body: Value = response.json().unwrap();
    assert_eq!(body, json!({"status": 418}));

    let entries = log.lock().unwrap().clone();
    assert_eq!(entries, vec!["E1.error", "E2.error"]);
}

#[tokio::test]
async fn test_failing_error_hook_is_skipped() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));

    let module = ModuleDef::new("AppModule")
        .provider(ProviderDef::from_instance("E0", FaultyErrorHook { log: log.clone() }))
        .provider(ProviderDef::from_instance("E2", TeapotErrorHook { log: log.clone() }))
        .controller(echo_controller(None, true));

    let response = run_once(module, "/echo").await;
    assert_eq!(response.status, 418);

    let entries = log.lock().unwrap().clone();
    assert_eq!(entries, vec!["E0.error", "E2.error"]);
}

#[tokio::test]
async fn test_default_error_body_when_no_hook_answers() {
    let module = ModuleDef::new("AppModule").controller(echo_controller(None, true));

    let response = run_once(module, "/echo").await;
    assert_eq!(response.status, 500);

    let body: Value = response.json().unwrap();
    assert_eq!(body["status"], 500);
    assert_eq!(body["code"], "HttpException");
    assert!(body["message"].as_str().unwrap().contains("boom"));
}

#[tokio::test]
async fn test_complete_runs_on_success_and_failure() {
    let count = Arc::new(AtomicUsize::new(0));

    let ok_module = ModuleDef::new("AppModule")
        .provider(ProviderDef::from_instance(
            "Counter",
            CompletionCounter { count: count.clone() },
        ))
        .controller(echo_controller(None, false));
    let response = run_once(ok_module, "/echo").await;
    assert_eq!(response.status, 200);
    assert_eq!(count.load(Ordering::SeqCst), 1);

    let failing_module = ModuleDef::new("AppModule")
        .provider(ProviderDef::from_instance(
            "Counter",
            CompletionCounter { count: count.clone() },
        ))
        .controller(echo_controller(None, true));
    let response = run_once(failing_module, "/echo").await;
    assert_eq!(response.status, 500);
    assert_eq!(count.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_before_hook_failure_enters_error_path() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));

    let module = ModuleDef::new("AppModule")
        .provider(ProviderDef::from_instance("Gate", Gatekeeper))
        .controller(echo_controller(Some(log.clone()), false));

    let adapter = Arc::new(TestAdapter::new());
    let _app = Application::create(module, adapter.clone()).await.unwrap();

    let denied = adapter.clone().inject(HttpRequest::new("GET", "/echo")).await;
    assert_eq!(denied.status, 401);
    assert!(log.lock().unwrap().is_empty(), "handler must not run");

    let allowed = adapter
        .clone()
        .inject(HttpRequest::new("GET", "/echo?token=secret"))
        .await;
    assert_eq!(allowed.status, 200);
    assert_eq!(log.lock().unwrap().clone(), vec!["handler"]);
}

#[tokio::test]
async fn test_request_scoped_controller_is_fresh_per_request() {
    static BUILT: AtomicUsize = AtomicUsize::new(0);

    struct CountingController;
    impl_provider!(CountingController);

    let builder = ControllerBuilder::<CountingController>::new("CountingController", "/count")
        .get("/", "count")
        .handler(|_ctrl, _args| async { Ok(json!(null)) });
    let controller = ControllerDef::new(builder, |_deps| {
        BUILT.fetch_add(1, Ordering::SeqCst);
        Ok(CountingController)
    });
    assert_eq!(controller.scope, Scope::Request);

    let module = ModuleDef::new("AppModule").controller(controller);
    let adapter = Arc::new(TestAdapter::new());
    let _app = Application::create(module, adapter.clone()).await.unwrap();

    adapter.clone().inject(HttpRequest::new("GET", "/count")).await;
    adapter.clone().inject(HttpRequest::new("GET", "/count")).await;

    // One construction per request: the per-request cache is evicted when
    // each request exits.
    assert_eq!(BUILT.load(Ordering::SeqCst), 2);
}
