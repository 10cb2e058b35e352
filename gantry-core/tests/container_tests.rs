use gantry_core::annotations::{PROVIDER_DEPS, PROVIDER_SCOPE};
use gantry_core::{impl_provider, AnnotationStore, Container, Error, Provider, Scope};
use std::sync::Arc;

#[derive(Debug)]
struct Probe {
    name: String,
}
impl_provider!(Probe);

struct Linked;
impl_provider!(Linked);

fn new_container() -> Container {
    Container::new(Arc::new(AnnotationStore::new()))
}

fn register_probe(container: &Container, token: &str, scope: Scope, deps: &[&str]) {
    let store = container.annotations();
    store.set_annotation(PROVIDER_SCOPE, scope, token, None);
    store.set_annotation(
        PROVIDER_DEPS,
        deps.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
        token,
        None,
    );
    let name = token.to_string();
    container.register(
        token,
        Arc::new(move |_deps| Ok(Arc::new(Probe { name: name.clone() }) as Arc<dyn Provider>)),
    );
}

fn register_linked(container: &Container, token: &str, deps: &[&str]) {
    let store = container.annotations();
    store.set_annotation(
        PROVIDER_DEPS,
        deps.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
        token,
        None,
    );
    container.register(
        token,
        Arc::new(|_deps| Ok(Arc::new(Linked) as Arc<dyn Provider>)),
    );
}

#[test]
fn test_request_scope_isolation() {
    let container = new_container();
    register_probe(&container, "RequestProbe", Scope::Request, &[]);

    let ctx_a = container.create_context_id();
    let ctx_b = container.create_context_id();

    let a1 = container.get("RequestProbe", Some(&ctx_a)).unwrap();
    let a2 = container.get("RequestProbe", Some(&ctx_a)).unwrap();
    let b = container.get("RequestProbe", Some(&ctx_b)).unwrap();

    assert!(Arc::ptr_eq(&a1, &a2));
    assert!(!Arc::ptr_eq(&a1, &b));
}

#[test]
fn test_singleton_uniqueness() {
    let container = new_container();
    register_probe(&container, "SingletonProbe", Scope::Singleton, &[]);

    let first = container.get("SingletonProbe", None).unwrap();
    let second = container.get("SingletonProbe", None).unwrap();
    let third = container.get("SingletonProbe", Some("ctx-ignored")).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(&first, &third));
}

#[test]
fn test_transient_freshness() {
    let container = new_container();
    register_probe(&container, "TransientProbe", Scope::Transient, &[]);

    let first = container.get("TransientProbe", None).unwrap();
    let second = container.get("TransientProbe", None).unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
}

#[test]
fn test_unannotated_token_defaults_to_singleton() {
    let container = new_container();
    container.register(
        "Plain",
        Arc::new(|_| Ok(Arc::new(Probe { name: "plain".into() }) as Arc<dyn Provider>)),
    );

    let first = container.get("Plain", None).unwrap();
    let second = container.get("Plain", None).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn test_mutual_cycle_detected() {
    let container = new_container();
    register_linked(&container, "A", &["B"]);
    register_linked(&container, "B", &["A"]);

    let err = container.get("A", None).unwrap_err();
    match err {
        Error::CircularDependency { path } => {
            assert!(path.contains(&"A".to_string()));
            assert!(path.contains(&"B".to_string()));
        }
        other => panic!("expected CircularDependency, got {other:?}"),
    }
}

#[test]
fn test_self_cycle_detected() {
    let container = new_container();
    register_linked(&container, "Selfish", &["Selfish"]);

    let err = container.get("Selfish", None).unwrap_err();
    match err {
        Error::CircularDependency { path } => {
            assert_eq!(path, vec!["Selfish".to_string(), "Selfish".to_string()]);
        }
        other => panic!("expected CircularDependency, got {other:?}"),
    }
}

#[test]
fn test_diamond_dependency_is_not_a_cycle() {
    // A -> B -> D and A -> C -> D must resolve cleanly.
    let container = new_container();
    register_linked(&container, "A", &["B", "C"]);
    register_linked(&container, "B", &["D"]);
    register_linked(&container, "C", &["D"]);
    register_linked(&container, "D", &[]);

    assert!(container.get("A", None).is_ok());
    // Resolving again must not trip over previously recorded edges.
    assert!(container.get("A", None).is_ok());
}

#[test]
fn test_dependencies_resolved_in_declared_order() {
    let container = new_container();
    register_probe(&container, "First", Scope::Singleton, &[]);
    register_probe(&container, "Second", Scope::Singleton, &[]);

    let store = container.annotations();
    store.set_annotation(
        PROVIDER_DEPS,
        vec!["First".to_string(), "Second".to_string()],
        "Consumer",
        None,
    );
    container.register(
        "Consumer",
        Arc::new(|deps| {
            assert_eq!(deps.len(), 2);
            let first = deps[0].clone().into_any().downcast::<Probe>().unwrap();
            let second = deps[1].clone().into_any().downcast::<Probe>().unwrap();
            assert_eq!(first.name, "First");
            assert_eq!(second.name, "Second");
            Ok(Arc::new(Linked) as Arc<dyn Provider>)
        }),
    );

    container.get("Consumer", None).unwrap();
}

#[test]
fn test_unknown_provider() {
    let container = new_container();
    let err = container.get("Ghost", None).unwrap_err();
    assert!(matches!(err, Error::UnknownProvider(token) if token == "Ghost"));
}

#[test]
fn test_request_scope_without_context_fails() {
    let container = new_container();
    register_probe(&container, "RequestProbe", Scope::Request, &[]);

    let err = container.get("RequestProbe", None).unwrap_err();
    assert!(matches!(err, Error::MissingContext(token) if token == "RequestProbe"));
}

#[test]
fn test_create_bypasses_scope_cache() {
    let container = new_container();
    register_probe(&container, "SingletonProbe", Scope::Singleton, &[]);

    let cached = container.get("SingletonProbe", None).unwrap();
    let fresh = container.create("SingletonProbe").unwrap();
    assert!(!Arc::ptr_eq(&cached, &fresh));

    // The cache itself is untouched.
    let cached_again = container.get("SingletonProbe", None).unwrap();
    assert!(Arc::ptr_eq(&cached, &cached_again));
}

#[test]
fn test_clear_request_scoped_instances() {
    let container = new_container();
    register_probe(&container, "RequestProbe", Scope::Request, &[]);

    let ctx = container.create_context_id();
    let before = container.get("RequestProbe", Some(&ctx)).unwrap();
    container.clear_request_scoped_instances(&ctx);
    let after = container.get("RequestProbe", Some(&ctx)).unwrap();

    assert!(!Arc::ptr_eq(&before, &after));
}

#[test]
fn test_reregistration_overwrites_silently() {
    let container = new_container();
    container.register(
        "Swapped",
        Arc::new(|_| Ok(Arc::new(Probe { name: "old".into() }) as Arc<dyn Provider>)),
    );
    container.register(
        "Swapped",
        Arc::new(|_| Ok(Arc::new(Probe { name: "new".into() }) as Arc<dyn Provider>)),
    );

    let instance = container.get_as::<Probe>("Swapped", None).unwrap();
    assert_eq!(instance.name, "new");
}

#[test]
fn test_get_as_downcast_mismatch() {
    let container = new_container();
    register_linked(&container, "NotAProbe", &[]);

    let err = container.get_as::<Probe>("NotAProbe", None).unwrap_err();
    assert!(matches!(err, Error::DependencyInjection(_)));
}

#[test]
fn test_context_ids_are_unique() {
    let container = new_container();
    let first = container.create_context_id();
    let second = container.create_context_id();
    assert_ne!(first, second);
}

#[test]
fn test_request_scoped_dependency_shares_context() {
    // A request-scoped service injected into a request-scoped controller
    // resolves to the same instance the container hands out directly.
    let container = new_container();
    register_probe(&container, "Session", Scope::Request, &[]);

    let store = container.annotations();
    store.set_annotation(PROVIDER_SCOPE, Scope::Request, "Holder", None);
    store.set_annotation(PROVIDER_DEPS, vec!["Session".to_string()], "Holder", None);

    struct Holder {
        session: Arc<Probe>,
    }
    impl_provider!(Holder);

    container.register(
        "Holder",
        Arc::new(|deps| {
            let session = deps[0].clone().into_any().downcast::<Probe>().unwrap();
            Ok(Arc::new(Holder { session }) as Arc<dyn Provider>)
        }),
    );

    let ctx = container.create_context_id();
    let holder = container.get_as::<Holder>("Holder", Some(&ctx)).unwrap();
    let session = container.get_as::<Probe>("Session", Some(&ctx)).unwrap();
    assert!(Arc::ptr_eq(&holder.session, &session));
}

#[tokio::test]
async fn test_resolve_is_async_get() {
    let container = new_container();
    register_probe(&container, "SingletonProbe", Scope::Singleton, &[]);

    let via_get = container.get("SingletonProbe", None).unwrap();
    let via_resolve = container.resolve("SingletonProbe", None).await.unwrap();
    assert!(Arc::ptr_eq(&via_get, &via_resolve));
}
