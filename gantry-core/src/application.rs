// Application assembler: wires the module tree into the container and the
// route table, then serves

use crate::adapter::{HttpAdapter, Router};
use crate::annotations::{AnnotationStore, PROVIDER_DEPS, PROVIDER_SCOPE};
use crate::container::Container;
use crate::lifecycle::RequestLifecycle;
use crate::middleware::MiddlewareBuilder;
use crate::module::{ConfigureFn, ControllerDef, ModuleDef, ProviderDef};
use crate::params::{CoercionPolicy, ParamResolver};
use crate::routes::{RouteCompiler, RouteTable};
use crate::{Error, Scope};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Assembly-time options
#[derive(Debug, Clone, Copy, Default)]
pub struct ApplicationOptions {
    /// What a failed numeric parameter coercion produces
    pub coercion_policy: CoercionPolicy,
}

/// The assembled application: container, compiled routes, middleware plan
/// and the transport adapter serving them.
pub struct Application {
    container: Container,
    annotations: Arc<AnnotationStore>,
    adapter: Arc<dyn HttpAdapter>,
    provider_tokens: Vec<String>,
    router: Arc<Router>,
}

impl Application {
    /// Assemble an application from a root module with default options.
    pub async fn create<A: HttpAdapter>(root: ModuleDef, adapter: Arc<A>) -> Result<Self, Error> {
        Self::create_with(root, adapter, ApplicationOptions::default()).await
    }

    /// Assemble an application from a root module.
    pub async fn create_with<A: HttpAdapter>(
        root: ModuleDef,
        adapter: Arc<A>,
        options: ApplicationOptions,
    ) -> Result<Self, Error> {
        info!(module = %root.name, "assembling application");

        let annotations = Arc::new(AnnotationStore::new());
        let container = Container::new(annotations.clone());
        let adapter: Arc<dyn HttpAdapter> = adapter;

        let mut providers = Vec::new();
        let mut controllers = Vec::new();
        let mut configures = Vec::new();
        collect_modules(&root, &mut providers, &mut controllers, &mut configures);

        // First occurrence fixes hook order; the definition itself follows
        // the container's last-write-wins rule.
        let provider_tokens = register_providers(&container, &annotations, providers);
        let controller_tokens = register_controllers(&container, &annotations, controllers);

        let table = RouteCompiler::compile(&annotations, &controller_tokens);
        info!(
            routes = table.len(),
            providers = provider_tokens.len(),
            controllers = controller_tokens.len(),
            "application registered"
        );

        let lifecycle = RequestLifecycle::new(container.clone(), provider_tokens.clone());
        let resolver = ParamResolver::new(options.coercion_policy);
        let router = adapter.create_router(table, lifecycle, resolver);
        adapter.apply_router(router.clone());

        let mut middleware = MiddlewareBuilder::new();
        for configure in &configures {
            configure(&mut middleware);
        }
        middleware.build(&annotations, adapter.as_ref());

        let app = Self {
            container,
            annotations,
            adapter,
            provider_tokens,
            router,
        };

        app.run_init_hooks().await?;
        app.run_bootstrap_hooks().await?;

        info!("application assembly complete");
        Ok(app)
    }

    /// The dependency container, for imperative resolution.
    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn annotations(&self) -> &Arc<AnnotationStore> {
        &self.annotations
    }

    /// The compiled dispatch table.
    pub fn routes(&self) -> &RouteTable {
        self.router.table()
    }

    /// Serve until the process stops.
    pub async fn listen(&self, port: u16) -> Result<(), Error> {
        self.adapter.clone().listen(port).await
    }

    /// Serve until a ctrl-c signal arrives, then run the shutdown sequence.
    pub async fn listen_with_shutdown(&self, port: u16) -> Result<(), Error> {
        tokio::select! {
            result = self.adapter.clone().listen(port) => result,
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("shutdown signal received");
                self.shutdown(Some("SIGINT".to_string())).await;
                Ok(())
            }
        }
    }

    async fn run_init_hooks(&self) -> Result<(), Error> {
        for token in &self.lifecycle_tokens() {
            let instance = self.container.get(token, None)?;
            if let Some(hook) = instance.as_module_init() {
                debug!(provider = %token, "running module init hook");
                hook.on_module_init().await?;
            }
        }
        Ok(())
    }

    async fn run_bootstrap_hooks(&self) -> Result<(), Error> {
        for token in &self.lifecycle_tokens() {
            let instance = self.container.get(token, None)?;
            if let Some(hook) = instance.as_application_bootstrap() {
                debug!(provider = %token, "running bootstrap hook");
                hook.on_application_bootstrap().await?;
            }
        }
        Ok(())
    }

    /// Run the shutdown sequence: every provider's before-shutdown hook,
    /// then every destroy hook, sequentially in registration order. Hook
    /// failures are logged and do not stop the sequence.
    pub async fn shutdown(&self, signal: Option<String>) {
        info!(signal = ?signal, "shutting down");
        let tokens = self.lifecycle_tokens();

        for token in &tokens {
            match self.container.get(token, None) {
                Ok(instance) => {
                    if let Some(hook) = instance.as_before_shutdown() {
                        if let Err(err) = hook.before_application_shutdown(signal.clone()).await {
                            error!(provider = %token, error = %err, "before-shutdown hook failed");
                        }
                    }
                }
                Err(err) => error!(provider = %token, error = %err, "shutdown resolution failed"),
            }
        }

        for token in &tokens {
            match self.container.get(token, None) {
                Ok(instance) => {
                    if let Some(hook) = instance.as_module_destroy() {
                        if let Err(err) = hook.on_module_destroy().await {
                            error!(provider = %token, error = %err, "destroy hook failed");
                        }
                    }
                }
                Err(err) => error!(provider = %token, error = %err, "shutdown resolution failed"),
            }
        }

        info!("shutdown complete");
    }

    /// Providers eligible for application lifecycle hooks: those with a
    /// process-lifetime instance to call them on.
    fn lifecycle_tokens(&self) -> Vec<String> {
        self.provider_tokens
            .iter()
            .filter(|token| {
                matches!(
                    self.container.scope_of(token),
                    Scope::Default | Scope::Singleton
                )
            })
            .cloned()
            .collect()
    }
}

fn collect_modules(
    module: &ModuleDef,
    providers: &mut Vec<ProviderDef>,
    controllers: &mut Vec<ControllerDef>,
    configures: &mut Vec<ConfigureFn>,
) {
    debug!(module = %module.name, global = module.global, "collecting module");
    providers.extend(module.providers.iter().cloned());
    controllers.extend(module.controllers.iter().cloned());
    if let Some(configure) = &module.configure {
        configures.push(configure.clone());
    }
    for import in &module.imports {
        collect_modules(import, providers, controllers, configures);
    }
}

fn register_providers(
    container: &Container,
    annotations: &AnnotationStore,
    defs: Vec<ProviderDef>,
) -> Vec<String> {
    let mut order = Vec::new();
    let mut seen = HashSet::new();

    for def in defs {
        if seen.insert(def.token.clone()) {
            order.push(def.token.clone());
        } else {
            warn!(provider = %def.token, "provider token re-registered, last definition wins");
        }
        annotations.set_annotation(PROVIDER_SCOPE, def.scope, &def.token, None);
        annotations.set_annotation(PROVIDER_DEPS, def.deps.clone(), &def.token, None);
        container.register(&def.token, def.factory.clone());
    }

    order
}

fn register_controllers(
    container: &Container,
    annotations: &AnnotationStore,
    defs: Vec<ControllerDef>,
) -> Vec<String> {
    let mut order = Vec::new();

    for def in defs {
        if !order.contains(&def.token) {
            order.push(def.token.clone());
        } else {
            warn!(controller = %def.token, "controller token re-registered, last definition wins");
        }
        def.meta.write_annotations(annotations);
        annotations.set_annotation(PROVIDER_SCOPE, def.scope, &def.token, None);
        annotations.set_annotation(PROVIDER_DEPS, def.deps.clone(), &def.token, None);
        container.register(&def.token, def.factory.clone());
    }

    order
}
