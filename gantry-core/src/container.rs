// Dependency injection container with scoped instance caches and cycle
// detection

use crate::annotations::{AnnotationStore, PROVIDER_DEPS, PROVIDER_SCOPE};
use crate::lifecycle::Provider;
use crate::{Error, Scope};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use tracing::{debug, trace};
use uuid::Uuid;

/// Factory invoked with the provider's resolved dependencies, in the order
/// they were declared.
pub type ProviderFactory =
    Arc<dyn Fn(Vec<Arc<dyn Provider>>) -> Result<Arc<dyn Provider>, Error> + Send + Sync>;

/// The dependency injection container.
///
/// Providers are registered under string tokens; scope and constructor
/// dependency tokens are read from the annotation store at resolution time.
/// Instance lifetimes follow the token's declared [`Scope`]: one shared
/// instance per process, one per request context id, or a fresh instance on
/// every resolution.
#[derive(Clone)]
pub struct Container {
    annotations: Arc<AnnotationStore>,
    factories: Arc<RwLock<HashMap<String, ProviderFactory>>>,
    singletons: Arc<RwLock<HashMap<String, Arc<dyn Provider>>>>,
    request_scoped: Arc<RwLock<HashMap<String, HashMap<String, Arc<dyn Provider>>>>>,
    dependency_graph: Arc<RwLock<HashMap<String, HashSet<String>>>>,
}

impl Container {
    pub fn new(annotations: Arc<AnnotationStore>) -> Self {
        debug!("creating DI container");
        Self {
            annotations,
            factories: Arc::new(RwLock::new(HashMap::new())),
            singletons: Arc::new(RwLock::new(HashMap::new())),
            request_scoped: Arc::new(RwLock::new(HashMap::new())),
            dependency_graph: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn annotations(&self) -> &Arc<AnnotationStore> {
        &self.annotations
    }

    /// Register a factory under a token. Re-registration overwrites
    /// silently; callers must register before first resolution.
    pub fn register(&self, token: &str, factory: ProviderFactory) {
        let mut factories = self.factories.write().unwrap();
        factories.insert(token.to_string(), factory);
        debug!(provider = token, "provider registered");
    }

    /// Check if a token has a registration
    pub fn has(&self, token: &str) -> bool {
        self.factories.read().unwrap().contains_key(token)
    }

    /// Resolve an instance per the token's declared scope.
    pub fn get(&self, token: &str, context_id: Option<&str>) -> Result<Arc<dyn Provider>, Error> {
        trace!(provider = token, "resolving provider");
        if !self.has(token) {
            return Err(Error::UnknownProvider(token.to_string()));
        }

        match self.scope_of(token) {
            Scope::Default | Scope::Singleton => self.get_singleton(token, context_id),
            Scope::Request => {
                let context_id = context_id
                    .ok_or_else(|| Error::MissingContext(token.to_string()))?;
                self.get_request_scoped(token, context_id)
            }
            Scope::Transient => self.create_instance(token, context_id),
        }
    }

    /// Resolve and downcast to a concrete provider type.
    pub fn get_as<T: Provider>(
        &self,
        token: &str,
        context_id: Option<&str>,
    ) -> Result<Arc<T>, Error> {
        self.get(token, context_id)?
            .into_any()
            .downcast::<T>()
            .map_err(|_| {
                Error::DependencyInjection(format!(
                    "provider {} is not a {}",
                    token,
                    std::any::type_name::<T>()
                ))
            })
    }

    /// Construct a fresh instance, bypassing all scope caches.
    pub fn create(&self, token: &str) -> Result<Arc<dyn Provider>, Error> {
        if !self.has(token) {
            return Err(Error::UnknownProvider(token.to_string()));
        }
        self.create_instance(token, None)
    }

    /// Async wrapper over [`Container::get`] for callers in asynchronous
    /// contexts.
    pub async fn resolve(
        &self,
        token: &str,
        context_id: Option<&str>,
    ) -> Result<Arc<dyn Provider>, Error> {
        self.get(token, context_id)
    }

    /// Mint a process-unique request context id.
    pub fn create_context_id(&self) -> String {
        Uuid::new_v4().to_string()
    }

    /// Discard every request-scoped instance cached under a context id.
    pub fn clear_request_scoped_instances(&self, context_id: &str) {
        let mut request_scoped = self.request_scoped.write().unwrap();
        if request_scoped.remove(context_id).is_some() {
            trace!(context_id, "request-scoped instances cleared");
        }
    }

    /// Declared scope for a token; unannotated tokens are singletons.
    pub fn scope_of(&self, token: &str) -> Scope {
        self.annotations
            .get_annotation::<Scope>(PROVIDER_SCOPE, token, None)
            .map(|scope| *scope)
            .unwrap_or_default()
    }

    fn get_singleton(
        &self,
        token: &str,
        context_id: Option<&str>,
    ) -> Result<Arc<dyn Provider>, Error> {
        if let Some(instance) = self.singletons.read().unwrap().get(token) {
            return Ok(instance.clone());
        }

        // Construct outside the lock: construction recurses into the
        // container. Concurrent first resolutions may both construct; the
        // first insert wins and every caller observes the cached instance
        // afterwards.
        let instance = self.create_instance(token, context_id)?;
        let mut singletons = self.singletons.write().unwrap();
        Ok(singletons
            .entry(token.to_string())
            .or_insert(instance)
            .clone())
    }

    fn get_request_scoped(
        &self,
        token: &str,
        context_id: &str,
    ) -> Result<Arc<dyn Provider>, Error> {
        {
            let request_scoped = self.request_scoped.read().unwrap();
            if let Some(instance) = request_scoped
                .get(context_id)
                .and_then(|cache| cache.get(token))
            {
                return Ok(instance.clone());
            }
        }

        let instance = self.create_instance(token, Some(context_id))?;
        let mut request_scoped = self.request_scoped.write().unwrap();
        Ok(request_scoped
            .entry(context_id.to_string())
            .or_default()
            .entry(token.to_string())
            .or_insert(instance)
            .clone())
    }

    /// Construct an instance: resolve each declared dependency (cycle-checked,
    /// scope-aware, under the ambient context id) and invoke the factory with
    /// the results in declared order.
    fn create_instance(
        &self,
        token: &str,
        context_id: Option<&str>,
    ) -> Result<Arc<dyn Provider>, Error> {
        let factory = self
            .factories
            .read()
            .unwrap()
            .get(token)
            .cloned()
            .ok_or_else(|| Error::UnknownProvider(token.to_string()))?;

        let deps = self
            .annotations
            .get_annotation::<Vec<String>>(PROVIDER_DEPS, token, None)
            .map(|deps| (*deps).clone())
            .unwrap_or_default();

        let mut resolved = Vec::with_capacity(deps.len());
        for dep in &deps {
            self.check_circular_dependency(token, dep)?;
            resolved.push(self.get(dep, context_id)?);
        }

        trace!(provider = token, deps = deps.len(), "constructing instance");
        factory(resolved)
    }

    /// Record the `current -> dependency` edge and fail if the dependency
    /// graph now reaches back to `current`.
    fn check_circular_dependency(&self, current: &str, dependency: &str) -> Result<(), Error> {
        if current == dependency {
            return Err(Error::CircularDependency {
                path: vec![current.to_string(), dependency.to_string()],
            });
        }

        {
            let mut graph = self.dependency_graph.write().unwrap();
            graph
                .entry(current.to_string())
                .or_default()
                .insert(dependency.to_string());
        }

        let graph = self.dependency_graph.read().unwrap();
        // Fresh visited set per call so repeated diamond dependencies are
        // not reported as cycles.
        let mut visited = HashSet::new();
        let mut path = vec![current.to_string()];
        if Self::detect_cycle(&graph, dependency, &mut visited, &mut path) {
            return Err(Error::CircularDependency { path });
        }
        Ok(())
    }

    fn detect_cycle(
        graph: &HashMap<String, HashSet<String>>,
        node: &str,
        visited: &mut HashSet<String>,
        path: &mut Vec<String>,
    ) -> bool {
        if visited.contains(node) {
            return false;
        }
        if path.iter().any(|seen| seen == node) {
            path.push(node.to_string());
            return true;
        }

        visited.insert(node.to_string());
        path.push(node.to_string());

        if let Some(deps) = graph.get(node) {
            for dep in deps {
                let mut branch = path.clone();
                if Self::detect_cycle(graph, dep, visited, &mut branch) {
                    *path = branch;
                    return true;
                }
            }
        }

        path.pop();
        false
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("providers", &self.factories.read().unwrap().len())
            .field("singletons", &self.singletons.read().unwrap().len())
            .field(
                "request_contexts",
                &self.request_scoped.read().unwrap().len(),
            )
            .finish()
    }
}

/// Evicts one context's request-scoped cache when dropped.
///
/// The request runner holds one of these for the life of a request so the
/// cache is cleared exactly once on every exit path, panics included.
pub struct ContextGuard {
    container: Container,
    context_id: String,
}

impl ContextGuard {
    pub fn new(container: Container, context_id: String) -> Self {
        Self {
            container,
            context_id,
        }
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        self.container
            .clear_request_scoped_instances(&self.context_id);
    }
}
