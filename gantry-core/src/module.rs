// Module definitions: the explicit configuration-loading stage that wires
// providers, controllers and middleware into an application

use crate::container::ProviderFactory;
use crate::lifecycle::Provider;
use crate::middleware::MiddlewareBuilder;
use crate::routes::{ControllerBuilder, ControllerMeta};
use crate::{Error, Scope};
use std::sync::Arc;

/// Closure a module uses to declare its middleware plan
pub type ConfigureFn = Arc<dyn Fn(&mut MiddlewareBuilder) + Send + Sync>;

/// Downcast one resolved dependency out of a factory's argument vector.
pub fn dep<T: Provider>(deps: &[Arc<dyn Provider>], index: usize) -> Result<Arc<T>, Error> {
    deps.get(index)
        .cloned()
        .ok_or_else(|| {
            Error::DependencyInjection(format!("missing dependency at position {}", index))
        })?
        .into_any()
        .downcast::<T>()
        .map_err(|_| {
            Error::DependencyInjection(format!(
                "dependency at position {} is not a {}",
                index,
                std::any::type_name::<T>()
            ))
        })
}

/// Declaration of one injectable provider: token, scope, ordered
/// constructor dependencies and the factory that builds it.
#[derive(Clone)]
pub struct ProviderDef {
    pub token: String,
    pub scope: Scope,
    pub deps: Vec<String>,
    pub(crate) factory: ProviderFactory,
}

impl ProviderDef {
    pub fn new<T, F>(token: impl Into<String>, factory: F) -> Self
    where
        T: Provider,
        F: Fn(Vec<Arc<dyn Provider>>) -> Result<T, Error> + Send + Sync + 'static,
    {
        Self {
            token: token.into(),
            scope: Scope::Singleton,
            deps: Vec::new(),
            factory: Arc::new(move |deps| {
                factory(deps).map(|instance| Arc::new(instance) as Arc<dyn Provider>)
            }),
        }
    }

    /// Register an already-constructed instance; every resolution shares it.
    pub fn from_instance<T: Provider>(token: impl Into<String>, instance: T) -> Self {
        let shared = Arc::new(instance);
        Self {
            token: token.into(),
            scope: Scope::Singleton,
            deps: Vec::new(),
            factory: Arc::new(move |_| Ok(shared.clone() as Arc<dyn Provider>)),
        }
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Declare constructor dependencies, in the order the factory expects
    /// them.
    pub fn depends_on<S: Into<String>>(mut self, deps: impl IntoIterator<Item = S>) -> Self {
        self.deps = deps.into_iter().map(Into::into).collect();
        self
    }
}

impl std::fmt::Debug for ProviderDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderDef")
            .field("token", &self.token)
            .field("scope", &self.scope)
            .field("deps", &self.deps)
            .finish()
    }
}

/// Declaration of one controller: its route metadata plus the factory that
/// builds it. Controllers resolve at request scope unless overridden, so
/// every request gets a freshly scoped instance.
#[derive(Clone)]
pub struct ControllerDef {
    pub token: String,
    pub scope: Scope,
    pub deps: Vec<String>,
    pub(crate) factory: ProviderFactory,
    pub(crate) meta: Arc<ControllerMeta>,
}

impl ControllerDef {
    pub fn new<C, F>(builder: ControllerBuilder<C>, factory: F) -> Self
    where
        C: Provider,
        F: Fn(Vec<Arc<dyn Provider>>) -> Result<C, Error> + Send + Sync + 'static,
    {
        let meta = builder.into_meta();
        Self {
            token: meta.token.clone(),
            scope: Scope::Request,
            deps: Vec::new(),
            factory: Arc::new(move |deps| {
                factory(deps).map(|instance| Arc::new(instance) as Arc<dyn Provider>)
            }),
            meta: Arc::new(meta),
        }
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn depends_on<S: Into<String>>(mut self, deps: impl IntoIterator<Item = S>) -> Self {
        self.deps = deps.into_iter().map(Into::into).collect();
        self
    }
}

impl std::fmt::Debug for ControllerDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerDef")
            .field("token", &self.token)
            .field("scope", &self.scope)
            .field("deps", &self.deps)
            .finish()
    }
}

/// A composable unit of providers, controllers, imported modules and an
/// optional middleware configuration.
#[derive(Clone, Default)]
pub struct ModuleDef {
    pub name: String,
    pub global: bool,
    pub(crate) providers: Vec<ProviderDef>,
    pub(crate) controllers: Vec<ControllerDef>,
    pub(crate) imports: Vec<ModuleDef>,
    pub(crate) configure: Option<ConfigureFn>,
}

impl ModuleDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn provider(mut self, def: ProviderDef) -> Self {
        self.providers.push(def);
        self
    }

    pub fn controller(mut self, def: ControllerDef) -> Self {
        self.controllers.push(def);
        self
    }

    pub fn import(mut self, module: ModuleDef) -> Self {
        self.imports.push(module);
        self
    }

    /// Mark this module's providers as available everywhere, regardless of
    /// where the module sits in the import tree.
    pub fn global(mut self) -> Self {
        self.global = true;
        self
    }

    /// Declare the module's middleware plan.
    pub fn configure<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut MiddlewareBuilder) + Send + Sync + 'static,
    {
        self.configure = Some(Arc::new(f));
        self
    }
}

impl std::fmt::Debug for ModuleDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleDef")
            .field("name", &self.name)
            .field("global", &self.global)
            .field("providers", &self.providers.len())
            .field("controllers", &self.controllers.len())
            .field("imports", &self.imports.len())
            .finish()
    }
}
