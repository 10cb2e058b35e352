// Annotation store: metadata recorded at assembly time, read by the
// container and the route compiler

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Scope declared for a provider token. Value type: [`crate::Scope`].
pub const PROVIDER_SCOPE: &str = "provider:scope";

/// Ordered constructor dependency tokens for a provider. Value type:
/// `Vec<String>`.
pub const PROVIDER_DEPS: &str = "provider:deps";

/// Path prefix declared on a controller. Value type: `String`.
pub const CONTROLLER_PREFIX: &str = "controller:prefix";

/// Route declarations recorded on a controller. Value type:
/// `Vec<crate::routes::RouteSpec>`.
pub const CONTROLLER_ROUTES: &str = "controller:routes";

/// Parameter bindings for one handler, keyed by handler name as the member.
/// Value type: `Vec<crate::params::ParamBinding>`.
pub const ROUTE_PARAMS: &str = "route:params";

/// Boxed handler invoker for one handler, keyed by handler name as the
/// member. Value type: [`crate::routes::HandlerInvoker`].
pub const ROUTE_HANDLER: &str = "route:handler";

/// State-bag key under which the request context id is exposed.
pub const REQUEST_CONTEXT_ID: &str = "request:context-id";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct AnnotationKey {
    key: String,
    target: String,
    member: Option<String>,
}

/// Opaque metadata store keyed by `(key, target, optional member)`.
///
/// Builders write annotations during assembly; the container and the route
/// compiler read them afterwards. Retrieval is synchronous and has no side
/// effects. Setting an existing key overwrites silently.
#[derive(Clone, Default)]
pub struct AnnotationStore {
    entries: Arc<RwLock<HashMap<AnnotationKey, Arc<dyn Any + Send + Sync>>>>,
}

impl AnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_annotation<V: Any + Send + Sync>(
        &self,
        key: &str,
        value: V,
        target: &str,
        member: Option<&str>,
    ) {
        let mut entries = self.entries.write().unwrap();
        entries.insert(
            AnnotationKey {
                key: key.to_string(),
                target: target.to_string(),
                member: member.map(str::to_string),
            },
            Arc::new(value),
        );
    }

    pub fn get_annotation<V: Any + Send + Sync>(
        &self,
        key: &str,
        target: &str,
        member: Option<&str>,
    ) -> Option<Arc<V>> {
        let entries = self.entries.read().unwrap();
        entries
            .get(&AnnotationKey {
                key: key.to_string(),
                target: target.to_string(),
                member: member.map(str::to_string),
            })
            .cloned()
            .and_then(|value| value.downcast::<V>().ok())
    }

    pub fn has_annotation(&self, key: &str, target: &str) -> bool {
        let entries = self.entries.read().unwrap();
        entries.contains_key(&AnnotationKey {
            key: key.to_string(),
            target: target.to_string(),
            member: None,
        })
    }
}

impl std::fmt::Debug for AnnotationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries = self.entries.read().unwrap();
        f.debug_struct("AnnotationStore")
            .field("entries", &entries.len())
            .finish()
    }
}
