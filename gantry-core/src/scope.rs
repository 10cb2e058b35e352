// Provider lifetime scopes

use crate::Error;

/// Defines the lifecycle scope of a provider.
///
/// The scope determines when instances are created and how they are shared:
/// - **Singleton**: one instance for the process lifetime, shared everywhere
/// - **Request**: one instance per request context, never shared across requests
/// - **Transient**: a fresh instance on every resolution, never cached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Behaves like `Singleton`; kept for registrations that do not declare
    /// a scope.
    Default,
    /// One shared instance for the process lifetime.
    Singleton,
    /// One instance per request context id.
    Request,
    /// A fresh instance on every resolution.
    Transient,
}

impl Default for Scope {
    fn default() -> Self {
        Self::Singleton
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::Singleton => write!(f, "singleton"),
            Self::Request => write!(f, "request"),
            Self::Transient => write!(f, "transient"),
        }
    }
}

impl std::str::FromStr for Scope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "default" => Ok(Self::Default),
            "singleton" => Ok(Self::Singleton),
            "request" => Ok(Self::Request),
            "transient" => Ok(Self::Transient),
            other => Err(Error::UnsupportedScope(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_scope() {
        assert_eq!(Scope::default(), Scope::Singleton);
    }

    #[test]
    fn test_from_str() {
        assert_eq!("singleton".parse::<Scope>().unwrap(), Scope::Singleton);
        assert_eq!("request".parse::<Scope>().unwrap(), Scope::Request);
        assert_eq!("transient".parse::<Scope>().unwrap(), Scope::Transient);
        assert_eq!("SINGLETON".parse::<Scope>().unwrap(), Scope::Singleton);
    }

    #[test]
    fn test_unsupported_scope() {
        let err = "pooled".parse::<Scope>().unwrap_err();
        assert!(matches!(err, Error::UnsupportedScope(tag) if tag == "pooled"));
    }

    #[test]
    fn test_display() {
        assert_eq!(Scope::Request.to_string(), "request");
        assert_eq!(Scope::Transient.to_string(), "transient");
    }
}
