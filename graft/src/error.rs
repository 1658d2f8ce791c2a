use std::fmt;

use crate::ServiceId;

/// Type alias for boxed errors that can be sent across threads.
///
/// This is the error type of user code run by the container: constructors,
/// factories, lifecycle hooks and disposers.
pub type StdError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur during registration, resolution or disposal.
#[derive(Debug)]
pub enum DiError {
    /// A registration is malformed (missing identifier, no producer or more than one).
    InvalidRegistration(String),
    /// The container or scope has already been disposed.
    Disposed,
    /// No registration exists for the requested identifier.
    ServiceNotFound { identifier: ServiceId },
    /// The requested identifier is already being constructed on the current
    /// resolution chain. `cycle` starts and ends with the repeated identifier.
    CircularDependency { cycle: Vec<ServiceId> },
    /// The resolution chain grew deeper than `max_resolution_depth`.
    DepthExceeded {
        depth: usize,
        max: usize,
        path: Vec<ServiceId>,
    },
    /// The registered instance is not of the requested type.
    TypeMismatch {
        identifier: ServiceId,
        expected: &'static str,
    },
    /// A synchronous resolution reached an asynchronous factory.
    RequiresAsync { identifier: ServiceId },
    /// A synchronous resolution reached a cached service that a suspended
    /// asynchronous resolution is still constructing.
    ConstructionInProgress { identifier: ServiceId },
    /// A constructor or factory returned an error.
    Construction {
        identifier: ServiceId,
        source: StdError,
    },
    /// Property injection or a post-construct hook failed under the fail-fast policy.
    Enrichment {
        identifier: ServiceId,
        step: String,
        source: StdError,
    },
}

impl DiError {
    /// Converts an error returned by user code back into a `DiError`.
    ///
    /// Errors that already are `DiError` (for example a missing dependency
    /// resolved with `?` inside a factory) keep their original variant.
    pub(crate) fn from_user(identifier: &ServiceId, err: StdError) -> Self {
        match err.downcast::<DiError>() {
            Ok(err) => *err,
            Err(source) => DiError::Construction {
                identifier: identifier.clone(),
                source,
            },
        }
    }
}

impl fmt::Display for DiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiError::InvalidRegistration(reason) => write!(f, "Invalid registration: {reason}"),
            DiError::Disposed => write!(f, "Container is disposed"),
            DiError::ServiceNotFound { identifier } => {
                write!(f, "Service not found: {identifier}")
            }
            DiError::CircularDependency { cycle } => {
                write!(f, "Circular dependency detected: {}", Path(cycle))
            }
            DiError::DepthExceeded { depth, max, path } => write!(
                f,
                "Resolution depth {depth} exceeds the maximum of {max}: {}",
                Path(path)
            ),
            DiError::TypeMismatch {
                identifier,
                expected,
            } => write!(f, "Service {identifier} is not a {expected}"),
            DiError::RequiresAsync { identifier } => write!(
                f,
                "Service {identifier} has an asynchronous factory and must be resolved asynchronously"
            ),
            DiError::ConstructionInProgress { identifier } => write!(
                f,
                "Service {identifier} is being constructed by a pending asynchronous resolution"
            ),
            DiError::Construction { identifier, source } => {
                write!(f, "Cannot construct {identifier}: {source}")
            }
            DiError::Enrichment {
                identifier,
                step,
                source,
            } => write!(f, "Cannot initialize {identifier}: {step} failed: {source}"),
        }
    }
}

impl std::error::Error for DiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DiError::Construction { source, .. } | DiError::Enrichment { source, .. } => {
                Some(source.as_ref())
            }
            _ => None,
        }
    }
}

struct Path<'a>(&'a [ServiceId]);

impl fmt::Display for Path<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, identifier) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(" -> ")?;
            }
            write!(f, "{identifier}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_display() {
        let err = DiError::CircularDependency {
            cycle: vec![
                ServiceId::named("a"),
                ServiceId::named("b"),
                ServiceId::named("a"),
            ],
        };
        assert_eq!(err.to_string(), "Circular dependency detected: a -> b -> a");
    }

    #[test]
    fn test_from_user_keeps_variant() {
        let err: StdError = Box::new(DiError::ServiceNotFound {
            identifier: ServiceId::named("cache"),
        });
        assert!(matches!(
            DiError::from_user(&ServiceId::named("service"), err),
            DiError::ServiceNotFound { identifier } if identifier == ServiceId::named("cache")
        ));
        let err: StdError = "boom".into();
        assert!(matches!(
            DiError::from_user(&ServiceId::named("service"), err),
            DiError::Construction { .. }
        ));
    }
}
