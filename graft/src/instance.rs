use std::any::{Any, type_name};
use std::fmt;
use std::sync::Arc;

use crate::{DiError, ServiceId};

/// Type-erased handle to a constructed service.
///
/// The wrapped value is always an `Arc<T>`, so unsized contracts such as
/// `dyn Trait` can be stored next to concrete types. Clones share the same
/// underlying value.
#[derive(Clone)]
pub struct Instance {
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl Instance {
    pub fn new<T>(value: Arc<T>) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        Self {
            value: Arc::new(value),
            type_name: type_name::<T>(),
        }
    }

    /// Returns the wrapped value if it was created from an `Arc<T>`.
    pub fn downcast<T>(&self) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.value.downcast_ref::<Arc<T>>().cloned()
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns `true` if both handles refer to the same stored value.
    pub fn ptr_eq(&self, other: &Instance) -> bool {
        Arc::ptr_eq(&self.value, &other.value)
    }

    pub(crate) fn cast<T>(&self, identifier: &ServiceId) -> Result<Arc<T>, DiError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.downcast::<T>().ok_or_else(|| DiError::TypeMismatch {
            identifier: identifier.clone(),
            expected: type_name::<T>(),
        })
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Instance").field(&self.type_name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Greeter: Send + Sync {
        fn greet(&self) -> &'static str;
    }

    struct English;

    impl Greeter for English {
        fn greet(&self) -> &'static str {
            "hello"
        }
    }

    #[test]
    fn test_downcast() {
        let instance = Instance::new(Arc::new(42u32));
        assert_eq!(instance.downcast::<u32>().as_deref(), Some(&42));
        assert!(instance.downcast::<u64>().is_none());
        assert!(instance.ptr_eq(&instance.clone()));
        assert!(!instance.ptr_eq(&Instance::new(Arc::new(42u32))));
    }

    #[test]
    fn test_downcast_contract() {
        let greeter: Arc<dyn Greeter> = Arc::new(English);
        let instance = Instance::new(greeter);
        assert_eq!(instance.downcast::<dyn Greeter>().unwrap().greet(), "hello");
        assert!(instance.downcast::<English>().is_none());
    }
}
