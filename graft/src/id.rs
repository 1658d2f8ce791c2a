use std::any::{TypeId, type_name};
use std::borrow::Cow;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Opaque identifier naming a service contract.
///
/// An identifier is either derived from a type (`ServiceId::of::<T>()`, the
/// natural identifier of a constructor parameter of type `Arc<T>`) or a named
/// symbolic key (`ServiceId::named("primary-db")`). Identifiers are compared by
/// value and used as registry keys.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ServiceId(Key);

#[derive(Clone, PartialEq, Eq, Hash)]
enum Key {
    Type(TypeId, &'static str),
    Named(Cow<'static, str>),
}

impl ServiceId {
    /// Returns the identifier of the type `T`. `T` may be a trait object.
    pub fn of<T>() -> Self
    where
        T: ?Sized + 'static,
    {
        Self(Key::Type(TypeId::of::<T>(), type_name::<T>()))
    }

    /// Returns a symbolic identifier.
    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        Self(Key::Named(name.into()))
    }

    /// Human readable name: the type name or the symbolic name.
    pub fn name(&self) -> &str {
        match &self.0 {
            Key::Type(_, name) => name,
            Key::Named(name) => name,
        }
    }

    pub fn type_id(&self) -> Option<TypeId> {
        match &self.0 {
            Key::Type(type_id, _) => Some(*type_id),
            Key::Named(_) => None,
        }
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Debug for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Key::Type(_, name) => write!(f, "ServiceId({name})"),
            Key::Named(name) => write!(f, "ServiceId({name:?})"),
        }
    }
}

impl AsRef<ServiceId> for ServiceId {
    fn as_ref(&self) -> &ServiceId {
        self
    }
}

impl From<&'static str> for ServiceId {
    fn from(value: &'static str) -> Self {
        Self::named(value)
    }
}

impl From<String> for ServiceId {
    fn from(value: String) -> Self {
        Self::named(value)
    }
}

/// Typed service identifier.
///
/// A token carries the type a resolution yields, so `resolve_token(&token)`
/// returns `Arc<T>` directly. `T` may be unsized, which is how trait contracts
/// are named:
///
/// ```rust
/// use graft::Token;
///
/// trait Clock: Send + Sync {}
///
/// const WALL_CLOCK: Token<dyn Clock> = Token::named("wall-clock");
/// let by_type = Token::<dyn Clock>::of();
/// assert_ne!(WALL_CLOCK.id(), by_type.id());
/// ```
pub struct Token<T: ?Sized> {
    id: ServiceId,
    _marker: PhantomData<fn() -> Arc<T>>,
}

impl<T> Token<T>
where
    T: ?Sized + 'static,
{
    /// Token of the natural type identifier of `T`.
    pub fn of() -> Self {
        Self::new(ServiceId::of::<T>())
    }
}

impl<T: ?Sized> Token<T> {
    pub const fn named(name: &'static str) -> Self {
        Self {
            id: ServiceId(Key::Named(Cow::Borrowed(name))),
            _marker: PhantomData,
        }
    }

    pub fn new(id: impl Into<ServiceId>) -> Self {
        Self {
            id: id.into(),
            _marker: PhantomData,
        }
    }

    pub fn id(&self) -> &ServiceId {
        &self.id
    }
}

impl<T: ?Sized> Clone for Token<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: ?Sized> fmt::Debug for Token<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Token").field(&self.id).finish()
    }
}

impl<T: ?Sized> AsRef<ServiceId> for Token<T> {
    fn as_ref(&self) -> &ServiceId {
        &self.id
    }
}

impl<T: ?Sized> From<Token<T>> for ServiceId {
    fn from(value: Token<T>) -> Self {
        value.id
    }
}

impl<T: ?Sized> From<&Token<T>> for ServiceId {
    fn from(value: &Token<T>) -> Self {
        value.id.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Contract {}

    #[test]
    fn test_identifiers() {
        assert_eq!(ServiceId::of::<String>(), ServiceId::of::<String>());
        assert_ne!(ServiceId::of::<String>(), ServiceId::of::<u32>());
        assert_ne!(ServiceId::of::<dyn Contract>(), ServiceId::named("Contract"));
        assert_eq!(ServiceId::named("db"), ServiceId::from("db"));
        assert_eq!(ServiceId::named("db"), ServiceId::from("db".to_string()));
        assert!(ServiceId::named("db").type_id().is_none());
        assert_eq!(
            ServiceId::of::<u32>().type_id(),
            Some(TypeId::of::<u32>())
        );
    }

    #[test]
    fn test_tokens() {
        const PRIMARY: Token<String> = Token::named("primary");
        assert_eq!(PRIMARY.id(), &ServiceId::named("primary"));
        assert_eq!(Token::<String>::of().id(), &ServiceId::of::<String>());
        assert_eq!(ServiceId::from(&PRIMARY).to_string(), "primary");
    }
}
