use graft::{DiError, Register};

/// Groups registrations into reusable modules.
///
/// ```rust
/// use graft::{Container, DiError, Register};
/// use graft_base::BundleExt as _;
///
/// fn storage<R: Register>(registry: &R) -> Result<(), DiError> {
///     registry.register_value(String::from("memory://"))?;
///     Ok(())
/// }
///
/// let container = Container::new();
/// container.add_bundle(storage)?.register_value(8080u16)?;
/// assert!(container.is_registered(graft::ServiceId::of::<String>()));
/// # Ok::<(), DiError>(())
/// ```
pub trait BundleExt {
    fn add_bundle<F>(&self, func: F) -> Result<&Self, DiError>
    where
        F: FnOnce(&Self) -> Result<(), DiError>;
}

impl<R> BundleExt for R
where
    R: Register,
{
    fn add_bundle<F>(&self, func: F) -> Result<&Self, DiError>
    where
        F: FnOnce(&Self) -> Result<(), DiError>,
    {
        func(self)?;
        Ok(self)
    }
}
