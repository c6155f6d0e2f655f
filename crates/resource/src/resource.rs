//! The resource trait a [`ResList`](crate::ResList) manages.
//!
//! A `Resource` is the factory: it builds instances on demand and tears them
//! down when they expire, are invalidated or the list is destroyed. Any state
//! both need (addresses, credentials, counters) lives on the implementor.

use std::fmt;

use crate::error::BoxError;

/// Factory and destructor for the instances held by a resource list.
///
/// Both methods run with the list's lock held, so they must not call back
/// into the same list.
pub trait Resource: Send + Sync + 'static {
    /// The instance type handed out by `acquire`.
    type Instance: Send + 'static;

    /// Build a new instance.
    fn create(&self) -> Result<Self::Instance, BoxError>;

    /// Tear down an instance permanently.
    fn destroy(&self, instance: Self::Instance) -> Result<(), BoxError> {
        drop(instance);
        Ok(())
    }
}

/// [`Resource`] built from a constructor and a destructor closure.
///
/// ```
/// use regio_resource::{FnResource, ResList, ResListConfig};
///
/// let resource = FnResource::new(|| Ok(Vec::<u8>::with_capacity(4096)), |_buf| Ok(()));
/// let list = ResList::new(ResListConfig::new(1, 2, 4), resource)?;
/// let buf = list.acquire()?;
/// assert!(buf.capacity() >= 4096);
/// # Ok::<(), regio_resource::Error>(())
/// ```
pub struct FnResource<C, D> {
    constructor: C,
    destructor: D,
}

impl<T, C, D> FnResource<C, D>
where
    T: Send + 'static,
    C: Fn() -> Result<T, BoxError> + Send + Sync + 'static,
    D: Fn(T) -> Result<(), BoxError> + Send + Sync + 'static,
{
    /// Pair a constructor with a destructor.
    pub fn new(constructor: C, destructor: D) -> Self {
        Self {
            constructor,
            destructor,
        }
    }
}

impl<T, C, D> Resource for FnResource<C, D>
where
    T: Send + 'static,
    C: Fn() -> Result<T, BoxError> + Send + Sync + 'static,
    D: Fn(T) -> Result<(), BoxError> + Send + Sync + 'static,
{
    type Instance = T;

    fn create(&self) -> Result<T, BoxError> {
        (self.constructor)()
    }

    fn destroy(&self, instance: T) -> Result<(), BoxError> {
        (self.destructor)(instance)
    }
}

impl<C, D> fmt::Debug for FnResource<C, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnResource").finish_non_exhaustive()
    }
}
