//! RAII lease over an acquired resource instance

use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::reslist::Shared;
use crate::resource::Resource;

/// An instance checked out of a [`ResList`](crate::ResList).
///
/// Dropping the lease releases the instance back to the list. Use
/// [`invalidate`](Self::invalidate) for an instance that turned out to be
/// broken and [`into_inner`](Self::into_inner) to take it out of the list's
/// control entirely.
pub struct Lease<R: Resource> {
    instance: Option<R::Instance>,
    list: Arc<Shared<R>>,
}

impl<R: Resource> Lease<R> {
    pub(crate) fn new(instance: R::Instance, list: Arc<Shared<R>>) -> Self {
        Self {
            instance: Some(instance),
            list,
        }
    }

    /// Returns the instance to the idle set, reporting maintenance errors.
    pub fn release(mut self) -> Result<()> {
        match self.instance.take() {
            Some(instance) => self.list.release(instance),
            None => Ok(()),
        }
    }

    /// Destroys the instance instead of returning it, freeing its slot.
    pub fn invalidate(mut self) -> Result<()> {
        match self.instance.take() {
            Some(instance) => self.list.invalidate(instance),
            None => Ok(()),
        }
    }

    /// Takes the instance out of the lease without releasing it.
    ///
    /// The slot stays counted as checked out until the instance is handed
    /// back with [`ResList::release`](crate::ResList::release) or
    /// [`ResList::invalidate`](crate::ResList::invalidate).
    #[must_use]
    pub fn into_inner(mut self) -> R::Instance {
        self.instance.take().expect("lease used after being consumed")
    }
}

impl<R: Resource> std::ops::Deref for Lease<R> {
    type Target = R::Instance;

    fn deref(&self) -> &R::Instance {
        self.instance.as_ref().expect("lease used after being consumed")
    }
}

impl<R: Resource> std::ops::DerefMut for Lease<R> {
    fn deref_mut(&mut self) -> &mut R::Instance {
        self.instance.as_mut().expect("lease used after being consumed")
    }
}

impl<R: Resource> Drop for Lease<R> {
    fn drop(&mut self) {
        if let Some(instance) = self.instance.take()
            && let Err(error) = self.list.release(instance)
        {
            tracing::warn!(%error, "releasing leased resource failed");
        }
    }
}

impl<R: Resource> fmt::Debug for Lease<R>
where
    R::Instance: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease")
            .field("instance", &self.instance)
            .finish_non_exhaustive()
    }
}
