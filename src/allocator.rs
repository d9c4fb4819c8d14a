//! The allocator capability: how pooled objects are built and torn down

use crate::errors::BoxError;
use crate::slot::SlotContext;
use std::marker::PhantomData;

/// Constructs and destroys the objects a pool hands out.
///
/// Both calls may be slow and may fail. The pool never calls them while
/// holding a lock that other claimants contend on.
///
/// # Examples
///
/// ```
/// use esox_slotpool::{Allocator, BoxError, SlotContext};
///
/// struct Buffers;
///
/// impl Allocator for Buffers {
///     type Object = Vec<u8>;
///
///     fn allocate(&self, _ctx: &SlotContext) -> Result<Vec<u8>, BoxError> {
///         Ok(vec![0; 4096])
///     }
/// }
/// ```
pub trait Allocator: Send + Sync + 'static {
    type Object: Send + 'static;

    /// Build a new object for the given slot
    fn allocate(&self, ctx: &SlotContext) -> Result<Self::Object, BoxError>;

    /// Destroy an object the pool is retiring. Errors are logged and
    /// collected by the pool but never stop it from making progress.
    fn deallocate(&self, object: Self::Object) -> Result<(), BoxError> {
        drop(object);
        Ok(())
    }
}

/// Allocator backed by a closure; deallocation simply drops the object
pub struct FnAllocator<F, T> {
    allocate: F,
    _marker: PhantomData<fn() -> T>,
}

/// Wrap a closure as an [`Allocator`].
///
/// # Examples
///
/// ```
/// use esox_slotpool::{allocator_fn, Pool, PoolConfiguration};
/// use std::time::Duration;
///
/// let pool = Pool::new(PoolConfiguration::new(allocator_fn(|ctx| Ok(ctx.slot.index() * 10)))).unwrap();
/// let obj = pool.claim(Duration::from_secs(1)).unwrap();
/// assert_eq!(*obj, 0);
/// ```
pub fn allocator_fn<F, T>(allocate: F) -> FnAllocator<F, T>
where
    F: Fn(&SlotContext) -> Result<T, BoxError> + Send + Sync + 'static,
    T: Send + 'static,
{
    FnAllocator {
        allocate,
        _marker: PhantomData,
    }
}

impl<F, T> Allocator for FnAllocator<F, T>
where
    F: Fn(&SlotContext) -> Result<T, BoxError> + Send + Sync + 'static,
    T: Send + 'static,
{
    type Object = T;

    fn allocate(&self, ctx: &SlotContext) -> Result<T, BoxError> {
        (self.allocate)(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slot::SlotId;

    #[test]
    fn test_fn_allocator_sees_slot_context() {
        let alloc = allocator_fn(|ctx: &SlotContext| {
            if ctx.reallocation {
                Err("no second chances".into())
            } else {
                Ok(ctx.slot.index())
            }
        });

        let fresh = SlotContext { slot: SlotId(4), reallocation: false };
        assert_eq!(alloc.allocate(&fresh).unwrap(), 4);

        let again = SlotContext { slot: SlotId(4), reallocation: true };
        assert!(alloc.allocate(&again).is_err());
        assert!(alloc.deallocate(4).is_ok());
    }
}
