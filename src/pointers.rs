use super::{
    error::HandleError,
    local_ledger::{self, LocalIndex},
    object::{Object, Target, TypeInfo, Upcast},
};
use log::{trace, warn};
use std::{
    any::type_name,
    fmt,
    hash::{Hash, Hasher},
    marker::PhantomData,
    mem,
    ops::Deref,
    ptr::NonNull,
};

/// Account of the object plus a view of it as `T`.
struct Raw<T: ?Sized + 'static>
{
    account: LocalIndex,
    ptr: NonNull<T>,
}

impl<T: ?Sized + 'static> Clone for Raw<T>
{
    fn clone(&self) -> Self { *self }
}
impl<T: ?Sized + 'static> Copy for Raw<T> {}

/// Shared, reference counted handle to a managed object.
///
/// Every handle attached to the same object shares one counter, whatever its
/// type parameter: a `SharedHandle<Button>`, the `SharedHandle<dyn Widget>`
/// obtained by casting it and the `SharedHandle<dyn Object>` obtained by
/// erasing it all count towards the same total. The object is destroyed when
/// the last of them is dropped or released.
///
/// A handle may be null. Casts that fail produce null handles, and so does
/// `Default`.
///
/// Reference counting does not collect cycles. Back references, such as a
/// widget pointing at its parent window, must use [`Weak`].
///
/// Handles are neither `Send` nor `Sync`: the counter is plain arithmetic on
/// a thread-local account.
pub struct SharedHandle<T: ?Sized + 'static>
{
    raw: Option<Raw<T>>,
    _owns: PhantomData<Box<T>>,
}

impl<T: Object> SharedHandle<T>
{
    /// Allocate `it` on the heap and take ownership of it.
    pub fn new(it: T) -> Self { Self::from(Box::new(it)) }

    /// Adopt an object previously leaked from a `Box<T>`.
    ///
    /// A null pointer produces a null handle. An address that is already
    /// owned by a handle on this thread is refused, the existing owners are
    /// not affected.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or come from `Box::into_raw`/`Box::leak` of a
    /// `Box<T>`, and must not be freed or used by anything but handles
    /// afterwards.
    pub unsafe fn from_raw(ptr: *mut T) -> Result<Self, HandleError>
    {
        let Some(ptr) = NonNull::new(ptr) else {
            return Ok(Self::null());
        };
        match local_ledger::try_adopt(ptr, mem::size_of::<T>()) {
            Ok(account) => {
                trace!("adopted {} at {:p}", type_name::<T>(), ptr);
                Ok(Self::from_raw_parts(account, ptr))
            }
            Err(err) => {
                warn!("refusing to adopt {}: {}", type_name::<T>(), err);
                Err(err)
            }
        }
    }

    /// Take the object back out of the handle.
    ///
    /// Succeeds only for the sole owner, and only if `T` is the concrete type
    /// of the object. Otherwise the handle is given back unchanged.
    pub fn try_unwrap(mut self) -> Result<Box<T>, Self>
    {
        let raw = self.raw;
        let Some(raw) = raw else {
            return Err(self);
        };
        let concrete = raw
            .account
            .object()
            .map_or(false, |object| unsafe { object.as_ref() }.type_info().is::<T>());
        if raw.account.count() != 1 || !concrete {
            return Err(self);
        }

        self.raw = None;
        match raw.account.release() {
            Some(object) => {
                local_ledger::free(raw.account, object);
                Ok(unsafe { Box::from_raw(object.as_ptr().cast::<T>()) })
            }
            None => unreachable!("sole handle did not release its account"),
        }
    }
}

impl<T: ?Sized + 'static> SharedHandle<T>
{
    /// A handle that owns nothing.
    pub const fn null() -> Self
    {
        SharedHandle {
            raw: None,
            _owns: PhantomData,
        }
    }

    fn from_raw_parts(account: LocalIndex, ptr: NonNull<T>) -> Self
    {
        SharedHandle {
            raw: Some(Raw { account, ptr }),
            _owns: PhantomData,
        }
    }

    pub fn is_null(&self) -> bool { self.raw.is_none() }

    /// Number of live handles sharing this object, 0 for a null handle.
    pub fn count(&self) -> usize { self.raw.map_or(0, |raw| raw.account.count()) }

    /// Checked access to the object.
    pub fn get(&self) -> Result<&T, HandleError>
    {
        match &self.raw {
            Some(raw) => Ok(unsafe { raw.ptr.as_ref() }),
            None => Err(HandleError::Null),
        }
    }

    /// Tag of the concrete type of the object, whatever `T` is.
    pub fn runtime_type(&self) -> Result<TypeInfo, HandleError>
    {
        self.object()
            .map(|object| object.type_info())
            .ok_or(HandleError::Null)
    }

    fn object(&self) -> Option<&(dyn Object + 'static)>
    {
        let raw = self.raw?;
        raw.account.object().map(|object| unsafe { object.as_ref() })
    }

    /// Runtime checked conversion to another type of the object's family.
    ///
    /// Shares ownership if the object is a `U` (or provides `U`), otherwise
    /// returns a null handle. Either way `self` is left as it was.
    pub fn cast<U: ?Sized + Target>(&self) -> SharedHandle<U>
    {
        let Some(raw) = self.raw else {
            return SharedHandle::null();
        };
        let Some(object) = self.object() else {
            return SharedHandle::null();
        };
        match U::resolve(object) {
            Some(ptr) => {
                raw.account.retain();
                SharedHandle::from_raw_parts(raw.account, ptr)
            }
            None => {
                trace!("cast of {} to {} failed", object.type_info(), type_name::<U>());
                SharedHandle::null()
            }
        }
    }

    /// Conversion that needs no runtime check.
    pub fn upcast<U: ?Sized + 'static>(&self) -> SharedHandle<U>
    where
        T: Upcast<U>,
    {
        match self.raw {
            Some(raw) => {
                raw.account.retain();
                SharedHandle::from_raw_parts(raw.account, <T as Upcast<U>>::upcast(raw.ptr))
            }
            None => SharedHandle::null(),
        }
    }

    /// View the object through the root of its family.
    pub fn erase(&self) -> SharedHandle<dyn Object> { self.cast::<dyn Object>() }

    /// Produce a non-owning observation handle.
    pub fn alias(&self) -> Weak<T>
    {
        match self.raw {
            Some(raw) => Weak {
                raw: Some(raw),
                gen: raw.account.generation(),
            },
            None => Weak::dangling(),
        }
    }

    /// Give up this handle's share and become null.
    ///
    /// Destroys the object if this was the last handle to it. Releasing a
    /// null handle does nothing.
    pub fn release(&mut self)
    {
        let Some(raw) = self.raw.take() else {
            return;
        };
        if let Some(object) = raw.account.release() {
            trace!(
                "destroying {} at {:p}",
                unsafe { object.as_ref() }.type_info(),
                object
            );
            local_ledger::free(raw.account, object);
            mem::drop(unsafe { Box::from_raw(object.as_ptr()) });
        }
    }
}

impl<T: Object> From<Box<T>> for SharedHandle<T>
{
    fn from(it: Box<T>) -> Self
    {
        let ptr = NonNull::from(Box::leak(it));
        let account = local_ledger::adopt(ptr, mem::size_of::<T>());
        trace!("adopted {} at {:p}", type_name::<T>(), ptr);
        Self::from_raw_parts(account, ptr)
    }
}

impl<T: ?Sized + 'static> Drop for SharedHandle<T>
{
    fn drop(&mut self) { self.release() }
}

impl<T: ?Sized + 'static> Clone for SharedHandle<T>
{
    fn clone(&self) -> Self
    {
        if let Some(raw) = self.raw {
            raw.account.retain();
        }
        SharedHandle {
            raw: self.raw,
            _owns: PhantomData,
        }
    }

    fn clone_from(&mut self, source: &Self)
    {
        if *self != *source {
            *self = source.clone();
        }
    }
}

impl<T: ?Sized + 'static> Default for SharedHandle<T>
{
    fn default() -> Self { Self::null() }
}

impl<T: ?Sized + 'static> Deref for SharedHandle<T>
{
    type Target = T;

    fn deref(&self) -> &T
    {
        match self.get() {
            Ok(it) => it,
            Err(err) => panic!("{}", err),
        }
    }
}

/// Identity of the object, across type parameters. Two null handles are
/// equal.
impl<T: ?Sized + 'static, U: ?Sized + 'static> PartialEq<SharedHandle<U>> for SharedHandle<T>
{
    fn eq(&self, other: &SharedHandle<U>) -> bool
    {
        match (self.raw, other.raw) {
            (Some(a), Some(b)) => a.account.same(&b.account),
            (None, None) => true,
            _ => false,
        }
    }
}

impl<T: ?Sized + 'static> Eq for SharedHandle<T> {}

impl<T: ?Sized + 'static> Hash for SharedHandle<T>
{
    fn hash<H: Hasher>(&self, state: &mut H)
    {
        self.raw.map_or(0, |raw| raw.account.addr()).hash(state)
    }
}

impl<T: ?Sized + 'static> fmt::Debug for SharedHandle<T>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self.runtime_type() {
            Ok(ty) => f
                .debug_struct("SharedHandle")
                .field("type", &ty)
                .field("count", &self.count())
                .finish(),
            Err(_) => f.write_str("SharedHandle(null)"),
        }
    }
}

/// Non-owning observation handle.
///
/// Carries the object's account and a copy of the account's generation. The
/// generation moves on when the object is destroyed, so an observation
/// outliving its object fails to upgrade rather than dangling. Never keeps
/// the object alive, never frees it.
///
/// Like the owning handle it is not `Send`; unlike it, it is `Copy`.
pub struct Weak<T: ?Sized + 'static>
{
    raw: Option<Raw<T>>,
    gen: u64,
}

impl<T: ?Sized + 'static> Clone for Weak<T>
{
    fn clone(&self) -> Self { *self }
}
impl<T: ?Sized + 'static> Copy for Weak<T> {}

impl<T: ?Sized + 'static> Weak<T>
{
    /// An observation of nothing, never valid.
    pub const fn dangling() -> Self { Weak { raw: None, gen: 0 } }

    /// Check if the observed object is still alive.
    pub fn is_valid(&self) -> bool
    {
        self.raw
            .map_or(false, |raw| raw.account.generation() == self.gen)
    }

    /// Attempt to get a sharing handle.
    ///
    /// Returns a null handle if the object is gone, including while its
    /// destructor is running.
    pub fn upgrade(&self) -> SharedHandle<T>
    {
        match self.raw {
            Some(raw) if raw.account.generation() == self.gen => {
                raw.account.retain();
                SharedHandle::from_raw_parts(raw.account, raw.ptr)
            }
            _ => SharedHandle::null(),
        }
    }
}

impl<T: ?Sized + 'static> Default for Weak<T>
{
    fn default() -> Self { Self::dangling() }
}

impl<T: ?Sized + 'static> fmt::Debug for Weak<T>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("Weak")
            .field("valid", &self.is_valid())
            .field("gen", &self.gen)
            .finish()
    }
}
