use std::{
    any::{type_name, Any, TypeId},
    fmt,
    hash::{Hash, Hasher},
    ptr::NonNull,
};

/// Runtime type tag of a managed object.
///
/// Always describes the most-derived (concrete) type, whatever the type
/// parameter of the handle it was asked through.
#[derive(Clone, Copy)]
pub struct TypeInfo
{
    id: TypeId,
    name: &'static str,
}

impl TypeInfo
{
    pub fn of<T: ?Sized + 'static>() -> Self
    {
        TypeInfo {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId { self.id }

    pub fn name(&self) -> &'static str { self.name }

    pub fn is<T: ?Sized + 'static>(&self) -> bool { self.id == TypeId::of::<T>() }
}

impl PartialEq for TypeInfo
{
    fn eq(&self, other: &Self) -> bool { self.id == other.id }
}

impl Eq for TypeInfo {}

impl Hash for TypeInfo
{
    fn hash<H: Hasher>(&self, state: &mut H) { self.id.hash(state) }
}

impl fmt::Debug for TypeInfo
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_tuple("TypeInfo").field(&self.name).finish()
    }
}

impl fmt::Display for TypeInfo
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.name) }
}

/// Root of every managed type family.
///
/// Implement through [`object!`](crate::object!) rather than by hand.
///
/// # Safety
///
/// `provide` is a capability query: the caller passes a
/// `&mut Option<NonNull<U>>` as `slot`, and the implementation may fill it in
/// only with a pointer to `self` viewed as `U`. The handle dereferences
/// whatever ends up there for as long as the object lives.
pub unsafe trait Object: Any
{
    /// Tag of the concrete type.
    fn type_info(&self) -> TypeInfo;

    /// Answer a capability query, see the trait documentation.
    fn provide(&self, slot: &mut dyn Any);
}

/// A type a handle can be cast to at runtime.
///
/// Concrete types become targets through [`object!`](crate::object!),
/// interfaces through [`interface!`](crate::interface!). `dyn Object` is
/// always a target.
///
/// # Safety
///
/// `resolve` must return either `None` or a pointer to `object` itself.
pub unsafe trait Target: 'static
{
    fn resolve(object: &(dyn Object + 'static)) -> Option<NonNull<Self>>
    {
        let mut slot: Option<NonNull<Self>> = None;
        object.provide(&mut slot);
        slot
    }
}

unsafe impl Target for dyn Object
{
    fn resolve(object: &(dyn Object + 'static)) -> Option<NonNull<Self>>
    {
        Some(NonNull::from(object))
    }
}

/// Conversion that is known to succeed without a runtime check.
///
/// # Safety
///
/// `upcast` must return the same object it was given, viewed as `U`.
pub unsafe trait Upcast<U: ?Sized>
{
    fn upcast(ptr: NonNull<Self>) -> NonNull<U>;
}

/// Register a concrete type as a managed object.
///
/// ```
/// use sharedref::{interface, object, SharedHandle};
///
/// trait Labelled { fn label(&self) -> &str; }
/// interface!(Labelled);
///
/// struct Button(String);
/// impl Labelled for Button { fn label(&self) -> &str { &self.0 } }
/// object!(Button: Labelled);
///
/// let button = SharedHandle::new(Button("OK".into()));
/// let labelled = button.upcast::<dyn Labelled>();
/// assert_eq!(labelled.label(), "OK");
/// ```
///
/// The interface list names every trait the type can be cast to besides
/// itself and `dyn Object`. Only non-generic types are supported.
#[macro_export]
macro_rules! object {
    ($ty:ty $(: $($iface:path),+ $(,)?)?) => {
        unsafe impl $crate::Object for $ty {
            fn type_info(&self) -> $crate::TypeInfo { $crate::TypeInfo::of::<$ty>() }

            fn provide(&self, slot: &mut dyn ::std::any::Any) {
                if let Some(slot) = slot.downcast_mut::<Option<::std::ptr::NonNull<$ty>>>() {
                    *slot = Some(::std::ptr::NonNull::from(self));
                    return;
                }
                $($(
                    if let Some(slot) =
                        slot.downcast_mut::<Option<::std::ptr::NonNull<dyn $iface>>>()
                    {
                        *slot = Some(::std::ptr::NonNull::from(self as &(dyn $iface + 'static)));
                        return;
                    }
                )+)?
            }
        }

        unsafe impl $crate::Target for $ty {}

        unsafe impl $crate::Upcast<$ty> for $ty {
            fn upcast(ptr: ::std::ptr::NonNull<Self>) -> ::std::ptr::NonNull<$ty> { ptr }
        }

        unsafe impl $crate::Upcast<dyn $crate::Object> for $ty {
            fn upcast(ptr: ::std::ptr::NonNull<Self>) -> ::std::ptr::NonNull<dyn $crate::Object> {
                ptr
            }
        }

        $($(
            unsafe impl $crate::Upcast<dyn $iface> for $ty {
                fn upcast(ptr: ::std::ptr::NonNull<Self>) -> ::std::ptr::NonNull<dyn $iface> {
                    ptr
                }
            }
        )+)?
    };
}

/// Make a trait object type a cast target.
///
/// Objects answer for the interface if their [`object!`](crate::object!)
/// registration lists it.
#[macro_export]
macro_rules! interface {
    ($($iface:path),+ $(,)?) => {
        $(
            unsafe impl $crate::Target for dyn $iface {}
        )+
    };
}
