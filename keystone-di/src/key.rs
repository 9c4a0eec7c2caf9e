//! Opaque dependency keys

use downcast_rs::{impl_downcast, DowncastSync};
use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Object-safe view of a value usable as a key.
///
/// Implemented for every `Eq + Hash + Debug + Send + Sync` type.
pub trait KeyValue: DowncastSync + fmt::Debug {
    fn dyn_eq(&self, other: &dyn KeyValue) -> bool;
    fn dyn_hash(&self, state: &mut dyn Hasher);
}

impl_downcast!(sync KeyValue);

impl<T> KeyValue for T
where
    T: Eq + Hash + fmt::Debug + Send + Sync + 'static,
{
    fn dyn_eq(&self, other: &dyn KeyValue) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .map_or(false, |other| self == other)
    }

    fn dyn_hash(&self, mut state: &mut dyn Hasher) {
        TypeId::of::<T>().hash(&mut state);
        self.hash(&mut state);
    }
}

/// Identity of a Rust type used as a key
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.name)
    }
}

/// Type-erased, cheaply clonable dependency key.
///
/// Two keys are equal when they wrap the same concrete type and the wrapped
/// values compare equal, so `DependencyKey::from(1_i32)` and
/// `DependencyKey::from(1_i64)` are distinct.
#[derive(Clone)]
pub struct DependencyKey(Arc<dyn KeyValue>);

impl DependencyKey {
    /// Wrap any hashable value
    pub fn new<T>(value: T) -> Self
    where
        T: Eq + Hash + fmt::Debug + Send + Sync + 'static,
    {
        Self(Arc::new(value))
    }

    /// Key identifying the type `T` itself
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::new(TypeKey::of::<T>())
    }

    /// Borrow the wrapped value if it is a `T`
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        (*self.0).as_any().downcast_ref::<T>()
    }

    /// Whether the wrapped value is a `T`
    pub fn is<T: Any>(&self) -> bool {
        (*self.0).as_any().is::<T>()
    }
}

impl PartialEq for DependencyKey {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0.dyn_eq(&*other.0)
    }
}

impl Eq for DependencyKey {}

impl Hash for DependencyKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.dyn_hash(state);
    }
}

impl fmt::Debug for DependencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for DependencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl From<&'static str> for DependencyKey {
    fn from(value: &'static str) -> Self {
        Self::new(value)
    }
}

impl From<String> for DependencyKey {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<TypeKey> for DependencyKey {
    fn from(value: TypeKey) -> Self {
        Self::new(value)
    }
}

impl From<&DependencyKey> for DependencyKey {
    fn from(value: &DependencyKey) -> Self {
        value.clone()
    }
}

macro_rules! impl_from_primitive {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for DependencyKey {
                fn from(value: $ty) -> Self {
                    Self::new(value)
                }
            }
        )*
    };
}

impl_from_primitive!(bool, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);
