//! Deferred values
//!
//! Schema definitions frequently need to refer to types that are not built
//! yet: a message whose field is a list of itself, or two objects that point
//! at each other. A [`Deferred`] is either the value itself or a thunk that
//! produces it from the registry when compilation actually needs it.

use std::fmt;
use std::rc::Rc;

use crate::error::Result;
use crate::registry::TypeRegistry;
use crate::types::TypeId;

type Thunk<T> = Rc<dyn Fn(&TypeRegistry) -> Result<T>>;

/// A value that is either available now or computed on demand.
///
/// Forcing only reads the registry, so forcing the same deferred value any
/// number of times yields the same result.
pub enum Deferred<T> {
    Value(T),
    Thunk(Thunk<T>),
}

impl<T: Clone> Deferred<T> {
    /// Wrap a closure as a deferred value
    pub fn thunk(f: impl Fn(&TypeRegistry) -> Result<T> + 'static) -> Self {
        Self::Thunk(Rc::new(f))
    }

    /// Produce the value
    pub fn force(&self, registry: &TypeRegistry) -> Result<T> {
        match self {
            Self::Value(v) => Ok(v.clone()),
            Self::Thunk(f) => f(registry),
        }
    }

    /// The value, if it does not need forcing
    pub fn as_value(&self) -> Option<&T> {
        match self {
            Self::Value(v) => Some(v),
            Self::Thunk(_) => None,
        }
    }
}

impl Deferred<TypeId> {
    /// Forward reference to a type by name, looked up when forced
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::thunk(move |registry| registry.lookup(&name))
    }
}

impl<T: PartialEq> Deferred<T> {
    /// True only when both sides are plain values that differ.
    ///
    /// Thunks cannot be introspected, so they never prove a difference.
    pub fn provably_differs(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Value(a), Self::Value(b)) => a != b,
            _ => false,
        }
    }
}

impl<T> Clone for Deferred<T>
where
    T: Clone,
{
    fn clone(&self) -> Self {
        match self {
            Self::Value(v) => Self::Value(v.clone()),
            Self::Thunk(f) => Self::Thunk(Rc::clone(f)),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::Thunk(_) => f.write_str("Thunk(..)"),
        }
    }
}

impl From<TypeId> for Deferred<TypeId> {
    fn from(id: TypeId) -> Self {
        Self::Value(id)
    }
}

impl From<Vec<TypeId>> for Deferred<Vec<TypeId>> {
    fn from(ids: Vec<TypeId>) -> Self {
        Self::Value(ids)
    }
}
