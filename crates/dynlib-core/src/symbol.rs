//! Typed views of resolved symbols.

use std::ffi::c_void;
use std::fmt;
use std::marker::PhantomData;
use std::ptr;

use dynlib_abi::{FnPtr, Invoke};

use crate::error::DlError;

/// A symbol resolved by [`Handle::lookup`](crate::Handle::lookup), typed as `F`.
///
/// Borrows the handle, so the library cannot be closed or reloaded while the
/// symbol is held. [`get`](Self::get) copies the raw pointer out; calling that
/// copy after `close` is only sound if the library was loaded with
/// [`Options::NO_DELETE`](crate::Options::NO_DELETE).
///
/// A symbol whose address is null is *empty*: it is reported as present by
/// the lookup but cannot be called.
pub struct Symbol<'h, F> {
    name: String,
    func: Option<F>,
    _handle: PhantomData<&'h ()>,
}

impl<'h, F: FnPtr> Symbol<'h, F> {
    pub(crate) fn new(name: &str, func: Option<F>) -> Self {
        Self {
            name: name.to_string(),
            func,
            _handle: PhantomData,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The typed pointer, or `None` if the symbol is empty.
    #[must_use]
    pub fn get(&self) -> Option<F> {
        self.func
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.func.is_none()
    }

    /// Entry point address (null if empty).
    #[must_use]
    pub fn address(&self) -> *const c_void {
        self.func.map_or(ptr::null(), FnPtr::addr)
    }
}

impl<F: Invoke> Symbol<'_, F> {
    /// Call the symbol with its arguments as a tuple.
    pub fn call(&self, args: F::Args) -> Result<F::Output, DlError> {
        match self.func {
            Some(f) => Ok(f.invoke(args)),
            None => Err(DlError::EmptySymbol {
                symbol: self.name.clone(),
            }),
        }
    }
}

impl<F: FnPtr> fmt::Debug for Symbol<'_, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Symbol")
            .field("name", &self.name)
            .field("address", &self.address())
            .finish()
    }
}

/// Maps a factory's argument tuple to its exported signature.
///
/// For argument tuple `(A0, .., An)` the factory must be exported as
/// `extern "C" fn(A0, .., An) -> *mut T`, returning ownership of a
/// `Box::into_raw` allocation (or null).
pub trait FactoryArgs<T>: Sized {
    type Factory: Invoke<Args = Self, Output = *mut T>;
}

macro_rules! factory_args {
    ($($A:ident),*) => {
        impl<T, $($A),*> FactoryArgs<T> for ($($A,)*) {
            type Factory = extern "C" fn($($A),*) -> *mut T;
        }
    };
}

factory_args!();
factory_args!(A0);
factory_args!(A0, A1);
factory_args!(A0, A1, A2);
factory_args!(A0, A1, A2, A3);
factory_args!(A0, A1, A2, A3, A4);
factory_args!(A0, A1, A2, A3, A4, A5);
