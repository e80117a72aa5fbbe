//! # dynlib-core
//!
//! RAII ownership of a dynamically loaded library, typed symbol lookup, and
//! factory construction of plugin objects.
//!
//! ```text
//! Handle::load(name) -> NativeLoader::open(name, policy | options)
//! Handle::lookup::<F>(sym) -> NativeLoader::symbol -> fn_cast::<F> -> Symbol<F>
//! Handle::create::<T, _>(sym, args) -> lookup::<extern "C" fn(args..) -> *mut T> -> Box<T>
//! drop(Handle) -> NativeLoader::close
//! ```
//!
//! Failures never panic or abort: `load` leaves the handle closed, `lookup`
//! and `create` return an error, and [`Handle::error`] holds the loader's
//! diagnostic text. `lookup` and `create` are `unsafe` because the declared
//! signature is trusted, not checked; they are the only entry points that
//! cross that boundary.

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod flags;
pub mod handle;
pub mod symbol;
#[cfg(feature = "mock-loader")]
pub mod testing;

pub use config::LoaderDefaults;
pub use dynlib_abi::{FnPtr, Invoke, NativeLoader, NativeRef, SystemLoader};
pub use error::{DlError, ErrorKind};
pub use flags::{Options, ParseFlagsError, ResolvePolicy};
pub use handle::Handle;
pub use symbol::{FactoryArgs, Symbol};
