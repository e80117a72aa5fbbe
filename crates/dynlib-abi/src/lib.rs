//! # dynlib-abi
//!
//! Native loader shim for dynlib.
//!
//! This crate is the only place that talks to the platform dynamic loader. It
//! exposes the four `<dlfcn.h>` primitives behind the [`NativeLoader`] trait,
//! the `RTLD_*` flag words they accept, and the one conversion that turns a
//! resolved address into a typed function pointer.
//!
//! # Architecture
//!
//! ```text
//! Handle (dynlib-core) -> NativeLoader (this crate) -> libc dlopen/dlsym/dlclose/dlerror
//!                      -> fn_cast (this crate)      -> typed fn pointer
//! ```
//!
//! Everything above this crate treats loader references and typed pointers as
//! ordinary values; the raw calls and the address reinterpretation stay here.

#[cfg(not(unix))]
compile_error!("dynlib requires a platform with a dlopen-style dynamic loader");

pub mod dlfcn;
pub mod fn_cast;

pub use dlfcn::{NativeLoader, NativeRef, SystemLoader};
pub use fn_cast::{FnPtr, Invoke, fn_cast};
