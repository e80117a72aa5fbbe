//! Owned handle to a dynamically loaded library.
//!
//! State machine:
//!
//! ```text
//! Closed --load ok--> Open
//! Closed --load err-> Closed
//! Open   --load-----> Closed, then as above
//! Open   --close----> Closed
//! Closed --close----> Closed (no loader call)
//! drop              -> Closed
//! ```

use std::cell::RefCell;
use std::ffi::{CString, c_int, c_void};
use std::fmt;

use dynlib_abi::{FnPtr, Invoke, NativeLoader, NativeRef, SystemLoader, fn_cast};
use tracing::{debug, trace, warn};

use crate::config::{self, LoaderDefaults};
use crate::error::DlError;
use crate::flags::{Options, ResolvePolicy};
use crate::symbol::{FactoryArgs, Symbol};

/// Owns at most one open library reference.
///
/// Policy and options are read when [`load`](Self::load) runs; changing them
/// while open only affects the next load. Dropping the handle closes the
/// library.
///
/// A handle is `Send` (given a `Send` loader) but not `Sync`: callers sharing
/// one across threads must serialize access, e.g. behind a `Mutex`.
pub struct Handle<L: NativeLoader = SystemLoader> {
    loader: L,
    name: String,
    policy: ResolvePolicy,
    options: Options,
    native: Option<NativeRef>,
    last_error: RefCell<String>,
}

impl Handle<SystemLoader> {
    /// A closed handle over the system loader, with process defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::with_loader(SystemLoader)
    }

    /// Create a handle and load `name` (empty for the main program).
    pub fn open(name: &str) -> Result<Self, DlError> {
        Self::open_with(SystemLoader, name)
    }
}

impl Default for Handle<SystemLoader> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: NativeLoader> Handle<L> {
    /// A closed handle over `loader`, starting from [`config::defaults`].
    #[must_use]
    pub fn with_loader(loader: L) -> Self {
        Self::with_defaults(loader, config::defaults())
    }

    #[must_use]
    pub fn with_defaults(loader: L, defaults: LoaderDefaults) -> Self {
        Self {
            loader,
            name: String::new(),
            policy: defaults.policy,
            options: defaults.options,
            native: None,
            last_error: RefCell::new(String::new()),
        }
    }

    pub fn open_with(loader: L, name: &str) -> Result<Self, DlError> {
        let mut handle = Self::with_loader(loader);
        handle.load(name)?;
        Ok(handle)
    }

    // -----------------------------------------------------------------------
    // Configuration
    // -----------------------------------------------------------------------

    pub fn set_resolve_policy(&mut self, policy: ResolvePolicy) {
        self.policy = policy;
    }

    #[must_use]
    pub fn resolve_policy(&self) -> ResolvePolicy {
        self.policy
    }

    /// Replace the option set. `Options::NONE` clears it.
    pub fn set_options(&mut self, options: Options) {
        self.options = options;
    }

    #[must_use]
    pub fn options(&self) -> Options {
        self.options
    }

    /// Mode word the next load passes to the loader.
    #[must_use]
    pub fn flags(&self) -> c_int {
        self.policy | self.options
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Load the library `name`, closing any library already open.
    ///
    /// An empty name opens the main program. On failure the handle is closed,
    /// [`error`](Self::error) holds the loader's message, and
    /// [`lib_name`](Self::lib_name) keeps its previous value.
    ///
    /// With [`Options::GLOBAL`] the library's symbols become visible to every
    /// library loaded afterwards in this process, through any handle.
    pub fn load(&mut self, name: &str) -> Result<(), DlError> {
        self.close();
        self.last_error.get_mut().clear();

        let filename = if name.is_empty() {
            None
        } else {
            match CString::new(name) {
                Ok(c) => Some(c),
                Err(_) => {
                    return Err(self.record(DlError::InvalidName {
                        name: name.to_string(),
                    }));
                }
            }
        };

        let flags = self.flags();
        // Drop whatever an earlier call left pending.
        let _ = self.loader.take_error();

        match self.loader.open(filename.as_deref(), flags) {
            Some(native) => {
                debug!(
                    library = display_name(name),
                    flags = format_args!("{flags:#x}"),
                    native = format_args!("{:#x}", native.addr()),
                    "library loaded"
                );
                self.native = Some(native);
                self.name = name.to_string();
                Ok(())
            }
            None => {
                let message = self.loader.take_error().unwrap_or_else(|| {
                    format!("{}: cannot open shared object", display_name(name))
                });
                debug!(
                    library = display_name(name),
                    flags = format_args!("{flags:#x}"),
                    error = %message,
                    "library load failed"
                );
                Err(self.record(DlError::LoadFailed {
                    name: name.to_string(),
                    message,
                }))
            }
        }
    }

    /// Load [`lib_name`](Self::lib_name) again with the current policy and options.
    pub fn reload(&mut self) -> Result<(), DlError> {
        let name = self.name.clone();
        self.load(&name)
    }

    /// Close the library if open. The handle is closed afterwards even if the
    /// loader reports a failure.
    pub fn close(&mut self) {
        let Some(native) = self.native.take() else {
            return;
        };
        let status = self.loader.close(native);
        if status == 0 {
            debug!(library = display_name(&self.name), "library closed");
        } else {
            let reason = self.loader.take_error();
            warn!(
                library = display_name(&self.name),
                status,
                reason = reason.as_deref().unwrap_or(""),
                "loader reported close failure"
            );
        }
    }

    // -----------------------------------------------------------------------
    // State
    // -----------------------------------------------------------------------

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.native.is_some()
    }

    /// Last recorded error text; empty if none.
    #[must_use]
    pub fn error(&self) -> String {
        self.last_error.borrow().clone()
    }

    /// Name passed to the last successful load (empty for the main program or
    /// if nothing has loaded yet).
    #[must_use]
    pub fn lib_name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn native_ref(&self) -> Option<NativeRef> {
        self.native
    }

    #[must_use]
    pub fn loader(&self) -> &L {
        &self.loader
    }

    // -----------------------------------------------------------------------
    // Symbols
    // -----------------------------------------------------------------------

    /// Resolve `name` to its raw address without assigning it a type.
    ///
    /// A null address with no loader error is a successful resolution.
    pub fn address_of(&self, name: &str) -> Result<*mut c_void, DlError> {
        let Some(native) = self.native else {
            return Err(self.record(DlError::NotOpen));
        };
        let symbol = CString::new(name).map_err(|_| {
            self.record(DlError::InvalidName {
                name: name.to_string(),
            })
        })?;

        let _ = self.loader.take_error();
        let addr = self.loader.symbol(native, &symbol);
        if let Some(message) = self.loader.take_error() {
            debug!(library = display_name(&self.name), symbol = name, error = %message, "symbol lookup failed");
            return Err(self.record(DlError::SymbolNotFound {
                symbol: name.to_string(),
                message,
            }));
        }

        trace!(library = display_name(&self.name), symbol = name, address = ?addr, "symbol resolved");
        Ok(addr)
    }

    /// Resolve `name` as a function of type `F`.
    ///
    /// # Safety
    ///
    /// The exported symbol must be a function whose ABI and signature are
    /// exactly `F`. Calling the result after this handle closes, reloads, or
    /// drops is undefined unless the library was loaded with
    /// [`Options::NO_DELETE`].
    #[allow(unsafe_code)]
    pub unsafe fn lookup<F: FnPtr>(&self, name: &str) -> Result<Symbol<'_, F>, DlError> {
        let addr = self.address_of(name)?;
        // SAFETY: the signature is the caller's declaration; see above.
        let func = unsafe { fn_cast::<F>(addr) };
        Ok(Symbol::new(name, func))
    }

    /// Resolve the factory `name`, call it with `args`, and take ownership of
    /// the object it returns.
    ///
    /// The factory is looked up as `extern "C" fn(args..) -> *mut T` and is
    /// not called if the lookup fails.
    ///
    /// # Safety
    ///
    /// As for [`lookup`](Self::lookup), and additionally the factory must
    /// return null or a pointer obtained from `Box::<T>::into_raw` with an
    /// allocator compatible with this process's global allocator. If `T`'s
    /// code lives in the library, the object must be dropped before the
    /// library is unloaded unless it was loaded with [`Options::NO_DELETE`].
    #[allow(unsafe_code)]
    pub unsafe fn create<T, A: FactoryArgs<T>>(&self, name: &str, args: A) -> Result<Box<T>, DlError> {
        // SAFETY: forwarded to the caller.
        let symbol = unsafe { self.lookup::<A::Factory>(name) }?;
        let Some(factory) = symbol.get() else {
            return Err(self.record(DlError::EmptySymbol {
                symbol: name.to_string(),
            }));
        };

        let raw = factory.invoke(args);
        if raw.is_null() {
            return Err(self.record(DlError::NullObject {
                symbol: name.to_string(),
            }));
        }
        debug!(library = display_name(&self.name), factory = name, "object created");
        // SAFETY: non-null and handed over by the factory per the contract above.
        Ok(unsafe { Box::from_raw(raw) })
    }

    fn record(&self, err: DlError) -> DlError {
        *self.last_error.borrow_mut() = err.diagnostic().into_owned();
        err
    }
}

impl<L: NativeLoader> Drop for Handle<L> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<L: NativeLoader> fmt::Debug for Handle<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .field("options", &self.options)
            .field("native", &self.native)
            .field("last_error", &self.last_error.borrow())
            .finish()
    }
}

fn display_name(name: &str) -> &str {
    if name.is_empty() { "<main program>" } else { name }
}
