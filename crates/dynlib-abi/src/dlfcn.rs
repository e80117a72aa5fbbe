//! Dynamic linking primitives.
//!
//! Thin pass-through to the platform `dlopen`/`dlclose`/`dlsym`/`dlerror`.
//! There is no policy here: flag words are forwarded verbatim and error text is
//! whatever the loader reports.

use std::ffi::{CStr, c_char, c_int, c_void};
use std::ptr::{self, NonNull};

// ---------------------------------------------------------------------------
// Mode flags
// ---------------------------------------------------------------------------

/// Resolve undefined symbols on first reference.
pub const RTLD_LAZY: c_int = libc::RTLD_LAZY;
/// Resolve all undefined symbols before `dlopen` returns.
pub const RTLD_NOW: c_int = libc::RTLD_NOW;
/// Make the object's symbols available to subsequently loaded objects.
pub const RTLD_GLOBAL: c_int = libc::RTLD_GLOBAL;
/// Keep the object's symbols out of the global namespace.
pub const RTLD_LOCAL: c_int = libc::RTLD_LOCAL;

// Modifier bits come from `libc` wherever it defines them. A 0 means the
// platform has no such mode; callers must check before relying on one.

#[cfg(any(
    target_os = "linux",
    target_os = "android",
    target_vendor = "apple",
    target_os = "freebsd",
    target_os = "dragonfly",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "solaris",
    target_os = "illumos",
))]
const NOLOAD: c_int = libc::RTLD_NOLOAD;
#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_vendor = "apple",
    target_os = "freebsd",
    target_os = "dragonfly",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "solaris",
    target_os = "illumos",
)))]
const NOLOAD: c_int = 0;

#[cfg(any(
    target_os = "linux",
    target_os = "android",
    target_vendor = "apple",
    target_os = "freebsd",
    target_os = "dragonfly",
    target_os = "openbsd",
    target_os = "solaris",
    target_os = "illumos",
))]
const NODELETE: c_int = libc::RTLD_NODELETE;
#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_vendor = "apple",
    target_os = "freebsd",
    target_os = "dragonfly",
    target_os = "openbsd",
    target_os = "solaris",
    target_os = "illumos",
)))]
const NODELETE: c_int = 0;

// glibc only.
#[cfg(all(target_os = "linux", target_env = "gnu"))]
const DEEPBIND: c_int = libc::RTLD_DEEPBIND;
#[cfg(not(all(target_os = "linux", target_env = "gnu")))]
const DEEPBIND: c_int = 0;

/// Do not load the object; succeed only if it is already resident
/// (0 where unsupported).
pub const RTLD_NOLOAD: c_int = NOLOAD;
/// Prefer the object's own definitions over global ones (0 where unsupported).
pub const RTLD_DEEPBIND: c_int = DEEPBIND;
/// Never unmap the object, even after the last `dlclose` (0 where
/// unsupported).
pub const RTLD_NODELETE: c_int = NODELETE;

/// Valid binding mode bits (exactly one of LAZY or NOW must be set).
const BINDING_MASK: c_int = RTLD_LAZY | RTLD_NOW;

/// Valid modifier bits.
const MODIFIER_MASK: c_int = RTLD_GLOBAL | RTLD_LOCAL | RTLD_NOLOAD | RTLD_NODELETE | RTLD_DEEPBIND;

/// Returns `true` if `flags` represent a valid dlopen mode.
///
/// POSIX requires exactly one of RTLD_LAZY or RTLD_NOW to be set.
#[inline]
#[must_use]
pub fn valid_flags(flags: c_int) -> bool {
    let binding = flags & BINDING_MASK;
    let modifiers = flags & !BINDING_MASK;
    (binding == RTLD_LAZY || binding == RTLD_NOW) && (modifiers & !MODIFIER_MASK) == 0
}

// ---------------------------------------------------------------------------
// Native reference
// ---------------------------------------------------------------------------

/// Opaque, non-null reference returned by a successful `dlopen`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeRef(NonNull<c_void>);

// The loader reference is an index into the process-wide link map and is not
// tied to the thread that opened it.
unsafe impl Send for NativeRef {}

impl NativeRef {
    /// Wrap a raw loader reference. Null maps to `None`.
    #[inline]
    #[must_use]
    pub fn from_raw(raw: *mut c_void) -> Option<Self> {
        NonNull::new(raw).map(Self)
    }

    /// Raw pointer form, for passing back to the loader.
    #[inline]
    #[must_use]
    pub fn as_ptr(self) -> *mut c_void {
        self.0.as_ptr()
    }

    /// Numeric form, for logs.
    #[inline]
    #[must_use]
    pub fn addr(self) -> usize {
        self.0.as_ptr() as usize
    }
}

// ---------------------------------------------------------------------------
// Loader capability
// ---------------------------------------------------------------------------

/// The four loader operations a handle needs.
///
/// Implementations follow POSIX semantics: failures are signalled by a null
/// result (or non-zero status) and described by the next [`take_error`] call,
/// which also clears the pending message.
///
/// [`take_error`]: NativeLoader::take_error
pub trait NativeLoader {
    /// Open `filename` (or the main program when `None`) with the given mode.
    fn open(&self, filename: Option<&CStr>, flags: c_int) -> Option<NativeRef>;

    /// Drop one reference to an opened object. Returns 0 on success.
    fn close(&self, handle: NativeRef) -> c_int;

    /// Resolve `symbol` inside `handle`. A null result is only an error if
    /// [`take_error`](NativeLoader::take_error) reports one.
    fn symbol(&self, handle: NativeRef, symbol: &CStr) -> *mut c_void;

    /// Return and clear the most recent loader error on this thread.
    fn take_error(&self) -> Option<String>;
}

/// The platform loader, via `libc`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SystemLoader;

impl NativeLoader for SystemLoader {
    fn open(&self, filename: Option<&CStr>, flags: c_int) -> Option<NativeRef> {
        let name = filename.map_or(ptr::null(), CStr::as_ptr);
        // SAFETY: `name` is null or a NUL-terminated string that outlives the call.
        NativeRef::from_raw(unsafe { libc::dlopen(name, flags) })
    }

    fn close(&self, handle: NativeRef) -> c_int {
        // SAFETY: `handle` came from a successful `dlopen` and is closed at most
        // once by its owner.
        unsafe { libc::dlclose(handle.as_ptr()) }
    }

    fn symbol(&self, handle: NativeRef, symbol: &CStr) -> *mut c_void {
        // SAFETY: `handle` is open and `symbol` is NUL-terminated.
        unsafe { libc::dlsym(handle.as_ptr(), symbol.as_ptr()) }
    }

    fn take_error(&self) -> Option<String> {
        // SAFETY: `dlerror` returns null or a NUL-terminated string that stays
        // valid until the next loader call on this thread; it is copied out
        // immediately.
        let msg: *const c_char = unsafe { libc::dlerror() };
        if msg.is_null() {
            return None;
        }
        Some(unsafe { CStr::from_ptr(msg) }.to_string_lossy().into_owned())
    }
}
