//! Untyped address to typed function pointer.
//!
//! The loader hands back `*mut c_void`; there is no type information attached.
//! [`fn_cast`] is the one place that reinterprets such an address as a
//! function pointer. Nothing is checked: the declared signature is trusted.
//!
//! Supported pointer kinds, each for arities 0 through 6:
//!
//! | Kind | [`FnPtr`] | [`Invoke`] |
//! |---|---|---|
//! | `extern "C" fn(..) -> R` | yes | yes |
//! | `fn(..) -> R` | yes | yes |
//! | `unsafe extern "C" fn(..) -> R` | yes | no (call it directly inside `unsafe`) |

use std::ffi::c_void;
use std::mem;
use std::ptr::NonNull;

/// A function pointer type that can be produced from a resolved address.
///
/// # Safety
///
/// Implementors must be exactly pointer-sized function pointer types.
pub unsafe trait FnPtr: Copy {
    /// Parameter list as a tuple.
    type Args;
    /// Return type.
    type Output;

    /// Reinterpret `addr` as this function pointer type.
    ///
    /// # Safety
    ///
    /// `addr` must be the entry point of a function whose ABI, parameter
    /// types and return type are exactly those of `Self`.
    unsafe fn from_addr(addr: NonNull<c_void>) -> Self;

    /// The entry point address.
    fn addr(self) -> *const c_void;
}

/// Call a function pointer with its arguments packed in a tuple.
pub trait Invoke: FnPtr {
    fn invoke(self, args: Self::Args) -> Self::Output;
}

/// Convert a resolved symbol address into a typed function pointer.
///
/// A null address yields `None` (the empty callable) rather than a pointer that
/// faults on first call.
///
/// # Safety
///
/// If `addr` is non-null it must point to a function matching `F` exactly, and
/// the code it points to must stay mapped for as long as the returned pointer
/// is called. Neither condition can be verified here.
#[inline]
pub unsafe fn fn_cast<F: FnPtr>(addr: *mut c_void) -> Option<F> {
    NonNull::new(addr).map(|addr| unsafe { F::from_addr(addr) })
}

macro_rules! fn_ptr_impls {
    ($($A:ident $a:ident),*) => {
        fn_ptr_impls!(@ptr [extern "C" fn($($A),*) -> R] $($A),*);
        fn_ptr_impls!(@ptr [unsafe extern "C" fn($($A),*) -> R] $($A),*);
        fn_ptr_impls!(@ptr [fn($($A),*) -> R] $($A),*);
        fn_ptr_impls!(@invoke [extern "C" fn($($A),*) -> R] $($A $a),*);
        fn_ptr_impls!(@invoke [fn($($A),*) -> R] $($A $a),*);
    };

    (@ptr [$($ty:tt)*] $($A:ident),*) => {
        unsafe impl<R, $($A),*> FnPtr for $($ty)* {
            type Args = ($($A,)*);
            type Output = R;

            #[inline]
            unsafe fn from_addr(addr: NonNull<c_void>) -> Self {
                debug_assert_eq!(mem::size_of::<Self>(), mem::size_of::<*mut c_void>());
                unsafe { mem::transmute_copy::<*mut c_void, Self>(&addr.as_ptr()) }
            }

            #[inline]
            fn addr(self) -> *const c_void {
                self as *const c_void
            }
        }
    };

    (@invoke [$($ty:tt)*] $($A:ident $a:ident),*) => {
        impl<R, $($A),*> Invoke for $($ty)* {
            #[inline]
            fn invoke(self, ($($a,)*): Self::Args) -> R {
                self($($a),*)
            }
        }
    };
}

fn_ptr_impls!();
fn_ptr_impls!(A0 a0);
fn_ptr_impls!(A0 a0, A1 a1);
fn_ptr_impls!(A0 a0, A1 a1, A2 a2);
fn_ptr_impls!(A0 a0, A1 a1, A2 a2, A3 a3);
fn_ptr_impls!(A0 a0, A1 a1, A2 a2, A3 a3, A4 a4);
fn_ptr_impls!(A0 a0, A1 a1, A2 a2, A3 a3, A4 a4, A5 a5);

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::c_int;
    use std::ptr;

    extern "C" fn load_me(_a: c_int, _b: u8) {}

    extern "C" fn bin_op(a: c_int, b: c_int) -> c_int {
        a + b
    }

    extern "C" fn answer() -> c_int {
        42
    }

    fn rust_abi_scale(x: u64, by: u64) -> u64 {
        x * by
    }

    unsafe extern "C" fn deref(p: *const c_int) -> c_int {
        unsafe { *p }
    }

    #[test]
    fn valid_pointer_converts_to_callable() {
        let f = unsafe { fn_cast::<extern "C" fn(c_int, u8)>(load_me as *mut c_void) };
        assert!(f.is_some());
        f.unwrap()(1, b'x');
    }

    #[test]
    fn null_pointer_converts_to_empty() {
        let f = unsafe { fn_cast::<extern "C" fn(c_int, u8)>(ptr::null_mut()) };
        assert!(f.is_none());
    }

    #[test]
    fn converted_pointer_calls_through() {
        let f = unsafe { fn_cast::<extern "C" fn(c_int, c_int) -> c_int>(bin_op as *mut c_void) }
            .unwrap();
        assert_eq!(f(1, 2), 3);
        assert_eq!(f.invoke((20, 22)), 42);
        assert_eq!(f.addr(), bin_op as *const c_void);
    }

    #[test]
    fn zero_arity_invoke_takes_unit() {
        let f = unsafe { fn_cast::<extern "C" fn() -> c_int>(answer as *mut c_void) }.unwrap();
        assert_eq!(f.invoke(()), 42);
    }

    #[test]
    fn rust_abi_pointers_convert() {
        let f = unsafe { fn_cast::<fn(u64, u64) -> u64>(rust_abi_scale as *mut c_void) }.unwrap();
        assert_eq!(f.invoke((6, 7)), 42);
    }

    #[test]
    fn unsafe_pointers_convert() {
        let f = unsafe {
            fn_cast::<unsafe extern "C" fn(*const c_int) -> c_int>(deref as *mut c_void)
        }
        .unwrap();
        let v: c_int = 9;
        assert_eq!(unsafe { f(&v) }, 9);
    }
}
