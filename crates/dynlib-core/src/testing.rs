//! Scriptable in-process loader for tests.
//!
//! [`MockLoader`] stands in for the platform loader. It records every call,
//! returns configurable references and symbol addresses, and reports errors
//! through `take_error` with the same read-and-clear semantics as `dlerror`.
//! Clones share state, so a test can keep one clone for inspection while a
//! [`Handle`](crate::Handle) owns another.

use std::collections::HashMap;
use std::ffi::{CStr, c_int, c_void};
use std::sync::Arc;

use dynlib_abi::{FnPtr, NativeLoader, NativeRef};
use parking_lot::Mutex;

/// Reference returned by a successful open unless configured otherwise.
pub const DEFAULT_NATIVE_REF: usize = 0x1;

/// One recorded `open` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenCall {
    /// `None` means the main program was requested.
    pub filename: Option<String>,
    pub flags: c_int,
}

#[derive(Debug)]
struct MockState {
    open_result: usize,
    open_error: Option<String>,
    close_status: c_int,
    symbols: HashMap<String, usize>,
    symbol_error: Option<String>,
    pending_error: Option<String>,
    opens: Vec<OpenCall>,
    closes: Vec<usize>,
    lookups: Vec<String>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            open_result: DEFAULT_NATIVE_REF,
            open_error: None,
            close_status: 0,
            symbols: HashMap::new(),
            symbol_error: None,
            pending_error: None,
            opens: Vec::new(),
            closes: Vec::new(),
            lookups: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockLoader {
    state: Arc<Mutex<MockState>>,
}

impl MockLoader {
    /// Opens succeed with [`DEFAULT_NATIVE_REF`]; no symbols are defined.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make opens succeed, returning `native` as the reference.
    pub fn succeed_open(&self, native: usize) -> &Self {
        assert_ne!(native, 0, "a successful open needs a non-null reference");
        let mut state = self.state.lock();
        state.open_result = native;
        state.open_error = None;
        self
    }

    /// Make opens fail. `message` is what `take_error` reports; `None` leaves
    /// the error text unset, like a loader that fails silently.
    pub fn fail_open(&self, message: Option<&str>) -> &Self {
        let mut state = self.state.lock();
        state.open_result = 0;
        state.open_error = message.map(str::to_string);
        self
    }

    /// Define `name` at a raw address. Address 0 resolves without error.
    pub fn define(&self, name: &str, addr: usize) -> &Self {
        self.state.lock().symbols.insert(name.to_string(), addr);
        self
    }

    /// Define `name` as a real function in this process.
    pub fn define_fn<F: FnPtr>(&self, name: &str, func: F) -> &Self {
        self.define(name, func.addr() as usize)
    }

    /// Make every lookup fail with `message`, defined or not.
    pub fn fail_symbols(&self, message: &str) -> &Self {
        self.state.lock().symbol_error = Some(message.to_string());
        self
    }

    pub fn set_close_status(&self, status: c_int) -> &Self {
        self.state.lock().close_status = status;
        self
    }

    // -- recorded calls ------------------------------------------------------

    #[must_use]
    pub fn opens(&self) -> Vec<OpenCall> {
        self.state.lock().opens.clone()
    }

    #[must_use]
    pub fn closes(&self) -> Vec<usize> {
        self.state.lock().closes.clone()
    }

    #[must_use]
    pub fn lookups(&self) -> Vec<String> {
        self.state.lock().lookups.clone()
    }

    #[must_use]
    pub fn open_count(&self) -> usize {
        self.state.lock().opens.len()
    }

    #[must_use]
    pub fn close_count(&self) -> usize {
        self.state.lock().closes.len()
    }

    #[must_use]
    pub fn lookup_count(&self) -> usize {
        self.state.lock().lookups.len()
    }

    /// Flags passed to the most recent open.
    #[must_use]
    pub fn last_flags(&self) -> Option<c_int> {
        self.state.lock().opens.last().map(|call| call.flags)
    }
}

impl NativeLoader for MockLoader {
    fn open(&self, filename: Option<&CStr>, flags: c_int) -> Option<NativeRef> {
        let mut state = self.state.lock();
        let filename = filename.map(|name| name.to_string_lossy().into_owned());
        state.opens.push(OpenCall { filename, flags });

        if state.open_result == 0 {
            state.pending_error = state.open_error.clone();
            return None;
        }
        NativeRef::from_raw(state.open_result as *mut c_void)
    }

    fn close(&self, handle: NativeRef) -> c_int {
        let mut state = self.state.lock();
        state.closes.push(handle.addr());
        state.close_status
    }

    fn symbol(&self, _handle: NativeRef, symbol: &CStr) -> *mut c_void {
        let mut state = self.state.lock();
        let name = symbol.to_string_lossy().into_owned();
        state.lookups.push(name.clone());

        if let Some(message) = state.symbol_error.clone() {
            state.pending_error = Some(message);
            return std::ptr::null_mut();
        }
        match state.symbols.get(&name) {
            Some(&addr) => addr as *mut c_void,
            None => {
                state.pending_error = Some(format!("undefined symbol: {name}"));
                std::ptr::null_mut()
            }
        }
    }

    fn take_error(&self) -> Option<String> {
        self.state.lock().pending_error.take()
    }
}
