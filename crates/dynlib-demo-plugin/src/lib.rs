//! Example plugin for dynlib.
//!
//! Built as a `cdylib`, this library exports two symbols:
//! - `create_plugin`: factory returning a [`PluginBox`] through a thin pointer.
//! - `bin_op`: `extern "C" fn(c_int, c_int) -> c_int`, returns `a + b`.
//!
//! The `rlib` form gives hosts the [`Plugin`] interface and the symbol
//! signatures to declare at lookup time.

use std::ffi::c_int;

/// A rendering plugin.
pub trait Plugin {
    fn name(&self) -> String;

    fn render(&self) -> String {
        "Default rendering".to_string()
    }
}

/// Owned plugin object as handed across the library boundary.
///
/// `Box<dyn Plugin>` is a fat pointer; boxing it again gives the factory a
/// thin `*mut PluginBox` return type.
pub type PluginBox = Box<dyn Plugin>;

pub const CREATE_PLUGIN_SYMBOL: &str = "create_plugin";
pub const BIN_OP_SYMBOL: &str = "bin_op";

/// Exported signature of [`create_plugin`].
pub type CreatePluginFn = extern "C" fn() -> *mut PluginBox;
/// Exported signature of [`bin_op`].
pub type BinOpFn = extern "C" fn(c_int, c_int) -> c_int;

struct PluginB;

impl Plugin for PluginB {
    fn name(&self) -> String {
        "plugin_b".to_string()
    }

    fn render(&self) -> String {
        "plugin_b::render()".to_string()
    }
}

/// Factory: ownership of the returned allocation passes to the caller, who
/// must release it with `Box::from_raw`.
#[allow(improper_ctypes_definitions)]
#[unsafe(no_mangle)]
pub extern "C" fn create_plugin() -> *mut PluginBox {
    let plugin: PluginBox = Box::new(PluginB);
    Box::into_raw(Box::new(plugin))
}

#[unsafe(no_mangle)]
pub extern "C" fn bin_op(a: c_int, b: c_int) -> c_int {
    a.wrapping_add(b)
}
