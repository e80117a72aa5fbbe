//! Binding policy and load option flags.
//!
//! Both map one-to-one onto `RTLD_*` values and are ORed into the single
//! mode word handed to the loader.

use std::ffi::c_int;
use std::fmt;
use std::ops::BitOr;
use std::str::FromStr;

use bitflags::bitflags;
use dynlib_abi::dlfcn::{
    RTLD_DEEPBIND, RTLD_GLOBAL, RTLD_LAZY, RTLD_LOCAL, RTLD_NODELETE, RTLD_NOLOAD, RTLD_NOW,
};
use thiserror::Error;

/// When undefined symbols of a library are bound.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolvePolicy {
    /// Bind on first reference.
    Lazy,
    /// Bind everything before `load` returns.
    #[default]
    Now,
}

impl ResolvePolicy {
    /// The `RTLD_*` value.
    #[must_use]
    pub const fn bits(self) -> c_int {
        match self {
            Self::Lazy => RTLD_LAZY,
            Self::Now => RTLD_NOW,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lazy => "lazy",
            Self::Now => "now",
        }
    }

    /// Parse from string (case-insensitive). Unknown values yield `None`.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lazy" | "rtld_lazy" => Some(Self::Lazy),
            "now" | "rtld_now" | "eager" => Some(Self::Now),
            _ => None,
        }
    }
}

impl fmt::Display for ResolvePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolvePolicy {
    type Err = ParseFlagsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_loose(s).ok_or_else(|| ParseFlagsError::UnknownPolicy(s.to_string()))
    }
}

bitflags! {
    /// Modifiers ORed with the binding policy at load time.
    ///
    /// `Options::empty()` is the "none" option set. `LOCAL` is zero on Linux
    /// (it is the default scope) and `DEEP_BIND` is zero where the platform
    /// has no equivalent; both are still accepted and passed through.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Options: c_int {
        /// Export symbols to libraries loaded afterwards, process-wide.
        const GLOBAL = RTLD_GLOBAL;
        /// Keep symbols private to this library.
        const LOCAL = RTLD_LOCAL;
        /// Never unmap the library, even after `close`.
        const NO_DELETE = RTLD_NODELETE;
        /// Only succeed if the library is already resident.
        const NO_LOAD = RTLD_NOLOAD;
        /// Prefer this library's own definitions over global ones.
        const DEEP_BIND = RTLD_DEEPBIND;
    }
}

impl Options {
    /// No modifiers.
    pub const NONE: Self = Self::empty();

    /// True when `self` requests `NO_DELETE` and the platform honors it, so
    /// a library's code stays mapped after its last close.
    ///
    /// `NO_DELETE` is zero where unsupported, and every set contains the
    /// empty set, so `contains` alone would answer yes there.
    #[must_use]
    pub fn keeps_code_mapped(self) -> bool {
        !Self::NO_DELETE.is_empty() && self.contains(Self::NO_DELETE)
    }

    /// Parse a list such as `global,no-delete` or `GLOBAL | NO_DELETE`.
    ///
    /// Separators are `,`, `|` and whitespace; names are case-insensitive and
    /// `-`/`_` are ignored. `none` and the empty string parse to no options.
    pub fn parse_list(s: &str) -> Result<Self, ParseFlagsError> {
        let mut options = Self::empty();
        for raw in s.split(|c: char| c == ',' || c == '|' || c.is_whitespace()) {
            if raw.is_empty() {
                continue;
            }
            let name: String = raw
                .chars()
                .filter(|c| *c != '-' && *c != '_')
                .collect::<String>()
                .to_ascii_lowercase();
            options |= match name.as_str() {
                "none" => Self::empty(),
                "global" => Self::GLOBAL,
                "local" => Self::LOCAL,
                "nodelete" => Self::NO_DELETE,
                "noload" => Self::NO_LOAD,
                "deepbind" => Self::DEEP_BIND,
                _ => return Err(ParseFlagsError::UnknownOption(raw.to_string())),
            };
        }
        Ok(options)
    }
}

impl FromStr for Options {
    type Err = ParseFlagsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_list(s)
    }
}

/// `policy | options` yields the combined loader mode word.
impl BitOr<Options> for ResolvePolicy {
    type Output = c_int;

    fn bitor(self, rhs: Options) -> c_int {
        self.bits() | rhs.bits()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseFlagsError {
    #[error("unknown resolve policy '{0}' (expected lazy or now)")]
    UnknownPolicy(String),
    #[error("unknown load option '{0}'")]
    UnknownOption(String),
}
