//! Process-wide defaults for new handles.
//!
//! Read from the environment once, on first use:
//! - `DYNLIB_RESOLVE`: `lazy` or `now` (default `now`).
//! - `DYNLIB_OPTIONS`: option list, e.g. `global,no-delete` (default none).
//!
//! Unparseable values fall back to the default and log a warning. Explicit
//! `set_resolve_policy`/`set_options` calls always take precedence.

use std::sync::OnceLock;

use tracing::warn;

use crate::flags::{Options, ResolvePolicy};

pub const RESOLVE_ENV: &str = "DYNLIB_RESOLVE";
pub const OPTIONS_ENV: &str = "DYNLIB_OPTIONS";

/// Policy and options a handle starts with.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoaderDefaults {
    pub policy: ResolvePolicy,
    pub options: Options,
}

impl LoaderDefaults {
    /// Build defaults from raw variable values.
    #[must_use]
    pub fn from_values(resolve: Option<&str>, options: Option<&str>) -> Self {
        let policy = match resolve {
            Some(raw) => ResolvePolicy::from_str_loose(raw).unwrap_or_else(|| {
                warn!(var = RESOLVE_ENV, value = raw, "ignoring unknown resolve policy");
                ResolvePolicy::default()
            }),
            None => ResolvePolicy::default(),
        };
        let options = match options {
            Some(raw) => Options::parse_list(raw).unwrap_or_else(|err| {
                warn!(var = OPTIONS_ENV, value = raw, %err, "ignoring load options");
                Options::default()
            }),
            None => Options::default(),
        };
        Self { policy, options }
    }

    /// Read the current environment (uncached).
    #[must_use]
    pub fn from_env() -> Self {
        let resolve = std::env::var(RESOLVE_ENV).ok();
        let options = std::env::var(OPTIONS_ENV).ok();
        Self::from_values(resolve.as_deref(), options.as_deref())
    }
}

static DEFAULTS: OnceLock<LoaderDefaults> = OnceLock::new();

/// Cached process defaults.
#[must_use]
pub fn defaults() -> LoaderDefaults {
    *DEFAULTS.get_or_init(LoaderDefaults::from_env)
}
