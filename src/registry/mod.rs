//! Typed, versioned configuration registry.
//!
//! Settings are plain string values under dotted keys (`payment.wallet`,
//! `spam.ban`). Callers read them raw or through a parser, update them, and
//! watch key prefixes for changes. Keys under a sensitive prefix are left out
//! of `export()` and their values are never logged.

mod parse;
mod store;
mod types;
mod watch;

pub use parse::{parse_bool, parse_duration_secs, parse_int, parse_url};
pub use store::ConfigRegistry;
pub use types::{validate_key, RegistryError, RegistryResult, Setting, SettingChange};
