//! # thriftrs CLI
//!
//! Command-line interface for the thriftrs RPC stack.
//!
//! The `thriftrs` binary serves the [`demo`] address book over Framed-JSON
//! and calls it from the command line:
//!
//! - `thriftrs serve`: start the address book server with call tracing
//! - `thriftrs call`: make one RPC call (outputs raw JSON for scripting)

pub mod demo;

/// Environment variable overriding the tracker's client label.
pub const CLIENT_NAME_ENV: &str = "THRIFTRS_CLIENT_NAME";

/// Environment variable overriding the tracker's server label.
pub const SERVER_NAME_ENV: &str = "THRIFTRS_SERVER_NAME";

/// Reads a tracker label from `var`, falling back to `default`.
pub fn label_from_env(var: &str, default: &str) -> String {
    std::env::var(var)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}
