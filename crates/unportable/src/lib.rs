//! Subprocess bridge for Lua hosts.
//!
//! The host runs `unportable <operation> <token>...`; we decode the tokens
//! against the operation's declared parameters, run it, and print the result
//! as a Lua call expression `_(...)` for the host to `load`. The exit code
//! tells the host whether the call succeeded (0), hit a failed precondition
//! (2) or failed for any other reason (1).

pub mod args;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod fetch;
pub mod lua;
pub mod ops;

pub use args::{ArgDecl, ArgValue, Params};
pub use config::Config;
pub use dispatch::{invoke, Context, Operation, Registry, Reply};
pub use error::{OpError, OpResult};
pub use fetch::{FetchFlags, Fetcher, HttpFetcher};
pub use lua::Value;
