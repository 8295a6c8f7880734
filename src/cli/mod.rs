//! # CLI Module
//!
//! Command-line access to route definition files, mostly for checking a
//! file before deploying it.
//!
//! ## Commands
//!
//! ### `routes`
//!
//! ```bash
//! routebind routes --file routes.yaml
//! ```
//!
//! Prints one line per route: id, mapping, handler.
//!
//! ### `match`
//!
//! ```bash
//! routebind match --file routes.yaml -X GET --path /greet/ada -H 'X-Trace: 1'
//! ```
//!
//! Prints the selected handler and path variables, or the match error and
//! the status it maps to.
//!
//! ### `dispatch`
//!
//! ```bash
//! routebind dispatch --file routes.yaml -X POST --path /items \
//!     --content-type application/json --body '{"name": "x"}'
//! ```
//!
//! Runs the full pipeline (admin endpoints included) and prints the
//! response. `--config` (or `ROUTEBIND_CONFIG`) selects an [`crate::config::AppConfig`].

mod commands;

#[cfg(test)]
mod tests;

pub use commands::{run_cli, run_cli_with_writer, Cli, Commands, RequestArgs};
