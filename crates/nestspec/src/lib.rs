//! # nestspec: nested describe/it test definitions with ordered hooks
//!
//! Build a tree of `describe` groups, `it` examples and
//! `before`/`after`/`before_all`/`after_all` hooks with an explicit scope
//! handle, then run it with correct hook ordering, per-example context
//! isolation, failure containment and filtering.
//!
//! ## Quick example
//!
//! ```rust,no_run
//! fn main() {
//!     nestspec::run(|s| {
//!         s.describe("Calculator", |s| {
//!             s.before(|ctx| {
//!                 ctx.set("lhs", 2);
//!                 Ok(())
//!             });
//!
//!             s.it("adds two numbers", |ctx| {
//!                 let lhs = ctx.get::<i32>("lhs").copied().unwrap_or_default();
//!                 ctx.expect_eq(lhs + 3, 5)
//!             });
//!
//!             s.context("with negative numbers", |s| {
//!                 s.it("handles negatives", |ctx| ctx.expect_eq(-1 + 1, 0));
//!             });
//!         });
//!     });
//! }
//! ```
//!
//! ## Features
//!
//! - `macros` (default): the `suite!` and `bdd!` DSL macros
//! - `googletest`: `ContextChain::expect_that` and re-exported matchers via
//!   `nestspec::matchers`

mod block;
mod builder;
pub mod config;
mod context;
mod error;
pub mod event;
mod invocation;
mod ordering;
pub mod reporter;
mod result;
pub mod runner;

pub use block::{Ancestors, Block, BlockId, BlockKind, BlockTree, Callback, SkipState};
pub use builder::{Builder, Declared, Scope};
pub use config::{Filter, RunConfig};
pub use context::{Context, ContextChain};
pub use error::{
    AssertionFailure, ConfigError, DslError, Error, IntoVerdict, Result, RuntimeFault, Signal,
    SkipSignal, Verdict,
};
pub use event::{Emitter, Event, EventKind, Listener};
pub use invocation::{Activation, InvocationContext};
pub use reporter::TreeReporter;
pub use result::{BlockResult, Failure, Outcome, ResultComponent, ResultSet, Status};
pub use runner::{SuiteRunner, TestRun};

#[cfg(feature = "macros")]
pub use nestspec_macros::{bdd, suite};

/// Re-export of the [`googletest`] crate. Available with the `googletest` feature.
#[cfg(feature = "googletest")]
pub use googletest;

/// Composable matchers re-exported from [`googletest::prelude`].
#[cfg(feature = "googletest")]
pub mod matchers {
    pub use googletest::prelude::*;
}

use std::path::Path;

use tracing_subscriber::EnvFilter;

// ============================================================================
// Entry points
// ============================================================================

/// Build a suite from `body` and run it with tree output. Exits the process
/// with status 1 if the suite cannot be built or any test fails.
///
/// Meant for `harness = false` test targets; arguments follow
/// [`RunConfig::from_args`].
pub fn run(body: impl FnOnce(&mut Scope<'_>)) {
    init_logging();
    match Builder::build(default_suite_name(), body) {
        Ok(tree) => run_suites(&[tree]),
        Err(err) => {
            eprintln!("nestspec: {err}");
            std::process::exit(1);
        }
    }
}

/// Run several prebuilt suites with tree output and a combined summary.
/// Exits the process with status 1 on failure.
pub fn run_suites(suites: &[BlockTree]) {
    init_logging();
    match execute(suites) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => {
            eprintln!("nestspec: {err}");
            std::process::exit(1);
        }
    }
}

/// Run `suites` per the process configuration. Returns whether the run
/// succeeded.
fn execute(suites: &[BlockTree]) -> Result<bool> {
    let config = RunConfig::from_args()?;
    let filter = config.filter()?;
    tracing::debug!(?config, "configured");

    if config.list {
        for tree in suites {
            for path in reporter::list_examples(tree, &filter) {
                println!("{path}");
            }
        }
        return Ok(true);
    }

    let mut run = TestRun::new();
    run.add_listener(TreeReporter::new(&config));
    Ok(run.run(suites, &filter).is_success())
}

/// Install a stderr `tracing` subscriber filtered by `NESTSPEC_LOG`
/// (default `warn`). Does nothing if a subscriber is already set.
pub fn init_logging() {
    let filter = EnvFilter::try_from_env("NESTSPEC_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// The running binary's name, without the hash cargo appends to test targets.
fn default_suite_name() -> String {
    let name = std::env::args()
        .next()
        .and_then(|arg0| {
            Path::new(&arg0)
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| "suite".to_string());
    match name.rsplit_once('-') {
        Some((stem, hash)) if hash.len() == 16 && hash.chars().all(|c| c.is_ascii_hexdigit()) => {
            stem.to_string()
        }
        _ => name,
    }
}

// ============================================================================
// Skip: runtime test skipping
// ============================================================================

/// Skip the current example or hook with a reason: `return nestspec::skip("later")`.
pub fn skip(reason: impl Into<String>) -> Verdict {
    Err(Signal::skip(reason))
}

/// Skip the current example or hook, returning from the callback.
///
/// ```rust
/// # nestspec::Builder::build("doc", |s| {
/// s.it("needs a database", |_| {
///     if std::env::var("DATABASE_URL").is_err() {
///         nestspec::skip!("no database configured");
///     }
///     Ok(())
/// });
/// # }).unwrap();
/// ```
#[macro_export]
macro_rules! skip {
    () => {
        return ::core::result::Result::Err($crate::Signal::Skip($crate::SkipSignal::default()))
    };
    ($reason:expr) => {
        return $crate::skip($reason)
    };
}
