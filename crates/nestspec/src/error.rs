//! Error taxonomy: construction errors, configuration errors, and the
//! [`Signal`] sum type that hook and example callbacks return.

use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Once};

use thiserror::Error;

use crate::block::BlockKind;

/// Crate-level result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error for operations that can abort a whole run.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Dsl(#[from] DslError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// A structural DSL call made against the wrong target. Fatal to suite
/// construction; never captured per test.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DslError {
    #[error("improperly nested block: expected a {expected}, got {}", .found.map(|k| k.label()).unwrap_or("nothing"))]
    Nesting {
        expected: &'static str,
        found: Option<BlockKind>,
    },
    #[error("DSL call made against an invocation context that is not active")]
    InactiveContext,
}

/// Invalid run configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {which} pattern `{pattern}`: {source}")]
    InvalidPattern {
        which: &'static str,
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("missing value for `{0}`")]
    MissingValue(String),
    #[error("invalid value `{value}` for `{flag}`")]
    InvalidValue { flag: String, value: String },
}

/// An expectation did not hold.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct AssertionFailure {
    pub message: String,
}

impl AssertionFailure {
    pub fn new(message: impl Into<String>) -> Self {
        AssertionFailure {
            message: message.into(),
        }
    }
}

/// A deliberate request to skip. Never treated as a failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Error)]
#[error("skipped{}", .reason.as_deref().map(|r| format!(": {r}")).unwrap_or_default())]
pub struct SkipSignal {
    pub reason: Option<String>,
}

impl SkipSignal {
    pub fn new(reason: Option<String>) -> Self {
        SkipSignal { reason }
    }
}

/// Any other unexpected fault: a returned error or a panic, with its origin
/// preserved for diagnostics.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct RuntimeFault {
    pub message: String,
    /// `file:line:column` of a panic, when known.
    pub location: Option<String>,
    #[source]
    cause: Option<Arc<dyn std::error::Error + Send + Sync>>,
    trace: Option<Arc<Backtrace>>,
}

impl RuntimeFault {
    pub fn new(message: impl Into<String>) -> Self {
        RuntimeFault {
            message: message.into(),
            location: None,
            cause: None,
            trace: None,
        }
    }

    /// Wrap an error returned from a callback.
    pub fn from_error(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        RuntimeFault {
            message: err.to_string(),
            location: None,
            cause: Some(Arc::new(err)),
            trace: Some(Arc::new(Backtrace::capture())),
        }
    }

    /// Build from a caught panic payload, picking up the location and trace
    /// recorded by [`capture_panics`] when it was installed.
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = panic_message(payload.as_ref());
        let captured = LAST_PANIC.with(|last| last.borrow_mut().take());
        match captured {
            Some(CapturedPanic { location, trace }) => RuntimeFault {
                message,
                location,
                cause: None,
                trace: Some(Arc::new(trace)),
            },
            None => RuntimeFault::new(message),
        }
    }

    /// The originating error, if this fault wraps one.
    pub fn cause(&self) -> Option<&(dyn std::error::Error + Send + Sync)> {
        self.cause.as_deref()
    }

    pub fn backtrace(&self) -> Option<&Backtrace> {
        self.trace.as_deref()
    }

    /// The first `depth` frames of the captured trace, one per line. Empty when
    /// backtraces are disabled.
    pub fn trace_lines(&self, depth: usize) -> Vec<String> {
        let Some(trace) = self.trace.as_deref() else {
            return Vec::new();
        };
        if trace.status() != BacktraceStatus::Captured {
            return Vec::new();
        }
        trace
            .to_string()
            .lines()
            .map(str::trim)
            .filter(|line| !line.starts_with("at "))
            .take(depth)
            .map(str::to_string)
            .collect()
    }
}

/// What a hook or example callback returns when it does not succeed.
///
/// Any `std::error::Error` converts into a `Signal` via `?`. An error that
/// already is an [`AssertionFailure`] or a [`SkipSignal`] keeps its meaning;
/// everything else becomes a [`RuntimeFault`].
#[derive(Debug, Clone)]
pub enum Signal {
    Assertion(AssertionFailure),
    Skip(SkipSignal),
    Fault(RuntimeFault),
}

impl Signal {
    pub fn skip(reason: impl Into<String>) -> Self {
        Signal::Skip(SkipSignal::new(Some(reason.into())))
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Signal::Assertion(AssertionFailure::new(message))
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Assertion(a) => write!(f, "assertion failed: {a}"),
            Signal::Skip(s) => write!(f, "{s}"),
            Signal::Fault(e) => write!(f, "{e}"),
        }
    }
}

impl<E> From<E> for Signal
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(err: E) -> Self {
        let boxed: Box<dyn std::error::Error + Send + Sync> = Box::new(err);
        let boxed = match boxed.downcast::<AssertionFailure>() {
            Ok(assertion) => return Signal::Assertion(*assertion),
            Err(other) => other,
        };
        let boxed = match boxed.downcast::<SkipSignal>() {
            Ok(skip) => return Signal::Skip(*skip),
            Err(other) => other,
        };
        match boxed.downcast::<RuntimeFault>() {
            Ok(fault) => Signal::Fault(*fault),
            Err(other) => Signal::Fault(RuntimeFault {
                message: other.to_string(),
                location: None,
                cause: Some(Arc::from(other)),
                trace: Some(Arc::new(Backtrace::capture())),
            }),
        }
    }
}

/// What a hook or example callback returns.
pub type Verdict = std::result::Result<(), Signal>;

/// Values a DSL body may end with: nothing, or a [`Verdict`] that decides
/// the outcome.
pub trait IntoVerdict {
    fn into_verdict(self) -> Verdict;
}

impl IntoVerdict for () {
    fn into_verdict(self) -> Verdict {
        Ok(())
    }
}

impl IntoVerdict for Verdict {
    fn into_verdict(self) -> Verdict {
        self
    }
}

// ============================================================================
// Panic bridge
// ============================================================================

struct CapturedPanic {
    location: Option<String>,
    trace: Backtrace,
}

thread_local! {
    static LAST_PANIC: RefCell<Option<CapturedPanic>> = const { RefCell::new(None) };
    /// Nesting depth of `capture_panics` on this thread.
    static CAPTURING: Cell<usize> = const { Cell::new(0) };
}

static INSTALL_HOOK: Once = Once::new();

/// Install the process-wide recording hook, once. Threads that are not
/// capturing fall through to whatever hook was set before.
fn install_hook() {
    INSTALL_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if CAPTURING.with(Cell::get) == 0 {
                return previous(info);
            }
            let location = info
                .location()
                .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()));
            let trace = Backtrace::capture();
            LAST_PANIC.with(|last| {
                *last.borrow_mut() = Some(CapturedPanic { location, trace });
            });
        }));
    });
}

/// Run `f` with panics on this thread recorded (location and trace) instead
/// of printed. Other threads keep their usual panic output.
pub(crate) fn capture_panics<R>(f: impl FnOnce() -> R) -> R {
    install_hook();
    CAPTURING.with(|depth| depth.set(depth.get() + 1));
    let outcome = panic::catch_unwind(AssertUnwindSafe(f));
    CAPTURING.with(|depth| depth.set(depth.get().saturating_sub(1)));
    match outcome {
        Ok(value) => value,
        Err(payload) => panic::resume_unwind(payload),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
