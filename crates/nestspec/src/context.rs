//! Per-block key/value state and the layered view handed to callbacks.

use std::any::Any;
use std::cell::Ref;
use std::collections::HashMap;
use std::fmt::Debug;

use crate::block::BlockId;
use crate::error::{AssertionFailure, Signal, SkipSignal, Verdict};

/// Typed values keyed by name, owned by one block.
pub struct Context {
    owner: BlockId,
    values: HashMap<String, Box<dyn Any>>,
}

impl Context {
    pub fn new(owner: BlockId) -> Self {
        Context {
            owner,
            values: HashMap::new(),
        }
    }

    /// The block this context belongs to.
    pub fn owner(&self) -> BlockId {
        self.owner
    }

    /// A missing key, or a value of another type, reads as `None`.
    pub fn get<T: 'static>(&self, key: &str) -> Option<&T> {
        self.values.get(key).and_then(|v| v.downcast_ref::<T>())
    }

    pub fn get_mut<T: 'static>(&mut self, key: &str) -> Option<&mut T> {
        self.values.get_mut(key).and_then(|v| v.downcast_mut::<T>())
    }

    pub fn set<T: 'static>(&mut self, key: impl Into<String>, value: T) {
        self.values.insert(key.into(), Box::new(value));
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.values.remove(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<&str> = self.keys().collect();
        keys.sort_unstable();
        f.debug_struct("Context")
            .field("owner", &self.owner)
            .field("keys", &keys)
            .finish()
    }
}

/// What a hook or example sees while it runs: read-only outer layers (outer
/// to inner) and the invoked block's own context, the only writable layer.
///
/// ```rust,no_run
/// # fn main() { nestspec::run(|s| {
/// s.describe("counter", |s| {
///     s.before(|ctx| {
///         ctx.set("count", 1u32);
///         Ok(())
///     });
///     s.it("reads outer layers", |ctx| {
///         ctx.expect_eq(ctx.get::<u32>("count").copied(), Some(1))
///     });
/// });
/// # }); }
/// ```
pub struct ContextChain<'a> {
    outer: Vec<Ref<'a, Context>>,
    own: &'a mut Context,
    path: &'a str,
    recorded: usize,
}

impl<'a> ContextChain<'a> {
    pub(crate) fn new(outer: Vec<Ref<'a, Context>>, own: &'a mut Context, path: &'a str) -> Self {
        ContextChain {
            outer,
            own,
            path,
            recorded: 0,
        }
    }

    /// Innermost value for `key`: the own layer first, then outer layers
    /// from the innermost outward.
    pub fn get<T: 'static>(&self, key: &str) -> Option<&T> {
        if let Some(value) = self.own.get::<T>(key) {
            return Some(value);
        }
        self.outer.iter().rev().find_map(|layer| layer.get::<T>(key))
    }

    /// Mutable access, own layer only.
    pub fn get_mut<T: 'static>(&mut self, key: &str) -> Option<&mut T> {
        self.own.get_mut::<T>(key)
    }

    pub fn set<T: 'static>(&mut self, key: impl Into<String>, value: T) {
        self.own.set(key, value);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.own.contains(key) || self.outer.iter().any(|layer| layer.contains(key))
    }

    /// Every visible key, innermost layers first, without duplicates.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = Vec::new();
        let layers = std::iter::once(&*self.own).chain(self.outer.iter().rev().map(|l| &**l));
        for layer in layers {
            for key in layer.keys() {
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }
        keys
    }

    /// Number of layers including the own one.
    pub fn depth(&self) -> usize {
        self.outer.len() + 1
    }

    /// Path of the block being invoked.
    pub fn path(&self) -> &str {
        self.path
    }

    /// Build a skip signal: `return Err(ctx.skip("not on CI"))`.
    pub fn skip(&self, reason: impl Into<String>) -> Signal {
        Signal::Skip(SkipSignal::new(Some(reason.into())))
    }

    // ---- Assertions ----------------------------------------------------------

    /// Assertions recorded by this invocation so far.
    pub fn assertion_count(&self) -> usize {
        self.recorded
    }

    pub(crate) fn recorded(&self) -> usize {
        self.recorded
    }

    pub fn expect(&mut self, condition: bool, message: impl Into<String>) -> Verdict {
        self.recorded += 1;
        if condition {
            Ok(())
        } else {
            Err(Signal::Assertion(AssertionFailure::new(message)))
        }
    }

    pub fn expect_eq<T: PartialEq + Debug>(&mut self, actual: T, expected: T) -> Verdict {
        self.recorded += 1;
        if actual == expected {
            Ok(())
        } else {
            Err(Signal::Assertion(AssertionFailure::new(format!(
                "expected {expected:?}, got {actual:?}"
            ))))
        }
    }

    pub fn expect_ne<T: PartialEq + Debug>(&mut self, actual: T, unexpected: T) -> Verdict {
        self.recorded += 1;
        if actual != unexpected {
            Ok(())
        } else {
            Err(Signal::Assertion(AssertionFailure::new(format!(
                "expected anything but {unexpected:?}"
            ))))
        }
    }

    /// Record a failed assertion unconditionally.
    pub fn fail(&mut self, message: impl Into<String>) -> Verdict {
        self.recorded += 1;
        Err(Signal::Assertion(AssertionFailure::new(message)))
    }

    /// Check `actual` against a googletest matcher.
    #[cfg(feature = "googletest")]
    pub fn expect_that<A, M>(&mut self, actual: A, matcher: M) -> Verdict
    where
        A: Debug + Copy,
        M: googletest::matcher::Matcher<A>,
    {
        use googletest::matcher::MatcherResult;

        self.recorded += 1;
        match matcher.matches(actual) {
            MatcherResult::Match => Ok(()),
            MatcherResult::NoMatch => Err(Signal::Assertion(AssertionFailure::new(format!(
                "Value of: {actual:?}\nExpected: {}\nActual: {}",
                matcher.describe(MatcherResult::Match),
                matcher.explain_match(actual),
            )))),
        }
    }
}
