//! Closure-based DSL: `Builder`, `Scope`, and the `Declared` handle.

use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};

use crate::block::{BlockId, BlockKind, BlockTree, Callback};
use crate::context::ContextChain;
use crate::error::{DslError, Verdict};
use crate::invocation::InvocationContext;

// ============================================================================
// Builder: owns the tree under construction
// ============================================================================

/// Builds one suite's [`BlockTree`] from DSL calls.
///
/// ```rust
/// use nestspec::Builder;
///
/// let tree = Builder::build("math", |s| {
///     s.describe("addition", |s| {
///         s.it("adds", |ctx| ctx.expect_eq(2 + 3, 5));
///     });
/// })
/// .unwrap();
/// assert_eq!(tree.find("addition:adds").map(|id| tree.path(id)), Some("addition:adds".into()));
/// ```
pub struct Builder {
    tree: BlockTree,
    invocation: InvocationContext,
    error: Option<DslError>,
}

impl Builder {
    /// Create the root suite, run `body` against it, and return the tree or
    /// the first construction error. A panic inside `body` propagates once the
    /// invocation context is restored.
    pub fn build(
        name: impl Into<String>,
        body: impl FnOnce(&mut Scope<'_>),
    ) -> Result<BlockTree, DslError> {
        let mut builder = Builder {
            tree: BlockTree::new(name),
            invocation: InvocationContext::new(),
            error: None,
        };
        tracing::debug!(suite = builder.tree.name(), "building suite");

        let activation = builder.invocation.activate();
        let root = builder.tree.root();
        builder.invocation.push(root);
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            body(&mut Scope {
                builder: &mut builder,
            })
        }));
        builder.invocation.pop();
        activation.deactivate();

        if let Err(payload) = outcome {
            resume_unwind(payload);
        }
        match builder.error {
            Some(err) => Err(err),
            None => Ok(builder.tree),
        }
    }
}

// ============================================================================
// Scope: the user-facing handle
// ============================================================================

/// The handle DSL bodies receive. Every call registers a block under the
/// group currently being defined.
pub struct Scope<'b> {
    builder: &'b mut Builder,
}

impl Scope<'_> {
    /// The group blocks are currently registered under.
    pub fn current(&self) -> Option<BlockId> {
        self.builder.invocation.active_block()
    }

    /// The tree built so far.
    pub fn tree(&self) -> &BlockTree {
        &self.builder.tree
    }

    // ---- Describe / Context --------------------------------------------------

    pub fn describe(&mut self, name: &str, body: impl FnOnce(&mut Scope<'_>)) -> Declared<'_> {
        self.describe_impl(name, false, body)
    }

    pub fn xdescribe(&mut self, name: &str, body: impl FnOnce(&mut Scope<'_>)) -> Declared<'_> {
        self.describe_impl(name, true, body)
    }

    pub fn context(&mut self, name: &str, body: impl FnOnce(&mut Scope<'_>)) -> Declared<'_> {
        self.describe(name, body)
    }

    pub fn xcontext(&mut self, name: &str, body: impl FnOnce(&mut Scope<'_>)) -> Declared<'_> {
        self.xdescribe(name, body)
    }

    fn describe_impl(
        &mut self,
        name: &str,
        skipped: bool,
        body: impl FnOnce(&mut Scope<'_>),
    ) -> Declared<'_> {
        let id = self.add(BlockKind::Describe, Some(name.to_string()), None, skipped);
        if let Some(id) = id {
            self.builder.invocation.push(id);
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                body(&mut Scope {
                    builder: &mut *self.builder,
                })
            }));
            self.builder.invocation.pop();
            if let Err(payload) = outcome {
                resume_unwind(payload);
            }
        }
        self.declared(id)
    }

    // ---- It / Specify --------------------------------------------------------

    /// Define an example.
    ///
    /// ```rust
    /// # nestspec::Builder::build("doc", |s| {
    /// s.it("works", |ctx| ctx.expect(true, "always"));
    /// s.it("not yet", |_| Ok(())).skip("pending a fix");
    /// # }).unwrap();
    /// ```
    pub fn it(
        &mut self,
        name: &str,
        body: impl Fn(&mut ContextChain<'_>) -> Verdict + 'static,
    ) -> Declared<'_> {
        self.method(BlockKind::Example, Some(name), false, body)
    }

    pub fn xit(
        &mut self,
        name: &str,
        body: impl Fn(&mut ContextChain<'_>) -> Verdict + 'static,
    ) -> Declared<'_> {
        self.method(BlockKind::Example, Some(name), true, body)
    }

    pub fn specify(
        &mut self,
        name: &str,
        body: impl Fn(&mut ContextChain<'_>) -> Verdict + 'static,
    ) -> Declared<'_> {
        self.it(name, body)
    }

    pub fn xspecify(
        &mut self,
        name: &str,
        body: impl Fn(&mut ContextChain<'_>) -> Verdict + 'static,
    ) -> Declared<'_> {
        self.xit(name, body)
    }

    // ---- Hooks ---------------------------------------------------------------

    /// Runs before every example in the current group, nested groups included.
    pub fn before(
        &mut self,
        hook: impl Fn(&mut ContextChain<'_>) -> Verdict + 'static,
    ) -> Declared<'_> {
        self.method(BlockKind::Before, None, false, hook)
    }

    pub fn xbefore(
        &mut self,
        hook: impl Fn(&mut ContextChain<'_>) -> Verdict + 'static,
    ) -> Declared<'_> {
        self.method(BlockKind::Before, None, true, hook)
    }

    pub fn after(
        &mut self,
        hook: impl Fn(&mut ContextChain<'_>) -> Verdict + 'static,
    ) -> Declared<'_> {
        self.method(BlockKind::After, None, false, hook)
    }

    pub fn xafter(
        &mut self,
        hook: impl Fn(&mut ContextChain<'_>) -> Verdict + 'static,
    ) -> Declared<'_> {
        self.method(BlockKind::After, None, true, hook)
    }

    /// Runs once, before the first example of the current group.
    pub fn before_all(
        &mut self,
        hook: impl Fn(&mut ContextChain<'_>) -> Verdict + 'static,
    ) -> Declared<'_> {
        self.method(BlockKind::BeforeAll, None, false, hook)
    }

    pub fn xbefore_all(
        &mut self,
        hook: impl Fn(&mut ContextChain<'_>) -> Verdict + 'static,
    ) -> Declared<'_> {
        self.method(BlockKind::BeforeAll, None, true, hook)
    }

    /// Runs once, after the last example of the current group.
    pub fn after_all(
        &mut self,
        hook: impl Fn(&mut ContextChain<'_>) -> Verdict + 'static,
    ) -> Declared<'_> {
        self.method(BlockKind::AfterAll, None, false, hook)
    }

    pub fn xafter_all(
        &mut self,
        hook: impl Fn(&mut ContextChain<'_>) -> Verdict + 'static,
    ) -> Declared<'_> {
        self.method(BlockKind::AfterAll, None, true, hook)
    }

    fn method(
        &mut self,
        kind: BlockKind,
        name: Option<&str>,
        skipped: bool,
        body: impl Fn(&mut ContextChain<'_>) -> Verdict + 'static,
    ) -> Declared<'_> {
        let callback: Callback = Box::new(body);
        let id = self.add(kind, name.map(str::to_string), Some(callback), skipped);
        self.declared(id)
    }

    /// Register a block under the active group. After the first error every
    /// later call is a no-op.
    fn add(
        &mut self,
        kind: BlockKind,
        name: Option<String>,
        callback: Option<Callback>,
        skipped: bool,
    ) -> Option<BlockId> {
        if self.builder.error.is_some() {
            return None;
        }
        let builder = &mut *self.builder;
        match builder.invocation.get_and_assert_active_group(&builder.tree) {
            Ok(parent) => {
                let id = builder.tree.add(kind, name, parent, callback);
                if skipped {
                    builder.tree.skip(id, None);
                }
                tracing::trace!(kind = %kind, path = %builder.tree.path(id), skipped, "declared");
                Some(id)
            }
            Err(err) => {
                tracing::debug!(kind = %kind, error = %err, "rejected DSL call");
                builder.error = Some(err);
                None
            }
        }
    }

    fn declared(&mut self, id: Option<BlockId>) -> Declared<'_> {
        Declared {
            tree: &mut self.builder.tree,
            id,
        }
    }
}

// ============================================================================
// Declared: handle to a freshly registered block
// ============================================================================

/// Returned by every structural DSL call.
pub struct Declared<'s> {
    tree: &'s mut BlockTree,
    id: Option<BlockId>,
}

impl Declared<'_> {
    /// The new block, or `None` if the call was rejected.
    pub fn id(&self) -> Option<BlockId> {
        self.id
    }

    /// Mark the block skipped. The first reason given sticks.
    pub fn skip(self, reason: impl Into<String>) -> Self {
        if let Some(id) = self.id {
            self.tree.skip(id, Some(reason.into()));
        }
        self
    }
}
