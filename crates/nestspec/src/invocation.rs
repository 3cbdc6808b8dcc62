//! Active-block resolution for the DSL and the runner.
//!
//! An [`InvocationContext`] is a stack of the blocks currently being defined
//! or executed. Contexts themselves are stacked per thread: activating one
//! makes it the target for DSL calls until its [`Activation`] is dropped, so a
//! suite built and run inside another suite's example never registers blocks
//! in the outer tree.

use std::cell::RefCell;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::block::{BlockId, BlockKind, BlockTree};
use crate::error::DslError;

static NEXT_CONTEXT_ID: AtomicUsize = AtomicUsize::new(1);

thread_local! {
    static ACTIVE_CONTEXTS: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

/// A LIFO stack of active blocks.
#[derive(Debug)]
pub struct InvocationContext {
    id: usize,
    stack: Vec<BlockId>,
}

impl Default for InvocationContext {
    fn default() -> Self {
        Self::new()
    }
}

impl InvocationContext {
    pub fn new() -> Self {
        InvocationContext {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            stack: Vec::new(),
        }
    }

    pub fn push(&mut self, block: BlockId) {
        tracing::trace!(context = self.id, block = block.index(), "push");
        self.stack.push(block);
    }

    pub fn pop(&mut self) -> Option<BlockId> {
        let popped = self.stack.pop();
        tracing::trace!(context = self.id, block = ?popped.map(BlockId::index), "pop");
        popped
    }

    /// Top of the stack.
    pub fn active_block(&self) -> Option<BlockId> {
        self.stack.last().copied()
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Nearest block of `kind` on the stack, innermost first.
    pub fn closest(&self, tree: &BlockTree, kind: BlockKind) -> Option<BlockId> {
        self.stack
            .iter()
            .rev()
            .copied()
            .find(|&block| tree.kind(block) == kind)
    }

    /// Make this context the DSL target for the current thread until the
    /// returned guard is dropped.
    pub fn activate(&self) -> Activation {
        ACTIVE_CONTEXTS.with(|contexts| contexts.borrow_mut().push(self.id));
        Activation { id: self.id }
    }

    /// Whether this context is the innermost active one on this thread.
    pub fn is_active(&self) -> bool {
        ACTIVE_CONTEXTS.with(|contexts| contexts.borrow().last() == Some(&self.id))
    }

    /// Number of contexts currently active on this thread.
    pub fn active_count() -> usize {
        ACTIVE_CONTEXTS.with(|contexts| contexts.borrow().len())
    }

    /// The active block, provided this context is active and the block is a
    /// group (suite or describe). Anything else is a nesting error.
    pub fn get_and_assert_active_group(&self, tree: &BlockTree) -> Result<BlockId, DslError> {
        if !self.is_active() {
            return Err(DslError::InactiveContext);
        }
        match self.active_block() {
            Some(block) if tree.kind(block).is_group() => Ok(block),
            other => Err(DslError::Nesting {
                expected: "describe",
                found: other.map(|b| tree.kind(b)),
            }),
        }
    }

    /// Like [`get_and_assert_active_group`](Self::get_and_assert_active_group)
    /// but for an exact kind.
    pub fn get_and_assert_active_block(
        &self,
        tree: &BlockTree,
        kind: BlockKind,
    ) -> Result<BlockId, DslError> {
        if !self.is_active() {
            return Err(DslError::InactiveContext);
        }
        match self.active_block() {
            Some(block) if tree.kind(block) == kind => Ok(block),
            other => Err(DslError::Nesting {
                expected: kind.label(),
                found: other.map(|b| tree.kind(b)),
            }),
        }
    }
}

/// Guard returned by [`InvocationContext::activate`]; deactivates on drop.
#[must_use = "the context is deactivated as soon as the guard is dropped"]
#[derive(Debug)]
pub struct Activation {
    id: usize,
}

impl Activation {
    pub fn deactivate(self) {}
}

impl Drop for Activation {
    fn drop(&mut self) {
        ACTIVE_CONTEXTS.with(|contexts| {
            let mut contexts = contexts.borrow_mut();
            if let Some(pos) = contexts.iter().rposition(|&id| id == self.id) {
                contexts.remove(pos);
            }
        });
    }
}
