//! Hook ordering and context-chain resolution for examples.
//!
//! For an example nested in groups G1 ⊃ G2 ⊃ … ⊃ Gn the chain is:
//!
//! ```text
//! G1.before_all, G1.before, …, Gn.before_all, Gn.before,
//! <example>,
//! Gn.after, Gn.after_all, …, G1.after, G1.after_all
//! ```
//!
//! Within one group, before_all hooks always precede before hooks (and after
//! hooks precede after_all hooks) no matter how their declarations interleave.

use crate::block::{BlockId, BlockKind, BlockTree};

impl BlockTree {
    /// Setup half of the chain: per level, outermost first, `before_all`
    /// hooks then `before` hooks.
    pub fn setup_chain(&self, id: BlockId) -> Vec<BlockId> {
        let mut chain = Vec::new();
        self.traverse_post(id, |block| {
            chain.extend_from_slice(self.before_alls(block));
            chain.extend_from_slice(self.befores(block));
        });
        chain
    }

    /// Teardown half of the chain: per level, innermost first, `after` hooks
    /// then `after_all` hooks.
    pub fn teardown_chain(&self, id: BlockId) -> Vec<BlockId> {
        let mut chain = Vec::new();
        self.traverse_pre(id, |block| {
            chain.extend_from_slice(self.afters(block));
            chain.extend_from_slice(self.after_alls(block));
        });
        chain
    }

    /// Only the per-example `before` hooks, outermost first.
    pub fn collect_ordered_befores(&self, id: BlockId) -> Vec<BlockId> {
        let mut befores = Vec::new();
        self.traverse_post(id, |block| befores.extend_from_slice(self.befores(block)));
        befores
    }

    /// Only the per-example `after` hooks, innermost first.
    pub fn collect_ordered_afters(&self, id: BlockId) -> Vec<BlockId> {
        let mut afters = Vec::new();
        self.traverse_pre(id, |block| afters.extend_from_slice(self.afters(block)));
        afters
    }

    /// The full ordered chain for `example`: setup hooks, the example, then
    /// teardown hooks.
    pub fn hook_chain(&self, example: BlockId) -> Vec<BlockId> {
        debug_assert_eq!(self.kind(example), BlockKind::Example);
        let mut chain = self.setup_chain(example);
        chain.push(example);
        chain.extend(self.teardown_chain(example));
        chain
    }

    /// Blocks whose contexts `id` reads through, outer to inner: every
    /// `before_all` then `before` hook along the ancestor path that currently
    /// owns a context, followed by `id` itself when it owns one.
    pub fn context_chain(&self, id: BlockId) -> Vec<BlockId> {
        let mut chain: Vec<BlockId> = self
            .setup_chain(id)
            .into_iter()
            .filter(|&hook| self.block(hook).has_context())
            .collect();
        if !self.kind(id).is_hook() && self.block(id).has_context() {
            chain.push(id);
        }
        chain
    }
}
