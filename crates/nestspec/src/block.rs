//! The test tree: a closed set of block kinds stored in an arena.
//!
//! Every node (suite, describe, hook, example) is a [`Block`] addressed by a
//! [`BlockId`]. Children are grouped by kind and keep declaration order within
//! each kind.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;

use crate::context::{Context, ContextChain};
use crate::error::Verdict;
use crate::result::Outcome;

/// Callback type for hooks and examples.
pub type Callback = Box<dyn Fn(&mut ContextChain<'_>) -> Verdict>;

/// Index of a block inside its [`BlockTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(pub(crate) usize);

impl BlockId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// The kind of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BlockKind {
    Suite,
    Describe,
    BeforeAll,
    Before,
    Example,
    After,
    AfterAll,
}

impl BlockKind {
    pub fn label(self) -> &'static str {
        match self {
            BlockKind::Suite => "suite",
            BlockKind::Describe => "describe",
            BlockKind::BeforeAll => "before_all",
            BlockKind::Before => "before",
            BlockKind::Example => "example",
            BlockKind::After => "after",
            BlockKind::AfterAll => "after_all",
        }
    }

    /// Suite and Describe: blocks that may contain other blocks.
    pub fn is_group(self) -> bool {
        matches!(self, BlockKind::Suite | BlockKind::Describe)
    }

    pub fn is_hook(self) -> bool {
        matches!(
            self,
            BlockKind::BeforeAll | BlockKind::Before | BlockKind::After | BlockKind::AfterAll
        )
    }

    /// BeforeAll and AfterAll run at most once per declaring group.
    pub fn runs_once(self) -> bool {
        matches!(self, BlockKind::BeforeAll | BlockKind::AfterAll)
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Skip marking of a block. Unset until someone skips it; the first reason
/// given wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SkipState {
    #[default]
    Unset,
    Skipped { reason: Option<String> },
}

/// A node of the test tree.
pub struct Block {
    id: BlockId,
    kind: BlockKind,
    name: Option<String>,
    parent: Option<BlockId>,
    children: BTreeMap<BlockKind, Vec<BlockId>>,
    skip: SkipState,
    assertions: Cell<usize>,
    context: RefCell<Option<Context>>,
    callback: Option<Callback>,
    recorded: RefCell<Option<Outcome>>,
}

impl Block {
    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn kind(&self) -> BlockKind {
        self.kind
    }

    /// The declared name. Hooks have none.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The declared name, or the kind label for hooks.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(self.kind.label())
    }

    pub fn parent(&self) -> Option<BlockId> {
        self.parent
    }

    pub fn skip_state(&self) -> &SkipState {
        &self.skip
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.skip, SkipState::Skipped { .. })
    }

    pub fn skip_reason(&self) -> Option<&str> {
        match &self.skip {
            SkipState::Skipped { reason } => reason.as_deref(),
            SkipState::Unset => None,
        }
    }

    pub fn assertion_count(&self) -> usize {
        self.assertions.get()
    }

    pub(crate) fn add_assertions(&self, n: usize) {
        self.assertions.set(self.assertions.get() + n);
    }

    pub(crate) fn callback(&self) -> Option<&Callback> {
        self.callback.as_ref()
    }

    pub(crate) fn context_cell(&self) -> &RefCell<Option<Context>> {
        &self.context
    }

    /// Whether this block currently owns a context.
    pub fn has_context(&self) -> bool {
        self.context.borrow().is_some()
    }

    /// Take the block's context for an invocation. BeforeAll keeps its
    /// context across invocations; every other block starts fresh.
    pub(crate) fn take_context(&self) -> Context {
        let existing = self.context.borrow_mut().take();
        match existing {
            Some(ctx) if self.kind == BlockKind::BeforeAll => ctx,
            _ => Context::new(self.id),
        }
    }

    pub(crate) fn store_context(&self, context: Context) {
        *self.context.borrow_mut() = Some(context);
    }

    pub(crate) fn clear_context(&self) {
        self.context.borrow_mut().take();
    }

    /// The memoized outcome of a run-once hook.
    pub fn recorded(&self) -> Option<Outcome> {
        self.recorded.borrow().clone()
    }

    pub(crate) fn record(&self, outcome: Outcome) {
        let mut slot = self.recorded.borrow_mut();
        if slot.is_none() {
            *slot = Some(outcome);
        }
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("skip", &self.skip)
            .field("assertions", &self.assertions.get())
            .finish_non_exhaustive()
    }
}

/// Arena holding one suite's blocks. Index 0 is always the root Suite.
pub struct BlockTree {
    blocks: Vec<Block>,
}

impl BlockTree {
    pub fn new(name: impl Into<String>) -> Self {
        let mut tree = BlockTree { blocks: Vec::new() };
        tree.push(BlockKind::Suite, Some(name.into()), None, None);
        tree
    }

    pub fn root(&self) -> BlockId {
        BlockId(0)
    }

    /// The suite's own name (not part of any path).
    pub fn name(&self) -> &str {
        self.block(self.root()).display_name()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.len() <= 1
    }

    /// The block behind `id`.
    ///
    /// # Panics
    ///
    /// If `id` was not issued by this tree. Use [`get`](Self::get) for ids of
    /// unknown origin.
    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.0]
    }

    /// The block behind `id`, or `None` if this tree never issued it.
    pub fn get(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(id.0)
    }

    /// Kind of the block behind `id`. Panics like [`block`](Self::block).
    pub fn kind(&self, id: BlockId) -> BlockKind {
        self.block(id).kind
    }

    pub fn iter(&self) -> impl Iterator<Item = &Block> {
        self.blocks.iter()
    }

    /// Create a block under `parent` and register it with the parent's
    /// children of the same kind.
    pub fn add(
        &mut self,
        kind: BlockKind,
        name: Option<String>,
        parent: BlockId,
        callback: Option<Callback>,
    ) -> BlockId {
        let id = self.push(kind, name, Some(parent), callback);
        self.add_to_parent(id);
        id
    }

    fn push(
        &mut self,
        kind: BlockKind,
        name: Option<String>,
        parent: Option<BlockId>,
        callback: Option<Callback>,
    ) -> BlockId {
        let id = BlockId(self.blocks.len());
        self.blocks.push(Block {
            id,
            kind,
            name,
            parent,
            children: BTreeMap::new(),
            skip: SkipState::Unset,
            assertions: Cell::new(0),
            context: RefCell::new(None),
            callback,
            recorded: RefCell::new(None),
        });
        id
    }

    fn add_to_parent(&mut self, id: BlockId) {
        let Some(parent) = self.blocks[id.0].parent else {
            return;
        };
        let kind = self.blocks[id.0].kind;
        self.blocks[parent.0]
            .children
            .entry(kind)
            .or_default()
            .push(id);
    }

    /// Move `id` under `new_parent`, keeping it last among its kind there.
    pub fn reparent(&mut self, id: BlockId, new_parent: BlockId) {
        let kind = self.kind(id);
        if let Some(old) = self.blocks[id.0].parent {
            if let Some(siblings) = self.blocks[old.0].children.get_mut(&kind) {
                siblings.retain(|&child| child != id);
            }
        }
        self.blocks[id.0].parent = Some(new_parent);
        self.add_to_parent(id);
    }

    // ---- Children ------------------------------------------------------------

    pub fn children(&self, id: BlockId, kind: BlockKind) -> &[BlockId] {
        self.block(id)
            .children
            .get(&kind)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn examples(&self, id: BlockId) -> &[BlockId] {
        self.children(id, BlockKind::Example)
    }

    pub fn describes(&self, id: BlockId) -> &[BlockId] {
        self.children(id, BlockKind::Describe)
    }

    pub fn befores(&self, id: BlockId) -> &[BlockId] {
        self.children(id, BlockKind::Before)
    }

    pub fn afters(&self, id: BlockId) -> &[BlockId] {
        self.children(id, BlockKind::After)
    }

    pub fn before_alls(&self, id: BlockId) -> &[BlockId] {
        self.children(id, BlockKind::BeforeAll)
    }

    pub fn after_alls(&self, id: BlockId) -> &[BlockId] {
        self.children(id, BlockKind::AfterAll)
    }

    // ---- Skipping ------------------------------------------------------------

    /// Mark `id` skipped. Idempotent: the first reason sticks.
    pub fn skip(&mut self, id: BlockId, reason: Option<String>) {
        let block = &mut self.blocks[id.0];
        if !block.is_skipped() {
            block.skip = SkipState::Skipped { reason };
        }
    }

    /// Whether `id` itself or any ancestor is skipped.
    pub fn has_skipped_ancestors(&self, id: BlockId) -> bool {
        self.ancestors(id).any(|a| self.block(a).is_skipped())
    }

    /// Reason given by the nearest skipped block from `id` upward.
    pub fn inherited_skip_reason(&self, id: BlockId) -> Option<&str> {
        self.ancestors(id)
            .map(|a| self.block(a))
            .find(|b| b.is_skipped())
            .and_then(Block::skip_reason)
    }

    // ---- Traversal -----------------------------------------------------------

    /// `id` and its ancestors, innermost first.
    pub fn ancestors(&self, id: BlockId) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            next: Some(id),
        }
    }

    /// Number of ancestors above `id`.
    pub fn depth(&self, id: BlockId) -> usize {
        self.ancestors(id).count() - 1
    }

    /// `:`-joined names from below the root down to `id`. The root itself has
    /// no segment.
    pub fn path(&self, id: BlockId) -> String {
        let mut names: Vec<&str> = self
            .ancestors(id)
            .filter(|&a| self.block(a).parent.is_some())
            .map(|a| self.block(a).display_name())
            .collect();
        names.reverse();
        names.join(":")
    }

    /// Nearest block of `kind`, starting at `id` itself.
    pub fn closest(&self, id: BlockId, kind: BlockKind) -> Option<BlockId> {
        self.ancestors(id).find(|&a| self.kind(a) == kind)
    }

    pub fn closest_example(&self, id: BlockId) -> Option<BlockId> {
        self.closest(id, BlockKind::Example)
    }

    pub fn closest_suite(&self, id: BlockId) -> Option<BlockId> {
        self.closest(id, BlockKind::Suite)
    }

    /// Visit the root first, then each ancestor down to `id`.
    pub fn traverse_post(&self, id: BlockId, mut f: impl FnMut(BlockId)) {
        let mut chain: Vec<BlockId> = self.ancestors(id).collect();
        chain.reverse();
        for block in chain {
            f(block);
        }
    }

    /// Visit `id` first, then each ancestor up to the root.
    pub fn traverse_pre(&self, id: BlockId, mut f: impl FnMut(BlockId)) {
        for block in self.ancestors(id) {
            f(block);
        }
    }

    /// Find a block by its full path. Groups are searched before descending;
    /// the first match wins.
    pub fn find(&self, path: &str) -> Option<BlockId> {
        self.find_from(self.root(), path)
    }

    fn find_from(&self, group: BlockId, path: &str) -> Option<BlockId> {
        if self.path(group) == path {
            return Some(group);
        }
        if let Some(&example) = self.examples(group).iter().find(|&&e| self.path(e) == path) {
            return Some(example);
        }
        self.describes(group)
            .iter()
            .find_map(|&describe| self.find_from(describe, path))
    }

    /// Every example in run order: a group's own examples before its nested
    /// describes, recursively.
    pub fn examples_in_run_order(&self) -> Vec<BlockId> {
        let mut out = Vec::new();
        self.collect_examples(self.root(), &mut out);
        out
    }

    fn collect_examples(&self, group: BlockId, out: &mut Vec<BlockId>) {
        out.extend_from_slice(self.examples(group));
        for &describe in self.describes(group) {
            self.collect_examples(describe, out);
        }
    }

    fn fmt_group(&self, f: &mut fmt::Formatter<'_>, group: BlockId, depth: usize) -> fmt::Result {
        let indent = "  ".repeat(depth);
        for kind in [
            BlockKind::BeforeAll,
            BlockKind::Before,
            BlockKind::After,
            BlockKind::AfterAll,
            BlockKind::Example,
        ] {
            for &child in self.children(group, kind) {
                let block = self.block(child);
                let marker = if block.is_skipped() { " (skipped)" } else { "" };
                match kind {
                    BlockKind::Example => writeln!(f, "{indent}it {}{marker}", block.display_name())?,
                    _ => writeln!(f, "{indent}{}{marker}", kind.label())?,
                }
            }
        }
        for &describe in self.describes(group) {
            let block = self.block(describe);
            let marker = if block.is_skipped() { " (skipped)" } else { "" };
            writeln!(f, "{indent}describe {}{marker}", block.display_name())?;
            self.fmt_group(f, describe, depth + 1)?;
        }
        Ok(())
    }
}

/// Indented outline of the tree, in run order.
impl fmt::Display for BlockTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_group(f, self.root(), 0)
    }
}

impl fmt::Debug for BlockTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.blocks.iter()).finish()
    }
}

/// Iterator over a block and its ancestors, innermost first.
pub struct Ancestors<'t> {
    tree: &'t BlockTree,
    next: Option<BlockId>,
}

impl Iterator for Ancestors<'_> {
    type Item = BlockId;

    fn next(&mut self) -> Option<BlockId> {
        let current = self.next?;
        self.next = self.tree.block(current).parent;
        Some(current)
    }
}
