//! Outcomes of invoking blocks and their hierarchical aggregation.

use std::fmt;

use crate::block::{BlockId, BlockKind, BlockTree};
use crate::error::{AssertionFailure, RuntimeFault, SkipSignal};

/// Status of a result. Incomplete is never stored; see
/// [`BlockResult::is_incomplete`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Success,
    Failure,
    Skipped,
    Incomplete,
}

impl Status {
    pub fn label(self) -> &'static str {
        match self {
            Status::Success => "success",
            Status::Failure => "failure",
            Status::Skipped => "skipped",
            Status::Incomplete => "incomplete",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Why a result failed.
#[derive(Debug, Clone)]
pub enum Failure {
    Assertion(AssertionFailure),
    Runtime(RuntimeFault),
    /// Not executed because an earlier link of the same chain failed.
    Aborted { failed: String },
    /// A suite in which `failures` tests failed.
    Group { failures: usize },
}

impl Failure {
    /// Short category name used in reports.
    pub fn category(&self) -> &'static str {
        match self {
            Failure::Assertion(_) => "Assertion Failed",
            Failure::Runtime(_) => "Error",
            Failure::Aborted { .. } => "Aborted",
            Failure::Group { .. } => "Suite Failed",
        }
    }

    pub fn runtime_fault(&self) -> Option<&RuntimeFault> {
        match self {
            Failure::Runtime(fault) => Some(fault),
            _ => None,
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Assertion(a) => write!(f, "{a}"),
            Failure::Runtime(e) => match &e.location {
                Some(location) => write!(f, "{e} ({location})"),
                None => write!(f, "{e}"),
            },
            Failure::Aborted { failed } => write!(f, "not run: `{failed}` failed"),
            Failure::Group { failures } => write!(f, "{failures} test(s) failed"),
        }
    }
}

/// What invoking a block produced.
#[derive(Debug, Clone)]
pub enum Outcome {
    Returned,
    Failed(Failure),
    Skipped(SkipSignal),
}

impl Outcome {
    pub fn status(&self) -> Status {
        match self {
            Outcome::Returned => Status::Success,
            Outcome::Failed(_) => Status::Failure,
            Outcome::Skipped(_) => Status::Skipped,
        }
    }
}

/// Immutable outcome of invoking one block, attributed to an owner.
///
/// A failing `before` hook produces a result owned by its example while the
/// invoked block is the hook itself.
#[derive(Debug, Clone)]
pub struct BlockResult {
    owner: BlockId,
    invoked: BlockId,
    invoked_kind: BlockKind,
    owner_path: String,
    invoked_path: String,
    assertions: usize,
    outcome: Outcome,
}

impl BlockResult {
    pub fn new(
        tree: &BlockTree,
        owner: BlockId,
        invoked: BlockId,
        assertions: usize,
        outcome: Outcome,
    ) -> Self {
        BlockResult {
            owner,
            invoked,
            invoked_kind: tree.kind(invoked),
            owner_path: tree.path(owner),
            invoked_path: tree.path(invoked),
            assertions,
            outcome,
        }
    }

    pub fn owner(&self) -> BlockId {
        self.owner
    }

    pub fn invoked(&self) -> BlockId {
        self.invoked
    }

    pub fn invoked_kind(&self) -> BlockKind {
        self.invoked_kind
    }

    pub fn owner_path(&self) -> &str {
        &self.owner_path
    }

    pub fn invoked_path(&self) -> &str {
        &self.invoked_path
    }

    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    pub fn status(&self) -> Status {
        self.outcome.status()
    }

    pub fn failure(&self) -> Option<&Failure> {
        match &self.outcome {
            Outcome::Failed(failure) => Some(failure),
            _ => None,
        }
    }

    pub fn skip_reason(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Skipped(signal) => signal.reason.as_deref(),
            _ => None,
        }
    }

    pub fn is_example(&self) -> bool {
        self.invoked_kind == BlockKind::Example
    }

    pub fn is_success(&self) -> bool {
        self.status() == Status::Success
    }

    pub fn is_failure(&self) -> bool {
        self.status() == Status::Failure
    }

    pub fn is_skipped(&self) -> bool {
        self.status() == Status::Skipped
    }

    /// True when the invocation recorded no assertions.
    pub fn is_incomplete(&self) -> bool {
        self.assertions == 0
    }

    pub fn assertions(&self) -> usize {
        self.assertions
    }
}

/// A result or a nested result set.
#[derive(Debug, Clone)]
pub enum ResultComponent {
    Result(BlockResult),
    Set(ResultSet),
}

impl ResultComponent {
    fn results(&self) -> Box<dyn Iterator<Item = &BlockResult> + '_> {
        match self {
            ResultComponent::Result(result) => Box::new(std::iter::once(result)),
            ResultComponent::Set(set) => set.results(),
        }
    }
}

/// Ordered, nested collection of results with aggregate queries.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    owner: Option<BlockId>,
    components: Vec<ResultComponent>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// A set scoped to one block, e.g. the results of one example's chain.
    pub fn for_block(owner: BlockId) -> Self {
        ResultSet {
            owner: Some(owner),
            components: Vec::new(),
        }
    }

    pub fn owner(&self) -> Option<BlockId> {
        self.owner
    }

    pub fn add_result(&mut self, result: BlockResult) {
        self.components.push(ResultComponent::Result(result));
    }

    pub fn add_set(&mut self, set: ResultSet) {
        self.components.push(ResultComponent::Set(set));
    }

    pub fn components(&self) -> &[ResultComponent] {
        &self.components
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// The most recently added nested set.
    pub fn last_set(&self) -> Option<&ResultSet> {
        match self.components.last() {
            Some(ResultComponent::Set(set)) => Some(set),
            _ => None,
        }
    }

    /// Every leaf result, depth first.
    pub fn results(&self) -> Box<dyn Iterator<Item = &BlockResult> + '_> {
        Box::new(self.components.iter().flat_map(ResultComponent::results))
    }

    pub fn filter<'s>(
        &'s self,
        mut pred: impl FnMut(&BlockResult) -> bool + 's,
    ) -> impl Iterator<Item = &'s BlockResult> + 's {
        self.results().filter(move |r| pred(*r))
    }

    pub fn total_tests(&self) -> usize {
        self.filter(BlockResult::is_example).count()
    }

    pub fn total_successes(&self) -> usize {
        self.filter(|r| r.is_example() && r.is_success()).count()
    }

    pub fn total_failures(&self) -> usize {
        self.filter(|r| r.is_example() && r.is_failure()).count()
    }

    pub fn total_skipped(&self) -> usize {
        self.filter(|r| r.is_example() && r.is_skipped()).count()
    }

    pub fn total_incomplete(&self) -> usize {
        self.filter(|r| r.is_example() && r.is_success() && r.is_incomplete())
            .count()
    }

    pub fn total_assertions(&self) -> usize {
        self.results().map(BlockResult::assertions).sum()
    }

    /// Root-cause failures: hook and example failures, excluding examples
    /// aborted by an earlier failure and suite-level summaries.
    pub fn failures(&self) -> Vec<&BlockResult> {
        self.filter(|r| {
            matches!(
                r.failure(),
                Some(Failure::Assertion(_)) | Some(Failure::Runtime(_))
            )
        })
        .collect()
    }

    pub fn is_failure(&self) -> bool {
        self.results().any(BlockResult::is_failure)
    }

    pub fn is_skipped(&self) -> bool {
        self.results().any(BlockResult::is_skipped)
    }

    pub fn is_success(&self) -> bool {
        !self.is_failure()
    }

    /// Failure if any result failed, else Skipped if any was skipped, else
    /// Success.
    pub fn status(&self) -> Status {
        if self.is_failure() {
            Status::Failure
        } else if self.is_skipped() {
            Status::Skipped
        } else {
            Status::Success
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> (BlockTree, BlockId, BlockId, BlockId) {
        let mut tree = BlockTree::new("results");
        let root = tree.root();
        let group = tree.add(BlockKind::Describe, Some("g".into()), root, None);
        let before = tree.add(BlockKind::Before, None, group, None);
        let example = tree.add(BlockKind::Example, Some("e".into()), group, None);
        (tree, group, before, example)
    }

    fn failed(message: &str) -> Outcome {
        Outcome::Failed(Failure::Assertion(AssertionFailure::new(message)))
    }

    #[test]
    fn hook_results_do_not_count_as_tests() {
        let (tree, _, before, example) = tree();
        let mut test = ResultSet::for_block(example);
        test.add_result(BlockResult::new(&tree, example, before, 0, failed("setup")));
        test.add_result(BlockResult::new(
            &tree,
            example,
            example,
            0,
            Outcome::Failed(Failure::Aborted {
                failed: tree.path(before),
            }),
        ));

        let mut run = ResultSet::new();
        run.add_set(test);

        assert_eq!(run.total_tests(), 1);
        assert_eq!(run.total_failures(), 1);
        assert_eq!(run.status(), Status::Failure);

        let failures = run.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].owner_path(), "g:e");
        assert_eq!(failures[0].invoked_path(), "g:before");
    }

    #[test]
    fn status_prefers_failure_then_skip() {
        let (tree, _, _, example) = tree();
        let mut set = ResultSet::new();
        assert_eq!(set.status(), Status::Success);

        set.add_result(BlockResult::new(
            &tree,
            example,
            example,
            0,
            Outcome::Skipped(SkipSignal::default()),
        ));
        assert_eq!(set.status(), Status::Skipped);

        set.add_result(BlockResult::new(&tree, example, example, 1, failed("x")));
        assert_eq!(set.status(), Status::Failure);
        assert_eq!(set.total_assertions(), 1);
    }

    #[test]
    fn incomplete_is_derived_from_assertions() {
        let (tree, _, _, example) = tree();
        let quiet = BlockResult::new(&tree, example, example, 0, Outcome::Returned);
        let loud = BlockResult::new(&tree, example, example, 2, Outcome::Returned);
        assert!(quiet.is_incomplete());
        assert!(!loud.is_incomplete());
        assert_eq!(quiet.status(), Status::Success);

        let mut set = ResultSet::new();
        set.add_result(quiet);
        set.add_result(loud);
        assert_eq!(set.total_incomplete(), 1);
        assert_eq!(set.total_successes(), 2);
    }
}
