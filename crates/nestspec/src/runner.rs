//! Executes block trees: hook chains, failure containment, and events.
//!
//! A [`SuiteRunner`] walks one tree depth first, a group's own examples
//! before its nested describes. Each example runs through its hook chain
//! inside a fresh [`ResultSet`]; every invocation is captured as a
//! [`BlockResult`] owned by the example.

use std::cell::Ref;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::block::{BlockId, BlockKind, BlockTree};
use crate::config::Filter;
use crate::context::{Context, ContextChain};
use crate::error::{capture_panics, RuntimeFault, Signal, SkipSignal};
use crate::event::{Emitter, Event, EventKind, Listener};
use crate::invocation::InvocationContext;
use crate::result::{BlockResult, Failure, Outcome, ResultSet, Status};

// ============================================================================
// SuiteRunner
// ============================================================================

/// Runs a single suite and collects its results.
pub struct SuiteRunner<'r> {
    tree: &'r BlockTree,
    filter: &'r Filter,
    emitter: &'r mut Emitter,
    invocation: InvocationContext,
    result_set: ResultSet,
    /// Group → the last example that will run beneath it. `after_all` hooks
    /// only join that example's chain.
    closing: HashMap<BlockId, BlockId>,
}

impl<'r> SuiteRunner<'r> {
    pub fn new(tree: &'r BlockTree, filter: &'r Filter, emitter: &'r mut Emitter) -> Self {
        let mut closing = HashMap::new();
        for example in tree.examples_in_run_order() {
            if filter.is_filtered(tree, example) || tree.has_skipped_ancestors(example) {
                continue;
            }
            for group in tree.ancestors(example).skip(1) {
                closing.insert(group, example);
            }
        }

        SuiteRunner {
            tree,
            filter,
            emitter,
            invocation: InvocationContext::new(),
            result_set: ResultSet::for_block(tree.root()),
            closing,
        }
    }

    /// Run the whole suite. A suite-level failure result is recorded only
    /// when some test failed.
    pub fn run(mut self) -> ResultSet {
        let tree = self.tree;
        let suite = tree.root();
        let activation = self.invocation.activate();
        tracing::debug!(suite = tree.name(), "suite start");

        self.emit(EventKind::SuiteStart, suite, None);
        let failed = capture_panics(|| self.run_group(suite));
        let status = if failed { Status::Failure } else { Status::Success };
        self.emit(EventKind::SuiteComplete, suite, Some(status));

        if failed {
            let failures = self.result_set.total_failures();
            self.result_set.add_result(BlockResult::new(
                tree,
                suite,
                suite,
                0,
                Outcome::Failed(Failure::Group { failures }),
            ));
        }
        tracing::debug!(suite = tree.name(), %status, "suite complete");
        activation.deactivate();
        self.result_set
    }

    /// Run a group's examples, then its describes. Returns whether anything
    /// beneath it failed.
    fn run_group(&mut self, group: BlockId) -> bool {
        let tree = self.tree;
        if self.filter.is_filtered(tree, group) {
            tracing::trace!(path = %tree.path(group), "filtered out");
            return false;
        }

        self.invocation.push(group);
        let mut failed = false;
        for &example in tree.examples(group) {
            failed |= self.run_test(example) == Some(Status::Failure);
        }
        for &describe in tree.describes(group) {
            failed |= self.run_describe(describe);
        }
        self.invocation.pop();
        failed
    }

    fn run_describe(&mut self, describe: BlockId) -> bool {
        if self.filter.is_filtered(self.tree, describe) {
            return false;
        }
        tracing::debug!(path = %self.tree.path(describe), "describe start");

        self.emit(EventKind::DescribeStart, describe, None);
        let failed = self.run_group(describe);
        let status = if failed { Status::Failure } else { Status::Success };
        self.emit(EventKind::DescribeComplete, describe, Some(status));
        failed
    }

    /// Run one example through its hook chain. `None` when filtered out.
    fn run_test(&mut self, example: BlockId) -> Option<Status> {
        let tree = self.tree;
        if self.filter.is_filtered(tree, example) {
            return None;
        }
        tracing::debug!(path = %tree.path(example), "test start");

        self.emit(EventKind::TestStart, example, None);
        let results = self.run_chain(example);
        let status = results.status();
        self.result_set.add_set(results);
        self.emit(EventKind::TestComplete, example, Some(status));

        tracing::debug!(path = %tree.path(example), %status, "test complete");
        Some(status)
    }

    fn run_chain(&mut self, example: BlockId) -> ResultSet {
        let tree = self.tree;
        let mut results = ResultSet::for_block(example);

        if tree.has_skipped_ancestors(example) {
            let reason = tree.inherited_skip_reason(example).map(str::to_string);
            results.add_result(BlockResult::new(
                tree,
                example,
                example,
                0,
                Outcome::Skipped(SkipSignal::new(reason)),
            ));
            return results;
        }

        // Per-example state never outlives the example.
        for hook in tree.collect_ordered_befores(example) {
            tree.block(hook).clear_context();
        }
        tree.block(example).clear_context();

        self.invocation.push(example);
        let mut failed: Option<String> = None;
        let mut skipped: Option<SkipSignal> = None;

        for block in tree.hook_chain(example) {
            let kind = tree.kind(block);
            if kind == BlockKind::AfterAll && !self.closes(block, example) {
                continue;
            }
            let is_setup = matches!(kind, BlockKind::BeforeAll | BlockKind::Before);

            let result = if let Some(path) = &failed {
                let outcome = if block == example {
                    Outcome::Failed(Failure::Aborted {
                        failed: path.clone(),
                    })
                } else {
                    Outcome::Skipped(SkipSignal::new(Some(format!("`{path}` failed"))))
                };
                BlockResult::new(tree, example, block, 0, outcome)
            } else if let Some(signal) = skipped.as_ref().filter(|_| is_setup || block == example) {
                BlockResult::new(tree, example, block, 0, Outcome::Skipped(signal.clone()))
            } else if tree.block(block).is_skipped() {
                let reason = tree.block(block).skip_reason().map(str::to_string);
                BlockResult::new(tree, example, block, 0, Outcome::Skipped(SkipSignal::new(reason)))
            } else {
                self.capture_around(example, block)
            };

            match result.outcome() {
                Outcome::Failed(_) if failed.is_none() => {
                    failed = Some(result.invoked_path().to_string());
                }
                Outcome::Skipped(signal) if is_setup && !tree.block(block).is_skipped() => {
                    if skipped.is_none() && failed.is_none() {
                        skipped = Some(signal.clone());
                    }
                }
                _ => {}
            }
            results.add_result(result);
        }

        self.invocation.pop();
        results
    }

    /// Whether `hook`, an `after_all`, closes its group on this example.
    fn closes(&self, hook: BlockId, example: BlockId) -> bool {
        self.tree
            .block(hook)
            .parent()
            .and_then(|group| self.closing.get(&group))
            == Some(&example)
    }

    /// Invoke `invoked` and capture what happened as a result owned by
    /// `owner`. Run-once hooks replay their first outcome.
    pub fn capture_around(&mut self, owner: BlockId, invoked: BlockId) -> BlockResult {
        let tree = self.tree;
        let block = tree.block(invoked);

        if block.kind().runs_once() {
            if let Some(outcome) = block.recorded() {
                if matches!(outcome, Outcome::Failed(_)) {
                    tracing::warn!(path = %tree.path(invoked), "replaying failed {}", block.kind());
                }
                return BlockResult::new(tree, owner, invoked, 0, outcome);
            }
        }

        self.invocation.push(invoked);
        tracing::trace!(owner = %tree.path(owner), invoked = %tree.path(invoked), "invoke");
        let (outcome, assertions) = self.invoke(owner, invoked);
        self.invocation.pop();

        block.add_assertions(assertions);
        if block.kind().runs_once() {
            block.record(outcome.clone());
        }
        BlockResult::new(tree, owner, invoked, assertions, outcome)
    }

    fn invoke(&self, owner: BlockId, invoked: BlockId) -> (Outcome, usize) {
        let tree = self.tree;
        let block = tree.block(invoked);
        let Some(callback) = block.callback() else {
            return (Outcome::Returned, 0);
        };

        let layers = self.visible_layers(owner, invoked);
        let path = tree.path(invoked);
        let mut own = block.take_context();

        let (verdict, assertions) = {
            let outer: Vec<Ref<'_, Context>> = layers
                .iter()
                .filter_map(|&layer| {
                    Ref::filter_map(tree.block(layer).context_cell().borrow(), Option::as_ref).ok()
                })
                .collect();
            let mut chain = ContextChain::new(outer, &mut own, &path);
            let verdict = catch_unwind(AssertUnwindSafe(|| callback(&mut chain)));
            (verdict, chain.recorded())
        };
        block.store_context(own);

        let outcome = match verdict {
            Ok(Ok(())) => Outcome::Returned,
            Ok(Err(Signal::Assertion(failure))) => Outcome::Failed(Failure::Assertion(failure)),
            Ok(Err(Signal::Skip(signal))) => Outcome::Skipped(signal),
            Ok(Err(Signal::Fault(fault))) => Outcome::Failed(Failure::Runtime(fault)),
            Err(payload) => Outcome::Failed(Failure::Runtime(RuntimeFault::from_panic(payload))),
        };
        (outcome, assertions)
    }

    /// Contexts `invoked` reads through. A setup hook sees the setup hooks
    /// before it; the example and teardown hooks see the whole setup chain,
    /// and teardown hooks also see the example's own context.
    fn visible_layers(&self, owner: BlockId, invoked: BlockId) -> Vec<BlockId> {
        let tree = self.tree;
        let setup = tree.setup_chain(owner);
        match setup.iter().position(|&hook| hook == invoked) {
            Some(pos) => setup[..pos]
                .iter()
                .copied()
                .filter(|&hook| tree.block(hook).has_context())
                .collect(),
            None => tree.context_chain(owner),
        }
    }

    fn emit(&mut self, kind: EventKind, block: BlockId, status: Option<Status>) {
        let mut event = Event::new(kind, &self.result_set).with_block(self.tree, block);
        event.status = status;
        if kind == EventKind::TestComplete {
            event.result = self.result_set.last_set();
        }
        self.emitter.emit(&event);
    }
}

// ============================================================================
// TestRun: several suites, one result set
// ============================================================================

/// Runs any number of suites against shared listeners.
#[derive(Default)]
pub struct TestRun {
    emitter: Emitter,
    result_set: ResultSet,
}

impl TestRun {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&mut self, listener: impl Listener + 'static) {
        self.emitter.add_listener(listener);
    }

    /// Run every suite in order. Each suite's results land in their own
    /// nested set.
    pub fn run(&mut self, suites: &[BlockTree], filter: &Filter) -> &ResultSet {
        tracing::debug!(suites = suites.len(), "test run start");
        self.emitter
            .emit(&Event::new(EventKind::TestRunStart, &self.result_set));

        for tree in suites {
            let results = SuiteRunner::new(tree, filter, &mut self.emitter).run();
            self.result_set.add_set(results);
        }

        let status = self.result_set.status();
        self.emitter
            .emit(&Event::new(EventKind::TestRunComplete, &self.result_set).with_status(status));
        tracing::debug!(
            tests = self.result_set.total_tests(),
            failures = self.result_set.total_failures(),
            %status,
            "test run complete"
        );
        &self.result_set
    }

    pub fn result_set(&self) -> &ResultSet {
        &self.result_set
    }

    pub fn into_result_set(self) -> ResultSet {
        self.result_set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<String>>>;

    fn run(tree: &BlockTree) -> ResultSet {
        let mut emitter = Emitter::new();
        SuiteRunner::new(tree, &Filter::all(), &mut emitter).run()
    }

    fn logging(log: &Log, entry: &'static str) -> impl Fn(&mut ContextChain<'_>) -> crate::Verdict {
        let log = log.clone();
        move |_| {
            log.borrow_mut().push(entry.to_string());
            Ok(())
        }
    }

    #[test]
    fn captured_results_are_owned_by_the_example() {
        let tree = Builder::build("owner", |s| {
            s.describe("g", |s| {
                s.before(|ctx| ctx.fail("setup broke"));
                s.it("e", |_| Ok(()));
            });
        })
        .unwrap();

        let results = run(&tree);
        let failures = results.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].owner_path(), "g:e");
        assert_eq!(failures[0].invoked_path(), "g:before");
        assert_eq!(results.total_failures(), 1);
    }

    #[test]
    fn before_all_runs_once_and_after_all_closes_the_group() {
        let log: Log = Rc::default();
        let tree = Builder::build("once", |s| {
            s.describe("g", |s| {
                s.before_all(logging(&log, "before_all"));
                s.after_all(logging(&log, "after_all"));
                s.it("a", logging(&log, "a"));
                s.it("b", logging(&log, "b"));
                s.xit("c", logging(&log, "c"));
            });
        })
        .unwrap();

        let results = run(&tree);
        assert_eq!(*log.borrow(), vec!["before_all", "a", "b", "after_all"]);
        assert_eq!(results.total_tests(), 3);
        assert_eq!(results.total_skipped(), 1);
    }

    #[test]
    fn panics_become_runtime_faults() {
        let tree = Builder::build("panics", |s| {
            s.it("boom", |_| panic!("kaboom"));
        })
        .unwrap();

        let results = run(&tree);
        let failures = results.failures();
        assert_eq!(failures.len(), 1);
        match failures[0].failure() {
            Some(Failure::Runtime(fault)) => assert_eq!(fault.message, "kaboom"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn suite_failure_is_recorded_once() {
        let tree = Builder::build("suite", |s| {
            s.it("bad", |ctx| ctx.expect(false, "nope"));
            s.it("good", |ctx| ctx.expect(true, "yes"));
        })
        .unwrap();

        let results = run(&tree);
        let group = results
            .results()
            .find(|r| matches!(r.failure(), Some(Failure::Group { .. })));
        assert!(matches!(
            group.and_then(BlockResult::failure),
            Some(Failure::Group { failures: 1 })
        ));
        assert_eq!(results.total_tests(), 2);
        assert_eq!(results.total_assertions(), 2);
        assert_eq!(tree.block(tree.find("bad").unwrap()).assertion_count(), 1);
    }

    #[test]
    fn test_run_nests_one_set_per_suite() {
        let first = Builder::build("first", |s| {
            s.it("a", |_| Ok(()));
        })
        .unwrap();
        let second = Builder::build("second", |s| {
            s.it("b", |_| Ok(()));
            s.it("c", |_| Ok(()));
        })
        .unwrap();

        let mut run = TestRun::new();
        let results = run.run(&[first, second], &Filter::all());
        assert_eq!(results.len(), 2);
        assert_eq!(results.total_tests(), 3);
        assert_eq!(results.status(), Status::Success);
    }
}
