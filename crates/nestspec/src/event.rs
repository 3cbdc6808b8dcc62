//! Lifecycle events and the listeners that consume them.

use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::block::{BlockId, BlockTree};
use crate::error::panic_message;
use crate::result::{ResultSet, Status};

/// Lifecycle milestones emitted while running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    TestRunStart,
    TestRunComplete,
    SuiteStart,
    SuiteComplete,
    DescribeStart,
    DescribeComplete,
    TestStart,
    TestComplete,
}

impl EventKind {
    pub const ALL: [EventKind; 8] = [
        EventKind::TestRunStart,
        EventKind::TestRunComplete,
        EventKind::SuiteStart,
        EventKind::SuiteComplete,
        EventKind::DescribeStart,
        EventKind::DescribeComplete,
        EventKind::TestStart,
        EventKind::TestComplete,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EventKind::TestRunStart => "test_run.start",
            EventKind::TestRunComplete => "test_run.complete",
            EventKind::SuiteStart => "suite.start",
            EventKind::SuiteComplete => "suite.complete",
            EventKind::DescribeStart => "describe.start",
            EventKind::DescribeComplete => "describe.complete",
            EventKind::TestStart => "test.start",
            EventKind::TestComplete => "test.complete",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    pub fn handler_name(self) -> String {
        handler_name(self.name())
    }
}

/// Map an event name to its handler name: segments split on `_` and `.`,
/// capitalised, prefixed with `on`. `test_run.complete` → `onTestRunComplete`.
pub fn handler_name(event_name: &str) -> String {
    let mut name = String::from("on");
    for segment in event_name.split(['_', '.']).filter(|s| !s.is_empty()) {
        let mut chars = segment.chars();
        if let Some(first) = chars.next() {
            name.extend(first.to_uppercase());
            name.push_str(chars.as_str());
        }
    }
    name
}

/// An event and its payload. Which fields are set depends on the kind:
/// suite/describe/test events carry `block`, complete events carry `status`,
/// `test.complete` carries the test's own `result`.
#[derive(Clone, Copy)]
pub struct Event<'a> {
    pub kind: EventKind,
    pub tree: Option<&'a BlockTree>,
    pub block: Option<BlockId>,
    pub result: Option<&'a ResultSet>,
    pub status: Option<Status>,
    pub result_set: &'a ResultSet,
}

impl<'a> Event<'a> {
    pub fn new(kind: EventKind, result_set: &'a ResultSet) -> Self {
        Event {
            kind,
            tree: None,
            block: None,
            result: None,
            status: None,
            result_set,
        }
    }

    pub fn with_block(mut self, tree: &'a BlockTree, block: BlockId) -> Self {
        self.tree = Some(tree);
        self.block = Some(block);
        self
    }

    pub fn with_result(mut self, result: &'a ResultSet) -> Self {
        self.result = Some(result);
        self
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// Path of the event's block, if any.
    pub fn path(&self) -> Option<String> {
        Some(self.tree?.path(self.block?))
    }

    /// Display name of the event's block, if any.
    pub fn block_name(&self) -> Option<&'a str> {
        let tree = self.tree?;
        Some(tree.block(self.block?).display_name())
    }

    pub fn depth(&self) -> usize {
        match (self.tree, self.block) {
            (Some(tree), Some(block)) => tree.depth(block),
            _ => 0,
        }
    }
}

/// Consumer of lifecycle events. Every handler defaults to doing nothing, so
/// a listener only implements what it cares about.
pub trait Listener {
    fn on_test_run_start(&mut self, _event: &Event<'_>) {}
    fn on_test_run_complete(&mut self, _event: &Event<'_>) {}
    fn on_suite_start(&mut self, _event: &Event<'_>) {}
    fn on_suite_complete(&mut self, _event: &Event<'_>) {}
    fn on_describe_start(&mut self, _event: &Event<'_>) {}
    fn on_describe_complete(&mut self, _event: &Event<'_>) {}
    fn on_test_start(&mut self, _event: &Event<'_>) {}
    fn on_test_complete(&mut self, _event: &Event<'_>) {}

    /// Route an event to its handler.
    fn handle(&mut self, event: &Event<'_>) {
        match event.kind {
            EventKind::TestRunStart => self.on_test_run_start(event),
            EventKind::TestRunComplete => self.on_test_run_complete(event),
            EventKind::SuiteStart => self.on_suite_start(event),
            EventKind::SuiteComplete => self.on_suite_complete(event),
            EventKind::DescribeStart => self.on_describe_start(event),
            EventKind::DescribeComplete => self.on_describe_complete(event),
            EventKind::TestStart => self.on_test_start(event),
            EventKind::TestComplete => self.on_test_complete(event),
        }
    }
}

/// Any closure over events is a listener that sees every event.
impl<F> Listener for F
where
    F: FnMut(&Event<'_>),
{
    fn handle(&mut self, event: &Event<'_>) {
        self(event)
    }
}

/// Fans events out to listeners. A panicking listener is logged and skipped;
/// it never changes any result.
#[derive(Default)]
pub struct Emitter {
    listeners: Vec<Box<dyn Listener>>,
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&mut self, listener: impl Listener + 'static) {
        self.listeners.push(Box::new(listener));
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn emit(&mut self, event: &Event<'_>) {
        tracing::trace!(event = event.name(), handler = %event.kind.handler_name(), "emit");
        for (index, listener) in self.listeners.iter_mut().enumerate() {
            let outcome = catch_unwind(AssertUnwindSafe(|| listener.handle(event)));
            if let Err(payload) = outcome {
                tracing::warn!(
                    event = event.name(),
                    listener = index,
                    error = %panic_message(payload.as_ref()),
                    "listener panicked; ignoring"
                );
            }
        }
    }
}
