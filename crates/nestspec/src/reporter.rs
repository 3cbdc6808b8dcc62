//! Colored, indented tree output.
//!
//! ```text
//! --- calculator ---
//!
//! Calculator
//!   ✓ adds two numbers
//!   when negative
//!     ✓ handles negatives
//!     ✗ fails on overflow
//! ```

use std::io::{self, IsTerminal, Write};
use std::time::{Duration, Instant};

use crate::block::BlockTree;
use crate::config::{Filter, RunConfig};
use crate::event::{Event, Listener};
use crate::result::{ResultSet, Status};

// ============================================================================
// ANSI color helpers
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct Palette {
    enabled: bool,
}

impl Palette {
    fn paint(self, code: &str, s: &str) -> String {
        if self.enabled {
            format!("\x1b[{code}m{s}\x1b[0m")
        } else {
            s.to_string()
        }
    }

    fn green(self, s: &str) -> String {
        self.paint("32", s)
    }

    fn red(self, s: &str) -> String {
        self.paint("31", s)
    }

    fn yellow(self, s: &str) -> String {
        self.paint("33", s)
    }

    fn bold(self, s: &str) -> String {
        self.paint("1", s)
    }

    fn dim(self, s: &str) -> String {
        self.paint("2", s)
    }
}

// ============================================================================
// TreeReporter
// ============================================================================

struct FailureReport {
    path: String,
    category: &'static str,
    message: String,
    trace: Vec<String>,
}

/// Prints each suite as an indented tree and a summary at the end of the run.
pub struct TreeReporter {
    out: Box<dyn Write>,
    palette: Palette,
    trace_depth: usize,
    started: Option<Instant>,
    test_started: Option<Instant>,
    failures: Vec<FailureReport>,
}

impl TreeReporter {
    /// Report to stdout. Color is used only on a terminal and never when
    /// disabled by the configuration.
    pub fn new(config: &RunConfig) -> Self {
        let color = !config.no_color && io::stdout().is_terminal();
        Self::with_writer(config, color, io::stdout())
    }

    pub fn with_writer(config: &RunConfig, color: bool, out: impl Write + 'static) -> Self {
        TreeReporter {
            out: Box::new(out),
            palette: Palette { enabled: color },
            trace_depth: config.trace_depth,
            started: None,
            test_started: None,
            failures: Vec::new(),
        }
    }

    fn line(&mut self, text: impl AsRef<str>) {
        if let Err(err) = writeln!(self.out, "{}", text.as_ref()) {
            tracing::warn!(error = %err, "failed to write report");
        }
    }

    fn indent(event: &Event<'_>) -> String {
        "  ".repeat(event.depth().saturating_sub(1))
    }

    fn collect_failures(&mut self, result: &ResultSet) {
        for failed in result.failures() {
            let Some(failure) = failed.failure() else {
                continue;
            };
            let trace = failure
                .runtime_fault()
                .map(|fault| fault.trace_lines(self.trace_depth))
                .unwrap_or_default();
            let path = if failed.owner() == failed.invoked() {
                failed.owner_path().to_string()
            } else {
                format!("{} (in {})", failed.owner_path(), failed.invoked_path())
            };
            self.failures.push(FailureReport {
                path,
                category: failure.category(),
                message: failure.to_string(),
                trace,
            });
        }
    }

    fn print_summary(&mut self, results: &ResultSet, elapsed: Duration) {
        let p = self.palette;
        let elapsed_str = format!("{:.3}s", elapsed.as_secs_f64());

        let total = results.total_tests();
        let passed = results.total_successes();
        let failed = results.total_failures();
        let skipped = results.total_skipped();
        let assertions = results.total_assertions();

        let failed_str = format!("{failed} failed");
        let skipped_str = format!("{skipped} skipped");
        let parts = [
            format!("{total} tests"),
            p.green(&format!("{passed} passed")),
            if failed > 0 { p.red(&failed_str) } else { failed_str },
            if skipped > 0 { p.yellow(&skipped_str) } else { skipped_str },
            format!("{assertions} assertions"),
        ];

        let summary = format!("{} ({})", parts.join(", "), p.dim(&elapsed_str));

        self.line("");
        if results.is_failure() {
            self.line(p.red("FAIL"));
            self.line(summary);
            self.line("");
            self.line("Failures:");
            let failures = std::mem::take(&mut self.failures);
            for (i, failure) in failures.iter().enumerate() {
                self.line(format!("  {}. {}", i + 1, failure.path));
                self.line(format!(
                    "     {}",
                    p.red(&format!("{}: {}", failure.category, failure.message))
                ));
                for frame in &failure.trace {
                    self.line(format!("       {}", p.dim(frame)));
                }
            }
            self.line("");
        } else {
            self.line(p.green("PASS"));
            self.line(summary);
        }
    }
}

impl Listener for TreeReporter {
    fn on_test_run_start(&mut self, _event: &Event<'_>) {
        self.started = Some(Instant::now());
        self.failures.clear();
        self.line("");
    }

    fn on_suite_start(&mut self, event: &Event<'_>) {
        let Some(tree) = event.tree else {
            return;
        };
        let header = self.palette.dim(&format!("--- {} ---", tree.name()));
        self.line(header);
        self.line("");
    }

    fn on_suite_complete(&mut self, _event: &Event<'_>) {
        self.line("");
    }

    fn on_describe_start(&mut self, event: &Event<'_>) {
        let name = event.block_name().unwrap_or_default();
        let line = format!("{}{}", Self::indent(event), self.palette.bold(name));
        self.line(line);
    }

    fn on_test_start(&mut self, _event: &Event<'_>) {
        self.test_started = Some(Instant::now());
    }

    fn on_test_complete(&mut self, event: &Event<'_>) {
        let p = self.palette;
        let indent = Self::indent(event);
        let name = event.block_name().unwrap_or_default();

        let ms = self
            .test_started
            .take()
            .map(|start| start.elapsed().as_millis())
            .unwrap_or_default();
        let time_str = if ms > 100 {
            format!(" {}", p.dim(&format!("({ms}ms)")))
        } else {
            String::new()
        };

        match event.status {
            Some(Status::Failure) => {
                self.line(format!("{indent}{} {}{time_str}", p.red("✗"), p.red(name)));
                if let Some(result) = event.result {
                    self.collect_failures(result);
                }
            }
            Some(Status::Skipped) => {
                let reason = event
                    .result
                    .and_then(|set| set.results().find_map(|r| r.skip_reason()))
                    .map(|reason| format!(" ({reason})"))
                    .unwrap_or_default();
                self.line(format!("{indent}{} {}", p.yellow("-"), p.dim(&format!("{name}{reason}"))));
            }
            _ => {
                let incomplete = event
                    .result
                    .is_some_and(|set| set.total_incomplete() > 0);
                let note = if incomplete {
                    format!(" {}", p.dim("(no assertions)"))
                } else {
                    String::new()
                };
                self.line(format!("{indent}{} {name}{note}{time_str}", p.green("✓")));
            }
        }
    }

    fn on_test_run_complete(&mut self, event: &Event<'_>) {
        let elapsed = self.started.map(|s| s.elapsed()).unwrap_or_default();
        self.print_summary(event.result_set, elapsed);
        if let Err(err) = self.out.flush() {
            tracing::warn!(error = %err, "failed to flush report");
        }
    }
}

/// Paths of the examples a filter keeps, in run order.
pub fn list_examples(tree: &BlockTree, filter: &Filter) -> Vec<String> {
    tree.examples_in_run_order()
        .into_iter()
        .filter(|&example| !filter.is_filtered(tree, example))
        .map(|example| {
            let path = tree.path(example);
            if tree.has_skipped_ancestors(example) {
                format!("{path} (skipped)")
            } else {
                path
            }
        })
        .collect()
}
