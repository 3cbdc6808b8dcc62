use std::cell::{Cell, RefCell};
use std::rc::Rc;

use nestspec::{
    BlockTree, Builder, ContextChain, Emitter, Event, EventKind, Failure, Filter, ResultSet,
    SuiteRunner, TestRun, Verdict,
};
use pretty_assertions::assert_eq;

type Log = Rc<RefCell<Vec<String>>>;

fn run(tree: &BlockTree) -> ResultSet {
    run_filtered(tree, &Filter::all())
}

fn run_filtered(tree: &BlockTree, filter: &Filter) -> ResultSet {
    let mut emitter = Emitter::new();
    SuiteRunner::new(tree, filter, &mut emitter).run()
}

fn record(log: &Log, entry: &'static str) -> impl Fn(&mut ContextChain<'_>) -> Verdict {
    let log = log.clone();
    move |_| {
        log.borrow_mut().push(entry.to_string());
        Ok(())
    }
}

fn count(counter: &Rc<Cell<usize>>) -> impl Fn(&mut ContextChain<'_>) -> Verdict {
    let counter = counter.clone();
    move |_| {
        counter.set(counter.get() + 1);
        Ok(())
    }
}

// ============================================================================
// Hook ordering
// ============================================================================

#[test]
fn hooks_run_in_nine_step_order_regardless_of_declaration_order() {
    let log: Log = Rc::default();
    let tree = Builder::build("order", |s| {
        s.describe("outer", |s| {
            s.after_all(record(&log, "outer after_all"));
            s.after(record(&log, "outer after"));
            s.before(record(&log, "outer before"));
            s.before_all(record(&log, "outer before_all"));

            s.describe("inner", |s| {
                s.after(record(&log, "inner after"));
                s.it("example", record(&log, "example"));
                s.after_all(record(&log, "inner after_all"));
                s.before(record(&log, "inner before"));
                s.before_all(record(&log, "inner before_all"));
            });
        });
    })
    .unwrap();

    let results = run(&tree);
    assert_eq!(
        *log.borrow(),
        vec![
            "outer before_all",
            "outer before",
            "inner before_all",
            "inner before",
            "example",
            "inner after",
            "inner after_all",
            "outer after",
            "outer after_all",
        ]
    );
    assert!(results.is_success());
}

#[test]
fn once_hooks_run_once_per_describe() {
    let outer_all = Rc::new(Cell::new(0));
    let outer_each = Rc::new(Cell::new(0));
    let first_all = Rc::new(Cell::new(0));
    let first_each = Rc::new(Cell::new(0));
    let second_all = Rc::new(Cell::new(0));
    let second_each = Rc::new(Cell::new(0));

    let tree = Builder::build("levels", |s| {
        s.describe("outer", |s| {
            s.before_all(count(&outer_all));
            s.before(count(&outer_each));

            s.describe("first", |s| {
                s.before_all(count(&first_all));
                s.before(count(&first_each));
                s.it("a", |ctx| ctx.expect(true, "a"));
                s.it("b", |ctx| ctx.expect(true, "b"));
            });

            s.describe("second", |s| {
                s.before_all(count(&second_all));
                s.before(count(&second_each));
                s.it("c", |ctx| ctx.expect(true, "c"));
                s.it("d", |ctx| ctx.expect(true, "d"));
            });
        });
    })
    .unwrap();

    let results = run(&tree);
    assert_eq!(results.total_tests(), 4);
    assert_eq!(results.total_successes(), 4);
    assert_eq!(outer_all.get(), 1);
    assert_eq!(first_all.get(), 1);
    assert_eq!(second_all.get(), 1);
    assert_eq!(outer_each.get(), 4);
    assert_eq!(first_each.get(), 2);
    assert_eq!(second_each.get(), 2);
}

#[test]
fn after_all_runs_once_after_the_last_example() {
    let log: Log = Rc::default();
    let tree = Builder::build("closing", |s| {
        s.describe("g", |s| {
            s.after_all(record(&log, "after_all"));
            s.it("a", record(&log, "a"));
            s.describe("nested", |s| {
                s.it("b", record(&log, "b"));
            });
        });
    })
    .unwrap();

    run(&tree);
    assert_eq!(*log.borrow(), vec!["a", "b", "after_all"]);
}

// ============================================================================
// Context isolation
// ============================================================================

#[test]
fn sibling_examples_do_not_share_state() {
    let tree = Builder::build("isolation", |s| {
        s.describe("g", |s| {
            s.it("writes", |ctx| {
                ctx.set("leak", true);
                ctx.expect(ctx.contains("leak"), "own write is visible")
            });
            s.it("reads", |ctx| ctx.expect(!ctx.contains("leak"), "sibling write is invisible"));
        });
    })
    .unwrap();

    let results = run(&tree);
    assert_eq!(results.total_successes(), 2);
    assert!(results.failures().is_empty());
}

#[test]
fn nested_before_shadows_without_touching_the_outer_layer() {
    let seen: Log = Rc::default();
    let tree = Builder::build("shadowing", |s| {
        s.describe("outer", |s| {
            s.before(|ctx| {
                ctx.set("who", "outer".to_string());
                Ok(())
            });

            s.describe("inner", |s| {
                let seen = seen.clone();
                s.before(move |ctx| {
                    let inherited = ctx.get::<String>("who").cloned().unwrap_or_default();
                    seen.borrow_mut().push(format!("inner before saw {inherited}"));
                    ctx.set("who", "inner".to_string());
                    Ok(())
                });
                s.it("sees the inner value", |ctx| {
                    ctx.expect_eq(ctx.get::<String>("who").cloned(), Some("inner".to_string()))
                });
            });

            s.describe("sibling", |s| {
                s.it("sees the outer value", |ctx| {
                    ctx.expect_eq(ctx.get::<String>("who").cloned(), Some("outer".to_string()))
                });
            });
        });
    })
    .unwrap();

    let results = run(&tree);
    assert!(results.is_success(), "{:?}", results.failures());
    assert_eq!(results.total_assertions(), 2);
    assert_eq!(*seen.borrow(), vec!["inner before saw outer"]);
}

#[test]
fn before_all_state_is_shared_across_examples() {
    let tree = Builder::build("shared", |s| {
        s.describe("g", |s| {
            s.before_all(|ctx| {
                ctx.set("connection", 7u32);
                Ok(())
            });
            s.it("first", |ctx| ctx.expect_eq(ctx.get::<u32>("connection").copied(), Some(7)));
            s.it("second", |ctx| ctx.expect_eq(ctx.get::<u32>("connection").copied(), Some(7)));
        });
    })
    .unwrap();

    let results = run(&tree);
    assert_eq!(results.total_successes(), 2);
}

#[test]
fn after_hooks_see_the_example_context() {
    let tree = Builder::build("teardown", |s| {
        s.describe("g", |s| {
            s.after(|ctx| ctx.expect_eq(ctx.get::<i32>("answer").copied(), Some(42)));
            s.it("sets", |ctx| {
                ctx.set("answer", 42);
                Ok(())
            });
        });
    })
    .unwrap();

    let results = run(&tree);
    assert!(results.is_success(), "{:?}", results.failures());
    assert_eq!(results.total_assertions(), 1);
}

// ============================================================================
// Skipping
// ============================================================================

#[test]
fn skipping_inside_an_example_records_no_assertions() {
    let tree = Builder::build("skip", |s| {
        s.it("not today", |_| nestspec::skip("needs a network"));
    })
    .unwrap();

    let results = run(&tree);
    assert_eq!(results.total_tests(), 1);
    assert_eq!(results.total_skipped(), 1);
    assert_eq!(results.total_assertions(), 0);
    let skipped = results.results().find(|r| r.is_example());
    assert_eq!(
        skipped.and_then(|r| r.skip_reason()),
        Some("needs a network")
    );
}

#[test]
fn xdescribe_skips_every_descendant_without_running_hooks() {
    let log: Log = Rc::default();
    let tree = Builder::build("xdescribe", |s| {
        s.xdescribe("parked", |s| {
            s.before_all(record(&log, "before_all"));
            s.before(record(&log, "before"));
            s.it("a", record(&log, "a"));
            s.describe("deeper", |s| {
                s.it("b", record(&log, "b"));
            });
        });
        s.it("live", record(&log, "live"));
    })
    .unwrap();

    let results = run(&tree);
    assert_eq!(*log.borrow(), vec!["live"]);
    assert_eq!(results.total_tests(), 3);
    assert_eq!(results.total_skipped(), 2);
    assert_eq!(results.total_successes(), 1);
}

#[test]
fn skip_in_a_before_hook_skips_the_example_but_runs_teardown() {
    let log: Log = Rc::default();
    let tree = Builder::build("setup skip", |s| {
        s.describe("g", |s| {
            s.before(|_| nestspec::skip("no fixture"));
            s.after(record(&log, "after"));
            s.it("e", record(&log, "e"));
        });
    })
    .unwrap();

    let results = run(&tree);
    assert_eq!(*log.borrow(), vec!["after"]);
    assert_eq!(results.total_skipped(), 1);
    assert!(results.is_success());
}

// ============================================================================
// Failure containment
// ============================================================================

#[test]
fn a_failing_hook_fails_its_owner_and_skips_the_rest_of_the_chain() {
    let log: Log = Rc::default();
    let tree = Builder::build("cascade", |s| {
        s.describe("g", |s| {
            s.before(|ctx| ctx.fail("fixture missing"));
            s.after(record(&log, "after"));
            s.it("e", record(&log, "e"));
        });
        s.it("unaffected", record(&log, "unaffected"));
    })
    .unwrap();

    let results = run(&tree);
    assert_eq!(*log.borrow(), vec!["unaffected"]);
    assert_eq!(results.total_tests(), 2);
    assert_eq!(results.total_failures(), 1);

    let failures = results.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].owner_path(), "g:e");
    assert_eq!(failures[0].invoked_path(), "g:before");

    let after = results
        .results()
        .find(|r| r.invoked_path() == "g:after")
        .unwrap();
    assert!(after.is_skipped());
    assert_eq!(after.skip_reason(), Some("`g:before` failed"));

    let example = results.results().find(|r| r.is_example() && r.owner_path() == "g:e");
    assert!(matches!(
        example.and_then(|r| r.failure()),
        Some(Failure::Aborted { failed }) if failed == "g:before"
    ));
}

#[test]
fn mixed_suite_counts() {
    let tree = Builder::build("mixed", |s| {
        s.describe("passing", |s| {
            for name in ["one", "two", "three", "four", "five"] {
                s.it(name, |ctx| ctx.expect(true, "passes"));
            }
        });
        s.describe("parked", |s| {
            s.xit("six", |_| Ok(()));
            s.it("seven", |_| Ok(())).skip("flaky on CI");
        });
        s.it("eight", |_| {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full").into())
        });
    })
    .unwrap();

    let results = run(&tree);
    assert_eq!(results.total_tests(), 8);
    assert_eq!(results.total_successes(), 5);
    assert_eq!(results.total_skipped(), 2);
    assert_eq!(results.total_failures(), 1);

    let failures = results.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].owner_path(), "eight");
    assert!(matches!(failures[0].failure(), Some(Failure::Runtime(fault)) if fault.message == "disk full"));
}

// ============================================================================
// Filtering
// ============================================================================

#[test]
fn grep_runs_only_matching_examples() {
    let log: Log = Rc::default();
    let tree = Builder::build("filtering", |s| {
        s.describe("A", |s| {
            s.it("x", record(&log, "x"));
            s.it("y", record(&log, "y"));
        });
        s.describe("B", |s| {
            s.before_all(record(&log, "B before_all"));
            s.it("z", record(&log, "z"));
        });
    })
    .unwrap();

    let filter = Filter::grep("/A/").unwrap();
    let results = run_filtered(&tree, &filter);
    assert_eq!(*log.borrow(), vec!["x", "y"]);
    assert_eq!(results.total_tests(), 2);
}

#[test]
fn filtered_describes_emit_no_events() {
    let tree = Builder::build("events", |s| {
        s.describe("A", |s| {
            s.it("x", |_| Ok(()));
        });
        s.describe("B", |s| {
            s.it("z", |_| Ok(()));
        });
    })
    .unwrap();

    let seen: Log = Rc::default();
    let sink = seen.clone();
    let mut run = TestRun::new();
    run.add_listener(move |event: &Event<'_>| {
        let path = event.path().unwrap_or_default();
        sink.borrow_mut().push(format!("{} {path}", event.name()).trim_end().to_string());
    });
    run.run(&[tree], &Filter::except("^B").unwrap());

    assert_eq!(
        *seen.borrow(),
        vec![
            "test_run.start",
            "suite.start",
            "describe.start A",
            "test.start A:x",
            "test.complete A:x",
            "describe.complete A",
            "suite.complete",
            "test_run.complete",
        ]
    );
}

// ============================================================================
// Tree construction
// ============================================================================

fn calculator(s: &mut nestspec::Scope<'_>) {
    s.describe("Calculator", |s| {
        s.before(|ctx| {
            ctx.set("lhs", 2);
            Ok(())
        });
        s.it("adds", |ctx| ctx.expect_eq(ctx.get::<i32>("lhs").copied(), Some(2)));
        s.context("when negative", |s| {
            s.xit("handles negatives", |_| Ok(()));
        });
    });
}

#[test]
fn identical_source_builds_identical_trees() {
    let first = Builder::build("calc", calculator).unwrap();
    let second = Builder::build("calc", calculator).unwrap();

    assert_eq!(first.to_string(), second.to_string());
    let paths = |tree: &BlockTree| {
        tree.examples_in_run_order()
            .into_iter()
            .map(|id| tree.path(id))
            .collect::<Vec<_>>()
    };
    assert_eq!(paths(&first), paths(&second));
    assert_eq!(
        paths(&first),
        vec!["Calculator:adds", "Calculator:when negative:handles negatives"]
    );
}

#[test]
fn suite_macro_builds_the_same_tree() {
    let by_hand = Builder::build("calc", calculator).unwrap();
    let by_macro = Builder::build(
        "calc",
        nestspec::suite! {
            describe "Calculator" {
                before {
                    ctx.set("lhs", 2);
                }

                it "adds" {
                    ctx.expect_eq(ctx.get::<i32>("lhs").copied(), Some(2))?;
                }

                context "when negative" {
                    xit "handles negatives" { }
                }
            }
        },
    )
    .unwrap();

    assert_eq!(by_hand.to_string(), by_macro.to_string());
    let results = run(&by_macro);
    assert_eq!(results.total_successes(), 1);
    assert_eq!(results.total_skipped(), 1);
}

#[test]
fn suite_macro_bodies_ending_in_an_assertion_report_it() {
    let tree = Builder::build(
        "tails",
        nestspec::suite! {
            it "tail assertion fails" {
                ctx.expect_eq(1, 2)
            }

            it "tail assertion passes" {
                let sum = 2 + 3;
                ctx.expect_eq(sum, 5)
            }

            it "statement body passes" {
                ctx.expect(true, "holds")?;
            }
        },
    )
    .unwrap();

    let results = run(&tree);
    assert_eq!(results.total_tests(), 3);
    assert_eq!(results.total_failures(), 1);
    assert_eq!(results.total_successes(), 2);
    assert_eq!(results.total_assertions(), 3);
    assert_eq!(results.failures()[0].owner_path(), "tail assertion fails");
}

// ============================================================================
// Self-hosting
// ============================================================================

#[test]
fn a_suite_can_run_inside_an_example() {
    let tree = Builder::build("host", |s| {
        s.describe("engine", |s| {
            s.it("runs a nested suite", |ctx| {
                let inner = Builder::build("guest", |s| {
                    s.it("passes", |ctx| ctx.expect(true, "inner"));
                    s.it("fails", |ctx| ctx.expect(false, "inner"));
                })?;
                let results = run(&inner);
                ctx.expect_eq(results.total_tests(), 2)?;
                ctx.expect_eq(results.total_failures(), 1)
            });
            s.it("keeps registering after the nested build", |ctx| {
                let path = ctx.path().to_string();
                ctx.expect_eq(path.as_str(), "engine:keeps registering after the nested build")
            });
        });
    })
    .unwrap();

    let results = run(&tree);
    assert!(results.is_success(), "{:?}", results.failures());
    assert_eq!(results.total_assertions(), 3);
}

#[test]
fn suites_on_parallel_threads_keep_their_panic_locations() {
    let workers: Vec<_> = (0..2)
        .map(|_| {
            std::thread::spawn(|| {
                let tree = Builder::build("parallel", |s| {
                    s.it("boom", |_| panic!("kaboom"));
                })
                .unwrap();
                let results = run(&tree);
                let failures = results.failures();
                match failures.first().and_then(|r| r.failure()) {
                    Some(Failure::Runtime(fault)) => {
                        fault.message == "kaboom" && fault.location.is_some()
                    }
                    _ => false,
                }
            })
        })
        .collect();

    for worker in workers {
        assert!(worker.join().unwrap());
    }
}

// ============================================================================
// Events
// ============================================================================

#[test]
fn a_panicking_listener_changes_nothing() {
    let tree = Builder::build("listeners", |s| {
        s.it("fine", |ctx| ctx.expect(true, "fine"));
    })
    .unwrap();

    let completed = Rc::new(Cell::new(0));
    let counter = completed.clone();
    let mut run = TestRun::new();
    run.add_listener(|event: &Event<'_>| {
        if event.kind == EventKind::TestStart {
            panic!("listener bug");
        }
    });
    run.add_listener(move |event: &Event<'_>| {
        if event.kind == EventKind::TestComplete {
            counter.set(counter.get() + 1);
        }
    });

    let results = run.run(&[tree], &Filter::all());
    assert!(results.is_success());
    assert_eq!(results.total_successes(), 1);
    assert_eq!(completed.get(), 1);
}

#[test]
fn handler_names_follow_event_names() {
    let names: Vec<String> = EventKind::ALL.iter().map(|k| k.handler_name()).collect();
    assert_eq!(
        names,
        vec![
            "onTestRunStart",
            "onTestRunComplete",
            "onSuiteStart",
            "onSuiteComplete",
            "onDescribeStart",
            "onDescribeComplete",
            "onTestStart",
            "onTestComplete",
        ]
    );
}
