//! Proc macros for the `nestspec` BDD test engine.

mod codegen;
mod dsl;

/// Declare a suite with the describe/it DSL.
///
/// Expands to a closure `|s: &mut nestspec::Scope<'_>| { ... }` making the
/// equivalent `Scope` calls, so it plugs into `nestspec::run` or
/// `nestspec::Builder::build`. Every body sees an implicit
/// `ctx: &mut nestspec::ContextChain<'_>`. A body may end with a `Verdict`
/// expression such as `ctx.expect_eq(a, b)`, which decides the outcome;
/// a body ending in a statement passes unless it returned early.
///
/// # Example
///
/// ```text
/// let tree = nestspec::Builder::build("calc", nestspec::suite! {
///     describe "Calculator" {
///         before {
///             ctx.set("a", 2);
///         }
///
///         it "adds two numbers" {
///             let a = *ctx.get::<i32>("a").unwrap();
///             ctx.expect_eq(a + 3, 5)?;
///         }
///
///         context "with negative numbers" {
///             it "handles negatives" {
///                 ctx.expect_eq(-1 + 1, 0)?;
///             }
///         }
///     }
/// })?;
/// ```
///
/// # Supported DSL keywords
///
/// ## Containers
/// - `describe "name" { ... }` / `context "name" { ... }`
/// - `xdescribe` / `xcontext`: skipped, with every example beneath it
///
/// ## Examples
/// - `it "name" { ... }` / `specify "name" { ... }`
/// - `xit` / `xspecify`: skipped
/// - `it "name" skip("reason") { ... }`: skipped with a reason
///
/// ## Hooks
/// - `before { ... }`: runs before every example in scope (and nested scopes)
/// - `after { ... }`: runs after every example in scope
/// - `before_all { ... }`: runs once before the first example in scope
/// - `after_all { ... }`: runs once after the last example in scope
/// - `xbefore` / `xafter` / `xbefore_all` / `xafter_all`: skipped
///
/// # Execution order
///
/// ```text
/// outer before_all -> outer before -> inner before_all -> inner before -> body
///     -> inner after -> inner after_all -> outer after -> outer after_all
/// ```
#[proc_macro]
pub fn suite(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let suite = syn::parse_macro_input!(input as dsl::Suite);
    codegen::generate(suite).into()
}

/// BDD test runner macro: generates a `main()` function with colored tree output.
///
/// Use this instead of `suite!` when your test target has `harness = false`.
///
/// # Setup
///
/// In `Cargo.toml`:
/// ```toml
/// [[test]]
/// name = "my_bdd_tests"
/// harness = false
/// ```
///
/// In your test file:
/// ```text
/// nestspec::bdd! {
///     describe "Calculator" {
///         it "adds" { ctx.expect_eq(2 + 3, 5)?; }
///     }
/// }
/// ```
///
/// Run with:
/// ```sh
/// cargo test --test my_bdd_tests
/// ```
#[proc_macro]
pub fn bdd(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let suite = syn::parse_macro_input!(input as dsl::Suite);
    codegen::generate_bdd(suite).into()
}
