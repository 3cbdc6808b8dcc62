//! Code generation: transforms the DSL AST into `nestspec::Scope` calls.

use proc_macro2::{Ident, Span, TokenStream};
use quote::quote;

use crate::dsl::*;

// ============================================================================
// Public entry points
// ============================================================================

/// A closure `|s: &mut Scope<'_>| { ... }` declaring the suite.
pub fn generate(suite: Suite) -> TokenStream {
    let scope = scope_ident();
    let items = generate_items(&suite.items);

    quote! {
        |#scope: &mut ::nestspec::Scope<'_>| {
            #(#items)*
        }
    }
}

/// A `fn main()` building the suite and running it with the tree reporter.
pub fn generate_bdd(suite: Suite) -> TokenStream {
    let body = generate(suite);

    quote! {
        fn main() {
            ::nestspec::run(#body);
        }
    }
}

// ============================================================================
// Item generation
// ============================================================================

fn scope_ident() -> Ident {
    Ident::new("__nestspec_scope", Span::mixed_site())
}

fn generate_items(items: &[DslItem]) -> Vec<TokenStream> {
    items.iter().map(generate_item).collect()
}

fn generate_item(item: &DslItem) -> TokenStream {
    let scope = scope_ident();

    match item {
        DslItem::Describe(block) => {
            let name = &block.name;
            let method = if block.skipped {
                quote!(xdescribe)
            } else {
                quote!(describe)
            };
            let children = generate_items(&block.items);
            quote! {
                #scope.#method(#name, |#scope: &mut ::nestspec::Scope<'_>| {
                    #(#children)*
                });
            }
        }
        DslItem::It(block) => {
            let name = &block.name;
            let method = if block.skipped { quote!(xit) } else { quote!(it) };
            let callback = generate_callback(&block.body);
            match &block.skip_reason {
                Some(reason) => quote! {
                    #scope.#method(#name, #callback).skip(#reason);
                },
                None => quote! {
                    #scope.#method(#name, #callback);
                },
            }
        }
        DslItem::Hook(hook) => {
            let method = Ident::new(hook.kind.method(hook.skipped), Span::call_site());
            let callback = generate_callback(&hook.body);
            quote! {
                #scope.#method(#callback);
            }
        }
    }
}

/// Wrap a body as a callback. The body sees `ctx`; a trailing `Verdict`
/// expression decides the outcome, a body ending in a statement passes.
fn generate_callback(body: &TokenStream) -> TokenStream {
    let ctx = Ident::new("ctx", Span::call_site());
    quote! {
        move |#[allow(unused_variables)] #ctx: &mut ::nestspec::ContextChain<'_>| -> ::nestspec::Verdict {
            ::nestspec::IntoVerdict::into_verdict({ #body })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expand(source: &str) -> String {
        let suite: Suite = syn::parse_str(source).unwrap();
        generate(suite).to_string()
    }

    #[test]
    fn describes_nest_scope_calls() {
        let out = expand(r#"describe "A" { it "x" { } }"#);
        assert!(out.contains("__nestspec_scope . describe (\"A\""));
        assert!(out.contains("__nestspec_scope . it (\"x\""));
    }

    #[test]
    fn x_forms_call_the_skipping_twins() {
        let out = expand(r#"xdescribe "A" { xbefore_all { } xit "x" { } }"#);
        assert!(out.contains(". xdescribe ("));
        assert!(out.contains(". xbefore_all ("));
        assert!(out.contains(". xit ("));
    }

    #[test]
    fn skip_decorator_chains_a_reason() {
        let out = expand(r#"it "x" skip("flaky") { }"#);
        assert!(out.contains(". skip (\"flaky\")"));
    }

    #[test]
    fn bodies_see_ctx_and_feed_their_value_to_the_verdict() {
        let out = expand(r#"it "x" { ctx.expect_eq(1, 2) }"#);
        assert!(out.contains("ctx : & mut :: nestspec :: ContextChain"));
        assert!(out.contains(":: nestspec :: IntoVerdict :: into_verdict"));
        assert!(out.contains("ctx . expect_eq (1 , 2)"));
        assert!(!out.contains("Ok (())"));
    }
}
