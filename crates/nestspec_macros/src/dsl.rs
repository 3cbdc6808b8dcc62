//! DSL AST types and `syn::parse::Parse` implementations.
//!
//! Parses the describe/it DSL syntax into a structured AST.

use proc_macro2::TokenStream;
use syn::parse::{Parse, ParseStream};
use syn::{braced, parenthesized, Ident, LitStr, Result};

// ============================================================================
// AST types
// ============================================================================

/// Top-level suite: a list of DSL items.
#[derive(Debug)]
pub struct Suite {
    pub items: Vec<DslItem>,
}

/// A single DSL node.
#[derive(Debug)]
pub enum DslItem {
    Describe(DescribeBlock),
    It(ItBlock),
    Hook(HookBlock),
}

/// `describe "name" { ... }` / `context "name" { ... }`, or the `x` forms.
#[derive(Debug)]
pub struct DescribeBlock {
    pub name: LitStr,
    pub skipped: bool,
    pub items: Vec<DslItem>,
}

/// `it "name" { ... }` / `specify "name" { ... }`, or the `x` forms.
#[derive(Debug)]
pub struct ItBlock {
    pub name: LitStr,
    pub skipped: bool,
    pub skip_reason: Option<LitStr>,
    pub body: TokenStream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    Before,
    After,
    BeforeAll,
    AfterAll,
}

impl HookKind {
    /// Name of the `Scope` method registering this hook.
    pub fn method(self, skipped: bool) -> &'static str {
        match (self, skipped) {
            (HookKind::Before, false) => "before",
            (HookKind::Before, true) => "xbefore",
            (HookKind::After, false) => "after",
            (HookKind::After, true) => "xafter",
            (HookKind::BeforeAll, false) => "before_all",
            (HookKind::BeforeAll, true) => "xbefore_all",
            (HookKind::AfterAll, false) => "after_all",
            (HookKind::AfterAll, true) => "xafter_all",
        }
    }
}

/// `before { ... }` / `after { ... }` / `before_all { ... }` / `after_all { ... }`
#[derive(Debug)]
pub struct HookBlock {
    pub kind: HookKind,
    pub skipped: bool,
    pub body: TokenStream,
}

// ============================================================================
// Parsing
// ============================================================================

impl Parse for Suite {
    fn parse(input: ParseStream) -> Result<Self> {
        let items = parse_items(input)?;
        Ok(Suite { items })
    }
}

/// Parse a sequence of DSL items until the stream is exhausted.
fn parse_items(input: ParseStream) -> Result<Vec<DslItem>> {
    let mut items = Vec::new();
    while !input.is_empty() {
        items.push(input.parse::<DslItem>()?);
    }
    Ok(items)
}

impl Parse for DslItem {
    fn parse(input: ParseStream) -> Result<Self> {
        let ident: Ident = input.parse()?;
        let name = ident.to_string();

        match name.as_str() {
            // Container blocks
            "describe" | "context" => Ok(DslItem::Describe(parse_describe_block(input, false)?)),
            "xdescribe" | "xcontext" => Ok(DslItem::Describe(parse_describe_block(input, true)?)),

            // Examples
            "it" | "specify" => Ok(DslItem::It(parse_it_block(input, false)?)),
            "xit" | "xspecify" => Ok(DslItem::It(parse_it_block(input, true)?)),

            // Hooks
            "before" => parse_hook_block(input, HookKind::Before, false),
            "xbefore" => parse_hook_block(input, HookKind::Before, true),
            "after" => parse_hook_block(input, HookKind::After, false),
            "xafter" => parse_hook_block(input, HookKind::After, true),
            "before_all" => parse_hook_block(input, HookKind::BeforeAll, false),
            "xbefore_all" => parse_hook_block(input, HookKind::BeforeAll, true),
            "after_all" => parse_hook_block(input, HookKind::AfterAll, false),
            "xafter_all" => parse_hook_block(input, HookKind::AfterAll, true),

            _ => Err(syn::Error::new(
                ident.span(),
                format!(
                    "unknown DSL keyword `{name}`. Expected one of: \
                     describe, context, it, specify, before, after, \
                     before_all, after_all (with optional x prefix to skip)"
                ),
            )),
        }
    }
}

// ============================================================================
// Block parsers
// ============================================================================

/// Parse: `"name" { items... }`
fn parse_describe_block(input: ParseStream, skipped: bool) -> Result<DescribeBlock> {
    let name: LitStr = input.parse()?;
    let content;
    braced!(content in input);
    let items = parse_items(&content)?;
    Ok(DescribeBlock {
        name,
        skipped,
        items,
    })
}

/// Parse: `"name" [skip("reason")] { body }`
fn parse_it_block(input: ParseStream, skipped: bool) -> Result<ItBlock> {
    let name: LitStr = input.parse()?;

    let mut skip_reason = None;
    while !input.peek(syn::token::Brace) {
        let decorator: Ident = input.parse()?;
        match decorator.to_string().as_str() {
            "skip" => {
                let content;
                parenthesized!(content in input);
                skip_reason = Some(content.parse::<LitStr>()?);
            }
            other => {
                return Err(syn::Error::new(
                    decorator.span(),
                    format!("unknown decorator `{other}`. Expected `skip`"),
                ));
            }
        }
    }

    let body_content;
    braced!(body_content in input);
    let body: TokenStream = body_content.parse()?;

    Ok(ItBlock {
        name,
        skipped,
        skip_reason,
        body,
    })
}

/// Parse: `{ body }`
fn parse_hook_block(input: ParseStream, kind: HookKind, skipped: bool) -> Result<DslItem> {
    let content;
    braced!(content in input);
    let body: TokenStream = content.parse()?;
    Ok(DslItem::Hook(HookBlock {
        kind,
        skipped,
        body,
    }))
}
