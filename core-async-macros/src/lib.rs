//! Attribute macros that run `async fn` tests and entry points on the
//! `core_async` runtime, so downstream crates never name Tokio directly.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, ItemFn};

#[proc_macro_attribute]
pub fn test(attr: TokenStream, item: TokenStream) -> TokenStream {
    expand(attr, item, MacroKind::Test)
}

#[proc_macro_attribute]
pub fn main(attr: TokenStream, item: TokenStream) -> TokenStream {
    expand(attr, item, MacroKind::Main)
}

enum MacroKind {
    Test,
    Main,
}

fn expand(attr: TokenStream, item: TokenStream, kind: MacroKind) -> TokenStream {
    if !attr.is_empty() {
        let tokens = TokenStream2::from(attr);
        return syn::Error::new_spanned(
            tokens,
            "core_async attribute macros do not accept arguments yet",
        )
        .to_compile_error()
        .into();
    }

    let input = parse_macro_input!(item as ItemFn);

    if input.sig.asyncness.is_none() {
        return syn::Error::new_spanned(
            input.sig.fn_token,
            "core_async attribute macros require `async fn`",
        )
        .to_compile_error()
        .into();
    }

    let mut sync_sig = input.sig.clone();
    sync_sig.asyncness = None;

    let attrs = input.attrs;
    let vis = input.vis;
    let block = input.block;

    let test_attr = match kind {
        MacroKind::Test => quote!(#[test]),
        MacroKind::Main => quote!(),
    };

    quote! {
        #(#attrs)*
        #test_attr
        #vis #sync_sig {
            core_async::runtime::block_on(async move #block)
        }
    }
    .into()
}
