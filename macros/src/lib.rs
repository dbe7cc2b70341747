//! Augment the testing of cellar primitives with procedural macros.

use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::quote;
use syn::{parse_macro_input, AttributeArgs, Ident, ItemFn, Lit, Meta, NestedMeta};

/// Levels accepted by [macro@test_traced].
const LEVELS: [&str; 5] = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];

/// Run a test function with a [tracing_subscriber] that captures log events
/// at the given level (`DEBUG` if omitted).
///
/// Events are written through the test writer, so they are only shown for
/// failing tests (or with `--nocapture`).
///
/// The annotated crate must depend on `tracing` and `tracing-subscriber`.
///
/// # Example
///
/// ```rust,ignore
/// use cellar_macros::test_traced;
/// use tracing::{debug, info};
///
/// #[test_traced(level = "INFO")]
/// fn test_info_level() {
///     info!("This is an info log");
///     debug!("This is a debug log (won't be shown)");
///     assert_eq!(2 + 2, 4);
/// }
/// ```
#[proc_macro_attribute]
pub fn test_traced(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = parse_macro_input!(attr as AttributeArgs);
    let input = parse_macro_input!(item as ItemFn);

    // Parse the requested level
    let mut level = String::from("DEBUG");
    for arg in args {
        match arg {
            NestedMeta::Meta(Meta::NameValue(nv)) if nv.path.is_ident("level") => match nv.lit {
                Lit::Str(lit) => level = lit.value().to_uppercase(),
                other => {
                    return syn::Error::new_spanned(other, "level must be a string literal")
                        .to_compile_error()
                        .into();
                }
            },
            other => {
                return syn::Error::new_spanned(other, "expected `level = \"...\"`")
                    .to_compile_error()
                    .into();
            }
        }
    }
    if !LEVELS.contains(&level.as_str()) {
        return syn::Error::new(
            Span::call_site(),
            format!("invalid level `{level}`, expected one of {LEVELS:?}"),
        )
        .to_compile_error()
        .into();
    }
    let level = Ident::new(&level, Span::call_site());

    // Wrap the body in a scoped subscriber
    let attrs = &input.attrs;
    let vis = &input.vis;
    let sig = &input.sig;
    let block = &input.block;
    let expanded = quote! {
        #[test]
        #(#attrs)*
        #vis #sig {
            let subscriber = ::tracing_subscriber::fmt()
                .with_test_writer()
                .with_max_level(::tracing::Level::#level)
                .with_line_number(true)
                .finish();
            ::tracing::subscriber::with_default(subscriber, || #block)
        }
    };
    TokenStream::from(expanded)
}
