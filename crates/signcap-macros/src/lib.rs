//! Procedural macros re-exported by `signcap`. Depend on `signcap` instead of this crate.

use proc_macro::{Span, TokenStream};
use quote::quote;
use syn::{parse_macro_input, Error, ItemFn, ReturnType};

/// Turns `fn main() -> anyhow::Result<()>` into the program entry point.
///
/// The generated `main` installs the logger, then hands the main thread to the preview GUI and
/// runs the annotated function on a worker thread. The process exits once that function returns.
#[proc_macro_attribute]
pub fn main(args: TokenStream, item: TokenStream) -> TokenStream {
    if !args.is_empty() {
        let span = Span::call_site().into();
        return Error::new(span, "`#[signcap::main]` takes no arguments")
            .to_compile_error()
            .into();
    }

    let user_main = parse_macro_input!(item as ItemFn);
    let sig = &user_main.sig;
    let problem = if sig.ident != "main" {
        Some("`#[signcap::main]` can only be put on `fn main`")
    } else if matches!(sig.output, ReturnType::Default) {
        Some("`#[signcap::main]` needs `main` to return `anyhow::Result<()>`")
    } else {
        None
    };
    if let Some(problem) = problem {
        // Keep the function so that its body still gets checked and highlighted.
        let error = Error::new_spanned(&sig.ident, problem).to_compile_error();
        return quote!(#user_main #error).into();
    }

    quote! {
        fn main() {
            #user_main

            ::signcap::init_logger!();
            ::signcap::gui::run(main);
        }
    }
    .into()
}
