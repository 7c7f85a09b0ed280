// SPDX-License-Identifier: GPL-3.0-only

use syn::{LitStr, Result as SynResult, Token, parse::Parse, parse::ParseStream};

pub(crate) struct WithCallerArgs {
    pub(crate) name: String,
}

impl Parse for WithCallerArgs {
    fn parse(input: ParseStream) -> SynResult<Self> {
        let mut name = "caller".to_string();

        if input.peek(syn::Ident) {
            let ident: syn::Ident = input.parse()?;
            if ident != "name" {
                return Err(syn::Error::new(
                    ident.span(),
                    "expected `name = \"...\"`",
                ));
            }
            let _: Token![=] = input.parse()?;
            let lit: LitStr = input.parse()?;
            name = lit.value();
        }

        Ok(WithCallerArgs { name })
    }
}
