// Hardware wallet conformance harness and supporting software libraries
//
// Copyright (C) 2024 Alekos Filini
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use proc_macro::TokenStream;

use quote::quote;

use syn::parse::{Parse, ParseStream};
use syn::punctuated::Punctuated;
use syn::{parse_macro_input, Ident, ItemFn, LitStr, Token};

#[derive(Debug, Clone, Default)]
struct Attributes {
    seed: Option<String>,
    misbehavior: Option<String>,
}

struct SingleAttr {
    name: Ident,
    _equal: Token![=],
    value: LitStr,
}

impl Parse for SingleAttr {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        Ok(SingleAttr {
            name: input.parse()?,
            _equal: input.parse()?,
            value: input.parse()?,
        })
    }
}

impl Parse for Attributes {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let mut attrs = Attributes::default();
        let parsed = Punctuated::<SingleAttr, Token![,]>::parse_terminated(input).unwrap();
        for attr in &parsed {
            match attr.name.to_string().as_str() {
                "seed" => attrs.seed = Some(attr.value.value()),
                "misbehavior" => attrs.misbehavior = Some(attr.value.value()),
                x => panic!("Invalid attr {}", x),
            }
        }

        Ok(attrs)
    }
}

/// Wraps an `async fn(TestEnv) -> Result<(), Error>` into a tokio test that
/// boots a scripted wallet fixture and hands it to the body.
///
/// Attributes: `seed` (hex, 32 bytes) fixes the fixture's signing key;
/// `misbehavior` makes the fixture deviate from the honest flow (see
/// `Misbehavior` for the accepted names).
#[proc_macro_attribute]
pub fn conformance_test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let attrs = parse_macro_input!(attr as Attributes);

    let mut input = parse_macro_input!(item as ItemFn);
    let original_ident = input.sig.ident.clone();
    let new_ident = Ident::new(&format!("{}_inner", original_ident), original_ident.span());
    input.sig.ident = new_ident.clone();

    let seed = match attrs.seed {
        None => quote! { [0x07u8; 32] },
        Some(v) => quote! {{
            let bytes = hex::decode(#v).expect("Valid hex seed");
            let seed: [u8; 32] = bytes.as_slice().try_into().expect("32 byte seed");
            seed
        }},
    };
    let misbehavior = match attrs.misbehavior {
        None => quote! { crate::tests::fixture::Misbehavior::None },
        Some(v) => quote! {{
            use std::str::FromStr;
            crate::tests::fixture::Misbehavior::from_str(#v).expect("Valid misbehavior name")
        }},
    };

    let expanded = quote! {
        #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
        async fn #original_ident() -> Result<(), crate::Error> {
            #input

            crate::tests::INIT_LOG.call_once(|| {
                env_logger::init();
            });

            let wallet = crate::tests::fixture::FakeWallet::new(#seed, #misbehavior);
            let env = crate::tests::TestEnv::new(wallet);

            #new_ident(env).await
        }
    };

    TokenStream::from(expanded)
}
