//! `#[derive(FromRow)]`: generates an impl of `voltrs::row::FromRow` that
//! pulls each field out of a result-table row by column name.
//!
//! ```ignore
//! #[derive(FromRow)]
//! struct Account {
//!     id: i64,
//!     #[voltrs(rename = "acct_name")]
//!     name: String,
//!     balance: Option<f64>,
//! }
//! ```

use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Fields, LitStr};

const ATTR: &str = "voltrs";

fn column_name(field: &syn::Field) -> syn::Result<String> {
    for attr in &field.attrs {
        if !attr.path().is_ident(ATTR) {
            continue;
        }
        let mut renamed = None;
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") {
                let value = meta.value()?;
                let lit: LitStr = value.parse()?;
                renamed = Some(lit.value());
                Ok(())
            } else {
                Err(meta.error("unrecognized voltrs field attribute"))
            }
        })?;
        if let Some(name) = renamed {
            return Ok(name);
        }
    }
    Ok(field
        .ident
        .as_ref()
        .expect("FromRow only supports named fields")
        .to_string())
}

fn expand(input: DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let ident = input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = match input.data {
        Data::Struct(data) => match data.fields {
            Fields::Named(named) => named.named,
            _ => {
                return Err(syn::Error::new(
                    Span::call_site(),
                    "FromRow can only be derived for structs with named fields",
                ))
            }
        },
        _ => {
            return Err(syn::Error::new(
                Span::call_site(),
                "FromRow can only be derived for structs",
            ))
        }
    };

    let mut field_inits = Vec::with_capacity(fields.len());
    for field in &fields {
        let name = column_name(field)?;
        let field_ident = field.ident.as_ref().unwrap();
        let field_ty = &field.ty;
        field_inits.push(quote! {
            #field_ident: <#field_ty as ::voltrs::value::FromValue>::from_value(
                row.get_by_name(#name)?
            )?
        });
    }

    Ok(quote! {
        #[automatically_derived]
        impl #impl_generics ::voltrs::row::FromRow for #ident #ty_generics #where_clause {
            fn from_row(row: &::voltrs::row::Row) -> ::voltrs::error::Result<Self> {
                Ok(#ident {
                    #(#field_inits),*
                })
            }
        }
    })
}

#[proc_macro_derive(FromRow, attributes(voltrs))]
pub fn derive_from_row(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}
