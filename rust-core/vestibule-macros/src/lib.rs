//! # Vestibule Macros
//!
//! Procedural macros for the Vestibule framework.
//!
//! `#[derive(Bindable)]` describes a structure's properties to the parameter
//! binder, so that keys such as `student.grades[1]` can be walked through
//! the declared property types.
//!
//! ```ignore
//! #[derive(Default, Deserialize, Bindable)]
//! #[serde(default)]
//! struct Student {
//!     name: String,
//!     grades: Vec<i64>,
//! }
//! ```
//!
//! Fields honor `#[serde(rename = "...")]` and `#[serde(skip)]`, since the
//! bound tree is deserialized through serde afterwards.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Fields, LitStr};

/// Derive `vestibule_core::Bindable` for a struct with named fields
#[proc_macro_derive(Bindable, attributes(bindable))]
pub fn derive_bindable(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let ident = &input.ident;
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "Bindable cannot be derived for generic types",
        ));
    }

    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new_spanned(
            ident,
            "Bindable can only be derived for structs",
        ));
    };
    let Fields::Named(named) = &data.fields else {
        return Err(syn::Error::new_spanned(
            &data.fields,
            "Bindable requires named fields",
        ));
    };

    let mut fields = Vec::with_capacity(named.named.len());
    for field in &named.named {
        let Some(field_ident) = &field.ident else {
            continue;
        };
        let options = FieldOptions::from_attrs(&field.attrs)?;
        if options.skip {
            continue;
        }
        let name = options
            .rename
            .unwrap_or_else(|| field_ident.to_string().trim_start_matches("r#").to_string());
        let ty = &field.ty;
        fields.push(quote! {
            ::vestibule_core::FieldSpec::new(
                #name,
                <#ty as ::vestibule_core::Bindable>::descriptor(),
            )
        });
    }

    let type_name = ident.to_string();
    Ok(quote! {
        impl ::vestibule_core::Bindable for #ident {
            fn descriptor() -> ::vestibule_core::TypeDescriptor {
                fn fields() -> ::std::vec::Vec<::vestibule_core::FieldSpec> {
                    ::std::vec![#(#fields),*]
                }
                ::vestibule_core::TypeDescriptor::Object(
                    ::vestibule_core::ObjectSchema::new(#type_name, fields),
                )
            }
        }
    })
}

#[derive(Default)]
struct FieldOptions {
    rename: Option<String>,
    skip: bool,
}

impl FieldOptions {
    /// Read `#[serde(...)]` and `#[bindable(...)]` field attributes
    fn from_attrs(attrs: &[syn::Attribute]) -> syn::Result<Self> {
        let mut options = Self::default();
        for attr in attrs {
            let is_serde = attr.path().is_ident("serde");
            if !is_serde && !attr.path().is_ident("bindable") {
                continue;
            }
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("rename") {
                    let lit: LitStr = meta.value()?.parse()?;
                    options.rename = Some(lit.value());
                } else if meta.path.is_ident("skip") || meta.path.is_ident("skip_deserializing") {
                    options.skip = true;
                } else if is_serde {
                    // Other serde options do not affect binding; consume any value.
                    if meta.input.peek(syn::Token![=]) {
                        let _: syn::Expr = meta.value()?.parse()?;
                    } else if meta.input.peek(syn::token::Paren) {
                        let _content;
                        syn::parenthesized!(_content in meta.input);
                    }
                } else {
                    return Err(meta.error("unsupported bindable attribute"));
                }
                Ok(())
            })?;
        }
        Ok(options)
    }
}
