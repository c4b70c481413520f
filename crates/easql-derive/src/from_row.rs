//! FromRow derive macro implementation

use proc_macro2::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Field, Fields, LitStr, Result};

enum Source {
    /// Field name passed through the driver's name mapper.
    Mapped(String),
    /// Explicit `#[orm(column = "...")]`, looked up as is.
    Column(String),
    /// `#[orm(skip)]`, filled with `Default::default()`.
    Skip,
}

pub fn expand(input: DeriveInput) -> Result<TokenStream> {
    let name = &input.ident;
    let generics = &input.generics;
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    &input,
                    "FromRow can only be derived for structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                &input,
                "FromRow can only be derived for structs",
            ));
        }
    };

    let field_extracts = fields
        .iter()
        .map(|field| {
            let field_name = field
                .ident
                .as_ref()
                .ok_or_else(|| syn::Error::new_spanned(field, "expected a named field"))?;

            Ok(match field_source(field)? {
                Source::Mapped(field_str) => quote! {
                    #field_name: row.get(#field_str)?
                },
                Source::Column(column) => quote! {
                    #field_name: row.get_column(#column)?
                },
                Source::Skip => quote! {
                    #field_name: ::core::default::Default::default()
                },
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(quote! {
        impl #impl_generics easql::FromRow for #name #ty_generics #where_clause {
            fn from_row(
                row: &easql::RowView<'_>,
            ) -> ::core::result::Result<Self, easql::MappingError> {
                Ok(Self {
                    #(#field_extracts),*
                })
            }
        }
    })
}

fn field_source(field: &Field) -> Result<Source> {
    let mut source = None;
    for attr in &field.attrs {
        if !attr.path().is_ident("orm") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("column") {
                let lit: LitStr = meta.value()?.parse()?;
                source = Some(Source::Column(lit.value()));
                Ok(())
            } else if meta.path.is_ident("skip") {
                source = Some(Source::Skip);
                Ok(())
            } else {
                Err(meta.error("unsupported orm attribute; expected `column = \"...\"` or `skip`"))
            }
        })?;
    }

    match source {
        Some(source) => Ok(source),
        None => {
            let ident = field
                .ident
                .as_ref()
                .ok_or_else(|| syn::Error::new_spanned(field, "expected a named field"))?;
            // raw identifiers such as `r#type` map from `type`
            let name = ident.to_string();
            let name = name.strip_prefix("r#").unwrap_or(&name).to_string();
            Ok(Source::Mapped(name))
        }
    }
}
