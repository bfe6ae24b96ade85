//! Implementation of `#[derive(Component)]`.
//!
//! Generates a `ComponentClass` impl whose `metadata()` is built from the
//! struct-level `#[component(...)]` attribute.

use proc_macro2::TokenStream;
use quote::quote;
use syn::meta::ParseNestedMeta;
use syn::{DeriveInput, Expr, ExprArray, Lit, LitStr, Result};

struct Property {
    name: String,
    kind: String,
    required: bool,
}

struct ComponentMeta {
    name: String,
    actions: Vec<String>,
    properties: Vec<Property>,
}

impl ComponentMeta {
    fn parse(input: &DeriveInput) -> Result<Self> {
        let mut meta = ComponentMeta {
            name: input.ident.to_string().to_lowercase(),
            actions: Vec::new(),
            properties: Vec::new(),
        };

        for attr in &input.attrs {
            if !attr.path().is_ident("component") {
                continue;
            }
            attr.parse_nested_meta(|nested| {
                if nested.path.is_ident("name") {
                    let lit: LitStr = nested.value()?.parse()?;
                    if lit.value().trim().is_empty() {
                        return Err(syn::Error::new_spanned(
                            lit,
                            "component name must not be empty",
                        ));
                    }
                    meta.name = lit.value();
                    Ok(())
                } else if nested.path.is_ident("supported_actions") {
                    let array: ExprArray = nested.value()?.parse()?;
                    for elem in &array.elems {
                        meta.actions.push(string_literal(elem)?);
                    }
                    Ok(())
                } else if nested.path.is_ident("property") {
                    meta.properties.push(parse_property(&nested)?);
                    Ok(())
                } else {
                    Err(nested.error("expected `name`, `supported_actions`, or `property`"))
                }
            })?;
        }

        Ok(meta)
    }
}

fn string_literal(expr: &Expr) -> Result<String> {
    match expr {
        Expr::Lit(lit) => match &lit.lit {
            Lit::Str(s) => Ok(s.value()),
            other => Err(syn::Error::new_spanned(other, "expected a string literal")),
        },
        other => Err(syn::Error::new_spanned(other, "expected a string literal")),
    }
}

fn parse_property(nested: &ParseNestedMeta) -> Result<Property> {
    let mut name = None;
    let mut kind = "string".to_string();
    let mut required = false;

    nested.parse_nested_meta(|inner| {
        if inner.path.is_ident("name") {
            let lit: LitStr = inner.value()?.parse()?;
            name = Some(lit.value());
            Ok(())
        } else if inner.path.is_ident("kind") {
            let lit: LitStr = inner.value()?.parse()?;
            kind = lit.value();
            Ok(())
        } else if inner.path.is_ident("required") {
            required = true;
            Ok(())
        } else {
            Err(inner.error("expected `name`, `kind`, or `required`"))
        }
    })?;

    let name = name.ok_or_else(|| nested.error("property needs a `name`"))?;
    Ok(Property {
        name,
        kind,
        required,
    })
}

pub fn expand(input: DeriveInput) -> Result<TokenStream> {
    let ident = &input.ident;
    match &input.data {
        syn::Data::Struct(_) | syn::Data::Enum(_) => {}
        syn::Data::Union(_) => {
            return Err(syn::Error::new_spanned(
                ident,
                "Component cannot be derived for unions",
            ));
        }
    }

    let meta = ComponentMeta::parse(&input)?;
    let component_name = &meta.name;
    let actions = &meta.actions;

    let properties: Vec<TokenStream> = meta
        .properties
        .iter()
        .map(|p| {
            let name = &p.name;
            let kind = &p.kind;
            let required = p.required;
            quote! { .with_property(#name, #kind, #required) }
        })
        .collect();

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::convokit_core::ComponentClass for #ident #ty_generics #where_clause {
            fn metadata() -> ::convokit_core::ComponentMetadata {
                let actions: &[&str] = &[#(#actions),*];
                ::convokit_core::ComponentMetadata::new(#component_name)
                    .with_actions(actions.iter().copied())
                    #(#properties)*
            }
        }
    })
}
