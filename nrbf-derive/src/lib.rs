//! # Nrbf Derive Macros
//!
//! This crate provides the procedural macro for `nrbf`. `#[derive(NrbfClass)]`
//! maps a struct with named fields onto a class layout and implements both
//! `nrbf::rt::NrbfClass` and `nrbf::rt::NrbfField` for it.
//!
//! Compatible with `syn 2.0`.

use proc_macro::TokenStream;
use quote::quote;
use syn::{Attribute, Data, DeriveInput, Fields, LitStr, parse_macro_input};

/// Derives `NrbfClass` and `NrbfField`.
///
/// Struct attribute: `#[nrbf(class = "Ns.Name", library = "Assembly")]`.
/// Both keys are optional; the class name defaults to the struct name and a
/// missing library makes it a system class.
///
/// Field attribute: `#[nrbf(rename = "wireName")]`.
#[proc_macro_derive(NrbfClass, attributes(nrbf))]
pub fn derive_nrbf_class(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(tokens) => TokenStream::from(tokens),
        Err(e) => e.to_compile_error().into(),
    }
}

struct MemberField {
    ident: syn::Ident,
    ty: syn::Type,
    wire_name: String,
}

fn expand(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;

    // The cached shape lives in a static, which is shared by every
    // instantiation of a generic item.
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "NrbfClass cannot be derived for generic structs",
        ));
    }

    let Data::Struct(data_struct) = &input.data else {
        return Err(syn::Error::new(name.span(), "NrbfClass only supports structs"));
    };
    let Fields::Named(named) = &data_struct.fields else {
        return Err(syn::Error::new(
            name.span(),
            "NrbfClass only supports structs with named fields",
        ));
    };

    let (class_name, library) = parse_struct_attributes(&input.attrs)?;
    let class_name = class_name.unwrap_or_else(|| name.to_string());
    let library_expr = match &library {
        Some(lib) => quote! { ::core::option::Option::Some(#lib) },
        None => quote! { ::core::option::Option::None },
    };

    let mut fields = Vec::new();
    for field in &named.named {
        let Some(ident) = field.ident.clone() else {
            return Err(syn::Error::new(name.span(), "unnamed field"));
        };
        let wire_name = parse_field_attributes(&field.attrs)?.unwrap_or_else(|| ident.to_string());
        fields.push(MemberField {
            ident,
            ty: field.ty.clone(),
            wire_name,
        });
    }

    let shape_members = fields.iter().map(|f| {
        let ty = &f.ty;
        let wire = &f.wire_name;
        quote! {
            .member(#wire, <#ty as nrbf::rt::NrbfField>::member_type())
        }
    });
    let to_values = fields.iter().map(|f| {
        let ident = &f.ident;
        quote! {
            nrbf::rt::NrbfField::to_value(&self.#ident, graph)?
        }
    });
    let from_members = fields.iter().map(|f| {
        let ident = &f.ident;
        let ty = &f.ty;
        let wire = &f.wire_name;
        quote! {
            #ident: nrbf::rt::member::<#ty>(graph, instance, #wire)?
        }
    });

    Ok(quote! {
        impl nrbf::rt::NrbfClass for #name {
            fn shape() -> nrbf::rt::Arc<nrbf::rt::ClassShape> {
                static SHAPE: nrbf::rt::OnceLock<nrbf::rt::Arc<nrbf::rt::ClassShape>> =
                    nrbf::rt::OnceLock::new();
                nrbf::rt::Arc::clone(SHAPE.get_or_init(|| {
                    nrbf::rt::Arc::new(
                        nrbf::rt::ClassShape::new(#class_name, #library_expr)
                            #(#shape_members)*
                    )
                }))
            }

            fn to_node(&self, graph: &mut nrbf::ObjectGraph) -> nrbf::Result<nrbf::NodeId> {
                let values = vec![#(#to_values),*];
                Ok(graph.add_class(<Self as nrbf::rt::NrbfClass>::shape(), values))
            }

            fn from_node(graph: &nrbf::ObjectGraph, node: nrbf::NodeId) -> nrbf::Result<Self> {
                let shape = <Self as nrbf::rt::NrbfClass>::shape();
                let instance = nrbf::rt::expect_class(graph, node, &shape)?;
                Ok(Self {
                    #(#from_members),*
                })
            }
        }

        impl nrbf::rt::NrbfField for #name {
            fn member_type() -> nrbf::MemberType {
                nrbf::rt::class_member_type(&<Self as nrbf::rt::NrbfClass>::shape())
            }

            fn to_value(&self, graph: &mut nrbf::ObjectGraph) -> nrbf::Result<nrbf::Value> {
                Ok(nrbf::Value::Ref(nrbf::rt::NrbfClass::to_node(self, graph)?))
            }

            fn from_value(graph: &nrbf::ObjectGraph, value: &nrbf::Value) -> nrbf::Result<Self> {
                let node = nrbf::rt::expect_ref(value, #class_name)?;
                <Self as nrbf::rt::NrbfClass>::from_node(graph, node)
            }
        }
    })
}

/// Parses `#[nrbf(class = "...", library = "...")]`.
fn parse_struct_attributes(attrs: &[Attribute]) -> syn::Result<(Option<String>, Option<String>)> {
    let mut class = None;
    let mut library = None;

    for attr in attrs {
        if attr.path().is_ident("nrbf") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("class") {
                    let s: LitStr = meta.value()?.parse()?;
                    class = Some(s.value());
                    return Ok(());
                }
                if meta.path.is_ident("library") {
                    let s: LitStr = meta.value()?.parse()?;
                    library = Some(s.value());
                    return Ok(());
                }
                Err(meta.error("Unknown nrbf attribute key. Supported: class, library"))
            })?;
        }
    }
    Ok((class, library))
}

/// Parses `#[nrbf(rename = "...")]`.
fn parse_field_attributes(attrs: &[Attribute]) -> syn::Result<Option<String>> {
    let mut rename = None;

    for attr in attrs {
        if attr.path().is_ident("nrbf") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("rename") {
                    let s: LitStr = meta.value()?.parse()?;
                    rename = Some(s.value());
                    return Ok(());
                }
                Err(meta.error("Unknown nrbf field attribute key. Supported: rename"))
            })?;
        }
    }
    Ok(rename)
}
