use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;

use syn::spanned::Spanned as _;
use syn::{
    Attribute, Data, DeriveInput, Error, Expr, Field, Fields, GenericArgument, Ident, LitStr,
    PathArguments, Type,
};

const INJECT_ATTR: &str = "inject";
const INJECTABLE_ATTR: &str = "injectable";

/// Returns the `T` of a field typed `Wrapper<T>`.
fn extract_wrapped_type(ty: &Type, wrapper: &str) -> Option<Type> {
    if let Type::Path(type_path) = ty
        && type_path.qself.is_none()
        && let Some(segment) = type_path.path.segments.last()
        && segment.ident == wrapper
        && let PathArguments::AngleBracketed(args) = &segment.arguments
        && let Some(GenericArgument::Type(inner)) = args.args.first()
    {
        return Some(inner.clone());
    }
    None
}

enum FieldKind {
    Required(Type),
    Optional(Type),
    Lazy(Type),
    Property(Type),
}

impl FieldKind {
    fn of(ty: &Type) -> Option<Self> {
        if let Some(inner) = extract_wrapped_type(ty, "Option") {
            return extract_wrapped_type(&inner, "Arc").map(FieldKind::Optional);
        }
        if let Some(inner) = extract_wrapped_type(ty, "Arc") {
            return Some(FieldKind::Required(inner));
        }
        if let Some(inner) = extract_wrapped_type(ty, "Lazy") {
            return Some(FieldKind::Lazy(inner));
        }
        extract_wrapped_type(ty, "Property").map(FieldKind::Property)
    }
}

#[derive(Default)]
struct InjectArgs {
    token: Option<Expr>,
    default: bool,
}

fn parse_inject_args(field: &Field) -> syn::Result<InjectArgs> {
    let mut args = InjectArgs::default();
    for attr in &field.attrs {
        if !attr.path().is_ident(INJECT_ATTR) {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("token") {
                args.token = Some(meta.value()?.parse()?);
                Ok(())
            } else if meta.path.is_ident("default") {
                args.default = true;
                Ok(())
            } else {
                Err(meta.error("expected `token = ...` or `default`"))
            }
        })?;
    }
    if args.default && args.token.is_some() {
        return Err(Error::new(
            field.span(),
            "`default` fields are not injected and cannot have a token",
        ));
    }
    Ok(args)
}

enum HookKind {
    PostConstruct,
    PostConstructAsync,
    PreDestroy,
    PreDestroyAsync,
}

fn parse_injectable_args(attrs: &[Attribute]) -> syn::Result<(Vec<(HookKind, Ident)>, bool)> {
    let mut hooks = Vec::new();
    let mut dispose = false;
    for attr in attrs {
        if !attr.path().is_ident(INJECTABLE_ATTR) {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            let kind = if meta.path.is_ident("post_construct") {
                HookKind::PostConstruct
            } else if meta.path.is_ident("post_construct_async") {
                HookKind::PostConstructAsync
            } else if meta.path.is_ident("pre_destroy") {
                HookKind::PreDestroy
            } else if meta.path.is_ident("pre_destroy_async") {
                HookKind::PreDestroyAsync
            } else if meta.path.is_ident("dispose") {
                dispose = true;
                return Ok(());
            } else {
                return Err(meta.error("unsupported injectable attribute"));
            };
            let method: LitStr = meta.value()?.parse()?;
            hooks.push((kind, method.parse::<Ident>()?));
            Ok(())
        })?;
    }
    Ok((hooks, dispose))
}

/// Derive macro for the Injectable trait
#[proc_macro_derive(Injectable, attributes(inject, injectable))]
pub fn derive_injectable(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as DeriveInput);
    handle_derive_injectable(input)
        .unwrap_or_else(Error::into_compile_error)
        .into()
}

fn handle_derive_injectable(input: DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let fields = match &input.data {
        Data::Struct(s) => &s.fields,
        _ => return Err(Error::new(name.span(), "Only structs are supported")),
    };
    if !input.generics.params.is_empty() {
        return Err(Error::new(
            input.generics.span(),
            "Generic structs are not supported",
        ));
    }

    let mut parameters = Vec::new();
    let mut field_lets = Vec::new();
    let mut field_inits = Vec::new();
    let mut metadata_calls = Vec::new();

    match fields {
        Fields::Named(fields) => {
            for field in &fields.named {
                let field_ident = field
                    .ident
                    .as_ref()
                    .ok_or_else(|| Error::new(field.span(), "Expected a named field"))?;
                let field_ty = &field.ty;
                let args = parse_inject_args(field)?;

                if args.default {
                    field_inits.push(quote! {
                        #field_ident: ::core::default::Default::default()
                    });
                    continue;
                }

                let kind = FieldKind::of(field_ty).ok_or_else(|| {
                    Error::new(
                        field_ty.span(),
                        format!(
                            "Injected fields must be Arc<T>, Option<Arc<T>>, Lazy<T> or Property<T>, or use #[{INJECT_ATTR}(default)]"
                        ),
                    )
                })?;

                let (inner, modifier, take) = match kind {
                    FieldKind::Property(inner) => {
                        let identifier = match &args.token {
                            Some(token) => quote! { #token },
                            None => quote! { ::graft::ServiceId::of::<#inner>() },
                        };
                        metadata_calls.push(quote! {
                            .property_with(
                                ::core::stringify!(#field_ident),
                                #identifier,
                                |this: &Self| &this.#field_ident,
                            )
                        });
                        field_inits.push(quote! { #field_ident: ::graft::Property::new() });
                        continue;
                    }
                    FieldKind::Required(inner) => (inner, quote! {}, quote! { required }),
                    FieldKind::Optional(inner) => {
                        (inner, quote! { .optional() }, quote! { optional })
                    }
                    FieldKind::Lazy(inner) => (inner, quote! { .lazy() }, quote! { lazy }),
                };
                let inject = args.token.as_ref().map(|token| quote! { .inject(#token) });
                parameters.push(quote! {
                    ::graft::Parameter::of::<#inner>() #modifier #inject
                });
                field_lets.push(quote! {
                    let #field_ident = args.#take::<#inner>()?;
                });
                field_inits.push(quote! { #field_ident: #field_ident });
            }
        }
        Fields::Unnamed(_) => {
            return Err(Error::new(name.span(), "Tuple structs are not supported"));
        }
        Fields::Unit => {}
    }

    let (hooks, dispose) = parse_injectable_args(&input.attrs)?;
    for (kind, method) in hooks {
        let hook_name = method.to_string();
        metadata_calls.push(match kind {
            HookKind::PostConstruct => quote! {
                .post_construct(#hook_name, |this: &Self| {
                    let result: ::core::result::Result<(), ::graft::StdError> =
                        Self::#method(this).map_err(::core::convert::Into::into);
                    result
                })
            },
            HookKind::PreDestroy => quote! {
                .pre_destroy(#hook_name, |this: &Self| {
                    let result: ::core::result::Result<(), ::graft::StdError> =
                        Self::#method(this).map_err(::core::convert::Into::into);
                    result
                })
            },
            HookKind::PostConstructAsync => quote! {
                .post_construct_async(#hook_name, |this: ::std::sync::Arc<Self>| async move {
                    let result: ::core::result::Result<(), ::graft::StdError> =
                        Self::#method(&this).await.map_err(::core::convert::Into::into);
                    result
                })
            },
            HookKind::PreDestroyAsync => quote! {
                .pre_destroy_async(#hook_name, |this: ::std::sync::Arc<Self>| async move {
                    let result: ::core::result::Result<(), ::graft::StdError> =
                        Self::#method(&this).await.map_err(::core::convert::Into::into);
                    result
                })
            },
        });
    }
    if dispose {
        metadata_calls.push(quote! { .dispose() });
    }

    let body = match fields {
        Fields::Unit => quote! { Self },
        _ => quote! { Self { #(#field_inits,)* } },
    };

    Ok(quote! {
        impl ::graft::Injectable for #name {
            fn dependencies() -> ::graft::Dependencies {
                ::graft::Dependencies::new()
                    #(.with(#parameters))*
            }

            #[allow(unused_variables)]
            fn construct(
                args: &mut ::graft::Arguments
            ) -> ::core::result::Result<Self, ::graft::StdError> {
                #(#field_lets)*
                ::core::result::Result::Ok(#body)
            }

            fn metadata() -> ::graft::Metadata<Self> {
                ::graft::Metadata::new()
                    #(#metadata_calls)*
            }
        }
    })
}
