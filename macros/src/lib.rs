use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{
    FnArg, GenericArgument, ItemFn, Pat, PathArguments, ReturnType, Type, parse_macro_input,
};

/// Attribute macro turning a plain function into a single-step flow builder.
///
/// ```rust,ignore
/// #[operation(name = "authorize")]
/// fn authorize(user: &String, password: &String) -> anyhow::Result<bool> {
///     Ok(password == "secret")
/// }
///
/// // Generated:
/// // fn authorize(user: &Key<String>, password: &Key<String>, output: &Key<bool>) -> Flow<bool>
/// let step = authorize(&user_name, &password, &is_authorised);
/// ```
///
/// Reference parameters receive a borrow of the stored value; owned
/// parameters receive a clone. A `Result` return type is unwrapped into the
/// step's output type and its error recorded as the step's failure.
#[proc_macro_attribute]
pub fn operation(attr: TokenStream, item: TokenStream) -> TokenStream {
    let input_fn = parse_macro_input!(item as ItemFn);
    match expand_operation(attr.into(), input_fn) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

struct Param {
    ident: syn::Ident,
    value_type: Type,
    borrowed: bool,
}

fn expand_operation(attr: TokenStream2, mut input_fn: ItemFn) -> syn::Result<TokenStream2> {
    let sig = &input_fn.sig;
    if sig.asyncness.is_some() {
        return Err(syn::Error::new_spanned(
            sig.asyncness,
            "operations run synchronously; remove `async`",
        ));
    }
    if !sig.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &sig.generics,
            "operations cannot be generic",
        ));
    }

    let original_ident = sig.ident.clone();
    let name = operation_name(attr)?.unwrap_or_else(|| original_ident.to_string());
    let params = sig
        .inputs
        .iter()
        .map(parse_param)
        .collect::<syn::Result<Vec<_>>>()?;

    let (output_type, fallible) = match &sig.output {
        ReturnType::Type(_, ty) => match result_value_type(ty) {
            Some(value_type) => (value_type, true),
            None => ((**ty).clone(), false),
        },
        ReturnType::Default => {
            return Err(syn::Error::new_spanned(
                sig,
                "operations must return the value they provide",
            ));
        }
    };

    let vis = input_fn.vis.clone();
    let docs: Vec<syn::Attribute> = input_fn
        .attrs
        .iter()
        .filter(|attr| attr.path().is_ident("doc"))
        .cloned()
        .collect();
    let internal_ident = format_ident!("__stepwise_op_{}", original_ident);
    input_fn.sig.ident = internal_ident.clone();
    input_fn.vis = syn::Visibility::Inherited;

    let key_params = params.iter().map(|param| {
        let (ident, value_type) = (&param.ident, &param.value_type);
        quote! { #ident: &::stepwise_core::Key<#value_type> }
    });
    let key_clones = params.iter().map(|param| {
        let ident = &param.ident;
        let captured = format_ident!("__key_{}", ident);
        quote! { let #captured = ::std::clone::Clone::clone(#ident); }
    });
    let inputs = params.iter().map(|param| {
        let ident = &param.ident;
        quote! { #ident.erased() }
    });
    let reads = params.iter().map(|param| {
        let captured = format_ident!("__key_{}", param.ident);
        if param.borrowed {
            quote! { __scratchpad.get(&#captured)? }
        } else {
            quote! { ::std::clone::Clone::clone(__scratchpad.get(&#captured)?) }
        }
    });

    let call = quote! { #internal_ident(#(#reads),*) };
    let body = if fallible {
        quote! { ::std::result::Result::Ok(#call?) }
    } else {
        quote! { ::std::result::Result::Ok(#call) }
    };

    Ok(quote! {
        #[allow(clippy::ptr_arg)]
        #input_fn

        #(#docs)*
        #vis fn #original_ident(
            #(#key_params,)*
            output: &::stepwise_core::Key<#output_type>,
        ) -> ::stepwise_core::Flow<#output_type> {
            #(#key_clones)*
            let __inputs: ::std::vec::Vec<::stepwise_core::AnyKey> = ::std::vec![#(#inputs),*];
            ::stepwise_core::Flow::single(
                #name,
                __inputs,
                output,
                move |__scratchpad: &::stepwise_core::Scratchpad|
                    -> ::stepwise_core::anyhow::Result<#output_type> {
                    #body
                },
            )
        }
    })
}

fn operation_name(attr: TokenStream2) -> syn::Result<Option<String>> {
    if attr.is_empty() {
        return Ok(None);
    }
    let parser = syn::punctuated::Punctuated::<syn::MetaNameValue, syn::Token![,]>::parse_terminated;
    let metas = syn::parse::Parser::parse2(parser, attr)?;
    let mut name = None;
    for meta in metas {
        if !meta.path.is_ident("name") {
            return Err(syn::Error::new_spanned(meta.path, "expected `name = \"...\"`"));
        }
        match meta.value {
            syn::Expr::Lit(syn::ExprLit {
                lit: syn::Lit::Str(lit),
                ..
            }) => name = Some(lit.value()),
            other => return Err(syn::Error::new_spanned(other, "name must be a string literal")),
        }
    }
    Ok(name)
}

fn parse_param(arg: &FnArg) -> syn::Result<Param> {
    let pat_type = match arg {
        FnArg::Typed(pat_type) => pat_type,
        FnArg::Receiver(receiver) => {
            return Err(syn::Error::new_spanned(
                receiver,
                "operations cannot take `self`",
            ));
        }
    };

    let ident = match &*pat_type.pat {
        Pat::Ident(pat_ident) => pat_ident.ident.clone(),
        other => {
            return Err(syn::Error::new_spanned(
                other,
                "operation parameters must be plain identifiers",
            ));
        }
    };
    if ident == "output" {
        return Err(syn::Error::new_spanned(
            ident,
            "`output` is reserved for the generated output key parameter",
        ));
    }

    match &*pat_type.ty {
        Type::Reference(reference) if reference.mutability.is_some() => Err(
            syn::Error::new_spanned(reference, "scratchpad values cannot be borrowed mutably"),
        ),
        Type::Reference(reference) => Ok(Param {
            ident,
            value_type: (*reference.elem).clone(),
            borrowed: true,
        }),
        other => Ok(Param {
            ident,
            value_type: other.clone(),
            borrowed: false,
        }),
    }
}

/// `T` for `Result<T, ..>` (any path ending in `Result`), else `None`.
fn result_value_type(ty: &Type) -> Option<Type> {
    let Type::Path(type_path) = ty else {
        return None;
    };
    let segment = type_path.path.segments.last()?;
    if segment.ident != "Result" {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    match args.args.first()? {
        GenericArgument::Type(value_type) => Some(value_type.clone()),
        _ => None,
    }
}
