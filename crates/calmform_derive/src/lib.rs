use proc_macro::TokenStream;
use proc_macro2::{Ident, Span, TokenStream as TokenStream2};
use proc_macro_crate::{FoundCrate, crate_name};
use quote::quote;
use syn::{Data, DeriveInput, Fields, parse_macro_input};

/// Derives `calmform::form::FormModel` for a struct with named fields.
///
/// Every field type must convert into a `FieldValue` (`Into<FieldValue> + Clone`)
/// and back out of one (`FromFieldValue`).
#[proc_macro_derive(FormModel)]
pub fn derive_form_model(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    if !input.generics.params.is_empty() {
        return syn::Error::new_spanned(
            input.ident,
            "FormModel derive currently supports only non-generic structs",
        )
        .to_compile_error()
        .into();
    }

    let model_ident = input.ident;

    let named_fields = match input.data {
        Data::Struct(data) => match data.fields {
            Fields::Named(fields) => fields.named,
            _ => {
                return syn::Error::new(
                    Span::call_site(),
                    "FormModel derive requires a struct with named fields",
                )
                .to_compile_error()
                .into();
            }
        },
        _ => {
            return syn::Error::new(
                Span::call_site(),
                "FormModel derive is only supported on structs",
            )
            .to_compile_error()
            .into();
        }
    };

    let calmform = calmform_path();
    let mut names = Vec::new();
    let mut inserts = Vec::new();
    let mut extracts = Vec::new();

    for field in named_fields {
        let Some(field_ident) = field.ident else {
            continue;
        };
        let field_ty = field.ty;
        let field_name = field_ident.to_string();

        inserts.push(quote! {
            values.insert(
                ::std::string::String::from(#field_name),
                ::core::convert::Into::<#calmform::form::FieldValue>::into(
                    ::core::clone::Clone::clone(&self.#field_ident),
                ),
            );
        });

        extracts.push(quote! {
            #field_ident: #calmform::form::field_from_values::<#field_ty>(values, #field_name)?,
        });

        names.push(field_name);
    }

    quote! {
        impl #calmform::form::FormModel for #model_ident {
            fn field_names() -> &'static [&'static str] {
                &[#(#names),*]
            }

            fn to_values(&self) -> #calmform::form::FieldValues {
                let mut values = #calmform::form::FieldValues::new();
                #(#inserts)*
                values
            }

            fn from_values(
                values: &#calmform::form::FieldValues,
            ) -> #calmform::form::FormResult<Self> {
                ::core::result::Result::Ok(Self {
                    #(#extracts)*
                })
            }
        }
    }
    .into()
}

fn calmform_path() -> TokenStream2 {
    match crate_name("calmform") {
        Ok(FoundCrate::Name(name)) => {
            let ident = Ident::new(&name, Span::call_site());
            quote!(::#ident)
        }
        Ok(FoundCrate::Itself) => quote!(crate),
        Err(_) => quote!(::calmform),
    }
}
