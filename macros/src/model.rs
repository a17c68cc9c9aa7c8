use darling::{ast, FromDeriveInput, FromField};
use proc_macro2::{TokenStream, TokenTree};
use quote::{format_ident, quote, ToTokens};
use syn::Meta;

#[derive(Debug, FromDeriveInput)]
#[darling(supports(struct_named), forward_attrs)]
struct ModelReceiver {
	ident: syn::Ident,
	generics: syn::Generics,
	data: ast::Data<(), FieldReceiver>,
	attrs: Vec<syn::Attribute>,
}

#[derive(Debug, FromField)]
#[darling(forward_attrs)]
struct FieldReceiver {
	ident: Option<syn::Ident>,
	ty: syn::Type,
	vis: syn::Visibility,
	attrs: Vec<syn::Attribute>,
}

/// Whether the attribute is `#[<name>(...)]` containing one of `idents`.
fn list_contains(attr: &syn::Attribute, name: &str, idents: &[&str]) -> bool {
	let Meta::List(ref list) = attr.meta else {
		return false;
	};

	list.path.is_ident(name)
		&& list.tokens.to_token_stream().into_iter().any(
			|token| matches!(token, TokenTree::Ident(ref ident) if idents.iter().any(|i| ident == i)),
		)
}

/// Database mapping attributes only make sense on the stored model.
fn is_sqlx(attr: &syn::Attribute) -> bool {
	attr.path().is_ident("sqlx")
}

fn is_option(ty: &syn::Type) -> bool {
	let syn::Type::Path(path) = ty else {
		return false;
	};

	path.qself.is_none()
		&& path
			.path
			.segments
			.last()
			.is_some_and(|segment| segment.ident == "Option")
}

pub fn from_input(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
	let input = syn::parse_macro_input!(input as syn::DeriveInput);
	let receiver = match ModelReceiver::from_derive_input(&input) {
		Ok(x) => x,
		Err(e) => return e.write_errors().into(),
	};

	let ident = &receiver.ident;
	let vis = &input.vis;
	let generics = &receiver.generics;
	let create_ident = format_ident!("Create{}", ident);
	let update_ident = format_ident!("Update{}", ident);

	// doc comments describe the stored model, the generated inputs get their own
	let attrs = receiver
		.attrs
		.iter()
		.filter(|attr| !is_sqlx(attr) && !attr.path().is_ident("doc"))
		.collect::<Vec<_>>();

	let ast::Data::Struct(fields) = receiver.data else {
		unreachable!("darling only accepts named structs")
	};

	let fields = fields
		.iter()
		.filter(|field| {
			!field
				.attrs
				.iter()
				.any(|attr| list_contains(attr, "serde", &["skip", "skip_deserializing"]))
		})
		.filter_map(|field| {
			let attrs = field
				.attrs
				.iter()
				.filter(|attr| !is_sqlx(attr))
				.collect::<Vec<_>>();

			Some((attrs, field.ident.as_ref()?, &field.ty, &field.vis))
		})
		.collect::<Vec<_>>();

	let create_fields = fields.iter().map(|(attrs, ident, ty, vis)| {
		quote! {
			#(#attrs)*
			#vis #ident: #ty,
		}
	});

	let update_fields = fields.iter().map(|(attrs, ident, ty, vis)| {
		let ty: TokenStream = if is_option(ty) {
			quote!(#ty)
		} else {
			quote!(Option<#ty>)
		};

		quote! {
			#(#attrs)*
			#vis #ident: #ty,
		}
	});

	let create_doc = format!("Input for creating a [`{ident}`].");
	let update_doc = format!("Input for updating a [`{ident}`]. Missing fields are left untouched.");

	quote! {
		#input

		#[doc = #create_doc]
		#(#attrs)*
		#vis struct #create_ident #generics {
			#(#create_fields)*
		}

		#[doc = #update_doc]
		#(#attrs)*
		#vis struct #update_ident #generics {
			#(#update_fields)*
		}
	}
	.into()
}
