mod model;
mod route;

use proc_macro::TokenStream;

/// Adds a `<name>_docs` function next to the handler that documents it for the
/// api router. The first doc line becomes the summary, the rest the description.
#[proc_macro_attribute]
pub fn route(args: TokenStream, input: TokenStream) -> TokenStream {
	route::from_input(args, input)
}

/// Derives `CreateX` and `UpdateX` input structs from the model `X`.
///
/// Fields marked `#[serde(skip)]` or `#[serde(skip_deserializing)]` are left out,
/// `sqlx` attributes are dropped and every field of `UpdateX` is optional.
#[proc_macro_attribute]
pub fn model(_args: TokenStream, input: TokenStream) -> TokenStream {
	model::from_input(input)
}
