use proc_macro::TokenStream;

mod handler;
mod parsing;
mod schema_model;

/// Derives `praxis::core::SchemaModel`, marking a type as a structured
/// schema so that handlers decode it with a validating codec.
///
/// # Attributes
///
/// - `#[schema(name = "...")]` overrides the schema name (defaults to the type name)
/// - `#[schema(validate = path)]` runs `path(&value) -> Result<(), String>` after decoding
///
/// # Example
///
/// ```ignore
/// #[derive(Serialize, Deserialize, SchemaModel)]
/// #[schema(name = "checkout.v1", validate = Checkout::check)]
/// struct Checkout {
///     items: Vec<String>,
/// }
/// ```
#[proc_macro_derive(SchemaModel, attributes(schema))]
pub fn derive_schema_model(input: TokenStream) -> TokenStream {
    schema_model::derive_schema_model_impl(input)
}

/// Marks an async function as a service handler.
///
/// The function must take the invocation context and at most one input,
/// and return `Result<T, E>` with `E: Into<HandlerError>`. A companion
/// `<name>_handler()` function is generated that returns the handler's
/// signature for registration.
///
/// # Example
///
/// ```ignore
/// #[handler]
/// async fn checkout(ctx: Context, order: Checkout) -> Result<Receipt, HandlerError> {
///     // ...
/// }
///
/// registry.register(ServiceTag::service("Shop"), HandlerIOBuilder::new(), None, None, checkout_handler())?;
/// ```
#[proc_macro_attribute]
pub fn handler(attr: TokenStream, item: TokenStream) -> TokenStream {
    handler::handler_impl(attr, item)
}
