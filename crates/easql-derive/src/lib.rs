//! Derive macros for easql
//!
//! Provides `#[derive(FromRow)]` for struct destinations.

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

mod from_row;

/// Derive `FromRow` trait for a struct.
///
/// Each field is read from the column its name maps to through the
/// driver's `NameMapper` (identity unless configured otherwise).
///
/// # Example
///
/// ```ignore
/// use easql::FromRow;
///
/// #[derive(FromRow)]
/// struct User {
///     id: i64,
///     username: String,
///     #[orm(column = "email_address")]
///     email: Option<String>,
///     #[orm(skip)]
///     display: String,
/// }
/// ```
///
/// # Attributes
///
/// - `#[orm(column = "name")]` - Read the field from this exact column, bypassing the mapper
/// - `#[orm(skip)]` - Do not read the field; fill it with `Default::default()`
#[proc_macro_derive(FromRow, attributes(orm))]
pub fn derive_from_row(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    from_row::expand(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}
