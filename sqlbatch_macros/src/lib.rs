//! Procedural macros for the `sqlbatch` bulk-write library.
//!
//! `#[derive(Batchable)]` inspects a struct with named fields and generates:
//! - an `IntoRecord` impl turning a value into an ordered column/value record;
//! - a `Batchable` impl carrying the table name, column list and key columns.
//!
//! Attributes:
//! - `#[batch(table = "...")]` on the struct overrides the table name
//!   (default: snake_case struct name + `s`, so `UserSetting` -> `user_settings`).
//! - `#[batch(key)]` marks a key column; several fields form a composite key.
//! - `#[batch(column = "...")]` renames the column.
//! - `#[batch(skip)]` leaves the field out of records.

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, spanned::Spanned, Data, DeriveInput, Fields, Ident, LitStr};

use inflections::Inflect;

/// Holds parsed metadata about a single struct field.
struct FieldMetadata {
    ident: Ident,
    column_name: String,
    is_key: bool,
    is_skipped: bool,
}

/// Basic validation of table and column names to avoid generating invalid SQL identifiers.
fn is_valid_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|ch| ch == '_' || ch.is_ascii_alphanumeric())
}

fn parse_table_override(input: &DeriveInput) -> syn::Result<Option<String>> {
    let mut table = None;
    for attr in &input.attrs {
        if !attr.path().is_ident("batch") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                let s: LitStr = meta.value()?.parse()?;
                table = Some(s.value());
                Ok(())
            } else {
                Err(meta.error("unknown struct attribute; expected #[batch(table = \"...\")]"))
            }
        })?;
    }
    Ok(table)
}

/// Parses all named fields from a `DeriveInput` struct.
fn parse_field_metadata(input: &DeriveInput) -> syn::Result<Vec<FieldMetadata>> {
    let fields = match &input.data {
        Data::Struct(s) => match &s.fields {
            Fields::Named(named) => named,
            other => {
                return Err(syn::Error::new(
                    other.span(),
                    "#[derive(Batchable)] only supports structs with named fields",
                ))
            }
        },
        _ => {
            return Err(syn::Error::new(
                input.ident.span(),
                "#[derive(Batchable)] can only be used on structs",
            ))
        }
    };

    let mut out = Vec::with_capacity(fields.named.len());
    for field in &fields.named {
        let Some(ident) = field.ident.clone() else {
            continue;
        };
        let mut column_name = ident.to_string();
        let mut is_key = false;
        let mut is_skipped = false;

        for attr in &field.attrs {
            if !attr.path().is_ident("batch") {
                continue;
            }
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("column") {
                    let s: LitStr = meta.value()?.parse()?;
                    column_name = s.value();
                } else if meta.path.is_ident("key") {
                    is_key = true;
                } else if meta.path.is_ident("skip") {
                    is_skipped = true;
                } else {
                    return Err(meta.error(
                        "unknown field attribute; expected `key`, `skip` or `column = \"...\"`",
                    ));
                }
                Ok(())
            })?;
        }

        if is_key && is_skipped {
            return Err(syn::Error::new(
                ident.span(),
                "a field cannot be both #[batch(key)] and #[batch(skip)]",
            ));
        }
        if !is_skipped && !is_valid_ident(&column_name) {
            return Err(syn::Error::new(
                ident.span(),
                format!(
                    "invalid column name `{}`; use ASCII letters, digits, or `_`, starting with a letter or `_`",
                    column_name
                ),
            ));
        }
        out.push(FieldMetadata {
            ident,
            column_name,
            is_key,
            is_skipped,
        });
    }
    Ok(out)
}

fn expand(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let struct_name = &input.ident;
    let fields = parse_field_metadata(input)?;

    // If no override, deduce it from the struct name (`User` -> `users`).
    let table_name = parse_table_override(input)?
        .unwrap_or_else(|| format!("{}s", struct_name.to_string().to_snake_case()));
    if table_name.split('.').any(|part| !is_valid_ident(part)) {
        return Err(syn::Error::new(
            struct_name.span(),
            format!(
                "invalid table name `{}`; use ASCII letters, digits, or `_` (optionally `schema.table`)",
                table_name
            ),
        ));
    }

    let persisted: Vec<&FieldMetadata> = fields.iter().filter(|f| !f.is_skipped).collect();
    if persisted.is_empty() {
        return Err(syn::Error::new(
            struct_name.span(),
            "#[derive(Batchable)] needs at least one non-skipped field",
        ));
    }

    let columns: Vec<&String> = persisted.iter().map(|f| &f.column_name).collect();
    let key_columns: Vec<&String> = persisted
        .iter()
        .filter(|f| f.is_key)
        .map(|f| &f.column_name)
        .collect();
    let inserts = persisted.iter().map(|f| {
        let ident = &f.ident;
        let col = &f.column_name;
        quote! {
            record.insert(#col, ::sqlbatch_core::SqlValue::from(::core::clone::Clone::clone(&self.#ident)));
        }
    });
    let n_columns = persisted.len();
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::sqlbatch_core::IntoRecord for #struct_name #ty_generics #where_clause {
            fn to_record(&self) -> ::sqlbatch_core::Record {
                let mut record = ::sqlbatch_core::Record::with_capacity(#n_columns);
                #(#inserts)*
                record
            }
        }

        impl #impl_generics ::sqlbatch_core::Batchable for #struct_name #ty_generics #where_clause {
            const TABLE: &'static str = #table_name;
            const COLUMNS: &'static [&'static str] = &[#(#columns),*];
            const KEY_COLUMNS: &'static [&'static str] = &[#(#key_columns),*];
        }
    })
}

// --- `Batchable` derive macro ---

#[proc_macro_derive(Batchable, attributes(batch))]
pub fn derive_batchable(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}
