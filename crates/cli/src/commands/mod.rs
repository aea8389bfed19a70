//! Command handlers for the docqa CLI.

pub mod document;
pub mod index;
pub mod query;

pub use document::{DeleteCommand, ListCommand, ShowCommand, UpdateCommand, UploadCommand};
pub use index::IndexCommand;
pub use query::QueryCommand;

use docqa_core::AppResult;

/// Pretty-print `value` as JSON on stdout.
pub(crate) fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> AppResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
