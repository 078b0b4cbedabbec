// crates/db/src/queries/mod.rs
//! Typed query modules, one per table.

pub mod agents;
pub mod events;
pub mod projects;
pub mod tasks;
pub mod turns;

use sqlx::sqlite::SqliteRow;
use sqlx::Row;

/// Decode an enum column stored as TEXT, mapping unknown values to a
/// ColumnDecode error instead of panicking.
pub(crate) fn decode_enum<T>(
    row: &SqliteRow,
    column: &str,
    parse: fn(&str) -> Option<T>,
) -> Result<T, sqlx::Error> {
    let raw: String = row.try_get(column)?;
    parse(&raw).ok_or_else(|| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: format!("unknown {column} value: {raw}").into(),
    })
}
