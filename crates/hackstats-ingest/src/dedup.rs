//! Dedup-key derivation
//!
//! Every cleaned batch gets a `_dedup_key` column before it is merged. Rows
//! without a natural key get a positional key namespaced by the batch's
//! content hash, so they never collide with rows from other batches.

use crate::error::Result;
use crate::table::{Table, Value};
use hackstats_common::RecordKind;

/// Internal key column; downstream readers drop it
pub const DEDUP_KEY_COLUMN: &str = "_dedup_key";

pub const SUBMISSION_URL_COLUMN: &str = "Submission Url";
pub const HACKATHON_NAME_COLUMN: &str = "Hackathon Name";
pub const USER_ID_COLUMN: &str = "User ID";

/// Separator of the registrant composite key; not escaped inside fields
pub const KEY_SEPARATOR: char = '|';

/// Positional fallback key for a row without a natural key
pub fn positional_key(batch_id: &str, row: usize) -> String {
    format!("#row:{}:{}", batch_id, row)
}

/// Add the dedup-key column to a cleaned table
///
/// Submissions key on the submission URL. Registrants key on
/// `hackathon name|user id`. A row whose natural key is missing or blank
/// falls back to [`positional_key`].
pub fn derive_key(mut table: Table, kind: RecordKind, batch_id: &str) -> Result<Table> {
    let keys: Vec<Value> = match kind {
        RecordKind::Submission => {
            let url = table.column(SUBMISSION_URL_COLUMN).map(|c| &c.values);
            (0..table.row_count())
                .map(|row| {
                    url.map(|values| values[row].render().trim().to_string())
                        .filter(|key| !key.is_empty())
                        .unwrap_or_else(|| positional_key(batch_id, row))
                })
                .map(Value::Text)
                .collect()
        },
        RecordKind::Registrant => {
            let hackathon = table.column(HACKATHON_NAME_COLUMN).map(|c| &c.values);
            let user = table.column(USER_ID_COLUMN).map(|c| &c.values);
            (0..table.row_count())
                .map(|row| match (hackathon, user) {
                    (Some(h), Some(u)) if !h[row].is_blank() && !u[row].is_blank() => format!(
                        "{}{}{}",
                        h[row].render(),
                        KEY_SEPARATOR,
                        u[row].render()
                    ),
                    _ => positional_key(batch_id, row),
                })
                .map(Value::Text)
                .collect()
        },
    };

    // a key column carried in from the source is replaced, not suffixed
    table.drop_column(DEDUP_KEY_COLUMN);
    table.set_column(DEDUP_KEY_COLUMN, keys)?;
    Ok(table)
}
