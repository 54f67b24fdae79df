#![forbid(unsafe_code)]

use super::super::StoreError;
use rusqlite::{Connection, ErrorCode, Transaction, TransactionBehavior};

/// Writers take the database lock up front so concurrent writers queue on the busy
/// timeout instead of failing on lock upgrade.
pub(in crate::store) fn begin_write(conn: &mut Connection) -> Result<Transaction<'_>, StoreError> {
    Ok(conn.transaction_with_behavior(TransactionBehavior::Immediate)?)
}

/// Deferred read transaction: one consistent snapshot for the whole call.
pub(in crate::store) fn begin_read(conn: &mut Connection) -> Result<Transaction<'_>, StoreError> {
    Ok(conn.transaction()?)
}

/// Monotonic counter bumped whenever rows are added to or removed from an existing
/// version. Snapshot caches in other handles compare it to detect staleness.
pub(in crate::store) fn content_epoch_tx(tx: &Transaction<'_>) -> Result<i64, StoreError> {
    Ok(tx.query_row(
        "SELECT content_epoch FROM store_state WHERE singleton=1",
        [],
        |row| row.get::<_, i64>(0),
    )?)
}

pub(in crate::store) fn bump_content_epoch_tx(
    tx: &Transaction<'_>,
    now_ms: i64,
) -> Result<i64, StoreError> {
    tx.execute(
        "UPDATE store_state SET content_epoch = content_epoch + 1, updated_at_ms=?1 WHERE singleton=1",
        [now_ms],
    )?;
    content_epoch_tx(tx)
}

pub(in crate::store) fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(code, message) => {
            code.code == ErrorCode::ConstraintViolation
                || message.as_deref().is_some_and(|value| {
                    value.contains("UNIQUE constraint failed")
                        || value.contains("PRIMARY KEY constraint failed")
                })
        }
        _ => false,
    }
}
