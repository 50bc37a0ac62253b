//! Translates `libsql::Error` into `krai_core::error::Error`, recovering the
//! typed `UniqueViolation` case from a SQLite-shaped error message rather
//! than propagating an opaque storage error string.

use krai_core::error::Error;

/// Map a `libsql` failure to the engine's typed taxonomy. `table`/`key` are
/// only used when the message looks like a unique-constraint violation;
/// everything else becomes [`Error::Storage`].
pub fn map_libsql_error(err: libsql::Error, table: &'static str, key: impl Into<String>) -> Error {
    let message = err.to_string();
    if message.contains("UNIQUE constraint failed") || message.contains("constraint failed: UNIQUE") {
        Error::UniqueViolation {
            table,
            key: key.into(),
        }
    } else {
        Error::Storage(format!("{table}: {message}"))
    }
}
