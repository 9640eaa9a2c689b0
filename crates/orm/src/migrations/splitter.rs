//! Statement splitting for migration files
//!
//! The split is textual: the text is cut at every `;` and blank fragments are
//! dropped. A `;` inside a string literal, a dollar-quoted function body or a
//! comment also cuts, so migrations containing such constructs must not rely
//! on this splitter.
//!
//! Fragments made only of `--` comments are kept; PostgreSQL accepts them as
//! empty queries.

/// Statement terminator
pub const STATEMENT_TERMINATOR: char = ';';

/// Split migration text into trimmed, non-empty statements, in file order.
///
/// The returned statements do not carry the terminator.
pub fn split_statements(sql: &str) -> Vec<String> {
    sql.split(STATEMENT_TERMINATOR)
        .map(str::trim)
        .filter(|statement| !statement.is_empty())
        .map(str::to_string)
        .collect()
}
