//! SQL identifier validation and escaping
//!
//! The ledger table name and the target database name are interpolated into
//! DDL, where bind parameters are not available. Both go through
//! [`validate_identifier`] at configuration time and [`escape_identifier`] at
//! statement-building time.

use crate::error::OrmError;

/// Characters allowed in SQL identifiers (alphanumeric, underscore, dollar)
const ALLOWED_IDENTIFIER_CHARS: &str =
    "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789_$";

/// PostgreSQL truncates identifiers beyond this length
const MAX_IDENTIFIER_LEN: usize = 63;

/// SQL keywords rejected as identifiers
static SQL_KEYWORDS: &[&str] = &[
    "SELECT", "INSERT", "UPDATE", "DELETE", "FROM", "WHERE", "JOIN", "UNION", "DROP", "CREATE",
    "ALTER", "GRANT", "REVOKE", "TRUNCATE", "TABLE", "DATABASE", "USER", "CURRENT_USER",
    "SESSION_USER",
];

/// Escape a SQL identifier by doubling embedded quotes and wrapping it in
/// double quotes
///
/// # Examples
/// ```
/// use vtrack_orm::security::escape_identifier;
///
/// assert_eq!(escape_identifier("migrations"), "\"migrations\"");
/// assert_eq!(escape_identifier("odd\"name"), "\"odd\"\"name\"");
/// ```
pub fn escape_identifier(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// Validate that an identifier is safe for use in SQL
pub fn validate_identifier(identifier: &str) -> Result<(), OrmError> {
    let Some(first) = identifier.chars().next() else {
        return Err(OrmError::Validation(
            "Identifier cannot be empty".to_string(),
        ));
    };

    if identifier.len() > MAX_IDENTIFIER_LEN {
        return Err(OrmError::Validation(format!(
            "Identifier '{}' is too long (max {} characters)",
            identifier, MAX_IDENTIFIER_LEN
        )));
    }

    if let Some(c) = identifier.chars().find(|c| !ALLOWED_IDENTIFIER_CHARS.contains(*c)) {
        return Err(OrmError::Validation(format!(
            "Identifier '{}' contains invalid character '{}'",
            identifier, c
        )));
    }

    if first.is_ascii_digit() {
        return Err(OrmError::Validation(format!(
            "Identifier '{}' cannot start with a number",
            identifier
        )));
    }

    if SQL_KEYWORDS.contains(&identifier.to_uppercase().as_str()) {
        return Err(OrmError::Validation(format!(
            "Identifier '{}' is a reserved SQL keyword",
            identifier
        )));
    }

    Ok(())
}
