//! Centralized identifier validation, quoting and literal encoding.
//!
//! SQL identifiers (schema, table, column and role names) cannot be passed as
//! parameters in prepared statements, and DDL statements take no parameters
//! at all. Everything that reaches generated DDL therefore goes through the
//! functions in this module:
//!
//! 1. Identifiers are validated (empty, null bytes, length) and then wrapped
//!    in double quotes with embedded quotes doubled.
//! 2. String literals are written in extended-escape form (`E'...'`).
//! 3. Table names that could collide with the internal history naming
//!    scheme are rejected before any DDL is generated.

use sha2::{Digest, Sha256};

use crate::error::{HistError, Result};

/// Hex digits of the name hash kept in derived index names.
const INDEX_HASH_LEN: usize = 12;

/// PostgreSQL truncates identifiers longer than this many bytes.
const MAX_IDENTIFIER_LENGTH: usize = 63;

/// Prefix of the non-current partition and its year partitions.
pub const NONCURRENT_PREFIX: &str = "zzz___";

/// Suffix of the non-current partition.
pub const NONCURRENT_SUFFIX: &str = "___";

/// Suffix of the history table.
pub const HISTORY_SUFFIX: &str = "__";

/// Longest table name whose derived partition names still fit in
/// [`MAX_IDENTIFIER_LENGTH`] (`zzz___<table>___<year>`).
pub const MAX_TABLE_NAME_LENGTH: usize =
    MAX_IDENTIFIER_LENGTH - NONCURRENT_PREFIX.len() - NONCURRENT_SUFFIX.len() - 4;

/// Validate an identifier for security issues.
///
/// Rejects:
/// - Empty identifiers
/// - Identifiers containing null bytes (injection vector)
/// - Identifiers exceeding the PostgreSQL length limit
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(HistError::Config("Identifier cannot be empty".to_string()));
    }

    if name.contains('\0') {
        return Err(HistError::Config(format!(
            "SECURITY: Identifier contains null byte (possible injection attempt): {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(HistError::Config(format!(
            "Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Quote a PostgreSQL identifier.
///
/// Escapes double quotes by doubling them and wraps in double quotes.
/// Validates the identifier before quoting.
///
/// ```ignore
/// assert_eq!(quote_pg("users")?, "\"users\"");
/// assert_eq!(quote_pg("table\"name")?, "\"table\"\"name\"");
/// ```
pub fn quote_pg(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Qualify a PostgreSQL table name with schema.
pub fn qualify_pg(schema: &str, table: &str) -> Result<String> {
    Ok(format!("{}.{}", quote_pg(schema)?, quote_pg(table)?))
}

/// Encode a string as a PostgreSQL extended-escape literal (`E'...'`).
pub fn encode_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 3);
    out.push_str("E'");
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("''"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Deterministic index name `<relation>_<column>_<hash>_idx`.
///
/// `<hash>` is taken from a SHA-256 of the relation and column names
/// separated by a NUL byte, so distinct pairs get distinct names. Only the
/// readable `<relation>_<column>` prefix is cut (at a character boundary) to
/// keep the name within [`MAX_IDENTIFIER_LENGTH`].
pub fn index_name(relation: &str, column: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(relation.as_bytes());
    hasher.update([0u8]);
    hasher.update(column.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    let suffix = format!("_{}_idx", &digest[..INDEX_HASH_LEN]);

    let mut name = format!("{}_{}", relation, column);
    let budget = MAX_IDENTIFIER_LENGTH - suffix.len();
    if name.len() > budget {
        let mut end = budget;
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        name.truncate(end);
    }
    name.push_str(&suffix);
    name
}

/// Reject table names that the history naming scheme reserves.
///
/// A name ending in `__` could be the history table of another table, and a
/// name starting with `zzz___` could be a non-current or year partition.
pub fn validate_table_name(name: &str) -> Result<()> {
    validate_identifier(name)?;

    if name.ends_with(HISTORY_SUFFIX) {
        return Err(HistError::Config(format!(
            "Table name {:?} ends with reserved suffix {:?}",
            name, HISTORY_SUFFIX
        )));
    }

    if name.starts_with(NONCURRENT_PREFIX) {
        return Err(HistError::Config(format!(
            "Table name {:?} starts with reserved prefix {:?}",
            name, NONCURRENT_PREFIX
        )));
    }

    if name.len() > MAX_TABLE_NAME_LENGTH {
        return Err(HistError::Config(format!(
            "Table name {:?} exceeds maximum length of {} bytes",
            name, MAX_TABLE_NAME_LENGTH
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // Validation tests
    // =========================================================================

    #[test]
    fn test_validate_identifier_normal() {
        assert!(validate_identifier("users").is_ok());
        assert!(validate_identifier("my_table").is_ok());
        assert!(validate_identifier("column with spaces").is_ok());
        assert!(validate_identifier("日本語").is_ok());
    }

    #[test]
    fn test_validate_identifier_rejects_empty() {
        let result = validate_identifier("");
        assert!(result.unwrap_err().to_string().contains("empty"));
    }

    #[test]
    fn test_validate_identifier_rejects_null_byte() {
        let result = validate_identifier("table\0name");
        assert!(result.unwrap_err().to_string().contains("null byte"));
    }

    #[test]
    fn test_validate_identifier_length() {
        assert!(validate_identifier(&"a".repeat(MAX_IDENTIFIER_LENGTH)).is_ok());
        let result = validate_identifier(&"a".repeat(MAX_IDENTIFIER_LENGTH + 1));
        assert!(result.unwrap_err().to_string().contains("maximum length"));
    }

    // =========================================================================
    // Quoting tests
    // =========================================================================

    #[test]
    fn test_quote_pg_escapes_double_quote() {
        assert_eq!(quote_pg("users").unwrap(), "\"users\"");
        assert_eq!(quote_pg("table\"name").unwrap(), "\"table\"\"name\"");
        assert_eq!(quote_pg("a\"b\"c").unwrap(), "\"a\"\"b\"\"c\"");
    }

    #[test]
    fn test_quote_pg_reserved_word() {
        assert_eq!(quote_pg("select").unwrap(), "\"select\"");
        assert_eq!(quote_pg("order").unwrap(), "\"order\"");
    }

    #[test]
    fn test_quote_pg_sql_injection_safely_quoted() {
        let quoted = quote_pg("x\"; DROP TABLE users; --").unwrap();
        assert_eq!(quoted, "\"x\"\"; DROP TABLE users; --\"");
        // Only the outer quotes are unpaired.
        let inner = &quoted[1..quoted.len() - 1];
        assert_eq!(inner.matches('"').count() % 2, 0);
        assert!(!inner.replace("\"\"", "").contains('"'));
    }

    #[test]
    fn test_qualify_pg() {
        assert_eq!(qualify_pg("public", "users").unwrap(), "\"public\".\"users\"");
        assert!(qualify_pg("", "users").is_err());
        assert!(qualify_pg("public", "a\0b").is_err());
    }

    // =========================================================================
    // Literal tests
    // =========================================================================

    #[test]
    fn test_encode_string_plain() {
        assert_eq!(encode_string("2020-01-01"), "E'2020-01-01'");
        assert_eq!(encode_string(""), "E''");
    }

    #[test]
    fn test_encode_string_escapes() {
        assert_eq!(encode_string("it's"), "E'it''s'");
        assert_eq!(encode_string("a\\b"), "E'a\\\\b'");
        assert_eq!(encode_string("l1\nl2\r\t"), "E'l1\\nl2\\r\\t'");
        assert_eq!(encode_string("\u{8}\u{c}"), "E'\\b\\f'");
    }

    #[test]
    fn test_encode_string_injection() {
        let encoded = encode_string("'); DROP TABLE x; --");
        assert_eq!(encoded, "E'''); DROP TABLE x; --'");
    }

    #[test]
    fn test_index_name() {
        let name = index_name("orders__", "sku");
        assert!(name.starts_with("orders___sku_"));
        assert!(name.ends_with("_idx"));
        assert_eq!(name.len(), "orders___sku_".len() + INDEX_HASH_LEN + "_idx".len());
        assert_eq!(name, index_name("orders__", "sku"));
    }

    #[test]
    fn test_index_name_distinguishes_split_points() {
        // Same "<relation>_<column>" text, different pairs.
        assert_ne!(index_name("a__", "_x"), index_name("a___", "x"));
        assert_ne!(index_name("a__", "___start"), index_name("a___", "__start"));
    }

    #[test]
    fn test_index_name_truncates() {
        let name = index_name(&"t".repeat(50), "__origin");
        assert_eq!(name.len(), MAX_IDENTIFIER_LENGTH);
        assert!(validate_identifier(&name).is_ok());

        let name = index_name(&"é".repeat(30), "col");
        assert!(name.len() <= MAX_IDENTIFIER_LENGTH);
        assert!(name.starts_with('é'));
        assert!(name.ends_with("_idx"));

        let table = "t".repeat(47);
        let line1 = index_name(&table, "customer_address_line1");
        let line2 = index_name(&table, "customer_address_line2");
        assert_eq!(line1.len(), MAX_IDENTIFIER_LENGTH);
        assert_ne!(line1, line2);
    }

    // =========================================================================
    // Reserved name tests
    // =========================================================================

    #[test]
    fn test_validate_table_name_accepts_normal() {
        assert!(validate_table_name("orders").is_ok());
        assert!(validate_table_name("order_items_").is_ok());
        assert!(validate_table_name("zzz_orders").is_ok());
    }

    #[test]
    fn test_validate_table_name_rejects_reserved() {
        assert!(validate_table_name("orders__").is_err());
        assert!(validate_table_name("zzz___orders___").is_err());
        assert!(validate_table_name("zzz___orders___2020").is_err());
    }

    #[test]
    fn test_validate_table_name_rejects_long() {
        assert!(validate_table_name(&"t".repeat(MAX_TABLE_NAME_LENGTH)).is_ok());
        assert!(validate_table_name(&"t".repeat(MAX_TABLE_NAME_LENGTH + 1)).is_err());
    }
}
