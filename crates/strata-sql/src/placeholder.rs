//! Placeholder translation
//!
//! Generated SQL uses `$1…$n` throughout; SQLite wants `?N`. Substitution
//! runs over the distinct indices sorted descending so `$1` never clobbers
//! the prefix of `$10`.

use once_cell::sync::Lazy;
use regex::Regex;

static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$(\d+)").expect("placeholder regex"));

/// Rewrite `$N` placeholders to SQLite's `?N` form
pub fn to_sqlite_placeholders(sql: &str) -> String {
    let mut indices: Vec<u32> = PLACEHOLDER_RE
        .captures_iter(sql)
        .filter_map(|c| c[1].parse().ok())
        .collect();
    indices.sort_unstable_by(|a, b| b.cmp(a));
    indices.dedup();

    let mut out = sql.to_string();
    for index in indices {
        out = out.replace(&format!("${index}"), &format!("?{index}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_rewrite() {
        assert_eq!(
            to_sqlite_placeholders("SELECT * FROM t WHERE a = $1 AND b = $2"),
            "SELECT * FROM t WHERE a = ?1 AND b = ?2"
        );
    }

    #[test]
    fn test_two_digit_indices_do_not_clobber() {
        let sql = "INSERT INTO t VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)";
        let rewritten = to_sqlite_placeholders(sql);
        assert!(rewritten.ends_with("?9, ?10, ?11)"));
        assert!(!rewritten.contains("?10 0"));
        assert!(!rewritten.contains("$"));
    }

    #[test]
    fn test_repeated_placeholder() {
        assert_eq!(
            to_sqlite_placeholders("SELECT $1 WHERE a = $1"),
            "SELECT ?1 WHERE a = ?1"
        );
    }

    #[test]
    fn test_no_placeholders() {
        assert_eq!(to_sqlite_placeholders("SELECT 1"), "SELECT 1");
    }
}
