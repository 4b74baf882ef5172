//! Lexical statement classification.
//!
//! These predicates look at the statement text exactly as the caller
//! submitted it. They are deliberately not a SQL parser: a write verb that
//! only appears inside a string literal or a comment still counts as a
//! write, and `SELECT ... FOR UPDATE ` does too. The compaction rules in
//! [`crate::session`] are tuned to this behaviour, so any change here has to
//! be re-checked against every transition there.

use regex::Regex;
use std::sync::OnceLock;

/// The category a statement falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// A pure context comment; never executed.
    ContextMarker,
    /// `BEGIN ...`
    Begin,
    /// `COMMIT ...`
    Commit,
    /// Contains `INSERT`, `UPDATE` or `DELETE` followed by whitespace.
    Write,
    /// Anything else, usually a read.
    Other,
}

fn begin_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^BEGIN($|\s)").expect("static pattern"))
}

fn commit_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^COMMIT($|\s)").expect("static pattern"))
}

fn write_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(INSERT|UPDATE|DELETE)\s").expect("static pattern"))
}

fn write_target_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?i)\b(?:INSERT\s+INTO|UPDATE(?:\s+ONLY)?|DELETE\s+FROM(?:\s+ONLY)?)\s+((?:"[^"]+"|[\w$]+)(?:\.(?:"[^"]+"|[\w$]+))*)"#,
        )
        .expect("static pattern")
    })
}

/// Does this statement open a transaction?
pub fn is_begin(sql: &str) -> bool {
    begin_re().is_match(sql)
}

/// Does this statement commit a transaction?
pub fn is_commit(sql: &str) -> bool {
    commit_re().is_match(sql)
}

/// Does this statement (anywhere in its text) mutate data?
pub fn is_write(sql: &str) -> bool {
    write_re().is_match(sql)
}

/// Is the whole statement a `/*<affix> ... <affix>*/` comment?
pub fn is_context_marker(sql: &str, affix: &str) -> bool {
    let trimmed = sql.trim();
    let opens = trimmed
        .strip_prefix("/*")
        .is_some_and(|rest| rest.starts_with(affix));
    let closes = trimmed
        .strip_suffix("*/")
        .is_some_and(|rest| rest.ends_with(affix));
    opens && closes
}

/// Put a statement in exactly one category.
///
/// Precedence is marker, begin, commit, write, other.
pub fn classify(sql: &str, affix: &str) -> StatementKind {
    let kind = if is_context_marker(sql, affix) {
        StatementKind::ContextMarker
    } else if is_begin(sql) {
        StatementKind::Begin
    } else if is_commit(sql) {
        StatementKind::Commit
    } else if is_write(sql) {
        StatementKind::Write
    } else {
        StatementKind::Other
    };
    tracing::trace!(?kind, "Classified statement");
    kind
}

/// The table an `INSERT INTO`, `UPDATE` or `DELETE FROM` targets, as written.
///
/// Quoting and schema qualification are returned untouched; use
/// [`normalize_table`] before comparing.
pub fn write_target(sql: &str) -> Option<&str> {
    write_target_re()
        .captures(sql)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Strip identifier quotes: `"Todo"."Todo"` becomes `Todo.Todo`.
pub fn normalize_table(table: &str) -> String {
    table.replace('"', "")
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTEXT: &str =
        r#"/*Bemi {"apiEndpoint":"/todo/complete","userID":1,"queryParams":{"id":37}} Bemi*/"#;
    const SELECT: &str = r#"SELECT "Todo"."Todo"."id", "Todo"."Todo"."task" FROM "Todo"."Todo" WHERE "Todo"."Todo"."id" = $1 OFFSET $2"#;
    const UPDATE: &str = r#"UPDATE "Todo"."Todo" SET "isCompleted" = $1 WHERE ("Todo"."Todo"."id" = $2 AND 1=1) RETURNING "Todo"."Todo"."id""#;
    const DELETE: &str = r#"DELETE FROM "Todo"."Todo" WHERE ("Todo"."Todo"."id" = $1 AND 1=1)"#;

    #[test]
    fn test_begin_and_commit() {
        assert!(is_begin("BEGIN"));
        assert!(is_begin("begin"));
        assert!(is_begin("BEGIN ISOLATION LEVEL SERIALIZABLE"));
        assert!(!is_begin("BEGINNING"));
        assert!(!is_begin("SELECT 1; BEGIN"));

        assert!(is_commit("COMMIT"));
        assert!(is_commit("commit work"));
        assert!(!is_commit("COMMITTED"));
        assert!(!is_commit("ROLLBACK"));
    }

    #[test]
    fn test_write_detection() {
        assert!(is_write(UPDATE));
        assert!(is_write(DELETE));
        assert!(is_write("insert into todo (task) values ($1)"));
        assert!(is_write("WITH moved AS (DELETE FROM a RETURNING *) INSERT INTO b SELECT * FROM moved"));
        assert!(!is_write(SELECT));
        assert!(!is_write("SELECT updated_at FROM todo"));
    }

    #[test]
    fn test_write_verb_in_literal_counts() {
        assert!(is_write("SELECT 'DELETE everything' AS note"));
    }

    #[test]
    fn test_context_marker() {
        assert!(is_context_marker(CONTEXT, "Bemi"));
        assert!(is_context_marker(&format!("  {CONTEXT}\n"), "Bemi"));
        assert!(!is_context_marker(CONTEXT, "Audit"));
        assert!(!is_context_marker(&format!("{UPDATE} {CONTEXT}"), "Bemi"));
        assert!(!is_context_marker("/* plain comment */", "Bemi"));
        assert!(is_context_marker(r#"/*Audit {"a":1} Audit*/"#, "Audit"));
    }

    #[test]
    fn test_classify_precedence() {
        assert_eq!(classify(CONTEXT, "Bemi"), StatementKind::ContextMarker);
        assert_eq!(classify("BEGIN", "Bemi"), StatementKind::Begin);
        assert_eq!(classify("COMMIT", "Bemi"), StatementKind::Commit);
        assert_eq!(classify(UPDATE, "Bemi"), StatementKind::Write);
        assert_eq!(classify(SELECT, "Bemi"), StatementKind::Other);
        assert_eq!(classify("ROLLBACK", "Bemi"), StatementKind::Other);
    }

    #[test]
    fn test_write_target() {
        assert_eq!(write_target(UPDATE), Some(r#""Todo"."Todo""#));
        assert_eq!(write_target(DELETE), Some(r#""Todo"."Todo""#));
        assert_eq!(
            write_target("insert into todo_items (task) values ($1)"),
            Some("todo_items")
        );
        assert_eq!(write_target("UPDATE ONLY accounts SET x = 1"), Some("accounts"));
        assert_eq!(write_target(SELECT), None);
        assert_eq!(normalize_table(r#""Todo"."Todo""#), "Todo.Todo");
    }
}
