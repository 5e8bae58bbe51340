//! Statement splitting for SQLite script bodies.

use tidemark_core::SqlStatement;

/// Split a script body into statements on top-level semicolons,
/// respecting string literals, quoted identifiers and comments.
/// `VACUUM` is the one statement SQLite refuses inside a transaction.
pub fn split(body: &str) -> Vec<SqlStatement> {
    let mut statements = Vec::new();
    let mut current = String::new();

    let chars: Vec<char> = body.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '\'' | '"' | '`' => {
                let quote = c;
                current.push(c);
                i += 1;
                while i < chars.len() {
                    current.push(chars[i]);
                    if chars[i] == quote {
                        if quote == '\'' && chars.get(i + 1) == Some(&'\'') {
                            current.push('\'');
                            i += 2;
                            continue;
                        }
                        i += 1;
                        break;
                    }
                    i += 1;
                }
            }
            '-' if chars.get(i + 1) == Some(&'-') => {
                while i < chars.len() && chars[i] != '\n' {
                    current.push(chars[i]);
                    i += 1;
                }
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                current.push('/');
                current.push('*');
                i += 2;
                while i < chars.len() {
                    if chars[i] == '*' && chars.get(i + 1) == Some(&'/') {
                        current.push('*');
                        current.push('/');
                        i += 2;
                        break;
                    }
                    current.push(chars[i]);
                    i += 1;
                }
            }
            ';' => {
                push_statement(&mut statements, &current);
                current.clear();
                i += 1;
            }
            _ => {
                current.push(c);
                i += 1;
            }
        }
    }
    push_statement(&mut statements, &current);

    statements
}

fn push_statement(statements: &mut Vec<SqlStatement>, text: &str) {
    let sql = text.trim();
    let comment_only = sql.lines().all(|line| {
        let line = line.trim();
        line.is_empty() || line.starts_with("--")
    });
    if sql.is_empty() || comment_only {
        return;
    }
    let first_word = sql
        .split_whitespace()
        .next()
        .map(str::to_ascii_uppercase)
        .unwrap_or_default();
    if first_word == "VACUUM" {
        statements.push(SqlStatement::autonomous(sql));
    } else {
        statements.push(SqlStatement::transactional(sql));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sqls(body: &str) -> Vec<String> {
        split(body).into_iter().map(|s| s.sql).collect()
    }

    #[test]
    fn test_split_simple() {
        assert_eq!(
            sqls("CREATE TABLE a (id INTEGER);\nCREATE TABLE b (id INTEGER);"),
            vec!["CREATE TABLE a (id INTEGER)", "CREATE TABLE b (id INTEGER)"]
        );
    }

    #[test]
    fn test_semicolons_in_literals_and_idents() {
        let out = sqls("INSERT INTO t VALUES ('a;b');CREATE TABLE \"x;y\" (id INTEGER);");
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_comment_semicolons_do_not_split() {
        let out = sqls("SELECT 1; -- note; with semicolon\nSELECT 2;");
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_vacuum_is_autonomous() {
        let out = split("VACUUM;\nSELECT 1;");
        assert!(!out[0].must_run_in_transaction);
        assert!(out[1].must_run_in_transaction);
    }
}
