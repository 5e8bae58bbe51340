//! Statement splitting for PostgreSQL script bodies.

use tidemark_core::SqlStatement;

/// Split a script body into statements on top-level semicolons,
/// respecting string literals, quoted identifiers, line and nested block
/// comments, and dollar-quoted bodies.
pub fn split(body: &str) -> Vec<SqlStatement> {
    let mut statements = Vec::new();
    let mut current = String::new();

    let chars: Vec<char> = body.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '\'' => {
                current.push(c);
                i += 1;
                while i < chars.len() {
                    current.push(chars[i]);
                    if chars[i] == '\'' {
                        // '' is an escaped quote, not the end.
                        if chars.get(i + 1) == Some(&'\'') {
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
            '"' => {
                current.push(c);
                i += 1;
                while i < chars.len() {
                    current.push(chars[i]);
                    if chars[i] == '"' {
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
                let mut depth = 0;
                while i < chars.len() {
                    if chars[i] == '/' && chars.get(i + 1) == Some(&'*') {
                        depth += 1;
                        current.push('/');
                        current.push('*');
                        i += 2;
                    } else if chars[i] == '*' && chars.get(i + 1) == Some(&'/') {
                        depth -= 1;
                        current.push('*');
                        current.push('/');
                        i += 2;
                        if depth == 0 {
                            break;
                        }
                    } else {
                        current.push(chars[i]);
                        i += 1;
                    }
                }
            }
            '$' => {
                if let Some(tag) = dollar_tag(&chars[i..]) {
                    let end = find_dollar_end(&chars, i + tag.len(), &tag);
                    for &ch in &chars[i..end] {
                        current.push(ch);
                    }
                    i = end;
                } else {
                    current.push(c);
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
    if sql.is_empty() || is_only_comments(sql) {
        return;
    }
    let autonomous = refuses_transaction(sql);
    statements.push(SqlStatement {
        sql: sql.to_string(),
        must_run_in_transaction: !autonomous,
    });
}

/// The `$tag$` opener starting at `chars[0]`, when there is one.
fn dollar_tag(chars: &[char]) -> Option<String> {
    debug_assert_eq!(chars.first(), Some(&'$'));
    let mut tag = String::from("$");
    for &c in &chars[1..] {
        if c == '$' {
            tag.push('$');
            return Some(tag);
        }
        if c.is_ascii_alphanumeric() || c == '_' {
            tag.push(c);
        } else {
            return None;
        }
    }
    None
}

/// Index one past the closing `$tag$`, or the end of input when unclosed.
fn find_dollar_end(chars: &[char], from: usize, tag: &str) -> usize {
    let tag_chars: Vec<char> = tag.chars().collect();
    let mut i = from;
    while i + tag_chars.len() <= chars.len() {
        if chars[i..i + tag_chars.len()] == tag_chars[..] {
            return i + tag_chars.len();
        }
        i += 1;
    }
    chars.len()
}

fn is_only_comments(sql: &str) -> bool {
    sql.lines().all(|line| {
        let line = line.trim();
        line.is_empty() || line.starts_with("--")
    })
}

/// Statements PostgreSQL refuses to run inside a transaction block.
fn refuses_transaction(sql: &str) -> bool {
    let normalized: String = sql
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_uppercase();

    normalized.starts_with("VACUUM")
        || normalized.starts_with("CREATE DATABASE")
        || normalized.starts_with("DROP DATABASE")
        || normalized.starts_with("CREATE TABLESPACE")
        || normalized.starts_with("DROP TABLESPACE")
        || normalized.starts_with("ALTER SYSTEM")
        || (normalized.contains("INDEX CONCURRENTLY")
            && (normalized.starts_with("CREATE") || normalized.starts_with("DROP")))
        || normalized.starts_with("REINDEX") && normalized.contains("CONCURRENTLY")
        || normalized.starts_with("ALTER TYPE") && normalized.contains(" ADD VALUE")
}
