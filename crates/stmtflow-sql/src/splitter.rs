//! Statement splitting
//!
//! A script is a sequence of statements terminated by `;`. Each statement
//! starts with a directive comment naming its session and optional
//! modifiers:
//!
//! ```text
//! /* s1 */ begin;
//! /* s2:wait,unordered */ update t set v = 2 where id = 1; -- blocked by s1
//! ```
//!
//! Fragments without a directive are not test statements and are dropped.

use std::iter::Peekable;
use std::path::{Path, PathBuf};

use stmtflow_core::{Stmt, StmtFlags};

use crate::lexer::{Lexer, Token, TokenKind};

/// Statement prefixes that produce a result set
const QUERY_PREFIXES: &[&str] = &["select", "show", "admin show", "explain", "desc", "describe"];

/// Errors raised while splitting a script
#[derive(Debug, thiserror::Error)]
pub enum SplitError {
    #[error("unterminated block comment starting at line {line}")]
    UnterminatedComment { line: usize },

    #[error("unterminated quoted literal starting at line {line}")]
    UnterminatedQuote { line: usize },

    #[error("empty session label in directive at line {line}")]
    EmptySession { line: usize },

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Split an annotated script into statements
pub fn split(text: &str) -> Result<Vec<Stmt>, SplitError> {
    let mut stmts = Vec::new();
    let mut tokens: Vec<Token> = Vec::new();
    let mut lexer = Lexer::new(text).peekable();

    while let Some(token) = lexer.next() {
        let token = token?;
        let is_semi = token.kind == TokenKind::Semi;
        tokens.push(token);
        if !is_semi {
            continue;
        }

        // keep trailing spaces, a same-line comment and the line break
        while let Some(space) = take_if(&mut lexer, TokenKind::Space) {
            tokens.push(space);
        }
        if let Some(comment) = take_if(&mut lexer, TokenKind::LineComment) {
            tokens.push(comment);
        }
        if let Some(newline) = take_if(&mut lexer, TokenKind::Newline) {
            tokens.push(newline);
        }

        if let Some(stmt) = to_stmt(&tokens)? {
            stmts.push(stmt);
        }
        tokens.clear();
    }

    if let Some(stmt) = to_stmt(&tokens)? {
        stmts.push(stmt);
    }
    Ok(stmts)
}

/// Read and split a script file
pub fn split_file(path: &Path) -> Result<Vec<Stmt>, SplitError> {
    let text = std::fs::read_to_string(path).map_err(|source| SplitError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    split(&text)
}

/// Render statements back into a script, one per line
pub fn render_stmts(stmts: &[Stmt]) -> String {
    stmts.iter().map(|stmt| stmt.script_text() + "\n").collect()
}

/// Whether a statement body produces a result set
///
/// Leading whitespace and parentheses are ignored, so `(select 1)` counts.
pub fn is_query(sql: &str) -> bool {
    let body = sql
        .trim_start_matches(|c: char| c == '(' || c.is_whitespace())
        .to_ascii_lowercase();
    QUERY_PREFIXES.iter().any(|prefix| {
        body.strip_prefix(prefix)
            .map_or(false, |rest| !rest.starts_with(|c: char| c.is_ascii_alphanumeric() || c == '_'))
    })
}

fn take_if<'a>(
    lexer: &mut Peekable<Lexer<'a>>,
    kind: TokenKind,
) -> Option<Token<'a>> {
    match lexer.peek() {
        Some(Ok(token)) if token.kind == kind => lexer.next().and_then(Result::ok),
        _ => None,
    }
}

fn is_trivia(kind: TokenKind) -> bool {
    matches!(kind, TokenKind::Space | TokenKind::Newline | TokenKind::LineComment)
}

fn to_stmt(tokens: &[Token]) -> Result<Option<Stmt>, SplitError> {
    let Some(start) = tokens.iter().position(|t| !is_trivia(t.kind)) else {
        return Ok(None);
    };
    let directive = &tokens[start];
    if directive.kind != TokenKind::BlockComment {
        tracing::debug!(line = directive.line, "dropping fragment without directive");
        return Ok(None);
    }

    let body = &tokens[start..];
    let prefix = body
        .iter()
        .take_while(|t| is_trivia(t.kind) || t.kind == TokenKind::BlockComment)
        .count();
    let sql: String = body.iter().map(|t| t.text).collect();
    let rest: String = body[prefix..].iter().map(|t| t.text).collect();

    let (session, mut flags) = parse_directive(directive)?;
    if is_query(&rest) {
        flags |= StmtFlags::QUERY;
    }

    Ok(Some(Stmt {
        sql: sql.trim_end_matches(|c| c == '\r' || c == '\n').to_string(),
        session,
        flags,
    }))
}

fn parse_directive(token: &Token) -> Result<(String, StmtFlags), SplitError> {
    let content = token.text.trim_matches(|c| c == '/' || c == '*').trim();
    let (session, modifiers) = match content.split_once(':') {
        Some((session, modifiers)) => (session.trim(), modifiers),
        None => (content, ""),
    };
    if session.is_empty() {
        return Err(SplitError::EmptySession { line: token.line });
    }

    let mut flags = StmtFlags::empty();
    for modifier in modifiers.split(',').map(str::trim).filter(|m| !m.is_empty()) {
        match StmtFlags::from_modifier(modifier) {
            Some(flag) => flags |= flag,
            None => tracing::debug!(line = token.line, modifier, "ignoring unknown modifier"),
        }
    }
    Ok((session.to_string(), flags))
}
