//! Character-class lexer for annotated SQL scripts
//!
//! Produces whitespace, newline, comment, semicolon and "other" tokens whose
//! texts concatenate back to the input. Quoted literals (`'...'`, `"..."` and
//! `` `...` ``) are folded into "other" tokens, so semicolons and comment
//! delimiters inside them never split a statement.

use crate::splitter::SplitError;

/// Token classes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Run of non-newline whitespace
    Space,

    /// `\n`, `\r\n` or `\r`
    Newline,

    /// `-- ...` or `# ...`, up to (not including) the line break
    LineComment,

    /// `/* ... */`
    BlockComment,

    /// `;`
    Semi,

    /// Anything else, including quoted literals
    Other,
}

/// A slice of the input with its class and starting line (1-based)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    pub line: usize,
}

/// Streaming lexer over a script
pub struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    line: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self { src, pos: 0, line: 1 }
    }

    fn scan_token(&self, rest: &str) -> Result<(TokenKind, usize), SplitError> {
        let mut chars = rest.chars();
        let Some(c) = chars.next() else {
            return Ok((TokenKind::Other, 0));
        };
        let scanned = match c {
            '\n' => (TokenKind::Newline, 1),
            '\r' if rest[1..].starts_with('\n') => (TokenKind::Newline, 2),
            '\r' => (TokenKind::Newline, 1),
            ';' => (TokenKind::Semi, 1),
            c if is_space(c) => (TokenKind::Space, rest.find(|c: char| !is_space(c)).unwrap_or(rest.len())),
            '/' if rest.starts_with("/*") => match rest[2..].find("*/") {
                Some(end) => (TokenKind::BlockComment, end + 4),
                None => return Err(SplitError::UnterminatedComment { line: self.line }),
            },
            _ if starts_line_comment(rest) => (TokenKind::LineComment, line_end(rest)),
            _ => (TokenKind::Other, self.other_len(rest)?),
        };
        Ok(scanned)
    }

    fn other_len(&self, rest: &str) -> Result<usize, SplitError> {
        let mut end = 0;
        while end < rest.len() {
            let tail = &rest[end..];
            let Some(c) = tail.chars().next() else { break };
            if end > 0 && starts_token_boundary(tail) {
                break;
            }
            if matches!(c, '\'' | '"' | '`') {
                end += quoted_len(tail, c).ok_or(SplitError::UnterminatedQuote {
                    line: self.line + rest[..end].matches('\n').count(),
                })?;
            } else {
                end += c.len_utf8();
            }
        }
        Ok(end)
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Result<Token<'a>, SplitError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.src.len() {
            return None;
        }
        let rest = &self.src[self.pos..];
        match self.scan_token(rest) {
            Ok((kind, len)) => {
                let text = &rest[..len];
                let token = Token {
                    kind,
                    text,
                    line: self.line,
                };
                self.pos += len;
                self.line += text.matches('\n').count();
                Some(Ok(token))
            }
            Err(err) => {
                self.pos = self.src.len();
                Some(Err(err))
            }
        }
    }
}

fn is_space(c: char) -> bool {
    c.is_whitespace() && c != '\n' && c != '\r'
}

// MySQL only treats `--` as a comment when followed by whitespace
fn starts_line_comment(s: &str) -> bool {
    if s.starts_with('#') {
        return true;
    }
    match s.strip_prefix("--") {
        Some(after) => after.chars().next().map_or(true, char::is_whitespace),
        None => false,
    }
}

fn starts_token_boundary(s: &str) -> bool {
    match s.chars().next() {
        Some(c) if c.is_whitespace() || c == ';' => true,
        Some(_) => s.starts_with("/*") || starts_line_comment(s),
        None => true,
    }
}

fn line_end(s: &str) -> usize {
    s.find(|c: char| c == '\n' || c == '\r').unwrap_or(s.len())
}

/// Length of a quoted literal including both quotes
fn quoted_len(s: &str, quote: char) -> Option<usize> {
    let backslash_escapes = quote != '`';
    let mut chars = s.char_indices().skip(1);
    while let Some((i, c)) = chars.next() {
        if backslash_escapes && c == '\\' {
            chars.next();
        } else if c == quote {
            return Some(i + c.len_utf8());
        }
    }
    None
}
