//! Annotated SQL script handling
//!
//! This crate handles:
//! - Tokenizing annotated SQL scripts (quote-aware)
//! - Splitting scripts into session-tagged statements
//! - Detecting result-producing statements
//! - Rendering statements back into a script

pub mod lexer;
pub mod splitter;

pub use lexer::{Lexer, Token, TokenKind};
pub use splitter::{is_query, render_stmts, split, split_file, SplitError};
