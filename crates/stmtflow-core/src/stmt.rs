//! Session-tagged statements

use serde::{Deserialize, Serialize};

bitflags::bitflags! {
    /// Routing flags attached to a statement
    ///
    /// Serialized in human-readable formats as `"QUERY | WAIT"`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct StmtFlags: u8 {
        /// Statement produces a result set
        const QUERY = 1;

        /// Engine must wait for the statement's dependency before issuing it
        const WAIT = 1 << 1;

        /// Relaxes expected ordering against concurrently interleaved statements
        const UNORDERED = 1 << 2;
    }
}

impl StmtFlags {
    /// Map a directive modifier (case-insensitive) to its flag
    pub fn from_modifier(modifier: &str) -> Option<Self> {
        match modifier.trim().to_ascii_lowercase().as_str() {
            "query" => Some(Self::QUERY),
            "wait" => Some(Self::WAIT),
            "unordered" => Some(Self::UNORDERED),
            _ => None,
        }
    }
}

/// One directive-tagged unit of SQL plus its routing metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stmt {
    /// SQL text, including the directive comment when produced by the splitter
    pub sql: String,

    /// Session label the statement is routed to
    pub session: String,

    /// Routing flags
    #[serde(default)]
    pub flags: StmtFlags,
}

impl Stmt {
    /// Create a statement with no flags
    pub fn new(session: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            session: session.into(),
            flags: StmtFlags::empty(),
        }
    }

    /// Add flags to the statement
    pub fn with_flags(mut self, flags: StmtFlags) -> Self {
        self.flags |= flags;
        self
    }

    pub fn is_query(&self) -> bool {
        self.flags.contains(StmtFlags::QUERY)
    }

    pub fn is_wait(&self) -> bool {
        self.flags.contains(StmtFlags::WAIT)
    }

    pub fn is_unordered(&self) -> bool {
        self.flags.contains(StmtFlags::UNORDERED)
    }

    /// SQL text as it appears in a script
    ///
    /// Statements supplied without a directive comment get one synthesized
    /// from the session label and flags.
    pub fn script_text(&self) -> String {
        if self.sql.trim_start().starts_with("/*") {
            return self.sql.clone();
        }
        let modifiers: Vec<String> = self
            .flags
            .iter_names()
            .map(|(name, _)| name.to_ascii_lowercase())
            .collect();
        if modifiers.is_empty() {
            format!("/* {} */ {}", self.session, self.sql)
        } else {
            format!("/* {}:{} */ {}", self.session, modifiers.join(","), self.sql)
        }
    }
}
