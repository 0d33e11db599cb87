use serde::{Deserialize, Serialize};
use std::fmt;

/// How bind parameters are spelled in SQL text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaceholderStyle {
    /// `$1`, `$2`, ...
    Positional,
    /// `?` for every parameter
    Anonymous,
    /// `@p1`, `@p2`, ...
    Named,
}

impl fmt::Display for PlaceholderStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PlaceholderStyle::Positional => "positional",
            PlaceholderStyle::Anonymous => "anonymous",
            PlaceholderStyle::Named => "named",
        };
        write!(f, "{}", s)
    }
}

/// Fixed SQL syntax settings of a database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dialect {
    pub name: String,
    #[serde(default = "default_quote_char")]
    pub quote_char: char,
    #[serde(default = "default_placeholder")]
    pub placeholder: PlaceholderStyle,
    /// Whether `VALUES (..), (..)` and friends may group several rows
    #[serde(default)]
    pub multi_row: bool,
    #[serde(default = "default_max_identifier_length")]
    pub max_identifier_length: usize,
    /// Upper bound of bind parameters in one statement
    #[serde(default = "default_max_parameters")]
    pub max_parameters: usize,
}

fn default_quote_char() -> char {
    '"'
}

fn default_placeholder() -> PlaceholderStyle {
    PlaceholderStyle::Positional
}

fn default_max_identifier_length() -> usize {
    63
}

fn default_max_parameters() -> usize {
    u16::MAX as usize
}

impl Dialect {
    pub fn postgres() -> Self {
        Self {
            name: "postgres".into(),
            quote_char: '"',
            placeholder: PlaceholderStyle::Positional,
            multi_row: true,
            max_identifier_length: 63,
            max_parameters: u16::MAX as usize,
        }
    }

    /// Conservative ANSI dialect: `?` parameters, one row per statement.
    pub fn ansi() -> Self {
        Self {
            name: "ansi".into(),
            quote_char: '"',
            placeholder: PlaceholderStyle::Anonymous,
            multi_row: false,
            max_identifier_length: 128,
            max_parameters: 999,
        }
    }
}

impl Default for Dialect {
    fn default() -> Self {
        Self::postgres()
    }
}
