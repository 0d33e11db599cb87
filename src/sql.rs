use std::sync::Arc;

use crate::dialect::{Dialect, PlaceholderStyle};
use crate::error::{Error, Result};
use crate::types::{TypeMapper, TypedValue};

/// Renders identifiers, placeholders and literals for one dialect.
#[derive(Debug, Clone)]
pub struct SqlGenerationHelper {
    dialect: Dialect,
    mapper: Arc<TypeMapper>,
}

impl SqlGenerationHelper {
    pub fn new(dialect: Dialect, mapper: Arc<TypeMapper>) -> Self {
        Self { dialect, mapper }
    }

    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    pub fn type_mapper(&self) -> &TypeMapper {
        &self.mapper
    }

    pub fn statement_terminator(&self) -> &'static str {
        ";"
    }

    /// Quote `name`, doubling any embedded quote character.
    pub fn quote_identifier(&self, name: &str) -> Result<String> {
        if name.is_empty() {
            return Err(Error::invalid_identifier(name, "identifier cannot be empty"));
        }
        if name.contains('\0') {
            return Err(Error::invalid_identifier(name, "identifier contains a null byte"));
        }
        if name.len() > self.dialect.max_identifier_length {
            return Err(Error::invalid_identifier(
                name,
                format!(
                    "identifier exceeds {} bytes",
                    self.dialect.max_identifier_length
                ),
            ));
        }
        let q = self.dialect.quote_char;
        let doubled: String = [q, q].iter().collect();
        Ok(format!("{q}{}{q}", name.replace(q, &doubled)))
    }

    /// `"schema"."name"`, or just `"name"` without a schema.
    pub fn delimit(&self, schema: Option<&str>, name: &str) -> Result<String> {
        match schema {
            Some(schema) => Ok(format!(
                "{}.{}",
                self.quote_identifier(schema)?,
                self.quote_identifier(name)?
            )),
            None => self.quote_identifier(name),
        }
    }

    /// Placeholder for the 1-based parameter `index`.
    pub fn parameter_placeholder(&self, index: usize) -> String {
        match self.dialect.placeholder {
            PlaceholderStyle::Positional => format!("${index}"),
            PlaceholderStyle::Anonymous => "?".to_string(),
            PlaceholderStyle::Named => format!("@p{index}"),
        }
    }

    pub fn literal(&self, value: &TypedValue) -> Result<String> {
        self.mapper.render(value.kind(), value.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::types::{ColumnType, NativeType, TypeMapping};

    fn helper(dialect: Dialect) -> SqlGenerationHelper {
        let mut mapper = TypeMapper::new();
        mapper
            .register(TypeMapping::new(ColumnType::Text, NativeType::String, "text"))
            .unwrap();
        SqlGenerationHelper::new(dialect, Arc::new(mapper))
    }

    #[test]
    fn quotes_and_escapes_identifiers() {
        let h = helper(Dialect::postgres());
        assert_eq!(h.quote_identifier("users").unwrap(), "\"users\"");
        assert_eq!(h.quote_identifier("we\"ird").unwrap(), "\"we\"\"ird\"");
        assert_eq!(
            h.delimit(Some("app"), "users").unwrap(),
            "\"app\".\"users\""
        );
    }

    #[test]
    fn custom_quote_char() {
        let dialect = Dialect {
            quote_char: '`',
            ..Dialect::ansi()
        };
        let h = helper(dialect);
        assert_eq!(h.quote_identifier("a`b").unwrap(), "`a``b`");
    }

    #[test]
    fn rejects_bad_identifiers() {
        let h = helper(Dialect::postgres());
        let long = "x".repeat(64);
        for name in ["", "a\0b", long.as_str()] {
            assert_eq!(
                h.quote_identifier(name).unwrap_err().kind(),
                ErrorKind::InvalidIdentifier
            );
        }
        assert!(h.quote_identifier(&"x".repeat(63)).is_ok());
    }

    #[test]
    fn placeholders_follow_dialect() {
        assert_eq!(helper(Dialect::postgres()).parameter_placeholder(3), "$3");
        assert_eq!(helper(Dialect::ansi()).parameter_placeholder(3), "?");
        let named = Dialect {
            placeholder: PlaceholderStyle::Named,
            ..Dialect::ansi()
        };
        assert_eq!(helper(named).parameter_placeholder(2), "@p2");
    }

    #[test]
    fn literal_delegates_to_mapper() {
        let h = helper(Dialect::postgres());
        assert_eq!(h.literal(&TypedValue::text("O'Brien")).unwrap(), "'O''Brien'");
        assert_eq!(
            h.literal(&TypedValue::integer(1)).unwrap_err().kind(),
            ErrorKind::TypeMismatch
        );
    }
}
