use crate::schema::Value;
use crate::store::{Parameter, PreparedCommand};

/// Hand-written SQL with named `@` parameters.
#[derive(Debug, Clone)]
pub struct SqlCommand {
    /// Statement text.
    pub sql: String,
    /// Parameters, named without the `@` prefix.
    pub parameters: Vec<Parameter>,
    /// Rows the statement must affect, if checked.
    pub expected_rows: Option<u64>,
}

impl SqlCommand {
    /// Create an unchecked statement.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            parameters: Vec::new(),
            expected_rows: None,
        }
    }

    /// Bind a parameter.
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.push(Parameter::new(name, value));
        self
    }

    /// Require the statement to affect exactly `rows` rows.
    pub fn expect_rows(mut self, rows: u64) -> Self {
        self.expected_rows = Some(rows);
        self
    }

    pub(crate) fn prepare(&self, index: usize) -> PreparedCommand {
        let suffix = index.to_string();

        let mut sql = suffix_parameters(&self.sql, &suffix);
        if !sql.trim_end().ends_with(';') {
            sql.push(';');
        }

        PreparedCommand {
            sql,
            parameters: self
                .parameters
                .iter()
                .map(|p| Parameter {
                    name: format!("{}{suffix}", p.name),
                    value: p.value.clone(),
                })
                .collect(),
            expected_rows: self.expected_rows,
        }
    }
}

/// Append `suffix` to every `@name` placeholder outside string literals and
/// quoted identifiers.
fn suffix_parameters(sql: &str, suffix: &str) -> String {
    let mut out = String::with_capacity(sql.len() + suffix.len() * 4);
    let mut chars = sql.chars().peekable();
    let mut quote: Option<char> = None;
    let mut in_name = false;

    while let Some(c) = chars.next() {
        out.push(c);

        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }

        if in_name {
            let ends = chars
                .peek()
                .map_or(true, |next| !(next.is_ascii_alphanumeric() || *next == '_'));
            if ends {
                out.push_str(suffix);
                in_name = false;
            }
            continue;
        }

        match c {
            '\'' | '"' | '`' => quote = Some(c),
            '[' => quote = Some(']'),
            '@' => {
                in_name = chars
                    .peek()
                    .is_some_and(|next| next.is_ascii_alphabetic() || *next == '_');
            }
            _ => {}
        }
    }

    out
}
