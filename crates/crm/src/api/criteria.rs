//! Search criteria grammar
//!
//! A condition renders as `(field:operator:value)`; groups render as
//! `(<a>and<b>)` / `(<a>or<b>)`. Parentheses and commas inside values are
//! escaped with a backslash.

/// Comparison operators understood by the search endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equals,
    NotEqual,
    StartsWith,
    GreaterThan,
    LessThan,
    In,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Equals => "equals",
            Operator::NotEqual => "not_equal",
            Operator::StartsWith => "starts_with",
            Operator::GreaterThan => "greater_than",
            Operator::LessThan => "less_than",
            Operator::In => "in",
        }
    }
}

/// A search criteria expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Criteria {
    Condition {
        field: String,
        operator: Operator,
        value: String,
    },
    And(Vec<Criteria>),
    Or(Vec<Criteria>),
}

impl Criteria {
    pub fn condition(field: impl Into<String>, operator: Operator, value: impl Into<String>) -> Self {
        Criteria::Condition {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    pub fn equals(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::condition(field, Operator::Equals, value)
    }

    pub fn starts_with(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::condition(field, Operator::StartsWith, value)
    }

    /// Field value is one of `values`
    pub fn one_of<I, S>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = values
            .into_iter()
            .map(|v| escape(v.as_ref()))
            .collect::<Vec<_>>()
            .join(",");
        Criteria::Condition {
            field: field.into(),
            operator: Operator::In,
            value: joined,
        }
    }

    /// Combine with `and`, flattening nested `and` groups
    pub fn and(self, other: Criteria) -> Self {
        match self {
            Criteria::And(mut items) => {
                items.push(other);
                Criteria::And(items)
            }
            first => Criteria::And(vec![first, other]),
        }
    }

    /// Combine with `or`, flattening nested `or` groups
    pub fn or(self, other: Criteria) -> Self {
        match self {
            Criteria::Or(mut items) => {
                items.push(other);
                Criteria::Or(items)
            }
            first => Criteria::Or(vec![first, other]),
        }
    }

    /// True when no condition is left after flattening groups
    ///
    /// An empty expression renders as `""` and is rejected by search.
    pub fn is_empty(&self) -> bool {
        match self {
            Criteria::Condition { .. } => false,
            Criteria::And(items) | Criteria::Or(items) => items.iter().all(Criteria::is_empty),
        }
    }

    /// Render the expression sent as the `criteria` query parameter
    pub fn render(&self) -> String {
        match self {
            Criteria::Condition {
                field,
                operator,
                value,
            } => {
                // `in` values are escaped per item when built
                let value = if *operator == Operator::In {
                    value.clone()
                } else {
                    escape(value)
                };
                format!("({}:{}:{})", field, operator.as_str(), value)
            }
            Criteria::And(items) => render_group(items, "and"),
            Criteria::Or(items) => render_group(items, "or"),
        }
    }
}

impl std::fmt::Display for Criteria {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}

fn render_group(items: &[Criteria], joiner: &str) -> String {
    // Empty subgroups contribute nothing
    let mut inner: Vec<String> = items
        .iter()
        .filter(|item| !item.is_empty())
        .map(Criteria::render)
        .collect();
    match inner.len() {
        0 => String::new(),
        1 => inner.remove(0),
        _ => format!("({})", inner.join(joiner)),
    }
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '(' | ')' | ',' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
