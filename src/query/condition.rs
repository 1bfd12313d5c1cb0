//! Sum-typed query-condition tree.
//!
//! Conditions are immutable values; "mutation" is always reconstruction.
//! [`Condition::replace_condition`] rebuilds AND/OR nodes from their
//! (possibly replaced) children, which is the sole mechanism for
//! splicing geospatial predicates into an upstream tree.

use serde::{Deserialize, Serialize};

/// Comparison operator of a column leaf
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    Like,
}

impl Operator {
    /// SQL spelling
    #[must_use]
    pub fn sql(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Neq => "!=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Like => "LIKE",
        }
    }
}

/// Column-reference leaf
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnFilter {
    /// Column/field key; also carries placeholder tags such as
    /// `geolocation`
    pub key: String,
    pub operator: Operator,
    pub value: String,
}

/// Boolean condition tree over column leaves
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Condition {
    /// Always-true leaf; what a placeholder decays to when no real
    /// condition is spliced in
    True,
    /// Column comparison leaf
    Column(ColumnFilter),
    /// Raw SQL predicate fragment (distance expressions)
    Expr(String),
    /// All children must hold
    And(Vec<Condition>),
    /// Any child must hold
    Or(Vec<Condition>),
}

impl Condition {
    /// Column-comparison leaf
    #[must_use]
    pub fn column(key: impl Into<String>, operator: Operator, value: impl Into<String>) -> Self {
        Self::Column(ColumnFilter {
            key: key.into(),
            operator,
            value: value.into(),
        })
    }

    /// Placeholder leaf carrying only a tag; upstream code inserts one
    /// per request where geospatial predicates may later be spliced
    #[must_use]
    pub fn placeholder(tag: impl Into<String>) -> Self {
        Self::column(tag, Operator::Eq, "")
    }

    /// AND node; unwraps a single child
    #[must_use]
    pub fn and(children: Vec<Condition>) -> Self {
        match children.len() {
            1 => children.into_iter().next().unwrap_or(Condition::True),
            _ => Self::And(children),
        }
    }

    /// OR node; unwraps a single child
    #[must_use]
    pub fn or(children: Vec<Condition>) -> Self {
        match children.len() {
            1 => children.into_iter().next().unwrap_or(Condition::True),
            _ => Self::Or(children),
        }
    }

    /// Whether any leaf carries the given tag
    #[must_use]
    pub fn contains_tag(&self, tag: &str) -> bool {
        match self {
            Condition::Column(filter) => filter.key == tag,
            Condition::And(children) | Condition::Or(children) => {
                children.iter().any(|child| child.contains_tag(tag))
            }
            _ => false,
        }
    }

    /// Replace every leaf tagged `tag` with `replacement`, rebuilding
    /// parent AND/OR nodes from their (possibly replaced) children.
    /// Leaves with other tags are untouched.
    #[must_use]
    pub fn replace_condition(&self, tag: &str, replacement: &Condition) -> Condition {
        match self {
            Condition::Column(filter) if filter.key == tag => replacement.clone(),
            Condition::And(children) => Condition::And(
                children
                    .iter()
                    .map(|child| child.replace_condition(tag, replacement))
                    .collect(),
            ),
            Condition::Or(children) => Condition::Or(
                children
                    .iter()
                    .map(|child| child.replace_condition(tag, replacement))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    /// Render the WHERE-clause fragment for this tree
    #[must_use]
    pub fn to_sql(&self) -> String {
        match self {
            Condition::True => "TRUE".to_string(),
            Condition::Column(filter) => {
                format!("`{}` {} '{}'", filter.key, filter.operator.sql(), filter.value)
            }
            Condition::Expr(expr) => format!("({expr})"),
            Condition::And(children) => Self::join_sql(children, " AND "),
            Condition::Or(children) => Self::join_sql(children, " OR "),
        }
    }

    fn join_sql(children: &[Condition], separator: &str) -> String {
        if children.is_empty() {
            return "TRUE".to_string();
        }
        let parts: Vec<String> = children.iter().map(Condition::to_sql).collect();
        format!("({})", parts.join(separator))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> Condition {
        Condition::And(vec![
            Condition::column("status", Operator::Eq, "active"),
            Condition::Or(vec![
                Condition::placeholder("geolocation"),
                Condition::And(vec![
                    Condition::column("form_id", Operator::Eq, "1"),
                    Condition::placeholder("geolocation"),
                ]),
            ]),
        ])
    }

    #[test]
    fn test_replace_condition_at_depth() {
        let replacement = Condition::Expr("distance < 5".to_string());
        let replaced = sample_tree().replace_condition("geolocation", &replacement);

        assert!(!replaced.contains_tag("geolocation"));
        // non-tagged leaves are untouched
        assert!(replaced.contains_tag("status"));
        assert!(replaced.contains_tag("form_id"));

        let expected = Condition::And(vec![
            Condition::column("status", Operator::Eq, "active"),
            Condition::Or(vec![
                replacement.clone(),
                Condition::And(vec![
                    Condition::column("form_id", Operator::Eq, "1"),
                    replacement,
                ]),
            ]),
        ]);
        assert_eq!(replaced, expected);
    }

    #[test]
    fn test_replace_condition_leaves_original_untouched() {
        let tree = sample_tree();
        let _ = tree.replace_condition("geolocation", &Condition::True);
        // the input tree still holds its placeholders
        assert!(tree.contains_tag("geolocation"));
    }

    #[test]
    fn test_replace_missing_tag_is_identity() {
        let tree = sample_tree();
        let replaced = tree.replace_condition("no_such_tag", &Condition::True);
        assert_eq!(tree, replaced);
    }

    #[test]
    fn test_to_sql() {
        let tree = Condition::And(vec![
            Condition::column("status", Operator::Eq, "active"),
            Condition::True,
        ]);
        assert_eq!(tree.to_sql(), "(`status` = 'active' AND TRUE)");

        assert_eq!(Condition::And(vec![]).to_sql(), "TRUE");
        assert_eq!(Condition::Expr("1 < 2".to_string()).to_sql(), "(1 < 2)");
    }

    #[test]
    fn test_single_child_unwrapping() {
        let leaf = Condition::column("a", Operator::Eq, "b");
        assert_eq!(Condition::or(vec![leaf.clone()]), leaf);
        assert_eq!(Condition::and(vec![leaf.clone()]), leaf);
        assert!(matches!(Condition::or(vec![]), Condition::Or(_)));
    }
}
