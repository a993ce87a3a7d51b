//! Building blocks for the dynamic list queries.
//!
//! Filters only ever contribute bound parameters. Column names in ORDER BY
//! come from a caller-supplied whitelist, never from the request.

use serde::Serialize;

/// A value bound to a named SQL parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        Self::Integer(v as i64)
    }
}

impl From<u32> for SqlValue {
    fn from(v: u32) -> Self {
        Self::Integer(v as i64)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        Self::Integer(v as i64)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

/// Ordered named parameters (`:name` → value).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(Vec<(String, SqlValue)>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Params::push`].
    pub fn bind(mut self, name: &str, value: impl Into<SqlValue>) -> Self {
        self.push(name, value);
        self
    }

    /// Binding the same name twice replaces the earlier value.
    pub fn push(&mut self, name: &str, value: impl Into<SqlValue>) {
        let value = value.into();
        match self.0.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = value,
            None => self.0.push((name.to_string(), value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Conditions joined with AND, plus the parameters they reference.
#[derive(Debug, Clone, Default)]
pub struct WhereClause {
    conditions: Vec<String>,
    params: Params,
}

impl WhereClause {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a condition that needs no parameter of its own.
    pub fn push(&mut self, condition: impl Into<String>) -> &mut Self {
        self.conditions.push(condition.into());
        self
    }

    pub fn push_with(
        &mut self,
        condition: impl Into<String>,
        name: &str,
        value: impl Into<SqlValue>,
    ) -> &mut Self {
        self.conditions.push(condition.into());
        self.params.push(name, value);
        self
    }

    /// `condition` bound to `%term%`.
    pub fn like(&mut self, condition: impl Into<String>, name: &str, term: &str) -> &mut Self {
        self.push_with(condition, name, format!("%{term}%"))
    }

    /// Add a condition only when a value is present.
    pub fn push_opt<T: Into<SqlValue>>(
        &mut self,
        condition: &str,
        name: &str,
        value: Option<T>,
    ) -> &mut Self {
        if let Some(value) = value {
            self.push_with(condition, name, value);
        }
        self
    }

    /// `like` only for non-blank terms.
    pub fn like_opt(&mut self, condition: &str, name: &str, term: Option<&str>) -> &mut Self {
        if let Some(term) = term.map(str::trim).filter(|t| !t.is_empty()) {
            self.like(condition, name, term);
        }
        self
    }

    /// Bind a parameter referenced elsewhere in the statement.
    pub fn bind(&mut self, name: &str, value: impl Into<SqlValue>) -> &mut Self {
        self.params.push(name, value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// `" WHERE a AND b"`, or an empty string.
    pub fn to_sql(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.conditions.join(" AND "))
        }
    }

    pub fn params(&self) -> &Params {
        &self.params
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    /// Case-insensitive `asc` / `desc`; anything else yields `default`.
    pub fn parse(value: Option<&str>, default: Self) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()) {
            Some(v) if v == "asc" => Self::Asc,
            Some(v) if v == "desc" => Self::Desc,
            _ => default,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// A whitelisted ORDER BY.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderBy {
    pub column: &'static str,
    pub direction: SortDirection,
}

impl OrderBy {
    /// Pick `requested` if it is one of `allowed` (by request key), else the
    /// default. `allowed` maps request keys to SQL expressions.
    pub fn resolve(
        requested: Option<&str>,
        allowed: &[(&str, &'static str)],
        default: &'static str,
        direction: SortDirection,
    ) -> Self {
        let column = requested
            .and_then(|key| allowed.iter().find(|(k, _)| *k == key))
            .map(|(_, column)| *column)
            .unwrap_or(default);

        Self { column, direction }
    }

    pub fn to_sql(&self) -> String {
        format!(" ORDER BY {} {}", self.column, self.direction.as_sql())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_clause_renders_nothing() {
        let clause = WhereClause::new();
        assert!(clause.is_empty());
        assert_eq!(clause.to_sql(), "");
    }

    #[test]
    fn conditions_are_anded_in_order() {
        let mut clause = WhereClause::new();
        clause
            .push_with("c.store_id = :storeId", ":storeId", 2_i64)
            .like("c.email LIKE :email", ":email", "example")
            .push("c.active = 1");

        assert_eq!(
            clause.to_sql(),
            " WHERE c.store_id = :storeId AND c.email LIKE :email AND c.active = 1"
        );
        assert_eq!(clause.params().get(":storeId"), Some(&SqlValue::Integer(2)));
        assert_eq!(
            clause.params().get(":email"),
            Some(&SqlValue::Text("%example%".into()))
        );
    }

    #[test]
    fn optional_filters_skip_absent_values() {
        let mut clause = WhereClause::new();
        clause
            .push_opt::<i64>("f.film_id = :filmId", ":filmId", None)
            .like_opt("f.title LIKE :title", ":title", Some("   "))
            .push_opt("f.length >= :minLength", ":minLength", Some(90_i64));

        assert_eq!(clause.to_sql(), " WHERE f.length >= :minLength");
        assert_eq!(clause.params().len(), 1);
    }

    #[test]
    fn rebinding_replaces() {
        let params = Params::new().bind(":id", 1_i64).bind(":id", 2_i64);
        assert_eq!(params.len(), 1);
        assert_eq!(params.get(":id"), Some(&SqlValue::Integer(2)));
    }

    #[test]
    fn option_maps_to_null() {
        assert_eq!(SqlValue::from(None::<i64>), SqlValue::Null);
        assert_eq!(SqlValue::from(Some("x")), SqlValue::Text("x".into()));
    }

    #[test]
    fn sort_whitelist_falls_back_to_default() {
        let allowed = [("title", "f.title"), ("length", "f.length")];

        let order = OrderBy::resolve(Some("length"), &allowed, "f.title", SortDirection::Desc);
        assert_eq!(order.to_sql(), " ORDER BY f.length DESC");

        let order = OrderBy::resolve(
            Some("title; DROP TABLE film"),
            &allowed,
            "f.title",
            SortDirection::Asc,
        );
        assert_eq!(order.to_sql(), " ORDER BY f.title ASC");
    }

    #[test]
    fn sort_direction_parsing() {
        assert_eq!(SortDirection::parse(Some("DESC"), SortDirection::Asc), SortDirection::Desc);
        assert_eq!(SortDirection::parse(Some("sideways"), SortDirection::Desc), SortDirection::Desc);
        assert_eq!(SortDirection::parse(None, SortDirection::Asc), SortDirection::Asc);
    }
}
