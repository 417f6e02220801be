//! Filter builder for the backend's REST interface.
//!
//! Filters are encoded as query parameters in the `column=op.value` form:
//!
//! ```text
//! GET /rest/v1/posts?select=*&author_id=in.(a,b)&order=created_at.desc&limit=20
//! ```

use std::fmt::Display;

/// A table read or write target with its filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    table: String,
    select: Option<String>,
    filters: Vec<(String, String)>,
    order: Vec<String>,
    limit: Option<usize>,
    offset: Option<usize>,
}

impl Query {
    /// Start a query against `table`.
    #[must_use]
    pub fn table(table: &str) -> Self {
        Self {
            table: table.to_string(),
            select: None,
            filters: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Columns (and embedded relations) to return. Defaults to `*`.
    #[must_use]
    pub fn select(mut self, columns: &str) -> Self {
        self.select = Some(columns.to_string());
        self
    }

    #[must_use]
    pub fn eq(self, column: &str, value: impl Display) -> Self {
        self.filter(column, "eq", value)
    }

    #[must_use]
    pub fn neq(self, column: &str, value: impl Display) -> Self {
        self.filter(column, "neq", value)
    }

    #[must_use]
    pub fn lt(self, column: &str, value: impl Display) -> Self {
        self.filter(column, "lt", value)
    }

    #[must_use]
    pub fn gt(self, column: &str, value: impl Display) -> Self {
        self.filter(column, "gt", value)
    }

    /// Match any of `values`. An empty list matches nothing.
    #[must_use]
    pub fn in_<I, V>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Display,
    {
        let list = values
            .into_iter()
            .map(|v| quote_list_item(&v.to_string()))
            .collect::<Vec<_>>()
            .join(",");
        self.filter(column, "in", format!("({list})"))
    }

    /// Case-insensitive pattern match; `*` is the wildcard.
    #[must_use]
    pub fn ilike(self, column: &str, pattern: &str) -> Self {
        self.filter(column, "ilike", pattern)
    }

    #[must_use]
    pub fn is_null(self, column: &str) -> Self {
        self.filter(column, "is", "null")
    }

    /// Match rows satisfying any of `(column, operator, value)`.
    #[must_use]
    pub fn or(mut self, conditions: &[(&str, &str, &str)]) -> Self {
        let inner = conditions
            .iter()
            .map(|(column, op, value)| format!("{column}.{op}.{}", quote_list_item(value)))
            .collect::<Vec<_>>()
            .join(",");
        self.filters.push(("or".to_string(), format!("({inner})")));
        self
    }

    /// Rows that come after `(value, tiebreak)` in a `column desc,
    /// tiebreak_column desc` listing, for keyset paging.
    #[must_use]
    pub fn before(
        mut self,
        column: &str,
        value: impl Display,
        tiebreak_column: &str,
        tiebreak: impl Display,
    ) -> Self {
        let value = quote_list_item(&value.to_string());
        let tiebreak = quote_list_item(&tiebreak.to_string());
        self.filters.push((
            "or".to_string(),
            format!("({column}.lt.{value},and({column}.eq.{value},{tiebreak_column}.lt.{tiebreak}))"),
        ));
        self
    }

    /// Add a sort key. Keys apply in the order they were added.
    #[must_use]
    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        let direction = if ascending { "asc" } else { "desc" };
        self.order.push(format!("{column}.{direction}"));
        self
    }

    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub const fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    fn filter(mut self, column: &str, op: &str, value: impl Display) -> Self {
        self.filters.push((column.to_string(), format!("{op}.{value}")));
        self
    }

    /// Query parameters for a read.
    #[must_use]
    pub fn read_params(&self) -> Vec<(String, String)> {
        let mut params = vec![(
            "select".to_string(),
            self.select.clone().unwrap_or_else(|| "*".to_string()),
        )];
        params.extend(self.filter_params());
        if !self.order.is_empty() {
            params.push(("order".to_string(), self.order.join(",")));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        if let Some(offset) = self.offset {
            params.push(("offset".to_string(), offset.to_string()));
        }
        params
    }

    /// Query parameters for a write: filters only, plus `select` so the
    /// returned representation can embed relations.
    #[must_use]
    pub fn write_params(&self) -> Vec<(String, String)> {
        let mut params = self.filter_params();
        if let Some(select) = &self.select {
            params.push(("select".to_string(), select.clone()));
        }
        params
    }

    fn filter_params(&self) -> Vec<(String, String)> {
        self.filters.clone()
    }

    /// Whether any row filter is set. Unfiltered writes are refused.
    #[must_use]
    pub fn has_filters(&self) -> bool {
        !self.filters.is_empty()
    }

    /// Stable text form, used as a cache key.
    #[must_use]
    pub fn cache_key(&self) -> String {
        let params = self
            .read_params()
            .into_iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{params}", self.table)
    }
}

/// Values containing list delimiters must be double-quoted inside `in.(…)`.
fn quote_list_item(value: &str) -> String {
    if value.contains([',', '(', ')', '"', ' ']) {
        format!("\"{}\"", value.replace('"', "\\\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(params: &[(String, String)]) -> Vec<(&str, &str)> {
        params
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect()
    }

    #[test]
    fn test_read_params() {
        let query = Query::table("posts")
            .select("*,author:profiles(username)")
            .eq("group_id", "g1")
            .lt("created_at", "2024-05-01T00:00:00Z")
            .order("created_at", false)
            .limit(21);

        assert_eq!(
            pairs(&query.read_params()),
            vec![
                ("select", "*,author:profiles(username)"),
                ("group_id", "eq.g1"),
                ("created_at", "lt.2024-05-01T00:00:00Z"),
                ("order", "created_at.desc"),
                ("limit", "21"),
            ]
        );
    }

    #[test]
    fn test_keyset_before_breaks_ties_on_second_column() {
        let query = Query::table("posts").before("created_at", "2026-03-01T12:00:00.000000Z", "id", "p7");
        assert_eq!(
            pairs(&query.read_params()),
            vec![
                ("select", "*"),
                (
                    "or",
                    "(created_at.lt.2026-03-01T12:00:00.000000Z,and(created_at.eq.2026-03-01T12:00:00.000000Z,id.lt.p7))"
                ),
            ]
        );
    }

    #[test]
    fn test_default_select_is_star() {
        let params = Query::table("stores").read_params();
        assert_eq!(pairs(&params), vec![("select", "*")]);
    }

    #[test]
    fn test_in_filter_quotes_awkward_values() {
        let query = Query::table("profiles").in_("username", ["ada", "grace hopper"]);
        assert_eq!(
            pairs(&query.write_params()),
            vec![("username", "in.(ada,\"grace hopper\")")]
        );
    }

    #[test]
    fn test_write_params_skip_paging() {
        let query = Query::table("wallets")
            .eq("id", "w1")
            .eq("balance", "1500.00")
            .limit(1);
        assert_eq!(
            pairs(&query.write_params()),
            vec![("id", "eq.w1"), ("balance", "eq.1500.00")]
        );
        assert!(query.has_filters());
        assert!(!Query::table("wallets").has_filters());
    }

    #[test]
    fn test_misc_operators() {
        let query = Query::table("products")
            .neq("active", false)
            .gt("stock", 0)
            .ilike("title", "*shea*")
            .is_null("deleted_at")
            .order("title", true)
            .order("id", true)
            .offset(40);
        let params = query.read_params();
        assert!(params.contains(&("active".to_string(), "neq.false".to_string())));
        assert!(params.contains(&("stock".to_string(), "gt.0".to_string())));
        assert!(params.contains(&("title".to_string(), "ilike.*shea*".to_string())));
        assert!(params.contains(&("deleted_at".to_string(), "is.null".to_string())));
        assert!(params.contains(&("order".to_string(), "title.asc,id.asc".to_string())));
        assert!(params.contains(&("offset".to_string(), "40".to_string())));
    }

    #[test]
    fn test_or_filter() {
        let query = Query::table("profiles").or(&[
            ("username", "ilike", "*ada*"),
            ("display_name", "ilike", "*ada lovelace*"),
        ]);
        assert_eq!(
            pairs(&query.write_params()),
            vec![(
                "or",
                "(username.ilike.*ada*,display_name.ilike.\"*ada lovelace*\")"
            )]
        );
    }

    #[test]
    fn test_cache_key_is_stable() {
        let a = Query::table("stores").eq("slug", "mama-put").cache_key();
        let b = Query::table("stores").eq("slug", "mama-put").cache_key();
        assert_eq!(a, b);
        assert_eq!(a, "stores?select=*&slug=eq.mama-put");
    }
}
