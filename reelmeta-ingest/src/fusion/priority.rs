//! Per-field strategy priority

use reelmeta_common::{FieldName, Platform};
use std::collections::HashMap;

/// Which strategy wins a field when several supply a value
///
/// Fields without an explicit order fall back to registration order.
/// Strategies missing from both lists rank last, ordered by id, so the
/// ranking is total and merges never depend on settle order.
#[derive(Debug, Clone)]
pub struct FieldPriorityTable {
    platform: Platform,
    registration_order: Vec<String>,
    per_field: HashMap<FieldName, Vec<String>>,
}

impl FieldPriorityTable {
    pub fn new<S: AsRef<str>>(platform: Platform, registration_order: &[S]) -> Self {
        Self {
            platform,
            registration_order: registration_order.iter().map(|s| s.as_ref().to_string()).collect(),
            per_field: HashMap::new(),
        }
    }

    /// Explicit order for one field (highest priority first)
    pub fn with_field_order<S: AsRef<str>>(mut self, field: FieldName, order: &[S]) -> Self {
        self.set_field_order(field, order);
        self
    }

    pub fn set_field_order<S: AsRef<str>>(&mut self, field: FieldName, order: &[S]) {
        self.per_field
            .insert(field, order.iter().map(|s| s.as_ref().to_string()).collect());
    }

    /// Append a strategy to the fallback (registration) order
    pub fn push_strategy(&mut self, strategy_id: &str) {
        if !self.registration_order.iter().any(|s| s == strategy_id) {
            self.registration_order.push(strategy_id.to_string());
        }
    }

    /// Same explicit order for several fields
    pub fn with_fields_order<S: AsRef<str>>(mut self, fields: &[FieldName], order: &[S]) -> Self {
        for field in fields {
            self = self.with_field_order(*field, order);
        }
        self
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn registration_order(&self) -> &[String] {
        &self.registration_order
    }

    /// Position of `strategy_id` for `field` (lower wins)
    pub fn rank(&self, field: FieldName, strategy_id: &str) -> usize {
        let explicit = self.per_field.get(&field);

        if let Some(pos) = explicit.and_then(|order| order.iter().position(|s| s == strategy_id)) {
            return pos;
        }

        let offset = explicit.map(Vec::len).unwrap_or(0);
        match self.registration_order.iter().position(|s| s == strategy_id) {
            Some(pos) => offset + pos,
            None => usize::MAX,
        }
    }

    /// Whether `candidate` has equal or higher priority than `holder` for `field`
    pub fn outranks(&self, field: FieldName, candidate: &str, holder: &str) -> bool {
        let (c, h) = (self.rank(field, candidate), self.rank(field, holder));
        c < h || (c == h && candidate <= holder)
    }

    /// Effective strategy order for `field`
    pub fn order_for(&self, field: FieldName) -> Vec<&str> {
        let mut order: Vec<&str> = self
            .per_field
            .get(&field)
            .map(|o| o.iter().map(String::as_str).collect())
            .unwrap_or_default();
        for id in &self.registration_order {
            if !order.contains(&id.as_str()) {
                order.push(id);
            }
        }
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> FieldPriorityTable {
        FieldPriorityTable::new(Platform::YouTube, &["page", "api", "oembed"])
            .with_field_order(FieldName::Likes, &["api", "page"])
    }

    #[test]
    fn test_registration_order_is_default() {
        let t = table();
        assert!(t.outranks(FieldName::Title, "page", "api"));
        assert!(!t.outranks(FieldName::Title, "oembed", "page"));
    }

    #[test]
    fn test_explicit_field_order_wins() {
        let t = table();
        assert!(t.outranks(FieldName::Likes, "api", "page"));
        assert!(!t.outranks(FieldName::Likes, "page", "api"));
        // Not listed for likes, falls behind the explicit entries
        assert!(!t.outranks(FieldName::Likes, "oembed", "page"));
    }

    #[test]
    fn test_unknown_strategies_rank_last_by_id() {
        let t = table();
        assert!(t.outranks(FieldName::Title, "oembed", "zzz"));
        assert!(t.outranks(FieldName::Title, "aaa", "zzz"));
        assert!(!t.outranks(FieldName::Title, "zzz", "aaa"));
    }

    #[test]
    fn test_same_strategy_counts_as_equal() {
        assert!(table().outranks(FieldName::Views, "api", "api"));
    }

    #[test]
    fn test_order_for_merges_lists() {
        assert_eq!(table().order_for(FieldName::Likes), vec!["api", "page", "oembed"]);
        assert_eq!(table().order_for(FieldName::Title), vec!["page", "api", "oembed"]);
    }
}
