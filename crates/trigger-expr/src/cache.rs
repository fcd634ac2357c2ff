use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::ast::Expr;
use crate::{parser, ExprError};

/// Parses pre-filter expression strings once and reuses the AST for every
/// subsequent event — rules are evaluated far more often than they're
/// edited, and re-parsing the same string on every event would dominate
/// the hot path.
#[derive(Default)]
pub struct AstCache {
    entries: RwLock<HashMap<String, Arc<Expr>>>,
}

impl AstCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse (or fetch the cached parse of) `source`.
    pub fn get_or_parse(&self, source: &str) -> Result<Arc<Expr>, ExprError> {
        if let Some(expr) = self.entries.read().get(source) {
            return Ok(Arc::clone(expr));
        }
        let expr = Arc::new(parser::parse(source)?);
        self.entries
            .write()
            .insert(source.to_string(), Arc::clone(&expr));
        Ok(expr)
    }

    /// Drop a cached parse, e.g. after a rule's expression is edited.
    pub fn invalidate(&self, source: &str) {
        self.entries.write().remove(source);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuses_parsed_ast_for_same_source() {
        let cache = AstCache::new();
        let a = cache.get_or_parse("amount > 1000").unwrap();
        let b = cache.get_or_parse("amount > 1000").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn invalidate_forces_reparse() {
        let cache = AstCache::new();
        let a = cache.get_or_parse("amount > 1000").unwrap();
        cache.invalidate("amount > 1000");
        let b = cache.get_or_parse("amount > 1000").unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn propagates_parse_errors() {
        let cache = AstCache::new();
        assert!(cache.get_or_parse("amount >").is_err());
        assert!(cache.is_empty());
    }
}
