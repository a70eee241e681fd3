//! Post-analyze hook.
//!
//! Runs between the host's parse/analyze pipeline and planning. Captures
//! the verbatim statement text for diagnostics, flags EXPLAIN-style
//! requests so the controller bypasses them, and watches for utility
//! statements that alter or drop the cache's own schema — the memoized
//! identifiers go stale at exactly that moment. Always calls through to a
//! previously registered hook.

use crate::controller::PlanningContext;
use crate::resolver::{IdResolver, CACHE_SCHEMA_NAME};
use plancache_core::{CommandKind, Query, UtilityStmt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub type AnalyzeHook = Box<dyn Fn(&mut PlanningContext, &Query) + Send + Sync>;

pub struct Analyzer {
    resolver: Arc<IdResolver>,
    enabled: Arc<AtomicBool>,
    next: Option<AnalyzeHook>,
}

impl Analyzer {
    pub(crate) fn new(resolver: Arc<IdResolver>, enabled: Arc<AtomicBool>) -> Self {
        Self {
            resolver,
            enabled,
            next: None,
        }
    }

    /// Chain a previously registered hook; it runs after this one.
    pub fn with_next(mut self, next: AnalyzeHook) -> Self {
        self.next = Some(next);
        self
    }

    pub fn analyze(&self, ctx: &mut PlanningContext, query: &Query, source_text: &str) {
        ctx.query_text = Some(source_text.to_string());
        ctx.explain = false;

        if query.command == CommandKind::Utility {
            match &query.utility {
                Some(UtilityStmt::Explain { .. }) => ctx.explain = true,
                Some(UtilityStmt::AlterExtension { name }) if name == CACHE_SCHEMA_NAME => {
                    self.resolver.invalidate();
                }
                Some(UtilityStmt::DropExtension { name }) if name == CACHE_SCHEMA_NAME => {
                    self.resolver.invalidate();
                    self.enabled.store(false, Ordering::Relaxed);
                    tracing::info!("plan cache was disabled");
                }
                _ => {}
            }
        }

        if let Some(next) = &self.next {
            next(ctx, query);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::MemoryCatalog;
    use std::sync::atomic::AtomicUsize;

    fn analyzer() -> (Analyzer, Arc<AtomicBool>) {
        let resolver = Arc::new(IdResolver::new(MemoryCatalog::with_cache_schema()));
        let enabled = Arc::new(AtomicBool::new(true));
        (Analyzer::new(resolver, Arc::clone(&enabled)), enabled)
    }

    fn utility(stmt: UtilityStmt) -> Query {
        let mut query = Query::select(vec![]);
        query.command = CommandKind::Utility;
        query.utility = Some(stmt);
        query
    }

    #[test]
    fn test_captures_source_text() {
        let (analyzer, _) = analyzer();
        let mut ctx = PlanningContext::new();
        let query = Query::select(vec![]);

        analyzer.analyze(&mut ctx, &query, "SELECT 1");
        assert_eq!(ctx.query_text.as_deref(), Some("SELECT 1"));
        assert!(!ctx.explain);
    }

    #[test]
    fn test_flags_explain_requests() {
        let (analyzer, _) = analyzer();
        let mut ctx = PlanningContext::new();
        let query = utility(UtilityStmt::Explain {
            query: Box::new(Query::select(vec![])),
        });

        analyzer.analyze(&mut ctx, &query, "EXPLAIN SELECT 1");
        assert!(ctx.explain);

        // The flag resets on the next plain statement.
        analyzer.analyze(&mut ctx, &Query::select(vec![]), "SELECT 1");
        assert!(!ctx.explain);
    }

    #[test]
    fn test_drop_extension_disables_cache() {
        let (analyzer, enabled) = analyzer();
        let mut ctx = PlanningContext::new();

        let query = utility(UtilityStmt::DropExtension {
            name: CACHE_SCHEMA_NAME.to_string(),
        });
        analyzer.analyze(&mut ctx, &query, "DROP EXTENSION plancache");
        assert!(!enabled.load(Ordering::Relaxed));
    }

    #[test]
    fn test_unrelated_drop_is_ignored() {
        let (analyzer, enabled) = analyzer();
        let mut ctx = PlanningContext::new();

        let query = utility(UtilityStmt::DropExtension {
            name: "something_else".to_string(),
        });
        analyzer.analyze(&mut ctx, &query, "DROP EXTENSION something_else");
        assert!(enabled.load(Ordering::Relaxed));
    }

    #[test]
    fn test_chains_to_next_hook() {
        let (analyzer, _) = analyzer();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_in_hook = Arc::clone(&hits);
        let analyzer = analyzer.with_next(Box::new(move |_, _| {
            hits_in_hook.fetch_add(1, Ordering::SeqCst);
        }));

        let mut ctx = PlanningContext::new();
        analyzer.analyze(&mut ctx, &Query::select(vec![]), "SELECT 1");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
