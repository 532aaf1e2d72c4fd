//! Learnings and error patterns in the `knowledge` collection

use arp_core::Severity;
use arp_store::{Collection, ErrorPattern, KnowledgeBase, KnowledgeStore, Learning, StoreError};
use tracing::{debug, info};

/// Learnings retained in the collection
pub const LEARNINGS_CAP: usize = 500;

/// Most recent learnings for a context
///
/// # Errors
/// Returns a store error
pub fn query(
    store: &KnowledgeStore,
    context: &str,
    limit: usize,
) -> Result<Vec<Learning>, StoreError> {
    let kb = store.get::<KnowledgeBase>(Collection::Knowledge)?.data;
    Ok(kb.learnings_for(context).take(limit).cloned().collect())
}

/// Append a learning, dropping the oldest past the cap
///
/// # Errors
/// Returns a store error
pub fn sync(store: &KnowledgeStore, learning: Learning) -> Result<(), StoreError> {
    store.update(Collection::Knowledge, |kb: &mut KnowledgeBase| {
        debug!(context = %learning.context, target = %learning.target, "learning synced");
        kb.learnings.push(learning);
        if kb.learnings.len() > LEARNINGS_CAP {
            let excess = kb.learnings.len() - LEARNINGS_CAP;
            kb.learnings.drain(..excess);
        }
        Ok(())
    })
}

/// Register an error pattern for risk prediction; duplicates are replaced
///
/// # Errors
/// Returns `Ok(false)` for an invalid regex, or a store error
pub fn add_pattern(
    store: &KnowledgeStore,
    pattern: &str,
    severity: Severity,
    category: &str,
    message: &str,
) -> Result<bool, StoreError> {
    if arp_prediction::compile_pattern(pattern).is_none() {
        return Ok(false);
    }
    store.update(Collection::Knowledge, |kb: &mut KnowledgeBase| {
        kb.error_patterns.retain(|p| p.pattern != pattern);
        kb.error_patterns.push(ErrorPattern {
            pattern: pattern.to_string(),
            severity,
            category: category.to_string(),
            message: message.to_string(),
        });
        Ok::<_, StoreError>(())
    })?;
    info!(pattern, %severity, "error pattern registered");
    Ok(true)
}

/// Error patterns currently registered
///
/// # Errors
/// Returns a store error
pub fn patterns(store: &KnowledgeStore) -> Result<Vec<ErrorPattern>, StoreError> {
    Ok(store.get::<KnowledgeBase>(Collection::Knowledge)?.data.error_patterns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arp_core::StoreConfig;
    use chrono::Utc;

    fn learning(context: &str, n: u32) -> Learning {
        Learning {
            context: context.into(),
            operation: "modify".into(),
            target: format!("file{n}.rs"),
            strategy: "rebuild".into(),
            success: n % 2 == 0,
            elapsed_secs: f64::from(n),
            note: None,
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn query_returns_most_recent_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = KnowledgeStore::open(dir.path(), StoreConfig::default()).unwrap();
        for n in 0..5 {
            sync(&store, learning("build_error", n)).unwrap();
        }
        sync(&store, learning("test_failure", 9)).unwrap();

        let found = query(&store, "build_error", 2).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].target, "file4.rs");
        assert_eq!(found[1].target, "file3.rs");
        assert!(query(&store, "unknown", 10).unwrap().is_empty());
    }

    #[test]
    fn patterns_are_validated_and_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        let store = KnowledgeStore::open(dir.path(), StoreConfig::default()).unwrap();
        assert!(!add_pattern(&store, "([", Severity::High, "syntax", "bad").unwrap());
        assert!(add_pattern(&store, r"unsafe\s*\{", Severity::High, "safety", "unsafe block").unwrap());
        assert!(add_pattern(&store, r"unsafe\s*\{", Severity::Critical, "safety", "unsafe block").unwrap());
        let all = patterns(&store).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].severity, Severity::Critical);
    }
}
