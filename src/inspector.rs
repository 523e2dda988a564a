/// Inspector tree (§4.2, §5).
///
/// Inspectors form a capability tree. A struct type not given an explicit
/// inspector at construction is controlled by the process-wide
/// `current_inspector`; a type is "controlled" by inspector `I` if `I` is
/// an ancestor of (or identical to) the type's own inspector.

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::sync::Arc;

/// Mirrors `conf::ALL_PROPS`'s `struct.default_inspector_depth_guard`
/// default — kept as a local constant rather than reading `AxConf` on every
/// ancestor check, since the check runs on every struct-type construction.
const DEFAULT_DEPTH_GUARD: usize = 1024;

#[derive(Debug)]
pub struct Inspector {
    pub name: Option<String>,
    pub parent: Option<Arc<Inspector>>,
}

impl Inspector {
    fn root() -> Arc<Inspector> {
        Arc::new(Inspector { name: Some("root".to_string()), parent: None })
    }

    /// Is `self` an ancestor of (or the same inspector as) `other`?
    pub fn controls(self: &Arc<Self>, other: &Arc<Inspector>) -> bool {
        let mut cur = Arc::clone(other);
        for _ in 0..DEFAULT_DEPTH_GUARD {
            if Arc::ptr_eq(self, &cur) {
                return true;
            }
            match cur.parent.clone() {
                Some(p) => cur = p,
                None => return false,
            }
        }
        // A well-formed inspector chain never grows this long; treat it as
        // a misconstructed cycle rather than looping forever.
        false
    }
}

pub static CURRENT_INSPECTOR: Lazy<RwLock<Arc<Inspector>>> = Lazy::new(|| RwLock::new(Inspector::root()));

pub fn current_inspector() -> Arc<Inspector> {
    CURRENT_INSPECTOR.read().clone()
}

pub fn set_current_inspector(inspector: Arc<Inspector>) {
    *CURRENT_INSPECTOR.write() = inspector;
}

/// `make-inspector`: a fresh child of `parent` (or of `current_inspector()`
/// when `parent` is `None`).
pub fn make_inspector(parent: Option<Arc<Inspector>>) -> Arc<Inspector> {
    let parent = parent.unwrap_or_else(current_inspector);
    Arc::new(Inspector { name: None, parent: Some(parent) })
}

/// `make-sibling-inspector`: a fresh inspector sharing `of`'s parent rather
/// than descending from `of` itself.
pub fn make_sibling_inspector(of: &Arc<Inspector>) -> Arc<Inspector> {
    Arc::new(Inspector { name: None, parent: of.parent.clone() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn an_inspector_controls_itself() {
        let i = make_inspector(None);
        assert!(i.controls(&i));
    }

    #[test]
    fn a_parent_controls_its_child() {
        let parent = make_inspector(None);
        let child = make_inspector(Some(Arc::clone(&parent)));
        assert!(parent.controls(&child));
        assert!(!child.controls(&parent));
    }

    #[test]
    fn siblings_do_not_control_each_other() {
        let parent = make_inspector(None);
        let child = make_inspector(Some(Arc::clone(&parent)));
        let sibling = make_sibling_inspector(&child);
        assert!(!child.controls(&sibling));
        assert!(!sibling.controls(&child));
        assert!(parent.controls(&sibling));
    }

    #[test]
    fn current_inspector_round_trips() {
        let custom = make_inspector(None);
        set_current_inspector(Arc::clone(&custom));
        assert!(Arc::ptr_eq(&current_inspector(), &custom));
        set_current_inspector(Inspector::root());
    }
}
