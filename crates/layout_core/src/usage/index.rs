//! Usage probe registry and fan-out query.

use crate::model::layout::{LayoutId, LayoutScope};
use crate::repo::layout_store::RepoResult;
use log::debug;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Entity kind used by workflow steps that render through a layout.
pub const WORKFLOW_STEP_KIND: &str = "workflow_step";

/// One referencing entity kind able to point at layouts.
pub trait UsageProbe {
    /// Stable kind id, e.g. `workflow_step`.
    fn entity_kind(&self) -> &str;
    /// Returns whether any entity of this kind references `layout_id`.
    fn is_used(&self, layout_id: LayoutId, scope: &LayoutScope) -> RepoResult<bool>;
}

/// Probe registration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsageRegistryError {
    InvalidEntityKind(String),
    DuplicateEntityKind(String),
}

impl Display for UsageRegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidEntityKind(value) => write!(f, "entity kind is invalid: `{value}`"),
            Self::DuplicateEntityKind(value) => {
                write!(f, "entity kind already registered: `{value}`")
            }
        }
    }
}

impl Error for UsageRegistryError {}

/// Fan-out over registered usage probes.
#[derive(Default)]
pub struct UsageIndex<'a> {
    probes: BTreeMap<String, Box<dyn UsageProbe + 'a>>,
}

impl<'a> UsageIndex<'a> {
    pub fn new() -> Self {
        Self {
            probes: BTreeMap::new(),
        }
    }

    /// Registers one probe under its entity kind.
    pub fn register(&mut self, probe: Box<dyn UsageProbe + 'a>) -> Result<(), UsageRegistryError> {
        let kind = probe.entity_kind().trim().to_string();
        if !is_valid_entity_kind(&kind) {
            return Err(UsageRegistryError::InvalidEntityKind(kind));
        }
        if self.probes.contains_key(kind.as_str()) {
            return Err(UsageRegistryError::DuplicateEntityKind(kind));
        }

        self.probes.insert(kind, probe);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }

    /// Returns sorted entity kinds.
    pub fn entity_kinds(&self) -> Vec<String> {
        self.probes.keys().cloned().collect()
    }

    /// Returns `true` on the first probe reporting a reference.
    ///
    /// Probes run in entity-kind order; later probes are skipped after a hit.
    pub fn is_used(&self, layout_id: LayoutId, scope: &LayoutScope) -> RepoResult<bool> {
        for (kind, probe) in &self.probes {
            if probe.is_used(layout_id, scope)? {
                debug!("event=usage_probe module=usage status=hit layout_id={layout_id} kind={kind}");
                return Ok(true);
            }
        }
        Ok(false)
    }
}

fn is_valid_entity_kind(value: &str) -> bool {
    if value.is_empty() {
        return false;
    }
    value
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::{UsageIndex, UsageProbe, UsageRegistryError};
    use crate::model::layout::{LayoutId, LayoutScope};
    use crate::repo::layout_store::RepoResult;
    use std::cell::Cell;
    use std::rc::Rc;
    use uuid::Uuid;

    struct FixedProbe {
        kind: &'static str,
        answer: bool,
        calls: Rc<Cell<u32>>,
    }

    impl FixedProbe {
        fn boxed(kind: &'static str, answer: bool, calls: &Rc<Cell<u32>>) -> Box<Self> {
            Box::new(Self {
                kind,
                answer,
                calls: Rc::clone(calls),
            })
        }
    }

    impl UsageProbe for FixedProbe {
        fn entity_kind(&self) -> &str {
            self.kind
        }

        fn is_used(&self, _layout_id: LayoutId, _scope: &LayoutScope) -> RepoResult<bool> {
            self.calls.set(self.calls.get() + 1);
            Ok(self.answer)
        }
    }

    fn scope() -> LayoutScope {
        LayoutScope::new(Uuid::new_v4(), Uuid::new_v4())
    }

    #[test]
    fn register_rejects_invalid_and_duplicate_kinds() {
        let calls = Rc::new(Cell::new(0));
        let mut index = UsageIndex::new();
        index
            .register(FixedProbe::boxed("workflow_step", false, &calls))
            .unwrap();

        let duplicate = index
            .register(FixedProbe::boxed("workflow_step", true, &calls))
            .unwrap_err();
        assert_eq!(
            duplicate,
            UsageRegistryError::DuplicateEntityKind("workflow_step".to_string())
        );

        let invalid = index
            .register(FixedProbe::boxed("Bad Kind", true, &calls))
            .unwrap_err();
        assert!(matches!(invalid, UsageRegistryError::InvalidEntityKind(_)));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn empty_index_reports_unused() {
        let index = UsageIndex::new();
        assert!(index.is_empty());
        assert!(!index.is_used(Uuid::new_v4(), &scope()).unwrap());
    }

    #[test]
    fn is_used_short_circuits_on_first_hit() {
        let calls = Rc::new(Cell::new(0));
        let mut index = UsageIndex::new();
        index.register(FixedProbe::boxed("a_kind", true, &calls)).unwrap();
        index.register(FixedProbe::boxed("b_kind", true, &calls)).unwrap();
        index.register(FixedProbe::boxed("c_kind", false, &calls)).unwrap();

        assert!(index.is_used(Uuid::new_v4(), &scope()).unwrap());
        assert_eq!(calls.get(), 1);
        assert_eq!(index.entity_kinds(), vec!["a_kind", "b_kind", "c_kind"]);
    }
}
