//! Default-layout coordination.
//!
//! # Responsibility
//! - Keep exactly one default layout per environment across create, update,
//!   delete and bootstrap paths.
//!
//! # Invariants
//! - Default transitions are compare-and-swap writes keyed on environment;
//!   no in-process locks are involved.
//! - The current default can only lose its flag to another active layout.
//! - Concurrent bootstrap callers all observe the same default layout.

use crate::model::layout::{ActorId, Layout, LayoutId, LayoutScope};
use crate::repo::layout_store::{DefaultSwap, EnsuredDefault, LayoutStore, RepoError};
use crate::service::error::{InvalidOperation, LayoutError, LayoutResult};
use crate::service::template::builtin_layout;
use log::{debug, info, warn};

/// Bound on compare-and-swap retries when the default moves concurrently.
pub const DEFAULT_MAX_SWAP_ATTEMPTS: u32 = 5;

const BUILTIN_LAYOUT_DESCRIPTION: &str = "System generated default layout";

/// Result of a default transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultChange {
    /// Layout that lost the default flag, when one existed.
    pub previous: Option<Layout>,
    pub current: Layout,
    /// `false` when `current` already was the default.
    pub changed: bool,
}

/// Enforces the single-default-per-environment rule on top of a store.
pub struct DefaultLayoutCoordinator<'s, S: LayoutStore> {
    store: &'s S,
    max_swap_attempts: u32,
}

impl<'s, S: LayoutStore> DefaultLayoutCoordinator<'s, S> {
    pub fn new(store: &'s S, max_swap_attempts: u32) -> Self {
        Self {
            store,
            max_swap_attempts: max_swap_attempts.max(1),
        }
    }

    /// Makes `layout_id` the environment default.
    ///
    /// Idempotent when it already is. Fails with `NotFound` unless the id
    /// resolves to an active layout in `scope`.
    pub fn set_default(
        &self,
        scope: &LayoutScope,
        layout_id: LayoutId,
    ) -> LayoutResult<DefaultChange> {
        for attempt in 1..=self.max_swap_attempts {
            let expected = self.store.current_default(scope)?.map(|layout| layout.id);
            match self
                .store
                .compare_and_swap_default(scope, expected, layout_id)?
            {
                DefaultSwap::Unchanged(current) => {
                    return Ok(DefaultChange {
                        previous: None,
                        current,
                        changed: false,
                    });
                }
                DefaultSwap::Swapped { previous, current } => {
                    info!(
                        "event=default_set module=coordinator status=ok layout_id={} previous_id={} attempt={}",
                        current.id,
                        previous
                            .as_ref()
                            .map_or_else(|| "none".to_string(), |layout| layout.id.to_string()),
                        attempt
                    );
                    return Ok(DefaultChange {
                        previous,
                        current,
                        changed: true,
                    });
                }
                DefaultSwap::Stale { current } => {
                    debug!(
                        "event=default_set module=coordinator status=retry layout_id={} observed={:?} attempt={}",
                        layout_id, current, attempt
                    );
                }
            }
        }

        warn!(
            "event=default_set module=coordinator status=error layout_id={} error_code=default_contention attempts={}",
            layout_id, self.max_swap_attempts
        );
        Err(LayoutError::DefaultContention {
            attempts: self.max_swap_attempts,
        })
    }

    /// Rejects deleting the environment default.
    ///
    /// Callers move the default with `set_default` before deleting.
    pub fn on_delete(&self, layout: &Layout) -> LayoutResult<()> {
        if layout.is_default {
            return Err(LayoutError::InvalidOperation(
                InvalidOperation::DeleteDefault(layout.id),
            ));
        }
        Ok(())
    }

    /// Returns the environment default, creating the built-in layout when
    /// there is none.
    pub fn ensure_default_exists(
        &self,
        scope: &LayoutScope,
        actor_id: ActorId,
    ) -> LayoutResult<EnsuredDefault> {
        if let Some(existing) = self.store.current_default(scope)? {
            return Ok(EnsuredDefault::Existing(existing));
        }

        let builtin = builtin_layout();
        let mut layout = Layout::new(*scope, actor_id, builtin.name, builtin.content);
        layout.identifier = builtin.identifier.to_string();
        layout.description = Some(BUILTIN_LAYOUT_DESCRIPTION.to_string());
        layout.content_type = builtin.content_type;
        layout.variables = builtin.variables;

        match self.store.insert_default_if_absent(&layout) {
            Ok(ensured) => Ok(ensured),
            Err(RepoError::Conflict(conflict)) => match self.store.current_default(scope)? {
                // Another writer won the bootstrap between our read and write.
                Some(winner) => Ok(EnsuredDefault::Existing(winner)),
                None => Err(LayoutError::Conflict(conflict)),
            },
            Err(err) => Err(err.into()),
        }
    }
}
