//! Layout use-case service.
//!
//! # Responsibility
//! - Expose the layout operations as one storage-agnostic facade.
//! - Combine store, usage index, default coordination and change log.
//!
//! # Invariants
//! - Only `LayoutStore` mutates layout records.
//! - Change entries are appended after the store write committed; append
//!   failures are logged and never returned.
//! - Layout names and content are never written to logs.

use crate::model::change::{ChangeEntry, ChangeKind, NewChange};
use crate::model::layout::{
    slugify, ActorId, Layout, LayoutContentType, LayoutId, LayoutScope, LayoutVariable,
};
use crate::repo::change_log::ChangeLog;
use crate::repo::layout_store::{
    normalize_page_limit, DefaultPromotion, EnsuredDefault, IdentifierMode, LayoutFilter,
    LayoutOrder, LayoutPatch, LayoutStore, Pagination, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT,
};
use crate::service::default_coordinator::{DefaultLayoutCoordinator, DEFAULT_MAX_SWAP_ATTEMPTS};
use crate::service::error::{InvalidOperation, LayoutError, LayoutResult};
use crate::service::template::{
    builtin_layout, derive_layout_variables, BuiltinLayout, ContentValidator,
    HandlebarsContentValidator,
};
use crate::usage::index::UsageIndex;
use log::{debug, info, warn};

/// Tunables for `LayoutService`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceSettings {
    pub default_page_limit: u32,
    pub max_page_limit: u32,
    pub max_default_swap_attempts: u32,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            default_page_limit: DEFAULT_PAGE_LIMIT,
            max_page_limit: MAX_PAGE_LIMIT,
            max_default_swap_attempts: DEFAULT_MAX_SWAP_ATTEMPTS,
        }
    }
}

/// Input for creating a layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateLayoutCommand {
    pub scope: LayoutScope,
    pub actor_id: ActorId,
    pub name: String,
    /// Derived from `name` when absent, with a numeric suffix if the slug is
    /// taken. A caller-supplied identifier that is taken is a conflict.
    pub identifier: Option<String>,
    pub description: Option<String>,
    pub content: String,
    pub content_type: LayoutContentType,
    /// Derived from `content` placeholders when absent.
    pub variables: Option<Vec<LayoutVariable>>,
}

impl CreateLayoutCommand {
    /// Builds a custom-HTML create command with derived identifier and variables.
    pub fn new(
        scope: LayoutScope,
        actor_id: ActorId,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            scope,
            actor_id,
            name: name.into(),
            identifier: None,
            description: None,
            content: content.into(),
            content_type: LayoutContentType::CustomHtml,
            variables: None,
        }
    }
}

/// Input for updating a layout. `None` fields are left untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateLayoutCommand {
    pub scope: LayoutScope,
    pub actor_id: ActorId,
    pub layout_id: LayoutId,
    pub name: Option<String>,
    pub identifier: Option<String>,
    /// `Some(None)` clears the description.
    pub description: Option<Option<String>>,
    pub content: Option<String>,
    pub content_type: Option<LayoutContentType>,
    /// Re-derived from new `content` when absent.
    pub variables: Option<Vec<LayoutVariable>>,
    /// Also make this layout the environment default.
    ///
    /// The field patch commits before the default moves. If the default step
    /// fails (for example `DefaultContention`) the error is returned while the
    /// patch stays applied; retrying the same command is safe.
    pub make_default: bool,
}

impl UpdateLayoutCommand {
    pub fn new(scope: LayoutScope, actor_id: ActorId, layout_id: LayoutId) -> Self {
        Self {
            scope,
            actor_id,
            layout_id,
            name: None,
            identifier: None,
            description: None,
            content: None,
            content_type: None,
            variables: None,
            make_default: false,
        }
    }
}

/// Listing criteria for `filter`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterLayoutsQuery {
    pub name_contains: Option<String>,
    pub order: LayoutOrder,
    /// Defaults to the configured page size; clamped to the configured max.
    pub limit: Option<u32>,
    pub offset: u32,
}

/// One page of layouts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterLayoutsResult {
    pub items: Vec<Layout>,
    pub total_count: u64,
    pub applied_limit: u32,
    pub offset: u32,
}

/// Layout use-case facade.
pub struct LayoutService<'a, S: LayoutStore, L: ChangeLog> {
    store: S,
    changes: L,
    usage: UsageIndex<'a>,
    validator: Box<dyn ContentValidator + 'a>,
    settings: ServiceSettings,
}

impl<'a, S: LayoutStore, L: ChangeLog> LayoutService<'a, S, L> {
    /// Creates a service with no usage probes and the handlebars validator.
    pub fn new(store: S, changes: L) -> Self {
        Self {
            store,
            changes,
            usage: UsageIndex::new(),
            validator: Box::new(HandlebarsContentValidator),
            settings: ServiceSettings::default(),
        }
    }

    pub fn with_usage_index(mut self, usage: UsageIndex<'a>) -> Self {
        self.usage = usage;
        self
    }

    pub fn with_validator(mut self, validator: Box<dyn ContentValidator + 'a>) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_settings(mut self, settings: ServiceSettings) -> Self {
        self.settings = settings;
        self
    }

    fn coordinator(&self) -> DefaultLayoutCoordinator<'_, S> {
        DefaultLayoutCoordinator::new(&self.store, self.settings.max_default_swap_attempts)
    }

    /// Creates a layout. The first layout of an environment becomes default.
    pub fn create(&self, command: CreateLayoutCommand) -> LayoutResult<Layout> {
        self.validator
            .validate(&command.content, command.content_type)?;

        let name = command.name.trim().to_string();
        let (identifier, identifier_mode) = match command.identifier.as_deref().map(str::trim) {
            Some(value) if !value.is_empty() => (value.to_string(), IdentifierMode::Exact),
            _ => (slugify(&name), IdentifierMode::DeriveUnique),
        };
        let variables = command
            .variables
            .unwrap_or_else(|| derive_layout_variables(&command.content));

        let mut layout = Layout::new(command.scope, command.actor_id, name, command.content);
        layout.identifier = identifier;
        layout.description = command.description;
        layout.content_type = command.content_type;
        layout.variables = variables;

        let stored = self
            .store
            .insert(&layout, DefaultPromotion::IfVacant, identifier_mode)?;
        info!(
            "event=layout_create module=service status=ok layout_id={} environment_id={} is_default={}",
            stored.id, stored.scope.environment_id, stored.is_default
        );
        self.record_change(&stored, command.actor_id, ChangeKind::Created);
        Ok(stored)
    }

    /// Updates an active layout, optionally promoting it to default.
    ///
    /// Fields equal to the stored values are ignored, so renaming a layout to
    /// its current name writes nothing. With `make_default` the patch and the
    /// default move are separate commits; see `UpdateLayoutCommand::make_default`.
    pub fn update(&self, command: UpdateLayoutCommand) -> LayoutResult<Layout> {
        let current = self.get(&command.scope, command.layout_id)?;
        let patch = self.build_patch(&current, &command)?;

        let mut updated = current;
        if !patch.is_empty() {
            updated = self
                .store
                .update(command.layout_id, &command.scope, &patch)?;
            info!(
                "event=layout_update module=service status=ok layout_id={}",
                updated.id
            );
            self.record_change(&updated, command.actor_id, ChangeKind::Updated);
        }

        if command.make_default {
            updated = self.set_default(&command.scope, command.actor_id, command.layout_id)?;
        }
        Ok(updated)
    }

    fn build_patch(
        &self,
        current: &Layout,
        command: &UpdateLayoutCommand,
    ) -> LayoutResult<LayoutPatch> {
        let mut patch = LayoutPatch::default();

        if let Some(name) = command.name.as_deref().map(str::trim) {
            if name != current.name {
                patch.name = Some(name.to_string());
            }
        }
        if let Some(identifier) = command.identifier.as_deref().map(str::trim) {
            if identifier != current.identifier {
                patch.identifier = Some(identifier.to_string());
            }
        }
        if let Some(description) = command.description.as_ref() {
            if description != &current.description {
                patch.description = Some(description.clone());
            }
        }

        let content_type = command.content_type.unwrap_or(current.content_type);
        if content_type != current.content_type {
            patch.content_type = Some(content_type);
        }
        if let Some(content) = command.content.as_ref() {
            self.validator.validate(content, content_type)?;
            if content != &current.content {
                patch.content = Some(content.clone());
            }
        }

        let variables = match (command.variables.as_ref(), patch.content.as_ref()) {
            (Some(variables), _) => Some(variables.clone()),
            (None, Some(content)) => Some(derive_layout_variables(content)),
            (None, None) => None,
        };
        if let Some(variables) = variables {
            if variables != current.variables {
                patch.variables = Some(variables);
            }
        }

        Ok(patch)
    }

    /// Soft-deletes a layout that is neither the default nor in use.
    pub fn delete(
        &self,
        scope: &LayoutScope,
        actor_id: ActorId,
        layout_id: LayoutId,
    ) -> LayoutResult<()> {
        let layout = self.get(scope, layout_id)?;
        self.coordinator().on_delete(&layout)?;
        if self.usage.is_used(layout_id, scope)? {
            info!(
                "event=layout_delete module=service status=rejected layout_id={} error_code=layout_in_use",
                layout_id
            );
            return Err(LayoutError::InvalidOperation(
                InvalidOperation::DeleteInUse(layout_id),
            ));
        }

        self.store.soft_delete(layout_id, scope)?;
        info!(
            "event=layout_delete module=service status=ok layout_id={}",
            layout_id
        );
        match self.store.find_deleted(layout_id, scope) {
            Ok(Some(deleted)) => self.record_change(&deleted, actor_id, ChangeKind::Deleted),
            Ok(None) => {}
            Err(err) => warn!(
                "event=change_append module=service status=error layout_id={} kind={} error={}",
                layout_id,
                ChangeKind::Deleted.as_str(),
                err
            ),
        }
        Ok(())
    }

    /// Brings a soft-deleted layout back.
    ///
    /// The restored layout becomes default only if the environment has none.
    pub fn restore(
        &self,
        scope: &LayoutScope,
        actor_id: ActorId,
        layout_id: LayoutId,
    ) -> LayoutResult<Layout> {
        let restored = self.store.restore(layout_id, scope)?;
        info!(
            "event=layout_restore module=service status=ok layout_id={} is_default={}",
            restored.id, restored.is_default
        );
        self.record_change(&restored, actor_id, ChangeKind::Restored);
        Ok(restored)
    }

    /// Lists active layouts matching `query`.
    pub fn filter(
        &self,
        scope: &LayoutScope,
        query: &FilterLayoutsQuery,
    ) -> LayoutResult<FilterLayoutsResult> {
        let applied_limit = normalize_page_limit(
            query.limit,
            self.settings.default_page_limit,
            self.settings.max_page_limit,
        );
        let criteria = LayoutFilter {
            name_contains: query.name_contains.clone(),
            include_deleted: false,
            order: query.order,
        };
        let pagination = Pagination {
            limit: Some(applied_limit),
            offset: query.offset,
        };
        let page = self.store.filter(scope, &criteria, &pagination)?;
        Ok(FilterLayoutsResult {
            items: page.items,
            total_count: page.total_count,
            applied_limit,
            offset: query.offset,
        })
    }

    /// Gets one active layout.
    pub fn get(&self, scope: &LayoutScope, layout_id: LayoutId) -> LayoutResult<Layout> {
        self.store
            .get_by_id(layout_id, scope, false)?
            .ok_or(LayoutError::NotFound(layout_id))
    }

    /// Gets one soft-deleted layout.
    pub fn find_deleted(&self, scope: &LayoutScope, layout_id: LayoutId) -> LayoutResult<Layout> {
        self.store
            .find_deleted(layout_id, scope)?
            .ok_or(LayoutError::NotFound(layout_id))
    }

    /// Makes a layout the environment default. Idempotent.
    pub fn set_default(
        &self,
        scope: &LayoutScope,
        actor_id: ActorId,
        layout_id: LayoutId,
    ) -> LayoutResult<Layout> {
        let change = self.coordinator().set_default(scope, layout_id)?;
        if change.changed {
            if let Some(previous) = change.previous.as_ref() {
                self.record_change(previous, actor_id, ChangeKind::DefaultCleared);
            }
            self.record_change(&change.current, actor_id, ChangeKind::DefaultSet);
        }
        Ok(change.current)
    }

    /// Returns whether any registered entity kind references the layout.
    pub fn check_is_used(&self, scope: &LayoutScope, layout_id: LayoutId) -> LayoutResult<bool> {
        self.get(scope, layout_id)?;
        Ok(self.usage.is_used(layout_id, scope)?)
    }

    /// Returns the environment default, creating the built-in one if absent.
    pub fn create_default(&self, scope: &LayoutScope, actor_id: ActorId) -> LayoutResult<Layout> {
        match self.coordinator().ensure_default_exists(scope, actor_id)? {
            EnsuredDefault::Created(layout) => {
                info!(
                    "event=layout_create_default module=service status=ok layout_id={} environment_id={}",
                    layout.id, layout.scope.environment_id
                );
                self.record_change(&layout, actor_id, ChangeKind::Created);
                Ok(layout)
            }
            EnsuredDefault::Existing(layout) => {
                debug!(
                    "event=layout_create_default module=service status=skipped layout_id={}",
                    layout.id
                );
                Ok(layout)
            }
        }
    }

    /// Lists the change trail of an active or deleted layout, oldest first.
    pub fn changes(
        &self,
        scope: &LayoutScope,
        layout_id: LayoutId,
    ) -> LayoutResult<Vec<ChangeEntry>> {
        if self.store.get_by_id(layout_id, scope, true)?.is_none() {
            return Err(LayoutError::NotFound(layout_id));
        }
        Ok(self.changes.list_for_layout(layout_id, scope)?)
    }

    /// Returns the built-in layout template.
    pub fn builtin_layout(&self) -> BuiltinLayout {
        builtin_layout()
    }

    // Appends synchronously after the store commit. A slow append delays the
    // return but never changes its result.
    fn record_change(&self, layout: &Layout, actor_id: ActorId, kind: ChangeKind) {
        let change = NewChange::snapshot_of(layout, actor_id, kind);
        match self.changes.append(&change) {
            Ok(entry) => debug!(
                "event=change_append module=service status=ok layout_id={} kind={} sequence={}",
                layout.id,
                kind.as_str(),
                entry.sequence
            ),
            Err(err) => warn!(
                "event=change_append module=service status=error layout_id={} kind={} error={}",
                layout.id,
                kind.as_str(),
                err
            ),
        }
    }
}
