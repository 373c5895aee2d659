//! Layout domain model.
//!
//! # Responsibility
//! - Define the canonical layout record and its environment scope.
//! - Provide lifecycle helpers for tombstone semantics.
//! - Validate record-level invariants before persistence.
//!
//! # Invariants
//! - `id` is stable and never reused for another layout.
//! - `deleted_at` is the source of truth for tombstone state.
//! - A deleted layout is never the environment default.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable layout identifier.
pub type LayoutId = Uuid;

/// Identifier of the actor (user or system) performing a mutation.
pub type ActorId = Uuid;

/// Maximum accepted layout name length, in chars.
pub const MAX_LAYOUT_NAME_CHARS: usize = 128;
/// Maximum accepted layout identifier length, in chars.
pub const MAX_LAYOUT_IDENTIFIER_CHARS: usize = 64;

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9][a-z0-9_-]*$").expect("valid identifier regex"));
static VARIABLE_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$")
        .expect("valid variable name regex")
});
static SLUG_SEPARATOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("valid slug separator regex"));

/// Environment/organization pair every layout is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LayoutScope {
    pub environment_id: Uuid,
    pub organization_id: Uuid,
}

impl LayoutScope {
    pub fn new(environment_id: Uuid, organization_id: Uuid) -> Self {
        Self {
            environment_id,
            organization_id,
        }
    }
}

/// Template body flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutContentType {
    /// Hand-written handlebars HTML.
    CustomHtml,
    /// Content produced by the visual block editor.
    Editor,
}

impl LayoutContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CustomHtml => "custom_html",
            Self::Editor => "editor",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "custom_html" => Some(Self::CustomHtml),
            "editor" => Some(Self::Editor),
            _ => None,
        }
    }
}

/// Template variable exposed by a layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutVariable {
    /// Dotted placeholder path, e.g. `branding.logo`.
    pub name: String,
    /// Value type hint (`string`, `boolean`, ...).
    #[serde(rename = "type")]
    pub kind: String,
    pub required: bool,
    pub default_value: Option<String>,
}

impl LayoutVariable {
    /// Creates an optional string variable with no default.
    pub fn string(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: "string".to_string(),
            required: false,
            default_value: None,
        }
    }
}

/// Canonical layout record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layout {
    pub id: LayoutId,
    pub scope: LayoutScope,
    pub creator_id: ActorId,
    pub name: String,
    /// Environment-unique slug, stable across renames.
    pub identifier: String,
    pub description: Option<String>,
    pub content: String,
    pub content_type: LayoutContentType,
    pub variables: Vec<LayoutVariable>,
    pub is_default: bool,
    /// Epoch ms tombstone. `None` means active.
    pub deleted_at: Option<i64>,
    /// Epoch ms, assigned by the store.
    pub created_at: i64,
    /// Epoch ms, assigned by the store.
    pub updated_at: i64,
}

/// Record-level validation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutValidationError {
    EmptyName,
    NameTooLong { max_chars: usize },
    InvalidIdentifier(String),
    InvalidVariableName(String),
    DuplicateVariable(String),
    DeletedDefault(LayoutId),
}

impl Display for LayoutValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyName => write!(f, "layout name must not be blank"),
            Self::NameTooLong { max_chars } => {
                write!(f, "layout name must be at most {max_chars} characters")
            }
            Self::InvalidIdentifier(value) => write!(f, "invalid layout identifier `{value}`"),
            Self::InvalidVariableName(value) => write!(f, "invalid layout variable `{value}`"),
            Self::DuplicateVariable(value) => write!(f, "duplicate layout variable `{value}`"),
            Self::DeletedDefault(id) => write!(f, "deleted layout {id} cannot be default"),
        }
    }
}

impl Error for LayoutValidationError {}

impl Layout {
    /// Creates an active, non-default layout with a generated stable ID.
    ///
    /// Identifier is derived from `name`; timestamps stay zero until the
    /// store assigns them.
    pub fn new(
        scope: LayoutScope,
        creator_id: ActorId,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let name = name.into();
        Self {
            id: Uuid::new_v4(),
            scope,
            creator_id,
            identifier: slugify(&name),
            name,
            description: None,
            content: content.into(),
            content_type: LayoutContentType::CustomHtml,
            variables: Vec::new(),
            is_default: false,
            deleted_at: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    /// Returns whether this layout is visible to default read paths.
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }

    /// Checks record-level invariants.
    pub fn validate(&self) -> Result<(), LayoutValidationError> {
        validate_name(&self.name)?;
        validate_identifier(&self.identifier)?;
        validate_variables(&self.variables)?;
        if self.is_default && !self.is_active() {
            return Err(LayoutValidationError::DeletedDefault(self.id));
        }
        Ok(())
    }
}

/// Validates a layout display name.
pub fn validate_name(name: &str) -> Result<(), LayoutValidationError> {
    if name.trim().is_empty() {
        return Err(LayoutValidationError::EmptyName);
    }
    if name.chars().count() > MAX_LAYOUT_NAME_CHARS {
        return Err(LayoutValidationError::NameTooLong {
            max_chars: MAX_LAYOUT_NAME_CHARS,
        });
    }
    Ok(())
}

/// Validates a layout identifier slug.
pub fn validate_identifier(identifier: &str) -> Result<(), LayoutValidationError> {
    if identifier.chars().count() > MAX_LAYOUT_IDENTIFIER_CHARS
        || !IDENTIFIER_RE.is_match(identifier)
    {
        return Err(LayoutValidationError::InvalidIdentifier(
            identifier.to_string(),
        ));
    }
    Ok(())
}

fn validate_variables(variables: &[LayoutVariable]) -> Result<(), LayoutValidationError> {
    let mut seen = std::collections::BTreeSet::new();
    for variable in variables {
        if !VARIABLE_NAME_RE.is_match(&variable.name) {
            return Err(LayoutValidationError::InvalidVariableName(
                variable.name.clone(),
            ));
        }
        if !seen.insert(variable.name.as_str()) {
            return Err(LayoutValidationError::DuplicateVariable(
                variable.name.clone(),
            ));
        }
    }
    Ok(())
}

/// Derives an identifier slug from a display name.
///
/// Falls back to `layout` when the name has no ASCII alphanumerics.
pub fn slugify(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    let dashed = SLUG_SEPARATOR_RE.replace_all(&lowered, "-");
    let slug: String = dashed
        .trim_matches('-')
        .chars()
        .take(MAX_LAYOUT_IDENTIFIER_CHARS)
        .collect();
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "layout".to_string()
    } else {
        slug.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::{slugify, Layout, LayoutScope, LayoutValidationError, LayoutVariable};
    use uuid::Uuid;

    fn sample() -> Layout {
        Layout::new(
            LayoutScope::new(Uuid::new_v4(), Uuid::new_v4()),
            Uuid::new_v4(),
            "Welcome Email",
            "<p>{{{body}}}</p>",
        )
    }

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("  Welcome -- Email!! "), "welcome-email");
        assert_eq!(slugify("Ünïcode only ☃"), "n-code-only");
        assert_eq!(slugify("☃☃"), "layout");
    }

    #[test]
    fn new_layout_is_active_and_not_default() {
        let layout = sample();
        assert!(layout.is_active());
        assert!(!layout.is_default);
        assert_eq!(layout.identifier, "welcome-email");
        assert!(layout.validate().is_ok());
    }

    #[test]
    fn validate_rejects_blank_name_and_duplicate_variables() {
        let mut layout = sample();
        layout.name = "   ".to_string();
        assert_eq!(layout.validate(), Err(LayoutValidationError::EmptyName));

        let mut layout = sample();
        layout.variables = vec![LayoutVariable::string("a"), LayoutVariable::string("a")];
        assert_eq!(
            layout.validate(),
            Err(LayoutValidationError::DuplicateVariable("a".to_string()))
        );
    }

    #[test]
    fn validate_rejects_deleted_default() {
        let mut layout = sample();
        layout.is_default = true;
        layout.deleted_at = Some(1);
        assert!(matches!(
            layout.validate(),
            Err(LayoutValidationError::DeletedDefault(_))
        ));
    }
}
