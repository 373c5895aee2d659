//! Layout template content rules.
//!
//! # Responsibility
//! - Validate template content before it reaches the store.
//! - Derive template variables from `{{ placeholder }}` usage.
//! - Provide the built-in layout used to bootstrap environment defaults.
//!
//! # Invariants
//! - Every layout wraps notification content through the `{{{body}}}` slot.
//! - `body` is reserved and never reported as a layout variable.

use crate::model::layout::{LayoutContentType, LayoutVariable};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Placeholder the notification body is rendered into.
pub const BODY_PLACEHOLDER: &str = "{{{body}}}";
/// Name given to the built-in default layout.
pub const BUILTIN_LAYOUT_NAME: &str = "Default Layout";
/// Identifier given to the built-in default layout.
pub const BUILTIN_LAYOUT_IDENTIFIER: &str = "default-layout";

const RESERVED_VARIABLE: &str = "body";
const MAX_CONTENT_BYTES: usize = 512 * 1024;

const BUILTIN_LAYOUT_CONTENT: &str = r#"<!DOCTYPE html>
<html>
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
  </head>
  <body style="margin:0;padding:0;background-color:#f3f3f3;font-family:Helvetica,Arial,sans-serif;">
    <table role="presentation" width="100%" cellspacing="0" cellpadding="0" border="0">
      <tr>
        <td align="center" style="padding:24px 12px;">
          <table role="presentation" width="600" cellspacing="0" cellpadding="0" border="0" style="background-color:#ffffff;border-radius:8px;">
            {{#if branding.logo}}
            <tr>
              <td align="center" style="padding:24px 24px 0;">
                <img src="{{branding.logo}}" alt="logo" style="max-height:48px;" />
              </td>
            </tr>
            {{/if}}
            <tr>
              <td style="padding:24px;color:#333333;font-size:15px;line-height:1.5;">
                {{{body}}}
              </td>
            </tr>
          </table>
        </td>
      </tr>
    </table>
  </body>
</html>
"#;

static PLACEHOLDER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\{\{\{?\s*(?:[#/^]\s*[A-Za-z]+\s+)?([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*)\s*\}?\}\}",
    )
    .expect("valid placeholder regex")
});
static BLOCK_KEYWORD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:if|unless|each|with|else|this)$").expect("valid keyword regex")
});

/// Template content rejected by a validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentValidationError {
    EmptyContent,
    MissingBodyPlaceholder,
    ContentTooLarge { max_bytes: usize },
    UnbalancedBraces,
}

impl Display for ContentValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyContent => write!(f, "layout content must not be empty"),
            Self::MissingBodyPlaceholder => {
                write!(f, "layout content must contain the {BODY_PLACEHOLDER} placeholder")
            }
            Self::ContentTooLarge { max_bytes } => {
                write!(f, "layout content must be at most {max_bytes} bytes")
            }
            Self::UnbalancedBraces => write!(f, "layout content has unbalanced braces"),
        }
    }
}

impl Error for ContentValidationError {}

/// Schema check applied to layout content on create/update.
pub trait ContentValidator {
    fn validate(
        &self,
        content: &str,
        content_type: LayoutContentType,
    ) -> Result<(), ContentValidationError>;
}

/// Default validator for handlebars-style HTML layouts.
#[derive(Debug, Clone, Copy, Default)]
pub struct HandlebarsContentValidator;

impl ContentValidator for HandlebarsContentValidator {
    fn validate(
        &self,
        content: &str,
        _content_type: LayoutContentType,
    ) -> Result<(), ContentValidationError> {
        if content.trim().is_empty() {
            return Err(ContentValidationError::EmptyContent);
        }
        if content.len() > MAX_CONTENT_BYTES {
            return Err(ContentValidationError::ContentTooLarge {
                max_bytes: MAX_CONTENT_BYTES,
            });
        }
        if content.matches("{{").count() != content.matches("}}").count() {
            return Err(ContentValidationError::UnbalancedBraces);
        }
        if !content.contains(BODY_PLACEHOLDER) {
            return Err(ContentValidationError::MissingBodyPlaceholder);
        }
        Ok(())
    }
}

/// Built-in layout definition used for environment bootstrap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltinLayout {
    pub name: &'static str,
    pub identifier: &'static str,
    pub content: &'static str,
    pub content_type: LayoutContentType,
    pub variables: Vec<LayoutVariable>,
}

/// Returns the built-in layout template.
pub fn builtin_layout() -> BuiltinLayout {
    BuiltinLayout {
        name: BUILTIN_LAYOUT_NAME,
        identifier: BUILTIN_LAYOUT_IDENTIFIER,
        content: BUILTIN_LAYOUT_CONTENT,
        content_type: LayoutContentType::CustomHtml,
        variables: derive_layout_variables(BUILTIN_LAYOUT_CONTENT),
    }
}

/// Derives optional string variables from placeholders, in first-use order.
///
/// Block helpers (`#if`, `/each`, ...) contribute their argument, and the
/// reserved `body` slot is skipped.
pub fn derive_layout_variables(content: &str) -> Vec<LayoutVariable> {
    let mut seen = BTreeSet::new();
    let mut variables = Vec::new();
    for caps in PLACEHOLDER_RE.captures_iter(content) {
        let Some(name) = caps.get(1).map(|m| m.as_str()) else {
            continue;
        };
        if name == RESERVED_VARIABLE
            || BLOCK_KEYWORD_RE.is_match(name)
            || name.starts_with("this.")
        {
            continue;
        }
        if seen.insert(name.to_string()) {
            variables.push(LayoutVariable::string(name));
        }
    }
    variables
}
