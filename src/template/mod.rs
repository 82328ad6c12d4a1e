// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rankflow contributors

//! Template rendering for parameter values and commands
//!
//! Placeholders have the form `{{ name }}` where `name` is a config key or a
//! dotted path into nested maps and sequences (`{{ sample.reads.0 }}`).
//! Unknown names render as an empty string.

use regex::{Captures, Regex};
use std::sync::OnceLock;

use crate::errors::{RankflowError, RankflowResult};
use crate::flow::{FlowConfig, FlowValue};

const PLACEHOLDER: &str = r"\{\{\s*([A-Za-z_][A-Za-z0-9_.\-]*)\s*\}\}";

/// Renders template strings against a config
pub trait TemplateRenderer: Send + Sync {
    /// Render a template string
    fn render(&self, template: &str, config: &FlowConfig) -> RankflowResult<String>;

    /// Render a parameter value; non-string values are returned unchanged
    fn render_value(&self, value: &FlowValue, config: &FlowConfig) -> RankflowResult<FlowValue> {
        match value {
            FlowValue::String(template) => Ok(FlowValue::String(self.render(template, config)?)),
            other => Ok(other.clone()),
        }
    }
}

/// Default `{{ name }}` renderer
#[derive(Debug, Clone, Copy, Default)]
pub struct MustacheRenderer;

impl MustacheRenderer {
    pub fn new() -> Self {
        Self
    }
}

fn placeholder() -> RankflowResult<&'static Regex> {
    static PATTERN: OnceLock<Result<Regex, String>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(PLACEHOLDER).map_err(|e| e.to_string()))
        .as_ref()
        .map_err(|message| RankflowError::Template {
            template: PLACEHOLDER.to_string(),
            message: message.clone(),
        })
}

impl TemplateRenderer for MustacheRenderer {
    fn render(&self, template: &str, config: &FlowConfig) -> RankflowResult<String> {
        let pattern = placeholder()?;

        if pattern.replace_all(template, "").contains("{{") {
            return Err(RankflowError::Template {
                template: template.to_string(),
                message: "malformed or unclosed placeholder".to_string(),
            });
        }

        let rendered = pattern.replace_all(template, |caps: &Captures| {
            config
                .lookup(&caps[1])
                .map(ToString::to_string)
                .unwrap_or_default()
        });

        Ok(rendered.into_owned())
    }

    /// A value that is exactly one placeholder keeps the type of what it
    /// refers to, so `value: "{{ samples }}"` still yields a sequence.
    fn render_value(&self, value: &FlowValue, config: &FlowConfig) -> RankflowResult<FlowValue> {
        let FlowValue::String(template) = value else {
            return Ok(value.clone());
        };

        let pattern = placeholder()?;
        if let Some(caps) = pattern.captures(template.trim()) {
            if caps.get(0).map(|m| m.as_str().len()) == Some(template.trim().len()) {
                return Ok(config.lookup(&caps[1]).cloned().unwrap_or_else(|| FlowValue::from("")));
            }
        }

        Ok(FlowValue::String(self.render(template, config)?))
    }
}
