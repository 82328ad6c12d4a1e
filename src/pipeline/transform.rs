// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rankflow contributors

//! Pre-dispatch step transforms
//!
//! The engine owns an immutable list of transforms fixed at construction.
//! Each one receives a private copy of a step right before it is classified,
//! together with the config overlay the step will run with.

use std::sync::Arc;

use super::{ContainerConfig, Parameter, StepDefinition};
use crate::errors::RankflowResult;
use crate::flow::{FlowConfig, FlowValue};

/// A function rewriting a step before it runs
pub type Transform = Arc<dyn Fn(&mut StepDefinition, &FlowConfig) -> RankflowResult<()> + Send + Sync>;

/// Apply `transforms` in order to `step`
pub fn apply_all(transforms: &[Transform], step: &mut StepDefinition, config: &FlowConfig) -> RankflowResult<()> {
    for transform in transforms {
        transform(step, config)?;
    }
    Ok(())
}

/// Point every container image of the step, and of its children, at `registry`
pub fn override_registry(registry: impl Into<String>) -> Transform {
    let registry = registry.into();
    Arc::new(move |step: &mut StepDefinition, _config: &FlowConfig| {
        rewrite_registry(step, &registry);
        Ok(())
    })
}

fn rewrite_registry(step: &mut StepDefinition, registry: &str) {
    if step.image.is_some() || step.container.is_some() {
        step.container = Some(ContainerConfig {
            registry: Some(registry.to_string()),
        });
    }
    for child in &mut step.steps {
        rewrite_registry(child, registry);
    }
}

/// Add `key` as a config parameter of every step that does not declare it
pub fn default_param(key: impl Into<String>, value: impl Into<FlowValue>) -> Transform {
    let key = key.into();
    let value = value.into();
    Arc::new(move |step: &mut StepDefinition, _config: &FlowConfig| {
        if !step.config.iter().any(|p| p.name == key) {
            step.config.push(Parameter::new(key.clone(), value.clone()));
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_registry_reaches_children() {
        let mut step = StepDefinition::from_yaml(
            r#"
id: p
type: pipeline
steps:
  - id: a
    command: run
    image: tool:1
  - id: b
    command: run
"#,
        )
        .unwrap();

        let transforms = vec![override_registry("registry.local:5000")];
        apply_all(&transforms, &mut step, &FlowConfig::new()).unwrap();

        let a = step.step("a").unwrap();
        assert_eq!(
            a.container.as_ref().unwrap().image_reference("tool:1"),
            "registry.local:5000/tool:1"
        );
        assert!(step.step("b").unwrap().container.is_none());
    }

    #[test]
    fn test_default_param_keeps_declared_value() {
        let mut step = StepDefinition::from_yaml(
            "id: a\ncommand: run\nconfig:\n  - name: threads\n    value: 8\n",
        )
        .unwrap();

        let transforms = vec![default_param("threads", 1i64), default_param("mem", "4G")];
        apply_all(&transforms, &mut step, &FlowConfig::new()).unwrap();

        let names: Vec<_> = step.config.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["threads", "mem"]);
        assert_eq!(step.config[0].value.as_i64(), Some(8));
    }
}
