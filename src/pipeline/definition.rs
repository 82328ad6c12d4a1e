// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rankflow contributors

//! Pipeline definition structures
//!
//! A definition is a tree of steps. The root is itself a step, usually of
//! type `pipeline`, whose `steps` are wired together by `depends`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::{Path, PathBuf};

use crate::errors::{RankflowError, RankflowResult};
use crate::flow::FlowValue;

/// Whether a step runs a command or a nested pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepKind {
    #[default]
    Tool,
    Pipeline,
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tool => write!(f, "tool"),
            Self::Pipeline => write!(f, "pipeline"),
        }
    }
}

/// One node of the pipeline tree
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    /// `tool` (default), `pipeline` or `workflow`
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub step_type: Option<String>,

    /// Identifier, unique among siblings
    #[serde(default)]
    pub id: String,

    /// Display name; falls back to the id
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Sibling ids this step waits for; written as `"a,b"` or a sequence
    #[serde(
        default,
        deserialize_with = "deserialize_depends",
        serialize_with = "serialize_depends",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub depends: Vec<String>,

    /// Run once per element of `loop_var`
    #[serde(rename = "loop", default)]
    pub is_loop: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_var: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<Parameter>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub config: Vec<Parameter>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<Parameter>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scripts: Vec<Script>,

    /// Command template (tools only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Children (pipelines only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<StepDefinition>,

    /// Container registry override, inherited by descendants
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<ContainerConfig>,

    /// Container image; the tool runs inside it when set
    #[serde(default, alias = "imageId", skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Do not keep stdout/stderr files for this step
    #[serde(default)]
    pub shadow: bool,
}

impl StepDefinition {
    /// Load a definition from a YAML or JSON file
    pub fn from_file(path: &Path) -> RankflowResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|_| RankflowError::DefinitionNotFound {
            path: path.to_path_buf(),
        })?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&content),
            _ => Self::from_yaml(&content),
        }
    }

    pub fn from_yaml(yaml: &str) -> RankflowResult<Self> {
        let mut step: Self = serde_yaml::from_str(yaml)?;
        step.prepare();
        Ok(step)
    }

    pub fn from_json(json: &str) -> RankflowResult<Self> {
        let mut step: Self = serde_json::from_str(json)?;
        step.prepare();
        Ok(step)
    }

    pub fn to_yaml(&self) -> RankflowResult<String> {
        serde_yaml::to_string(self).map_err(Into::into)
    }

    /// Fill in names that were left empty, recursively
    pub fn prepare(&mut self) {
        if self.name.trim().is_empty() {
            self.name = self.id.clone();
        }
        for child in &mut self.steps {
            child.prepare();
        }
    }

    pub fn kind(&self) -> StepKind {
        match self.step_type.as_deref().map(str::to_ascii_lowercase).as_deref() {
            Some("pipeline") | Some("workflow") => StepKind::Pipeline,
            _ => StepKind::Tool,
        }
    }

    pub fn is_pipeline(&self) -> bool {
        self.kind() == StepKind::Pipeline
    }

    pub fn is_tool(&self) -> bool {
        self.kind() == StepKind::Tool
    }

    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    /// Get a direct child by id
    pub fn step(&self, id: &str) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn step_ids(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.id.as_str()).collect()
    }

    /// Wrap a lone tool into a one-step pipeline so it can be scheduled
    pub fn into_pipeline(self) -> StepDefinition {
        if self.is_pipeline() {
            return self;
        }

        StepDefinition {
            step_type: Some("pipeline".to_string()),
            id: self.id.clone(),
            name: self.name.clone(),
            container: self.container.clone(),
            steps: vec![self],
            ..Default::default()
        }
    }

    pub fn before_scripts(&self) -> Vec<&Script> {
        self.ordered_scripts(|s| s.before)
    }

    pub fn after_scripts(&self) -> Vec<&Script> {
        self.ordered_scripts(|s| s.after)
    }

    pub fn loop_scripts(&self) -> Vec<&Script> {
        self.ordered_scripts(|s| s.inloop)
    }

    /// Scripts matching `phase`, sorted by `order`; unset orders take their position
    fn ordered_scripts(&self, phase: impl Fn(&Script) -> bool) -> Vec<&Script> {
        let mut scripts: Vec<(i64, usize, &Script)> = self
            .scripts
            .iter()
            .enumerate()
            .filter(|(_, s)| phase(s))
            .map(|(idx, s)| {
                let order = if s.order <= 0 { idx as i64 + 1 } else { s.order };
                (order, idx, s)
            })
            .collect();
        scripts.sort_by_key(|(order, idx, _)| (*order, *idx));
        scripts.into_iter().map(|(_, _, s)| s).collect()
    }
}

/// A named input, config or output value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,

    /// Free-form type; `dir` and `directory` mark mountable volumes
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub param_type: Option<String>,

    /// Literal value or template string
    #[serde(default, skip_serializing_if = "FlowValue::is_null")]
    pub value: FlowValue,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: impl Into<FlowValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            ..Default::default()
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(
            self.param_type.as_deref().map(str::to_ascii_lowercase).as_deref(),
            Some("dir") | Some("directory")
        )
    }

    /// Directory parameters with a resolved value can be mounted into a container
    pub fn is_attachable(&self, resolved: &FlowValue) -> bool {
        self.is_directory() && !resolved.is_blank()
    }
}

/// A before/after/in-loop hook attached to a step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Script {
    /// Interpreter hint, e.g. `bash`
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub script_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,

    #[serde(default)]
    pub order: i64,

    #[serde(default)]
    pub before: bool,

    #[serde(default)]
    pub after: bool,

    #[serde(default)]
    pub inloop: bool,
}

impl Script {
    pub fn has_phase(&self) -> bool {
        self.before || self.after || self.inloop
    }

    /// Inline code, or the contents of `file`
    pub fn source(&self) -> RankflowResult<String> {
        if let Some(code) = &self.code {
            return Ok(code.clone());
        }
        match &self.file {
            Some(file) => Ok(std::fs::read_to_string(file)?),
            None => Ok(String::new()),
        }
    }
}

/// Container registry override
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// Registry prefix such as `quay.io/biocontainers`
    #[serde(default, alias = "url", skip_serializing_if = "Option::is_none")]
    pub registry: Option<String>,
}

impl ContainerConfig {
    /// Full image reference for `image` under this registry
    pub fn image_reference(&self, image: &str) -> String {
        match self.registry.as_deref().map(|r| r.trim_end_matches('/')) {
            Some(registry) if !registry.is_empty() => format!("{}/{}", registry, image),
            _ => image.to_string(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DependsField {
    Text(String),
    List(Vec<String>),
}

fn deserialize_depends<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<DependsField>::deserialize(deserializer)?;
    let items = match raw {
        None => Vec::new(),
        Some(DependsField::Text(text)) => text.split(',').map(str::to_string).collect(),
        Some(DependsField::List(items)) => items,
    };

    Ok(items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

fn serialize_depends<S>(depends: &[String], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&depends.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFINITION: &str = r#"
id: variant-calling
type: pipeline
container:
  url: quay.io/biocontainers
steps:
  - id: align
    command: "bwa mem {{ genome }} {{ reads }}"
    image: bwa:0.7.17
    inputs:
      - name: reads
        value: sample.fq
    outputs:
      - name: bam
        type: file
        value: "{{ self_dir }}/out.bam"
  - id: call
    name: Call variants
    depends: "align, "
    command: "bcftools call {{ bam }}"
    scripts:
      - code: echo second
        before: true
        order: 2
      - code: echo first
        before: true
        order: 1
      - code: echo after
        after: true
"#;

    #[test]
    fn test_parse_definition() {
        let def = StepDefinition::from_yaml(DEFINITION).unwrap();

        assert_eq!(def.kind(), StepKind::Pipeline);
        assert_eq!(def.step_ids(), vec!["align", "call"]);

        let align = def.step("align").unwrap();
        assert!(align.is_tool());
        assert_eq!(align.name, "align");
        assert!(align.depends.is_empty());

        let call = def.step("call").unwrap();
        assert_eq!(call.depends, vec!["align"]);
        assert_eq!(call.display_name(), "Call variants");
    }

    #[test]
    fn test_depends_accepts_sequence() {
        let step = StepDefinition::from_yaml("id: c\ndepends: [a, b]\n").unwrap();
        assert_eq!(step.depends, vec!["a", "b"]);
    }

    #[test]
    fn test_workflow_is_a_pipeline() {
        let step = StepDefinition::from_yaml("id: w\ntype: Workflow\n").unwrap();
        assert!(step.is_pipeline());
    }

    #[test]
    fn test_script_ordering() {
        let def = StepDefinition::from_yaml(DEFINITION).unwrap();
        let call = def.step("call").unwrap();

        let before: Vec<_> = call
            .before_scripts()
            .iter()
            .filter_map(|s| s.code.clone())
            .collect();
        assert_eq!(before, vec!["echo first", "echo second"]);
        assert_eq!(call.after_scripts().len(), 1);
        assert!(call.loop_scripts().is_empty());
    }

    #[test]
    fn test_image_reference() {
        let def = StepDefinition::from_yaml(DEFINITION).unwrap();
        let container = def.container.unwrap();
        assert_eq!(
            container.image_reference("bwa:0.7.17"),
            "quay.io/biocontainers/bwa:0.7.17"
        );
        assert_eq!(ContainerConfig::default().image_reference("bwa"), "bwa");
    }

    #[test]
    fn test_attachable_parameters() {
        let mut param = Parameter::new("workdir", "/data");
        param.param_type = Some("Directory".into());
        assert!(param.is_attachable(&FlowValue::from("/data")));
        assert!(!param.is_attachable(&FlowValue::from("")));
        assert!(!Parameter::new("reads", "a.fq").is_attachable(&FlowValue::from("a.fq")));
    }

    #[test]
    fn test_tool_wrapped_into_pipeline() {
        let tool = StepDefinition::from_yaml("id: solo\ncommand: echo hi\n").unwrap();
        let pipeline = tool.into_pipeline();
        assert!(pipeline.is_pipeline());
        assert_eq!(pipeline.step_ids(), vec!["solo"]);
    }
}
