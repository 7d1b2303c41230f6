//! Prompt templates and template stores
//!
//! Step prompts live in `prompts/steps/<template_id>.yaml` (key `prompt`)
//! and the shared role definition in `prompts/system/role.yaml` (key
//! `system_prompt`). The runner treats template ids as opaque; template
//! syntax is not validated here beyond placeholder substitution.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::context::RunContext;
use crate::error::{PipelineError, Result};
use crate::provider::StepRequest;

/// A prompt template plus the placeholder names it expects filled.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    pub system: String,
    pub template: String,
    /// Recognized placeholder names; `{date}` and `{context}` are the ones
    /// the pipeline fills. Unrecognized placeholders are left as-is.
    pub placeholders: Vec<String>,
}

impl PromptTemplate {
    /// Render this template against the accumulated run context. When the
    /// template does not reference `{context}`, the context block is
    /// appended after the prompt text.
    pub fn render(&self, ctx: &RunContext) -> Result<StepRequest> {
        let context_yaml = ctx.to_yaml()?;
        let mut user = self.template.clone();
        if self.placeholders.iter().any(|p| p == "date") {
            user = user.replace("{date}", &ctx.date().to_string());
        }
        if self.placeholders.iter().any(|p| p == "context") && user.contains("{context}") {
            user = user.replace("{context}", &context_yaml);
        } else {
            user.push_str("\n\nAnalyze the following data:\n");
            user.push_str(&context_yaml);
        }
        Ok(StepRequest {
            system: self.system.clone(),
            user,
        })
    }
}

/// Store resolving a `template_id` to prompt text.
pub trait TemplateStore: Send + Sync {
    fn get(&self, template_id: &str) -> Result<PromptTemplate>;
}

#[derive(Debug, Deserialize)]
struct StepPromptFile {
    prompt: String,
    #[serde(default)]
    placeholders: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RoleFile {
    #[serde(default)]
    system_prompt: String,
}

/// Reads prompt files from a local `prompts/` directory. The system prompt
/// is loaded once at construction.
#[derive(Debug, Clone)]
pub struct YamlTemplateStore {
    prompts_dir: PathBuf,
    system: String,
}

impl YamlTemplateStore {
    pub fn new(prompts_dir: impl Into<PathBuf>) -> Result<Self> {
        let prompts_dir = prompts_dir.into();
        let role_path = prompts_dir.join("system").join("role.yaml");
        let system = if role_path.exists() {
            let contents = std::fs::read_to_string(&role_path)?;
            let role: RoleFile = serde_yaml::from_str(&contents)?;
            role.system_prompt
        } else {
            String::new()
        };
        Ok(Self {
            prompts_dir,
            system,
        })
    }
}

impl TemplateStore for YamlTemplateStore {
    fn get(&self, template_id: &str) -> Result<PromptTemplate> {
        let path = self
            .prompts_dir
            .join("steps")
            .join(format!("{template_id}.yaml"));
        if !path.exists() {
            return Err(PipelineError::Template(format!(
                "prompt file not found: {}",
                path.display()
            )));
        }
        let contents = std::fs::read_to_string(&path)?;
        let file: StepPromptFile = serde_yaml::from_str(&contents)
            .map_err(|e| PipelineError::Template(format!("{}: {e}", path.display())))?;
        Ok(PromptTemplate {
            system: self.system.clone(),
            template: file.prompt,
            placeholders: file.placeholders,
        })
    }
}

/// Fixed templates held in memory, for tests and offline runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTemplateStore {
    system: String,
    templates: HashMap<String, PromptTemplate>,
}

impl InMemoryTemplateStore {
    pub fn new(system: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            templates: HashMap::new(),
        }
    }

    pub fn with_template(mut self, template_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        let system = self.system.clone();
        self.templates.insert(
            template_id.into(),
            PromptTemplate {
                system,
                template: prompt.into(),
                placeholders: vec!["date".to_string(), "context".to_string()],
            },
        );
        self
    }
}

impl TemplateStore for InMemoryTemplateStore {
    fn get(&self, template_id: &str) -> Result<PromptTemplate> {
        self.templates
            .get(template_id)
            .cloned()
            .ok_or_else(|| PipelineError::Template(format!("unknown template: {template_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ctx() -> RunContext {
        RunContext::new(NaiveDate::from_ymd_opt(2026, 8, 21).unwrap(), vec![])
    }

    #[test]
    fn render_substitutes_date_and_context() {
        let tpl = PromptTemplate {
            system: "You are an analyst.".to_string(),
            template: "Brief for {date}:\n{context}".to_string(),
            placeholders: vec!["date".to_string(), "context".to_string()],
        };
        let req = tpl.render(&ctx()).unwrap();
        assert!(req.user.contains("Brief for 2026-08-21"));
        assert!(req.user.contains("events:"));
        assert!(!req.user.contains("{context}"));
    }

    #[test]
    fn render_appends_context_when_not_referenced() {
        let tpl = PromptTemplate {
            system: String::new(),
            template: "Filter the noise.".to_string(),
            placeholders: vec![],
        };
        let req = tpl.render(&ctx()).unwrap();
        assert!(req.user.starts_with("Filter the noise."));
        assert!(req.user.contains("Analyze the following data:"));
    }

    #[test]
    fn yaml_store_reads_prompt_files() {
        let dir = tempfile::tempdir().unwrap();
        let steps = dir.path().join("steps");
        let system = dir.path().join("system");
        std::fs::create_dir_all(&steps).unwrap();
        std::fs::create_dir_all(&system).unwrap();
        std::fs::write(
            steps.join("01_filter_events.yaml"),
            "prompt: Keep only market-moving events.\nplaceholders: [context]\n",
        )
        .unwrap();
        std::fs::write(system.join("role.yaml"), "system_prompt: You are an analyst.\n").unwrap();

        let store = YamlTemplateStore::new(dir.path()).unwrap();
        let tpl = store.get("01_filter_events").unwrap();
        assert_eq!(tpl.system, "You are an analyst.");
        assert!(tpl.template.contains("market-moving"));
        assert_eq!(tpl.placeholders, vec!["context".to_string()]);
    }

    #[test]
    fn yaml_store_missing_template_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = YamlTemplateStore::new(dir.path()).unwrap();
        assert!(matches!(
            store.get("99_missing"),
            Err(PipelineError::Template(_))
        ));
    }

    #[test]
    fn in_memory_store_round_trip() {
        let store = InMemoryTemplateStore::new("sys").with_template("01_filter_events", "Filter.");
        let tpl = store.get("01_filter_events").unwrap();
        assert_eq!(tpl.system, "sys");
        assert!(store.get("02_macro_regime").is_err());
    }
}
