//! Renders task templates into model prompts.

use hypogen_agent::Prompt;
use regex::{Captures, Regex};
use std::collections::HashMap;

use crate::config::{PromptTemplate, PromptTemplates};
use crate::dataset::Example;
use crate::error::Result;

/// Fills `${name}` placeholders in the task's templates.
///
/// Unknown placeholders are left untouched so a template typo shows up
/// verbatim in the prompt instead of silently vanishing.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    templates: PromptTemplates,
    placeholder: Regex,
}

impl PromptBuilder {
    /// Create a builder over a template set.
    pub fn new(templates: PromptTemplates) -> Result<Self> {
        Ok(Self {
            templates,
            placeholder: Regex::new(r"\$\{(\w+)\}")?,
        })
    }

    /// The template set.
    pub fn templates(&self) -> &PromptTemplates {
        &self.templates
    }

    /// Render labeled examples, one `observations` block each.
    pub fn observations(&self, examples: &[&Example]) -> String {
        examples
            .iter()
            .map(|example| {
                let vars = example_vars(example, true);
                self.render(&self.templates.observations, &vars)
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Prompt asking for `num_hypotheses` new hypotheses.
    pub fn batched_generation(&self, examples: &[&Example], num_hypotheses: usize) -> Prompt {
        let mut vars = HashMap::new();
        vars.insert("observations", self.observations(examples));
        vars.insert("num_hypotheses", num_hypotheses.to_string());
        self.prompt(&self.templates.batched_generation, &vars)
    }

    /// Prompt predicting one example's label under the given hypotheses.
    pub fn inference(&self, hypotheses: &[&str], example: &Example) -> Prompt {
        let mut vars = example_vars(example, false);
        vars.insert("hypothesis", hypothesis_block(hypotheses));
        let rendered = self.render(&self.templates.example, &vars);
        vars.insert("example", rendered);
        self.prompt(&self.templates.inference, &vars)
    }

    /// Prompt asking whether a hypothesis applies to an example.
    pub fn is_relevant(&self, hypothesis: &str, example: &Example) -> Prompt {
        let mut vars = example_vars(example, false);
        vars.insert("hypothesis", hypothesis.to_string());
        let rendered = self.render(&self.templates.example, &vars);
        vars.insert("example", rendered);
        self.prompt(&self.templates.is_relevant, &vars)
    }

    /// Prompt predicting from selected hypotheses and their supporting examples.
    pub fn adaptive_inference(
        &self,
        selected: &[(&str, Vec<&Example>)],
        example: &Example,
    ) -> Prompt {
        let adaptive_info = selected
            .iter()
            .enumerate()
            .map(|(i, (hypothesis, supporting))| {
                let mut vars = HashMap::new();
                vars.insert("index", (i + 1).to_string());
                vars.insert("hypothesis", hypothesis.to_string());
                vars.insert("observations", self.observations(supporting));
                self.render(&self.templates.adaptive_info, &vars)
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        let mut vars = example_vars(example, false);
        let rendered = self.render(&self.templates.example, &vars);
        vars.insert("example", rendered);
        vars.insert("adaptive_info", adaptive_info);
        self.prompt(&self.templates.adaptive_inference, &vars)
    }

    fn prompt(&self, template: &PromptTemplate, vars: &HashMap<&str, String>) -> Prompt {
        let prompt = Prompt::new(self.render(&template.user, vars));
        match &template.system {
            Some(system) => prompt.with_system(self.render(system, vars)),
            None => prompt,
        }
    }

    fn render(&self, template: &str, vars: &HashMap<&str, String>) -> String {
        self.placeholder
            .replace_all(template, |caps: &Captures| {
                let name = &caps[1];
                vars.get(name)
                    .cloned()
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }
}

fn example_vars(example: &Example, with_label: bool) -> HashMap<&str, String> {
    let mut vars: HashMap<&str, String> = example
        .fields
        .iter()
        .map(|(name, value)| (name.as_str(), value.clone()))
        .collect();

    let fields = example
        .fields
        .iter()
        .map(|(name, value)| format!("{}: {}", name, value))
        .collect::<Vec<_>>()
        .join("\n");
    vars.insert("fields", fields);

    if with_label {
        vars.insert("label", example.label.clone());
    }
    vars
}

fn hypothesis_block(hypotheses: &[&str]) -> String {
    match hypotheses {
        [single] => single.to_string(),
        many => many
            .iter()
            .enumerate()
            .map(|(i, h)| format!("{}. {}", i + 1, h))
            .collect::<Vec<_>>()
            .join("\n"),
    }
}
