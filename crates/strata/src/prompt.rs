//! Prompt templates with `{name}` placeholders.
//!
//! `{{` and `}}` render as literal braces. A template declares its input
//! variables up front; the declared set must equal the set of placeholders the
//! text references, and filling requires exactly that set of values.

use std::collections::{BTreeSet, HashMap};

use thiserror::Error;

/// Errors from building or filling a template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("unclosed placeholder starting at byte {0}")]
    Unclosed(usize),

    #[error("unmatched '}}' at byte {0}")]
    UnmatchedClose(usize),

    #[error("empty placeholder at byte {0}")]
    EmptyPlaceholder(usize),

    #[error("placeholder '{0}' is not declared as an input variable")]
    UndeclaredPlaceholder(String),

    #[error("input variable '{0}' is not used by the template")]
    UnusedVariable(String),

    #[error("missing value for input variable '{0}'")]
    MissingVariable(String),

    #[error("unexpected input variable '{0}'")]
    UnexpectedVariable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Variable(String),
}

/// A parsed prompt template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
    input_variables: Vec<String>,
    segments: Vec<Segment>,
}

impl PromptTemplate {
    /// Build a template with an explicit variable list.
    pub fn new<I, S>(
        template: impl Into<String>,
        variables: I,
    ) -> Result<Self, TemplateError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let template = template.into();
        let segments = parse(&template)?;

        let mut input_variables: Vec<String> = Vec::new();
        for var in variables {
            let var: String = var.into();
            if !input_variables.contains(&var) {
                input_variables.push(var);
            }
        }

        let referenced = referenced(&segments);
        if let Some(name) = referenced.iter().find(|n| !input_variables.contains(*n)) {
            return Err(TemplateError::UndeclaredPlaceholder(name.clone()));
        }
        if let Some(name) = input_variables.iter().find(|v| !referenced.contains(*v)) {
            return Err(TemplateError::UnusedVariable(name.clone()));
        }

        Ok(Self {
            template,
            input_variables,
            segments,
        })
    }

    /// Build a template whose variables are the placeholders it references,
    /// in order of first appearance.
    pub fn from_template(template: impl Into<String>) -> Result<Self, TemplateError> {
        let template = template.into();
        let segments = parse(&template)?;
        let input_variables = referenced(&segments);
        Ok(Self {
            template,
            input_variables,
            segments,
        })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn input_variables(&self) -> &[String] {
        &self.input_variables
    }

    /// Check that `values` supplies exactly the declared variables.
    pub fn validate_inputs(&self, values: &HashMap<String, String>) -> Result<(), TemplateError> {
        if let Some(name) = self
            .input_variables
            .iter()
            .find(|v| !values.contains_key(*v))
        {
            return Err(TemplateError::MissingVariable(name.clone()));
        }

        let unexpected: BTreeSet<&String> = values
            .keys()
            .filter(|k| !self.input_variables.contains(*k))
            .collect();
        if let Some(name) = unexpected.into_iter().next() {
            return Err(TemplateError::UnexpectedVariable(name.clone()));
        }

        Ok(())
    }

    /// Fill the template.
    pub fn format(&self, values: &HashMap<String, String>) -> Result<String, TemplateError> {
        self.validate_inputs(values)?;

        let mut out = String::with_capacity(self.template.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Variable(name) => {
                    let value = values
                        .get(name)
                        .ok_or_else(|| TemplateError::MissingVariable(name.clone()))?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }
}

fn referenced(segments: &[Segment]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for segment in segments {
        if let Segment::Variable(name) = segment
            && !names.contains(name)
        {
            names.push(name.clone());
        }
    }
    names
}

fn parse(template: &str) -> Result<Vec<Segment>, TemplateError> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = template.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        match c {
            '{' if chars.peek().map(|&(_, n)| n) == Some('{') => {
                chars.next();
                literal.push('{');
            }
            '}' if chars.peek().map(|&(_, n)| n) == Some('}') => {
                chars.next();
                literal.push('}');
            }
            '}' => return Err(TemplateError::UnmatchedClose(pos)),
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some((_, '}')) => break,
                        Some((_, '{')) | None => return Err(TemplateError::Unclosed(pos)),
                        Some((_, ch)) => name.push(ch),
                    }
                }
                let name = name.trim();
                if name.is_empty() {
                    return Err(TemplateError::EmptyPlaceholder(pos));
                }
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Variable(name.to_string()));
            }
            _ => literal.push(c),
        }
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMPANY: &str = "What is a good name for a company that makes {product}?";

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_fills_declared_placeholder() {
        let prompt = PromptTemplate::new(COMPANY, ["product"]).unwrap();
        let filled = prompt.format(&vars(&[("product", "cars")])).unwrap();
        assert_eq!(filled, "What is a good name for a company that makes cars?");
    }

    #[test]
    fn test_from_template_infers_variables_in_order() {
        let prompt = PromptTemplate::from_template("{b} then {a} then {b}").unwrap();
        assert_eq!(prompt.input_variables(), ["b", "a"]);
        let filled = prompt.format(&vars(&[("a", "1"), ("b", "2")])).unwrap();
        assert_eq!(filled, "2 then 1 then 2");
    }

    #[test]
    fn test_doubled_braces_are_literal() {
        let prompt = PromptTemplate::from_template("Return {{\"name\": \"{name}\"}}").unwrap();
        assert_eq!(prompt.input_variables(), ["name"]);
        let filled = prompt.format(&vars(&[("name", "x")])).unwrap();
        assert_eq!(filled, "Return {\"name\": \"x\"}");
    }

    #[test]
    fn test_undeclared_placeholder_is_rejected() {
        let err = PromptTemplate::new(COMPANY, Vec::<String>::new()).unwrap_err();
        assert_eq!(err, TemplateError::UndeclaredPlaceholder("product".to_string()));
    }

    #[test]
    fn test_unused_variable_is_rejected() {
        let err = PromptTemplate::new(COMPANY, ["product", "colour"]).unwrap_err();
        assert_eq!(err, TemplateError::UnusedVariable("colour".to_string()));
    }

    #[test]
    fn test_missing_value_is_rejected() {
        let prompt = PromptTemplate::new(COMPANY, ["product"]).unwrap();
        let err = prompt.format(&HashMap::new()).unwrap_err();
        assert_eq!(err, TemplateError::MissingVariable("product".to_string()));
    }

    #[test]
    fn test_extra_value_is_rejected() {
        let prompt = PromptTemplate::new(COMPANY, ["product"]).unwrap();
        let err = prompt
            .format(&vars(&[("product", "cars"), ("colour", "red")]))
            .unwrap_err();
        assert_eq!(err, TemplateError::UnexpectedVariable("colour".to_string()));
    }

    #[test]
    fn test_malformed_templates_are_rejected() {
        assert_eq!(
            PromptTemplate::from_template("open {product").unwrap_err(),
            TemplateError::Unclosed(5)
        );
        assert_eq!(
            PromptTemplate::from_template("close }").unwrap_err(),
            TemplateError::UnmatchedClose(6)
        );
        assert_eq!(
            PromptTemplate::from_template("empty { }").unwrap_err(),
            TemplateError::EmptyPlaceholder(6)
        );
    }

    #[test]
    fn test_duplicate_declarations_collapse() {
        let prompt = PromptTemplate::new(COMPANY, ["product", "product"]).unwrap();
        assert_eq!(prompt.input_variables(), ["product"]);
    }
}
