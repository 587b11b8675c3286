//! Task template rendering.
//!
//! Templates are Tera templates; experiments normally only use `{{ name }}`
//! placeholders filled from the config's variable map. Referencing a
//! variable that is not defined is an error.

use std::collections::BTreeMap;
use std::error::Error as _;

use thiserror::Error;

/// Template used when an experiment has no task template: the whole prompt
/// comes from the `prompt` variable.
pub const PASS_THROUGH_TEMPLATE: &str = "{{prompt}}";

/// A task template that could not be rendered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("task template cannot be rendered: {0}")]
pub struct PromptError(pub String);

impl From<tera::Error> for PromptError {
    fn from(err: tera::Error) -> Self {
        // the top-level tera message only names the template; the cause is in the chain
        let mut message = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        PromptError(message)
    }
}

/// Render `template` with `variables` as the Tera context.
pub fn render_template(
    template: &str,
    variables: Option<&BTreeMap<String, String>>,
) -> Result<String, PromptError> {
    let mut context = tera::Context::new();
    for (name, value) in variables.into_iter().flatten() {
        context.insert(name.as_str(), value);
    }
    Ok(tera::Tera::one_off(template, &context, false)?)
}

/// Resolve the prompt for a run from the experiment's template.
pub fn resolve_prompt(
    task_template: Option<&str>,
    variables: Option<&BTreeMap<String, String>>,
) -> Result<String, PromptError> {
    render_template(task_template.unwrap_or(PASS_THROUGH_TEMPLATE), variables)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_substitutes_known_variables() {
        let v = vars(&[("topic", "borrowing"), ("lang", "Rust")]);
        assert_eq!(
            render_template("Explain {{topic}} in {{ lang }}.", Some(&v)).unwrap(),
            "Explain borrowing in Rust."
        );
    }

    #[test]
    fn test_repeated_placeholder() {
        let v = vars(&[("x", "1")]);
        assert_eq!(render_template("{{x}}+{{x}}", Some(&v)).unwrap(), "1+1");
    }

    #[test]
    fn test_undefined_variable_is_an_error() {
        let v = vars(&[("a", "A")]);
        let err = render_template("{{a}} {{b}}", Some(&v)).unwrap_err();
        assert!(err.to_string().contains('b'), "{err}");
    }

    #[test]
    fn test_malformed_template_is_an_error() {
        let v = vars(&[("a", "A")]);
        assert!(render_template("{{a}} {{b", Some(&v)).is_err());
    }

    #[test]
    fn test_plain_text_without_variables() {
        assert_eq!(render_template("no placeholders", None).unwrap(), "no placeholders");
    }

    #[test]
    fn test_pass_through() {
        let v = vars(&[("prompt", "Say hi")]);
        assert_eq!(resolve_prompt(None, Some(&v)).unwrap(), "Say hi");
    }

    #[test]
    fn test_pass_through_without_prompt_variable_fails() {
        assert!(resolve_prompt(None, None).is_err());
        assert!(resolve_prompt(None, Some(&vars(&[("topic", "x")]))).is_err());
    }

    #[test]
    fn test_values_are_not_rescanned() {
        let v = vars(&[("a", "{{b}}"), ("b", "B")]);
        assert_eq!(render_template("{{a}}", Some(&v)).unwrap(), "{{b}}");
    }

    #[test]
    fn test_values_are_not_escaped() {
        let v = vars(&[("code", "<T: Send>")]);
        assert_eq!(render_template("{{code}}", Some(&v)).unwrap(), "<T: Send>");
    }
}
