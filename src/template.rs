//! Prompt template rendering seam.
//!
//! The full templating language is an external collaborator; the kernel only
//! needs to validate a template at function-construction time and render it
//! against an argument bag before calling a completion service. The default
//! engine handles `{{$name}}` variable blocks.

use crate::args::KernelArguments;
use crate::error::{KernelError, KernelResult};

/// Renders a prompt template against an argument bag.
pub trait PromptTemplateEngine: Send + Sync {
    /// Check a template for syntax errors without rendering it.
    fn validate(&self, template: &str) -> KernelResult<()>;

    /// Render the template, substituting variable blocks with argument values.
    fn render(&self, template: &str, arguments: &KernelArguments) -> KernelResult<String>;

    /// The variable names referenced by the template, in order of first use.
    fn variables(&self, template: &str) -> KernelResult<Vec<String>>;
}

/// The built-in engine: plain text plus `{{$name}}` variable blocks.
///
/// An empty template, an unterminated `{{`, or a block that is not a `$`
/// prefixed identifier is a syntax error. Variables with no matching argument
/// render as the empty string.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicTemplateEngine;

enum Segment<'t> {
    Text(&'t str),
    Variable(&'t str),
}

impl BasicTemplateEngine {
    fn parse<'t>(&self, template: &'t str) -> KernelResult<Vec<Segment<'t>>> {
        if template.trim().is_empty() {
            return Err(KernelError::TemplateSyntax(
                "the prompt template is empty".into(),
            ));
        }
        let mut segments = Vec::new();
        let mut rest = template;
        while let Some(open) = rest.find("{{") {
            let (text, tail) = rest.split_at(open);
            if !text.is_empty() {
                segments.push(Segment::Text(text));
            }
            let tail = &tail[2..];
            let close = tail.find("}}").ok_or_else(|| {
                KernelError::TemplateSyntax("unterminated '{{' block".into())
            })?;
            let inner = tail[..close].trim();
            let name = inner.strip_prefix('$').ok_or_else(|| {
                KernelError::TemplateSyntax(format!(
                    "expected a '$' prefixed variable, found '{inner}'"
                ))
            })?;
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(KernelError::TemplateSyntax(format!(
                    "invalid variable name '{name}'"
                )));
            }
            segments.push(Segment::Variable(name));
            rest = &tail[close + 2..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Text(rest));
        }
        Ok(segments)
    }
}

impl PromptTemplateEngine for BasicTemplateEngine {
    fn validate(&self, template: &str) -> KernelResult<()> {
        self.parse(template).map(|_| ())
    }

    fn render(&self, template: &str, arguments: &KernelArguments) -> KernelResult<String> {
        let mut out = String::with_capacity(template.len());
        for segment in self.parse(template)? {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Variable(name) => {
                    out.push_str(&arguments.get_as_string(name).unwrap_or_default())
                }
            }
        }
        Ok(out)
    }

    fn variables(&self, template: &str) -> KernelResult<Vec<String>> {
        let mut names: Vec<String> = Vec::new();
        for segment in self.parse(template)? {
            if let Segment::Variable(name) = segment {
                if !names.iter().any(|n| n == name) {
                    names.push(name.to_string());
                }
            }
        }
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_variables() {
        let engine = BasicTemplateEngine;
        let args = KernelArguments::new()
            .with("name", "Ada")
            .with("count", 2);
        let out = engine
            .render("Hello {{$name}}, you have {{ $count }} items.", &args)
            .unwrap();
        assert_eq!(out, "Hello Ada, you have 2 items.");
    }

    #[test]
    fn missing_variable_renders_empty() {
        let engine = BasicTemplateEngine;
        let out = engine
            .render("-{{$absent}}-", &KernelArguments::new())
            .unwrap();
        assert_eq!(out, "--");
    }

    #[test]
    fn empty_template_is_a_syntax_error() {
        let engine = BasicTemplateEngine;
        assert!(matches!(
            engine.validate("   "),
            Err(KernelError::TemplateSyntax(_))
        ));
    }

    #[test]
    fn unterminated_block_is_a_syntax_error() {
        let engine = BasicTemplateEngine;
        assert!(matches!(
            engine.validate("Hello {{$name"),
            Err(KernelError::TemplateSyntax(_))
        ));
    }

    #[test]
    fn non_variable_block_is_a_syntax_error() {
        let engine = BasicTemplateEngine;
        assert!(matches!(
            engine.validate("{{name}}"),
            Err(KernelError::TemplateSyntax(_))
        ));
    }

    #[test]
    fn variables_are_collected_in_order_without_duplicates() {
        let engine = BasicTemplateEngine;
        let vars = engine
            .variables("{{$b}} {{$a}} {{$b}}")
            .unwrap();
        assert_eq!(vars, vec!["b".to_string(), "a".to_string()]);
    }
}
