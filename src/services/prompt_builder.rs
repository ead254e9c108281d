use crate::schemas::{AggregatedContext, Message};

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// Assembles the `[system, user]` message pair sent to the model peer. Context, when
/// present, is folded into the system message rather than the user's prompt so the
/// user's own words reach the model unmodified.
pub struct PromptBuilder;

impl PromptBuilder {
    pub fn build(
        prompt: &str,
        context: Option<&AggregatedContext>,
        system_prompt: Option<&str>,
    ) -> Vec<Message> {
        let base_system = system_prompt.unwrap_or(DEFAULT_SYSTEM_PROMPT);

        let system_content = match context {
            None => base_system.to_string(),
            Some(ctx) if ctx.documents.is_empty() => {
                format!("{base_system}\n\nNo relevant context was found.")
            }
            Some(ctx) => {
                let mut blocks = Vec::with_capacity(ctx.documents.len());
                for (i, doc) in ctx.documents.iter().enumerate() {
                    let path = doc
                        .metadata
                        .get("source")
                        .and_then(|v| v.as_str())
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("document_{i}"));
                    blocks.push(format!("Source: {path}\n{}", doc.content));
                }
                format!(
                    "{base_system}\n\nCONTEXT FROM DATA SOURCES:\n\n{}",
                    blocks.join("\n\n")
                )
            }
        };

        vec![
            Message {
                role: "system".to_string(),
                content: system_content,
            },
            Message {
                role: "user".to_string(),
                content: prompt.to_string(),
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemas::Document;

    #[test]
    fn no_context_renders_plain_system_prompt() {
        let messages = PromptBuilder::build("hello", None, None);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert!(!messages[0].content.contains("CONTEXT"));
        assert_eq!(messages[1].content, "hello");
    }

    #[test]
    fn with_context_includes_source_blocks() {
        let context = AggregatedContext {
            documents: vec![Document {
                content: "the answer is 42".to_string(),
                score: 0.9,
                metadata: serde_json::json!({"source": "docs/faq.md"})
                    .as_object()
                    .unwrap()
                    .clone(),
            }],
            results: vec![],
            total_time_ms: 10,
        };

        let messages = PromptBuilder::build("what is the answer", Some(&context), None);
        assert!(messages[0].content.contains("CONTEXT FROM DATA SOURCES"));
        assert!(messages[0].content.contains("docs/faq.md"));
        assert!(messages[0].content.contains("the answer is 42"));
    }

    #[test]
    fn empty_context_reports_no_relevant_context() {
        let context = AggregatedContext::empty();
        let messages = PromptBuilder::build("anything", Some(&context), None);
        assert!(messages[0].content.contains("No relevant context was found."));
    }

    #[test]
    fn custom_system_prompt_is_used_verbatim() {
        let messages = PromptBuilder::build("hi", None, Some("Answer tersely."));
        assert!(messages[0].content.contains("Answer tersely."));
    }
}
