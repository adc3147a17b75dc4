//! Static tool catalog
//!
//! Every tool is exposed both as an invocable operation and as a
//! discoverable prompt template. Schemas are the contract: all tools take
//! an optional `provider` (constrained to the five first-class kinds) and
//! an optional `model`.

use serde::Serialize;
use serde_json::{json, Value};

/// One catalog entry.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    /// System prompt installed when the tool dispatches to a provider
    #[serde(skip)]
    pub system_prompt: Option<&'static str>,
    pub input_schema: Value,
}

/// Tools whose primary input is a free-form prompt.
const PROMPT_TOOLS: &[(&str, &str, Option<&str>)] = &[
    (
        "deep-reasoning",
        "Deep multi-step reasoning about a complex problem",
        Some("Reason carefully and step by step. Surface hidden assumptions and check your conclusions before answering."),
    ),
    (
        "investigate",
        "Investigate a topic, following evidence where it leads",
        Some("Investigate the question thoroughly. Distinguish established facts from hypotheses and say which is which."),
    ),
    (
        "research",
        "Research a topic with search grounding when available",
        Some("Research the topic and cite the sources you relied on."),
    ),
    (
        "analyze-code",
        "Analyze code structure, architecture, and behavior",
        Some("Analyze the given code. Describe its structure, data flow, and notable design decisions."),
    ),
    (
        "review-code",
        "Review code for defects, style, and maintainability",
        Some("Review the given code as a careful senior engineer. Report concrete defects first, style second."),
    ),
    (
        "debug-issue",
        "Debug an issue from symptoms to root cause",
        Some("Debug the reported issue. Work from the symptom to a root cause and propose a minimal fix."),
    ),
    (
        "plan-feature",
        "Plan the implementation of a feature",
        Some("Produce an implementation plan: scope, steps, risks, and testing strategy."),
    ),
    (
        "generate-docs",
        "Generate documentation for the given code or API",
        Some("Write clear documentation for the given input. Prefer examples over prose."),
    ),
    (
        "consensus",
        "Gather multiple perspectives and synthesize a consensus",
        Some("Consider the strongest versions of opposing positions before synthesizing a conclusion."),
    ),
    (
        "planner",
        "Break a goal into an ordered, dependency-aware plan",
        Some("Break the goal into ordered steps with explicit dependencies."),
    ),
    (
        "precommit",
        "Pre-commit review of pending changes",
        Some("Review the pending changes as a pre-commit gate. Flag anything that should block the commit."),
    ),
    (
        "secaudit",
        "Security audit of code or configuration",
        Some("Audit the input for security issues. Rank findings by exploitability and blast radius."),
    ),
    (
        "tracer",
        "Trace execution or data flow through code",
        Some("Trace the requested flow step by step, naming each function and the data it passes on."),
    ),
];

/// Prefix installed by the `challenge` tool. Forwarded to the provider
/// unchanged as part of the prompt.
pub const CHALLENGE_PREFIX: &str = "CRITICAL REASSESSMENT: Do not simply agree. \
Independently verify the claim below, argue the strongest case against it, \
and only then state your own conclusion.\n\n";

fn prompt_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "prompt": {
                "type": "string",
                "description": "The task or question to work on"
            },
            "provider": {
                "type": "string",
                "enum": ["openai", "gemini", "azure", "grok", "bailian"],
                "description": "Provider to route to; the configured priority order applies when omitted"
            },
            "model": {
                "type": "string",
                "description": "Model identifier; the provider default applies when omitted"
            },
            "temperature": { "type": "number" },
            "max_output_tokens": { "type": "integer" },
            "reasoning_effort": {
                "type": "string",
                "enum": ["low", "medium", "high"]
            },
            "use_search_grounding": { "type": "boolean" },
            "session_id": {
                "type": "string",
                "description": "Conversation session to append this exchange to"
            }
        },
        "required": ["prompt"]
    })
}

/// The complete tool catalog.
pub fn all_tools() -> Vec<ToolDefinition> {
    let mut tools: Vec<ToolDefinition> = PROMPT_TOOLS
        .iter()
        .map(|&(name, description, system_prompt)| ToolDefinition {
            name,
            description,
            system_prompt,
            input_schema: prompt_schema(),
        })
        .collect();

    tools.push(ToolDefinition {
        name: "challenge",
        description: "Challenge a claim: the model must argue against it before concluding",
        system_prompt: None,
        input_schema: prompt_schema(),
    });

    tools.push(ToolDefinition {
        name: "list-ai-models",
        description: "List configured providers and the models they expose",
        system_prompt: None,
        input_schema: json!({ "type": "object", "properties": {} }),
    });

    tools
}

pub fn find_tool(name: &str) -> Option<ToolDefinition> {
    all_tools().into_iter().find(|t| t.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_contains_required_tools() {
        let names: Vec<&str> = all_tools().iter().map(|t| t.name).collect();
        for required in [
            "deep-reasoning",
            "investigate",
            "research",
            "list-ai-models",
            "analyze-code",
            "review-code",
            "debug-issue",
            "plan-feature",
            "generate-docs",
            "challenge",
            "consensus",
            "planner",
            "precommit",
            "secaudit",
            "tracer",
        ] {
            assert!(names.contains(&required), "missing tool: {required}");
        }
    }

    #[test]
    fn provider_enum_is_constrained() {
        let tool = find_tool("deep-reasoning").unwrap();
        let providers = tool.input_schema["properties"]["provider"]["enum"]
            .as_array()
            .unwrap();
        assert_eq!(providers.len(), 5);
        assert!(providers.contains(&serde_json::json!("bailian")));
    }

    #[test]
    fn find_tool_unknown_is_none() {
        assert!(find_tool("make-coffee").is_none());
    }
}
