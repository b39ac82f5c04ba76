//! Model instructions per context
//!
//! Each prompt embeds the current working memory so the model sees what has
//! already been collected.

use crate::actions::{self, ActionView};
use crate::catalog;
use crate::context::{ContextMemory, ContextTag};
use crate::llm::ToolDefinition;
use serde_json::json;

use super::MEMORY_TOOL;

fn memory_section(memory: &ContextMemory) -> String {
    let doc = serde_json::to_string_pretty(memory).unwrap_or_default();
    format!("## Current working memory\n```json\n{doc}\n```\n")
}

pub fn front(memory: &ContextMemory) -> String {
    format!(
        r"You are the front desk of a sales management tool.

## Role
Work out which context the user is talking about and record it in working memory.
When the context changes, only tell the user that it changed; the specialist for that context answers next.

## Working memory rules
Call `{MEMORY_TOOL}` with `currentContext` and `userIntent` only.
Everything else belongs to other contexts; never write it.

## Available contexts
- front: general questions (yours)
- plan: sales planning and strategy
- list: fetching and showing sales list data

## Workflows the user may ask for
```json
{catalog}
```

{memory}",
        catalog = catalog::catalog_json(),
        memory = memory_section(memory),
    )
}

pub fn plan(memory: &ContextMemory) -> String {
    let definition = actions::definition(ContextTag::Plan);
    let required = serde_json::to_string_pretty(definition.required_info).unwrap_or_default();
    let action_views: Vec<ActionView> = definition.actions.iter().map(ActionView::from).collect();
    let available = serde_json::to_string_pretty(&action_views).unwrap_or_default();

    format!(
        r"You are in charge of sales planning.

## Role
Help the user put together a concrete sales plan by collecting the information below.

## Working memory rules
Call `{MEMORY_TOOL}` with `currentInfoList` entries of the form {{name, value}}.
Use the names from the required list and record values as concrete as the user gave them.
Plan status is managed by workflows; do not change it.

### Required information
```json
{required}
```

### Actions the user can take once the information is complete
```json
{available}
```

{memory}",
        memory = memory_section(memory),
    )
}

pub fn list(memory: &ContextMemory) -> String {
    format!(
        r"You are a data analysis specialist for sales list data.

## Focus
- Record the kind and quality of the data
- Note the next analysis step and any limitations
- Point out insights and follow-up actions

{memory}",
        memory = memory_section(memory),
    )
}

/// Prompt for the plan workflow's model step
pub fn plan_executor(memory: &ContextMemory) -> String {
    format!(
        r"You execute sales plans.

## Role
Write a concrete sales plan using every entry of `currentInfoList` in the working memory.
If the user gave feedback, revise the plan accordingly.

## Output format
Always finish in this format:
The sales planning workflow has run.

## Plan
[the plan, using the collected information concretely]

Let me know if anything should change.

Do not update working memory; it is updated after you finish.

{memory}",
        memory = memory_section(memory),
    )
}

pub fn front_memory_tool() -> ToolDefinition {
    ToolDefinition {
        name: MEMORY_TOOL.to_string(),
        description: "Record which context the conversation is in and what the user wants".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "currentContext": {
                    "type": "string",
                    "enum": ["front", "plan", "list"],
                    "description": "Context the user is talking about"
                },
                "userIntent": {
                    "type": "string",
                    "description": "Summary of what the user wants"
                }
            },
            "additionalProperties": false
        }),
    }
}

pub fn plan_memory_tool() -> ToolDefinition {
    ToolDefinition {
        name: MEMORY_TOOL.to_string(),
        description: "Record collected planning information; entries replace earlier ones with the same name".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "currentInfoList": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "name": { "type": "string" },
                            "value": { "description": "Collected value" }
                        },
                        "required": ["name", "value"]
                    }
                }
            },
            "required": ["currentInfoList"],
            "additionalProperties": false
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::InfoItem;

    #[test]
    fn test_prompts_embed_memory() {
        let mut memory = ContextMemory::default();
        memory.upsert_info(InfoItem::new("business_target", "Acme"));
        for prompt in [front(&memory), plan(&memory), list(&memory), plan_executor(&memory)] {
            assert!(prompt.contains("\"business_target\""));
        }
    }

    #[test]
    fn test_plan_prompt_lists_required_info() {
        let prompt = plan(&ContextMemory::default());
        for name in ["business_target", "business_goal", "method", "execution"] {
            assert!(prompt.contains(name), "missing {name}");
        }
    }

    #[test]
    fn test_front_prompt_has_catalog() {
        assert!(front(&ContextMemory::default()).contains("project-planning"));
    }
}
