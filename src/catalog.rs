//! Workflow catalog
//!
//! Static descriptions of the workflows the front desk can suggest, with
//! keyword triggers for detecting them in free text.

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Date,
    Select,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataField {
    pub key: &'static str,
    pub label: &'static str,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub required: bool,
    pub options: &'static [&'static str],
    pub description: &'static str,
}

#[derive(Debug, Serialize)]
pub struct Trigger {
    pub keywords: &'static [&'static str],
    pub intent: &'static str,
    pub confidence: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub category: &'static str,
    pub required_data: &'static [DataField],
    pub optional_data: &'static [DataField],
    pub triggers: &'static [Trigger],
    pub immediate_execution: bool,
}

pub static WORKFLOWS: &[WorkflowDefinition] = &[
    WorkflowDefinition {
        id: "test-workflow",
        name: "Test workflow",
        description: "A workflow for testing",
        category: "test",
        required_data: &[],
        optional_data: &[],
        triggers: &[Trigger {
            keywords: &["test", "workflow"],
            intent: "Wants the test workflow",
            confidence: 0.9,
        }],
        immediate_execution: true,
    },
    WorkflowDefinition {
        id: "project-planning",
        name: "Project plan",
        description: "Creates a detailed project plan",
        category: "planning",
        required_data: &[
            DataField {
                key: "projectName",
                label: "Project name",
                field_type: FieldType::String,
                required: true,
                options: &[],
                description: "Name of the project",
            },
            DataField {
                key: "budget",
                label: "Budget",
                field_type: FieldType::Number,
                required: true,
                options: &[],
                description: "Project budget",
            },
            DataField {
                key: "deadline",
                label: "Deadline",
                field_type: FieldType::Date,
                required: true,
                options: &[],
                description: "Completion deadline",
            },
            DataField {
                key: "projectType",
                label: "Project type",
                field_type: FieldType::Select,
                required: true,
                options: &["New development", "Maintenance", "Improvement", "Research"],
                description: "Kind of project",
            },
            DataField {
                key: "features",
                label: "Features",
                field_type: FieldType::Select,
                required: true,
                options: &[
                    "Customer management",
                    "Deal management",
                    "Quote management",
                    "Project management",
                    "Ticket management",
                    "Task management",
                    "Notes",
                    "Files",
                    "Integrations",
                    "Settings",
                ],
                description: "Features of the project",
            },
        ],
        optional_data: &[
            DataField {
                key: "teamSize",
                label: "Team size",
                field_type: FieldType::Number,
                required: false,
                options: &[],
                description: "Number of people on the team",
            },
            DataField {
                key: "priority",
                label: "Priority",
                field_type: FieldType::Select,
                required: false,
                options: &["High", "Medium", "Low"],
                description: "Project priority",
            },
        ],
        triggers: &[
            Trigger {
                keywords: &["project", "plan", "create", "launch"],
                intent: "Wants a project plan",
                confidence: 0.9,
            },
            Trigger {
                keywords: &["proposal", "design", "build"],
                intent: "Wants to design a project",
                confidence: 0.8,
            },
        ],
        immediate_execution: false,
    },
    WorkflowDefinition {
        id: "data-analysis",
        name: "Data analysis",
        description: "Analyzes the given data",
        category: "analysis",
        required_data: &[
            DataField {
                key: "dataSource",
                label: "Data source",
                field_type: FieldType::String,
                required: true,
                options: &[],
                description: "Data to analyze",
            },
            DataField {
                key: "analysisType",
                label: "Analysis type",
                field_type: FieldType::Select,
                required: true,
                options: &["Sales", "Customer", "Trend", "Forecast"],
                description: "Kind of analysis",
            },
            DataField {
                key: "period",
                label: "Period",
                field_type: FieldType::String,
                required: true,
                options: &[],
                description: "Period to analyze",
            },
        ],
        optional_data: &[],
        triggers: &[
            Trigger {
                keywords: &["data", "analysis", "analyze", "survey"],
                intent: "Wants a data analysis",
                confidence: 0.9,
            },
            Trigger {
                keywords: &["sales", "trend", "forecast"],
                intent: "Wants a sales or trend analysis",
                confidence: 0.8,
            },
        ],
        immediate_execution: false,
    },
    WorkflowDefinition {
        id: "report-generation",
        name: "Report generation",
        description: "Generates a report on the given subject",
        category: "reporting",
        required_data: &[
            DataField {
                key: "reportType",
                label: "Report type",
                field_type: FieldType::Select,
                required: true,
                options: &["Monthly", "Quarterly", "Annual", "Special"],
                description: "Kind of report",
            },
            DataField {
                key: "targetPeriod",
                label: "Target period",
                field_type: FieldType::String,
                required: true,
                options: &[],
                description: "Period the report covers",
            },
            DataField {
                key: "department",
                label: "Department",
                field_type: FieldType::String,
                required: true,
                options: &[],
                description: "Department the report covers",
            },
        ],
        optional_data: &[],
        triggers: &[
            Trigger {
                keywords: &["report", "write-up", "summary"],
                intent: "Wants a report",
                confidence: 0.9,
            },
            Trigger {
                keywords: &["monthly", "quarterly", "annual"],
                intent: "Wants a periodic report",
                confidence: 0.8,
            },
        ],
        immediate_execution: false,
    },
];

// ============================================================================
// Detection
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Detection {
    pub workflows: Vec<&'static WorkflowDefinition>,
    pub confidence: f64,
    pub missing_data: Vec<&'static str>,
}

fn tokenize(input: &str) -> Vec<String> {
    input.to_lowercase().split_whitespace().map(str::to_string).collect()
}

fn keyword_hit(tokens: &[String], keyword: &str) -> bool {
    let keyword = keyword.to_lowercase();
    tokens.iter().any(|token| token.contains(&keyword))
}

/// Workflows with at least one trigger keyword among `tokens`
pub fn search_by_keywords(tokens: &[String]) -> Vec<&'static WorkflowDefinition> {
    WORKFLOWS
        .iter()
        .filter(|wf| {
            wf.triggers
                .iter()
                .any(|t| t.keywords.iter().any(|k| keyword_hit(tokens, k)))
        })
        .collect()
}

fn trigger_confidence(workflow: &WorkflowDefinition, tokens: &[String]) -> f64 {
    workflow
        .triggers
        .iter()
        .map(|trigger| {
            let hits = trigger.keywords.iter().filter(|k| keyword_hit(tokens, k)).count();
            #[allow(clippy::cast_precision_loss)]
            let ratio = hits as f64 / trigger.keywords.len().max(1) as f64;
            ratio * trigger.confidence
        })
        .fold(0.0, f64::max)
}

/// Best matching workflow for free text, with the labels it still needs
pub fn detect_workflows(input: &str) -> Detection {
    let tokens = tokenize(input);
    let matched = search_by_keywords(&tokens);
    let Some(first) = matched.first().copied() else {
        return Detection {
            workflows: Vec::new(),
            confidence: 0.0,
            missing_data: Vec::new(),
        };
    };

    let (best, confidence) = matched.iter().fold((first, 0.0), |(best, best_conf), wf| {
        let conf = trigger_confidence(wf, &tokens);
        if conf > best_conf {
            (*wf, conf)
        } else {
            (best, best_conf)
        }
    });

    let lowered = input.to_lowercase();
    let missing_data = best
        .required_data
        .iter()
        .filter(|field| !lowered.contains(&field.key.to_lowercase()))
        .map(|field| field.label)
        .collect();

    Detection {
        workflows: vec![best],
        confidence,
        missing_data,
    }
}

fn extract_field(input: &str, field: &DataField) -> Option<String> {
    [field.key, field.label].iter().find_map(|name| {
        let pattern = format!(r"(?i){}[：:]\s*(\S+)", regex::escape(name));
        match Regex::new(&pattern) {
            Ok(re) => re
                .captures(input)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string()),
            Err(e) => {
                tracing::warn!(field = %field.key, error = %e, "Bad extraction pattern");
                None
            }
        }
    })
}

/// Values written as `key: value` or `label: value` in the input
pub fn extract_workflow_data(input: &str, workflow: &WorkflowDefinition) -> Map<String, Value> {
    workflow
        .required_data
        .iter()
        .chain(workflow.optional_data)
        .filter_map(|field| extract_field(input, field).map(|v| (field.key.to_string(), Value::String(v))))
        .collect()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Readiness {
    pub is_ready: bool,
    pub missing_data: Vec<&'static str>,
    pub ready_data: Map<String, Value>,
}

fn is_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null | Value::Bool(false)) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(n)) => n.as_f64() != Some(0.0),
        Some(_) => true,
    }
}

/// Split accumulated data into what is usable and which labels are missing
pub fn check_readiness(workflow: &WorkflowDefinition, data: &Map<String, Value>) -> Readiness {
    let mut missing_data = Vec::new();
    let mut ready_data = Map::new();

    for field in workflow.required_data {
        if is_present(data.get(field.key)) {
            ready_data.insert(field.key.to_string(), data[field.key].clone());
        } else {
            missing_data.push(field.label);
        }
    }
    for field in workflow.optional_data {
        if is_present(data.get(field.key)) {
            ready_data.insert(field.key.to_string(), data[field.key].clone());
        }
    }

    Readiness {
        is_ready: missing_data.is_empty(),
        missing_data,
        ready_data,
    }
}

/// Markdown suggestion shown to the user
pub fn suggestion_message(
    workflow: &WorkflowDefinition,
    missing_data: &[&str],
    extracted: &Map<String, Value>,
) -> String {
    let mut message = format!("I suggest running {}.\n\n", workflow.name);

    if !extracted.is_empty() {
        message.push_str("**Collected data:**\n");
        for (key, value) in extracted {
            let field = workflow
                .required_data
                .iter()
                .chain(workflow.optional_data)
                .find(|f| f.key == key.as_str());
            if let Some(field) = field {
                let shown = value.as_str().map_or_else(|| value.to_string(), str::to_string);
                message.push_str(&format!("- {}: {shown}\n", field.label));
            }
        }
        message.push('\n');
    }

    if missing_data.is_empty() {
        message.push_str("✅ All required data is available. The workflow can run.");
    } else {
        message.push_str("**Additional data needed:**\n");
        for label in missing_data {
            message.push_str(&format!("- {label}\n"));
        }
        message.push_str("\n📝 Please provide the information above.");
    }

    message
}

/// Catalog as pretty JSON for model instructions
pub fn catalog_json() -> String {
    serde_json::to_string_pretty(WORKFLOWS).unwrap_or_default()
}
