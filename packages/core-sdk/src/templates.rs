use serde::Serialize;

/**
 * \brief 工作流模板描述，仅作示例数据，不做校验也不执行。
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkflowTemplate {
    pub name: &'static str,
    pub description: &'static str,
    /** \brief 按顺序排列的节点类型 */
    pub nodes: &'static [&'static str],
    pub use_case: &'static str,
}

pub const WORKFLOW_TEMPLATES: &[WorkflowTemplate] = &[
    WorkflowTemplate {
        name: "simple_chat",
        description: "Basic chatbot workflow",
        nodes: &["input", "llm", "output"],
        use_case: "General conversation",
    },
    WorkflowTemplate {
        name: "rag_assistant",
        description: "RAG-powered knowledge assistant",
        nodes: &["input", "retrieval", "llm", "citation", "output"],
        use_case: "Document-based Q&A",
    },
    WorkflowTemplate {
        name: "multi_step_agent",
        description: "Agent with tool calling capabilities",
        nodes: &["input", "planner", "tool_executor", "synthesizer", "output"],
        use_case: "Complex task automation",
    },
];

/**
 * \brief 按名称查找模板。
 */
pub fn find_template(name: &str) -> Option<&'static WorkflowTemplate> {
    WORKFLOW_TEMPLATES.iter().find(|t| t.name == name)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NodeKind {
    Code { code: String },
    Llm { model: String, prompt: String },
}

/**
 * \brief 示例工作流中的单个节点。
 */
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowNode {
    pub id: String,
    #[serde(flatten)]
    pub kind: NodeKind,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Connection {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowDefinition {
    pub nodes: Vec<WorkflowNode>,
    pub connections: Vec<Connection>,
}

const VALIDATOR_CODE: &str = r#"def validate_input(user_input):
    if len(user_input.strip()) < 3:
        return {"valid": False, "message": "Input too short"}
    return {"valid": True, "message": user_input}
"#;

const FORMATTER_CODE: &str = r#"def format_response(response):
    return {
        "formatted_response": f"🤖 {response}",
        "timestamp": datetime.now().isoformat()
    }
"#;

fn node(id: &str, kind: NodeKind, input: &str, output: &str) -> WorkflowNode {
    WorkflowNode {
        id: id.to_string(),
        kind,
        inputs: vec![input.to_string()],
        outputs: vec![output.to_string()],
    }
}

fn connect(from: &str, to: &str) -> Connection {
    Connection {
        from: from.to_string(),
        to: to.to_string(),
    }
}

/**
 * \brief 三节点示例工作流：输入校验 -> LLM 处理 -> 输出格式化。
 */
pub fn sample_workflow_definition() -> WorkflowDefinition {
    WorkflowDefinition {
        nodes: vec![
            node(
                "input_validator",
                NodeKind::Code {
                    code: VALIDATOR_CODE.to_string(),
                },
                "user_input",
                "validation_result",
            ),
            node(
                "llm_processor",
                NodeKind::Llm {
                    model: "gpt-3.5-turbo".to_string(),
                    prompt: "Process this user input: {{validation_result.message}}".to_string(),
                },
                "validation_result",
                "llm_response",
            ),
            node(
                "formatter",
                NodeKind::Code {
                    code: FORMATTER_CODE.to_string(),
                },
                "llm_response",
                "final_output",
            ),
        ],
        connections: vec![
            connect("input_validator", "llm_processor"),
            connect("llm_processor", "formatter"),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_template() {
        let rag = find_template("rag_assistant").expect("rag template");
        assert_eq!(rag.nodes, &["input", "retrieval", "llm", "citation", "output"]);
        assert_eq!(rag.use_case, "Document-based Q&A");
        assert!(find_template("unknown").is_none());
        assert_eq!(WORKFLOW_TEMPLATES.len(), 3);
    }

    #[test]
    fn test_sample_workflow_serializes_node_types() {
        let v = serde_json::to_value(sample_workflow_definition()).expect("serialize workflow");
        let nodes = v["nodes"].as_array().expect("nodes array");
        let kinds: Vec<_> = nodes.iter().map(|n| n["type"].as_str().unwrap_or("")).collect();
        assert_eq!(kinds, ["code", "llm", "code"]);
        assert_eq!(nodes[1]["model"], "gpt-3.5-turbo");
        assert_eq!(v["connections"][1]["to"], "formatter");
    }
}
