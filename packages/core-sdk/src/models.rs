use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/** \brief 默认用户标识。 */
pub const DEFAULT_USER: &str = "tutorial-user";

/** \brief 默认平台 API 基地址。 */
pub const DEFAULT_BASE_URL: &str = "http://localhost:5001";

/**
 * \brief 平台访问凭据，在客户端生命周期内不可变。
 */
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    /** \brief API Key（不透明字符串） */
    pub api_key: String,
    /** \brief API 基地址 */
    pub base_url: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
        }
    }

    /**
     * \brief 拼接接口地址，忽略基地址末尾的 `/`。
     */
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

/**
 * \brief 应用模式。
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppMode {
    Chat,
    Completion,
    Workflow,
}

/**
 * \brief 创建应用的请求体。
 */
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAppRequest {
    pub name: String,
    pub description: String,
    pub mode: AppMode,
    /** \brief 图标（emoji） */
    pub icon: String,
    /** \brief 图标背景色 */
    pub icon_background: String,
}

impl CreateAppRequest {
    /**
     * \brief 教程使用的固定应用配置。
     */
    pub fn tutorial() -> Self {
        Self {
            name: "Simple Tutorial Bot".to_string(),
            description: "A basic chatbot for learning Dify workflows".to_string(),
            mode: AppMode::Chat,
            icon: "🤖".to_string(),
            icon_background: "#3B82F6".to_string(),
        }
    }
}

/**
 * \brief 生成参数，本地不做范围校验。
 */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParameters {
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: f64,
    pub frequency_penalty: f64,
    pub presence_penalty: f64,
}

/**
 * \brief 绑定到应用的模型配置。
 */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub provider: String,
    pub model: String,
    pub parameters: GenerationParameters,
}

impl ModelConfig {
    /**
     * \brief 教程使用的固定模型配置。
     */
    pub fn tutorial() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            parameters: GenerationParameters {
                temperature: 0.7,
                max_tokens: 1000,
                top_p: 1.0,
                frequency_penalty: 0.0,
                presence_penalty: 0.0,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    Streaming,
}

/**
 * \brief 聊天消息请求体。
 */
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessageRequest {
    /** \brief 用户输入 */
    pub query: String,
    /** \brief 用户标识 */
    pub user: String,
    /** \brief 会话 ID，空串表示开启新会话 */
    pub conversation_id: String,
    #[serde(default)]
    pub inputs: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_mode: Option<ResponseMode>,
}

impl ChatMessageRequest {
    /**
     * \brief 构造一条开启新会话的消息。
     */
    pub fn new_conversation(query: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            user: user.into(),
            conversation_id: String::new(),
            inputs: Map::new(),
            response_mode: None,
        }
    }

    pub fn in_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = conversation_id.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tutorial_payloads_serialize_to_wire_shape() {
        let app = serde_json::to_value(CreateAppRequest::tutorial()).expect("serialize app");
        assert_eq!(app["mode"], "chat");
        assert_eq!(app["icon_background"], "#3B82F6");

        let cfg = serde_json::to_value(ModelConfig::tutorial()).expect("serialize config");
        assert_eq!(cfg["provider"], "openai");
        assert_eq!(cfg["parameters"]["max_tokens"], 1000);
        assert_eq!(cfg["parameters"]["temperature"], 0.7);
    }

    #[test]
    fn test_chat_request_starts_new_conversation() {
        let req = ChatMessageRequest::new_conversation("hi", DEFAULT_USER);
        let v = serde_json::to_value(&req).expect("serialize chat");
        assert_eq!(
            v,
            json!({
                "query": "hi",
                "user": "tutorial-user",
                "conversation_id": "",
                "inputs": {}
            })
        );
    }

    #[test]
    fn test_streaming_mode_serializes_lowercase() {
        let mut req = ChatMessageRequest::new_conversation("hi", DEFAULT_USER).in_conversation("c-1");
        req.response_mode = Some(ResponseMode::Streaming);
        let v = serde_json::to_value(&req).expect("serialize chat");
        assert_eq!(v["response_mode"], "streaming");
        assert_eq!(v["conversation_id"], "c-1");
    }

    #[test]
    fn test_endpoint_ignores_trailing_slash() {
        let creds = Credentials::new("k", "http://localhost:5001/");
        assert_eq!(creds.endpoint("/v1/apps"), "http://localhost:5001/v1/apps");
    }
}
