use std::{
    convert::Infallible,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use anyhow::Result;
use axum::{
    extract::{Path, State},
    http::{
        header::{HeaderName, AUTHORIZATION, CONTENT_TYPE},
        HeaderMap, StatusCode,
    },
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    routing::{post, put},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::task::JoinHandle;

use crate::telemetry;

/**
 * \brief 模拟平台对聊天请求的回复方式。
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockReply {
    /** \brief 回显用户输入 */
    Echo,
    /** \brief 固定回复 */
    Fixed(String),
    /** \brief 响应中不包含 answer 字段 */
    Missing,
}

/**
 * \brief 模拟平台配置：各接口返回的状态码与应用 ID。
 */
#[derive(Debug, Clone)]
pub struct MockConfig {
    pub app_id: String,
    pub create_status: u16,
    pub configure_status: u16,
    pub chat_status: u16,
    pub reply: MockReply,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            app_id: "mock-app".to_string(),
            create_status: 201,
            configure_status: 200,
            chat_status: 200,
            reply: MockReply::Echo,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    CreateApp,
    ConfigureModel,
    ChatMessage,
}

/**
 * \brief 模拟平台收到的一次请求。
 */
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub kind: CallKind,
    /** \brief 路径中的应用 ID（创建应用时为空） */
    pub app_id: Option<String>,
    /** \brief 请求体 */
    pub body: Value,
    /** \brief Authorization 请求头 */
    pub authorization: Option<String>,
    /** \brief Content-Type 请求头 */
    pub content_type: Option<String>,
}

struct MockState {
    config: MockConfig,
    calls: Mutex<Vec<RecordedCall>>,
    conversations: AtomicUsize,
}

impl MockState {
    fn record(&self, call: RecordedCall) {
        if let Ok(mut guard) = self.calls.lock() {
            guard.push(call);
        }
    }

    fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|g| g.clone()).unwrap_or_default()
    }
}

/**
 * \brief 后台运行的模拟平台句柄，析构时停止服务。
 */
pub struct MockHandle {
    base_url: String,
    state: Arc<MockState>,
    task: JoinHandle<()>,
}

impl MockHandle {
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /**
     * \brief 按到达顺序返回已记录的请求。
     */
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.calls()
    }

    pub fn count(&self, kind: CallKind) -> usize {
        self.calls().iter().filter(|c| c.kind == kind).count()
    }
}

impl Drop for MockHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/**
 * \brief 在 127.0.0.1 的随机端口后台启动模拟平台。
 */
pub async fn spawn(config: MockConfig) -> Result<MockHandle> {
    let state = Arc::new(new_state(config));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let app = router(state.clone());
    let task = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            telemetry::log_error("mock.server", &format!("serve failed: {}", err));
        }
    });
    Ok(MockHandle {
        base_url: format!("http://{}", addr),
        state,
        task,
    })
}

/**
 * \brief 前台运行模拟平台，供本地离线演示。
 * \param addr 监听地址，如 "127.0.0.1:5001"
 */
pub async fn run(addr: &str, config: MockConfig) -> Result<()> {
    let app = router(Arc::new(new_state(config)));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    println!("Mock platform listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

fn new_state(config: MockConfig) -> MockState {
    MockState {
        config,
        calls: Mutex::new(Vec::new()),
        conversations: AtomicUsize::new(0),
    }
}

fn router(state: Arc<MockState>) -> Router {
    Router::new()
        .route("/v1/apps", post(create_app))
        .route("/v1/apps/{app_id}/model-config", put(configure_model))
        .route("/v1/apps/{app_id}/chat-messages", post(chat_messages))
        .with_state(state)
}

fn status_of(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

fn header(headers: &HeaderMap, name: HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

fn rejection(status: StatusCode, what: &str) -> Response {
    (
        status,
        Json(json!({
            "code": "mock_rejected",
            "message": format!("{} rejected by mock platform", what),
            "status": status.as_u16(),
        })),
    )
        .into_response()
}

async fn create_app(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.record(RecordedCall {
        kind: CallKind::CreateApp,
        app_id: None,
        body: body.clone(),
        authorization: header(&headers, AUTHORIZATION),
        content_type: header(&headers, CONTENT_TYPE),
    });
    telemetry::log_event("mock.server", "create app");

    let status = status_of(state.config.create_status);
    if !status.is_success() {
        return rejection(status, "create app");
    }
    match body {
        Value::Object(mut app) => {
            app.insert("id".to_string(), json!(state.config.app_id));
            (status, Json(Value::Object(app))).into_response()
        }
        _ => rejection(StatusCode::BAD_REQUEST, "create app (body is not an object)"),
    }
}

async fn configure_model(
    State(state): State<Arc<MockState>>,
    Path(app_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.record(RecordedCall {
        kind: CallKind::ConfigureModel,
        app_id: Some(app_id.clone()),
        body,
        authorization: header(&headers, AUTHORIZATION),
        content_type: header(&headers, CONTENT_TYPE),
    });
    telemetry::log_event("mock.server", &format!("configure app_id={}", app_id));

    let status = status_of(state.config.configure_status);
    if !status.is_success() {
        return rejection(status, "configure model");
    }
    (status, Json(json!({"result": "success"}))).into_response()
}

async fn chat_messages(
    State(state): State<Arc<MockState>>,
    Path(app_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.record(RecordedCall {
        kind: CallKind::ChatMessage,
        app_id: Some(app_id.clone()),
        body: body.clone(),
        authorization: header(&headers, AUTHORIZATION),
        content_type: header(&headers, CONTENT_TYPE),
    });
    telemetry::log_event("mock.server", &format!("chat app_id={}", app_id));

    let status = status_of(state.config.chat_status);
    if !status.is_success() {
        return rejection(status, "chat message");
    }

    let query = body.get("query").and_then(|q| q.as_str()).unwrap_or("");
    let conversation_id = match body.get("conversation_id").and_then(|c| c.as_str()) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => format!(
            "conv-{}",
            state.conversations.fetch_add(1, Ordering::SeqCst) + 1
        ),
    };
    let answer = match &state.config.reply {
        MockReply::Echo => Some(format!("You said: {}", query)),
        MockReply::Fixed(text) => Some(text.clone()),
        MockReply::Missing => None,
    };

    let streaming = body.get("response_mode").and_then(|m| m.as_str()) == Some("streaming");
    if streaming {
        let mut events = Vec::new();
        if let Some(answer) = &answer {
            for delta in answer.split_inclusive(' ') {
                events.push(
                    Event::default().data(
                        json!({
                            "event": "message",
                            "answer": delta,
                            "conversation_id": conversation_id,
                        })
                        .to_string(),
                    ),
                );
            }
        }
        events.push(
            Event::default().data(
                json!({"event": "message_end", "conversation_id": conversation_id}).to_string(),
            ),
        );
        let stream = futures_util::stream::iter(events.into_iter().map(Ok::<Event, Infallible>));
        return (status, Sse::new(stream)).into_response();
    }

    let mut reply = json!({
        "event": "message",
        "conversation_id": conversation_id,
        "mode": "chat",
    });
    if let Some(answer) = answer {
        reply["answer"] = json!(answer);
    }
    (status, Json(reply)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_assigns_conversation_ids() {
        let handle = spawn(MockConfig::default()).await.expect("spawn mock");
        let http = reqwest::Client::new();
        let url = format!("{}/v1/apps/a1/chat-messages", handle.base_url());

        let first: Value = http
            .post(&url)
            .json(&json!({"query": "one", "user": "u", "conversation_id": "", "inputs": {}}))
            .send()
            .await
            .expect("send first")
            .json()
            .await
            .expect("decode first");
        assert_eq!(first["conversation_id"], "conv-1");
        assert_eq!(first["answer"], "You said: one");

        let second: Value = http
            .post(&url)
            .json(&json!({"query": "two", "user": "u", "conversation_id": "conv-1", "inputs": {}}))
            .send()
            .await
            .expect("send second")
            .json()
            .await
            .expect("decode second");
        assert_eq!(second["conversation_id"], "conv-1");
        assert_eq!(handle.count(CallKind::ChatMessage), 2);
    }

    #[tokio::test]
    async fn test_mock_omits_answer_when_missing() {
        let handle = spawn(MockConfig {
            reply: MockReply::Missing,
            ..MockConfig::default()
        })
        .await
        .expect("spawn mock");
        let resp = reqwest::Client::new()
            .post(format!("{}/v1/apps/a1/chat-messages", handle.base_url()))
            .json(&json!({"query": "q", "user": "u", "conversation_id": "", "inputs": {}}))
            .send()
            .await
            .expect("send");
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        let body: Value = resp.json().await.expect("decode");
        assert!(body.get("answer").is_none());
    }

    #[tokio::test]
    async fn test_mock_rejects_non_object_app_body() {
        let handle = spawn(MockConfig::default()).await.expect("spawn mock");
        let resp = reqwest::Client::new()
            .post(format!("{}/v1/apps", handle.base_url()))
            .json(&json!([1, 2]))
            .send()
            .await
            .expect("send");
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: Value = resp.json().await.expect("decode");
        assert_eq!(body["code"], "mock_rejected");
        assert_eq!(handle.count(CallKind::CreateApp), 1);
    }
}
