use std::{fmt, pin::Pin};

use anyhow::{anyhow, Result};
use async_stream::try_stream;
use futures_util::Stream;
use reqwest::{
    header::{AUTHORIZATION, CONTENT_TYPE},
    Method, RequestBuilder, Response, StatusCode,
};
use serde_json::Value;

use crate::models::{ChatMessageRequest, CreateAppRequest, Credentials, ModelConfig, ResponseMode};
use crate::telemetry;

/**
 * \brief 流式回复的增量序列。
 */
pub type AnswerStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/**
 * \brief 状态码不符合预期时的响应摘要。
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /** \brief 实际返回的状态码 */
    pub status: StatusCode,
    /** \brief 原始响应正文 */
    pub body: String,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.status, self.body)
    }
}

/**
 * \brief 接口调用结果：成功载荷，或显式的失败标记。
 */
#[derive(Debug, Clone, PartialEq)]
pub enum ApiOutcome<T> {
    Success(T),
    Rejected(Rejection),
}

impl<T> ApiOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, ApiOutcome::Success(_))
    }

    pub fn success(self) -> Option<T> {
        match self {
            ApiOutcome::Success(v) => Some(v),
            ApiOutcome::Rejected(_) => None,
        }
    }
}

/**
 * \brief 平台 HTTP 客户端，绑定一组凭据。
 */
#[derive(Debug, Clone)]
pub struct PlatformClient {
    credentials: Credentials,
    http: reqwest::Client,
}

impl PlatformClient {
    pub fn new(credentials: Credentials) -> Result<Self> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self { credentials, http })
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /**
     * \brief 使用教程固定配置创建应用，成功状态码为 201。
     */
    pub async fn create_application(&self) -> Result<ApiOutcome<Value>> {
        self.create_application_with(&CreateAppRequest::tutorial())
            .await
    }

    pub async fn create_application_with(
        &self,
        request: &CreateAppRequest,
    ) -> Result<ApiOutcome<Value>> {
        let resp = self
            .request(Method::POST, "/v1/apps")
            .json(request)
            .send()
            .await?;
        telemetry::log_event(
            "client.app",
            &format!("create name={} status={}", request.name, resp.status()),
        );
        expect_json(resp, StatusCode::CREATED, "client.app").await
    }

    /**
     * \brief 为应用写入教程模型配置，仅当状态码恰为 200 时返回 true。
     */
    pub async fn configure_model(&self, app_id: &str) -> Result<bool> {
        self.configure_model_with(app_id, &ModelConfig::tutorial())
            .await
    }

    pub async fn configure_model_with(&self, app_id: &str, config: &ModelConfig) -> Result<bool> {
        let resp = self
            .request(Method::PUT, &format!("/v1/apps/{}/model-config", app_id))
            .json(config)
            .send()
            .await?;
        let status = resp.status();
        telemetry::log_event(
            "client.model",
            &format!(
                "configure app_id={} model={}/{} status={}",
                app_id, config.provider, config.model, status
            ),
        );
        Ok(status == StatusCode::OK)
    }

    /**
     * \brief 发送一条消息，总是开启新会话。
     * \param app_id  应用 ID
     * \param message 用户消息
     * \param user_id 用户标识
     */
    pub async fn send_message(
        &self,
        app_id: &str,
        message: &str,
        user_id: &str,
    ) -> Result<ApiOutcome<Value>> {
        self.send_chat(app_id, &ChatMessageRequest::new_conversation(message, user_id))
            .await
    }

    /**
     * \brief 以阻塞模式发送任意聊天请求，成功状态码为 200。
     */
    pub async fn send_chat(
        &self,
        app_id: &str,
        request: &ChatMessageRequest,
    ) -> Result<ApiOutcome<Value>> {
        let resp = self
            .request(Method::POST, &chat_path(app_id))
            .json(request)
            .send()
            .await?;
        telemetry::log_event(
            "client.chat",
            &format!(
                "send app_id={} user={} query_len={} status={}",
                app_id,
                request.user,
                request.query.len(),
                resp.status()
            ),
        );
        expect_json(resp, StatusCode::OK, "client.chat").await
    }

    /**
     * \brief 以流式模式发送聊天请求，逐段返回回复内容。
     */
    pub async fn stream_message(
        &self,
        app_id: &str,
        request: &ChatMessageRequest,
    ) -> Result<AnswerStream> {
        let mut body = request.clone();
        body.response_mode = Some(ResponseMode::Streaming);

        let resp = self
            .request(Method::POST, &chat_path(app_id))
            .json(&body)
            .send()
            .await?;

        if resp.status() != StatusCode::OK {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            telemetry::log_error(
                "client.chat",
                &format!("stream app_id={} failed: {} -> {}", app_id, status, text),
            );
            return Err(anyhow!("chat stream failed: {} -> {}", status, text));
        }

        let mut stream = resp.bytes_stream();
        let mut buf = Vec::<u8>::new();

        let out = try_stream! {
            use futures_util::StreamExt;
            'read: while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                buf.extend_from_slice(&chunk);
                while let Some(pos) = find_double_newline(&buf) {
                    let block = buf.drain(..pos + 2).collect::<Vec<u8>>();
                    match extract_data_line(&block).map(|line| parse_stream_event(&line)) {
                        Some(StreamEvent::Answer(delta)) => {
                            yield delta;
                        }
                        Some(StreamEvent::End) => {
                            break 'read;
                        }
                        Some(StreamEvent::Error(message)) => {
                            Err::<(), anyhow::Error>(anyhow!("chat stream error: {}", message))?;
                        }
                        Some(StreamEvent::Other) | None => {}
                    }
                }
            }
        };

        Ok(Box::pin(out))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, self.credentials.endpoint(path))
            .header(CONTENT_TYPE, "application/json")
            .header(
                AUTHORIZATION,
                format!("Bearer {}", self.credentials.api_key),
            )
    }
}

/**
 * \brief 读取应用记录中的 `id` 字段。
 */
pub fn app_id(body: &Value) -> Option<&str> {
    body.get("id").and_then(|v| v.as_str())
}

/**
 * \brief 读取聊天响应中的 `answer` 字段。
 */
pub fn answer(body: &Value) -> Option<&str> {
    body.get("answer").and_then(|v| v.as_str())
}

fn chat_path(app_id: &str) -> String {
    format!("/v1/apps/{}/chat-messages", app_id)
}

async fn expect_json(
    resp: Response,
    expected: StatusCode,
    category: &str,
) -> Result<ApiOutcome<Value>> {
    let status = resp.status();
    if status == expected {
        return Ok(ApiOutcome::Success(resp.json().await?));
    }
    let body = resp.text().await.unwrap_or_default();
    telemetry::log_error(
        category,
        &format!("expected {} got {} -> {}", expected, status, body),
    );
    Ok(ApiOutcome::Rejected(Rejection { status, body }))
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum StreamEvent {
    Answer(String),
    End,
    Error(String),
    Other,
}

fn find_double_newline(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\n\n")
}

fn extract_data_line(block: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(block);
    for line in text.lines() {
        let line = line.trim_start();
        if let Some(rest) = line.strip_prefix("data:") {
            return Some(rest.trim().to_string());
        }
    }
    None
}

fn parse_stream_event(line: &str) -> StreamEvent {
    let v: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(_) => return StreamEvent::Other,
    };
    match v.get("event").and_then(|e| e.as_str()) {
        Some("message") | Some("agent_message") => match answer(&v) {
            Some(delta) if !delta.is_empty() => StreamEvent::Answer(delta.to_string()),
            _ => StreamEvent::Other,
        },
        Some("message_end") => StreamEvent::End,
        Some("error") => StreamEvent::Error(
            v.get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown error")
                .to_string(),
        ),
        _ => StreamEvent::Other,
    }
}
