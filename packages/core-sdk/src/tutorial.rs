use std::io::Write;

use anyhow::{anyhow, Result};

use crate::client::{self as platform, ApiOutcome, PlatformClient, Rejection};
use crate::models::DEFAULT_USER;
use crate::telemetry;

/** \brief 教程依次发送的固定问题。 */
pub const TUTORIAL_PROMPTS: [&str; 3] = [
    "Hello! What can you help me with?",
    "Explain what Dify is in simple terms",
    "What are the main components of Dify's architecture?",
];

/** \brief 默认控制台地址，用于打印应用入口链接。 */
pub const DEFAULT_DASHBOARD_URL: &str = "http://localhost:3000";

/**
 * \brief 教程运行参数。
 */
#[derive(Debug, Clone)]
pub struct RunOptions {
    /** \brief 依次发送的问题 */
    pub prompts: Vec<String>,
    /** \brief 发送消息使用的用户标识 */
    pub user: String,
    /** \brief 控制台基地址 */
    pub dashboard_url: String,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            prompts: TUTORIAL_PROMPTS.iter().map(|p| p.to_string()).collect(),
            user: DEFAULT_USER.to_string(),
            dashboard_url: DEFAULT_DASHBOARD_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    AppCreationFailed,
    ModelConfigFailed,
}

/**
 * \brief 单个问题的回复结果。200 但缺少 answer 字段时记为 NoAnswer。
 */
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Answer(String),
    NoAnswer,
    Rejected(Rejection),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Exchange {
    pub prompt: String,
    pub reply: Reply,
}

/**
 * \brief 一次教程运行的汇总。
 */
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub app_id: Option<String>,
    pub outcome: RunOutcome,
    pub exchanges: Vec<Exchange>,
}

impl RunReport {
    fn aborted(app_id: Option<String>, outcome: RunOutcome) -> Self {
        Self {
            app_id,
            outcome,
            exchanges: Vec::new(),
        }
    }
}

/**
 * \brief 按顺序执行教程：创建应用、配置模型、逐条发送问题。
 *
 * 创建或配置失败时立即返回；传输与解码错误通过 Err 交给调用方处理。
 * \param client  平台客户端
 * \param options 运行参数
 * \param out     进度输出
 */
pub async fn run<W: Write>(
    client: &PlatformClient,
    options: &RunOptions,
    out: &mut W,
) -> Result<RunReport> {
    telemetry::log_event(
        "tutorial.run",
        &format!(
            "start base={} prompts={}",
            client.credentials().base_url,
            options.prompts.len()
        ),
    );

    writeln!(out, "🚀 Creating application...")?;
    let app = match client.create_application().await? {
        ApiOutcome::Success(body) => body,
        ApiOutcome::Rejected(rejection) => {
            writeln!(out, "❌ Error creating app: {}", rejection.body)?;
            writeln!(out, "Failed to create app. Exiting.")?;
            return Ok(RunReport::aborted(None, RunOutcome::AppCreationFailed));
        }
    };
    writeln!(out, "✅ App created successfully!")?;

    let app_id = platform::app_id(&app)
        .ok_or_else(|| anyhow!("create app response has no id: {}", app))?
        .to_string();
    writeln!(out, "📱 App created with ID: {}", app_id)?;

    writeln!(out, "⚙️ Configuring LLM model...")?;
    if !client.configure_model(&app_id).await? {
        writeln!(out, "❌ Failed to configure model")?;
        return Ok(RunReport::aborted(
            Some(app_id),
            RunOutcome::ModelConfigFailed,
        ));
    }
    writeln!(out, "✅ Model configured successfully!")?;

    writeln!(out, "\n💬 Testing the chatbot...")?;
    let mut exchanges = Vec::with_capacity(options.prompts.len());
    for prompt in &options.prompts {
        writeln!(out, "\n👤 User: {}", prompt)?;
        let reply = match client.send_message(&app_id, prompt, &options.user).await? {
            ApiOutcome::Success(body) => match platform::answer(&body) {
                Some(answer) => Reply::Answer(answer.to_string()),
                None => Reply::NoAnswer,
            },
            ApiOutcome::Rejected(rejection) => {
                writeln!(out, "❌ Error sending message: {}", rejection.body)?;
                Reply::Rejected(rejection)
            }
        };
        match &reply {
            Reply::Answer(answer) => writeln!(out, "🤖 Bot: {}", answer)?,
            _ => writeln!(out, "❌ No response received")?,
        }
        exchanges.push(Exchange {
            prompt: prompt.clone(),
            reply,
        });
    }

    writeln!(out, "\n🎉 Tutorial workflow completed successfully!")?;
    writeln!(
        out,
        "📊 App dashboard: {}/apps/{}",
        options.dashboard_url.trim_end_matches('/'),
        app_id
    )?;
    telemetry::log_event(
        "tutorial.run",
        &format!("done app_id={} exchanges={}", app_id, exchanges.len()),
    );

    Ok(RunReport {
        app_id: Some(app_id),
        outcome: RunOutcome::Completed,
        exchanges,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{self, CallKind, MockConfig, MockReply};
    use crate::models::Credentials;

    async fn run_against(config: MockConfig) -> (mock::MockHandle, RunReport, String) {
        let handle = mock::spawn(config).await.expect("spawn mock");
        let client =
            PlatformClient::new(Credentials::new("sk-test", handle.base_url())).expect("client");
        let mut out = Vec::new();
        let report = run(&client, &RunOptions::default(), &mut out)
            .await
            .expect("run tutorial");
        (handle, report, String::from_utf8(out).expect("utf8 output"))
    }

    #[tokio::test]
    async fn test_run_end_to_end() {
        let (handle, report, out) = run_against(MockConfig {
            app_id: "abc".to_string(),
            reply: MockReply::Fixed("hi".to_string()),
            ..MockConfig::default()
        })
        .await;

        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.app_id.as_deref(), Some("abc"));
        assert_eq!(handle.count(CallKind::CreateApp), 1);
        assert_eq!(handle.count(CallKind::ConfigureModel), 1);
        assert_eq!(handle.count(CallKind::ChatMessage), 3);

        for call in handle.calls() {
            assert_eq!(call.authorization.as_deref(), Some("Bearer sk-test"), "{:?}", call.kind);
            assert_eq!(call.content_type.as_deref(), Some("application/json"), "{:?}", call.kind);
        }

        let chats: Vec<_> = handle
            .calls()
            .into_iter()
            .filter(|c| c.kind == CallKind::ChatMessage)
            .collect();
        for (call, prompt) in chats.iter().zip(TUTORIAL_PROMPTS) {
            assert_eq!(call.app_id.as_deref(), Some("abc"));
            assert_eq!(call.body["conversation_id"], "");
            assert_eq!(call.body["query"], prompt);
            assert_eq!(call.body["user"], "tutorial-user");
        }
        assert!(report
            .exchanges
            .iter()
            .all(|e| e.reply == Reply::Answer("hi".to_string())));
        assert!(out.contains("🤖 Bot: hi"));
        assert!(out.contains("http://localhost:3000/apps/abc"));
    }

    #[tokio::test]
    async fn test_run_stops_when_create_fails() {
        let (handle, report, out) = run_against(MockConfig {
            create_status: 500,
            ..MockConfig::default()
        })
        .await;

        assert_eq!(report.outcome, RunOutcome::AppCreationFailed);
        assert_eq!(report.app_id, None);
        assert_eq!(handle.count(CallKind::CreateApp), 1);
        assert_eq!(handle.count(CallKind::ConfigureModel), 0);
        assert_eq!(handle.count(CallKind::ChatMessage), 0);
        assert!(out.contains("Failed to create app"));
    }

    #[tokio::test]
    async fn test_run_stops_when_configure_fails() {
        let (handle, report, _) = run_against(MockConfig {
            configure_status: 201,
            ..MockConfig::default()
        })
        .await;

        assert_eq!(report.outcome, RunOutcome::ModelConfigFailed);
        assert_eq!(handle.count(CallKind::ConfigureModel), 1);
        assert_eq!(handle.count(CallKind::ChatMessage), 0);
        assert!(report.exchanges.is_empty());
    }

    #[tokio::test]
    async fn test_run_records_missing_answer_and_rejected_chat() {
        let (_, report, out) = run_against(MockConfig {
            reply: MockReply::Missing,
            ..MockConfig::default()
        })
        .await;
        assert_eq!(report.outcome, RunOutcome::Completed);
        assert!(report.exchanges.iter().all(|e| e.reply == Reply::NoAnswer));
        assert_eq!(out.matches("No response received").count(), 3);

        let (handle, report, _) = run_against(MockConfig {
            chat_status: 503,
            ..MockConfig::default()
        })
        .await;
        assert_eq!(handle.count(CallKind::ChatMessage), 3);
        assert!(report
            .exchanges
            .iter()
            .all(|e| matches!(&e.reply, Reply::Rejected(r) if r.status.as_u16() == 503)));
    }

    #[tokio::test]
    async fn test_run_propagates_transport_errors() {
        let client =
            PlatformClient::new(Credentials::new("sk-test", "http://127.0.0.1:1")).expect("client");
        let mut out = Vec::new();
        assert!(run(&client, &RunOptions::default(), &mut out).await.is_err());
    }
}
