use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures_util::StreamExt;

use quickbot_core_sdk::{
    client::{self, ApiOutcome, PlatformClient},
    mock::{self, MockConfig},
    models::{ChatMessageRequest, Credentials, DEFAULT_BASE_URL, DEFAULT_USER},
    telemetry, templates,
    tutorial::{self, RunOptions, RunOutcome, DEFAULT_DASHBOARD_URL},
};

/**
 * \brief CLI 程序入口：演示聊天应用平台 API 的调用流程。
 */
#[derive(Parser, Debug)]
#[command(name = "quickbot", version, about = "Chat-application platform API tutorial")]
struct Cli {
    /** \brief 平台 API Key */
    #[arg(long, env = "QUICKBOT_API_KEY", default_value = "your-api-key-here", global = true)]
    api_key: String,
    /** \brief 平台 API 基地址 */
    #[arg(long, env = "QUICKBOT_BASE_URL", default_value = DEFAULT_BASE_URL, global = true)]
    base_url: String,
    /** \brief 是否写入 logs/quickbot.log */
    #[arg(long, env = "QUICKBOT_TELEMETRY", default_value_t = false, global = true)]
    telemetry: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /**
     * \brief 运行完整教程：创建应用、配置模型、发送示例问题。
     */
    Run {
        #[arg(long, default_value = DEFAULT_USER)]
        user: String,
        #[arg(long, default_value = DEFAULT_DASHBOARD_URL)]
        dashboard_url: String,
        /** \brief 覆盖默认问题列表，可重复 */
        #[arg(long = "prompt")]
        prompts: Vec<String>,
    },

    /** \brief 创建教程应用并打印响应。 */
    CreateApp,

    /** \brief 为已有应用写入教程模型配置。 */
    Configure {
        #[arg(long)]
        app_id: String,
    },

    /**
     * \brief 发送一条消息；指定 --stream 时逐段打印回复。
     */
    Chat {
        #[arg(long)]
        app_id: String,
        #[arg(long)]
        prompt: String,
        #[arg(long, default_value = DEFAULT_USER)]
        user: String,
        #[arg(long)]
        conversation_id: Option<String>,
        #[arg(long, default_value_t = false)]
        stream: bool,
    },

    /** \brief 列出工作流模板。 */
    Templates {
        #[arg(long)]
        name: Option<String>,
    },

    /** \brief 以 JSON 打印示例工作流定义。 */
    WorkflowExample,

    /**
     * \brief 启动本地模拟平台，便于离线运行教程。
     */
    MockServe {
        #[arg(long, default_value = "127.0.0.1:5001")]
        addr: String,
        #[arg(long, default_value = "mock-app")]
        app_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::set_enabled(cli.telemetry);

    let credentials = Credentials::new(cli.api_key, cli.base_url);

    match cli.command {
        Commands::Run {
            user,
            dashboard_url,
            prompts,
        } => {
            let platform = PlatformClient::new(credentials).context("build http client failed")?;
            let mut options = RunOptions {
                user,
                dashboard_url,
                ..RunOptions::default()
            };
            if !prompts.is_empty() {
                options.prompts = prompts;
            }
            let report = match tutorial::run(&platform, &options, &mut std::io::stdout()).await {
                Ok(report) => report,
                Err(err) => return Err(run_failed(err)),
            };
            if report.outcome != RunOutcome::Completed {
                telemetry::log_error("cli.run", &format!("aborted: {:?}", report.outcome));
            }
        }
        Commands::CreateApp => {
            let platform = PlatformClient::new(credentials).context("build http client failed")?;
            match platform
                .create_application()
                .await
                .context("create app failed")?
            {
                ApiOutcome::Success(body) => {
                    println!("✅ App created successfully!");
                    println!("{}", serde_json::to_string_pretty(&body)?);
                }
                ApiOutcome::Rejected(rejection) => {
                    println!("❌ Error creating app: {}", rejection);
                }
            }
        }
        Commands::Configure { app_id } => {
            let platform = PlatformClient::new(credentials).context("build http client failed")?;
            if platform
                .configure_model(&app_id)
                .await
                .context("configure model failed")?
            {
                println!("✅ Model configured successfully!");
            } else {
                println!("❌ Failed to configure model");
            }
        }
        Commands::Chat {
            app_id,
            prompt,
            user,
            conversation_id,
            stream,
        } => {
            let platform = PlatformClient::new(credentials).context("build http client failed")?;
            let mut request = ChatMessageRequest::new_conversation(&prompt, &user);
            if let Some(id) = conversation_id {
                request = request.in_conversation(id);
            }

            telemetry::log_event(
                "cli.chat",
                &format!(
                    "app_id={} stream={} prompt_len={}",
                    app_id,
                    stream,
                    prompt.len()
                ),
            );

            if stream {
                let mut deltas = platform
                    .stream_message(&app_id, &request)
                    .await
                    .context("create stream failed")?;
                while let Some(delta) = deltas
                    .as_mut()
                    .next()
                    .await
                    .transpose()
                    .context("stream error")?
                {
                    print!("{}", delta);
                    use std::io::Write;
                    std::io::stdout().flush().ok();
                }
                println!();
            } else {
                match platform
                    .send_chat(&app_id, &request)
                    .await
                    .context("send message failed")?
                {
                    ApiOutcome::Success(body) => match client::answer(&body) {
                        Some(answer) => println!("🤖 Bot: {}", answer),
                        None => println!("❌ No response received"),
                    },
                    ApiOutcome::Rejected(rejection) => {
                        println!("❌ Error sending message: {}", rejection);
                    }
                }
            }
        }
        Commands::Templates { name } => match name {
            Some(name) => {
                let template = templates::find_template(&name)
                    .with_context(|| format!("unknown template: {}", name))?;
                println!("{}", serde_json::to_string_pretty(template)?);
            }
            None => {
                for t in templates::WORKFLOW_TEMPLATES {
                    println!("{:<18} {} ({})", t.name, t.description, t.use_case);
                    println!("{:<18} {}", "", t.nodes.join(" -> "));
                }
            }
        },
        Commands::WorkflowExample => {
            let definition = templates::sample_workflow_definition();
            println!("{}", serde_json::to_string_pretty(&definition)?);
        }
        Commands::MockServe { addr, app_id } => {
            mock::run(
                &addr,
                MockConfig {
                    app_id,
                    ..MockConfig::default()
                },
            )
            .await?;
        }
    }

    Ok(())
}

/**
 * \brief 记录教程失败并包装错误，由 main 的返回值统一打印一次。
 */
fn run_failed(err: anyhow::Error) -> anyhow::Error {
    telemetry::log_error("cli.run", &format!("{:#}", err));
    err.context("💥 An error occurred")
}
