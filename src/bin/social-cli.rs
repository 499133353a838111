//! 社交会话 CLI 客户端（测试版）
//!
//! 非交互式 CLI：通过命令行参数指定用户和 token，连接事件通道后展示所有状态变更。
//! 可选地打开一个单聊并发送一条消息。

use anyhow::Result;
use clap::Parser;
use social_sdk_core_rust::im::channel::WsEventChannel;
use social_sdk_core_rust::im::client::{ClientConfig, SessionClient};
use social_sdk_core_rust::im::conversation::listener::ConversationListener;
use social_sdk_core_rust::im::conversation::models::ConversationTarget;
use social_sdk_core_rust::im::dispatcher::SessionListeners;
use social_sdk_core_rust::im::friend::listener::FriendListener;
use social_sdk_core_rust::im::group::listener::GroupListener;
use social_sdk_core_rust::im::message::listener::AdvancedMsgListener;
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

/// 社交会话 CLI 客户端
#[derive(Parser, Debug)]
#[command(name = "social-cli")]
#[command(about = "社交会话 CLI 客户端 - 用于测试和展示会话核心", long_about = None)]
struct Args {
    /// 用户 ID
    #[arg(short, long)]
    user_id: String,

    /// 认证 token
    #[arg(short, long)]
    token: String,

    /// 平台 ID
    #[arg(long, default_value = "5")]
    platform: i32,

    /// WebSocket 地址
    #[arg(long, default_value = "ws://localhost:10001")]
    ws_url: String,

    /// HTTP API 地址
    #[arg(long, default_value = "http://localhost:10002")]
    api_url: String,

    /// 启动后打开与该用户的单聊
    #[arg(long)]
    chat_with: Option<String>,

    /// 打开单聊后发送的文本
    #[arg(long)]
    text: Option<String>,

    /// 运行时长（秒），0 表示持续运行
    #[arg(short, long, default_value = "0")]
    duration: u64,

    /// 日志级别（默认: info,social_sdk_core_rust=debug）
    #[arg(long, default_value = "info,social_sdk_core_rust=debug")]
    log_level: String,
}

/// 初始化日志（同时输出到 stdout 和文件）
fn init_logger(log_level: &str) -> Result<()> {
    use std::fs::OpenOptions;
    use std::io;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    // 优先使用环境变量 RUST_LOG
    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open("debug.log")
        .map_err(|e| anyhow::anyhow!("无法创建日志文件 debug.log: {}", e))?;

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_ansi(true);

    // 文件不需要颜色
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    info!("[CLI] 📝 日志已同时输出到控制台和文件: debug.log");
    Ok(())
}

struct CliFriendListener;

#[async_trait::async_trait]
impl FriendListener for CliFriendListener {
    async fn on_relationship_changed(&self, notification_json: String) {
        info!("[CLI/Friend] 👥 关系变更: {}", notification_json);
    }

    async fn on_relationship_reconciled(&self, notification_json: String) {
        warn!("[CLI/Friend] 🔀 关系已按服务器校正: {}", notification_json);
    }
}

struct CliGroupListener;

#[async_trait::async_trait]
impl GroupListener for CliGroupListener {
    async fn on_membership_changed(&self, notification_json: String) {
        info!("[CLI/Group] 👪 成员变更: {}", notification_json);
    }

    async fn on_group_info_changed(&self, notification_json: String) {
        info!("[CLI/Group] ℹ️ 群资料变更: {}", notification_json);
    }
}

struct CliConversationListener;

#[async_trait::async_trait]
impl ConversationListener for CliConversationListener {
    async fn on_conversation_changed(&self, conversation: String) {
        info!("[CLI/Conversation] 🔄 会话变更: {}", conversation);
    }

    async fn on_total_unread_message_count_changed(&self, total_unread_count: i32) {
        info!("[CLI/Conversation] 📬 总未读数: {}", total_unread_count);
    }
}

struct CliAdvancedMsgListener;

#[async_trait::async_trait]
impl AdvancedMsgListener for CliAdvancedMsgListener {
    async fn on_recv_new_message(&self, message: String) {
        info!("[CLI/Message] 📨 收到新消息: {}", message);
    }

    async fn on_message_status_changed(&self, message: String) {
        info!("[CLI/Message] 📤 发送状态: {}", message);
    }
}

fn cli_listeners() -> SessionListeners {
    SessionListeners {
        friend: Arc::new(CliFriendListener),
        group: Arc::new(CliGroupListener),
        conversation: Arc::new(CliConversationListener),
        message: Arc::new(CliAdvancedMsgListener),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logger(&args.log_level)?;

    info!("[CLI] 🚀 社交会话 CLI 客户端（测试模式）");
    info!("[CLI] 👤 用户: {}", args.user_id);
    info!("[CLI] ⏱️  运行时长: {} 秒（0=持续运行）", args.duration);

    let mut config = ClientConfig::new(args.user_id.clone(), args.token.clone(), args.platform);
    config.ws_url = args.ws_url.clone();
    config.api_base_url = args.api_url.clone();

    let client = SessionClient::spawn_http(config.clone(), cli_listeners())?;

    info!("[CLI] 🔗 正在连接服务器...");
    let channel = WsEventChannel::connect(&config)
        .await
        .map_err(|e| anyhow::anyhow!("连接失败: {:#}", e))?;
    let pump = client.attach_channel(channel);
    info!("[CLI] ✅ 连接成功！");

    if let Some(peer) = &args.chat_with {
        let view = client
            .open_conversation(ConversationTarget::Peer(peer.clone()))
            .await?;
        info!("[CLI] 💬 已打开会话 {}", view.conversation_id);
        if let Some(text) = &args.text {
            match client.send_text(&view.conversation_id, text).await {
                Ok(message) => info!("[CLI] 📤 已发送 clientMsgID={}", message.client_msg_id),
                Err(e) => error!("[CLI] ❌ 发送失败: {}", e),
            }
        }
    }

    if args.duration > 0 {
        info!("[CLI] ⏰ {} 秒后自动退出", args.duration);
        sleep(Duration::from_secs(args.duration)).await;
    } else {
        info!("[CLI] ⏰ 持续运行中，按 Ctrl+C 退出");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = pump => warn!("[CLI] 事件通道已关闭"),
        }
    }

    let stats = client.stats().await?;
    info!(
        "[CLI] 📊 事件统计: {}",
        serde_json::to_string(&stats).unwrap_or_default()
    );
    client.logout().await?;
    info!("[CLI] 👋 程序退出");
    Ok(())
}
