use crate::adapters::onebot::{LockedWriter, process_frame};
use crate::config::{AppConfig, BotConfig};
use crate::event::{BotStatus, LoginUser};
use crate::matcher::Matcher;
use crate::message::Message;
use crate::plugins::logger::format_message;
use crate::{info, warn};
use futures_util::Sink;
use futures_util::future::BoxFuture;
use serde::Serialize;
use simd_json::derived::{ValueObjectAccess, ValueObjectAccessAsScalar};
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use std::task::{Context, Poll};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Mutex as AsyncMutex;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};

// ================= 模拟数据结构 =================

#[derive(Serialize)]
struct MockSender {
    user_id: i64,
    nickname: String,
    card: String,
}

#[derive(Serialize)]
struct MockMessageEvent {
    post_type: String,
    message_type: String,
    time: u64,
    self_id: i64,
    sub_type: String,
    user_id: i64,
    message_id: i32,
    sender: MockSender,
    raw_message: String,
    message: Message,
}

impl MockMessageEvent {
    fn private(line: &str, timestamp: u64) -> Self {
        Self {
            post_type: "message".to_string(),
            message_type: "private".to_string(),
            time: timestamp,
            self_id: 0,
            sub_type: "friend".to_string(),
            user_id: 1,
            message_id: timestamp as i32,
            sender: MockSender {
                user_id: 1,
                nickname: "ConsoleUser".to_string(),
                card: String::new(),
            },
            raw_message: line.to_string(),
            message: Message::new().text(line),
        }
    }
}

// ================= 适配器逻辑 =================

/// 控制台适配器入口：标准输入的每一行视为来自用户 1 的私聊消息
pub fn entry(
    _bot_config: BotConfig,
    global_config: Arc<RwLock<AppConfig>>,
) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        info!(target: "Console", "已启动控制台模式。输入 今日番剧 试试");

        let stdin = tokio::io::stdin();
        let mut reader = BufReader::new(stdin).lines();

        let writer: LockedWriter = Arc::new(AsyncMutex::new(Box::new(ConsoleSink)));
        let matcher = Arc::new(Matcher::new());

        let bot_status = BotStatus {
            adapter: "console".to_string(),
            platform: "console".to_string(),
            login_user: LoginUser {
                id: "0".to_string(),
                name: Some("ConsoleBot".to_string()),
                nick: Some("ConsoleBot".to_string()),
                avatar: None,
            },
        };

        while let Ok(Some(line)) = reader.next_line().await {
            let Some(line) = accept_line(&line) else {
                continue;
            };

            let timestamp = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0);

            let mut json_bytes = match simd_json::to_vec(&MockMessageEvent::private(line, timestamp))
            {
                Ok(b) => b,
                Err(e) => {
                    warn!(target: "Console", "构造模拟消息失败: {}", e);
                    continue;
                }
            };

            if let Err(e) = process_frame(
                &mut json_bytes,
                writer.clone(),
                global_config.clone(),
                matcher.clone(),
                bot_status.clone(),
            )
            .await
            {
                warn!(target: "Console", "处理消息时出错: {}", e);
            }
        }
    })
}

/// 跳过空白行；其余行原样作为消息内容，不做 trim
fn accept_line(line: &str) -> Option<&str> {
    if line.trim().is_empty() {
        None
    } else {
        Some(line)
    }
}

/// 将 Bot 的发送动作打印到终端
struct ConsoleSink;

impl Sink<WsMessage> for ConsoleSink {
    type Error = WsError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, item: WsMessage) -> Result<(), Self::Error> {
        if let WsMessage::Text(text) = item {
            let mut data = text.as_bytes().to_vec();
            match simd_json::to_owned_value(&mut data) {
                Ok(val) => {
                    if val.get_str("action") == Some("send_msg")
                        && let Some(message) = val.get("params").and_then(|p| p.get("message"))
                    {
                        println!(
                            "\x1b[36m[Bot Reply] > \x1b[0m{}",
                            format_message(Some(message))
                        );
                    } else {
                        println!(
                            "\x1b[90m[API Call] > {}\x1b[0m",
                            val.get_str("action").unwrap_or("unknown")
                        );
                    }
                }
                Err(_) => println!("\x1b[36m[Bot Raw] > \x1b[0m{}", text.as_str()),
            }
        }
        Ok(())
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_event_is_a_private_message() {
        let mut bytes = simd_json::to_vec(&MockMessageEvent::private("今日番剧", 7)).unwrap();
        let value = simd_json::to_owned_value(&mut bytes).unwrap();
        assert_eq!(value.get_str("post_type"), Some("message"));
        assert_eq!(value.get_str("raw_message"), Some("今日番剧"));
        assert_eq!(value.get_str("message_type"), Some("private"));
    }

    #[test]
    fn surrounding_whitespace_is_kept() {
        assert_eq!(accept_line("今日番剧 "), Some("今日番剧 "));
        assert_eq!(accept_line(" 今日番剧"), Some(" 今日番剧"));
        assert_eq!(accept_line("   "), None);
        assert_eq!(accept_line(""), None);

        let line = accept_line("今日番剧 ").unwrap();
        let mut bytes = simd_json::to_vec(&MockMessageEvent::private(line, 7)).unwrap();
        let value = simd_json::to_owned_value(&mut bytes).unwrap();
        assert_eq!(value.get_str("raw_message"), Some("今日番剧 "));
    }
}
