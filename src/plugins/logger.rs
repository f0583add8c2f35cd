use crate::adapters::onebot::LockedWriter;
use crate::config::build_config;
use crate::event::{Context, EventType};
use crate::plugins::{PluginError, get_config};
use crate::{debug, info};
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use simd_json::OwnedValue;
use simd_json::base::{ValueAsArray, ValueAsScalar};
use simd_json::derived::{ValueObjectAccess, ValueObjectAccessAsScalar};
use toml::Value;

#[derive(Serialize, Deserialize, Default)]
struct LoggerConfig {
    enabled: bool,
    #[serde(default)]
    debug: bool,
}

pub fn default_config() -> Value {
    build_config(LoggerConfig {
        enabled: true,
        debug: false,
    })
}

/// 根据配置打开 Debug 日志
pub fn init(ctx: Context) -> BoxFuture<'static, Result<(), PluginError>> {
    Box::pin(async move {
        let config: LoggerConfig = get_config(&ctx, "logger").unwrap_or_default();
        crate::log::set_debug(config.debug);
        Ok(())
    })
}

pub fn handle(
    ctx: Context,
    _writer: LockedWriter,
) -> BoxFuture<'static, Result<Option<Context>, PluginError>> {
    Box::pin(async move {
        match &ctx.event {
            EventType::Onebot(ev) => {
                if let Some(msg) = ctx.as_message() {
                    let content = format_message(ev.get("message"));
                    let sender = format!("{}({})", msg.sender_name(), msg.user_id());

                    match msg.group_id() {
                        Some(gid) => info!(
                            target: "Chat",
                            "接收 <- 群聊 [Group({})] [{}] {}",
                            gid, sender, content
                        ),
                        None => info!(target: "Chat", "接收 <- 私聊 [{}] {}", sender, content),
                    }
                } else if let Some(post_type) = ctx.post_type() {
                    debug!(target: "Event", "Type: {}", post_type);
                }
            }
            EventType::BeforeSend(packet) => {
                if packet.action == "send_msg" {
                    let params = &packet.params;
                    let content = format_message(packet.message());
                    match packet.message_type().unwrap_or("unknown") {
                        "group" => info!(
                            target: "Chat",
                            "发送 -> 群聊 [Group({})] {}",
                            params.get_i64("group_id").unwrap_or(0),
                            content
                        ),
                        "private" => info!(
                            target: "Chat",
                            "发送 -> 私聊 [User({})] {}",
                            params.get_i64("user_id").unwrap_or(0),
                            content
                        ),
                        other => info!(target: "Chat", "发送 -> 未知 [{}] {}", other, content),
                    }
                } else {
                    debug!(target: "Bot", "Action: {}", packet.action);
                }
            }
            EventType::Init => {}
        }

        Ok(Some(ctx))
    })
}

/// 将 OneBot 消息链转换为人类可读的字符串；内联图片只显示长度
pub fn format_message(msg_val: Option<&OwnedValue>) -> String {
    let Some(val) = msg_val else {
        return String::new();
    };

    if let Some(s) = val.as_str() {
        return s.to_string();
    }

    let Some(arr) = val.as_array() else {
        return "[复杂消息]".to_string();
    };

    let mut result = String::new();
    for seg in arr {
        let data = seg.get("data");
        match seg.get_str("type").unwrap_or("unknown") {
            "text" => {
                if let Some(t) = data.and_then(|d| d.get_str("text")) {
                    result.push_str(t);
                }
            }
            "image" => {
                let file = data.and_then(|d| d.get_str("file")).unwrap_or("");
                match file.strip_prefix("base64://") {
                    Some(b64) => result.push_str(&format!(" [图片 base64:{}] ", b64.len())),
                    None => result.push_str(" [图片] "),
                }
            }
            "reply" => result.push_str(" [回复] "),
            other => result.push_str(&format!(" [{}] ", other)),
        }
    }
    result
}
