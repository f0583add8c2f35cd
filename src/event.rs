use crate::config::AppConfig;
use crate::matcher::Matcher;
use serde::{Deserialize, Serialize};
use simd_json::OwnedValue;
use simd_json::derived::{ValueObjectAccess, ValueObjectAccessAsScalar};
use std::sync::{Arc, RwLock};

pub type Event = OwnedValue;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoginUser {
    pub id: String,
    pub name: Option<String>,
    pub nick: Option<String>,
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BotStatus {
    pub adapter: String,
    pub platform: String,
    pub login_user: LoginUser,
}

/// 统一的上下文，包含事件数据与共享配置
/// 在插件流水线中通过 Move 传递，插件返回 None 表示事件已被消费。
#[derive(Clone)]
pub struct Context {
    pub event: EventType,
    pub config: Arc<RwLock<AppConfig>>,
    pub matcher: Arc<Matcher>,
    pub bot: BotStatus,
}

impl Context {
    /// 基于当前上下文派生一个携带新事件的上下文
    pub fn with_event(&self, event: EventType) -> Self {
        Self {
            event,
            config: self.config.clone(),
            matcher: self.matcher.clone(),
            bot: self.bot.clone(),
        }
    }

    /// 尝试将当前事件视为 OneBot 消息事件
    pub fn as_message(&self) -> Option<MessageEvent<'_>> {
        if let EventType::Onebot(event) = &self.event
            && GeneralEventView(event).post_type() == Some("message")
        {
            return Some(MessageEvent(event));
        }
        None
    }

    /// 获取事件的 Post Type (如果是 OneBot 事件)
    pub fn post_type(&self) -> Option<&str> {
        if let EventType::Onebot(event) = &self.event {
            GeneralEventView(event).post_type()
        } else {
            None
        }
    }
}

// ================== 事件封装工具 ==================

/// 通用事件视图，用于快速访问基础字段
pub struct GeneralEventView<'a>(&'a Event);

impl<'a> GeneralEventView<'a> {
    pub fn post_type(&self) -> Option<&'a str> {
        self.0.get_str("post_type")
    }
}

/// 消息事件封装，提供便捷的强类型访问
pub struct MessageEvent<'a>(pub &'a Event);

impl<'a> MessageEvent<'a> {
    /// 获取群号 (如果是群消息)
    pub fn group_id(&self) -> Option<i64> {
        self.0
            .get_i64("group_id")
            .or_else(|| self.0.get_u64("group_id").map(|v| v as i64))
    }

    pub fn user_id(&self) -> i64 {
        self.0
            .get_i64("user_id")
            .or_else(|| self.0.get_u64("user_id").map(|v| v as i64))
            .unwrap_or(0)
    }

    /// 获取纯文本内容 (raw_message)
    pub fn text(&self) -> &'a str {
        self.0.get_str("raw_message").unwrap_or("")
    }

    pub fn sender_nickname(&self) -> Option<&'a str> {
        self.0.get("sender").and_then(|s| s.get_str("nickname"))
    }

    /// 获取发送者群名片 (如果为空则返回 None)
    pub fn sender_card(&self) -> Option<&'a str> {
        self.0
            .get("sender")
            .and_then(|s| s.get_str("card"))
            .filter(|s| !s.is_empty())
    }

    /// 获取发送者显示名称 (优先名片，其次昵称)
    pub fn sender_name(&self) -> &'a str {
        self.sender_card()
            .or_else(|| self.sender_nickname())
            .unwrap_or("Unknown")
    }
}

// ================== 基础结构定义 ==================

#[derive(Debug, Clone)]
pub enum EventType {
    /// 来自 OneBot 的原始事件
    Onebot(Event),
    /// 插件准备发送消息前的拦截事件
    BeforeSend(SendPacket),
    /// 系统初始化事件 (用于插件 on_init 生命周期)
    Init,
}

/// 发送包结构，用于在 BeforeSend 中传递
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SendPacket {
    pub action: String,
    pub params: OwnedValue,
    /// 原始触发事件（不参与序列化发送给 Bot）
    #[serde(skip)]
    pub original_event: Option<Event>,
}

impl SendPacket {
    pub fn message(&self) -> Option<&OwnedValue> {
        self.params.get("message")
    }

    pub fn message_type(&self) -> Option<&str> {
        self.params.get_str("message_type")
    }
}
