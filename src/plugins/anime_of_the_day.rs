use crate::adapters::onebot::{LockedWriter, send_msg};
use crate::config::build_config;
use crate::event::Context;
use crate::message::Message;
use crate::plugins::{PluginError, get_config};
use crate::{debug, error, info, warn};
use chrono::{Datelike, Local, NaiveDate};
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use toml::Value;

pub mod cache;
pub mod calendar;
pub mod render;
pub mod template;

use cache::{ImageCache, date_key};
use calendar::{BgmtvClient, CalendarError, CalendarSource, DEFAULT_API_URL, pick_day};
use render::{CdpRenderer, Renderer};
use template::{ROOT_SELECTOR, render_page};

// ================= Config =================

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    pub enabled: bool,
    pub trigger: String,
    pub api_url: String,
    pub cache_dir: String,
    pub page_width: u32,
    pub device_scale_factor: f64,
    pub waiting_reply: String,
    /// 为空则失败时不回复
    pub failure_reply: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: true,
            trigger: "今日番剧".to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            cache_dir: "./downloads/anime-of-the-day".to_string(),
            page_width: 700,
            device_scale_factor: 1.0,
            waiting_reply: "正在获取今日番剧数据，请稍后...".to_string(),
            failure_reply: "获取今日番剧失败".to_string(),
        }
    }
}

pub fn default_config() -> Value {
    build_config(Config::default())
}

#[derive(Debug, Error)]
pub enum DailyError {
    #[error("获取放送表失败: {0}")]
    Calendar(#[from] CalendarError),

    #[error("渲染失败: {0}")]
    Render(anyhow::Error),
}

// ================= Session =================

/// 回复当前会话
pub trait Session: Send + Sync {
    fn send(&self, message: Message) -> BoxFuture<'_, Result<(), PluginError>>;
}

/// 回复触发消息所在的群聊或私聊
struct ChatSession {
    ctx: Context,
    writer: LockedWriter,
    group_id: Option<i64>,
    user_id: i64,
}

impl Session for ChatSession {
    fn send(&self, message: Message) -> BoxFuture<'_, Result<(), PluginError>> {
        Box::pin(async move {
            send_msg(
                &self.ctx,
                self.writer.clone(),
                self.group_id,
                Some(self.user_id),
                message,
            )
            .await
        })
    }
}

// ================= Core Logic =================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    CacheHit,
    Rendered { cached: bool },
    Failed,
}

async fn fetch_and_render(
    source: &dyn CalendarSource,
    renderer: &dyn Renderer,
    config: &Config,
    today: NaiveDate,
) -> Result<Vec<u8>, DailyError> {
    let days = source.fetch_calendar().await?;
    let day = pick_day(&days, today.weekday().num_days_from_sunday())?;
    debug!(
        target: "AnimeOfTheDay",
        "{} 共 {} 部番剧",
        day.weekday.cn,
        day.items.len()
    );

    let html = render_page(&date_key(today), day, config.page_width);
    renderer
        .render_png(&html, ROOT_SELECTOR)
        .await
        .map_err(DailyError::Render)
}

/// 处理一次触发：优先发送缓存，未命中时拉取、渲染、回复并写入缓存
pub async fn serve(
    session: &dyn Session,
    source: &dyn CalendarSource,
    renderer: &dyn Renderer,
    cache: &ImageCache,
    config: &Config,
    today: NaiveDate,
) -> Result<Outcome, PluginError> {
    if let Some(bytes) = cache.read(today).await {
        session.send(Message::new().image_bytes(&bytes)).await?;
        return Ok(Outcome::CacheHit);
    }
    debug!(
        target: "AnimeOfTheDay",
        "缓存未命中: {}",
        cache.path_for(today).display()
    );

    if !config.waiting_reply.is_empty() {
        session.send(config.waiting_reply.as_str().into()).await?;
    }

    let png = match fetch_and_render(source, renderer, config, today).await {
        Ok(png) => png,
        Err(e) => {
            error!(target: "AnimeOfTheDay", "{}", e);
            if !config.failure_reply.is_empty() {
                session.send(config.failure_reply.as_str().into()).await?;
            }
            return Ok(Outcome::Failed);
        }
    };

    // 发送失败也照常写入缓存，下次触发无需重新渲染
    let sent = session.send(Message::new().image_bytes(&png)).await;

    let cached = match cache.write(today, &png).await {
        Ok(path) => {
            info!(target: "AnimeOfTheDay", "已缓存: {}", path.display());
            true
        }
        Err(e) => {
            warn!(target: "AnimeOfTheDay", "写入缓存失败: {}", e);
            false
        }
    };

    sent?;
    Ok(Outcome::Rendered { cached })
}

// ================= Main Handler =================

pub fn handle(
    ctx: Context,
    writer: LockedWriter,
) -> BoxFuture<'static, Result<Option<Context>, PluginError>> {
    Box::pin(async move {
        let config: Config = get_config(&ctx, "anime_of_the_day").unwrap_or_default();

        let (group_id, user_id) = match ctx.as_message() {
            Some(msg) if msg.text() == config.trigger => (msg.group_id(), msg.user_id()),
            _ => return Ok(Some(ctx)),
        };

        // 忽略机器人自己发出的消息
        if user_id.to_string() == ctx.bot.login_user.id {
            return Ok(Some(ctx));
        }

        let session = ChatSession {
            ctx,
            writer,
            group_id,
            user_id,
        };
        let source = BgmtvClient::shared(config.api_url.as_str());
        let renderer = CdpRenderer::new(config.page_width, config.device_scale_factor);
        let cache = ImageCache::new(config.cache_dir.as_str());

        serve(
            &session,
            &source,
            &renderer,
            &cache,
            &config,
            Local::now().date_naive(),
        )
        .await?;

        Ok(None)
    })
}
