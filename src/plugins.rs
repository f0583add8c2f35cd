use crate::adapters::onebot::{LockedWriter, send_frame_raw};
use crate::event::{Context, EventType};
use crate::{error, info};
use futures_util::future::BoxFuture;
use serde::de::DeserializeOwned;
use std::sync::OnceLock;
use toml::Value;

pub mod anime_of_the_day;
pub mod filter_meta_event;
pub mod logger;

pub type PluginError = Box<dyn std::error::Error + Send + Sync>;

pub type PluginHandler =
    fn(Context, LockedWriter) -> BoxFuture<'static, Result<Option<Context>, PluginError>>;

pub type PluginInitHandler = fn(Context) -> BoxFuture<'static, Result<(), PluginError>>;

pub struct Plugin {
    pub name: &'static str,
    pub handler: PluginHandler,
    pub on_init: Option<PluginInitHandler>,
    pub default_config: fn() -> Value,
}

static PLUGINS: OnceLock<Vec<Plugin>> = OnceLock::new();

/// 获取全局插件列表（顺序即流水线顺序）
pub fn get_plugins() -> &'static [Plugin] {
    PLUGINS.get_or_init(|| {
        vec![
            Plugin {
                name: "filter_meta_event",
                handler: filter_meta_event::handle,
                on_init: None,
                default_config: filter_meta_event::default_config,
            },
            Plugin {
                name: "logger",
                handler: logger::handle,
                on_init: Some(logger::init),
                default_config: logger::default_config,
            },
            Plugin {
                name: "anime_of_the_day",
                handler: anime_of_the_day::handle,
                on_init: None,
                default_config: anime_of_the_day::default_config,
            },
        ]
    })
}

/// 所有插件的默认配置，用于补全配置文件
pub fn default_configs() -> impl Iterator<Item = (&'static str, Value)> {
    get_plugins().iter().map(|p| (p.name, (p.default_config)()))
}

fn is_enabled(ctx: &Context, plugin_name: &str) -> bool {
    ctx.config
        .read()
        .map(|guard| guard.is_enabled(plugin_name))
        .unwrap_or(false)
}

/// 执行所有插件的初始化逻辑
pub async fn do_init(ctx: Context) -> Result<(), PluginError> {
    let plugins = get_plugins();
    let enabled = plugins.iter().filter(|p| is_enabled(&ctx, p.name)).count();

    info!(
        target: "System",
        "正在加载插件系统 (已启用 {}/{})",
        enabled,
        plugins.len()
    );

    for plugin in plugins {
        if !is_enabled(&ctx, plugin.name) {
            continue;
        }

        match plugin.on_init {
            Some(init_fn) => match init_fn(ctx.with_event(EventType::Init)).await {
                Ok(_) => info!(target: "Plugin", "✅ [{}] 就绪 (Init Success)", plugin.name),
                Err(e) => error!(target: "Plugin", "❌ [{}] 初始化失败: {}", plugin.name, e),
            },
            None => info!(target: "Plugin", "✅ [{}] 就绪", plugin.name),
        }
    }
    Ok(())
}

/// 运行插件流水线；BeforeSend 事件走完流水线后写入适配器
pub async fn run(mut ctx: Context, writer: LockedWriter) -> Result<(), PluginError> {
    for plugin in get_plugins() {
        if !is_enabled(&ctx, plugin.name) {
            continue;
        }

        match (plugin.handler)(ctx, writer.clone()).await? {
            Some(next_ctx) => ctx = next_ctx,
            None => return Ok(()),
        }
    }

    if let EventType::BeforeSend(packet) = ctx.event {
        let json_str = simd_json::to_string(&packet)?;
        send_frame_raw(writer, json_str).await?;
    }

    Ok(())
}

// ================= 工具函数 =================

pub fn get_config<T>(ctx: &Context, plugin_name: &str) -> Option<T>
where
    T: DeserializeOwned,
{
    let guard = ctx.config.read().ok()?;
    guard
        .plugins
        .get(plugin_name)
        .and_then(|v| T::deserialize(v.clone()).ok())
}


#[cfg(test)]
mod tests {
    use super::testing::{context, writer};
    use super::*;
    use crate::adapters::onebot::send_msg;
    use crate::config::AppConfig;
    use crate::message::Message;
    use simd_json::json;

    fn config_with(enabled: &[&str]) -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.fill_plugin_defaults(default_configs());
        for (name, value) in cfg.plugins.iter_mut() {
            if let Value::Table(map) = value {
                map.insert(
                    "enabled".into(),
                    Value::Boolean(enabled.contains(&name.as_str())),
                );
            }
        }
        cfg
    }

    #[test]
    fn every_plugin_has_an_enabled_default() {
        for (name, value) in default_configs() {
            assert_eq!(
                value.get("enabled").and_then(|v| v.as_bool()),
                Some(true),
                "{name}"
            );
        }
    }

    #[tokio::test]
    async fn before_send_is_written_to_adapter() {
        let ctx = context(config_with(&[]), json!({ "post_type": "message" }));
        let (w, frames) = writer();

        send_msg(&ctx, w, None, Some(1), Message::new().text("hi"))
            .await
            .unwrap();

        let frames = frames.lock().unwrap();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].contains(r#""action":"send_msg""#));
        assert!(frames[0].contains(r#""message_type":"private""#));
    }

    #[tokio::test]
    async fn meta_events_are_dropped() {
        let ctx = context(
            config_with(&["filter_meta_event", "anime_of_the_day"]),
            json!({ "post_type": "meta_event", "meta_event_type": "heartbeat" }),
        );
        let (w, frames) = writer();
        run(ctx, w).await.unwrap();
        assert!(frames.lock().unwrap().is_empty());
    }
}
