#[macro_use]
mod log;

mod adapters;
mod config;
mod event;
mod matcher;
mod message;
mod plugins;

use config::AppConfig;
use event::{BotStatus, Context, EventType};
use matcher::Matcher;
use std::sync::{Arc, RwLock};

const CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // 读取配置并补全缺失的插件默认值
    let mut app_config = AppConfig::load(CONFIG_PATH).await?;
    if app_config.fill_plugin_defaults(plugins::default_configs()) {
        app_config.save(CONFIG_PATH).await?;
        info!(target: "System", "已写入默认配置: {}", CONFIG_PATH);
    }

    let bots = app_config.bots.clone();
    let global_config = Arc::new(RwLock::new(app_config));

    let init_ctx = Context {
        event: EventType::Init,
        config: global_config.clone(),
        matcher: Arc::new(Matcher::new()),
        bot: BotStatus::default(),
    };
    plugins::do_init(init_ctx).await?;

    let mut started = 0;
    for bot in bots.into_iter().filter(|b| b.enabled) {
        match adapters::find_adapter(&bot.protocol) {
            Some(adapter) => {
                tokio::spawn((adapter.handler)(bot, global_config.clone()));
                started += 1;
            }
            None => warn!(target: "System", "未知的适配器协议: {}", bot.protocol),
        }
    }

    if started == 0 {
        warn!(target: "System", "没有启用任何适配器，请检查 {}", CONFIG_PATH);
    }

    tokio::signal::ctrl_c().await?;
    info!(target: "System", "正在退出...");
    cdp_html_shot::Browser::shutdown_global().await;

    Ok(())
}
