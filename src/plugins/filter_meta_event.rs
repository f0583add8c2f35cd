use crate::adapters::onebot::LockedWriter;
use crate::config::build_config;
use crate::event::Context;
use crate::plugins::PluginError;
use futures_util::future::BoxFuture;
use serde::Serialize;
use toml::Value;

#[derive(Serialize)]
struct FilterConfig {
    enabled: bool,
}

pub fn default_config() -> Value {
    build_config(FilterConfig { enabled: true })
}

/// 丢弃心跳、生命周期等元事件
pub fn handle(
    ctx: Context,
    _writer: LockedWriter,
) -> BoxFuture<'static, Result<Option<Context>, PluginError>> {
    Box::pin(async move {
        if ctx.post_type() == Some("meta_event") {
            return Ok(None);
        }
        Ok(Some(ctx))
    })
}
