use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tokio::fs;
use toml::Value;

pub type ConfigError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    // Bot 连接配置
    #[serde(default = "default_bots")]
    pub bots: Vec<BotConfig>,

    // 插件配置，按插件名索引
    #[serde(flatten)]
    pub plugins: HashMap<String, Value>,
}

impl AppConfig {
    /// 读取配置文件；文件不存在时返回默认配置
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !fs::try_exists(path).await? {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path).await?;
        Ok(toml::from_str(&text)?)
    }

    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(self)?;
        fs::write(path, toml_string).await?;
        Ok(())
    }

    /// 为缺失的插件配置补全默认值，返回是否发生了变更
    pub fn fill_plugin_defaults<'a, I>(&mut self, defaults: I) -> bool
    where
        I: IntoIterator<Item = (&'a str, Value)>,
    {
        let mut changed = false;
        for (name, value) in defaults {
            if !self.plugins.contains_key(name) {
                self.plugins.insert(name.to_string(), value);
                changed = true;
            }
        }
        changed
    }

    /// 插件是否启用（缺失 enabled 字段视为禁用）
    pub fn is_enabled(&self, plugin_name: &str) -> bool {
        self.plugins
            .get(plugin_name)
            .and_then(|v| v.get("enabled"))
            .and_then(|x| x.as_bool())
            .unwrap_or(false)
    }
}

fn default_bots() -> Vec<BotConfig> {
    vec![
        // 控制台适配器：本地调试用
        BotConfig {
            enabled: true,
            protocol: "console".to_string(),
            url: None,
            access_token: None,
        },
        // OneBot 适配器：生成配置占位符，默认禁用以防误连
        BotConfig {
            enabled: false,
            protocol: "onebot".to_string(),
            url: Some("ws://127.0.0.1:3001".to_string()),
            access_token: Some("YOUR_TOKEN_HERE".to_string()),
        },
    ]
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BotConfig {
    // 是否启用此 Bot
    #[serde(default = "default_true")]
    pub enabled: bool,

    // 协议类型 ("onebot" / "console")
    #[serde(default = "default_protocol")]
    pub protocol: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_protocol() -> String {
    "onebot".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bots: default_bots(),
            plugins: HashMap::new(),
        }
    }
}

/// 辅助函数：构建默认配置 Value，并确保包含 enabled 字段
pub fn build_config<T: Serialize>(data: T) -> Value {
    let mut val = Value::try_from(data).unwrap_or(Value::Table(Default::default()));
    if let Value::Table(ref mut map) = val
        && !map.contains_key("enabled")
    {
        map.insert("enabled".to_string(), Value::Boolean(true));
    }
    val
}
