use base64::{Engine as _, engine::general_purpose};
use serde::Serialize;
use simd_json::owned::{Object, Value};

/// 消息段 (Segment)
#[derive(Debug, Serialize, Clone)]
pub struct Segment {
    #[serde(rename = "type")]
    pub type_: String,
    pub data: Object,
}

impl Segment {
    pub fn new(type_: &str, data: Object) -> Self {
        Self {
            type_: type_.to_string(),
            data,
        }
    }
}

/// 消息链 (Message Chain)
#[derive(Debug, Serialize, Clone, Default)]
pub struct Message(Vec<Segment>);

impl Message {
    pub fn new() -> Self {
        Self::default()
    }

    /// 通用添加方法：手动构建 Segment
    pub fn add(mut self, type_: &str, data: Object) -> Self {
        self.0.push(Segment::new(type_, data));
        self
    }

    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    /// 纯文本
    pub fn text(self, text: impl Into<String>) -> Self {
        let mut data = Object::new();
        data.insert("text".into(), Value::from(text.into()));
        self.add("text", data)
    }

    /// 图片
    /// - `file`: 图片文件名、URL、Base64 或文件路径
    pub fn image(self, file: impl Into<String>) -> Self {
        let mut data = Object::new();
        data.insert("file".into(), Value::from(file.into()));
        self.add("image", data)
    }

    /// 以 base64:// 形式内联发送的图片
    pub fn image_bytes(self, bytes: &[u8]) -> Self {
        self.image(format!("base64://{}", general_purpose::STANDARD.encode(bytes)))
    }

}

// 允许直接从字符串转换为纯文本消息
impl From<&str> for Message {
    fn from(s: &str) -> Self {
        Message::new().text(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simd_json::prelude::ValueAsScalar;

    #[test]
    fn image_bytes_inlines_base64() {
        let msg = Message::new().text("今日番剧").image_bytes(b"\x89PNG");
        let segs = msg.segments();
        assert_eq!(segs.len(), 2);
        assert_eq!(segs[0].type_, "text");
        assert_eq!(segs[1].type_, "image");
        assert_eq!(
            segs[1].data.get("file").and_then(|v| v.as_str()),
            Some("base64://iVBORw==")
        );
    }

    #[test]
    fn serializes_as_onebot_chain() {
        let msg: Message = "正在获取今日番剧数据，请稍后...".into();
        let mut bytes = simd_json::to_vec(&msg).unwrap();
        let value = simd_json::to_owned_value(&mut bytes).unwrap();
        assert_eq!(value[0]["type"].as_str(), Some("text"));
        assert_eq!(
            value[0]["data"]["text"].as_str(),
            Some("正在获取今日番剧数据，请稍后...")
        );
    }
}
