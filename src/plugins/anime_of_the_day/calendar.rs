use futures_util::future::BoxFuture;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use thiserror::Error;

pub const DEFAULT_API_URL: &str = "https://api.bgm.tv/calendar";
const USER_AGENT: &str = concat!("anime-of-the-day/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum CalendarError {
    #[error("HTTP 请求失败: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API 返回错误 (status={status_code}): {message}")]
    Api { status_code: u16, message: String },

    #[error("JSON 解析失败 ({path}): {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("放送表缺少第 {slot} 天 (共 {len} 天)")]
    MissingDay { slot: usize, len: usize },
}

// ================= Models =================

/// 星期标签 (id: 1=周一 ... 7=周日)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Weekday {
    #[serde(default)]
    pub id: i32,
    #[serde(default)]
    pub en: String,
    pub cn: String,
    #[serde(default)]
    pub ja: String,
}

/// 一天的放送表
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CalendarDay {
    pub weekday: Weekday,
    #[serde(default)]
    pub items: Vec<AnimeItem>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Images {
    #[serde(default)]
    pub large: Option<String>,
    #[serde(default)]
    pub common: Option<String>,
    #[serde(default)]
    pub medium: Option<String>,
    #[serde(default)]
    pub small: Option<String>,
    #[serde(default)]
    pub grid: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Rating {
    pub score: f64,
    #[serde(default)]
    pub total: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnimeItem {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub name_cn: Option<String>,
    #[serde(default)]
    pub images: Option<Images>,
    #[serde(default)]
    pub air_date: Option<String>,
    #[serde(default)]
    pub rating: Option<Rating>,
}

impl AnimeItem {
    /// 显示标题：优先中文名，空则回退到原名
    pub fn title(&self) -> &str {
        self.name_cn
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.name)
    }

    /// 封面地址，按 large > common > medium > small > grid 取第一个非空值
    pub fn cover_url(&self) -> Option<&str> {
        let images = self.images.as_ref()?;
        [
            &images.large,
            &images.common,
            &images.medium,
            &images.small,
            &images.grid,
        ]
        .into_iter()
        .filter_map(|s| s.as_deref())
        .find(|s| !s.is_empty())
    }

    pub fn air_date(&self) -> &str {
        self.air_date.as_deref().unwrap_or("")
    }

    pub fn score(&self) -> Option<f64> {
        self.rating.as_ref().map(|r| r.score)
    }
}

/// 将以周日为 0 的星期序号映射到以周一开头的 7 天数组下标
pub fn weekday_slot(sunday_first_index: u32) -> usize {
    match sunday_first_index % 7 {
        0 => 6,
        n => (n - 1) as usize,
    }
}

/// 从一周放送表中取出指定星期的那一天
pub fn pick_day(days: &[CalendarDay], sunday_first_index: u32) -> Result<&CalendarDay, CalendarError> {
    let slot = weekday_slot(sunday_first_index);
    days.get(slot).ok_or(CalendarError::MissingDay {
        slot,
        len: days.len(),
    })
}

// ================= Client =================

/// 放送表数据源
pub trait CalendarSource: Send + Sync {
    fn fetch_calendar(&self) -> BoxFuture<'_, Result<Vec<CalendarDay>, CalendarError>>;
}

/// bgm.tv 放送表客户端
pub struct BgmtvClient {
    client: Client,
    url: String,
}

static HTTP_CLIENT: OnceLock<Client> = OnceLock::new();

impl BgmtvClient {
    pub fn with_client(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    /// 使用进程内共享的 reqwest Client
    pub fn shared(url: impl Into<String>) -> Self {
        Self::with_client(HTTP_CLIENT.get_or_init(Client::new).clone(), url)
    }

    /// GET /calendar
    pub async fn get_calendar(&self) -> Result<Vec<CalendarDay>, CalendarError> {
        let response = self
            .client
            .get(&self.url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        decode_body(status, &body)
    }
}

impl CalendarSource for BgmtvClient {
    fn fetch_calendar(&self) -> BoxFuture<'_, Result<Vec<CalendarDay>, CalendarError>> {
        Box::pin(self.get_calendar())
    }
}

fn decode_body(status: StatusCode, body: &str) -> Result<Vec<CalendarDay>, CalendarError> {
    if !status.is_success() {
        return Err(CalendarError::Api {
            status_code: status.as_u16(),
            message: body.to_string(),
        });
    }
    let deserializer = &mut serde_json::Deserializer::from_str(body);
    serde_path_to_error::deserialize(deserializer).map_err(|e| CalendarError::Json {
        path: e.path().to_string(),
        source: e.into_inner(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"[
      {
        "weekday": { "en": "Mon", "cn": "星期一", "ja": "月耀日", "id": 1 },
        "items": [
          {
            "id": 400602,
            "url": "http://bgm.tv/subject/400602",
            "type": 2,
            "name": "葬送のフリーレン",
            "name_cn": "葬送的芙莉莲",
            "summary": "",
            "air_date": "2023-09-29",
            "air_weekday": 1,
            "rating": { "total": 100, "count": {}, "score": 9.1 },
            "rank": 1,
            "images": {
              "large": "https://lain.bgm.tv/pic/cover/l/13/c5/400602.jpg",
              "common": "https://lain.bgm.tv/pic/cover/c/13/c5/400602.jpg",
              "medium": "", "small": "", "grid": ""
            }
          },
          {
            "id": 1,
            "name": "Untitled",
            "name_cn": "",
            "air_date": "",
            "images": null
          }
        ]
      }
    ]"#;

    #[test]
    fn weekday_slot_reindexes_to_monday_first() {
        assert_eq!(weekday_slot(0), 6);
        for i in 1..=6 {
            assert_eq!(weekday_slot(i), (i - 1) as usize);
        }
        for i in 0..100 {
            assert!(weekday_slot(i) <= 6);
        }
    }

    #[test]
    fn decodes_bgmtv_calendar() {
        let days = decode_body(StatusCode::OK, SAMPLE).unwrap();
        assert_eq!(days.len(), 1);
        assert_eq!(days[0].weekday.cn, "星期一");

        let first = &days[0].items[0];
        assert_eq!(first.title(), "葬送的芙莉莲");
        assert_eq!(first.score(), Some(9.1));
        assert_eq!(
            first.cover_url(),
            Some("https://lain.bgm.tv/pic/cover/l/13/c5/400602.jpg")
        );

        let second = &days[0].items[1];
        assert_eq!(second.title(), "Untitled");
        assert_eq!(second.score(), None);
        assert_eq!(second.cover_url(), None);
        assert_eq!(second.air_date(), "");
    }

    #[test]
    fn non_success_status_is_an_api_error() {
        let err = decode_body(StatusCode::SERVICE_UNAVAILABLE, "busy").unwrap_err();
        match err {
            CalendarError::Api {
                status_code,
                message,
            } => {
                assert_eq!(status_code, 503);
                assert_eq!(message, "busy");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn malformed_payload_reports_json_path() {
        let body = r#"[{ "weekday": { "cn": "星期一" }, "items": [{ "name": 42 }] }]"#;
        match decode_body(StatusCode::OK, body).unwrap_err() {
            CalendarError::Json { path, .. } => assert_eq!(path, "[0].items[0].name"),
            other => panic!("unexpected error: {other}"),
        }
    }

    /// 在本地端口上应答一次 HTTP 请求，返回地址和收到的请求头
    async fn serve_once(
        status: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/calendar", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }

            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            String::from_utf8_lossy(&request).into_owned()
        });

        (url, handle)
    }

    fn local_client(url: String) -> BgmtvClient {
        BgmtvClient::with_client(Client::builder().no_proxy().build().unwrap(), url)
    }

    #[tokio::test]
    async fn client_sends_user_agent_and_decodes() {
        let (url, server) = serve_once("200 OK", SAMPLE).await;

        let days = local_client(url).fetch_calendar().await.unwrap();
        assert_eq!(days.len(), 1);
        assert_eq!(days[0].items[0].title(), "葬送的芙莉莲");

        let request = server.await.unwrap().to_ascii_lowercase();
        assert!(request.starts_with("get /calendar "), "{request}");
        assert!(
            request.contains(&format!("user-agent: {}", USER_AGENT.to_ascii_lowercase())),
            "{request}"
        );
    }

    #[tokio::test]
    async fn client_reports_server_errors() {
        let (url, server) = serve_once("503 Service Unavailable", "busy").await;

        match local_client(url).get_calendar().await.unwrap_err() {
            CalendarError::Api {
                status_code,
                message,
            } => {
                assert_eq!(status_code, 503);
                assert_eq!(message, "busy");
            }
            other => panic!("unexpected error: {other}"),
        }
        server.await.unwrap();
    }

    #[test]
    fn short_calendar_is_missing_a_day() {
        let days = vec![CalendarDay::default(); 3];
        assert!(pick_day(&days, 3).is_ok());
        assert!(matches!(
            pick_day(&days, 0),
            Err(CalendarError::MissingDay { slot: 6, len: 3 })
        ));
    }
}
