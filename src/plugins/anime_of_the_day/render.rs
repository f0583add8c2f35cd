use anyhow::{Context as _, Result, anyhow};
use base64::{Engine as _, engine::general_purpose};
use cdp_html_shot::{Browser, CaptureOptions, ImageFormat, Viewport};
use futures_util::future::BoxFuture;
use simd_json::base::ValueAsScalar;

/// 将 HTML 中的某个元素渲染为 PNG
pub trait Renderer: Send + Sync {
    fn render_png<'a>(&'a self, html: &'a str, selector: &'a str) -> BoxFuture<'a, Result<Vec<u8>>>;
}

/// 基于全局无头浏览器的渲染器
#[derive(Debug, Clone)]
pub struct CdpRenderer {
    pub width: u32,
    pub device_scale_factor: f64,
}

impl CdpRenderer {
    pub fn new(width: u32, device_scale_factor: f64) -> Self {
        Self {
            width,
            device_scale_factor,
        }
    }

    fn viewport(&self, height: u32) -> Viewport {
        Viewport::new(self.width, height).with_device_scale_factor(self.device_scale_factor)
    }

    async fn capture(&self, html: &str, selector: &str) -> Result<String> {
        let browser = Browser::instance().await;
        let tab = browser.new_tab().await?;

        // 无论截图成功与否都要关闭标签页
        let result = async {
            tab.set_viewport(&self.viewport(100)).await?;

            // set_content 会等待 load 事件，封面图片加载完成后才返回
            tab.set_content(html).await?;

            let height_js =
                "Math.max(document.body.scrollHeight, document.documentElement.scrollHeight)";
            let page_height = tab.evaluate(height_js).await?.as_f64().unwrap_or(800.0) as u32;

            let viewport = self.viewport(page_height.max(100));
            tab.set_viewport(&viewport).await?;

            let opts = CaptureOptions::new()
                .with_viewport(viewport)
                .with_format(ImageFormat::Png);

            let b64 = tab
                .find_element(selector)
                .await?
                .screenshot_with_options(opts)
                .await?;
            anyhow::Ok(b64)
        }
        .await;

        let _ = tab.close().await;
        result
    }
}

impl Renderer for CdpRenderer {
    fn render_png<'a>(&'a self, html: &'a str, selector: &'a str) -> BoxFuture<'a, Result<Vec<u8>>> {
        let renderer = self.clone();
        let html = html.to_string();
        let selector = selector.to_string();

        Box::pin(async move {
            // 浏览器启动失败会 panic，放进独立任务中隔离
            let b64 = tokio::spawn(async move { renderer.capture(&html, &selector).await })
                .await
                .map_err(|e| anyhow!("浏览器任务异常退出: {}", e))??;

            general_purpose::STANDARD
                .decode(b64.as_bytes())
                .context("截图数据不是合法的 Base64")
        })
    }
}
