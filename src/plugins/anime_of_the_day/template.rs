use super::calendar::{AnimeItem, CalendarDay};
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::OnceLock;

/// 截图时定位的根容器
pub const ROOT_SELECTOR: &str = "#main";

const BACKGROUND: &str = "#eee";

// 模板只使用内联样式：样式表里的花括号会被当成占位符
const PAGE_TEMPLATE: &str = r#"<!DOCTYPE html><html><head><meta charset="utf-8"></head><body style="margin:0;background:{background};"><div id="main" style="width:{width}px;padding-bottom:10px;background:{background};font-family:sans-serif;">{content}</div></body></html>"#;

const HEADER_TEMPLATE: &str = r#"<h1 style="display:inline-block;margin:10px 0 0 10px;">每日放送</h1><h2 style="display:inline-block;margin:10px 0 0 14px;">{date} {weekday}</h2>"#;

const CARD_TEMPLATE: &str = r#"<div style="display:flex;border-radius:20px;margin:14px 10px 0 10px;background:white;box-shadow:0 0 0 1px rgba(0, 0, 0, 0.1), 0 2px 4px rgba(0, 0, 0, 0.1);padding:10px;"><div style="margin-right:14px;">{cover}</div><div><h2 style="margin:0;">{title}</h2><div style="color:#666;font-size:12px;">{name}</div><div>{air_date}</div>{rating}</div></div>"#;

const COVER_TEMPLATE: &str = r#"<img src="{src}" style="height:100px;border-radius:10px;">"#;

const RATING_TEMPLATE: &str = "<div><b>Bangumi</b>评分：{score}</div>";

static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();

/// 将模板中的 `{key}` 替换为 data 中对应的值；缺失的键替换为空串
///
/// ```ignore
/// let data = HashMap::from([("name", "Alice".to_string())]);
/// assert_eq!(templater("Hello, {name}!", &data), "Hello, Alice!");
/// ```
pub fn templater(template: &str, data: &HashMap<&str, String>) -> String {
    let re = PLACEHOLDER.get_or_init(|| Regex::new(r"\{(.*?)\}").expect("Invalid Regex"));
    re.replace_all(template, |caps: &Captures| {
        data.get(&caps[1]).cloned().unwrap_or_default()
    })
    .into_owned()
}

pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn render_header(date_key: &str, day: &CalendarDay) -> String {
    templater(
        HEADER_TEMPLATE,
        &HashMap::from([
            ("date", escape_html(date_key)),
            ("weekday", escape_html(&day.weekday.cn)),
        ]),
    )
}

fn render_card(item: &AnimeItem) -> String {
    let cover = item
        .cover_url()
        .map(|src| templater(COVER_TEMPLATE, &HashMap::from([("src", escape_html(src))])))
        .unwrap_or_default();

    let rating = item
        .score()
        .map(|score| templater(RATING_TEMPLATE, &HashMap::from([("score", score.to_string())])))
        .unwrap_or_default();

    templater(
        CARD_TEMPLATE,
        &HashMap::from([
            ("cover", cover),
            ("title", escape_html(item.title())),
            ("name", escape_html(&item.name)),
            ("air_date", escape_html(item.air_date())),
            ("rating", rating),
        ]),
    )
}

/// 生成当天放送表的完整页面
pub fn render_page(date_key: &str, day: &CalendarDay, width: u32) -> String {
    let mut content = render_header(date_key, day);
    for item in &day.items {
        content.push_str(&render_card(item));
    }

    templater(
        PAGE_TEMPLATE,
        &HashMap::from([
            ("background", BACKGROUND.to_string()),
            ("width", width.to_string()),
            ("content", content),
        ]),
    )
}
