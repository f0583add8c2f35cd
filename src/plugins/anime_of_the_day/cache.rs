use chrono::{Datelike, NaiveDate};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs;

/// 缓存键：`{年}-{月}-{日}`，月和日不补零
pub fn date_key(date: NaiveDate) -> String {
    format!("{}-{}-{}", date.year(), date.month(), date.day())
}

/// 按日期缓存渲染好的 PNG
#[derive(Debug, Clone)]
pub struct ImageCache {
    dir: PathBuf,
}

impl ImageCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("{}.png", date_key(date)))
    }

    /// 读取当天的缓存；文件不存在或为空视为未命中
    pub async fn read(&self, date: NaiveDate) -> Option<Vec<u8>> {
        match fs::read(self.path_for(date)).await {
            Ok(bytes) if !bytes.is_empty() => Some(bytes),
            _ => None,
        }
    }

    /// 写入当天的缓存。目录缺失时创建后重试一次
    pub async fn write(&self, date: NaiveDate, bytes: &[u8]) -> std::io::Result<PathBuf> {
        let path = self.path_for(date);
        match write_atomic(&path, bytes).await {
            Err(e) if e.kind() == ErrorKind::NotFound => {
                fs::create_dir_all(&self.dir).await?;
                write_atomic(&path, bytes).await?;
            }
            other => other?,
        }
        Ok(path)
    }
}

fn temp_suffix() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    format!("{}.{}", nanos, COUNTER.fetch_add(1, Ordering::Relaxed))
}

// 先写临时文件再改名，并发写入时读者只会看到完整的文件
async fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp_path = path.with_extension(format!("tmp.{}", temp_suffix()));

    if let Err(e) = fs::write(&tmp_path, bytes).await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(e);
    }

    if let Err(e) = fs::rename(&tmp_path, path).await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(e);
    }

    Ok(())
}
