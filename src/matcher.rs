use crate::event::Event;
use simd_json::derived::ValueObjectAccessAsScalar;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::oneshot;

/// API 响应匹配器：按 echo 将 OneBot 的动作响应交还给发起请求的任务
pub struct Matcher {
    waiters: Mutex<Vec<Waiter>>,
}

struct Waiter {
    echo: String,
    sender: oneshot::Sender<Event>,
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Matcher {
    pub fn new() -> Self {
        Self {
            waiters: Mutex::new(Vec::new()),
        }
    }

    fn waiters(&self) -> MutexGuard<'_, Vec<Waiter>> {
        self.waiters.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 登记一个响应等待者。必须在请求发出之前调用
    pub fn register(&self, echo: String) -> oneshot::Receiver<Event> {
        let (tx, rx) = oneshot::channel();
        self.waiters().push(Waiter { echo, sender: tx });
        rx
    }

    /// 等待已登记的响应，超时返回 None 并清理等待者
    pub async fn wait_resp(
        &self,
        echo: &str,
        rx: oneshot::Receiver<Event>,
        timeout_duration: Duration,
    ) -> Option<Event> {
        match tokio::time::timeout(timeout_duration, rx).await {
            Ok(Ok(event)) => Some(event),
            _ => {
                self.waiters().retain(|w| w.echo != echo);
                None
            }
        }
    }

    /// 尝试分发事件给等待者。如果事件被消费（匹配成功），返回 None；否则返回原事件。
    pub fn dispatch(&self, event: Event) -> Option<Event> {
        let Some(echo) = event.get_str("echo") else {
            return Some(event);
        };

        let waiter = {
            let mut guard = self.waiters();
            match guard.iter().position(|w| w.echo == echo) {
                Some(idx) => guard.remove(idx),
                None => return Some(event),
            }
        };
        // 忽略错误（等待者可能已超时）
        let _ = waiter.sender.send(event);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simd_json::json;

    #[test]
    fn plain_messages_pass_through() {
        let matcher = Matcher::new();
        let event: Event = json!({ "post_type": "message", "raw_message": "今日番剧" });
        assert!(matcher.dispatch(event).is_some());
    }

    #[tokio::test]
    async fn immediate_response_reaches_waiter() {
        let matcher = Matcher::new();
        let rx = matcher.register("api-req-9".into());

        // 响应在开始等待之前就已到达
        let resp: Event = json!({ "echo": "api-req-9", "retcode": 0 });
        assert!(matcher.dispatch(resp).is_none());

        let got = matcher
            .wait_resp("api-req-9", rx, Duration::from_millis(200))
            .await
            .unwrap();
        assert_eq!(got.get_str("echo"), Some("api-req-9"));
    }

    #[tokio::test]
    async fn timeout_removes_waiter() {
        let matcher = Matcher::new();
        let rx = matcher.register("api-req-1".into());
        assert!(
            matcher
                .wait_resp("api-req-1", rx, Duration::from_millis(10))
                .await
                .is_none()
        );

        let late: Event = json!({ "echo": "api-req-1" });
        assert!(matcher.dispatch(late).is_some());
    }

    #[test]
    fn unknown_echo_is_returned() {
        let matcher = Matcher::new();
        let _rx = matcher.register("api-req-2".into());
        let resp: Event = json!({ "echo": "nobody" });
        assert!(matcher.dispatch(resp).is_some());
    }
}
