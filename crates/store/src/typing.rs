use domain::IngestEvent;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::debug;

// 远端用户输入状态。本地用户不会进入这里 (由 dispatcher 过滤)
#[derive(Clone)]
pub struct TypingTracker {
    inner: Arc<Mutex<TypingInner>>,
    ttl: Duration,
    tx_ingest: broadcast::Sender<IngestEvent>,
}

#[derive(Default)]
struct TypingInner {
    // (resource_id, user_id) -> 活跃条目
    entries: HashMap<(String, String), TypingEntry>,
    next_generation: u64,
}

struct TypingEntry {
    user_name: String,
    generation: u64,
    expiry: JoinHandle<()>,
}

fn active_names(inner: &TypingInner, resource_id: &str) -> Vec<String> {
    let mut names: Vec<String> = inner
        .entries
        .iter()
        .filter(|((rid, _), _)| rid == resource_id)
        .map(|(_, entry)| entry.user_name.clone())
        .collect();
    names.sort();
    names.dedup();
    names
}

impl TypingTracker {
    pub fn new(ttl: Duration, tx_ingest: broadcast::Sender<IngestEvent>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(TypingInner::default())),
            ttl,
            tx_ingest,
        }
    }

    // typing=true 时 (重新)武装过期定时器；typing=false 立即移除并取消定时器。
    // generation 防止被替换掉的旧定时器误删刷新后的条目
    pub async fn apply(&self, resource_id: &str, user_id: &str, user_name: &str, is_typing: bool) {
        let key = (resource_id.to_string(), user_id.to_string());
        let mut inner = self.inner.lock().await;
        let before = active_names(&inner, resource_id);

        if let Some(prev) = inner.entries.remove(&key) {
            prev.expiry.abort();
        }

        if is_typing {
            let generation = inner.next_generation;
            inner.next_generation += 1;

            let tracker = self.clone();
            let rid = key.0.clone();
            let uid = key.1.clone();
            let ttl = self.ttl;
            let expiry = tokio::spawn(async move {
                tokio::time::sleep(ttl).await;
                tracker.expire(&rid, &uid, generation).await;
            });

            inner.entries.insert(
                key,
                TypingEntry {
                    user_name: user_name.to_string(),
                    generation,
                    expiry,
                },
            );
        }

        let after = active_names(&inner, resource_id);
        drop(inner);

        if before != after {
            let _ = self.tx_ingest.send(IngestEvent::TypingChanged {
                resource_id: resource_id.to_string(),
                active: after,
            });
        }
    }

    async fn expire(&self, resource_id: &str, user_id: &str, generation: u64) {
        let key = (resource_id.to_string(), user_id.to_string());
        let mut inner = self.inner.lock().await;

        let current = inner.entries.get(&key).map(|e| e.generation);
        if current != Some(generation) {
            return; // 已被刷新或显式移除
        }
        inner.entries.remove(&key);
        debug!("Typing expired: {} @ {}", user_id, resource_id);

        let active = active_names(&inner, resource_id);
        drop(inner);

        let _ = self.tx_ingest.send(IngestEvent::TypingChanged {
            resource_id: resource_id.to_string(),
            active,
        });
    }

    pub async fn active(&self, resource_id: &str) -> Vec<String> {
        let inner = self.inner.lock().await;
        active_names(&inner, resource_id)
    }

    // disconnect() 路径：取消全部挂起定时器，防止僵尸回调
    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        let mut resources: Vec<String> = inner.entries.keys().map(|(rid, _)| rid.clone()).collect();
        resources.sort();
        resources.dedup();

        for (_, entry) in inner.entries.drain() {
            entry.expiry.abort();
        }
        drop(inner);

        for resource_id in resources {
            let _ = self.tx_ingest.send(IngestEvent::TypingChanged {
                resource_id,
                active: Vec::new(),
            });
        }
    }
}
