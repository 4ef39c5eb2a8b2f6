use crate::Store;
use chrono::{DateTime, Utc};
use domain::Notification;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationBucket {
    Today,
    Yesterday,
    ThisWeek,
    ThisMonth,
    Earlier,
}

// 分桶只在读取时按日历天差推导，不落存储
fn bucket_of(created_at: DateTime<Utc>, now: DateTime<Utc>) -> NotificationBucket {
    let days = (now.date_naive() - created_at.date_naive()).num_days();
    match days {
        d if d <= 0 => NotificationBucket::Today,
        1 => NotificationBucket::Yesterday,
        d if d < 7 => NotificationBucket::ThisWeek,
        d if d < 30 => NotificationBucket::ThisMonth,
        _ => NotificationBucket::Earlier,
    }
}

impl Store {
    // 头插，保持最新在前
    pub async fn append_notification(&self, notification: Notification) {
        let mut list = self.notifications.write().await;
        list.insert(0, notification);
    }

    pub async fn mark_read(&self, id: &str) -> bool {
        let mut list = self.notifications.write().await;
        match list.iter_mut().find(|n| n.id == id) {
            Some(n) => {
                n.is_read = true;
                true
            }
            None => false,
        }
    }

    // 返回本次翻转的条数
    pub async fn mark_all_read(&self) -> usize {
        let mut list = self.notifications.write().await;
        let mut flipped = 0;
        for n in list.iter_mut() {
            if !n.is_read {
                n.is_read = true;
                flipped += 1;
            }
        }
        flipped
    }

    pub async fn unread_count(&self) -> usize {
        let list = self.notifications.read().await;
        list.iter().filter(|n| !n.is_read).count()
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        let list = self.notifications.read().await;
        list.clone()
    }

    pub async fn grouped_notifications(
        &self,
        now: DateTime<Utc>,
    ) -> Vec<(NotificationBucket, Vec<Notification>)> {
        let list = self.notifications.read().await;
        let order = [
            NotificationBucket::Today,
            NotificationBucket::Yesterday,
            NotificationBucket::ThisWeek,
            NotificationBucket::ThisMonth,
            NotificationBucket::Earlier,
        ];

        let mut grouped = Vec::new();
        for bucket in order {
            let entries: Vec<Notification> = list
                .iter()
                .filter(|n| bucket_of(n.created_at, now) == bucket)
                .cloned()
                .collect();
            if !entries.is_empty() {
                grouped.push((bucket, entries));
            }
        }
        grouped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use domain::{NotificationKind, ResourceType};
    use std::time::Duration;
    use tokio::sync::broadcast;

    fn test_store() -> Store {
        let (tx, _rx) = broadcast::channel(16);
        Store::new(Duration::from_secs(3), tx)
    }

    fn notification(id: &str, is_read: bool, created_at: DateTime<Utc>) -> Notification {
        Notification {
            id: id.to_string(),
            kind: NotificationKind::Mention,
            comment_id: format!("c-{id}"),
            resource_type: ResourceType::new_unchecked("task".to_string()),
            resource_id: "task-1".to_string(),
            from_user_id: "user-b".to_string(),
            from_user_name: "Bob".to_string(),
            to_user_id: "user-a".to_string(),
            message: "Bob mentioned you".to_string(),
            is_read,
            created_at,
        }
    }

    #[tokio::test]
    async fn append_keeps_newest_first() {
        let store = test_store();
        let now = Utc::now();
        store.append_notification(notification("n1", false, now - ChronoDuration::minutes(5))).await;
        store.append_notification(notification("n2", false, now)).await;

        let list = store.notifications().await;
        assert_eq!(list[0].id, "n2");
        assert_eq!(list[1].id, "n1");
    }

    #[tokio::test]
    async fn mark_read_flips_single_entry() {
        let store = test_store();
        store.append_notification(notification("n1", false, Utc::now())).await;

        assert_eq!(store.unread_count().await, 1);
        assert!(store.mark_read("n1").await);
        assert!(!store.mark_read("missing").await);
        assert_eq!(store.unread_count().await, 0);
    }

    // 场景：12 条通知 5 条未读，mark_all_read 后未读数归零
    #[tokio::test]
    async fn mark_all_read_clears_unread_count() {
        let store = test_store();
        let now = Utc::now();
        for i in 0..12 {
            store
                .append_notification(notification(&format!("n{i}"), i >= 5, now))
                .await;
        }

        assert_eq!(store.unread_count().await, 5);
        assert_eq!(store.mark_all_read().await, 5);
        assert_eq!(store.unread_count().await, 0);
        assert!(store.notifications().await.iter().all(|n| n.is_read));
    }

    #[tokio::test]
    async fn grouping_uses_calendar_day_distance() {
        let store = test_store();
        let now = Utc::now();
        store.append_notification(notification("today", false, now)).await;
        store
            .append_notification(notification("yesterday", false, now - ChronoDuration::days(1)))
            .await;
        store
            .append_notification(notification("week", false, now - ChronoDuration::days(3)))
            .await;
        store
            .append_notification(notification("month", false, now - ChronoDuration::days(12)))
            .await;
        store
            .append_notification(notification("earlier", false, now - ChronoDuration::days(45)))
            .await;

        let grouped = store.grouped_notifications(now).await;
        let buckets: Vec<NotificationBucket> = grouped.iter().map(|(b, _)| *b).collect();
        assert_eq!(
            buckets,
            vec![
                NotificationBucket::Today,
                NotificationBucket::Yesterday,
                NotificationBucket::ThisWeek,
                NotificationBucket::ThisMonth,
                NotificationBucket::Earlier,
            ]
        );
        for (_, entries) in &grouped {
            assert_eq!(entries.len(), 1);
        }
    }

    #[tokio::test]
    async fn grouping_omits_empty_buckets() {
        let store = test_store();
        store.append_notification(notification("today", false, Utc::now())).await;

        let grouped = store.grouped_notifications(Utc::now()).await;
        assert_eq!(grouped.len(), 1);
        assert_eq!(grouped[0].0, NotificationBucket::Today);
    }
}
