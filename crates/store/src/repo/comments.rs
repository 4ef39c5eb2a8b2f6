use crate::Store;
use chrono::Utc;
use domain::{Comment, CommentUpdate, Reaction};
use tracing::debug;

// 软删除墓碑：保留 ID 以维持评论树结构，但清空内容
pub const TOMBSTONE: &str = "[deleted]";

impl Store {
    // 写入评论并维持桶内 created_at 升序
    pub async fn append_comment(&self, comment: Comment) {
        let mut map = self.comments.write().await;
        let bucket = map.entry(comment.resource_id.clone()).or_default();
        bucket.push(comment);
        bucket.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    }

    // 返回 false 表示目标评论不在任何桶里 (调用方需要能区分"已应用"和"没找到")
    pub async fn update_comment(&self, comment_id: &str, updates: &CommentUpdate) -> bool {
        let mut map = self.comments.write().await;
        let target = map
            .values_mut()
            .flat_map(|bucket| bucket.iter_mut())
            .find(|c| c.id == comment_id);

        match target {
            Some(c) => {
                if let Some(ref content) = updates.content {
                    c.content = content.clone();
                }
                if let Some(ref mentions) = updates.mentions {
                    c.mentions = mentions.clone();
                }
                if let Some(ref attachments) = updates.attachments {
                    c.attachments = attachments.clone();
                }
                if let Some(is_pinned) = updates.is_pinned {
                    c.is_pinned = is_pinned;
                }
                c.is_edited = true;
                c.updated_at = Utc::now();
                true
            }
            None => {
                debug!("Update target not found: {}", comment_id);
                false
            }
        }
    }

    // 幂等：重复删除不再改变状态。返回所属 resource_id
    pub async fn soft_delete_comment(&self, comment_id: &str) -> Option<String> {
        let mut map = self.comments.write().await;
        for (resource_id, bucket) in map.iter_mut() {
            if let Some(c) = bucket.iter_mut().find(|c| c.id == comment_id) {
                c.is_deleted = true;
                c.content = TOMBSTONE.to_string();
                return Some(resource_id.clone());
            }
        }
        debug!("Delete target not found: {}", comment_id);
        None
    }

    pub async fn toggle_pin(&self, comment_id: &str) -> bool {
        let mut map = self.comments.write().await;
        let target = map
            .values_mut()
            .flat_map(|bucket| bucket.iter_mut())
            .find(|c| c.id == comment_id);

        match target {
            Some(c) => {
                c.is_pinned = !c.is_pinned;
                true
            }
            None => false,
        }
    }

    // 同一用户的新表态替换旧表态 (每评论每用户至多一条)
    pub async fn upsert_reaction(&self, comment_id: &str, reaction: Reaction) -> bool {
        let mut map = self.comments.write().await;
        let target = map
            .values_mut()
            .flat_map(|bucket| bucket.iter_mut())
            .find(|c| c.id == comment_id);

        match target {
            Some(c) => {
                c.reactions.retain(|r| r.user_id != reaction.user_id);
                c.reactions.push(reaction);
                true
            }
            None => false,
        }
    }

    pub async fn remove_reaction(&self, comment_id: &str, user_id: &str) -> bool {
        let mut map = self.comments.write().await;
        let target = map
            .values_mut()
            .flat_map(|bucket| bucket.iter_mut())
            .find(|c| c.id == comment_id);

        match target {
            Some(c) => {
                c.reactions.retain(|r| r.user_id != user_id);
                true
            }
            None => false,
        }
    }

    pub async fn get_comment(&self, comment_id: &str) -> Option<Comment> {
        let map = self.comments.read().await;
        map.values()
            .flat_map(|bucket| bucket.iter())
            .find(|c| c.id == comment_id)
            .cloned()
    }

    pub async fn comments(&self, resource_id: &str) -> Vec<Comment> {
        let map = self.comments.read().await;
        map.get(resource_id).cloned().unwrap_or_default()
    }

    pub async fn comment_count(&self, resource_id: &str) -> usize {
        let map = self.comments.read().await;
        map.get(resource_id).map(|b| b.len()).unwrap_or(0)
    }

    // 顶层评论：无父指针且未删除。回复层级在读取时按父指针重建
    pub async fn top_level_comments(&self, resource_id: &str) -> Vec<Comment> {
        let map = self.comments.read().await;
        map.get(resource_id)
            .map(|bucket| {
                bucket
                    .iter()
                    .filter(|c| c.parent_id.is_none() && !c.is_deleted)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn replies_of(&self, resource_id: &str, parent_id: &str) -> Vec<Comment> {
        let map = self.comments.read().await;
        map.get(resource_id)
            .map(|bucket| {
                bucket
                    .iter()
                    .filter(|c| c.parent_id.as_deref() == Some(parent_id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn pinned_comments(&self, resource_id: &str) -> Vec<Comment> {
        let map = self.comments.read().await;
        map.get(resource_id)
            .map(|bucket| {
                bucket
                    .iter()
                    .filter(|c| c.is_pinned && !c.is_deleted)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration as ChronoDuration, Utc};
    use domain::ResourceType;
    use std::time::Duration;
    use tokio::sync::broadcast;

    fn test_store() -> Store {
        let (tx, _rx) = broadcast::channel(16);
        Store::new(Duration::from_secs(3), tx)
    }

    fn comment_at(id: &str, resource_id: &str, author_id: &str, content: &str, at: DateTime<Utc>) -> Comment {
        Comment {
            id: id.to_string(),
            content: content.to_string(),
            author_id: author_id.to_string(),
            author_name: format!("user {author_id}"),
            author_avatar: None,
            resource_type: ResourceType::new_unchecked("task".to_string()),
            resource_id: resource_id.to_string(),
            parent_id: None,
            mentions: Vec::new(),
            attachments: Vec::new(),
            reactions: Vec::new(),
            is_edited: false,
            is_pinned: false,
            is_deleted: false,
            created_at: at,
            updated_at: at,
        }
    }

    fn comment(id: &str, resource_id: &str, author_id: &str, content: &str) -> Comment {
        comment_at(id, resource_id, author_id, content, Utc::now())
    }

    fn reaction(user_id: &str, kind: &str) -> Reaction {
        Reaction {
            user_id: user_id.to_string(),
            kind: kind.to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn append_keeps_bucket_sorted_by_created_at() {
        let store = test_store();
        let base = Utc::now();
        store.append_comment(comment_at("c2", "task-1", "a", "second", base)).await;
        store
            .append_comment(comment_at("c1", "task-1", "a", "first", base - ChronoDuration::seconds(10)))
            .await;

        let list = store.comments("task-1").await;
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id, "c1");
        assert_eq!(list[1].id, "c2");
    }

    #[tokio::test]
    async fn top_level_excludes_replies_and_deleted() {
        let store = test_store();
        store.append_comment(comment("root", "task-1", "a", "root")).await;
        let mut reply = comment("reply", "task-1", "b", "reply");
        reply.parent_id = Some("root".to_string());
        store.append_comment(reply).await;
        store.append_comment(comment("gone", "task-1", "a", "bye")).await;
        store.soft_delete_comment("gone").await;

        let top = store.top_level_comments("task-1").await;
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].id, "root");
        assert!(top.iter().all(|c| c.parent_id.is_none()));
    }

    #[tokio::test]
    async fn replies_of_returns_children_only() {
        let store = test_store();
        store.append_comment(comment("root", "task-1", "a", "root")).await;
        let mut r1 = comment("r1", "task-1", "b", "one");
        r1.parent_id = Some("root".to_string());
        let mut r2 = comment("r2", "task-1", "c", "two");
        r2.parent_id = Some("other".to_string());
        store.append_comment(r1).await;
        store.append_comment(r2).await;

        let replies = store.replies_of("task-1", "root").await;
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].id, "r1");
    }

    #[tokio::test]
    async fn same_user_reaction_is_replaced() {
        let store = test_store();
        store.append_comment(comment("c1", "task-1", "a", "hello")).await;

        assert!(store.upsert_reaction("c1", reaction("user-a", "👍")).await);
        assert!(store.upsert_reaction("c1", reaction("user-a", "❤️")).await);

        let list = store.comments("task-1").await;
        assert_eq!(list[0].reactions.len(), 1);
        assert_eq!(list[0].reactions[0].kind, "❤️");
    }

    #[tokio::test]
    async fn reactions_from_different_users_coexist() {
        let store = test_store();
        store.append_comment(comment("c1", "task-1", "a", "hello")).await;

        store.upsert_reaction("c1", reaction("user-a", "👍")).await;
        store.upsert_reaction("c1", reaction("user-b", "👍")).await;
        assert_eq!(store.comments("task-1").await[0].reactions.len(), 2);

        assert!(store.remove_reaction("c1", "user-a").await);
        let list = store.comments("task-1").await;
        assert_eq!(list[0].reactions.len(), 1);
        assert_eq!(list[0].reactions[0].user_id, "user-b");
    }

    #[tokio::test]
    async fn soft_delete_is_idempotent() {
        let store = test_store();
        store.append_comment(comment("c1", "task-1", "a", "hello")).await;

        assert_eq!(store.soft_delete_comment("c1").await.as_deref(), Some("task-1"));
        let first = store.comments("task-1").await;
        assert_eq!(store.soft_delete_comment("c1").await.as_deref(), Some("task-1"));
        let second = store.comments("task-1").await;

        assert!(second[0].is_deleted);
        assert_eq!(second[0].content, TOMBSTONE);
        assert_eq!(first[0].content, second[0].content);
        assert_eq!(first[0].is_deleted, second[0].is_deleted);
    }

    #[tokio::test]
    async fn toggle_pin_round_trips() {
        let store = test_store();
        store.append_comment(comment("c1", "task-1", "a", "hello")).await;

        assert!(store.toggle_pin("c1").await);
        assert!(store.comments("task-1").await[0].is_pinned);
        assert_eq!(store.pinned_comments("task-1").await.len(), 1);

        assert!(store.toggle_pin("c1").await);
        assert!(!store.comments("task-1").await[0].is_pinned);
        assert!(store.pinned_comments("task-1").await.is_empty());
    }

    #[tokio::test]
    async fn update_patches_fields_and_marks_edited() {
        let store = test_store();
        store.append_comment(comment("c1", "task-1", "a", "before")).await;

        let updates = CommentUpdate {
            content: Some("after".to_string()),
            mentions: Some(vec!["user-b".to_string()]),
            ..Default::default()
        };
        assert!(store.update_comment("c1", &updates).await);

        let c = &store.comments("task-1").await[0];
        assert_eq!(c.content, "after");
        assert_eq!(c.mentions, vec!["user-b".to_string()]);
        assert!(c.is_edited);
        assert!(c.updated_at >= c.created_at);
    }

    #[tokio::test]
    async fn mutations_on_unknown_id_report_not_found() {
        let store = test_store();
        assert!(!store.update_comment("ghost", &CommentUpdate::default()).await);
        assert!(store.soft_delete_comment("ghost").await.is_none());
        assert!(!store.toggle_pin("ghost").await);
        assert!(!store.upsert_reaction("ghost", reaction("a", "👍")).await);
        assert!(!store.remove_reaction("ghost", "a").await);
    }

    // 场景：A 在 task-1 发 "hello"，先 👍 后 ❤️
    #[tokio::test]
    async fn post_then_react_twice_scenario() {
        let store = test_store();
        store.append_comment(comment("c1", "task-1", "user-a", "hello")).await;

        assert_eq!(store.comment_count("task-1").await, 1);
        let top = store.top_level_comments("task-1").await;
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].content, "hello");

        store.upsert_reaction("c1", reaction("user-a", "👍")).await;
        assert_eq!(store.comments("task-1").await[0].reactions.len(), 1);

        store.upsert_reaction("c1", reaction("user-a", "❤️")).await;
        let reactions = &store.comments("task-1").await[0].reactions;
        assert_eq!(reactions.len(), 1);
        assert_eq!(reactions[0].kind, "❤️");
    }
}
