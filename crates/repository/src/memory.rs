//! In-memory reference implementation of the repository traits.
//!
//! Backed by `parking_lot::RwLock` maps with clone-out reads. The brick and
//! quanta tables share one lock so cascade delete is a single critical
//! section — the only multi-row operation the core expects to be atomic.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use dl_domain::clock::{Clock, IdProvider, SystemClock, UuidIds};
use dl_domain::error::{Error, Result};
use dl_domain::model::{
    Brick, BrickPatch, NewBrick, NewQuanta, Quanta, QuantaPatch, StoredMessage,
};

use crate::traits::{
    BrickFilter, BrickRepository, MessageRepository, QuantaFilter, QuantaRepository,
};

#[derive(Default)]
struct Tables {
    bricks: HashMap<String, Brick>,
    quantas: HashMap<String, Quanta>,
}

/// Single-process store for all three repositories.
pub struct InMemoryStore {
    tables: RwLock<Tables>,
    messages: RwLock<HashMap<String, Vec<StoredMessage>>>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdProvider>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock), Arc::new(UuidIds))
    }
}

impl InMemoryStore {
    pub fn new(clock: Arc<dyn Clock>, ids: Arc<dyn IdProvider>) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            messages: RwLock::new(HashMap::new()),
            clock,
            ids,
        }
    }

    fn owned_brick<'a>(tables: &'a Tables, user_id: &str, brick_id: &str) -> Result<&'a Brick> {
        tables
            .bricks
            .get(brick_id)
            .filter(|b| b.user_id == user_id)
            .ok_or_else(|| Error::NotFound(format!("brick '{brick_id}'")))
    }

    /// A quanta is visible only through a brick the caller owns.
    fn owned_quanta<'a>(tables: &'a Tables, user_id: &str, quanta_id: &str) -> Result<&'a Quanta> {
        let quanta = tables
            .quantas
            .get(quanta_id)
            .ok_or_else(|| Error::NotFound(format!("quanta '{quanta_id}'")))?;
        Self::owned_brick(tables, user_id, &quanta.brick_id)
            .map_err(|_| Error::NotFound(format!("quanta '{quanta_id}'")))?;
        Ok(quanta)
    }
}

#[async_trait]
impl BrickRepository for InMemoryStore {
    async fn create_brick(&self, user_id: &str, new: NewBrick) -> Result<Brick> {
        let brick = Brick::create(
            self.ids.new_id(),
            user_id.to_owned(),
            new,
            self.clock.now(),
        )?;
        let mut tables = self.tables.write();
        tables.bricks.insert(brick.id.clone(), brick.clone());
        tracing::debug!(user_id, brick_id = %brick.id, "brick created");
        Ok(brick)
    }

    async fn get_brick(&self, user_id: &str, brick_id: &str) -> Result<Brick> {
        let tables = self.tables.read();
        Self::owned_brick(&tables, user_id, brick_id).cloned()
    }

    async fn update_brick(
        &self,
        user_id: &str,
        brick_id: &str,
        patch: BrickPatch,
    ) -> Result<Brick> {
        let now = self.clock.now();
        let mut tables = self.tables.write();
        Self::owned_brick(&tables, user_id, brick_id)?;
        let brick = tables
            .bricks
            .get_mut(brick_id)
            .ok_or_else(|| Error::NotFound(format!("brick '{brick_id}'")))?;
        brick.apply(&patch, now)?;
        Ok(brick.clone())
    }

    async fn delete_brick(
        &self,
        user_id: &str,
        brick_id: &str,
        delete_quantas: bool,
    ) -> Result<()> {
        let mut tables = self.tables.write();
        Self::owned_brick(&tables, user_id, brick_id)?;
        if delete_quantas {
            tables.quantas.retain(|_, q| q.brick_id != brick_id);
        } else if tables.quantas.values().any(|q| q.brick_id == brick_id) {
            return Err(Error::Conflict(format!(
                "brick '{brick_id}' still has quantas; pass delete_quantas to cascade"
            )));
        }
        tables.bricks.remove(brick_id);
        tracing::debug!(user_id, brick_id, delete_quantas, "brick deleted");
        Ok(())
    }

    async fn list_bricks(&self, user_id: &str, filter: &BrickFilter) -> Result<Vec<Brick>> {
        let tables = self.tables.read();
        let mut bricks: Vec<Brick> = tables
            .bricks
            .values()
            .filter(|b| b.user_id == user_id)
            .filter(|b| filter.status.is_none_or(|s| b.status == s))
            .filter(|b| filter.category.is_none_or(|c| b.category == c))
            .cloned()
            .collect();
        bricks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(bricks)
    }
}

#[async_trait]
impl QuantaRepository for InMemoryStore {
    async fn create_quanta(&self, user_id: &str, new: NewQuanta) -> Result<Quanta> {
        let quanta = Quanta::create(self.ids.new_id(), new, self.clock.now())?;
        let mut tables = self.tables.write();
        // Parent must exist and belong to the caller at commit time.
        Self::owned_brick(&tables, user_id, &quanta.brick_id)?;
        tables.quantas.insert(quanta.id.clone(), quanta.clone());
        tracing::debug!(user_id, quanta_id = %quanta.id, brick_id = %quanta.brick_id, "quanta created");
        Ok(quanta)
    }

    async fn get_quanta(&self, user_id: &str, quanta_id: &str) -> Result<Quanta> {
        let tables = self.tables.read();
        Self::owned_quanta(&tables, user_id, quanta_id).cloned()
    }

    async fn update_quanta(
        &self,
        user_id: &str,
        quanta_id: &str,
        patch: QuantaPatch,
    ) -> Result<Quanta> {
        let now = self.clock.now();
        let mut tables = self.tables.write();
        Self::owned_quanta(&tables, user_id, quanta_id)?;
        let quanta = tables
            .quantas
            .get_mut(quanta_id)
            .ok_or_else(|| Error::NotFound(format!("quanta '{quanta_id}'")))?;
        quanta.apply(&patch, now)?;
        Ok(quanta.clone())
    }

    async fn delete_quanta(&self, user_id: &str, quanta_id: &str) -> Result<()> {
        let mut tables = self.tables.write();
        Self::owned_quanta(&tables, user_id, quanta_id)?;
        tables.quantas.remove(quanta_id);
        Ok(())
    }

    async fn list_quantas(&self, user_id: &str, filter: &QuantaFilter) -> Result<Vec<Quanta>> {
        let tables = self.tables.read();
        if let Some(brick_id) = &filter.brick_id {
            Self::owned_brick(&tables, user_id, brick_id)?;
        }
        let owned_bricks: std::collections::HashSet<&str> = tables
            .bricks
            .values()
            .filter(|b| b.user_id == user_id)
            .map(|b| b.id.as_str())
            .collect();
        let mut quantas: Vec<Quanta> = tables
            .quantas
            .values()
            .filter(|q| owned_bricks.contains(q.brick_id.as_str()))
            .filter(|q| {
                filter
                    .brick_id
                    .as_deref()
                    .is_none_or(|id| q.brick_id == id)
            })
            .filter(|q| filter.status.is_none_or(|s| q.status == s))
            .cloned()
            .collect();
        quantas.sort_by(|a, b| {
            a.brick_id
                .cmp(&b.brick_id)
                .then(a.order_index.cmp(&b.order_index))
                .then(a.id.cmp(&b.id))
        });
        Ok(quantas)
    }
}

#[async_trait]
impl MessageRepository for InMemoryStore {
    async fn append_message(&self, message: StoredMessage) -> Result<()> {
        let mut messages = self.messages.write();
        messages
            .entry(message.conversation_id.clone())
            .or_default()
            .push(message);
        Ok(())
    }

    async fn history(&self, conversation_id: &str) -> Result<Vec<StoredMessage>> {
        let messages = self.messages.read();
        Ok(messages.get(conversation_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dl_domain::clock::{FixedClock, SequentialIds};
    use dl_domain::model::{BrickCategory, LifecycleStatus, MessageRole, Priority};

    fn store() -> InMemoryStore {
        InMemoryStore::new(
            Arc::new(FixedClock("2024-01-15T08:00:00Z".parse().unwrap())),
            Arc::new(SequentialIds::new("id")),
        )
    }

    fn new_brick(title: &str) -> NewBrick {
        NewBrick {
            title: title.into(),
            description: None,
            category: BrickCategory::Work,
            priority: Priority::Medium,
            estimated_duration_minutes: 60,
            target_date: None,
            deadline: None,
        }
    }

    fn new_quanta(brick_id: &str, title: &str) -> NewQuanta {
        NewQuanta {
            brick_id: brick_id.into(),
            title: title.into(),
            description: None,
            estimated_duration_minutes: 30,
            order_index: 0,
        }
    }

    #[tokio::test]
    async fn brick_round_trip() {
        let store = store();
        let brick = store.create_brick("u1", new_brick("Write report")).await.unwrap();
        let fetched = store.get_brick("u1", &brick.id).await.unwrap();
        assert_eq!(fetched.title, "Write report");
    }

    #[tokio::test]
    async fn bricks_are_owner_scoped() {
        let store = store();
        let brick = store.create_brick("u1", new_brick("Mine")).await.unwrap();
        let err = store.get_brick("u2", &brick.id).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn quanta_requires_owned_parent() {
        let store = store();
        let brick = store.create_brick("u1", new_brick("Parent")).await.unwrap();

        // Wrong owner cannot attach a quanta.
        let err = store
            .create_quanta("u2", new_quanta(&brick.id, "Step"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        // Missing parent is rejected.
        let err = store
            .create_quanta("u1", new_quanta("nope", "Step"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        assert!(store
            .create_quanta("u1", new_quanta(&brick.id, "Step"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn cascade_delete_removes_quantas() {
        let store = store();
        let brick = store.create_brick("u1", new_brick("Parent")).await.unwrap();
        store
            .create_quanta("u1", new_quanta(&brick.id, "One"))
            .await
            .unwrap();
        store
            .create_quanta("u1", new_quanta(&brick.id, "Two"))
            .await
            .unwrap();

        store.delete_brick("u1", &brick.id, true).await.unwrap();

        let quantas = store
            .list_quantas("u1", &QuantaFilter::default())
            .await
            .unwrap();
        assert!(quantas.is_empty());
    }

    #[tokio::test]
    async fn delete_without_cascade_refuses_when_quantas_exist() {
        let store = store();
        let brick = store.create_brick("u1", new_brick("Parent")).await.unwrap();
        store
            .create_quanta("u1", new_quanta(&brick.id, "One"))
            .await
            .unwrap();

        let err = store.delete_brick("u1", &brick.id, false).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert!(store.get_brick("u1", &brick.id).await.is_ok());
    }

    #[tokio::test]
    async fn list_bricks_filters_by_status() {
        let store = store();
        let brick = store.create_brick("u1", new_brick("A")).await.unwrap();
        store.create_brick("u1", new_brick("B")).await.unwrap();
        store
            .update_brick(
                "u1",
                &brick.id,
                BrickPatch {
                    status: Some(LifecycleStatus::Completed),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let filter = BrickFilter {
            status: Some(LifecycleStatus::Completed),
            category: None,
        };
        let bricks = store.list_bricks("u1", &filter).await.unwrap();
        assert_eq!(bricks.len(), 1);
        assert_eq!(bricks[0].title, "A");
    }

    #[tokio::test]
    async fn history_preserves_order() {
        let store = store();
        for (i, content) in ["hello", "hi there", "thanks"].iter().enumerate() {
            store
                .append_message(StoredMessage {
                    id: format!("m{i}"),
                    conversation_id: "c1".into(),
                    user_id: "u1".into(),
                    role: if i % 2 == 0 {
                        MessageRole::User
                    } else {
                        MessageRole::Assistant
                    },
                    content: (*content).into(),
                    tool_call_id: None,
                    created_at: "2024-01-15T08:00:00Z".parse().unwrap(),
                })
                .await
                .unwrap();
        }
        let history = store.history("c1").await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].content, "hello");
        assert_eq!(history[2].content, "thanks");
        assert!(store.history("c2").await.unwrap().is_empty());
    }
}
