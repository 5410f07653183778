use async_trait::async_trait;

use dl_domain::error::Result;
use dl_domain::model::{
    Brick, BrickCategory, BrickPatch, LifecycleStatus, NewBrick, NewQuanta, Quanta, QuantaPatch,
    StoredMessage,
};

/// Filters accepted by `list_bricks`.
#[derive(Debug, Clone, Default)]
pub struct BrickFilter {
    pub status: Option<LifecycleStatus>,
    pub category: Option<BrickCategory>,
}

/// Filters accepted by `list_quantas`.
#[derive(Debug, Clone, Default)]
pub struct QuantaFilter {
    pub brick_id: Option<String>,
    pub status: Option<LifecycleStatus>,
}

/// Brick CRUD. Every operation is scoped to the owning user; a brick owned
/// by someone else behaves as absent.
#[async_trait]
pub trait BrickRepository: Send + Sync {
    async fn create_brick(&self, user_id: &str, new: NewBrick) -> Result<Brick>;

    async fn get_brick(&self, user_id: &str, brick_id: &str) -> Result<Brick>;

    async fn update_brick(&self, user_id: &str, brick_id: &str, patch: BrickPatch)
        -> Result<Brick>;

    /// Delete a brick. With `delete_quantas`, its quantas are removed in the
    /// same operation, atomically with respect to the caller.
    async fn delete_brick(&self, user_id: &str, brick_id: &str, delete_quantas: bool)
        -> Result<()>;

    async fn list_bricks(&self, user_id: &str, filter: &BrickFilter) -> Result<Vec<Brick>>;
}

/// Quanta CRUD. `create_quanta` verifies the parent brick exists and belongs
/// to the caller at commit time.
#[async_trait]
pub trait QuantaRepository: Send + Sync {
    async fn create_quanta(&self, user_id: &str, new: NewQuanta) -> Result<Quanta>;

    async fn get_quanta(&self, user_id: &str, quanta_id: &str) -> Result<Quanta>;

    async fn update_quanta(
        &self,
        user_id: &str,
        quanta_id: &str,
        patch: QuantaPatch,
    ) -> Result<Quanta>;

    async fn delete_quanta(&self, user_id: &str, quanta_id: &str) -> Result<()>;

    async fn list_quantas(&self, user_id: &str, filter: &QuantaFilter) -> Result<Vec<Quanta>>;
}

/// Durable conversation history. Reads observe all previously persisted
/// messages for the conversation (read-your-writes within a conversation).
#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn append_message(&self, message: StoredMessage) -> Result<()>;

    /// Full history for a conversation, oldest first.
    async fn history(&self, conversation_id: &str) -> Result<Vec<StoredMessage>>;
}
