//! Read-only view of the remote world, and the optional navigation hook.
//!
//! Both are external collaborators: the engine only reads world state to
//! build confirmation predicates, and only asks the navigator to move.

use async_trait::async_trait;

use ackloop_core::types::{CursorState, EntityRef, Hand, ItemSnapshot, SkillId, UiFlag};

use crate::error::WorldError;

pub type WorldResult<T> = Result<T, WorldError>;

/// Instantaneous, side-effect-free reads of the remote world.
///
/// Implementations must be cheap: predicates call these on every poll tick.
pub trait WorldState: Send + Sync {
    /// Round-trip estimate in milliseconds, or `None` while unknown.
    fn latency_ms(&self) -> Option<i64>;

    /// The controlled character.
    fn player(&self) -> WorldResult<EntityRef>;

    fn entity_exists(&self, entity: &EntityRef) -> WorldResult<bool>;

    /// Distance from the player, or `None` if the entity is not present.
    fn distance_to(&self, entity: &EntityRef) -> WorldResult<Option<f64>>;

    fn ui_flag(&self, flag: UiFlag) -> WorldResult<bool>;

    /// The NPC the player is currently engaged with, if any.
    fn interacted_npc(&self) -> WorldResult<Option<EntityRef>>;

    /// Whether an NPC dialog is currently playing.
    fn dialog_active(&self) -> WorldResult<bool>;

    /// Number of items a vendor has populated for the open session.
    fn shop_item_count(&self, npc: &EntityRef) -> WorldResult<u32>;

    fn gold(&self) -> WorldResult<u64>;

    /// Number of items the player carries.
    fn inventory_count(&self) -> WorldResult<u32>;

    fn item(&self, item: &EntityRef) -> WorldResult<Option<ItemSnapshot>>;

    /// Price to buy the item from the current vendor.
    fn item_cost(&self, item: &EntityRef) -> WorldResult<u64>;

    /// A carried container that absorbs purchases of this item, if any.
    fn container_for(&self, item: &EntityRef) -> WorldResult<Option<EntityRef>>;

    fn cursor(&self) -> WorldResult<CursorState>;

    fn selected_skill(&self, hand: Hand) -> WorldResult<Option<SkillId>>;
}

/// Positioning capability invoked before interacting with distant entities.
#[async_trait]
pub trait Navigator: Send + Sync {
    /// Move until `target` is within `range`. Returns whether it got there.
    async fn approach(&self, target: EntityRef, range: f64) -> WorldResult<bool>;
}
