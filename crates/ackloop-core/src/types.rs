use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AckloopError, Result};

/// Selector identifying a command or message type on the wire.
pub type Opcode = u8;

// =============================================================================
// Commands
// =============================================================================

/// A single typed field of an outbound command.
///
/// The variant fixes the encoded width: 1, 2 or 4 bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Byte(u8),
    Word(u16),
    Dword(u32),
}

impl Field {
    /// Build a field from an untyped `(width, value)` pair.
    ///
    /// Fails if the width is not 1, 2 or 4, or the value does not fit.
    pub fn with_width(width: u8, value: u32) -> Result<Self> {
        match width {
            1 => u8::try_from(value)
                .map(Field::Byte)
                .map_err(|_| AckloopError::InvalidCommand(format!("{value} does not fit in 1 byte"))),
            2 => u16::try_from(value)
                .map(Field::Word)
                .map_err(|_| AckloopError::InvalidCommand(format!("{value} does not fit in 2 bytes"))),
            4 => Ok(Field::Dword(value)),
            other => Err(AckloopError::InvalidCommand(format!(
                "unsupported field width {other}"
            ))),
        }
    }

    /// Encoded width in bytes.
    pub fn width(&self) -> usize {
        match self {
            Field::Byte(_) => 1,
            Field::Word(_) => 2,
            Field::Dword(_) => 4,
        }
    }

    /// The value widened to 32 bits.
    pub fn value(&self) -> u32 {
        match *self {
            Field::Byte(v) => u32::from(v),
            Field::Word(v) => u32::from(v),
            Field::Dword(v) => v,
        }
    }
}

/// An outbound command: an opcode followed by an ordered list of fields.
///
/// Built once through the `byte`/`word`/`dword` builder methods and never
/// mutated afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Command {
    opcode: Opcode,
    fields: Vec<Field>,
}

impl Command {
    pub fn new(opcode: Opcode) -> Self {
        Self {
            opcode,
            fields: Vec::new(),
        }
    }

    pub fn byte(mut self, value: u8) -> Self {
        self.fields.push(Field::Byte(value));
        self
    }

    pub fn word(mut self, value: u16) -> Self {
        self.fields.push(Field::Word(value));
        self
    }

    pub fn dword(mut self, value: u32) -> Self {
        self.fields.push(Field::Dword(value));
        self
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Total encoded length including the opcode byte.
    pub fn encoded_len(&self) -> usize {
        1 + self.fields.iter().map(Field::width).sum::<usize>()
    }

    /// Encode as the opcode byte followed by each field, little-endian.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        out.push(self.opcode);
        for field in &self.fields {
            match *field {
                Field::Byte(v) => out.push(v),
                Field::Word(v) => out.extend_from_slice(&v.to_le_bytes()),
                Field::Dword(v) => out.extend_from_slice(&v.to_le_bytes()),
            }
        }
        out
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02x} [", self.opcode)?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}:{}", field.width(), field.value())?;
        }
        write!(f, "]")
    }
}

// =============================================================================
// Inbound messages
// =============================================================================

/// A message received on the inbound channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub opcode: Opcode,
    pub payload: Vec<u8>,
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    pub fn new(opcode: Opcode, payload: Vec<u8>) -> Self {
        Self {
            opcode,
            payload,
            received_at: Utc::now(),
        }
    }
}

// =============================================================================
// Entities
// =============================================================================

/// Kind of a live entity in the remote world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Player,
    Monster,
    Item,
    Object,
    Npc,
    Merc,
}

/// What the engine may do with an entity of a given kind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Capabilities {
    /// Can be interacted with to open a menu or trade session.
    pub npc_like: bool,
    /// Can be offered to a vendor (the item itself may still refuse).
    pub sellable: bool,
    /// Can be worn in a body slot.
    pub equippable: bool,
    /// Can hold a quantity of a consumable.
    pub stackable: bool,
    /// Can be the target of an entity-directed skill.
    pub castable_target: bool,
}

impl EntityKind {
    /// Unit type code used when the kind is written into a command.
    pub fn wire_code(&self) -> u32 {
        match self {
            EntityKind::Player => 0,
            EntityKind::Monster | EntityKind::Npc | EntityKind::Merc => 1,
            EntityKind::Object => 2,
            EntityKind::Item => 4,
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        match self {
            EntityKind::Npc => Capabilities {
                npc_like: true,
                castable_target: true,
                ..Capabilities::default()
            },
            EntityKind::Item => Capabilities {
                sellable: true,
                equippable: true,
                stackable: true,
                castable_target: true,
                ..Capabilities::default()
            },
            EntityKind::Player | EntityKind::Monster | EntityKind::Merc | EntityKind::Object => {
                Capabilities {
                    castable_target: true,
                    ..Capabilities::default()
                }
            }
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Player => write!(f, "player"),
            EntityKind::Monster => write!(f, "monster"),
            EntityKind::Item => write!(f, "item"),
            EntityKind::Object => write!(f, "object"),
            EntityKind::Npc => write!(f, "npc"),
            EntityKind::Merc => write!(f, "merc"),
        }
    }
}

/// Lookup handle for a live entity.
///
/// Only a key: the entity may vanish between calls, so every use re-resolves it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: u32,
}

impl EntityRef {
    pub const fn new(kind: EntityKind, id: u32) -> Self {
        Self { kind, id }
    }

    pub const fn npc(id: u32) -> Self {
        Self::new(EntityKind::Npc, id)
    }

    pub const fn item(id: u32) -> Self {
        Self::new(EntityKind::Item, id)
    }

    pub const fn player(id: u32) -> Self {
        Self::new(EntityKind::Player, id)
    }

    pub fn capabilities(&self) -> Capabilities {
        self.kind.capabilities()
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind, self.id)
    }
}

// =============================================================================
// Items
// =============================================================================

/// Broad item category, used where behaviour depends on what an item is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemCategory {
    HealingPotion,
    RejuvPotion,
    ThawingPotion,
    AntidotePotion,
    Scroll,
    Tome,
    Other,
}

impl ItemCategory {
    /// Potions a mercenary can be made to drink.
    pub fn is_merc_potion(&self) -> bool {
        matches!(
            self,
            ItemCategory::HealingPotion
                | ItemCategory::RejuvPotion
                | ItemCategory::ThawingPotion
                | ItemCategory::AntidotePotion
        )
    }
}

/// Where an item currently sits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemLocation {
    Inventory,
    /// Quick-slot belt, by column.
    Belt(u8),
    /// Worn in the given body slot.
    Equipped(u8),
    Stash,
    Cursor,
    Ground,
    Vendor,
}

/// Point-in-time view of an item as reported by the world model.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSnapshot {
    pub entity: EntityRef,
    pub class_id: u32,
    pub category: ItemCategory,
    pub location: ItemLocation,
    pub sellable: bool,
    pub identified: bool,
    /// Stack quantity; 0 for non-stackable items.
    pub quantity: u32,
}

impl ItemSnapshot {
    /// Body slot the item is worn in, if any.
    pub fn equipped_slot(&self) -> Option<u8> {
        match self.location {
            ItemLocation::Equipped(slot) => Some(slot),
            _ => None,
        }
    }

    pub fn is_in_belt(&self) -> bool {
        matches!(self.location, ItemLocation::Belt(_))
    }
}

// =============================================================================
// Interaction state
// =============================================================================

/// UI flags the engine watches to confirm interactions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UiFlag {
    NpcMenu,
    Shop,
}

/// Mode of the pointer cursor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorMode {
    #[default]
    Default,
    /// An identification tool is active and awaiting a target.
    Identify,
    Other,
}

/// What the cursor is currently doing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CursorState {
    pub mode: CursorMode,
    pub item: Option<EntityRef>,
}

/// Which hand a skill is bound to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Hand {
    Left,
    Right,
}

impl fmt::Display for Hand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hand::Left => write!(f, "left"),
            Hand::Right => write!(f, "right"),
        }
    }
}

/// Numeric skill identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SkillId(pub u16);

impl SkillId {
    pub const TELEKINESIS: SkillId = SkillId(43);
    pub const ENCHANT: SkillId = SkillId(52);
    pub const TELEPORT: SkillId = SkillId(54);
}

impl fmt::Display for SkillId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "skill {}", self.0)
    }
}

/// A map location in world coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: u16,
    pub y: u16,
}

impl Point {
    pub fn new(x: u16, y: u16) -> Self {
        Self { x, y }
    }
}

/// Which vendor session to open.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeMode {
    Trade,
    Gamble,
}

impl TradeMode {
    /// Entity-action selector for the mode.
    pub fn action_code(&self) -> u32 {
        match self {
            TradeMode::Trade => 1,
            TradeMode::Gamble => 2,
        }
    }
}

impl fmt::Display for TradeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeMode::Trade => write!(f, "trade"),
            TradeMode::Gamble => write!(f, "gamble"),
        }
    }
}

/// How a purchase is made.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuyMode {
    #[default]
    Single,
    /// Buy as many as fit, charging funds once per unit.
    Fill,
    Gamble,
}

impl BuyMode {
    /// Buy-flag dword written into the purchase command.
    pub fn flag(&self) -> u32 {
        match self {
            BuyMode::Single => 0x0,
            BuyMode::Fill => 0x8000_0000,
            BuyMode::Gamble => 0x2,
        }
    }
}
