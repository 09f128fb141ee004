//! Command builders for every outbound message the transactions send.
//!
//! Field layouts are fixed by the remote protocol; opcodes come from the
//! configured [`OpcodeTable`].

use ackloop_core::config::OpcodeTable;
use ackloop_core::types::{BuyMode, Command, EntityRef, Hand, Point, SkillId, TradeMode};

/// Open an interaction with an entity.
pub fn interact(ops: &OpcodeTable, target: &EntityRef) -> Command {
    Command::new(ops.interact_with_entity)
        .dword(target.kind.wire_code())
        .dword(target.id)
}

/// Open the NPC's first menu page.
pub fn npc_init(ops: &OpcodeTable, npc: &EntityRef) -> Command {
    Command::new(ops.npc_init).dword(1).dword(npc.id)
}

/// Close any menu or dialog with the NPC.
pub fn npc_cancel(ops: &OpcodeTable, npc: &EntityRef) -> Command {
    Command::new(ops.npc_cancel)
        .dword(npc.kind.wire_code())
        .dword(npc.id)
}

/// Ask the remote side to resend an entity's state.
pub fn request_update(ops: &OpcodeTable, entity: &EntityRef) -> Command {
    Command::new(ops.request_entity_update)
        .dword(entity.kind.wire_code())
        .dword(entity.id)
}

pub fn entity_action(ops: &OpcodeTable, npc: &EntityRef, mode: TradeMode) -> Command {
    Command::new(ops.entity_action)
        .dword(mode.action_code())
        .dword(npc.id)
        .dword(0)
}

pub fn npc_buy(ops: &OpcodeTable, npc: &EntityRef, item: &EntityRef, mode: BuyMode) -> Command {
    Command::new(ops.npc_buy)
        .dword(npc.id)
        .dword(item.id)
        .dword(mode.flag())
        .dword(0)
}

pub fn npc_sell(ops: &OpcodeTable, npc: &EntityRef, item: &EntityRef) -> Command {
    Command::new(ops.npc_sell)
        .dword(npc.id)
        .dword(item.id)
        .dword(0)
        .dword(0)
}

/// Apply an identify tool to an item.
pub fn identify(ops: &OpcodeTable, item: &EntityRef, tool: &EntityRef) -> Command {
    Command::new(ops.identify_item).dword(item.id).dword(tool.id)
}

/// Lift an item out of a storage buffer.
pub fn pickup_buffer(ops: &OpcodeTable, item: &EntityRef) -> Command {
    Command::new(ops.pickup_buffer_item).dword(item.id)
}

/// Lift an item out of a body slot.
pub fn pickup_body(ops: &OpcodeTable, slot: u8) -> Command {
    Command::new(ops.pickup_body_item).word(u16::from(slot))
}

pub fn drop_item(ops: &OpcodeTable, item: &EntityRef) -> Command {
    Command::new(ops.drop_item).dword(item.id)
}

pub fn item_to_belt(ops: &OpcodeTable, item: &EntityRef, column: u8) -> Command {
    Command::new(ops.item_to_belt)
        .dword(item.id)
        .dword(u32::from(column))
}

/// Click an item, optionally lifting it onto the cursor.
pub fn pickup_item(ops: &OpcodeTable, item: &EntityRef, to_cursor: bool) -> Command {
    Command::new(ops.pickup_item)
        .dword(item.kind.wire_code())
        .dword(item.id)
        .dword(u32::from(to_cursor))
}

/// Use a belt item on the mercenary.
pub fn use_belt_item_on_merc(ops: &OpcodeTable, item: &EntityRef) -> Command {
    Command::new(ops.use_belt_item)
        .dword(item.id)
        .dword(1)
        .dword(0)
}

/// Hand the cursor item to the mercenary.
pub fn merc_item(ops: &OpcodeTable) -> Command {
    Command::new(ops.merc_item).word(0)
}

pub fn select_skill(ops: &OpcodeTable, skill: SkillId, hand: Hand) -> Command {
    let hand_flag = match hand {
        Hand::Left => 0x80,
        Hand::Right => 0x00,
    };
    Command::new(ops.select_skill)
        .word(skill.0)
        .byte(0)
        .byte(hand_flag)
        .dword(0xffff_ffff)
}

pub fn cast_at_location(ops: &OpcodeTable, hand: Hand, at: Point) -> Command {
    let opcode = match hand {
        Hand::Left => ops.left_skill_on_location,
        Hand::Right => ops.right_skill_on_location,
    };
    Command::new(opcode).word(at.x).word(at.y)
}

pub fn cast_at_entity(ops: &OpcodeTable, hand: Hand, target: &EntityRef) -> Command {
    let opcode = match hand {
        Hand::Left => ops.left_skill_on_entity,
        Hand::Right => ops.right_skill_on_entity,
    };
    Command::new(opcode)
        .dword(target.kind.wire_code())
        .dword(target.id)
}

pub fn refresh_quests(ops: &OpcodeTable) -> Command {
    Command::new(ops.update_quests)
}
