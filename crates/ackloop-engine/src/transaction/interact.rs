//! NPC menus, trade sessions and plain entity interaction.

use std::time::Duration;

use ackloop_core::types::{EntityRef, TradeMode, UiFlag};

use super::{commands, ActionSession};
use crate::error::EngineError;
use crate::poller::Probe;
use crate::retry::{Attempt, Step};
use crate::timeout::TimeoutBudget;

/// Engaged with some NPC for this long without a menu means the remote side
/// is stuck in an interaction.
const ENGAGED_DESYNC: Duration = Duration::from_millis(1000);
/// A dialog still playing after this long blocks the menu.
const DIALOG_DESYNC: Duration = Duration::from_millis(500);

impl ActionSession {
    /// Open the interaction menu of `npc`.
    ///
    /// Returns immediately if a menu is already open. Between failed attempts
    /// the menu state is reset and the player's own state refreshed.
    pub async fn open_menu(&self, npc: EntityRef) -> Result<bool, EngineError> {
        const ACTION: &str = "open_menu";

        if !npc.capabilities().npc_like {
            return Ok(self.refuse(ACTION, &npc, "subject is not NPC-like"));
        }
        if self.world.ui_flag(UiFlag::NpcMenu)? {
            return Ok(true);
        }
        if !self.world.entity_exists(&npc)? {
            return Ok(self.refuse(ACTION, &npc, "subject not present"));
        }
        if !self.approach(&npc).await? {
            return Ok(self.refuse(ACTION, &npc, "could not get within range"));
        }

        let timing = &self.config.timing;
        let plan = self.plan(
            self.config.retry.menu_attempts,
            timing.menu_poll_ms,
            TimeoutBudget::fixed(timing.menu_window_ms),
        )?;

        let world = &self.world;
        let ops = self.ops();
        let attempt = Attempt::probing(
            ACTION,
            move || {
                Ok(if world.entity_exists(&npc)? {
                    Step::Send(commands::interact(ops, &npc))
                } else {
                    Step::Abort
                })
            },
            move |elapsed| {
                if world.ui_flag(UiFlag::NpcMenu)? {
                    return Ok(Probe::Confirmed);
                }
                if elapsed > ENGAGED_DESYNC {
                    if let Some(engaged) = world.interacted_npc()? {
                        return Ok(Probe::Desync(commands::npc_cancel(ops, &engaged)));
                    }
                }
                if elapsed > DIALOG_DESYNC && world.dialog_active()? {
                    return Ok(Probe::Desync(commands::npc_cancel(ops, &npc)));
                }
                Ok(Probe::Pending)
            },
        )
        .with_corrective(move || {
            Ok(vec![
                commands::npc_init(ops, &npc),
                commands::npc_cancel(ops, &npc),
                commands::request_update(ops, &world.player()?),
            ])
        });

        let confirmed = self.retry.run(&plan, attempt).await?;
        if confirmed {
            self.settle(timing.menu_settle_floor_ms).await?;
        }
        Ok(self.outcome(ACTION, &npc, confirmed))
    }

    /// Open a trade or gamble session with `npc`, opening its menu first.
    ///
    /// Confirmed once the shop window is up or the vendor has populated items.
    pub async fn start_trade(&self, npc: EntityRef, mode: TradeMode) -> Result<bool, EngineError> {
        const ACTION: &str = "start_trade";

        if !npc.capabilities().npc_like {
            return Ok(self.refuse(ACTION, &npc, "subject is not NPC-like"));
        }
        if self.world.ui_flag(UiFlag::Shop)? {
            return Ok(true);
        }
        if !self.open_menu(npc).await? {
            return Ok(self.outcome(ACTION, &npc, false));
        }

        let pulse_ms = self.config.timing.trade_pulse_ms;
        let plan = self.plan(
            self.config.retry.trade_pulses.div_ceil(2).max(1),
            pulse_ms,
            TimeoutBudget::fixed(pulse_ms.saturating_mul(2)),
        )?;

        let world = &self.world;
        let ops = self.ops();
        let attempt = Attempt::new(
            ACTION,
            move || {
                Ok(if world.entity_exists(&npc)? {
                    Step::Send(commands::entity_action(ops, &npc, mode))
                } else {
                    Step::Abort
                })
            },
            move || Ok(world.ui_flag(UiFlag::Shop)? || world.shop_item_count(&npc)? > 0),
        );

        tracing::debug!(session = %self.id, %npc, %mode, "Requesting vendor session");
        let confirmed = self.retry.run(&plan, attempt).await?;
        if confirmed {
            self.pause(pulse_ms).await?;
        }
        Ok(self.outcome(ACTION, &npc, confirmed))
    }

    /// Interact with an entity once, without confirmation.
    pub fn entity_interact(&self, target: EntityRef) -> Result<bool, EngineError> {
        if !self.world.entity_exists(&target)? {
            return Ok(self.refuse("entity_interact", &target, "subject not present"));
        }
        self.dispatcher().send(&commands::interact(self.ops(), &target));
        Ok(true)
    }

    /// Close any menu or dialog with `npc`, without confirmation.
    pub fn cancel_npc(&self, npc: EntityRef) -> Result<bool, EngineError> {
        if !self.world.entity_exists(&npc)? {
            return Ok(self.refuse("cancel_npc", &npc, "subject not present"));
        }
        self.dispatcher().send(&commands::npc_cancel(self.ops(), &npc));
        Ok(true)
    }

    /// Ask the remote side to resend `entity`'s state.
    pub fn request_entity_update(&self, entity: EntityRef) {
        self.dispatcher().send(&commands::request_update(self.ops(), &entity));
    }

    pub fn refresh_quests(&self) {
        self.dispatcher().send(&commands::refresh_quests(self.ops()));
    }

    /// Make sure `target` is within interaction range, asking the navigator
    /// to move if one is installed. Without one the interaction is attempted
    /// from where the player stands.
    pub(super) async fn approach(&self, target: &EntityRef) -> Result<bool, EngineError> {
        let range = self.config.general.interact_range;
        let distance = match self.world.distance_to(target)? {
            Some(distance) => distance,
            None => return Ok(false),
        };
        if distance <= range {
            return Ok(true);
        }
        match &self.navigator {
            Some(navigator) => {
                tracing::debug!(session = %self.id, %target, distance, range, "Approaching target");
                Ok(navigator.approach(*target, range).await?)
            }
            None => {
                tracing::debug!(session = %self.id, %target, distance, "No navigator, interacting from distance");
                Ok(true)
            }
        }
    }
}
