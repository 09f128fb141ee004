//! Skill selection and casting.

use ackloop_core::types::{EntityRef, Hand, Point, SkillId};

use super::{commands, ActionSession};
use crate::error::EngineError;
use crate::retry::{Attempt, Step};

impl ActionSession {
    /// Bind `skill` to `hand`, confirmed by reading the selection back.
    pub async fn select_skill(&self, skill: SkillId, hand: Hand) -> Result<bool, EngineError> {
        if self.world.selected_skill(hand)? == Some(skill) {
            return Ok(true);
        }

        let timing = &self.config.timing;
        let plan = self.plan(
            self.config.retry.skill_attempts,
            timing.skill_poll_ms,
            self.scaled(timing.skill_floor_ms),
        )?;
        let world = &self.world;
        let ops = self.ops();
        let attempt = Attempt::new(
            "select_skill",
            move || Ok(Step::Send(commands::select_skill(ops, skill, hand))),
            move || Ok(world.selected_skill(hand)? == Some(skill)),
        );

        let confirmed = self.retry.run(&plan, attempt).await?;
        if !confirmed {
            tracing::warn!(session = %self.id, %skill, %hand, "Skill selection not confirmed");
        }
        Ok(confirmed)
    }

    /// Cast `skill` at a map location. The cast itself is not confirmed.
    pub async fn cast_at_location(
        &self,
        skill: SkillId,
        hand: Hand,
        at: Point,
    ) -> Result<bool, EngineError> {
        if !self.select_skill(skill, hand).await? {
            return Ok(false);
        }
        self.dispatcher()
            .send(&commands::cast_at_location(self.ops(), hand, at));
        tracing::debug!(session = %self.id, %skill, %hand, x = at.x, y = at.y, "Cast at location");
        Ok(true)
    }

    /// Cast `skill` at an entity. The cast itself is not confirmed.
    pub async fn cast_at_entity(
        &self,
        skill: SkillId,
        hand: Hand,
        target: EntityRef,
    ) -> Result<bool, EngineError> {
        const ACTION: &str = "cast_at_entity";

        if !target.capabilities().castable_target {
            return Ok(self.refuse(ACTION, &target, "subject cannot be targeted"));
        }
        if !self.world.entity_exists(&target)? {
            return Ok(self.refuse(ACTION, &target, "subject not present"));
        }
        if !self.select_skill(skill, hand).await? {
            return Ok(false);
        }
        if !self.world.entity_exists(&target)? {
            return Ok(self.refuse(ACTION, &target, "subject gone after skill selection"));
        }
        self.dispatcher()
            .send(&commands::cast_at_entity(self.ops(), hand, &target));
        tracing::debug!(session = %self.id, %skill, %hand, %target, "Cast at entity");
        Ok(true)
    }

    pub async fn teleport(&self, at: Point) -> Result<bool, EngineError> {
        self.cast_at_location(SkillId::TELEPORT, Hand::Right, at)
            .await
    }

    pub async fn telekinesis(&self, target: EntityRef) -> Result<bool, EngineError> {
        self.cast_at_entity(SkillId::TELEKINESIS, Hand::Right, target)
            .await
    }

    pub async fn enchant(&self, target: EntityRef) -> Result<bool, EngineError> {
        self.cast_at_entity(SkillId::ENCHANT, Hand::Right, target)
            .await
    }
}
