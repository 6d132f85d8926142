//! Who an actor aims at and which of its actions it picks.

use std::sync::Arc;

use crate::model::{ActionDefinition, ActionKind, Position, TargetBehavior};

use super::Encounter;

impl Encounter {
    /// Enemies the actor may single out. A front-line actor facing a front line
    /// has to pick from that front line.
    pub fn enemy_pool(&self, actor: usize) -> Vec<usize> {
        let foes = self.combatants[actor].team().opponent();
        let mut pool: Vec<usize> = self
            .combatants
            .iter()
            .enumerate()
            .filter(|(_, c)| c.team() == foes && c.is_up())
            .map(|(i, _)| i)
            .collect();

        let front_line = pool
            .iter()
            .any(|&i| self.combatants[i].position() == Position::Front);
        if self.combatants[actor].position() == Position::Front && front_line {
            pool.retain(|&i| self.combatants[i].position() == Position::Front);
        }
        pool
    }

    /// Every enemy still standing, ignoring the front-line rule.
    pub fn all_enemies(&self, actor: usize) -> Vec<usize> {
        let foes = self.combatants[actor].team().opponent();
        self.combatants
            .iter()
            .enumerate()
            .filter(|(_, c)| c.team() == foes && c.is_up())
            .map(|(i, _)| i)
            .collect()
    }

    /// Allies a heal can reach: anyone on the actor's side who is not dead.
    pub fn heal_pool(&self, actor: usize) -> Vec<usize> {
        let team = self.combatants[actor].team();
        self.combatants
            .iter()
            .enumerate()
            .filter(|(_, c)| c.team() == team && !c.is_dead())
            .map(|(i, _)| i)
            .collect()
    }

    pub fn select_enemy(&mut self, actor: usize) -> Option<usize> {
        let pool = self.enemy_pool(actor);
        if pool.is_empty() {
            return None;
        }
        match self.combatants[actor].behavior() {
            TargetBehavior::Random => Some(pool[self.dice.pick(pool.len())]),
            TargetBehavior::FocusLowHp => pool
                .iter()
                .copied()
                .min_by_key(|&i| self.combatants[i].health.hp),
            TargetBehavior::FocusBackline => {
                let back: Vec<usize> = pool
                    .iter()
                    .copied()
                    .filter(|&i| self.combatants[i].position() == Position::Back)
                    .collect();
                let from = if back.is_empty() { &pool } else { &back };
                Some(from[self.dice.pick(from.len())])
            }
        }
    }

    /// The most wounded ally below max HP, downed allies first.
    pub fn select_ally(&self, actor: usize) -> Option<usize> {
        self.heal_pool(actor)
            .into_iter()
            .filter(|&i| self.combatants[i].is_wounded())
            .min_by_key(|&i| self.combatants[i].health.hp)
    }

    /// Pick an action: usually the highest-level affordable one, otherwise a
    /// uniform pick among the rest.
    pub fn choose_action(&mut self, actor: usize) -> Option<Arc<ActionDefinition>> {
        let state = &self.combatants[actor];
        let team = state.team();
        let ally_wounded = self
            .combatants
            .iter()
            .any(|c| c.team() == team && c.is_wounded());

        let mut candidates: Vec<Arc<ActionDefinition>> = state
            .actions
            .iter()
            .filter(|a| state.can_afford(a))
            .filter(|a| a.category != ActionKind::Heal || ally_wounded)
            .cloned()
            .collect();
        if candidates.is_empty() {
            return None;
        }

        candidates.sort_by(|a, b| b.level.cmp(&a.level));
        if candidates.len() == 1 || self.dice.chance(self.options.top_action_bias) {
            return Some(candidates.swap_remove(0));
        }
        let rest = &candidates[1..];
        Some(rest[self.dice.pick(rest.len())].clone())
    }
}
