//! Per-trial mutable combatant state, derived from a read-only definition.

use std::ops::AddAssign;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::conditions::{buff_total, has_condition, ActiveEffect};
use crate::life::{Health, Vitality};
use crate::model::{
    Ability, ActionDefinition, BuffStat, Caster, ClassKind, CombatantDefinition, Condition,
    Feature, Position, TargetBehavior, Team,
};
use crate::proficiency_bonus;

const MAX_SLOT_LEVEL: usize = 5;

// Slots per spell level 1..=5, indexed by character level 1..=10.
const FULL_CASTER_SLOTS: [[u8; MAX_SLOT_LEVEL]; 10] = [
    [2, 0, 0, 0, 0],
    [3, 0, 0, 0, 0],
    [4, 2, 0, 0, 0],
    [4, 3, 0, 0, 0],
    [4, 3, 2, 0, 0],
    [4, 3, 3, 0, 0],
    [4, 3, 3, 1, 0],
    [4, 3, 3, 2, 0],
    [4, 3, 3, 3, 1],
    [4, 3, 3, 3, 2],
];

const HALF_CASTER_SLOTS: [[u8; MAX_SLOT_LEVEL]; 10] = [
    [0, 0, 0, 0, 0],
    [2, 0, 0, 0, 0],
    [3, 0, 0, 0, 0],
    [3, 0, 0, 0, 0],
    [4, 2, 0, 0, 0],
    [4, 2, 0, 0, 0],
    [4, 3, 0, 0, 0],
    [4, 3, 0, 0, 0],
    [4, 3, 2, 0, 0],
    [4, 3, 2, 0, 0],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpellSlots {
    remaining: [u8; MAX_SLOT_LEVEL],
}

impl SpellSlots {
    /// Slot pool for a class at `level` (levels above 10 use the level-10 row).
    pub fn for_class(class: &ClassKind, level: u8) -> Self {
        let row = usize::from(level.clamp(1, 10)) - 1;
        let remaining = match class.caster() {
            Caster::Full => FULL_CASTER_SLOTS[row],
            Caster::Half => HALF_CASTER_SLOTS[row],
            Caster::None => [0; MAX_SLOT_LEVEL],
        };
        Self { remaining }
    }

    pub fn remaining(&self, spell_level: u8) -> u8 {
        match usize::from(spell_level) {
            0 => 0,
            l if l <= MAX_SLOT_LEVEL => self.remaining[l - 1],
            _ => 0,
        }
    }

    pub fn available(&self, spell_level: u8) -> bool {
        spell_level == 0 || self.remaining(spell_level) > 0
    }

    /// Spend one slot of `spell_level`. At-will and unavailable levels spend nothing.
    pub fn spend(&mut self, spell_level: u8) -> bool {
        let l = usize::from(spell_level);
        if l == 0 || l > MAX_SLOT_LEVEL || self.remaining[l - 1] == 0 {
            return false;
        }
        self.remaining[l - 1] -= 1;
        true
    }
}

/// Counters accumulated over one trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Metrics {
    pub damage_dealt: u64,
    pub damage_taken: u64,
    pub healing_done: u64,
    pub hits: u64,
    pub crits: u64,
    pub misses: u64,
    pub kills: u64,
    pub times_downed: u64,
}

impl AddAssign<&Metrics> for Metrics {
    fn add_assign(&mut self, rhs: &Metrics) {
        self.damage_dealt += rhs.damage_dealt;
        self.damage_taken += rhs.damage_taken;
        self.healing_done += rhs.healing_done;
        self.hits += rhs.hits;
        self.crits += rhs.crits;
        self.misses += rhs.misses;
        self.kills += rhs.kills;
        self.times_downed += rhs.times_downed;
    }
}

#[derive(Debug, Clone)]
pub struct CombatantState {
    /// Instance label; duplicates of one definition get `#2`, `#3`, ...
    pub name: Arc<str>,
    pub definition: Arc<CombatantDefinition>,
    pub actions: Vec<Arc<ActionDefinition>>,
    pub health: Health,
    pub proficiency: i32,
    pub initiative: i32,
    pub attacks_per_action: u8,
    pub slots: SpellSlots,
    pub effects: Vec<ActiveEffect>,
    pub concentrating: bool,
    /// Great Weapon Master trade engaged for this round.
    pub power_attack: bool,
    pub metrics: Metrics,
}

impl CombatantState {
    pub fn new(
        definition: Arc<CombatantDefinition>,
        actions: Vec<Arc<ActionDefinition>>,
        name: impl Into<Arc<str>>,
    ) -> Self {
        let level = definition.level;
        Self {
            name: name.into(),
            health: Health::new(definition.max_hp),
            proficiency: proficiency_bonus(level),
            initiative: 0,
            attacks_per_action: definition.class.attacks_at(level),
            slots: SpellSlots::for_class(&definition.class, level),
            effects: Vec::new(),
            concentrating: false,
            power_attack: false,
            metrics: Metrics::default(),
            actions,
            definition,
        }
    }

    pub fn team(&self) -> Team {
        self.definition.team
    }

    pub fn position(&self) -> Position {
        self.definition.position
    }

    pub fn behavior(&self) -> TargetBehavior {
        self.definition.behavior
    }

    pub fn has_feature(&self, feature: Feature) -> bool {
        self.definition.features.contains(feature)
    }

    pub fn has_condition(&self, condition: Condition) -> bool {
        has_condition(&self.effects, condition)
    }

    pub fn incapacitating_condition(&self) -> Option<Condition> {
        self.effects
            .iter()
            .filter_map(|e| e.condition())
            .find(|c| c.incapacitates())
    }

    pub fn ability_mod(&self, ability: Ability) -> i32 {
        self.definition.abilities.mod_of(ability)
    }

    pub fn best_mod(&self) -> i32 {
        self.definition.abilities.best_mod()
    }

    /// Every save counts as proficient in this model.
    pub fn save_mod(&self, ability: Ability) -> i32 {
        self.ability_mod(ability) + self.proficiency
    }

    pub fn initiative_bonus(&self) -> i32 {
        let alert = if self.has_feature(Feature::Initiative) { 5 } else { 0 };
        self.ability_mod(Ability::Dex) + alert
    }

    pub fn armor_class(&self) -> i32 {
        self.definition.armor_class + buff_total(&self.effects, BuffStat::ArmorClass)
    }

    pub fn attack_bonus(&self) -> i32 {
        let power = if self.power_attack { -5 } else { 0 };
        self.best_mod() + self.proficiency + power + buff_total(&self.effects, BuffStat::Attack)
    }

    /// Flat damage added to every weapon hit.
    pub fn damage_bonus(&self) -> i32 {
        let power = if self.power_attack { 10 } else { 0 };
        self.best_mod() + power
    }

    pub fn casting_mod(&self) -> i32 {
        match self.definition.class.spellcasting_ability() {
            Some(ability) => self.ability_mod(ability),
            None => [Ability::Int, Ability::Wis, Ability::Cha]
                .iter()
                .map(|&a| self.ability_mod(a))
                .max()
                .unwrap_or(0),
        }
    }

    pub fn spell_save_dc(&self) -> i32 {
        8 + self.proficiency + self.casting_mod()
    }

    /// PCs pay spell slots for leveled actions; monsters use them freely.
    pub fn can_afford(&self, action: &ActionDefinition) -> bool {
        action.level == 0 || self.team() == Team::Monster || self.slots.available(action.level)
    }

    pub fn pay_for(&mut self, action: &ActionDefinition) -> bool {
        if action.level == 0 || self.team() == Team::Monster {
            return false;
        }
        self.slots.spend(action.level)
    }

    pub fn is_up(&self) -> bool {
        self.health.is_up()
    }

    pub fn is_dead(&self) -> bool {
        self.health.state == Vitality::Dead
    }

    pub fn is_wounded(&self) -> bool {
        !self.is_dead() && self.health.hp < self.health.max_hp
    }
}
