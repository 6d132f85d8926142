use std::sync::Arc;

use crate::combatant::CombatantState;
use crate::model::{BuffStat, Condition, Feature, Position};
use crate::AdMode;

/// Links an effect to the concentration that sustains it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConcentrationLink {
    /// Roster index of the concentrating combatant.
    pub holder: usize,
    /// Identifies the action use that started the concentration.
    pub cast: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveKind {
    Buff { stat: BuffStat, amount: i32 },
    Condition(Condition),
}

/// An effect currently riding on a combatant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveEffect {
    /// Name of the action that produced it.
    pub source: Arc<str>,
    pub kind: ActiveKind,
    /// Rounds left; decremented at the start of the bearer's turn.
    pub remaining: i32,
    pub concentration: Option<ConcentrationLink>,
}

impl ActiveEffect {
    pub fn condition(&self) -> Option<Condition> {
        match self.kind {
            ActiveKind::Condition(c) => Some(c),
            ActiveKind::Buff { .. } => None,
        }
    }

    pub fn is_linked_to(&self, holder: usize) -> bool {
        self.concentration.is_some_and(|link| link.holder == holder)
    }
}

/// Net vantage result for attack rolls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vantage {
    Normal,
    Advantage,
    Disadvantage,
}

impl Vantage {
    pub fn combine(self, other: Vantage) -> Vantage {
        use Vantage::*;
        match (self, other) {
            (Disadvantage, Advantage) | (Advantage, Disadvantage) => Normal,
            (Normal, x) => x,
            (x, Normal) => x,
            (Advantage, Advantage) => Advantage,
            (Disadvantage, Disadvantage) => Disadvantage,
        }
    }
}

impl From<Vantage> for AdMode {
    fn from(v: Vantage) -> Self {
        match v {
            Vantage::Normal => AdMode::Normal,
            Vantage::Advantage => AdMode::Advantage,
            Vantage::Disadvantage => AdMode::Disadvantage,
        }
    }
}

/// Vantage for one attack roll. Any source of advantage and any source of
/// disadvantage cancel out.
pub fn attack_vantage(attacker: &CombatantState, target: &CombatantState) -> Vantage {
    let advantage = (attacker.position() == Position::Front && target.has_condition(Condition::Prone))
        || attacker.has_feature(Feature::RecklessAttack)
        || target.has_condition(Condition::Blinded);
    let disadvantage = attacker.has_condition(Condition::Blinded);

    let mut net = Vantage::Normal;
    if advantage {
        net = net.combine(Vantage::Advantage);
    }
    if disadvantage {
        net = net.combine(Vantage::Disadvantage);
    }
    net
}

/// Count every effect down by one round and drop the ones that ran out.
/// Returns the expired effects.
pub fn tick_effects(effects: &mut Vec<ActiveEffect>) -> Vec<ActiveEffect> {
    for effect in effects.iter_mut() {
        effect.remaining -= 1;
    }
    let (expired, kept): (Vec<_>, Vec<_>) = effects.drain(..).partition(|e| e.remaining <= 0);
    *effects = kept;
    expired
}

/// Sum of active buffs to `stat`.
pub fn buff_total(effects: &[ActiveEffect], stat: BuffStat) -> i32 {
    effects
        .iter()
        .filter_map(|e| match e.kind {
            ActiveKind::Buff { stat: s, amount } if s == stat => Some(amount),
            _ => None,
        })
        .sum()
}

pub fn has_condition(effects: &[ActiveEffect], condition: Condition) -> bool {
    effects.iter().any(|e| e.condition() == Some(condition))
}
