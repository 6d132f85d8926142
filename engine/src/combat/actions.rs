//! Resolving a chosen action: heals, saving throws, attack sequences, damage,
//! effects and concentration.

use crate::checks::{concentration_check, saving_throw};
use crate::conditions::{attack_vantage, ActiveEffect, ActiveKind, ConcentrationLink};
use crate::life::{apply_damage, heal};
use crate::model::{
    Ability, ActionDefinition, ActionKind, EffectKind, EffectSpec, EffectTarget, Feature,
};
use crate::{attack, AttackResult};

use super::Encounter;

impl Encounter {
    /// Use `action`: pick targets, pay its cost once, then resolve it per target.
    pub fn perform(&mut self, actor: usize, action: &ActionDefinition) {
        let targets: Vec<usize> = match (action.category, action.area) {
            (ActionKind::Heal, true) => self.heal_pool(actor),
            (ActionKind::Heal, false) => self.select_ally(actor).into_iter().collect(),
            (_, true) => self.all_enemies(actor),
            (_, false) => self.select_enemy(actor).into_iter().collect(),
        };
        let name = self.combatants[actor].name.clone();
        if targets.is_empty() {
            self.narrator
                .say(|| format!("[TURN][{}] finds no target for {}", name, action.name));
            return;
        }

        let paid = self.combatants[actor].pay_for(action);
        let combatants = &self.combatants;
        self.narrator.say(|| {
            let names = targets
                .iter()
                .map(|&t| combatants[t].name.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            let cost = if paid {
                format!(
                    " (level {} slot, {} left)",
                    action.level,
                    combatants[actor].slots.remaining(action.level)
                )
            } else {
                String::new()
            };
            format!("[ACTION][{}] {} → {}{}", name, action.name, names, cost)
        });

        self.next_cast += 1;
        let cast = self.next_cast;

        if action.category != ActionKind::Heal {
            if let Some(spec) = action.effect.as_ref() {
                if spec.target == EffectTarget::Friendly {
                    self.attach_effect(actor, actor, action, spec, cast);
                }
            }
        }

        match action.category {
            ActionKind::Heal => {
                for target in targets {
                    self.resolve_heal(actor, target, action, cast);
                }
            }
            ActionKind::Save => {
                for target in targets {
                    self.resolve_save(actor, target, action, cast);
                }
            }
            ActionKind::Attack => self.resolve_attacks(actor, action, targets, cast),
        }
    }

    fn resolve_heal(&mut self, actor: usize, target: usize, action: &ActionDefinition, cast: u64) {
        if self.combatants[target].is_dead() {
            return;
        }
        let amount = action.formula.roll(&mut self.dice);
        let name = self.combatants[target].name.clone();
        let narrator = &mut self.narrator;
        let restored = heal(&name, &mut self.combatants[target].health, amount, |msg| {
            narrator.push(msg)
        });
        self.combatants[actor].metrics.healing_done += restored as u64;

        if let Some(spec) = action.effect.as_ref() {
            if spec.target == EffectTarget::Friendly {
                self.attach_effect(actor, target, action, spec, cast);
            }
        }
    }

    fn resolve_save(&mut self, actor: usize, target: usize, action: &ActionDefinition, cast: u64) {
        // No coup de grâce: only heals reach creatures at 0 HP.
        if !self.combatants[target].is_up() {
            return;
        }
        let ability = action.save_ability.unwrap_or(Ability::Dex);
        let dc = self.combatants[actor].spell_save_dc();
        let modifier = self.combatants[target].save_mod(ability);
        let save = saving_throw(&mut self.dice, modifier, dc);

        let name = self.combatants[target].name.clone();
        self.narrator.say(|| {
            format!(
                "[SAVE][{}] {:?} save DC {} vs {}: roll={} total={} → {}",
                name,
                ability,
                dc,
                action.name,
                save.roll,
                save.total,
                if save.passed { "SUCCESS" } else { "FAIL" }
            )
        });
        if save.passed {
            return;
        }

        let damage = action.formula.roll(&mut self.dice);
        self.deal_damage(actor, target, damage);
        self.attach_hostile_effect(actor, target, action, cast);
    }

    /// Attack actions swing `attacks_per_action` times. A single-target sequence
    /// re-targets once its target drops; an area sequence stops on each dropped target.
    fn resolve_attacks(
        &mut self,
        actor: usize,
        action: &ActionDefinition,
        targets: Vec<usize>,
        cast: u64,
    ) {
        let swings = self.combatants[actor].attacks_per_action.max(1);
        if action.area {
            for target in targets {
                for _ in 0..swings {
                    if !self.combatants[target].is_up() {
                        break;
                    }
                    self.swing(actor, target, action, cast);
                }
            }
            return;
        }

        let mut target = targets[0];
        for _ in 0..swings {
            if !self.combatants[target].is_up() {
                match self.select_enemy(actor) {
                    Some(next) => {
                        let (from, to) = (
                            self.combatants[target].name.clone(),
                            self.combatants[next].name.clone(),
                        );
                        let name = self.combatants[actor].name.clone();
                        self.narrator
                            .say(|| format!("[TURN][{}] turns from {} to {}", name, from, to));
                        target = next;
                    }
                    None => break,
                }
            }
            self.swing(actor, target, action, cast);
        }
    }

    /// One attack roll. Vantage and bonuses are recomputed for every swing.
    fn swing(&mut self, actor: usize, target: usize, action: &ActionDefinition, cast: u64) {
        let vantage = attack_vantage(&self.combatants[actor], &self.combatants[target]);
        let bonus = self.combatants[actor].attack_bonus();
        let ac = self.combatants[target].armor_class();
        let atk = attack(&mut self.dice, vantage.into(), bonus, ac);

        let name = self.combatants[actor].name.clone();
        self.narrator.say(|| log_attack(&name, &action.name, &atk));

        if !atk.hit {
            self.combatants[actor].metrics.misses += 1;
            return;
        }
        let metrics = &mut self.combatants[actor].metrics;
        metrics.hits += 1;
        if atk.is_crit {
            metrics.crits += 1;
        }

        let rolled = if atk.is_crit {
            action.formula.roll_crit(&mut self.dice)
        } else {
            action.formula.roll(&mut self.dice)
        };
        let damage = rolled
            .saturating_add(self.combatants[actor].damage_bonus())
            .max(0);
        self.narrator.say(|| {
            format!(
                "[DMG][{}] {}{} {:+} = {}",
                name,
                if atk.is_crit { "crit: 2×dice " } else { "" },
                action.formula,
                damage - rolled,
                damage
            )
        });
        self.deal_damage(actor, target, damage);
        self.attach_hostile_effect(actor, target, action, cast);
    }

    /// Damage a standing combatant, update metrics, and run the drop-to-0
    /// transition or the concentration check.
    pub fn deal_damage(&mut self, source: usize, target: usize, amount: i32) {
        if amount <= 0 || !self.combatants[target].is_up() {
            return;
        }
        let name = self.combatants[target].name.clone();
        let was_concentrating = self.combatants[target].concentrating;
        let before = self.combatants[target].health.hp;

        let narrator = &mut self.narrator;
        let dropped = apply_damage(&name, &mut self.combatants[target].health, amount, |msg| {
            narrator.push(msg)
        });
        let after = self.combatants[target].health.hp;
        let taken = (before - after) as u64;
        self.combatants[source].metrics.damage_dealt += taken;
        self.combatants[target].metrics.damage_taken += taken;
        self.narrator
            .say(|| format!("[HP][{}] {} → {}", name, before, after));

        if dropped {
            self.combatants[target].metrics.times_downed += 1;
            self.combatants[source].metrics.kills += 1;
            if was_concentrating {
                self.end_concentration(target);
            }
            return;
        }

        if was_concentrating {
            let state = &self.combatants[target];
            let modifier = state.save_mod(Ability::Con);
            let war_caster = state.has_feature(Feature::WarCaster);
            let check = concentration_check(&mut self.dice, modifier, amount, war_caster);
            self.narrator.say(|| {
                format!(
                    "[CONC][{}] DC {} roll={} total={} → {}",
                    name,
                    check.dc,
                    check.roll,
                    check.total,
                    if check.passed { "holds" } else { "broken" }
                )
            });
            if !check.passed {
                self.end_concentration(target);
            }
        }
    }

    fn attach_hostile_effect(
        &mut self,
        actor: usize,
        target: usize,
        action: &ActionDefinition,
        cast: u64,
    ) {
        if let Some(spec) = action.effect.as_ref() {
            if spec.target == EffectTarget::Hostile && self.combatants[target].is_up() {
                self.attach_effect(actor, target, action, spec, cast);
            }
        }
    }

    /// Put an effect on `receiver`. Concentration effects are held by the
    /// receiver when friendly and by the caster when hostile.
    pub fn attach_effect(
        &mut self,
        caster: usize,
        receiver: usize,
        action: &ActionDefinition,
        spec: &EffectSpec,
        cast: u64,
    ) {
        if spec.duration <= 0 {
            return;
        }
        let kind = match &spec.kind {
            EffectKind::Buff { stat, magnitude } => ActiveKind::Buff {
                stat: *stat,
                amount: magnitude.roll(&mut self.dice),
            },
            EffectKind::Debuff { condition } => ActiveKind::Condition(*condition),
        };

        let concentration = if spec.concentration {
            let holder = match spec.target {
                EffectTarget::Friendly => receiver,
                EffectTarget::Hostile => caster,
            };
            self.begin_concentration(holder, cast);
            Some(ConcentrationLink { holder, cast })
        } else {
            None
        };

        let source: std::sync::Arc<str> = action.name.as_str().into();
        let effects = &mut self.combatants[receiver].effects;
        // Re-applying the same effect refreshes it instead of stacking.
        let before = effects.len();
        effects.retain(|e| !(e.source == source && same_kind(&e.kind, &kind)));
        let replaced = effects.len() != before;
        effects.push(ActiveEffect {
            source,
            kind,
            remaining: spec.duration,
            concentration,
        });
        if replaced {
            self.release_idle_concentration();
        }

        let name = self.combatants[receiver].name.clone();
        self.narrator.say(|| {
            format!(
                "[COND][{}] gains {} ({:?}) for {} rounds",
                name, action.name, kind, spec.duration
            )
        });
    }

    /// Start concentrating for `cast`, dropping whatever the holder sustained before.
    fn begin_concentration(&mut self, holder: usize, cast: u64) {
        let stale = self.combatants.iter().any(|c| {
            c.effects
                .iter()
                .any(|e| e.concentration.is_some_and(|l| l.holder == holder && l.cast != cast))
        });
        if stale {
            for c in self.combatants.iter_mut() {
                c.effects.retain(|e| {
                    !e.concentration
                        .is_some_and(|l| l.holder == holder && l.cast != cast)
                });
            }
            let name = self.combatants[holder].name.clone();
            self.narrator
                .say(|| format!("[CONC][{}] switches concentration", name));
        }
        self.combatants[holder].concentrating = true;
    }

    /// Remove every effect `holder` sustains and clear its flag.
    pub fn end_concentration(&mut self, holder: usize) {
        let mut removed = 0usize;
        for c in self.combatants.iter_mut() {
            let before = c.effects.len();
            c.effects.retain(|e| !e.is_linked_to(holder));
            removed += before - c.effects.len();
        }
        self.combatants[holder].concentrating = false;
        let name = self.combatants[holder].name.clone();
        self.narrator.say(|| {
            format!(
                "[CONC][{}] loses concentration; {} effect(s) end",
                name, removed
            )
        });
    }
}

fn same_kind(a: &ActiveKind, b: &ActiveKind) -> bool {
    match (a, b) {
        (ActiveKind::Buff { stat: x, .. }, ActiveKind::Buff { stat: y, .. }) => x == y,
        (ActiveKind::Condition(x), ActiveKind::Condition(y)) => x == y,
        _ => false,
    }
}

fn format_d20_sequence(raw: &[u8], kept: i32) -> String {
    match raw {
        [] => format!("d20=? (keep={})", kept),
        [only] => format!("d20={}", only),
        [first, second] => format!("d20={} vs d20={} (keep={})", first, second, kept),
        _ => {
            let joined = raw
                .iter()
                .map(|r| r.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            format!("d20s=[{}] (keep={})", joined, kept)
        }
    }
}

fn log_attack(name: &str, action: &str, atk: &AttackResult) -> String {
    let rolls = format_d20_sequence(&atk.raw_rolls, atk.roll);
    let outcome = if atk.is_crit {
        "CRIT!"
    } else if atk.hit {
        "HIT"
    } else {
        "MISS"
    };
    format!(
        "[ATTACK][{}] {}: {} → {} to-hit={} vs AC={}",
        name, action, rolls, outcome, atk.total, atk.ac
    )
}
