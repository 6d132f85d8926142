use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Vitality {
    Alive,
    /// At 0 HP and rolling death saves.
    Downed,
    /// At 0 HP, no longer rolling, out of the fight until healed.
    Stable,
    /// Terminal for the rest of the trial.
    Dead,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeathSaves {
    pub successes: u8, // 0..=3
    pub failures: u8,  // 0..=3
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    /// Never below 0.
    pub hp: i32,
    pub max_hp: i32,
    pub state: Vitality,
    pub death: DeathSaves,
}

impl Health {
    pub fn new(max_hp: i32) -> Self {
        Self {
            hp: max_hp,
            max_hp,
            state: Vitality::Alive,
            death: DeathSaves::default(),
        }
    }

    pub fn is_up(&self) -> bool {
        self.state == Vitality::Alive && self.hp > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeathSaveOutcome {
    /// Natural 20: back on 1 HP.
    Revived,
    Success,
    Failure,
    Stabilized,
    Died,
}

/// Apply damage to a conscious creature. Returns true if it dropped to 0 on this call.
///
/// Creatures that are not `Alive` are left untouched.
pub fn apply_damage(name: &str, health: &mut Health, dmg: i32, mut log: impl FnMut(String)) -> bool {
    if health.state != Vitality::Alive || dmg <= 0 {
        return false;
    }

    let before = health.hp;
    health.hp = (health.hp - dmg).max(0);

    if before > 0 && health.hp == 0 {
        health.state = Vitality::Downed;
        health.death = DeathSaves::default();
        log(format!("[STATE][{}] drops to 0 HP → Downed", name));
        return true;
    }
    false
}

/// Healing; a downed or stable creature wakes and its death saves reset.
/// Returns the HP actually restored.
pub fn heal(name: &str, health: &mut Health, amount: i32, mut log: impl FnMut(String)) -> i32 {
    if amount <= 0 || health.state == Vitality::Dead {
        return 0;
    }
    let before = health.hp;
    let was_down = matches!(health.state, Vitality::Downed | Vitality::Stable);
    health.hp = (health.hp + amount).min(health.max_hp);
    let restored = health.hp - before;
    if was_down && health.hp > 0 {
        health.state = Vitality::Alive;
        health.death = DeathSaves::default();
        log(format!(
            "[HEAL][{}] +{} HP ({} → {}) and regains consciousness",
            name, restored, before, health.hp
        ));
    } else {
        log(format!(
            "[HEAL][{}] +{} HP ({} → {})",
            name, restored, before, health.hp
        ));
    }
    restored
}

/// Death save for a downed creature; runs in place of its turn.
/// Returns `None` when the creature is not in the `Downed` state.
pub fn process_death_save(
    name: &str,
    health: &mut Health,
    mut d20: impl FnMut() -> i32,
    mut log: impl FnMut(String),
) -> Option<DeathSaveOutcome> {
    if health.state != Vitality::Downed {
        return None;
    }

    let roll = d20();
    // Nat 20 → 1 HP and wake; Nat 1 → 2 fails; otherwise success/failure by 10+
    let mut outcome = if roll == 20 {
        health.death = DeathSaves::default();
        health.hp = 1;
        health.state = Vitality::Alive;
        DeathSaveOutcome::Revived
    } else if roll == 1 {
        health.death.failures = (health.death.failures + 2).min(3);
        DeathSaveOutcome::Failure
    } else if roll >= 10 {
        health.death.successes = (health.death.successes + 1).min(3);
        DeathSaveOutcome::Success
    } else {
        health.death.failures = (health.death.failures + 1).min(3);
        DeathSaveOutcome::Failure
    };

    if health.death.failures >= 3 {
        health.state = Vitality::Dead;
        health.hp = 0;
        outcome = DeathSaveOutcome::Died;
    } else if health.death.successes >= 3 {
        health.state = Vitality::Stable;
        outcome = DeathSaveOutcome::Stabilized;
    }

    log(format!(
        "[DEATHSAVE][{}] roll={} → {:?} (S={}, F={})",
        name, roll, outcome, health.death.successes, health.death.failures
    ));
    Some(outcome)
}
