use crate::{check, AdMode, CheckInput, CheckResult, Dice};

/// Plain d20 saving throw against `dc`.
pub fn saving_throw(dice: &mut Dice, modifier: i32, dc: i32) -> CheckResult {
    check(
        dice,
        CheckInput {
            dc,
            modifier,
            mode: AdMode::Normal,
        },
    )
}

/// DC to keep concentration after taking `damage`.
pub fn concentration_dc(damage: i32) -> i32 {
    10.max(damage / 2)
}

/// CON save to hold concentration; War Caster rolls two d20s and keeps the higher.
pub fn concentration_check(
    dice: &mut Dice,
    con_save_mod: i32,
    damage: i32,
    war_caster: bool,
) -> CheckResult {
    let mode = if war_caster {
        AdMode::Advantage
    } else {
        AdMode::Normal
    };
    check(
        dice,
        CheckInput {
            dc: concentration_dc(damage),
            modifier: con_save_mod,
            mode,
        },
    )
}
