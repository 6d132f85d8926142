use std::collections::HashSet;
use std::sync::Arc;

use skirmish::content::builtin_store;
use skirmish::life::Vitality;
use skirmish::trial::build_combatants;
use skirmish::{
    Ability, ActionDefinition, ActionKind, BuffStat, ClassKind,
    CombatantDefinition, CombatantState, Condition, Dice, EffectKind, EffectSpec, EffectTarget,
    Encounter, EncounterOptions, Feature, Formula, Magnitude, Outcome, Position, TargetBehavior,
    Team,
};

fn formula(src: &str) -> Formula {
    Formula::parse(src).unwrap()
}

fn attack(id: u32, name: &str, damage: &str) -> ActionDefinition {
    ActionDefinition::new(id, name, ActionKind::Attack, formula(damage))
}

fn def(id: u32, name: &str, team: Team, hp: i32, ac: i32) -> CombatantDefinition {
    CombatantDefinition::new(id, name, team, hp, ac)
}

fn spawn(def: CombatantDefinition, actions: Vec<ActionDefinition>) -> CombatantState {
    let name = def.name.clone();
    CombatantState::new(
        Arc::new(def),
        actions.into_iter().map(Arc::new).collect(),
        name,
    )
}

fn scripted(combatants: Vec<CombatantState>, rolls: Vec<i32>) -> Encounter {
    Encounter::new(
        combatants,
        Dice::from_scripted(rolls),
        EncounterOptions::default(),
        true,
    )
}

#[test]
fn initiative_ties_keep_roster_order() {
    let combatants = vec![
        spawn(def(1, "Ada", Team::Pc, 10, 10), vec![]),
        spawn(def(2, "Bo", Team::Pc, 10, 10), vec![]),
        spawn(def(10, "Rat", Team::Monster, 10, 10), vec![]),
    ];
    let mut encounter = scripted(combatants, vec![10]);
    assert_eq!(encounter.roll_initiative(), vec![0, 1, 2]);
}

#[test]
fn initiative_sorts_high_to_low_and_skips_the_dead() {
    let combatants = vec![
        spawn(def(1, "Ada", Team::Pc, 10, 10), vec![]),
        spawn(def(2, "Bo", Team::Pc, 10, 10), vec![]),
        spawn(def(10, "Rat", Team::Monster, 10, 10), vec![]),
    ];
    let mut encounter = scripted(combatants, vec![4, 18]);
    encounter.combatants_mut()[1].health.state = Vitality::Dead;
    encounter.combatants_mut()[1].health.hp = 0;
    assert_eq!(encounter.roll_initiative(), vec![2, 0]);
}

#[test]
fn narrated_exchange() {
    let mut hero = def(1, "Hero", Team::Pc, 12, 14);
    hero.abilities.str_ = 16;
    let combatants = vec![
        spawn(hero, vec![attack(1, "Sword", "1d8")]),
        spawn(def(10, "Rat", Team::Monster, 5, 12), vec![]),
    ];
    // init 15 / 5, attack d20 12, damage d8 4
    let mut encounter = scripted(combatants, vec![15, 5, 12, 4]);
    assert_eq!(encounter.run(), Outcome::Victory);
    insta::assert_snapshot!(encounter.log().join("\n"), @r"
    [ROUND] 1
    [INIT] Hero 15, Rat 5
    [ACTION][Hero] Sword → Rat
    [ATTACK][Hero] Sword: d20=12 → HIT to-hit=17 vs AC=12
    [DMG][Hero] 1d8 +3 = 7
    [STATE][Rat] drops to 0 HP → Downed
    [HP][Rat] 5 → 0
    [END] Victory after 1 rounds
    ");
}

#[test]
fn multi_attack_retargets_after_a_drop() {
    let mut fighter = def(1, "Bruna", Team::Pc, 30, 16);
    fighter.class = ClassKind::Fighter;
    fighter.level = 5;
    fighter.behavior = TargetBehavior::FocusLowHp;
    let combatants = vec![
        spawn(fighter, vec![attack(1, "Greatsword", "10")]),
        spawn(def(10, "Goblin", Team::Monster, 5, 5), vec![]),
        spawn(def(10, "Goblin #2", Team::Monster, 5, 5), vec![]),
    ];
    let mut encounter = scripted(combatants, vec![15]);
    encounter.take_turn(0);

    let state = encounter.combatants();
    assert!(!state[1].is_up());
    assert!(!state[2].is_up());
    assert_eq!(state[0].metrics.hits, 2);
    assert_eq!(state[0].metrics.kills, 2);
    // Overkill is not counted.
    assert_eq!(state[0].metrics.damage_dealt, 10);
    assert_eq!(encounter.outcome(), Some(Outcome::Victory));
}

#[test]
fn single_target_attack_stops_when_nobody_is_left() {
    let mut fighter = def(1, "Bruna", Team::Pc, 30, 16);
    fighter.class = ClassKind::Fighter;
    fighter.level = 11;
    let combatants = vec![
        spawn(fighter, vec![attack(1, "Greatsword", "10")]),
        spawn(def(10, "Goblin", Team::Monster, 5, 5), vec![]),
    ];
    let mut encounter = scripted(combatants, vec![15]);
    encounter.take_turn(0);
    let fighter = &encounter.combatants()[0];
    assert_eq!(fighter.metrics.hits + fighter.metrics.misses, 1);
}

fn warding() -> ActionDefinition {
    let mut action = ActionDefinition::new(8, "Prayer of Warding", ActionKind::Heal, formula("1d4+2"));
    action.level = 1;
    action.effect = Some(EffectSpec {
        kind: EffectKind::Buff {
            stat: BuffStat::ArmorClass,
            magnitude: Magnitude::Flat(2),
        },
        target: EffectTarget::Friendly,
        duration: 10,
        concentration: true,
    });
    action
}

fn healer_scene(rolls: Vec<i32>) -> Encounter {
    let mut osric = def(2, "Osric", Team::Pc, 20, 16);
    osric.class = ClassKind::Cleric;
    let mut healer = spawn(osric, vec![warding()]);
    healer.health.hp = 10;
    let combatants = vec![healer, spawn(def(13, "Ogre", Team::Monster, 59, 11), vec![])];
    scripted(combatants, rolls)
}

#[test]
fn concentration_check_runs_once_per_hit_and_strips_buff_on_failure() {
    // heal d4 → 3, then the concentration d20 → 2
    let mut encounter = healer_scene(vec![3, 2]);
    encounter.take_turn(0);
    {
        let osric = &encounter.combatants()[0];
        assert_eq!(osric.health.hp, 15);
        assert!(osric.concentrating);
        assert_eq!(osric.armor_class(), 18);
        assert_eq!(osric.slots.remaining(1), 1);
    }

    encounter.deal_damage(1, 0, 6);
    let osric = &encounter.combatants()[0];
    assert_eq!(osric.health.hp, 9);
    assert!(!osric.concentrating);
    assert!(osric.effects.is_empty());
    assert_eq!(osric.armor_class(), 16);

    let checks = encounter
        .log()
        .iter()
        .filter(|l| l.starts_with("[CONC][Osric] DC"))
        .count();
    assert_eq!(checks, 1);
}

#[test]
fn passed_concentration_check_keeps_buff() {
    let mut encounter = healer_scene(vec![3, 19]);
    encounter.take_turn(0);
    encounter.deal_damage(1, 0, 6);
    let osric = &encounter.combatants()[0];
    assert!(osric.concentrating);
    assert_eq!(osric.armor_class(), 18);
}

#[test]
fn dropping_to_zero_ends_concentration() {
    let mut encounter = healer_scene(vec![3]);
    encounter.take_turn(0);
    encounter.deal_damage(1, 0, 40);
    let osric = &encounter.combatants()[0];
    assert_eq!(osric.health.hp, 0);
    assert_eq!(osric.health.state, Vitality::Downed);
    assert!(!osric.concentrating);
    assert!(osric.effects.is_empty());
    assert_eq!(osric.metrics.times_downed, 1);
    assert_eq!(encounter.combatants()[1].metrics.kills, 1);
}

#[test]
fn heal_wakes_a_downed_ally() {
    let mut cleric = def(2, "Osric", Team::Pc, 20, 16);
    cleric.class = ClassKind::Cleric;
    let mut cure = ActionDefinition::new(5, "Cure Wounds", ActionKind::Heal, formula("1d8+3"));
    cure.level = 1;
    let mut ally = spawn(def(1, "Bruna", Team::Pc, 30, 18), vec![]);
    ally.health.hp = 0;
    ally.health.state = Vitality::Downed;
    let combatants = vec![
        spawn(cleric, vec![cure]),
        ally,
        spawn(def(13, "Ogre", Team::Monster, 59, 11), vec![]),
    ];
    let mut encounter = scripted(combatants, vec![4]);
    encounter.take_turn(0);

    let state = encounter.combatants();
    assert_eq!(state[1].health.state, Vitality::Alive);
    assert_eq!(state[1].health.hp, 7);
    assert_eq!(state[0].metrics.healing_done, 7);
}

#[test]
fn heal_is_not_chosen_when_nobody_is_hurt() {
    let mut cleric = def(2, "Osric", Team::Pc, 20, 16);
    cleric.class = ClassKind::Cleric;
    let mut cure = ActionDefinition::new(5, "Cure Wounds", ActionKind::Heal, formula("1d8+3"));
    cure.level = 1;
    let combatants = vec![
        spawn(cleric, vec![cure]),
        spawn(def(13, "Ogre", Team::Monster, 59, 11), vec![]),
    ];
    let mut encounter = scripted(combatants, vec![4]);
    encounter.take_turn(0);
    assert_eq!(encounter.combatants()[0].slots.remaining(1), 2);
    assert!(encounter
        .log()
        .iter()
        .any(|l| l == "[TURN][Osric] has no usable action"));
}

#[test]
fn area_save_hits_every_enemy_and_spends_one_slot() {
    let mut wizard = def(3, "Ilse", Team::Pc, 27, 12);
    wizard.class = ClassKind::Wizard;
    wizard.level = 5;
    wizard.abilities.int_ = 18;
    let mut fireball = ActionDefinition::new(6, "Fireball", ActionKind::Save, formula("10"));
    fireball.level = 3;
    fireball.save_ability = Some(Ability::Dex);
    fireball.area = true;
    let combatants = vec![
        spawn(wizard, vec![fireball]),
        spawn(def(10, "Goblin", Team::Monster, 7, 15), vec![]),
        spawn(def(10, "Goblin #2", Team::Monster, 7, 15), vec![]),
        spawn(def(10, "Goblin #3", Team::Monster, 7, 15), vec![]),
    ];
    let mut encounter = scripted(combatants, vec![1]);
    encounter.take_turn(0);

    let state = encounter.combatants();
    assert!(state[1..].iter().all(|g| !g.is_up()));
    assert_eq!(state[0].metrics.kills, 3);
    assert_eq!(state[0].metrics.damage_dealt, 21);
    assert_eq!(state[0].slots.remaining(3), 1);
}

#[test]
fn successful_save_takes_no_damage() {
    let mut wizard = def(3, "Ilse", Team::Pc, 27, 12);
    wizard.class = ClassKind::Wizard;
    let mut flame = ActionDefinition::new(4, "Sacred Flame", ActionKind::Save, formula("2d8"));
    flame.save_ability = Some(Ability::Dex);
    let combatants = vec![
        spawn(wizard, vec![flame]),
        spawn(def(10, "Goblin", Team::Monster, 7, 15), vec![]),
    ];
    let mut encounter = scripted(combatants, vec![20]);
    encounter.take_turn(0);
    assert_eq!(encounter.combatants()[1].health.hp, 7);
}

#[test]
fn hostile_effect_lands_on_hit() {
    let mut bite = attack(11, "Bite", "1d4");
    bite.effect = Some(EffectSpec {
        kind: EffectKind::Debuff {
            condition: Condition::Prone,
        },
        target: EffectTarget::Hostile,
        duration: 2,
        concentration: false,
    });
    let combatants = vec![
        spawn(def(1, "Bruna", Team::Pc, 30, 10), vec![]),
        spawn(def(12, "Wolf", Team::Monster, 11, 13), vec![bite]),
    ];
    let mut encounter = scripted(combatants, vec![15, 3]);
    encounter.take_turn(1);
    let bruna = &encounter.combatants()[0];
    assert_eq!(bruna.health.hp, 27);
    assert!(bruna.has_condition(Condition::Prone));
}

#[test]
fn paralysis_costs_turns_until_it_wears_off() {
    let combatants = vec![
        spawn(def(1, "Bruna", Team::Pc, 30, 10), vec![attack(1, "Slam", "5")]),
        spawn(def(10, "Rat", Team::Monster, 20, 5), vec![]),
    ];
    let mut encounter = scripted(combatants, vec![15]);
    encounter.combatants_mut()[0].effects.push(skirmish::conditions::ActiveEffect {
        source: Arc::from("Hold Person"),
        kind: skirmish::conditions::ActiveKind::Condition(Condition::Paralyzed),
        remaining: 2,
        concentration: None,
    });

    encounter.take_turn(0);
    assert_eq!(encounter.combatants()[1].health.hp, 20);
    // The effect ticks first, so on the second turn it expires and Bruna acts.
    encounter.take_turn(0);
    assert_eq!(encounter.combatants()[1].health.hp, 15);
    assert!(encounter.combatants()[0].effects.is_empty());
}

#[test]
fn downed_combatant_rolls_a_death_save_instead_of_acting() {
    let combatants = vec![
        spawn(def(1, "Bruna", Team::Pc, 30, 10), vec![attack(1, "Slam", "5")]),
        spawn(def(10, "Rat", Team::Monster, 20, 5), vec![]),
    ];
    let mut encounter = scripted(combatants, vec![20]);
    encounter.combatants_mut()[0].health.hp = 0;
    encounter.combatants_mut()[0].health.state = Vitality::Downed;

    encounter.take_turn(0);
    let state = encounter.combatants();
    assert_eq!(state[0].health.state, Vitality::Alive);
    assert_eq!(state[0].health.hp, 1);
    assert_eq!(state[1].health.hp, 20);
}

#[test]
fn power_attack_engages_only_against_low_armor() {
    let fighter = |ac_of_enemy: i32| {
        let mut bruna = def(1, "Bruna", Team::Pc, 30, 18);
        bruna.features.insert(Feature::GreatWeaponMaster);
        vec![
            spawn(bruna, vec![]),
            spawn(def(13, "Ogre", Team::Monster, 59, ac_of_enemy), vec![]),
        ]
    };
    let mut soft = Encounter::new(fighter(11), Dice::from_seed(1), EncounterOptions::default(), false);
    soft.play_round();
    assert!(soft.combatants()[0].power_attack);

    let mut hard = Encounter::new(fighter(18), Dice::from_seed(1), EncounterOptions::default(), false);
    hard.play_round();
    assert!(!hard.combatants()[0].power_attack);
}

#[test]
fn stalemate_times_out_at_round_cap() {
    let combatants = vec![
        spawn(def(1, "Ada", Team::Pc, 10, 10), vec![]),
        spawn(def(10, "Rat", Team::Monster, 10, 10), vec![]),
    ];
    let options = EncounterOptions {
        round_cap: 7,
        ..EncounterOptions::default()
    };
    let mut encounter = Encounter::new(combatants, Dice::from_seed(9), options, false);
    assert_eq!(encounter.run(), Outcome::Timeout);
    assert_eq!(encounter.round(), 7);
}

#[test]
fn starter_battles_hold_their_invariants() {
    let store = builtin_store("starter").unwrap();
    let pcs = store.get_combatants(&[1, 2, 3, 4]);
    let monsters = store.get_combatants(&[14, 14, 10, 12, 13]);

    for seed in 0..40 {
        let combatants = build_combatants(&pcs, &monsters, &store);
        let mut encounter =
            Encounter::new(combatants, Dice::from_seed(seed), EncounterOptions::default(), false);
        let mut dead: HashSet<usize> = HashSet::new();

        while encounter.outcome().is_none() && encounter.round() < 100 {
            encounter.play_round();
            let state = encounter.combatants();
            for (i, c) in state.iter().enumerate() {
                assert!(c.health.hp >= 0 && c.health.hp <= c.health.max_hp);
                if dead.contains(&i) {
                    assert_eq!(c.health.state, Vitality::Dead, "seed {seed}: dead is terminal");
                }
                if c.is_dead() {
                    assert_eq!(c.health.hp, 0);
                    dead.insert(i);
                }
                let casts: HashSet<u64> = state
                    .iter()
                    .flat_map(|bearer| bearer.effects.iter())
                    .filter_map(|e| e.concentration)
                    .filter(|link| link.holder == i)
                    .map(|link| link.cast)
                    .collect();
                assert!(casts.len() <= 1, "seed {seed}: {} sustains {:?}", c.name, casts);
                if !casts.is_empty() {
                    assert!(c.concentrating);
                }
            }
        }
    }
}

#[test]
fn vantage_is_recomputed_before_every_swing() {
    let mut sand = attack(13, "Pocket Sand", "1");
    sand.effect = Some(EffectSpec {
        kind: EffectKind::Debuff {
            condition: Condition::Blinded,
        },
        target: EffectTarget::Hostile,
        duration: 2,
        concentration: false,
    });
    let mut fighter = def(1, "Bruna", Team::Pc, 30, 16);
    fighter.class = ClassKind::Fighter;
    fighter.level = 5;
    let combatants = vec![
        spawn(fighter, vec![sand]),
        spawn(def(13, "Ogre", Team::Monster, 59, 5), vec![]),
    ];
    // First swing rolls once and blinds; the second rolls with advantage.
    let mut encounter = scripted(combatants, vec![10, 3, 17]);
    encounter.take_turn(0);

    let attacks: Vec<&String> = encounter
        .log()
        .iter()
        .filter(|l| l.starts_with("[ATTACK]"))
        .collect();
    assert_eq!(attacks.len(), 2);
    assert_eq!(attacks[0], "[ATTACK][Bruna] Pocket Sand: d20=10 → HIT to-hit=13 vs AC=5");
    assert_eq!(
        attacks[1],
        "[ATTACK][Bruna] Pocket Sand: d20=3 vs d20=17 (keep=17) → HIT to-hit=20 vs AC=5"
    );
}

fn line_up() -> Vec<CombatantState> {
    let mut archer = def(2, "Wren", Team::Pc, 20, 13);
    archer.position = Position::Back;
    archer.behavior = TargetBehavior::FocusBackline;
    let mut shaman = def(11, "Shaman", Team::Monster, 9, 12);
    shaman.position = Position::Back;
    vec![
        spawn(def(1, "Bruna", Team::Pc, 30, 16), vec![]),
        spawn(archer, vec![]),
        spawn(def(10, "Goblin", Team::Monster, 7, 15), vec![]),
        spawn(shaman, vec![]),
    ]
}

#[test]
fn front_liners_are_held_to_the_enemy_front() {
    let encounter = scripted(line_up(), vec![1]);
    assert_eq!(encounter.enemy_pool(0), vec![2]);
    assert_eq!(encounter.enemy_pool(1), vec![2, 3]);
    assert_eq!(encounter.enemy_pool(2), vec![0]);
    assert_eq!(encounter.all_enemies(0), vec![2, 3]);
}

#[test]
fn front_rule_lapses_once_the_enemy_front_is_down() {
    let mut encounter = scripted(line_up(), vec![1]);
    encounter.combatants_mut()[2].health.hp = 0;
    encounter.combatants_mut()[2].health.state = Vitality::Downed;
    assert_eq!(encounter.enemy_pool(0), vec![3]);
}

#[test]
fn focus_backline_picks_the_back_liner() {
    let mut encounter = Encounter::new(
        line_up(),
        Dice::from_seed(3),
        EncounterOptions::default(),
        false,
    );
    for _ in 0..50 {
        assert_eq!(encounter.select_enemy(1), Some(3));
    }
}

#[test]
fn focus_low_hp_picks_the_most_wounded() {
    let mut hunter = def(1, "Bruna", Team::Pc, 30, 16);
    hunter.behavior = TargetBehavior::FocusLowHp;
    let mut hurt = spawn(def(10, "Goblin #2", Team::Monster, 7, 15), vec![]);
    hurt.health.hp = 2;
    let combatants = vec![
        spawn(hunter, vec![]),
        spawn(def(10, "Goblin", Team::Monster, 7, 15), vec![]),
        hurt,
    ];
    let mut encounter = scripted(combatants, vec![1]);
    assert_eq!(encounter.select_enemy(0), Some(2));
}

#[test]
fn highest_level_action_is_favoured_until_its_slots_run_out() {
    let mut wizard = def(3, "Ilse", Team::Pc, 27, 12);
    wizard.class = ClassKind::Wizard;
    let mut missile = attack(7, "Magic Missile", "3d4+3");
    missile.level = 1;
    let combatants = vec![
        spawn(wizard, vec![attack(2, "Fire Bolt", "1d10"), missile]),
        spawn(def(13, "Ogre", Team::Monster, 59, 11), vec![]),
    ];
    let mut encounter = Encounter::new(
        combatants,
        Dice::from_seed(2024),
        EncounterOptions::default(),
        false,
    );

    let draws = 4000;
    let top = (0..draws)
        .filter_map(|_| encounter.choose_action(0))
        .filter(|a| a.name == "Magic Missile")
        .count();
    let share = top as f64 / draws as f64;
    assert!((0.71..=0.79).contains(&share), "top share {share}");

    let slots = &mut encounter.combatants_mut()[0].slots;
    while slots.spend(1) {}
    for _ in 0..50 {
        let action = encounter.choose_action(0).unwrap();
        assert_eq!(action.name, "Fire Bolt");
    }
}

#[test]
fn huge_damage_formula_saturates() {
    let mut hero = def(1, "Hero", Team::Pc, 12, 14);
    hero.abilities.str_ = 16;
    let combatants = vec![
        spawn(hero, vec![attack(1, "Meteor Fist", "2147483647")]),
        spawn(def(10, "Rat", Team::Monster, 5, 12), vec![]),
    ];
    let mut encounter = scripted(combatants, vec![12]);
    encounter.take_turn(0);
    assert_eq!(encounter.combatants()[1].health.hp, 0);
    assert_eq!(encounter.combatants()[0].metrics.damage_dealt, 5);
}

fn hold() -> (ActionDefinition, EffectSpec) {
    let spec = EffectSpec {
        kind: EffectKind::Debuff {
            condition: Condition::Paralyzed,
        },
        target: EffectTarget::Hostile,
        duration: 10,
        concentration: true,
    };
    let mut action = ActionDefinition::new(9, "Hold Person", ActionKind::Save, formula("0"));
    action.level = 2;
    action.save_ability = Some(Ability::Wis);
    action.effect = Some(spec.clone());
    (action, spec)
}

#[test]
fn death_of_the_bearer_releases_the_caster() {
    let mut wizard = def(3, "Ilse", Team::Pc, 27, 12);
    wizard.class = ClassKind::Wizard;
    let mut goblin = spawn(def(10, "Goblin", Team::Monster, 7, 15), vec![]);
    goblin.health.hp = 0;
    goblin.health.state = Vitality::Downed;
    goblin.health.death.failures = 2;
    let mut encounter = scripted(vec![spawn(wizard, vec![]), goblin], vec![5]);

    let (action, spec) = hold();
    encounter.attach_effect(0, 1, &action, &spec, 1);
    assert!(encounter.combatants()[0].concentrating);

    encounter.take_turn(1);
    let state = encounter.combatants();
    assert_eq!(state[1].health.state, Vitality::Dead);
    assert!(state[1].effects.is_empty());
    assert!(!state[0].concentrating);
}

#[test]
fn refreshing_another_casters_effect_releases_them() {
    let mut wizard = def(3, "Ilse", Team::Pc, 27, 12);
    wizard.class = ClassKind::Wizard;
    let mut cleric = def(2, "Osric", Team::Pc, 20, 16);
    cleric.class = ClassKind::Cleric;
    let combatants = vec![
        spawn(wizard, vec![]),
        spawn(cleric, vec![]),
        spawn(def(13, "Ogre", Team::Monster, 59, 11), vec![]),
    ];
    let mut encounter = scripted(combatants, vec![1]);

    let (action, spec) = hold();
    encounter.attach_effect(0, 2, &action, &spec, 1);
    encounter.attach_effect(1, 2, &action, &spec, 2);

    let state = encounter.combatants();
    assert_eq!(state[2].effects.len(), 1);
    assert!(state[2].effects[0].is_linked_to(1));
    assert!(!state[0].concentrating);
    assert!(state[1].concentrating);
}
