//! Read-only definition records: what a combatant is and what an action does.
//!
//! Records are validated once when the record store is built and shared behind
//! `Arc` by every trial of a run. Free-text capability tags and class names are
//! resolved here into closed enums so the combat code never compares strings.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::formula::Formula;
use crate::{ability_mod, Dice};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ability {
    Str,
    Dex,
    Con,
    Int,
    Wis,
    Cha,
}

impl Ability {
    pub const ALL: [Ability; 6] = [
        Ability::Str,
        Ability::Dex,
        Ability::Con,
        Ability::Int,
        Ability::Wis,
        Ability::Cha,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AbilityScores {
    #[serde(rename = "str")]
    pub str_: i32,
    pub dex: i32,
    pub con: i32,
    #[serde(rename = "int")]
    pub int_: i32,
    pub wis: i32,
    pub cha: i32,
}

impl Default for AbilityScores {
    fn default() -> Self {
        Self {
            str_: 10,
            dex: 10,
            con: 10,
            int_: 10,
            wis: 10,
            cha: 10,
        }
    }
}

impl AbilityScores {
    pub fn score(&self, ability: Ability) -> i32 {
        match ability {
            Ability::Str => self.str_,
            Ability::Dex => self.dex,
            Ability::Con => self.con,
            Ability::Int => self.int_,
            Ability::Wis => self.wis,
            Ability::Cha => self.cha,
        }
    }

    pub fn mod_of(&self, ability: Ability) -> i32 {
        ability_mod(self.score(ability))
    }

    /// Highest of the six modifiers.
    pub fn best_mod(&self) -> i32 {
        Ability::ALL
            .iter()
            .map(|&a| self.mod_of(a))
            .max()
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Team {
    #[serde(alias = "pc")]
    Pc,
    #[serde(alias = "monster")]
    Monster,
}

impl Team {
    pub fn opponent(self) -> Team {
        match self {
            Team::Pc => Team::Monster,
            Team::Monster => Team::Pc,
        }
    }
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Team::Pc => f.write_str("PCs"),
            Team::Monster => f.write_str("monsters"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    #[default]
    Front,
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetBehavior {
    #[default]
    Random,
    FocusLowHp,
    FocusBackline,
}

/// Spell-slot progression a class follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Caster {
    Full,
    Half,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ClassKind {
    Barbarian,
    Bard,
    Cleric,
    Druid,
    Fighter,
    Monk,
    Paladin,
    Ranger,
    Rogue,
    Sorcerer,
    Warlock,
    Wizard,
    /// Monsters and anything unrecognised.
    #[default]
    Other,
}

impl ClassKind {
    pub fn caster(&self) -> Caster {
        use ClassKind::*;
        match self {
            Bard | Cleric | Druid | Sorcerer | Warlock | Wizard => Caster::Full,
            Paladin | Ranger => Caster::Half,
            Barbarian | Fighter | Monk | Rogue | Other => Caster::None,
        }
    }

    /// Weapon attacks per attack action at `level`.
    pub fn attacks_at(&self, level: u8) -> u8 {
        use ClassKind::*;
        match self {
            Fighter if level >= 11 => 3,
            Fighter | Barbarian | Monk | Paladin | Ranger if level >= 5 => 2,
            _ => 1,
        }
    }

    pub fn spellcasting_ability(&self) -> Option<Ability> {
        use ClassKind::*;
        match self {
            Wizard => Some(Ability::Int),
            Cleric | Druid | Ranger => Some(Ability::Wis),
            Bard | Sorcerer | Warlock | Paladin => Some(Ability::Cha),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        use ClassKind::*;
        match self {
            Barbarian => "barbarian",
            Bard => "bard",
            Cleric => "cleric",
            Druid => "druid",
            Fighter => "fighter",
            Monk => "monk",
            Paladin => "paladin",
            Ranger => "ranger",
            Rogue => "rogue",
            Sorcerer => "sorcerer",
            Warlock => "warlock",
            Wizard => "wizard",
            Other => "other",
        }
    }
}

impl From<String> for ClassKind {
    fn from(value: String) -> Self {
        use ClassKind::*;
        match value.trim().to_ascii_lowercase().as_str() {
            "barbarian" => Barbarian,
            "bard" => Bard,
            "cleric" => Cleric,
            "druid" => Druid,
            "fighter" => Fighter,
            "monk" => Monk,
            "paladin" => Paladin,
            "ranger" => Ranger,
            "rogue" => Rogue,
            "sorcerer" => Sorcerer,
            "warlock" => Warlock,
            "wizard" => Wizard,
            _ => Other,
        }
    }
}

impl From<ClassKind> for String {
    fn from(value: ClassKind) -> Self {
        value.name().to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    RecklessAttack,
    GreatWeaponMaster,
    WarCaster,
    /// +5 to initiative.
    Initiative,
}

impl Feature {
    /// Resolve a free-text tag. Case, spaces and punctuation are ignored.
    pub fn from_tag(tag: &str) -> Option<Self> {
        let key: String = tag
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match key.as_str() {
            "recklessattack" | "reckless" => Some(Feature::RecklessAttack),
            "greatweaponmaster" | "gwm" | "powerattack" => Some(Feature::GreatWeaponMaster),
            "warcaster" => Some(Feature::WarCaster),
            "initiative" | "alert" => Some(Feature::Initiative),
            _ => None,
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            Feature::RecklessAttack => "Reckless Attack",
            Feature::GreatWeaponMaster => "Great Weapon Master",
            Feature::WarCaster => "War Caster",
            Feature::Initiative => "Initiative",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct FeatureSet {
    features: Vec<Feature>,
}

impl FeatureSet {
    pub fn contains(&self, feature: Feature) -> bool {
        self.features.contains(&feature)
    }

    pub fn insert(&mut self, feature: Feature) {
        if !self.contains(feature) {
            self.features.push(feature);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Feature> + '_ {
        self.features.iter().copied()
    }
}

impl FromIterator<Feature> for FeatureSet {
    fn from_iter<I: IntoIterator<Item = Feature>>(iter: I) -> Self {
        let mut set = FeatureSet::default();
        for feature in iter {
            set.insert(feature);
        }
        set
    }
}

impl From<Vec<String>> for FeatureSet {
    fn from(tags: Vec<String>) -> Self {
        tags.iter()
            .filter_map(|tag| {
                let feature = Feature::from_tag(tag);
                if feature.is_none() {
                    tracing::debug!(tag = %tag, "ignoring unrecognised feature tag");
                }
                feature
            })
            .collect()
    }
}

impl From<FeatureSet> for Vec<String> {
    fn from(set: FeatureSet) -> Self {
        set.iter().map(|f| f.tag().to_string()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Prone,
    Blinded,
    Paralyzed,
}

impl Condition {
    /// Whether the condition costs the bearer its turn.
    pub fn incapacitates(self) -> bool {
        matches!(self, Condition::Paralyzed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuffStat {
    #[serde(rename = "buff_atk", alias = "attack")]
    Attack,
    #[serde(rename = "buff_ac", alias = "armor_class")]
    ArmorClass,
}

/// Buff size: a flat number or a formula rolled once when the buff lands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Magnitude {
    Flat(i32),
    Dice(Formula),
}

impl Magnitude {
    pub fn roll(&self, dice: &mut Dice) -> i32 {
        match self {
            Magnitude::Flat(value) => *value,
            Magnitude::Dice(formula) => formula.roll(dice),
        }
    }
}

/// Who receives an action's effect. `self` means the actor for attack and save
/// actions and the healed ally for heal actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectTarget {
    #[serde(rename = "self", alias = "ally")]
    Friendly,
    #[serde(rename = "enemy")]
    Hostile,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EffectKind {
    Buff { stat: BuffStat, magnitude: Magnitude },
    Debuff { condition: Condition },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectSpec {
    #[serde(flatten)]
    pub kind: EffectKind,
    pub target: EffectTarget,
    /// Rounds, counted down at the start of the bearer's turns.
    pub duration: i32,
    #[serde(default)]
    pub concentration: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Attack,
    Save,
    Heal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDefinition {
    pub id: u32,
    pub name: String,
    pub category: ActionKind,
    /// Damage, or healing for `heal` actions.
    #[serde(alias = "damage")]
    pub formula: Formula,
    /// Spell level; 0 is at-will.
    #[serde(default)]
    pub level: u8,
    #[serde(default)]
    pub save_ability: Option<Ability>,
    #[serde(default)]
    pub effect: Option<EffectSpec>,
    /// Area of effect: resolves against every valid target.
    #[serde(default, alias = "aoe")]
    pub area: bool,
}

impl ActionDefinition {
    pub fn new(id: u32, name: impl Into<String>, category: ActionKind, formula: Formula) -> Self {
        Self {
            id,
            name: name.into(),
            category,
            formula,
            level: 0,
            save_ability: None,
            effect: None,
            area: false,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.level > 9 {
            return Err(format!("spell level {} is above 9", self.level));
        }
        if self.category == ActionKind::Save && self.save_ability.is_none() {
            return Err("save action without a save_ability".to_string());
        }
        Ok(())
    }
}

fn default_level() -> u8 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatantDefinition {
    pub id: u32,
    pub name: String,
    pub team: Team,
    #[serde(default)]
    pub class: ClassKind,
    #[serde(default = "default_level")]
    pub level: u8,
    #[serde(default)]
    pub abilities: AbilityScores,
    #[serde(alias = "hp")]
    pub max_hp: i32,
    #[serde(alias = "ac")]
    pub armor_class: i32,
    /// Granted action ids; ids missing from the store are skipped.
    #[serde(default)]
    pub actions: Vec<u32>,
    #[serde(default)]
    pub features: FeatureSet,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub behavior: TargetBehavior,
}

impl CombatantDefinition {
    pub fn new(id: u32, name: impl Into<String>, team: Team, max_hp: i32, armor_class: i32) -> Self {
        Self {
            id,
            name: name.into(),
            team,
            class: ClassKind::Other,
            level: 1,
            abilities: AbilityScores::default(),
            max_hp,
            armor_class,
            actions: Vec::new(),
            features: FeatureSet::default(),
            position: Position::Front,
            behavior: TargetBehavior::Random,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_hp < 1 {
            return Err(format!("max_hp must be at least 1, got {}", self.max_hp));
        }
        if !(1..=20).contains(&self.level) {
            return Err(format!("level must be within 1..=20, got {}", self.level));
        }
        Ok(())
    }
}
