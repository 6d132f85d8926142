//! Dice formulas such as `2d6+3`, `1d8 + 1d6 - 1`, `d20` or a plain `7`.
//!
//! A formula is parsed once, when the action record that owns it is loaded, and
//! rolled many times afterwards. Malformed formulas are rejected at parse time
//! with [`SimError::InvalidFormula`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SimError;
use crate::Dice;

const MAX_DICE_PER_GROUP: u32 = 1000;
const MAX_DIE_SIZE: u32 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiceGroup {
    pub count: u32,
    pub sides: u32,
    pub negative: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Formula {
    groups: Vec<DiceGroup>,
    bonus: i32,
}

enum Term {
    Dice { count: u32, sides: u32 },
    Flat(i32),
}

impl Formula {
    pub fn parse(src: &str) -> Result<Self, SimError> {
        let invalid = |reason: String| SimError::InvalidFormula {
            formula: src.to_string(),
            reason,
        };

        let compact: String = src
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();
        if compact.is_empty() {
            return Err(invalid("empty formula".to_string()));
        }

        let mut terms: Vec<(bool, String)> = Vec::new();
        let mut current = String::new();
        let mut negative = false;
        for (idx, ch) in compact.char_indices() {
            match ch {
                '+' | '-' => {
                    if current.is_empty() {
                        if idx != 0 {
                            return Err(invalid(format!("dangling operator at offset {idx}")));
                        }
                    } else {
                        terms.push((negative, std::mem::take(&mut current)));
                    }
                    negative = ch == '-';
                }
                _ => current.push(ch),
            }
        }
        if current.is_empty() {
            return Err(invalid("formula ends with an operator".to_string()));
        }
        terms.push((negative, current));

        let mut formula = Formula::default();
        for (negative, term) in terms {
            match parse_term(&term).map_err(invalid)? {
                Term::Dice { count, sides } => formula.groups.push(DiceGroup {
                    count,
                    sides,
                    negative,
                }),
                Term::Flat(value) => {
                    let signed = if negative { -value } else { value };
                    formula.bonus = formula.bonus.saturating_add(signed);
                }
            }
        }
        Ok(formula)
    }

    /// A formula that always rolls `value`.
    pub fn constant(value: i32) -> Self {
        Self {
            groups: Vec::new(),
            bonus: value,
        }
    }

    pub fn groups(&self) -> &[DiceGroup] {
        &self.groups
    }

    pub fn bonus(&self) -> i32 {
        self.bonus
    }

    pub fn is_constant(&self) -> bool {
        self.groups.iter().all(|g| g.count == 0)
    }

    /// Sampled value, floored at 0.
    pub fn roll(&self, dice: &mut Dice) -> i32 {
        self.roll_with_passes(dice, 1).max(0)
    }

    /// Critical roll: every die is rolled twice, the flat bonus is added once.
    pub fn roll_crit(&self, dice: &mut Dice) -> i32 {
        self.roll_with_passes(dice, 2).max(0)
    }

    fn roll_with_passes(&self, dice: &mut Dice, passes: u32) -> i32 {
        let mut total = self.bonus;
        for group in &self.groups {
            for _ in 0..group.count * passes {
                let face = dice.die(group.sides) as i32;
                if group.negative {
                    total = total.saturating_sub(face);
                } else {
                    total = total.saturating_add(face);
                }
            }
        }
        total
    }

    pub fn min(&self) -> i32 {
        self.extreme(|g| if g.negative { g.sides } else { 1 }).max(0)
    }

    pub fn max(&self) -> i32 {
        self.extreme(|g| if g.negative { 1 } else { g.sides }).max(0)
    }

    fn extreme(&self, face: impl Fn(&DiceGroup) -> u32) -> i32 {
        self.groups.iter().fold(self.bonus, |acc, g| {
            let part = i32::try_from(g.count.saturating_mul(face(g))).unwrap_or(i32::MAX);
            if g.negative {
                acc.saturating_sub(part)
            } else {
                acc.saturating_add(part)
            }
        })
    }

    /// Expected value before the floor at 0 is applied.
    pub fn average(&self) -> f64 {
        self.groups.iter().fold(f64::from(self.bonus), |acc, g| {
            let part = f64::from(g.count) * (f64::from(g.sides) + 1.0) / 2.0;
            if g.negative { acc - part } else { acc + part }
        })
    }
}

fn parse_term(term: &str) -> Result<Term, String> {
    match term.split_once('d') {
        Some((count, sides)) => {
            let count = if count.is_empty() {
                1
            } else {
                count
                    .parse::<u32>()
                    .map_err(|_| format!("bad dice count in '{term}'"))?
            };
            let sides = sides
                .parse::<u32>()
                .map_err(|_| format!("bad die size in '{term}'"))?;
            if sides == 0 {
                return Err(format!("zero-sided die in '{term}'"));
            }
            if sides > MAX_DIE_SIZE {
                return Err(format!("die larger than d{MAX_DIE_SIZE} in '{term}'"));
            }
            if count > MAX_DICE_PER_GROUP {
                return Err(format!("more than {MAX_DICE_PER_GROUP} dice in '{term}'"));
            }
            Ok(Term::Dice { count, sides })
        }
        None => term
            .parse::<i32>()
            .map(Term::Flat)
            .map_err(|_| format!("unrecognised term '{term}'")),
    }
}

impl std::str::FromStr for Formula {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Formula::parse(s)
    }
}

impl TryFrom<String> for Formula {
    type Error = SimError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Formula::parse(&value)
    }
}

impl From<Formula> for String {
    fn from(formula: Formula) -> Self {
        formula.to_string()
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for group in &self.groups {
            let dice = format!("{}d{}", group.count, group.sides);
            match (first, group.negative) {
                (true, false) => write!(f, "{dice}")?,
                (true, true) => write!(f, "-{dice}")?,
                (false, false) => write!(f, " + {dice}")?,
                (false, true) => write!(f, " - {dice}")?,
            }
            first = false;
        }
        if first {
            write!(f, "{}", self.bonus)
        } else if self.bonus > 0 {
            write!(f, " + {}", self.bonus)
        } else if self.bonus < 0 {
            write!(f, " - {}", self.bonus.unsigned_abs())
        } else {
            Ok(())
        }
    }
}
