use thiserror::Error;

use crate::model::Team;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimError {
    #[error("empty roster: no {team} resolved from the requested ids")]
    EmptyRoster { team: Team },

    #[error("invalid dice formula '{formula}': {reason}")]
    InvalidFormula { formula: String, reason: String },

    #[error("invalid record {kind} #{id}: {reason}")]
    InvalidRecord {
        kind: &'static str,
        id: u32,
        reason: String,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to build worker pool: {0}")]
    ThreadPool(String),
}
