use core::fmt::{Debug, Display};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::FlowError;
use crate::vault::FinalRecord;
use crate::{Error, Result};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FlowId(pub Uuid);

impl Debug for FlowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "flow:{}", &self.0.simple().to_string()[..8])
    }
}

impl FlowId {
    pub fn random() -> Self {
        FlowId(Uuid::new_v4())
    }
}

// State transition
//
// +------------+     +------------+     +------------+     +------------+     +------------+
// |  Building  | --> |  Signing   | --> | Collecting | --> | Finalising | --> |  Terminal  |
// +------------+     +------------+     +------------+     +------------+     +------------+
//                          \                                     ^
//                           \---------- all keys local ---------/
//
// Any failure moves a live stage straight to Terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stage {
    Building,
    Signing,
    Collecting,
    Finalising,
    Terminal,
}

impl Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Stage::Building => "building a new transaction",
            Stage::Signing => "signing the transaction with our keys",
            Stage::Collecting => "collecting the counterparty's signature",
            Stage::Finalising => "obtaining notary signature and recording transaction",
            Stage::Terminal => "terminated",
        };
        f.write_str(text)
    }
}

/// What just happened in a flow; fed to [`Stage::advance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Built,
    Signed { remote_hosts: usize },
    Collected,
    Finalised,
    Failed,
}

impl Stage {
    pub fn advance(self, progress: Progress) -> Result<Stage> {
        match (self, progress) {
            (Stage::Terminal, _) => Err(Error::InvalidTransition {
                from: self,
                progress,
            }),
            (_, Progress::Failed) => Ok(Stage::Terminal),
            (Stage::Building, Progress::Built) => Ok(Stage::Signing),
            (Stage::Signing, Progress::Signed { remote_hosts: 0 }) => Ok(Stage::Finalising),
            (Stage::Signing, Progress::Signed { .. }) => Ok(Stage::Collecting),
            (Stage::Collecting, Progress::Collected) => Ok(Stage::Finalising),
            (Stage::Finalising, Progress::Finalised) => Ok(Stage::Terminal),
            _ => Err(Error::InvalidTransition {
                from: self,
                progress,
            }),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Terminal)
    }
}

/// How a flow ended. Never changes once set.
#[derive(Debug)]
pub enum Outcome {
    Finalized(FinalRecord),
    Rejected(FlowError),
}

impl Outcome {
    pub fn record(&self) -> Option<&FinalRecord> {
        match self {
            Outcome::Finalized(record) => Some(record),
            Outcome::Rejected(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&FlowError> {
        match self {
            Outcome::Finalized(_) => None,
            Outcome::Rejected(err) => Some(err),
        }
    }

    pub fn is_finalized(&self) -> bool {
        matches!(self, Outcome::Finalized(_))
    }
}
