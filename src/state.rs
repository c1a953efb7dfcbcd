use blsttc::PublicKey;
use core::fmt::Debug;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tracks one logical fact across every transaction that supersedes it.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UniqueIdentifier {
    pub external_id: Option<String>,
    pub id: Uuid,
}

impl Debug for UniqueIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.external_id {
            Some(external_id) => write!(f, "{}_{}", external_id, self.id),
            None => write!(f, "{}", self.id),
        }
    }
}

impl UniqueIdentifier {
    pub fn new(external_id: Option<String>) -> Self {
        Self {
            external_id,
            id: Uuid::new_v4(),
        }
    }
}

impl Default for UniqueIdentifier {
    fn default() -> Self {
        Self::new(None)
    }
}

/// An IOU: `obligor` owes `obligee` the amount `value`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IouState {
    pub value: i64,
    pub obligor: PublicKey,
    pub obligee: PublicKey,
    pub linear_id: UniqueIdentifier,
}

impl Debug for IouState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "IOU({} {:?}->{:?} #{:?})",
            self.value, self.obligor, self.obligee, self.linear_id
        )
    }
}

impl IouState {
    pub fn new(value: i64, obligor: PublicKey, obligee: PublicKey) -> Self {
        Self {
            value,
            obligor,
            obligee,
            linear_id: Default::default(),
        }
    }

    pub fn participants(&self) -> [PublicKey; 2] {
        [self.obligor, self.obligee]
    }
}
