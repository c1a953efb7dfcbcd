use std::collections::BTreeMap;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::notary::NotaryConfirmation;
use crate::state::{IouState, UniqueIdentifier};
use crate::transaction::{SignedTransaction, StateRef, TxId};
use crate::{Error, Result};

/// A fully signed transaction together with the notary's confirmation of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalRecord {
    pub stx: SignedTransaction,
    pub confirmation: NotaryConfirmation,
}

impl FinalRecord {
    pub fn id(&self) -> Result<TxId> {
        self.stx.id()
    }

    pub fn verify(&self) -> Result<()> {
        let tx_id = self.id()?;
        self.stx.verify_required_signatures()?;
        if self.confirmation.tx_id != tx_id
            || self.confirmation.notary != self.stx.tx.notary
            || !self.confirmation.verify()?
        {
            return Err(Error::InvalidConfirmation(tx_id));
        }
        Ok(())
    }

    pub fn outputs(&self) -> &[IouState] {
        &self.stx.tx.outputs
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateAndRef {
    pub state: IouState,
    pub state_ref: StateRef,
}

/// Where a participant keeps finalised transactions.
pub trait LedgerStore: Send + Sync {
    /// Stores a verified record. Recording the same record twice is a no-op.
    fn record(&mut self, record: FinalRecord) -> Result<()>;

    fn transaction(&self, tx_id: &TxId) -> Option<&FinalRecord>;

    /// The latest state carrying `linear_id`.
    fn state_by_linear_id(&self, linear_id: &UniqueIdentifier) -> Option<StateAndRef>;

    fn states(&self) -> Vec<StateAndRef>;
}

#[derive(Debug, Default)]
pub struct Vault {
    transactions: BTreeMap<TxId, FinalRecord>,
    heads: BTreeMap<UniqueIdentifier, StateRef>,
}

impl Vault {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    fn resolve(&self, state_ref: &StateRef) -> Option<StateAndRef> {
        let record = self.transactions.get(&state_ref.tx_id)?;
        let state = record.outputs().get(state_ref.index as usize)?;
        Some(StateAndRef {
            state: state.clone(),
            state_ref: *state_ref,
        })
    }
}

impl LedgerStore for Vault {
    fn record(&mut self, record: FinalRecord) -> Result<()> {
        record.verify()?;
        let tx_id = record.id()?;
        if self.transactions.contains_key(&tx_id) {
            debug!("[VAULT] {:?} already recorded", tx_id);
            return Ok(());
        }

        for input in record.stx.tx.inputs.iter() {
            if let Some(consumed) = self.resolve(input) {
                self.heads.remove(&consumed.state.linear_id);
            }
        }
        for (index, state) in record.outputs().iter().enumerate() {
            self.heads.insert(
                state.linear_id.clone(),
                StateRef {
                    tx_id,
                    index: index as u32,
                },
            );
        }
        debug!(
            "[VAULT] recorded {:?} at sequence {}",
            tx_id, record.confirmation.sequence
        );
        self.transactions.insert(tx_id, record);
        Ok(())
    }

    fn transaction(&self, tx_id: &TxId) -> Option<&FinalRecord> {
        self.transactions.get(tx_id)
    }

    fn state_by_linear_id(&self, linear_id: &UniqueIdentifier) -> Option<StateAndRef> {
        self.heads
            .get(linear_id)
            .and_then(|state_ref| self.resolve(state_ref))
    }

    fn states(&self) -> Vec<StateAndRef> {
        self.heads
            .values()
            .filter_map(|state_ref| self.resolve(state_ref))
            .collect()
    }
}
