//! Business rules a transaction must satisfy before anyone signs it.
//!
//! For a new IOU to be issued onto the ledger, a transaction is required which takes:
//! - Zero input states.
//! - One output state: the new [`IouState`](crate::state::IouState).
//! - A Create command with the public keys of both the obligor and the obligee.

use core::fmt::Display;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::transaction::{CommandKind, WireTransaction};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Clause {
    NoInputsOnIssuance,
    SingleOutput,
    DistinctParties,
    ParticipantsMustSign,
    PositiveValue,
}

impl Display for Clause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Clause::NoInputsOnIssuance => "no inputs should be consumed when issuing an IOU",
            Clause::SingleOutput => "only one output state should be created",
            Clause::DistinctParties => "the obligor and the obligee cannot be the same entity",
            Clause::ParticipantsMustSign => "all of the participants must be signers",
            Clause::PositiveValue => "the IOU's value must be non-negative",
        };
        f.write_str(text)
    }
}

fn require(clause: Clause, holds: bool) -> Result<()> {
    if holds {
        Ok(())
    } else {
        Err(Error::RuleViolation(clause))
    }
}

pub trait Contract: Send + Sync {
    fn verify(&self, tx: &WireTransaction) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IouContract;

impl IouContract {
    fn verify_create(&self, tx: &WireTransaction) -> Result<()> {
        require(Clause::NoInputsOnIssuance, tx.inputs.is_empty())?;
        require(Clause::SingleOutput, tx.outputs.len() == 1)?;
        let out = &tx.outputs[0];
        require(Clause::DistinctParties, out.obligor != out.obligee)?;
        require(
            Clause::ParticipantsMustSign,
            tx.command
                .signers
                .is_superset(&BTreeSet::from_iter(out.participants())),
        )?;
        require(Clause::PositiveValue, out.value > 0)
    }
}

impl Contract for IouContract {
    fn verify(&self, tx: &WireTransaction) -> Result<()> {
        match tx.command.kind {
            CommandKind::Create => self.verify_create(tx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Party;
    use crate::state::IouState;
    use crate::transaction::{Command, StateRef, TxId};
    use blsttc::{PublicKey, SecretKey};
    use quickcheck_macros::quickcheck;
    use rand::{prelude::StdRng, Rng, SeedableRng};

    fn keys() -> (PublicKey, PublicKey, Party) {
        let mut rng = StdRng::from_seed([0u8; 32]);
        let a = rng.gen::<SecretKey>().public_key();
        let b = rng.gen::<SecretKey>().public_key();
        let notary = Party::new("notary", rng.gen::<SecretKey>().public_key());
        (a, b, notary)
    }

    fn create(value: i64, obligor: PublicKey, obligee: PublicKey, notary: Party) -> WireTransaction {
        let state = IouState::new(value, obligor, obligee);
        WireTransaction {
            inputs: vec![],
            command: Command::new(CommandKind::Create, state.participants()),
            outputs: vec![state],
            notary,
        }
    }

    fn violated(tx: &WireTransaction) -> Option<Clause> {
        match IouContract.verify(tx) {
            Err(Error::RuleViolation(clause)) => Some(clause),
            _ => None,
        }
    }

    #[test]
    fn test_valid_issuance_passes() {
        let (a, b, notary) = keys();
        assert!(IouContract.verify(&create(1, a, b, notary)).is_ok());
    }

    #[test]
    fn test_issuance_with_inputs_is_rejected() {
        let (a, b, notary) = keys();
        let mut tx = create(1, a, b, notary);
        tx.inputs.push(StateRef {
            tx_id: TxId::calculate(b"previous"),
            index: 0,
        });
        assert_eq!(violated(&tx), Some(Clause::NoInputsOnIssuance));
    }

    #[test]
    fn test_issuance_must_have_exactly_one_output() {
        let (a, b, notary) = keys();
        let mut tx = create(1, a, b, notary);
        tx.outputs.push(tx.outputs[0].clone());
        assert_eq!(violated(&tx), Some(Clause::SingleOutput));

        tx.outputs.clear();
        assert_eq!(violated(&tx), Some(Clause::SingleOutput));
    }

    #[test]
    fn test_self_dealing_is_rejected() {
        let (a, _, notary) = keys();
        assert_eq!(violated(&create(1, a, a, notary)), Some(Clause::DistinctParties));
    }

    #[test]
    fn test_all_participants_must_sign() {
        let (a, b, notary) = keys();
        let mut tx = create(1, a, b, notary);
        tx.command.signers.remove(&b);
        assert_eq!(violated(&tx), Some(Clause::ParticipantsMustSign));
    }

    #[test]
    fn test_negative_value_names_the_clause() {
        let (a, b, notary) = keys();
        let err = IouContract.verify(&create(-1, a, b, notary)).unwrap_err();
        assert!(err.to_string().contains("value must be non-negative"));
    }

    #[quickcheck]
    fn prop_non_positive_values_are_rejected(value: i64) -> bool {
        let (a, b, notary) = keys();
        let tx = create(value, a, b, notary);
        if value > 0 {
            violated(&tx).is_none()
        } else {
            violated(&tx) == Some(Clause::PositiveValue)
        }
    }
}
