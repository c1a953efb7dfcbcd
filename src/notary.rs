use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use blsttc::{PublicKey, SecretKey, Signature};
use core::fmt::Debug;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::identity::Party;
use crate::state::UniqueIdentifier;
use crate::transaction::{SignedTransaction, StateRef, TxId};
use crate::{Error, Result};

/// Why the notary refused to order a transaction.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictKind {
    /// Inputs already consumed, with the transaction that consumed each one.
    #[error("inputs already consumed: {0:?}")]
    InputsConsumed(BTreeMap<StateRef, TxId>),
    #[error("{linear_id:?} was already issued by {by:?}")]
    LinearIdIssued {
        linear_id: UniqueIdentifier,
        by: TxId,
    },
    #[error("transaction names {named:?} but was submitted to {expected:?}")]
    WrongNotary { expected: Party, named: Party },
    #[error("missing or invalid signatures from {0:?}")]
    InsufficientSignatures(BTreeSet<PublicKey>),
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotaryConfirmation {
    pub tx_id: TxId,
    /// Position of the transaction in the notary's total order.
    pub sequence: u64,
    pub notary: Party,
    pub sig: Signature,
}

impl Debug for NotaryConfirmation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}#{}@{:?}", self.tx_id, self.sequence, self.notary)
    }
}

fn confirmation_bytes(tx_id: &TxId, sequence: u64) -> Result<Vec<u8>> {
    Ok(bincode::serialize(&(tx_id, sequence))?)
}

impl NotaryConfirmation {
    pub fn verify(&self) -> Result<bool> {
        let bytes = confirmation_bytes(&self.tx_id, self.sequence)?;
        Ok(self.notary.key.verify(&self.sig, bytes))
    }
}

/// The single service that orders transactions and confirms finality.
pub trait OrderingAuthority: Send + Sync {
    fn identity(&self) -> &Party;

    /// Atomically accepts or rejects `stx`. Rejections are `Error::Conflict`.
    fn submit(&self, stx: &SignedTransaction) -> Result<NotaryConfirmation>;
}

#[derive(Debug, Default)]
struct UniquenessLedger {
    consumed: BTreeMap<StateRef, TxId>,
    issued: BTreeMap<UniqueIdentifier, TxId>,
    committed: BTreeMap<TxId, NotaryConfirmation>,
    next_sequence: u64,
}

pub struct Notary {
    identity: Party,
    secret_key: SecretKey,
    ledger: Mutex<UniquenessLedger>,
}

impl Debug for Notary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Notary({:?})", self.identity)
    }
}

impl Notary {
    pub fn new(name: impl Into<String>, secret_key: SecretKey) -> Self {
        Self {
            identity: Party::new(name, secret_key.public_key()),
            secret_key,
            ledger: Default::default(),
        }
    }

    /// Number of transactions committed so far.
    pub fn committed(&self) -> u64 {
        self.lock().next_sequence
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, UniquenessLedger> {
        self.ledger
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn reject(&self, tx_id: TxId, kind: ConflictKind) -> Error {
        warn!("[NOTARY] rejecting {:?}: {}", tx_id, kind);
        Error::Conflict(kind)
    }
}

impl OrderingAuthority for Notary {
    fn identity(&self) -> &Party {
        &self.identity
    }

    fn submit(&self, stx: &SignedTransaction) -> Result<NotaryConfirmation> {
        let tx_id = stx.id()?;
        let mut ledger = self.lock();

        if let Some(confirmation) = ledger.committed.get(&tx_id) {
            info!("[NOTARY] {:?} already committed, re-issuing confirmation", tx_id);
            return Ok(confirmation.clone());
        }

        if stx.tx.notary != self.identity {
            return Err(self.reject(
                tx_id,
                ConflictKind::WrongNotary {
                    expected: self.identity.clone(),
                    named: stx.tx.notary.clone(),
                },
            ));
        }

        let invalid = BTreeSet::from_iter(
            stx.sigs
                .iter()
                .filter(|sig| sig.verify(&tx_id).is_err())
                .map(|sig| sig.by)
                .chain(stx.missing_signers()),
        );
        if !invalid.is_empty() {
            return Err(self.reject(tx_id, ConflictKind::InsufficientSignatures(invalid)));
        }

        let consumed = BTreeMap::from_iter(stx.tx.inputs.iter().filter_map(|input| {
            ledger
                .consumed
                .get(input)
                .filter(|by| **by != tx_id)
                .map(|by| (*input, *by))
        }));
        if !consumed.is_empty() {
            return Err(self.reject(tx_id, ConflictKind::InputsConsumed(consumed)));
        }

        // An issuance mints its linear ids; anything consuming inputs may carry them forward.
        if stx.tx.inputs.is_empty() {
            for output in stx.tx.outputs.iter() {
                if let Some(by) = ledger.issued.get(&output.linear_id) {
                    return Err(self.reject(
                        tx_id,
                        ConflictKind::LinearIdIssued {
                            linear_id: output.linear_id.clone(),
                            by: *by,
                        },
                    ));
                }
            }
        }

        let sequence = ledger.next_sequence;
        let sig = self
            .secret_key
            .sign(confirmation_bytes(&tx_id, sequence)?);
        let confirmation = NotaryConfirmation {
            tx_id,
            sequence,
            notary: self.identity.clone(),
            sig,
        };

        ledger.next_sequence += 1;
        for input in stx.tx.inputs.iter() {
            ledger.consumed.insert(*input, tx_id);
        }
        if stx.tx.inputs.is_empty() {
            for output in stx.tx.outputs.iter() {
                ledger.issued.insert(output.linear_id.clone(), tx_id);
            }
        }
        ledger.committed.insert(tx_id, confirmation.clone());
        info!("[NOTARY] committed {:?} at sequence {}", tx_id, sequence);

        Ok(confirmation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::TransactionBuilder;
    use crate::state::IouState;
    use crate::transaction::{Command, CommandKind, TransactionSignature, WireTransaction};
    use rand::{prelude::StdRng, Rng, SeedableRng};

    struct Setup {
        notary: Notary,
        a: SecretKey,
        b: SecretKey,
    }

    fn setup() -> Setup {
        let mut rng = StdRng::from_seed([0u8; 32]);
        Setup {
            notary: Notary::new("notary", rng.gen()),
            a: rng.gen(),
            b: rng.gen(),
        }
    }

    impl Setup {
        fn wire(&self, inputs: &[StateRef], state: IouState) -> WireTransaction {
            let builder = inputs.iter().fold(
                TransactionBuilder::new(self.notary.identity().clone()),
                |builder, input| builder.add_input_state(*input),
            );
            builder
                .add_command(Command::new(CommandKind::Create, state.participants()))
                .add_output_state(state)
                .to_wire_transaction()
                .unwrap()
        }

        fn signed(&self, tx: WireTransaction) -> SignedTransaction {
            let tx_id = tx.id().unwrap();
            SignedTransaction::new(
                tx,
                [
                    TransactionSignature::sign(&self.a, &tx_id),
                    TransactionSignature::sign(&self.b, &tx_id),
                ],
            )
            .unwrap()
        }

        fn iou(&self, value: i64) -> IouState {
            IouState::new(value, self.a.public_key(), self.b.public_key())
        }
    }

    #[test]
    fn test_confirmations_are_sequenced_and_verifiable() -> Result<()> {
        let s = setup();
        let first = s.notary.submit(&s.signed(s.wire(&[], s.iou(1))))?;
        let second = s.notary.submit(&s.signed(s.wire(&[], s.iou(2))))?;

        assert_eq!((first.sequence, second.sequence), (0, 1));
        assert!(first.verify()?);
        assert!(second.verify()?);
        assert_eq!(s.notary.committed(), 2);
        Ok(())
    }

    #[test]
    fn test_resubmission_returns_same_confirmation() -> Result<()> {
        let s = setup();
        let stx = s.signed(s.wire(&[], s.iou(1)));

        let first = s.notary.submit(&stx)?;
        let again = s.notary.submit(&stx)?;
        assert_eq!(first, again);
        assert_eq!(s.notary.committed(), 1);
        Ok(())
    }

    #[test]
    fn test_double_spend_is_a_conflict() -> Result<()> {
        let s = setup();
        let issue = s.wire(&[], s.iou(1));
        let input = issue.out_ref(0)?;
        s.notary.submit(&s.signed(issue))?;

        let spend_1 = s.signed(s.wire(&[input], s.iou(1)));
        let spend_2 = s.signed(s.wire(&[input], s.iou(1)));
        let winner = s.notary.submit(&spend_1)?;

        match s.notary.submit(&spend_2) {
            Err(Error::Conflict(ConflictKind::InputsConsumed(consumed))) => {
                assert_eq!(consumed, BTreeMap::from_iter([(input, winner.tx_id)]));
            }
            other => panic!("expected conflict, got {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_reissuing_a_linear_id_is_a_conflict() -> Result<()> {
        let s = setup();
        let iou = s.iou(1);
        let mut again = s.iou(2);
        again.linear_id = iou.linear_id.clone();

        let first = s.notary.submit(&s.signed(s.wire(&[], iou)))?;
        assert!(matches!(
            s.notary.submit(&s.signed(s.wire(&[], again))),
            Err(Error::Conflict(ConflictKind::LinearIdIssued { by, .. })) if by == first.tx_id
        ));
        Ok(())
    }

    #[test]
    fn test_unrelated_issuances_do_not_conflict() -> Result<()> {
        let s = setup();
        for value in 1..=5 {
            s.notary.submit(&s.signed(s.wire(&[], s.iou(value))))?;
        }
        assert_eq!(s.notary.committed(), 5);
        Ok(())
    }

    #[test]
    fn test_partially_signed_transaction_is_rejected() -> Result<()> {
        let s = setup();
        let tx = s.wire(&[], s.iou(1));
        let tx_id = tx.id()?;
        let stx = SignedTransaction::new(tx, [TransactionSignature::sign(&s.a, &tx_id)])?;

        assert!(matches!(
            s.notary.submit(&stx),
            Err(Error::Conflict(ConflictKind::InsufficientSignatures(missing)))
                if missing == BTreeSet::from_iter([s.b.public_key()])
        ));
        assert_eq!(s.notary.committed(), 0);
        Ok(())
    }

    #[test]
    fn test_transaction_for_another_notary_is_rejected() -> Result<()> {
        let s = setup();
        let mut rng = StdRng::from_seed([9u8; 32]);
        let other = Notary::new("other", rng.gen());
        let stx = s.signed(s.wire(&[], s.iou(1)));

        match other.submit(&stx) {
            Err(Error::Conflict(ConflictKind::WrongNotary { expected, named })) => {
                assert_eq!(&expected, other.identity());
                assert_eq!(&named, s.notary.identity());
            }
            result => panic!("expected wrong notary, got {:?}", result),
        }
        assert_eq!(other.committed(), 0);
        Ok(())
    }
}
