use std::collections::{BTreeMap, BTreeSet};

use blsttc::{PublicKey, SecretKey, Signature};
use core::fmt::{Debug, Display};
use serde::{Deserialize, Serialize};
use tiny_keccak::{Hasher, Sha3};

use crate::identity::Party;
use crate::state::IouState;
use crate::{Error, Result};

const TX_ID_SIZE: usize = 32;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TxId([u8; TX_ID_SIZE]);

impl TxId {
    pub fn calculate(data: &[u8]) -> Self {
        let mut sha3 = Sha3::v256();
        let mut hash = [0; TX_ID_SIZE];
        sha3.update(data);
        sha3.finalize(&mut hash);
        TxId(hash)
    }

    pub fn as_bytes(&self) -> &[u8; TX_ID_SIZE] {
        &self.0
    }
}

impl Display for TxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl Debug for TxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tx:{}", hex::encode(&self.0[..4]))
    }
}

/// Points at output `index` of transaction `tx_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StateRef {
    pub tx_id: TxId,
    pub index: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CommandKind {
    /// Issue a new IOU onto the ledger.
    Create,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub kind: CommandKind,
    pub signers: BTreeSet<PublicKey>,
}

impl Command {
    pub fn new(kind: CommandKind, signers: impl IntoIterator<Item = PublicKey>) -> Self {
        Self {
            kind,
            signers: signers.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireTransaction {
    pub inputs: Vec<StateRef>,
    pub outputs: Vec<IouState>,
    pub command: Command,
    pub notary: Party,
}

impl WireTransaction {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(&self)?)
    }

    pub fn id(&self) -> Result<TxId> {
        Ok(TxId::calculate(&self.to_bytes()?))
    }

    pub fn out_ref(&self, index: usize) -> Result<StateRef> {
        Ok(StateRef {
            tx_id: self.id()?,
            index: index as u32,
        })
    }
}

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionSignature {
    pub by: PublicKey,
    pub sig: Signature,
}

impl Debug for TransactionSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sig@{:?}", self.by)
    }
}

impl TransactionSignature {
    pub fn sign(secret_key: &SecretKey, tx_id: &TxId) -> Self {
        Self {
            by: secret_key.public_key(),
            sig: secret_key.sign(tx_id.as_bytes()),
        }
    }

    pub fn verify(&self, tx_id: &TxId) -> Result<()> {
        if self.by.verify(&self.sig, tx_id.as_bytes()) {
            Ok(())
        } else {
            Err(Error::InvalidSignature(self.by))
        }
    }
}

/// Signatures collected over one transaction id, at most one per key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endorsements(BTreeMap<PublicKey, Signature>);

impl Endorsements {
    /// Adds every signature that verifies against `tx_id`.
    ///
    /// A key that already signed keeps its first signature, so merging is
    /// idempotent and the order of merges does not change the signer set.
    pub fn merge(
        &mut self,
        tx_id: &TxId,
        signatures: impl IntoIterator<Item = TransactionSignature>,
    ) -> Result<()> {
        let signatures = Vec::from_iter(signatures);
        for signature in signatures.iter() {
            signature.verify(tx_id)?;
        }
        for TransactionSignature { by, sig } in signatures {
            self.0.entry(by).or_insert(sig);
        }
        Ok(())
    }

    pub fn signers(&self) -> BTreeSet<PublicKey> {
        self.0.keys().copied().collect()
    }

    pub fn contains(&self, key: &PublicKey) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = TransactionSignature> + '_ {
        self.0.iter().map(|(by, sig)| TransactionSignature {
            by: *by,
            sig: sig.clone(),
        })
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub tx: WireTransaction,
    pub sigs: Endorsements,
}

impl SignedTransaction {
    pub fn new(
        tx: WireTransaction,
        signatures: impl IntoIterator<Item = TransactionSignature>,
    ) -> Result<Self> {
        Self {
            tx,
            sigs: Default::default(),
        }
        .with_additional_signatures(signatures)
    }

    pub fn id(&self) -> Result<TxId> {
        self.tx.id()
    }

    pub fn with_additional_signatures(
        mut self,
        signatures: impl IntoIterator<Item = TransactionSignature>,
    ) -> Result<Self> {
        let tx_id = self.id()?;
        self.sigs.merge(&tx_id, signatures)?;
        Ok(self)
    }

    pub fn required_signers(&self) -> &BTreeSet<PublicKey> {
        &self.tx.command.signers
    }

    pub fn missing_signers(&self) -> BTreeSet<PublicKey> {
        self.required_signers()
            .iter()
            .filter(|key| !self.sigs.contains(key))
            .copied()
            .collect()
    }

    /// Every attached signature is valid and only keys in `allowed_missing`
    /// have yet to sign.
    pub fn verify_signatures_except(&self, allowed_missing: &BTreeSet<PublicKey>) -> Result<()> {
        let tx_id = self.id()?;
        for signature in self.sigs.iter() {
            signature.verify(&tx_id)?;
        }
        let missing = BTreeSet::from_iter(
            self.missing_signers()
                .into_iter()
                .filter(|key| !allowed_missing.contains(key)),
        );
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::MissingSignatures(missing))
        }
    }

    pub fn verify_required_signatures(&self) -> Result<()> {
        self.verify_signatures_except(&BTreeSet::new())
    }

    /// Every attached signature is valid and comes from a required signer.
    /// Signers that have not signed yet are not checked.
    pub fn verify_present_signatures(&self) -> Result<()> {
        let tx_id = self.id()?;
        for signature in self.sigs.iter() {
            if !self.required_signers().contains(&signature.by) {
                return Err(Error::NotASigner(signature.by));
            }
            signature.verify(&tx_id)?;
        }
        Ok(())
    }
}
