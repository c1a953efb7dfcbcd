use blsttc::PublicKey;
use core::fmt::Debug;
use std::collections::BTreeSet;
use thiserror::Error;

use crate::contract::Clause;
use crate::flow::{Progress, Stage};
use crate::identity::{Party, PartyRef};
use crate::notary::ConflictKind;
use crate::session::SessionId;
use crate::transaction::TxId;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Could not resolve {0:?} to a signing key")]
    UnknownParty(PartyRef),
    #[error("Contract verification failed: {0}")]
    RuleViolation(Clause),
    #[error("Counterparty refused to sign: {0}")]
    Refused(String),
    #[error("Session with {peer:?} failed: {reason}")]
    SessionFailure { peer: Party, reason: String },
    #[error("Notary rejected the transaction: {0}")]
    Conflict(ConflictKind),
    #[error("The network map does not list any notary")]
    NoNotary,
    #[error("Key {0:?} is hosted here but missing from the key store")]
    KeyNotHeld(PublicKey),
    #[error("Key {0:?} is not a required signer of the transaction")]
    NotASigner(PublicKey),
    #[error("Signature by {0:?} does not verify against the transaction id")]
    InvalidSignature(PublicKey),
    #[error("Transaction is missing signatures from {0:?}")]
    MissingSignatures(BTreeSet<PublicKey>),
    #[error("Notary confirmation does not certify transaction {0}")]
    InvalidConfirmation(TxId),
    #[error("Expected transaction {expected} but received {got}")]
    TransactionMismatch { expected: TxId, got: TxId },
    #[error("Unexpected {message} while {stage}")]
    UnexpectedMessage { message: String, stage: Stage },
    #[error("Packet was not destined for this node: {dest:?} != {node:?}")]
    WrongDestination { dest: Party, node: Party },
    #[error("No flow is listening on session {0:?}")]
    UnknownSession(SessionId),
    #[error("Invalid stage transition: {progress:?} while {from}")]
    InvalidTransition { from: Stage, progress: Progress },
    #[error("A transaction needs a command before it can be built")]
    MissingCommand,
    #[error("Failed to encode with bincode")]
    Encoding(#[from] bincode::Error),
}

impl Error {
    /// Errors after which the caller may start a fresh flow for the same IOU.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::SessionFailure { .. } | Error::Conflict(_))
    }
}

/// A terminal failure together with the stage it happened at.
#[derive(Error, Debug)]
#[error("flow failed while {stage}: {error}")]
pub struct FlowError {
    pub stage: Stage,
    #[source]
    pub error: Error,
}

pub type Result<T> = std::result::Result<T, Error>;
