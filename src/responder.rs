use std::collections::BTreeSet;

use blsttc::PublicKey;
use log::{debug, info, warn};

use crate::error::FlowError;
use crate::flow::{Outcome, Stage};
use crate::node::ServiceHub;
use crate::session::{Message, Packet, Session};
use crate::transaction::{SignedTransaction, TransactionSignature, TxId};
use crate::vault::{FinalRecord, LedgerStore};
use crate::{Error, Result};

/// The counterparty side of an agreement run.
///
/// Lives in [`Stage::Signing`] until it has answered the proposal, then in
/// [`Stage::Finalising`] until the final record arrives.
#[derive(Debug)]
pub struct Responder {
    session: Session,
    stage: Stage,
    signed: Option<TxId>,
    outcome: Option<Outcome>,
}

fn refusal_reason(err: &Error) -> String {
    match err {
        Error::Refused(reason) => reason.clone(),
        other => other.to_string(),
    }
}

impl Responder {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            stage: Stage::Signing,
            signed: None,
            outcome: None,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    pub fn into_outcome(self) -> Option<Outcome> {
        self.outcome
    }

    pub fn handle_packet(&mut self, hub: &mut ServiceHub, packet: Packet) -> Vec<Packet> {
        if self.stage.is_terminal() {
            debug!(
                "[IOU-{}] {:?} ignoring {} after termination",
                hub.me.name,
                self.session.id,
                packet.message.kind()
            );
            return vec![];
        }

        let message = match self.session.receive(packet) {
            Ok(message) => message,
            Err(err) => {
                self.reject(hub, err);
                return vec![];
            }
        };

        match (self.stage, message) {
            (
                Stage::Signing,
                Message::Proposal {
                    stx,
                    requested_keys,
                },
            ) => match self.endorse(hub, &stx, &requested_keys) {
                Ok(signatures) => {
                    info!(
                        "[IOU-{}] endorsing {:?} for {:?}",
                        hub.me.name,
                        self.signed,
                        self.session.peer
                    );
                    self.stage = Stage::Finalising;
                    vec![self.session.send(Message::Endorsement { signatures })]
                }
                Err(err) => {
                    let refusal = self.session.send(Message::Refusal {
                        reason: refusal_reason(&err),
                    });
                    self.reject(hub, err);
                    vec![refusal]
                }
            },
            (Stage::Finalising, Message::FinalRecord { record }) => {
                match self.record(hub, record) {
                    Ok(record) => {
                        info!(
                            "[IOU-{}] {:?} recorded {:?} at sequence {}",
                            hub.me.name, self.session.id, self.signed, record.confirmation.sequence
                        );
                        self.stage = Stage::Terminal;
                        self.outcome = Some(Outcome::Finalized(record));
                    }
                    Err(err) => self.reject(hub, err),
                }
                vec![]
            }
            (_, Message::Abort { reason }) => {
                let err = self.session.failure(reason);
                self.reject(hub, err);
                vec![]
            }
            (stage, message) => {
                self.reject(
                    hub,
                    Error::UnexpectedMessage {
                        message: message.kind().to_string(),
                        stage,
                    },
                );
                vec![]
            }
        }
    }

    /// The transport lost the initiator before the run completed.
    pub fn handle_session_failure(&mut self, hub: &ServiceHub, reason: &str) {
        if !self.stage.is_terminal() {
            let err = self.session.failure(reason);
            self.reject(hub, err);
        }
    }

    fn endorse(
        &mut self,
        hub: &ServiceHub,
        stx: &SignedTransaction,
        requested_keys: &BTreeSet<PublicKey>,
    ) -> Result<Vec<TransactionSignature>> {
        let tx_id = stx.id()?;
        for key in requested_keys {
            if !stx.required_signers().contains(key) {
                return Err(Error::NotASigner(*key));
            }
            if !hub.keys.holds(key) {
                return Err(Error::KeyNotHeld(*key));
            }
        }

        // Other hosts may still be signing, but an initiator that is itself a
        // signer must have signed before asking anyone else.
        stx.verify_present_signatures()?;
        let initiator = &self.session.peer;
        if stx.required_signers().contains(&initiator.key) && !stx.sigs.contains(&initiator.key) {
            return Err(Error::MissingSignatures(BTreeSet::from_iter([initiator.key])));
        }
        hub.contract.verify(&stx.tx)?;
        hub.policy.check(stx)?;

        let signatures = requested_keys
            .iter()
            .map(|key| hub.keys.sign(key, &tx_id).ok_or(Error::KeyNotHeld(*key)))
            .collect::<Result<Vec<_>>>()?;
        self.signed = Some(tx_id);
        Ok(signatures)
    }

    fn record(&mut self, hub: &mut ServiceHub, record: FinalRecord) -> Result<FinalRecord> {
        let got = record.id()?;
        match self.signed {
            Some(expected) if expected == got => (),
            Some(expected) => return Err(Error::TransactionMismatch { expected, got }),
            None => {
                return Err(Error::UnexpectedMessage {
                    message: "final record".to_string(),
                    stage: self.stage,
                })
            }
        }
        hub.vault.record(record.clone())?;
        Ok(record)
    }

    fn reject(&mut self, hub: &ServiceHub, error: Error) {
        let stage = self.stage;
        warn!(
            "[IOU-{}] {:?} responder failed while {}: {}",
            hub.me.name, self.session.id, stage, error
        );
        self.stage = Stage::Terminal;
        self.outcome = Some(Outcome::Rejected(FlowError { stage, error }));
    }
}
