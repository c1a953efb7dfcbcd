use std::collections::{BTreeMap, BTreeSet};

use blsttc::PublicKey;
use log::{debug, info, warn};

use crate::builder::{build_proposal, IssueIou};
use crate::endorser::LocalEndorser;
use crate::error::FlowError;
use crate::flow::{FlowId, Outcome, Progress, Stage};
use crate::identity::Party;
use crate::node::ServiceHub;
use crate::session::{Message, Packet, Session, SessionId};
use crate::transaction::{SignedTransaction, TransactionSignature, TxId};
use crate::vault::{FinalRecord, LedgerStore};
use crate::{Error, Result};

/// The issuing side of one IOU agreement run.
///
/// Drives a proposal from [`Stage::Building`] through to [`Stage::Terminal`].
/// Every step returns the packets that must be delivered to counterparties;
/// the flow suspends between steps until [`Initiator::handle_packet`] or
/// [`Initiator::handle_session_failure`] is called again.
#[derive(Debug)]
pub struct Initiator {
    pub id: FlowId,
    stage: Stage,
    stx: Option<SignedTransaction>,
    sessions: BTreeMap<Party, Session>,
    awaiting: BTreeMap<Party, BTreeSet<PublicKey>>,
    outcome: Option<Outcome>,
}

impl Initiator {
    pub fn start(hub: &mut ServiceHub, request: &IssueIou) -> (Self, Vec<Packet>) {
        let mut flow = Self {
            id: FlowId::random(),
            stage: Stage::Building,
            stx: None,
            sessions: Default::default(),
            awaiting: Default::default(),
            outcome: None,
        };
        info!(
            "[IOU-{}] {:?} issuing {} from {:?} to {:?}",
            hub.me.name, flow.id, request.value, request.obligor, request.obligee
        );

        let packets = match flow.propose(hub, request) {
            Ok(packets) => packets,
            Err(err) => flow.fail(hub, err),
        };
        (flow, packets)
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

    /// The transaction being agreed, once it has been built.
    pub fn tx_id(&self) -> Option<TxId> {
        self.stx.as_ref().and_then(|stx| stx.id().ok())
    }

    pub fn peers(&self) -> BTreeSet<Party> {
        self.sessions.keys().cloned().collect()
    }

    /// Fails with `UnknownSession` when a live flow gets a packet from someone
    /// it is not talking to. Every other error terminates the flow instead.
    pub fn handle_packet(&mut self, hub: &mut ServiceHub, packet: Packet) -> Result<Vec<Packet>> {
        if self.stage.is_terminal() {
            debug!(
                "[IOU-{}] {:?} ignoring {} from {:?} after termination",
                hub.me.name,
                self.id,
                packet.message.kind(),
                packet.source
            );
            return Ok(vec![]);
        }
        if !self.sessions.contains_key(&packet.source) {
            return Err(Error::UnknownSession(packet.session));
        }

        let peer = packet.source.clone();
        let packets = match self.receive(hub, packet) {
            Ok(packets) => packets,
            Err(err) => {
                if matches!(err, Error::Refused(_) | Error::SessionFailure { .. }) {
                    self.sessions.remove(&peer);
                }
                self.fail(hub, err)
            }
        };
        Ok(packets)
    }

    /// The transport gave up on `peer`. Only matters while we still wait on it.
    pub fn handle_session_failure(
        &mut self,
        hub: &mut ServiceHub,
        peer: &Party,
        reason: &str,
    ) -> Vec<Packet> {
        if self.stage.is_terminal() {
            return vec![];
        }
        match self.sessions.remove(peer) {
            Some(session) => {
                let err = session.failure(reason);
                self.fail(hub, err)
            }
            None => vec![],
        }
    }

    fn advance(&mut self, progress: Progress) -> Result<()> {
        self.stage = self.stage.advance(progress)?;
        Ok(())
    }

    fn propose(&mut self, hub: &mut ServiceHub, request: &IssueIou) -> Result<Vec<Packet>> {
        let proposal = build_proposal(request, hub.identities.as_ref(), hub.network_map.as_ref())?;
        hub.contract.verify(&proposal.tx)?;
        self.advance(Progress::Built)?;

        let endorser = LocalEndorser::new(&hub.me, &hub.keys);
        let plan = endorser.plan(&proposal)?;
        let stx = endorser.sign_initial(&proposal, &plan)?;
        debug!(
            "[IOU-{}] {:?} signed {:?} locally with {:?}",
            hub.me.name,
            self.id,
            stx.id()?,
            plan.local
        );
        self.advance(Progress::Signed {
            remote_hosts: plan.remote.len(),
        })?;
        self.stx = Some(stx.clone());

        if plan.is_local_only() {
            return self.finalise(hub, &stx);
        }

        let session_id = SessionId {
            initiator: hub.me.clone(),
            flow: self.id,
        };
        let mut packets = Vec::new();
        for (host, requested_keys) in plan.remote {
            let mut session = Session::new(session_id.clone(), hub.me.clone(), host.clone());
            packets.push(session.send(Message::Proposal {
                stx: stx.clone(),
                requested_keys: requested_keys.clone(),
            }));
            self.sessions.insert(host.clone(), session);
            self.awaiting.insert(host, requested_keys);
        }
        info!(
            "[IOU-{}] {:?} collecting signatures from {:?}",
            hub.me.name,
            self.id,
            self.peers()
        );
        Ok(packets)
    }

    fn receive(&mut self, hub: &mut ServiceHub, packet: Packet) -> Result<Vec<Packet>> {
        let peer = packet.source.clone();
        let message = match self.sessions.get_mut(&peer) {
            Some(session) => session.receive(packet)?,
            None => return Err(Error::UnknownSession(packet.session)),
        };
        debug!(
            "[IOU-{}] {:?} received {:?} from {:?}",
            hub.me.name, self.id, message, peer
        );

        match (self.stage, message) {
            (Stage::Collecting, Message::Endorsement { signatures }) => {
                self.collect(hub, &peer, signatures)
            }
            (Stage::Collecting, Message::Refusal { reason }) => Err(Error::Refused(reason)),
            (stage, message) => Err(Error::UnexpectedMessage {
                message: message.kind().to_string(),
                stage,
            }),
        }
    }

    fn collect(
        &mut self,
        hub: &mut ServiceHub,
        peer: &Party,
        signatures: Vec<TransactionSignature>,
    ) -> Result<Vec<Packet>> {
        let requested = self
            .awaiting
            .remove(peer)
            .ok_or_else(|| Error::UnexpectedMessage {
                message: "second endorsement".to_string(),
                stage: self.stage,
            })?;

        let offered = BTreeSet::from_iter(signatures.iter().map(|sig| sig.by));
        if let Some(key) = offered.difference(&requested).next() {
            return Err(Error::SessionFailure {
                peer: peer.clone(),
                reason: format!("signed with {:?}, which was not requested", key),
            });
        }
        let missing = BTreeSet::from_iter(requested.difference(&offered).copied());
        if !missing.is_empty() {
            return Err(Error::MissingSignatures(missing));
        }

        let stx = match self.stx.as_mut() {
            Some(stx) => stx,
            None => {
                return Err(Error::UnexpectedMessage {
                    message: "endorsement".to_string(),
                    stage: self.stage,
                })
            }
        };
        let tx_id = stx.id()?;
        stx.sigs.merge(&tx_id, signatures)?;

        if !self.awaiting.is_empty() {
            debug!(
                "[IOU-{}] {:?} still waiting on {:?}",
                hub.me.name,
                self.id,
                self.awaiting.keys()
            );
            return Ok(vec![]);
        }

        let stx = stx.clone();
        stx.verify_required_signatures()?;
        self.advance(Progress::Collected)?;
        self.finalise(hub, &stx)
    }

    fn finalise(&mut self, hub: &mut ServiceHub, stx: &SignedTransaction) -> Result<Vec<Packet>> {
        stx.verify_required_signatures()?;
        let confirmation = hub.notary.submit(stx)?;
        let record = FinalRecord {
            stx: stx.clone(),
            confirmation,
        };
        hub.vault.record(record.clone())?;

        let packets = self
            .sessions
            .values_mut()
            .map(|session| {
                session.send(Message::FinalRecord {
                    record: record.clone(),
                })
            })
            .collect();

        self.advance(Progress::Finalised)?;
        info!(
            "[IOU-{}] {:?} finalised {:?} at sequence {}",
            hub.me.name,
            self.id,
            record.id()?,
            record.confirmation.sequence
        );
        self.outcome = Some(Outcome::Finalized(record));
        Ok(packets)
    }

    fn fail(&mut self, hub: &ServiceHub, error: Error) -> Vec<Packet> {
        let stage = self.stage;
        warn!(
            "[IOU-{}] {:?} failed while {}: {}",
            hub.me.name, self.id, stage, error
        );
        self.stage = stage.advance(Progress::Failed).unwrap_or(Stage::Terminal);
        self.awaiting.clear();

        let reason = error.to_string();
        let packets = self
            .sessions
            .values_mut()
            .map(|session| {
                session.send(Message::Abort {
                    reason: reason.clone(),
                })
            })
            .collect();
        self.outcome = Some(Outcome::Rejected(FlowError { stage, error }));
        packets
    }
}
