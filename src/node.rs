use std::collections::BTreeMap;
use std::sync::Arc;

use blsttc::SecretKey;
use log::{debug, info};

use crate::builder::IssueIou;
use crate::config::NodeConfig;
use crate::contract::{Contract, IouContract};
use crate::flow::{FlowId, Outcome};
use crate::identity::{IdentityResolver, NetworkMap, Party};
use crate::initiator::Initiator;
use crate::keys::KeyStore;
use crate::notary::OrderingAuthority;
use crate::policy::AcceptancePolicy;
use crate::responder::Responder;
use crate::session::{Message, Packet, Session, SessionId};
use crate::vault::Vault;
use crate::{Error, Result};

/// Everything a flow running on this node may use.
pub struct ServiceHub {
    pub me: Party,
    pub keys: KeyStore,
    pub identities: Arc<dyn IdentityResolver>,
    pub network_map: Arc<dyn NetworkMap>,
    pub notary: Arc<dyn OrderingAuthority>,
    pub contract: Box<dyn Contract>,
    pub policy: Box<dyn AcceptancePolicy>,
    pub vault: Vault,
}

impl std::fmt::Debug for ServiceHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceHub")
            .field("me", &self.me)
            .field("keys", &self.keys.public_keys().len())
            .field("vault", &self.vault.len())
            .finish()
    }
}

/// One participant: hosts an identity and runs initiator and responder flows for it.
#[derive(Debug)]
pub struct Node {
    hub: ServiceHub,
    initiators: BTreeMap<FlowId, Initiator>,
    responders: BTreeMap<SessionId, Responder>,
}

impl Node {
    pub fn new(
        config: &NodeConfig,
        secret_key: SecretKey,
        identities: Arc<dyn IdentityResolver>,
        network_map: Arc<dyn NetworkMap>,
        notary: Arc<dyn OrderingAuthority>,
    ) -> Self {
        let me = Party::new(config.name.clone(), secret_key.public_key());
        info!(
            "[IOU-{}] starting with value ceiling {:?}",
            me.name, config.value_ceiling
        );
        Self {
            hub: ServiceHub {
                me,
                keys: KeyStore::new(secret_key),
                identities,
                network_map,
                notary,
                contract: Box::new(IouContract),
                policy: config.policy(),
                vault: Vault::new(),
            },
            initiators: Default::default(),
            responders: Default::default(),
        }
    }

    pub fn with_contract(mut self, contract: impl Contract + 'static) -> Self {
        self.hub.contract = Box::new(contract);
        self
    }

    pub fn with_policy(mut self, policy: impl AcceptancePolicy + 'static) -> Self {
        self.hub.policy = Box::new(policy);
        self
    }

    pub fn identity(&self) -> &Party {
        &self.hub.me
    }

    pub fn vault(&self) -> &Vault {
        &self.hub.vault
    }

    pub fn keys(&self) -> &KeyStore {
        &self.hub.keys
    }

    pub fn keys_mut(&mut self) -> &mut KeyStore {
        &mut self.hub.keys
    }

    /// Starts issuing an IOU. Failures before any packet is sent are already
    /// visible through [`Node::outcome`] when this returns.
    pub fn start_flow(&mut self, request: &IssueIou) -> (FlowId, Vec<Packet>) {
        let (flow, packets) = Initiator::start(&mut self.hub, request);
        let id = flow.id;
        self.initiators.insert(id, flow);
        (id, packets)
    }

    pub fn handle_packet(&mut self, packet: Packet) -> Result<Vec<Packet>> {
        if packet.dest != self.hub.me {
            return Err(Error::WrongDestination {
                dest: packet.dest,
                node: self.hub.me.clone(),
            });
        }
        debug!(
            "[IOU-{}] {} from {:?} on {:?}",
            self.hub.me.name,
            packet.message.kind(),
            packet.source,
            packet.session
        );

        if packet.session.initiator == self.hub.me {
            return match self.initiators.get_mut(&packet.session.flow) {
                Some(flow) => flow.handle_packet(&mut self.hub, packet),
                None => Err(Error::UnknownSession(packet.session)),
            };
        }

        if let Some(responder) = self.responders.get_mut(&packet.session) {
            return Ok(responder.handle_packet(&mut self.hub, packet));
        }

        let opens_session = matches!(packet.message, Message::Proposal { .. })
            && packet.seq == 0
            && packet.source == packet.session.initiator;
        if !opens_session {
            return Err(Error::UnknownSession(packet.session));
        }

        let id = packet.session.clone();
        let session = Session::new(id.clone(), self.hub.me.clone(), packet.source.clone());
        let mut responder = Responder::new(session);
        let packets = responder.handle_packet(&mut self.hub, packet);
        self.responders.insert(id, responder);
        Ok(packets)
    }

    /// Called by the transport when `peer` stopped answering on `session`.
    pub fn handle_session_failure(
        &mut self,
        session: &SessionId,
        peer: &Party,
        reason: &str,
    ) -> Vec<Packet> {
        info!(
            "[IOU-{}] lost {:?} on {:?}: {}",
            self.hub.me.name, peer, session, reason
        );
        if session.initiator == self.hub.me {
            match self.initiators.get_mut(&session.flow) {
                Some(flow) => flow.handle_session_failure(&mut self.hub, peer, reason),
                None => vec![],
            }
        } else {
            if let Some(responder) = self.responders.get_mut(session) {
                responder.handle_session_failure(&self.hub, reason);
            }
            vec![]
        }
    }

    pub fn initiator(&self, flow: &FlowId) -> Option<&Initiator> {
        self.initiators.get(flow)
    }

    pub fn outcome(&self, flow: &FlowId) -> Option<&Outcome> {
        self.initiators.get(flow).and_then(Initiator::outcome)
    }

    pub fn responder_outcome(&self, session: &SessionId) -> Option<&Outcome> {
        self.responders.get(session).and_then(Responder::outcome)
    }

    /// Sessions this node has answered as a counterparty.
    pub fn responder_sessions(&self) -> impl Iterator<Item = &SessionId> {
        self.responders.keys()
    }

    /// Initiator and responder instances still held by this node.
    pub fn flow_count(&self) -> usize {
        self.initiators.len() + self.responders.len()
    }

    /// Removes a terminated initiator and hands back its outcome.
    /// A flow that is still running stays in place and yields `None`.
    pub fn take_outcome(&mut self, flow: &FlowId) -> Option<Outcome> {
        if !self.initiators.get(flow)?.stage().is_terminal() {
            return None;
        }
        debug!("[IOU-{}] evicting {:?}", self.hub.me.name, flow);
        self.initiators.remove(flow).and_then(Initiator::into_outcome)
    }

    pub fn take_responder_outcome(&mut self, session: &SessionId) -> Option<Outcome> {
        if !self.responders.get(session)?.stage().is_terminal() {
            return None;
        }
        debug!("[IOU-{}] evicting responder {:?}", self.hub.me.name, session);
        self.responders
            .remove(session)
            .and_then(Responder::into_outcome)
    }
}
