use std::collections::BTreeSet;

use blsttc::PublicKey;
use core::fmt::Debug;
use serde::{Deserialize, Serialize};

use crate::flow::FlowId;
use crate::identity::Party;
use crate::transaction::{SignedTransaction, TransactionSignature};
use crate::vault::FinalRecord;
use crate::{Error, Result};

/// One logical channel: the initiating node's flow talking to one peer.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId {
    pub initiator: Party,
    pub flow: FlowId,
}

impl Debug for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}/{:?}", self.initiator, self.flow)
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// Initiator -> responder: please sign `requested_keys` on `stx`.
    Proposal {
        stx: SignedTransaction,
        requested_keys: BTreeSet<PublicKey>,
    },
    /// Responder -> initiator: signatures for the requested keys.
    Endorsement { signatures: Vec<TransactionSignature> },
    /// Responder -> initiator: the proposal was not accepted.
    Refusal { reason: String },
    /// Initiator -> responder: the notarised transaction everyone records.
    FinalRecord { record: FinalRecord },
    /// Initiator -> responder: the run ended without a final record.
    Abort { reason: String },
}

impl Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Message::Proposal {
                stx,
                requested_keys,
            } => write!(f, "Proposal({:?} for {:?})", stx.tx.outputs, requested_keys),
            Message::Endorsement { signatures } => write!(f, "Endorsement({:?})", signatures),
            Message::Refusal { reason } => write!(f, "Refusal({})", reason),
            Message::FinalRecord { record } => {
                write!(f, "FinalRecord(#{})", record.confirmation.sequence)
            }
            Message::Abort { reason } => write!(f, "Abort({})", reason),
        }
    }
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Proposal { .. } => "proposal",
            Message::Endorsement { .. } => "endorsement",
            Message::Refusal { .. } => "refusal",
            Message::FinalRecord { .. } => "final record",
            Message::Abort { .. } => "abort",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub source: Party,
    pub dest: Party,
    pub session: SessionId,
    pub seq: u64,
    pub message: Message,
}

/// Our end of a session. Packets are numbered per direction and must arrive in order.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub me: Party,
    pub peer: Party,
    next_send: u64,
    next_recv: u64,
}

impl Session {
    pub fn new(id: SessionId, me: Party, peer: Party) -> Self {
        Self {
            id,
            me,
            peer,
            next_send: 0,
            next_recv: 0,
        }
    }

    pub fn send(&mut self, message: Message) -> Packet {
        let packet = Packet {
            source: self.me.clone(),
            dest: self.peer.clone(),
            session: self.id.clone(),
            seq: self.next_send,
            message,
        };
        self.next_send += 1;
        packet
    }

    pub fn receive(&mut self, packet: Packet) -> Result<Message> {
        if packet.session != self.id || packet.source != self.peer {
            return Err(self.failure(format!(
                "packet from {:?} on {:?} does not belong here",
                packet.source, packet.session
            )));
        }
        if packet.seq != self.next_recv {
            return Err(self.failure(format!(
                "expected packet #{} but received #{}",
                self.next_recv, packet.seq
            )));
        }
        self.next_recv += 1;
        Ok(packet.message)
    }

    pub fn failure(&self, reason: impl Into<String>) -> Error {
        Error::SessionFailure {
            peer: self.peer.clone(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blsttc::SecretKey;
    use rand::{prelude::StdRng, Rng, SeedableRng};

    fn pair() -> (Session, Session) {
        let mut rng = StdRng::from_seed([0u8; 32]);
        let a = Party::new("a", rng.gen::<SecretKey>().public_key());
        let b = Party::new("b", rng.gen::<SecretKey>().public_key());
        let id = SessionId {
            initiator: a.clone(),
            flow: FlowId::random(),
        };
        (
            Session::new(id.clone(), a.clone(), b.clone()),
            Session::new(id, b, a),
        )
    }

    fn refusal(reason: &str) -> Message {
        Message::Refusal {
            reason: reason.to_string(),
        }
    }

    #[test]
    fn test_messages_arrive_in_send_order() -> Result<()> {
        let (mut a, mut b) = pair();
        let first = a.send(refusal("1"));
        let second = a.send(refusal("2"));

        assert_eq!(b.receive(first)?, refusal("1"));
        assert_eq!(b.receive(second)?, refusal("2"));
        Ok(())
    }

    #[test]
    fn test_out_of_order_packet_is_a_session_failure() {
        let (mut a, mut b) = pair();
        let _first = a.send(refusal("1"));
        let second = a.send(refusal("2"));

        assert!(matches!(
            b.receive(second),
            Err(Error::SessionFailure { .. })
        ));
    }

    #[test]
    fn test_packet_from_a_stranger_is_rejected() {
        let (mut a, _) = pair();
        let (mut other, _) = pair();
        let packet = other.send(refusal("hi"));

        assert!(matches!(
            a.receive(packet),
            Err(Error::SessionFailure { .. })
        ));
    }
}
