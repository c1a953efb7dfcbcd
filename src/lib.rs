//! Bilateral IOU agreement.
//!
//! Two parties propose an IOU, check it against the contract, endorse it with
//! their keys (directly or through hosted accounts) and have a single notary
//! order and confirm it. Protocol instances never do IO themselves: every step
//! returns the [`Packet`]s it wants delivered, and the embedder feeds replies
//! back through [`Node::handle_packet`].

pub mod builder;
pub mod config;
pub mod contract;
pub mod endorser;
pub mod error;
pub mod flow;
pub mod identity;
pub mod initiator;
pub mod keys;
pub mod node;
pub mod notary;
pub mod policy;
pub mod responder;
pub mod session;
pub mod state;
pub mod transaction;
pub mod vault;

pub use crate::builder::{build_proposal, IssueIou, Proposal, TransactionBuilder};
pub use crate::config::NodeConfig;
pub use crate::contract::{Clause, Contract, IouContract};
pub use crate::endorser::{EndorsementPlan, LocalEndorser};
pub use crate::error::{Error, FlowError, Result};
pub use crate::flow::{FlowId, Outcome, Progress, Stage};
pub use crate::identity::{
    AccountId, AccountInfo, Directory, IdentityResolver, NetworkMap, Party, PartyRef,
    ResolvedIdentity,
};
pub use crate::keys::KeyStore;
pub use crate::node::{Node, ServiceHub};
pub use crate::notary::{ConflictKind, Notary, NotaryConfirmation, OrderingAuthority};
pub use crate::policy::{AcceptAll, AcceptancePolicy, ValueCeiling};
pub use crate::session::{Message, Packet, Session, SessionId};
pub use crate::state::{IouState, UniqueIdentifier};
pub use crate::transaction::{
    Command, CommandKind, Endorsements, SignedTransaction, StateRef, TransactionSignature, TxId,
    WireTransaction,
};
pub use crate::vault::{FinalRecord, LedgerStore, StateAndRef, Vault};
