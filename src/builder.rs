use std::collections::BTreeMap;

use blsttc::PublicKey;
use log::debug;

use crate::identity::{IdentityResolver, NetworkMap, Party, PartyRef};
use crate::state::{IouState, UniqueIdentifier};
use crate::transaction::{Command, CommandKind, StateRef, WireTransaction};
use crate::{Error, Result};

/// Request to issue a new IOU from `obligor` to `obligee`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueIou {
    pub value: i64,
    pub obligor: PartyRef,
    pub obligee: PartyRef,
    pub external_id: Option<String>,
    pub linear_id: Option<UniqueIdentifier>,
}

impl IssueIou {
    pub fn new(value: i64, obligor: impl Into<PartyRef>, obligee: impl Into<PartyRef>) -> Self {
        Self {
            value,
            obligor: obligor.into(),
            obligee: obligee.into(),
            external_id: None,
            linear_id: None,
        }
    }

    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }

    /// Reuses an existing linear id instead of minting a fresh one.
    pub fn with_linear_id(mut self, linear_id: UniqueIdentifier) -> Self {
        self.linear_id = Some(linear_id);
        self
    }
}

#[derive(Debug, Clone)]
pub struct TransactionBuilder {
    notary: Party,
    inputs: Vec<StateRef>,
    outputs: Vec<IouState>,
    command: Option<Command>,
}

impl TransactionBuilder {
    pub fn new(notary: Party) -> Self {
        Self {
            notary,
            inputs: Vec::new(),
            outputs: Vec::new(),
            command: None,
        }
    }

    pub fn add_input_state(mut self, state_ref: StateRef) -> Self {
        self.inputs.push(state_ref);
        self
    }

    pub fn add_output_state(mut self, state: IouState) -> Self {
        self.outputs.push(state);
        self
    }

    pub fn add_command(mut self, command: Command) -> Self {
        self.command = Some(command);
        self
    }

    pub fn to_wire_transaction(&self) -> Result<WireTransaction> {
        Ok(WireTransaction {
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
            command: self.command.clone().ok_or(Error::MissingCommand)?,
            notary: self.notary.clone(),
        })
    }
}

/// A candidate transaction plus who hosts each required signing key.
#[derive(Debug, Clone)]
pub struct Proposal {
    pub tx: WireTransaction,
    pub hosts: BTreeMap<PublicKey, Party>,
}

pub fn build_proposal(
    request: &IssueIou,
    identities: &dyn IdentityResolver,
    network_map: &dyn NetworkMap,
) -> Result<Proposal> {
    let notary = network_map
        .notary_identities()
        .into_iter()
        .next()
        .ok_or(Error::NoNotary)?;

    let obligor = identities.resolve(&request.obligor)?;
    let obligee = identities.resolve(&request.obligee)?;

    let linear_id = request
        .linear_id
        .clone()
        .unwrap_or_else(|| UniqueIdentifier::new(request.external_id.clone()));
    let state = IouState {
        value: request.value,
        obligor: obligor.key,
        obligee: obligee.key,
        linear_id,
    };
    let command = Command::new(CommandKind::Create, state.participants());
    debug!("[BUILD] {:?} notarised by {:?}", state, notary);

    let tx = TransactionBuilder::new(notary)
        .add_output_state(state)
        .add_command(command)
        .to_wire_transaction()?;

    let hosts = BTreeMap::from_iter([(obligor.key, obligor.host), (obligee.key, obligee.host)]);
    Ok(Proposal { tx, hosts })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Directory;
    use blsttc::SecretKey;
    use rand::{prelude::StdRng, Rng, SeedableRng};

    fn setup(rng: &mut StdRng) -> (Directory, Party, Party, Party) {
        let dir = Directory::new();
        let a = Party::new("a", rng.gen::<SecretKey>().public_key());
        let b = Party::new("b", rng.gen::<SecretKey>().public_key());
        let notary = Party::new("notary", rng.gen::<SecretKey>().public_key());
        dir.register_party(a.clone());
        dir.register_party(b.clone());
        dir.register_notary(notary.clone());
        (dir, a, b, notary)
    }

    #[test]
    fn test_build_issuance_requires_both_participants() -> Result<()> {
        let mut rng = StdRng::from_seed([0u8; 32]);
        let (dir, a, b, notary) = setup(&mut rng);

        let proposal = build_proposal(&IssueIou::new(5, a.clone(), b.clone()), &dir, &dir)?;

        assert!(proposal.tx.inputs.is_empty());
        assert_eq!(proposal.tx.notary, notary);
        assert_eq!(proposal.tx.outputs.len(), 1);
        let iou = &proposal.tx.outputs[0];
        assert_eq!((iou.value, iou.obligor, iou.obligee), (5, a.key, b.key));
        assert_eq!(
            proposal.tx.command.signers,
            iou.participants().into_iter().collect()
        );
        assert_eq!(proposal.hosts[&a.key], a);
        assert_eq!(proposal.hosts[&b.key], b);
        Ok(())
    }

    #[test]
    fn test_first_registered_notary_is_chosen() -> Result<()> {
        let mut rng = StdRng::from_seed([0u8; 32]);
        let (dir, a, b, notary) = setup(&mut rng);
        dir.register_notary(Party::new("backup", rng.gen::<SecretKey>().public_key()));

        let proposal = build_proposal(&IssueIou::new(1, a, b), &dir, &dir)?;
        assert_eq!(proposal.tx.notary, notary);
        Ok(())
    }

    #[test]
    fn test_build_fails_without_notary_or_with_unknown_party() {
        let mut rng = StdRng::from_seed([0u8; 32]);
        let (dir, a, _, _) = setup(&mut rng);
        let stranger = Party::new("stranger", rng.gen::<SecretKey>().public_key());

        assert!(matches!(
            build_proposal(&IssueIou::new(1, a.clone(), stranger), &dir, &dir),
            Err(Error::UnknownParty(_))
        ));

        let empty = Directory::new();
        empty.register_party(a.clone());
        assert!(matches!(
            build_proposal(&IssueIou::new(1, a.clone(), a), &empty, &empty),
            Err(Error::NoNotary)
        ));
    }

    #[test]
    fn test_builder_needs_a_command() {
        let mut rng = StdRng::from_seed([0u8; 32]);
        let notary = Party::new("notary", rng.gen::<SecretKey>().public_key());
        assert!(matches!(
            TransactionBuilder::new(notary).to_wire_transaction(),
            Err(Error::MissingCommand)
        ));
    }

    #[test]
    fn test_external_id_is_carried_into_linear_id() -> Result<()> {
        let mut rng = StdRng::from_seed([0u8; 32]);
        let (dir, a, b, _) = setup(&mut rng);

        let proposal = build_proposal(&IssueIou::new(1, a, b).with_external_id("loan-7"), &dir, &dir)?;
        assert_eq!(
            proposal.tx.outputs[0].linear_id.external_id.as_deref(),
            Some("loan-7")
        );
        Ok(())
    }
}
