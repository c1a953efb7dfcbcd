use std::collections::{BTreeMap, BTreeSet};

use blsttc::PublicKey;

use crate::builder::Proposal;
use crate::identity::Party;
use crate::keys::KeyStore;
use crate::transaction::SignedTransaction;
use crate::{Error, Result};

/// Which required keys we sign now and which must be collected from whom.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndorsementPlan {
    pub local: BTreeSet<PublicKey>,
    pub remote: BTreeMap<Party, BTreeSet<PublicKey>>,
}

impl EndorsementPlan {
    pub fn is_local_only(&self) -> bool {
        self.remote.is_empty()
    }
}

pub struct LocalEndorser<'a> {
    pub me: &'a Party,
    pub keys: &'a KeyStore,
}

impl<'a> LocalEndorser<'a> {
    pub fn new(me: &'a Party, keys: &'a KeyStore) -> Self {
        Self { me, keys }
    }

    pub fn plan(&self, proposal: &Proposal) -> Result<EndorsementPlan> {
        let mut plan = EndorsementPlan::default();
        for key in proposal.tx.command.signers.iter() {
            let host = proposal.hosts.get(key).unwrap_or(self.me);
            if host == self.me {
                if !self.keys.holds(key) {
                    return Err(Error::KeyNotHeld(*key));
                }
                plan.local.insert(*key);
            } else {
                plan.remote.entry(host.clone()).or_default().insert(*key);
            }
        }
        Ok(plan)
    }

    pub fn sign_initial(
        &self,
        proposal: &Proposal,
        plan: &EndorsementPlan,
    ) -> Result<SignedTransaction> {
        let tx_id = proposal.tx.id()?;
        let signatures = plan
            .local
            .iter()
            .map(|key| self.keys.sign(key, &tx_id).ok_or(Error::KeyNotHeld(*key)))
            .collect::<Result<Vec<_>>>()?;
        SignedTransaction::new(proposal.tx.clone(), signatures)
    }
}
