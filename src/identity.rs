use std::collections::BTreeMap;
use std::sync::RwLock;

use blsttc::PublicKey;
use core::fmt::Debug;
use log::info;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// A well-known node identity.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Party {
    pub name: String,
    pub key: PublicKey,
}

impl Debug for Party {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl Party {
    pub fn new(name: impl Into<String>, key: PublicKey) -> Self {
        Self {
            name: name.into(),
            key,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountId(pub Uuid);

impl Debug for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "acct:{}", self.0)
    }
}

impl AccountId {
    pub fn random() -> Self {
        AccountId(Uuid::new_v4())
    }
}

/// A delegated identity with its own signing key, hosted by exactly one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub id: AccountId,
    pub name: String,
    pub host: Party,
    pub key: PublicKey,
}

/// What a caller names as obligor or obligee before resolution.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PartyRef {
    Party(Party),
    Account(AccountId),
}

impl Debug for PartyRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PartyRef::Party(p) => write!(f, "{:?}", p),
            PartyRef::Account(a) => write!(f, "{:?}", a),
        }
    }
}

impl From<Party> for PartyRef {
    fn from(party: Party) -> Self {
        PartyRef::Party(party)
    }
}

impl From<&AccountInfo> for PartyRef {
    fn from(account: &AccountInfo) -> Self {
        PartyRef::Account(account.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub key: PublicKey,
    pub host: Party,
}

pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, reference: &PartyRef) -> Result<ResolvedIdentity>;
}

pub trait NetworkMap: Send + Sync {
    /// Notaries in registration order. Flows pick the first one.
    fn notary_identities(&self) -> Vec<Party>;
}

/// In-memory registry of parties, accounts and notaries shared by every node.
#[derive(Debug, Default)]
pub struct Directory {
    parties: RwLock<BTreeMap<PublicKey, Party>>,
    accounts: RwLock<BTreeMap<AccountId, AccountInfo>>,
    notaries: RwLock<Vec<Party>>,
}

impl Directory {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn register_party(&self, party: Party) {
        info!("[DIR] registering party {:?}", party);
        write(&self.parties).insert(party.key, party);
    }

    pub fn register_notary(&self, notary: Party) {
        info!("[DIR] registering notary {:?}", notary);
        let mut notaries = write(&self.notaries);
        if !notaries.contains(&notary) {
            notaries.push(notary);
        }
    }

    /// Publishes an account whose key the host already holds.
    pub fn create_account(&self, name: impl Into<String>, host: Party, key: PublicKey) -> AccountInfo {
        let account = AccountInfo {
            id: AccountId::random(),
            name: name.into(),
            host,
            key,
        };
        info!(
            "[DIR] account {} ({:?}) hosted by {:?}",
            account.name, account.id, account.host
        );
        write(&self.accounts).insert(account.id, account.clone());
        account
    }

    pub fn account(&self, id: &AccountId) -> Option<AccountInfo> {
        read(&self.accounts).get(id).cloned()
    }

    pub fn party_from_key(&self, key: &PublicKey) -> Option<Party> {
        read(&self.parties).get(key).cloned()
    }
}

impl IdentityResolver for Directory {
    fn resolve(&self, reference: &PartyRef) -> Result<ResolvedIdentity> {
        match reference {
            PartyRef::Party(party) => match self.party_from_key(&party.key) {
                Some(known) if &known == party => Ok(ResolvedIdentity {
                    key: known.key,
                    host: known,
                }),
                _ => Err(Error::UnknownParty(reference.clone())),
            },
            PartyRef::Account(id) => self
                .account(id)
                .map(|account| ResolvedIdentity {
                    key: account.key,
                    host: account.host,
                })
                .ok_or_else(|| Error::UnknownParty(reference.clone())),
        }
    }
}

impl NetworkMap for Directory {
    fn notary_identities(&self) -> Vec<Party> {
        read(&self.notaries).clone()
    }
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use blsttc::SecretKey;
    use rand::{prelude::StdRng, Rng, SeedableRng};

    fn party(name: &str, rng: &mut StdRng) -> Party {
        Party::new(name, rng.gen::<SecretKey>().public_key())
    }

    #[test]
    fn test_resolve_registered_party_is_self_hosted() {
        let mut rng = StdRng::from_seed([0u8; 32]);
        let dir = Directory::new();
        let alice = party("alice", &mut rng);
        dir.register_party(alice.clone());

        let resolved = dir.resolve(&alice.clone().into()).unwrap();
        assert_eq!(resolved.key, alice.key);
        assert_eq!(resolved.host, alice);
    }

    #[test]
    fn test_resolve_unregistered_party_fails() {
        let mut rng = StdRng::from_seed([0u8; 32]);
        let dir = Directory::new();
        let ghost = party("ghost", &mut rng);

        assert!(matches!(
            dir.resolve(&ghost.into()),
            Err(Error::UnknownParty(PartyRef::Party(_)))
        ));
        assert!(matches!(
            dir.resolve(&PartyRef::Account(AccountId::random())),
            Err(Error::UnknownParty(PartyRef::Account(_)))
        ));
    }

    #[test]
    fn test_resolve_account_returns_account_key_and_host() {
        let mut rng = StdRng::from_seed([0u8; 32]);
        let dir = Directory::new();
        let bank = party("bank", &mut rng);
        dir.register_party(bank.clone());
        let account_key = rng.gen::<SecretKey>().public_key();
        let account = dir.create_account("Bank1", bank.clone(), account_key);

        let resolved = dir.resolve(&PartyRef::from(&account)).unwrap();
        assert_eq!(resolved.key, account_key);
        assert_eq!(resolved.host, bank);
    }

    #[test]
    fn test_notaries_keep_registration_order() {
        let mut rng = StdRng::from_seed([0u8; 32]);
        let dir = Directory::new();
        let n1 = party("notary-1", &mut rng);
        let n2 = party("notary-2", &mut rng);
        dir.register_notary(n1.clone());
        dir.register_notary(n2.clone());
        dir.register_notary(n1.clone());

        assert_eq!(dir.notary_identities(), vec![n1, n2]);
    }
}
