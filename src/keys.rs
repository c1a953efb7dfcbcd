use std::collections::{BTreeMap, BTreeSet};

use blsttc::{PublicKey, SecretKey};
use rand::{CryptoRng, Rng};

use crate::transaction::{TransactionSignature, TxId};

/// Secret keys a node signs with: its own identity key plus any account keys it hosts.
#[derive(Debug, Default)]
pub struct KeyStore {
    keys: BTreeMap<PublicKey, SecretKey>,
}

impl KeyStore {
    pub fn new(identity: SecretKey) -> Self {
        let mut store = Self::default();
        store.insert(identity);
        store
    }

    pub fn insert(&mut self, secret_key: SecretKey) -> PublicKey {
        let public_key = secret_key.public_key();
        self.keys.insert(public_key, secret_key);
        public_key
    }

    /// Generates and stores a fresh key, e.g. for a newly hosted account.
    pub fn fresh_key(&mut self, mut rng: impl Rng + CryptoRng) -> PublicKey {
        self.insert(rng.gen())
    }

    pub fn holds(&self, key: &PublicKey) -> bool {
        self.keys.contains_key(key)
    }

    pub fn public_keys(&self) -> BTreeSet<PublicKey> {
        self.keys.keys().copied().collect()
    }

    pub fn sign(&self, key: &PublicKey, tx_id: &TxId) -> Option<TransactionSignature> {
        self.keys
            .get(key)
            .map(|secret_key| TransactionSignature::sign(secret_key, tx_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{prelude::StdRng, SeedableRng};

    #[test]
    fn test_sign_only_with_held_keys() {
        let mut rng = StdRng::from_seed([0u8; 32]);
        let mut store = KeyStore::new(rng.gen());
        let account = store.fresh_key(&mut rng);
        let stranger = rng.gen::<SecretKey>().public_key();
        let tx_id = TxId::calculate(b"iou");

        assert_eq!(store.public_keys().len(), 2);
        let sig = store.sign(&account, &tx_id).unwrap();
        assert_eq!(sig.by, account);
        assert!(sig.verify(&tx_id).is_ok());
        assert!(store.sign(&stranger, &tx_id).is_none());
    }
}
