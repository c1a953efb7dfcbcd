use crate::transaction::SignedTransaction;
use crate::{Error, Result};

/// Responder-side acceptance criteria, checked after the contract passes.
pub trait AcceptancePolicy: Send + Sync {
    fn check(&self, stx: &SignedTransaction) -> Result<()>;
}

#[derive(Debug, Clone, Copy)]
pub struct AcceptAll;

impl AcceptancePolicy for AcceptAll {
    fn check(&self, _stx: &SignedTransaction) -> Result<()> {
        Ok(())
    }
}

/// Refuses IOUs whose value exceeds `max`.
#[derive(Debug, Clone, Copy)]
pub struct ValueCeiling {
    pub max: i64,
}

impl AcceptancePolicy for ValueCeiling {
    fn check(&self, stx: &SignedTransaction) -> Result<()> {
        match stx.tx.outputs.as_slice() {
            [iou] if iou.value <= self.max => Ok(()),
            [_] => Err(Error::Refused(format!(
                "IOUs with a value over {} are not accepted",
                self.max
            ))),
            _ => Err(Error::Refused("This must be an IOU transaction".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Party;
    use crate::state::IouState;
    use crate::transaction::{Command, CommandKind, WireTransaction};
    use blsttc::SecretKey;
    use rand::{prelude::StdRng, Rng, SeedableRng};

    fn iou(value: i64) -> SignedTransaction {
        let mut rng = StdRng::from_seed([0u8; 32]);
        let state = IouState::new(
            value,
            rng.gen::<SecretKey>().public_key(),
            rng.gen::<SecretKey>().public_key(),
        );
        let tx = WireTransaction {
            inputs: vec![],
            command: Command::new(CommandKind::Create, state.participants()),
            outputs: vec![state],
            notary: Party::new("notary", rng.gen::<SecretKey>().public_key()),
        };
        SignedTransaction::new(tx, []).unwrap()
    }

    #[test]
    fn test_ceiling_is_inclusive() {
        let policy = ValueCeiling { max: 100 };
        assert!(policy.check(&iou(100)).is_ok());
        assert!(matches!(
            policy.check(&iou(150)),
            Err(Error::Refused(reason)) if reason.contains("over 100")
        ));
    }

    #[test]
    fn test_accept_all() {
        assert!(AcceptAll.check(&iou(i64::MAX)).is_ok());
    }
}
