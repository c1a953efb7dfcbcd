use serde::{Deserialize, Serialize};

use crate::policy::{AcceptAll, AcceptancePolicy, ValueCeiling};

/// Per-node settings; any serde format can produce one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub name: String,
    /// Largest IOU value this node will endorse as a counterparty. `None` accepts any value.
    #[serde(default = "default_value_ceiling")]
    pub value_ceiling: Option<i64>,
}

fn default_value_ceiling() -> Option<i64> {
    Some(100)
}

impl NodeConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value_ceiling: default_value_ceiling(),
        }
    }

    pub fn with_value_ceiling(mut self, value_ceiling: Option<i64>) -> Self {
        self.value_ceiling = value_ceiling;
        self
    }

    pub fn policy(&self) -> Box<dyn AcceptancePolicy> {
        match self.value_ceiling {
            Some(max) => Box::new(ValueCeiling { max }),
            None => Box::new(AcceptAll),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ceiling_is_one_hundred() {
        assert_eq!(NodeConfig::new("bank").value_ceiling, Some(100));
        assert_eq!(
            NodeConfig::new("bank").with_value_ceiling(None).value_ceiling,
            None
        );
    }
}
