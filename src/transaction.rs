//! Transaction record staged into the pending pool and sealed into blocks

use serde::{Deserialize, Serialize};
use serde_json::Number;

/// A value transfer between two opaque account names.
///
/// No balance or signature checks exist: any sender may move any amount,
/// including negative ones. `amount` keeps the JSON number kind it was
/// submitted with so block digests agree across nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Transaction {
    pub sender: String,
    pub recipient: String,
    pub amount: Number,
}

impl Transaction {
    pub fn new(sender: impl Into<String>, recipient: impl Into<String>, amount: impl Into<Number>) -> Self {
        Self {
            sender: sender.into(),
            recipient: recipient.into(),
            amount: amount.into(),
        }
    }
}
