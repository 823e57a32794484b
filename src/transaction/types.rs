/// Transaction types for LinkChain
use serde::{Deserialize, Serialize};

/// A transfer of `amount` from `sender` to `recipient`.
///
/// Plain value type: two transactions with equal fields are the same transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: String,
    pub recipient: String,
    pub amount: u64,
}

impl Transaction {
    pub fn new(sender: impl Into<String>, recipient: impl Into<String>, amount: u64) -> Self {
        Transaction {
            sender: sender.into(),
            recipient: recipient.into(),
            amount,
        }
    }

    /// Reward paid to the node that sealed a block.
    pub fn reward(reward_sender: &str, node_id: &str, amount: u64) -> Self {
        Transaction::new(reward_sender, node_id, amount)
    }
}
