/// Validation of incoming transaction submissions
use crate::error::ChainError;
use crate::transaction::types::Transaction;
use serde::Deserialize;

/// A submission as it arrives from a client; every field may be absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTransactionRequest {
    pub sender: Option<String>,
    pub recipient: Option<String>,
    pub amount: Option<u64>,
}

impl NewTransactionRequest {
    /// Check that every required field is present and build the transaction.
    ///
    /// Fields are checked in the order sender, recipient, amount; the first
    /// missing one is reported.
    pub fn validate(self) -> Result<Transaction, ChainError> {
        let sender = self.sender.ok_or(ChainError::MissingField("sender"))?;
        let recipient = self.recipient.ok_or(ChainError::MissingField("recipient"))?;
        let amount = self.amount.ok_or(ChainError::MissingField("amount"))?;
        Ok(Transaction::new(sender, recipient, amount))
    }
}
