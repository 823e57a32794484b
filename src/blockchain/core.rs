// core.rs splits ledger responsibilities into submodules: block storage and
// sealing live in `chain`, whole-chain checks in `validation`.
pub mod chain;
pub mod validation;

pub use chain::*;
pub use validation::*;
