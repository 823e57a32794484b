use crate::blockchain::core::chain::{Block, GENESIS_PREVIOUS_HASH, GENESIS_PROOF};
use crate::error::ChainError;
use crate::miner::{verify_proof, Difficulty};

fn validate_genesis(genesis: &Block) -> Result<(), ChainError> {
    if genesis.index != 1 {
        return Err(ChainError::InvalidBlock(format!(
            "Genesis block must have index 1, got {}",
            genesis.index
        )));
    }
    if genesis.previous_hash != GENESIS_PREVIOUS_HASH || genesis.proof != GENESIS_PROOF {
        return Err(ChainError::InvalidBlock(
            "Genesis block does not carry the agreed sentinel hash and seed proof".to_string(),
        ));
    }
    Ok(())
}

/// Walk a candidate chain and report the first broken invariant.
///
/// Hashes are compared by value. Timestamps and transaction contents are not
/// checked beyond what the link digests cover.
pub fn validate_chain(chain: &[Block], difficulty: &Difficulty) -> Result<(), ChainError> {
    let genesis = chain.first().ok_or(ChainError::EmptyChain)?;
    validate_genesis(genesis)?;

    for (position, pair) in chain.windows(2).enumerate() {
        let (previous, block) = (&pair[0], &pair[1]);
        let expected_index = position as u64 + 2;

        if block.index != expected_index {
            return Err(ChainError::InvalidBlock(format!(
                "Invalid block index. Expected {}, but got {}.",
                expected_index, block.index
            )));
        }

        if block.previous_hash != previous.hash()? {
            return Err(ChainError::InvalidBlockLinkage { index: block.index });
        }

        if !verify_proof(previous.proof, block.proof, difficulty) {
            return Err(ChainError::InvalidProofOfWork { index: block.index });
        }
    }

    Ok(())
}

pub fn is_valid_chain(chain: &[Block], difficulty: &Difficulty) -> bool {
    validate_chain(chain, difficulty).is_ok()
}
