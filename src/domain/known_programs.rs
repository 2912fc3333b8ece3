//! Known Addresses
//!
//! Mints and account fingerprints the engine recognises on mainnet, plus the decimal scales
//! used to normalise quotes into a price.

use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;

/// Wrapped SOL mint
pub const NATIVE_MINT: &str = "So11111111111111111111111111111111111111112";

/// USDC mint, the stable reference currency for pricing
pub const USDC_MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

/// Raydium pool-creation fee collector; every new AMM pool pays it
pub const RAYDIUM_FEE_COLLECTOR: &str = "7YttLkHDoNj9wyDur5pM1ejNaAvT9X4eqaYcHQqtj2G5";

/// Raydium AMM v4 authority, owner of the pool vaults after initialization
pub const RAYDIUM_POOL_AUTHORITY: &str = "5Q544fKrFoe6tsEbD7S8EmxGTJYAKtTVhAW5Q5pge4j1";

/// Lamports per SOL
pub const NATIVE_DECIMAL_SCALE: f64 = 1e9;

/// Base units per USDC
pub const STABLE_DECIMAL_SCALE: f64 = 1e6;

/// Price is quoted per 0.1 SOL
pub const PRICE_NORMALIZATION: f64 = 0.1;

/// Base58 lengths of a 32-byte address
pub const ADDRESS_LENGTHS: std::ops::RangeInclusive<usize> = 43..=44;

/// Base58 lengths of a 64-byte signature
pub const SIGNATURE_LENGTHS: std::ops::RangeInclusive<usize> = 87..=88;

/// Parse a base58 address, None if malformed
pub fn parse_pubkey(address: &str) -> Option<Pubkey> {
    Pubkey::from_str(address).ok()
}

/// Whether the string decodes to a 32-byte address of the standard length
pub fn is_address(candidate: &str) -> bool {
    ADDRESS_LENGTHS.contains(&candidate.len())
        && bs58::decode(candidate)
            .into_vec()
            .map(|bytes| bytes.len() == 32)
            .unwrap_or(false)
}

/// Whether the string decodes to a 64-byte signature
pub fn is_signature(candidate: &str) -> bool {
    SIGNATURE_LENGTHS.contains(&candidate.len())
        && bs58::decode(candidate)
            .into_vec()
            .map(|bytes| bytes.len() == 64)
            .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_addresses_parse() {
        for addr in [NATIVE_MINT, USDC_MINT, RAYDIUM_FEE_COLLECTOR, RAYDIUM_POOL_AUTHORITY] {
            assert!(parse_pubkey(addr).is_some(), "{} should parse", addr);
            assert!(is_address(addr));
        }
    }

    #[test]
    fn test_signature_detection() {
        let sig = solana_sdk::signature::Signature::from([7u8; 64]).to_string();
        assert!(is_signature(&sig));
        assert!(!is_address(&sig));
        assert!(!is_signature(USDC_MINT));
    }

    #[test]
    fn test_garbage_is_neither() {
        assert!(!is_address("not-an-address"));
        assert!(!is_signature("0OIl"));
        // Right length but not base58
        assert!(!is_address(&"0".repeat(44)));
    }
}
