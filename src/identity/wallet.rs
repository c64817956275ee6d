//! Solana addresses and program-derived addresses.
//!
//! Addresses are 32-byte ed25519 public keys rendered in base58. Only the
//! read side lives here: parsing owner and mint addresses, and deriving the
//! Metaplex metadata account for a mint. Signing belongs to the wallet.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

/// SPL Token program (the "legacy" token namespace).
pub const TOKEN_PROGRAM_ID: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";

/// SPL Token-2022 program.
pub const TOKEN_2022_PROGRAM_ID: &str = "TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb";

/// Metaplex Token Metadata program.
pub const METADATA_PROGRAM_ID: &str = "metaqbxxUerdq28cj1RbAWkYQm3ybzjb6a8bt518x1s";

pub static TOKEN_PROGRAM: LazyLock<Pubkey> = LazyLock::new(|| TOKEN_PROGRAM_ID.parse().unwrap());
pub static TOKEN_2022_PROGRAM: LazyLock<Pubkey> =
    LazyLock::new(|| TOKEN_2022_PROGRAM_ID.parse().unwrap());
pub static METADATA_PROGRAM: LazyLock<Pubkey> =
    LazyLock::new(|| METADATA_PROGRAM_ID.parse().unwrap());

const PDA_MARKER: &[u8] = b"ProgramDerivedAddress";
const MAX_SEEDS: usize = 16;
const MAX_SEED_LEN: usize = 32;

/// A 32-byte Solana address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pubkey([u8; 32]);

impl Pubkey {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Whether the bytes decompress to a point on the ed25519 curve.
    ///
    /// Program-derived addresses must be off-curve so that no private key
    /// can ever sign for them.
    pub fn is_on_curve(&self) -> bool {
        ed25519_dalek::VerifyingKey::from_bytes(&self.0).is_ok()
    }
}

impl FromStr for Pubkey {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(AddressError::Empty);
        }
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| AddressError::InvalidBase58(e.to_string()))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| AddressError::InvalidLength(v.len()))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pubkey({self})")
    }
}

impl Serialize for Pubkey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Pubkey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Find the canonical program-derived address for `seeds` under `program_id`.
///
/// Tries bump seeds from 255 downward and returns the first candidate that
/// is off the ed25519 curve, together with its bump.
pub fn find_program_address(
    seeds: &[&[u8]],
    program_id: &Pubkey,
) -> Result<(Pubkey, u8), AddressError> {
    if seeds.len() >= MAX_SEEDS {
        return Err(AddressError::TooManySeeds(seeds.len()));
    }
    if let Some(seed) = seeds.iter().find(|s| s.len() > MAX_SEED_LEN) {
        return Err(AddressError::SeedTooLong(seed.len()));
    }

    for bump in (0..=u8::MAX).rev() {
        let mut hasher = Sha256::new();
        for seed in seeds {
            hasher.update(seed);
        }
        hasher.update([bump]);
        hasher.update(program_id.as_bytes());
        hasher.update(PDA_MARKER);
        let candidate = Pubkey(hasher.finalize().into());
        if !candidate.is_on_curve() {
            return Ok((candidate, bump));
        }
    }

    Err(AddressError::NoViableBump)
}

/// Address of the Metaplex metadata account for `mint`.
pub fn metadata_pda(mint: &Pubkey) -> Result<Pubkey, AddressError> {
    let program = *METADATA_PROGRAM;
    find_program_address(&[b"metadata", program.as_bytes(), mint.as_bytes()], &program)
        .map(|(address, _)| address)
}

/// Address parsing and derivation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("address is empty")]
    Empty,
    #[error("invalid base58: {0}")]
    InvalidBase58(String),
    #[error("address must be 32 bytes, got {0}")]
    InvalidLength(usize),
    #[error("too many seeds: {0}")]
    TooManySeeds(usize),
    #[error("seed longer than 32 bytes: {0}")]
    SeedTooLong(usize),
    #[error("no bump seed yields an off-curve address")]
    NoViableBump,
}
