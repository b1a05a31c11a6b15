use rand::{rngs::OsRng, RngCore};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Multibase prefix marking the base58btc alphabet
const MULTIBASE_BASE58BTC: char = 'z';

/// Digits in the text form. 58^22 > 2^128, so every 128-bit value fits
/// in 22 base58 digits once short encodings are left-padded with '1'.
const ENCODED_DIGITS: usize = 22;

/// Total text length: multibase prefix + fixed digit count
pub const ENCODED_LEN: usize = 1 + ENCODED_DIGITS;

/// Rejected identifier text, mapped onto the reasons callers can act on
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MalformedIdError {
    #[error("meter id must be 23 characters, got {0}")]
    Length(usize),

    #[error("meter id must be 16 bytes, got {0}")]
    ByteLength(usize),

    #[error("meter id must carry the 'z' multibase prefix")]
    Prefix,

    #[error("meter id contains a character outside the base58btc alphabet")]
    Alphabet(#[from] bs58::decode::Error),

    #[error("meter id value does not fit in 128 bits")]
    Range,
}

/// Compact 128-bit meter identifier.
///
/// The binary form is exactly 16 bytes. The text form is fixed-length
/// multibase base58btc: a 'z' prefix followed by 22 digits, left-padded
/// with '1' (the base58 zero digit) so that encoding and decoding are
/// exact inverses over the whole 128-bit space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeterId([u8; 16]);

impl MeterId {
    /// Size of the binary form in bytes
    pub const LEN: usize = 16;

    /// Wrap an existing 16-byte value
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Generate a fresh random identifier
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Binary form, used as the exact-match storage key
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Rebuild an identifier from a storage key column.
    /// Keys are written from `as_bytes`, so any other length is corruption.
    pub fn try_from_slice(bytes: &[u8]) -> Result<Self, MalformedIdError> {
        let bytes: [u8; 16] = bytes
            .try_into()
            .map_err(|_| MalformedIdError::ByteLength(bytes.len()))?;
        Ok(Self(bytes))
    }
}

impl std::fmt::Display for MeterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let digits = bs58::encode(&self.0).into_string();
        write!(f, "{}", MULTIBASE_BASE58BTC)?;
        for _ in digits.len()..ENCODED_DIGITS {
            write!(f, "1")?;
        }
        write!(f, "{}", digits)
    }
}

impl std::str::FromStr for MeterId {
    type Err = MalformedIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != ENCODED_LEN {
            return Err(MalformedIdError::Length(s.len()));
        }
        let digits = s
            .strip_prefix(MULTIBASE_BASE58BTC)
            .ok_or(MalformedIdError::Prefix)?;

        // base58btc maps each leading '1' digit to a leading zero byte, so
        // the padded form decodes to more than 16 bytes. Strip the zero
        // bytes and right-align what remains.
        let decoded = bs58::decode(digits).into_vec()?;
        let significant: Vec<u8> = decoded.iter().copied().skip_while(|b| *b == 0).collect();
        if significant.len() > Self::LEN {
            return Err(MalformedIdError::Range);
        }

        let mut bytes = [0u8; 16];
        bytes[Self::LEN - significant.len()..].copy_from_slice(&significant);
        Ok(Self(bytes))
    }
}

impl Serialize for MeterId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MeterId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(de::Error::custom)
    }
}
