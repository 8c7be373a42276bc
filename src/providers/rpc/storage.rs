//! `System.Account` storage access: address decoding, key derivation, SCALE decoding.

use std::hash::Hasher;

use blake2::{digest::consts::U16, Blake2b, Blake2b512, Digest};
use codec::{Decode, Encode};
use twox_hash::XxHash64;

use crate::errors::ProviderError;

const SS58_PREFIX: &[u8] = b"SS58PRE";
const CHECKSUM_LEN: usize = 2;

/// Raw account id bytes from an SS58 string or a `0x` hex string (20 or 32 bytes).
pub fn decode_address(address: &str) -> Result<Vec<u8>, ProviderError> {
    let address = address.trim();
    if address.is_empty() {
        return Err(ProviderError::InvalidAddress("empty address".into()));
    }

    if let Some(hex_id) = address.strip_prefix("0x") {
        let bytes = hex::decode(hex_id)
            .map_err(|e| ProviderError::InvalidAddress(format!("bad hex: {e}")))?;
        return match bytes.len() {
            20 | 32 => Ok(bytes),
            n => Err(ProviderError::InvalidAddress(format!("{n}-byte account id"))),
        };
    }

    let data = bs58::decode(address)
        .into_vec()
        .map_err(|e| ProviderError::InvalidAddress(format!("bad base58: {e}")))?;

    let prefix_len = match data.first() {
        Some(0..=63) => 1,
        Some(64..=127) => 2,
        _ => return Err(ProviderError::InvalidAddress("bad ss58 prefix".into())),
    };

    if data.len() != prefix_len + 32 + CHECKSUM_LEN {
        return Err(ProviderError::InvalidAddress(format!(
            "unexpected ss58 length {}",
            data.len()
        )));
    }

    let (payload, checksum) = data.split_at(data.len() - CHECKSUM_LEN);
    let hash = Blake2b512::new()
        .chain_update(SS58_PREFIX)
        .chain_update(payload)
        .finalize();
    if hash[..CHECKSUM_LEN] != *checksum {
        return Err(ProviderError::InvalidAddress("ss58 checksum mismatch".into()));
    }

    Ok(payload[prefix_len..].to_vec())
}

pub fn twox_128(data: &[u8]) -> [u8; 16] {
    let mut out = [0u8; 16];
    for (seed, chunk) in out.chunks_exact_mut(8).enumerate() {
        let mut hasher = XxHash64::with_seed(seed as u64);
        hasher.write(data);
        chunk.copy_from_slice(&hasher.finish().to_le_bytes());
    }
    out
}

pub fn blake2_128(data: &[u8]) -> [u8; 16] {
    Blake2b::<U16>::digest(data).into()
}

/// Hex storage key of `System.Account(account_id)`.
pub fn account_storage_key(account_id: &[u8]) -> String {
    let mut key = Vec::with_capacity(48 + account_id.len());
    key.extend_from_slice(&twox_128(b"System"));
    key.extend_from_slice(&twox_128(b"Account"));
    key.extend_from_slice(&blake2_128(account_id));
    key.extend_from_slice(account_id);
    format!("0x{}", hex::encode(key))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct AccountData {
    pub free: u128,
    pub reserved: u128,
    pub frozen: u128,
    pub flags: u128,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct AccountInfo {
    pub nonce: u32,
    pub consumers: u32,
    pub providers: u32,
    pub sufficients: u32,
    pub data: AccountData,
}

/// Decodes a `state_getStorage` result.
///
/// An absent value means the account has never been funded: all-zero info.
pub fn decode_account_info(value: Option<&str>) -> Result<AccountInfo, ProviderError> {
    let Some(value) = value else {
        return Ok(AccountInfo::default());
    };

    let bytes = hex::decode(value.trim_start_matches("0x"))
        .map_err(|e| ProviderError::Decode(format!("storage value hex: {e}")))?;

    AccountInfo::decode(&mut bytes.as_slice())
        .map_err(|e| ProviderError::Decode(format!("AccountInfo: {e}")))
}
