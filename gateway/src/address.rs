use crate::error::Error;
use bech32::{self, FromBase32, ToBase32, Variant};
use cosmwasm_std::Addr;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::{fmt, str::FromStr};

/// Human readable part of account addresses.
pub const BECH32_PREFIX: &str = "link";
/// Human readable part of validator operator addresses.
pub const VALIDATOR_PREFIX: &str = "linkvaloper";
pub const MODULE_NAME: &str = "wasm";
/// Raw address lengths accepted: accounts and contracts.
pub const ADDRESS_LENGTHS: [usize; 2] = [20, 32];

/// Canonical account address. Displays and serializes as bech32.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AccountAddress(Vec<u8>);

impl AccountAddress {
    pub fn from_canonical(bytes: &[u8]) -> Result<Self, Error> {
        verify_address_format(bytes)?;
        Ok(AccountAddress(bytes.to_vec()))
    }

    pub fn from_bech32(input: &str) -> Result<Self, Error> {
        let data = decode_bech32(input, BECH32_PREFIX)?;
        Self::from_canonical(&data)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_addr(&self) -> Addr {
        Addr::unchecked(self.to_string())
    }

    /// Address of a module owned account: `sha256(sha256("module") || name || 0 || key)`.
    pub fn module(name: &str, key: &[u8]) -> Self {
        let type_hash = Sha256::digest(b"module");
        let mut hasher = Sha256::new();
        hasher.update(type_hash);
        hasher.update(name.as_bytes());
        hasher.update([0u8]);
        hasher.update(key);
        AccountAddress(hasher.finalize().to_vec())
    }
}

/// Deterministic contract address from the code id and the global instance
/// sequence.
pub fn build_contract_address(code_id: u64, instance_id: u64) -> AccountAddress {
    let mut contract_id = [0u8; 16];
    contract_id[..8].copy_from_slice(&code_id.to_be_bytes());
    contract_id[8..].copy_from_slice(&instance_id.to_be_bytes());
    AccountAddress::module(MODULE_NAME, &contract_id)
}

pub fn verify_address_format(bytes: &[u8]) -> Result<(), Error> {
    if bytes.is_empty() {
        return Err(Error::InvalidAddress("addresses cannot be empty".into()));
    }
    if !ADDRESS_LENGTHS.contains(&bytes.len()) {
        return Err(Error::InvalidAddress(format!(
            "address length must be 20 or 32 bytes, got {}",
            bytes.len()
        )));
    }
    Ok(())
}

pub fn decode_bech32(input: &str, prefix: &str) -> Result<Vec<u8>, Error> {
    let (hrp, data, variant) =
        bech32::decode(input).map_err(|e| Error::InvalidAddress(format!("{input}: {e}")))?;
    if hrp != prefix {
        return Err(Error::InvalidAddress(format!(
            "invalid Bech32 prefix; expected {prefix}, got {hrp}"
        )));
    }
    if variant != Variant::Bech32 {
        return Err(Error::InvalidAddress(format!("{input}: not bech32")));
    }
    Vec::<u8>::from_base32(&data).map_err(|e| Error::InvalidAddress(format!("{input}: {e}")))
}

pub fn encode_bech32(prefix: &str, data: &[u8]) -> Result<String, Error> {
    bech32::encode(prefix, data.to_base32(), Variant::Bech32)
        .map_err(|e| Error::InvalidAddress(e.to_string()))
}

/// Validator operator address check, used by staking message validation.
pub fn verify_validator_address(input: &str) -> Result<(), Error> {
    let data = decode_bech32(input, VALIDATOR_PREFIX)?;
    verify_address_format(&data)
}

impl fmt::Display for AccountAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let encoded = encode_bech32(BECH32_PREFIX, &self.0).map_err(|_| fmt::Error)?;
        f.write_str(&encoded)
    }
}

impl fmt::Debug for AccountAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for AccountAddress {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_bech32(s)
    }
}

impl TryFrom<&Addr> for AccountAddress {
    type Error = Error;
    fn try_from(value: &Addr) -> Result<Self, Self::Error> {
        Self::from_bech32(value.as_str())
    }
}

impl Serialize for AccountAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AccountAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        AccountAddress::from_bech32(&text).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn rejects_bad_lengths_and_prefixes() {
        assert!(AccountAddress::from_canonical(&[]).is_err());
        assert!(AccountAddress::from_canonical(b"invalid_address").is_err());
        let addr = AccountAddress::from_canonical(&[1u8; 20]).unwrap();
        let other_prefix = encode_bech32("cosmos", addr.as_bytes()).unwrap();
        assert!(matches!(
            AccountAddress::from_bech32(&other_prefix),
            Err(Error::InvalidAddress(_))
        ));
        assert!(AccountAddress::from_bech32("link1invalid").is_err());
    }

    #[test]
    fn contract_addresses_are_32_bytes_and_unique() {
        let a = build_contract_address(1, 1);
        let b = build_contract_address(1, 2);
        let c = build_contract_address(2, 1);
        assert_eq!(a.as_bytes().len(), 32);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, build_contract_address(1, 1));
        assert!(a.to_string().starts_with("link1"));
    }

    #[test]
    fn serde_uses_bech32() {
        let addr = AccountAddress::from_canonical(&[7u8; 20]).unwrap();
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, format!("\"{addr}\""));
        let back: AccountAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }

    proptest! {
        #[test]
        fn bech32_round_trip(bytes in prop::collection::vec(any::<u8>(), 20..=20)) {
            let addr = AccountAddress::from_canonical(&bytes).unwrap();
            let human = addr.to_string();
            let back = AccountAddress::from_bech32(&human).unwrap();
            prop_assert_eq!(back.as_bytes(), &bytes[..]);
            prop_assert_eq!(back.to_string(), human);
        }
    }
}
