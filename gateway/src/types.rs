use crate::{address::AccountAddress, error::Error};
use cosmwasm_std::Binary;
use serde::{Deserialize, Serialize};
use wasmplus_vm::Checksum;

pub type CodeId = u64;

/// Who may instantiate a code, or upload one.
#[derive(Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub enum AccessConfig {
    Nobody,
    OnlyAddress(AccountAddress),
    AnyOfAddresses(Vec<AccountAddress>),
    #[default]
    Everybody,
}

impl AccessConfig {
    pub fn allowed(&self, actor: &AccountAddress) -> bool {
        match self {
            AccessConfig::Nobody => false,
            AccessConfig::OnlyAddress(addr) => addr == actor,
            AccessConfig::AnyOfAddresses(addrs) => addrs.contains(actor),
            AccessConfig::Everybody => true,
        }
    }

    pub fn validate_basic(&self) -> Result<(), Error> {
        match self {
            AccessConfig::AnyOfAddresses(addrs) if addrs.is_empty() => {
                Err(Error::Empty("addresses".into()))
            }
            AccessConfig::AnyOfAddresses(addrs) => {
                for (i, addr) in addrs.iter().enumerate() {
                    if addrs[..i].contains(addr) {
                        return Err(Error::Duplicate(format!("address: {addr}")));
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// Permission kind without addresses, used for the default instantiate
/// permission of new codes.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub enum AccessType {
    Nobody,
    OnlyAddress,
    AnyOfAddresses,
    #[default]
    Everybody,
}

impl AccessType {
    /// Concrete config granting `actor` where the kind needs an address.
    pub fn with(self, actor: &AccountAddress) -> AccessConfig {
        match self {
            AccessType::Nobody => AccessConfig::Nobody,
            AccessType::OnlyAddress => AccessConfig::OnlyAddress(actor.clone()),
            AccessType::AnyOfAddresses => AccessConfig::AnyOfAddresses(vec![actor.clone()]),
            AccessType::Everybody => AccessConfig::Everybody,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct CodeInfo {
    pub code_hash: Checksum,
    pub creator: AccountAddress,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub builder: String,
    pub instantiate_config: AccessConfig,
}

impl CodeInfo {
    pub fn new(code_hash: Checksum, creator: AccountAddress, instantiate_config: AccessConfig) -> Self {
        CodeInfo {
            code_hash,
            creator,
            source: String::new(),
            builder: String::new(),
            instantiate_config,
        }
    }

    pub fn validate_basic(&self) -> Result<(), Error> {
        self.instantiate_config.validate_basic()
    }
}

/// Block height and transaction index of a state change.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Default, Serialize, Deserialize)]
pub struct AbsoluteTxPosition {
    pub block_height: u64,
    pub tx_index: u64,
}

#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct ContractInfo {
    pub code_id: CodeId,
    pub creator: AccountAddress,
    pub admin: Option<AccountAddress>,
    pub label: String,
    /// Redacted on export.
    pub created: Option<AbsoluteTxPosition>,
    /// Present only when the code has IBC entry points.
    pub ibc_port_id: Option<String>,
}

impl ContractInfo {
    pub fn new(
        code_id: CodeId,
        creator: AccountAddress,
        admin: Option<AccountAddress>,
        label: String,
        created: AbsoluteTxPosition,
    ) -> Self {
        ContractInfo {
            code_id,
            creator,
            admin,
            label,
            created: Some(created),
            ibc_port_id: None,
        }
    }

    pub fn validate_basic(&self) -> Result<(), Error> {
        if self.code_id == 0 {
            return Err(Error::Empty("code id".into()));
        }
        if self.label.trim().is_empty() {
            return Err(Error::Empty("label".into()));
        }
        Ok(())
    }

    pub fn initial_history(&self, init_msg: &[u8]) -> ContractCodeHistoryEntry {
        ContractCodeHistoryEntry {
            operation: ContractCodeHistoryOperationType::Init,
            code_id: self.code_id,
            updated: self.created,
            msg: Binary::from(init_msg),
        }
    }

    /// Switch to `code_id` and return the history entry recording it.
    pub fn add_migration(
        &mut self,
        position: AbsoluteTxPosition,
        code_id: CodeId,
        msg: &[u8],
    ) -> ContractCodeHistoryEntry {
        self.code_id = code_id;
        ContractCodeHistoryEntry {
            operation: ContractCodeHistoryOperationType::Migrate,
            code_id,
            updated: Some(position),
            msg: Binary::from(msg),
        }
    }

    pub fn reset_from_genesis(&mut self, position: AbsoluteTxPosition) -> ContractCodeHistoryEntry {
        self.created = Some(position);
        ContractCodeHistoryEntry {
            operation: ContractCodeHistoryOperationType::Genesis,
            code_id: self.code_id,
            updated: Some(position),
            msg: Binary::default(),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum ContractCodeHistoryOperationType {
    Init,
    Migrate,
    Genesis,
}

#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct ContractCodeHistoryEntry {
    pub operation: ContractCodeHistoryOperationType,
    pub code_id: CodeId,
    pub updated: Option<AbsoluteTxPosition>,
    pub msg: Binary,
}

/// One key of a contract's storage, used by genesis.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Model {
    pub key: Binary,
    pub value: Binary,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> AccountAddress {
        AccountAddress::from_canonical(&[byte; 20]).unwrap()
    }

    #[test]
    fn access_config_allows() {
        let creator = addr(1);
        let other = addr(2);
        assert!(!AccessConfig::Nobody.allowed(&creator));
        assert!(AccessConfig::Everybody.allowed(&other));
        let only = AccessType::OnlyAddress.with(&creator);
        assert!(only.allowed(&creator));
        assert!(!only.allowed(&other));
        let any = AccessConfig::AnyOfAddresses(vec![creator.clone(), other.clone()]);
        assert!(any.allowed(&other));
        assert!(!any.allowed(&addr(3)));
    }

    #[test]
    fn access_config_rejects_duplicates() {
        let dup = AccessConfig::AnyOfAddresses(vec![addr(1), addr(1)]);
        assert!(matches!(dup.validate_basic(), Err(Error::Duplicate(_))));
        assert!(AccessConfig::AnyOfAddresses(vec![]).validate_basic().is_err());
    }

    #[test]
    fn migration_updates_code_and_history() {
        let mut info = ContractInfo::new(
            1,
            addr(1),
            None,
            "label".into(),
            AbsoluteTxPosition {
                block_height: 10,
                tx_index: 0,
            },
        );
        let init = info.initial_history(b"{}");
        assert_eq!(init.operation, ContractCodeHistoryOperationType::Init);
        assert_eq!(init.updated, info.created);

        let pos = AbsoluteTxPosition {
            block_height: 20,
            tx_index: 3,
        };
        let entry = info.add_migration(pos, 2, b"{\"m\":1}");
        assert_eq!(info.code_id, 2);
        assert_eq!(entry.code_id, 2);
        assert_eq!(entry.updated, Some(pos));
    }
}
