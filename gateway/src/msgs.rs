//! Host chain messages produced by the encoders, and the type registry that
//! decodes stargate messages into them.

use crate::{
    address::{verify_validator_address, AccountAddress},
    error::Error,
    ibc::Height,
};
use cosmwasm_std::{Binary, Coin, Uint128};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{collections::BTreeMap, rc::Rc};

pub const ROUTE_BANK: &str = "bank";
pub const ROUTE_STAKING: &str = "staking";
pub const ROUTE_DISTRIBUTION: &str = "distribution";
pub const ROUTE_WASM: &str = "wasm";
pub const ROUTE_IBC: &str = "ibc";
pub const ROUTE_TRANSFER: &str = "transfer";

/// A concrete message the host router understands.
pub trait Msg {
    const TYPE_URL: &'static str;
    const ROUTE: &'static str;

    /// Accounts that must have signed the message, as bech32.
    fn signer_addresses(&self) -> Vec<&str>;

    fn validate_basic(&self) -> Result<(), Error>;
}

fn verify_account(input: &str, what: &str) -> Result<AccountAddress, Error> {
    AccountAddress::from_bech32(input).map_err(|e| e.wrap(what))
}

fn verify_denom(denom: &str) -> Result<(), Error> {
    let valid_len = (3..=128).contains(&denom.len());
    let mut chars = denom.chars();
    let starts_with_letter = chars.next().map_or(false, |c| c.is_ascii_alphabetic());
    let valid_chars = chars.all(|c| c.is_ascii_alphanumeric() || "/:._-".contains(c));
    if valid_len && starts_with_letter && valid_chars {
        Ok(())
    } else {
        Err(Error::InvalidCoins(format!("invalid denom: {denom}")))
    }
}

/// Sorted by denom, no duplicates, no zero amounts.
pub fn validate_coins(coins: &[Coin]) -> Result<(), Error> {
    for (i, coin) in coins.iter().enumerate() {
        verify_denom(&coin.denom)?;
        if coin.amount.is_zero() {
            return Err(Error::InvalidCoins(format!("coin {coin} amount is not positive")));
        }
        if i > 0 && coins[i - 1].denom >= coin.denom {
            return Err(Error::InvalidCoins(format!(
                "denomination {} is not sorted or duplicated",
                coin.denom
            )));
        }
    }
    Ok(())
}

fn validate_positive_coin(coin: &Coin) -> Result<(), Error> {
    verify_denom(&coin.denom)?;
    if coin.amount.is_zero() {
        return Err(Error::InvalidCoins(format!("coin {coin} amount is not positive")));
    }
    Ok(())
}

/// Normalize contract supplied coins: merge duplicate denoms, drop zero
/// amounts and sort.
pub fn convert_coins(coins: &[Coin]) -> Result<Vec<Coin>, Error> {
    let mut merged: BTreeMap<&str, Uint128> = BTreeMap::new();
    for coin in coins {
        verify_denom(&coin.denom)?;
        let total = merged.entry(coin.denom.as_str()).or_default();
        *total = total
            .checked_add(coin.amount)
            .map_err(|e| Error::InvalidCoins(e.to_string()))?;
    }
    Ok(merged
        .into_iter()
        .filter(|(_, amount)| !amount.is_zero())
        .map(|(denom, amount)| Coin::new(amount.u128(), denom))
        .collect())
}

fn validate_json(msg: &[u8]) -> Result<(), Error> {
    serde_json::from_slice::<serde_json::Value>(msg)
        .map(|_| ())
        .map_err(|_| Error::Invalid("msg json".into()))
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct MsgSend {
    pub from_address: String,
    pub to_address: String,
    pub amount: Vec<Coin>,
}

impl Msg for MsgSend {
    const TYPE_URL: &'static str = "/cosmos.bank.v1beta1.MsgSend";
    const ROUTE: &'static str = ROUTE_BANK;

    fn signer_addresses(&self) -> Vec<&str> {
        vec![self.from_address.as_str()]
    }

    fn validate_basic(&self) -> Result<(), Error> {
        verify_account(&self.from_address, "invalid from address")?;
        verify_account(&self.to_address, "invalid to address")?;
        if self.amount.is_empty() {
            return Err(Error::InvalidCoins("send amount is empty".into()));
        }
        validate_coins(&self.amount)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct MsgDelegate {
    pub delegator_address: String,
    pub validator_address: String,
    pub amount: Coin,
}

impl Msg for MsgDelegate {
    const TYPE_URL: &'static str = "/cosmos.staking.v1beta1.MsgDelegate";
    const ROUTE: &'static str = ROUTE_STAKING;

    fn signer_addresses(&self) -> Vec<&str> {
        vec![self.delegator_address.as_str()]
    }

    fn validate_basic(&self) -> Result<(), Error> {
        verify_account(&self.delegator_address, "invalid delegator address")?;
        verify_validator_address(&self.validator_address)?;
        validate_positive_coin(&self.amount)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct MsgBeginRedelegate {
    pub delegator_address: String,
    pub validator_src_address: String,
    pub validator_dst_address: String,
    pub amount: Coin,
}

impl Msg for MsgBeginRedelegate {
    const TYPE_URL: &'static str = "/cosmos.staking.v1beta1.MsgBeginRedelegate";
    const ROUTE: &'static str = ROUTE_STAKING;

    fn signer_addresses(&self) -> Vec<&str> {
        vec![self.delegator_address.as_str()]
    }

    fn validate_basic(&self) -> Result<(), Error> {
        verify_account(&self.delegator_address, "invalid delegator address")?;
        verify_validator_address(&self.validator_src_address)?;
        verify_validator_address(&self.validator_dst_address)?;
        validate_positive_coin(&self.amount)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct MsgUndelegate {
    pub delegator_address: String,
    pub validator_address: String,
    pub amount: Coin,
}

impl Msg for MsgUndelegate {
    const TYPE_URL: &'static str = "/cosmos.staking.v1beta1.MsgUndelegate";
    const ROUTE: &'static str = ROUTE_STAKING;

    fn signer_addresses(&self) -> Vec<&str> {
        vec![self.delegator_address.as_str()]
    }

    fn validate_basic(&self) -> Result<(), Error> {
        verify_account(&self.delegator_address, "invalid delegator address")?;
        verify_validator_address(&self.validator_address)?;
        validate_positive_coin(&self.amount)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct MsgSetWithdrawAddress {
    pub delegator_address: String,
    pub withdraw_address: String,
}

impl Msg for MsgSetWithdrawAddress {
    const TYPE_URL: &'static str = "/cosmos.distribution.v1beta1.MsgSetWithdrawAddress";
    const ROUTE: &'static str = ROUTE_DISTRIBUTION;

    fn signer_addresses(&self) -> Vec<&str> {
        vec![self.delegator_address.as_str()]
    }

    fn validate_basic(&self) -> Result<(), Error> {
        verify_account(&self.delegator_address, "invalid delegator address")?;
        verify_account(&self.withdraw_address, "invalid withdraw address")?;
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct MsgWithdrawDelegatorReward {
    pub delegator_address: String,
    pub validator_address: String,
}

impl Msg for MsgWithdrawDelegatorReward {
    const TYPE_URL: &'static str = "/cosmos.distribution.v1beta1.MsgWithdrawDelegatorReward";
    const ROUTE: &'static str = ROUTE_DISTRIBUTION;

    fn signer_addresses(&self) -> Vec<&str> {
        vec![self.delegator_address.as_str()]
    }

    fn validate_basic(&self) -> Result<(), Error> {
        verify_account(&self.delegator_address, "invalid delegator address")?;
        verify_validator_address(&self.validator_address)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct MsgExecuteContract {
    pub sender: String,
    pub contract: String,
    pub msg: Binary,
    pub funds: Vec<Coin>,
}

impl Msg for MsgExecuteContract {
    const TYPE_URL: &'static str = "/cosmwasm.wasm.v1.MsgExecuteContract";
    const ROUTE: &'static str = ROUTE_WASM;

    fn signer_addresses(&self) -> Vec<&str> {
        vec![self.sender.as_str()]
    }

    fn validate_basic(&self) -> Result<(), Error> {
        verify_account(&self.sender, "sender")?;
        verify_account(&self.contract, "contract")?;
        validate_coins(&self.funds).map_err(|e| e.wrap("funds"))?;
        validate_json(&self.msg)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct MsgInstantiateContract {
    pub sender: String,
    pub admin: Option<String>,
    pub code_id: u64,
    pub label: String,
    pub msg: Binary,
    pub funds: Vec<Coin>,
}

impl Msg for MsgInstantiateContract {
    const TYPE_URL: &'static str = "/cosmwasm.wasm.v1.MsgInstantiateContract";
    const ROUTE: &'static str = ROUTE_WASM;

    fn signer_addresses(&self) -> Vec<&str> {
        vec![self.sender.as_str()]
    }

    fn validate_basic(&self) -> Result<(), Error> {
        verify_account(&self.sender, "sender")?;
        if self.code_id == 0 {
            return Err(Error::Invalid("code id is required".into()));
        }
        if self.label.trim().is_empty() {
            return Err(Error::Empty("label is required".into()));
        }
        validate_coins(&self.funds).map_err(|e| e.wrap("funds"))?;
        if let Some(admin) = &self.admin {
            verify_account(admin, "admin")?;
        }
        validate_json(&self.msg)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct MsgMigrateContract {
    pub sender: String,
    pub contract: String,
    pub code_id: u64,
    pub msg: Binary,
}

impl Msg for MsgMigrateContract {
    const TYPE_URL: &'static str = "/cosmwasm.wasm.v1.MsgMigrateContract";
    const ROUTE: &'static str = ROUTE_WASM;

    fn signer_addresses(&self) -> Vec<&str> {
        vec![self.sender.as_str()]
    }

    fn validate_basic(&self) -> Result<(), Error> {
        if self.code_id == 0 {
            return Err(Error::Invalid("code id is required".into()));
        }
        verify_account(&self.sender, "sender")?;
        verify_account(&self.contract, "contract")?;
        validate_json(&self.msg)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct MsgUpdateAdmin {
    pub sender: String,
    pub new_admin: String,
    pub contract: String,
}

impl Msg for MsgUpdateAdmin {
    const TYPE_URL: &'static str = "/cosmwasm.wasm.v1.MsgUpdateAdmin";
    const ROUTE: &'static str = ROUTE_WASM;

    fn signer_addresses(&self) -> Vec<&str> {
        vec![self.sender.as_str()]
    }

    fn validate_basic(&self) -> Result<(), Error> {
        verify_account(&self.sender, "sender")?;
        verify_account(&self.contract, "contract")?;
        verify_account(&self.new_admin, "new admin")?;
        if self.sender.eq_ignore_ascii_case(&self.new_admin) {
            return Err(Error::InvalidMsg("new admin is the same as the old".into()));
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct MsgClearAdmin {
    pub sender: String,
    pub contract: String,
}

impl Msg for MsgClearAdmin {
    const TYPE_URL: &'static str = "/cosmwasm.wasm.v1.MsgClearAdmin";
    const ROUTE: &'static str = ROUTE_WASM;

    fn signer_addresses(&self) -> Vec<&str> {
        vec![self.sender.as_str()]
    }

    fn validate_basic(&self) -> Result<(), Error> {
        verify_account(&self.sender, "sender")?;
        verify_account(&self.contract, "contract")?;
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct MsgChannelCloseInit {
    pub port_id: String,
    pub channel_id: String,
    pub signer: String,
}

impl Msg for MsgChannelCloseInit {
    const TYPE_URL: &'static str = "/ibc.core.channel.v1.MsgChannelCloseInit";
    const ROUTE: &'static str = ROUTE_IBC;

    fn signer_addresses(&self) -> Vec<&str> {
        vec![self.signer.as_str()]
    }

    fn validate_basic(&self) -> Result<(), Error> {
        if self.port_id.trim().is_empty() {
            return Err(Error::Invalid("invalid port ID".into()));
        }
        if self.channel_id.trim().is_empty() {
            return Err(Error::Invalid("invalid channel ID".into()));
        }
        verify_account(&self.signer, "string could not be parsed as address")?;
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct MsgTransfer {
    pub source_port: String,
    pub source_channel: String,
    pub token: Coin,
    pub sender: String,
    pub receiver: String,
    pub timeout_height: Height,
    /// Nanoseconds since epoch, 0 when unset.
    pub timeout_timestamp: u64,
}

impl Msg for MsgTransfer {
    const TYPE_URL: &'static str = "/ibc.applications.transfer.v1.MsgTransfer";
    const ROUTE: &'static str = ROUTE_TRANSFER;

    fn signer_addresses(&self) -> Vec<&str> {
        vec![self.sender.as_str()]
    }

    fn validate_basic(&self) -> Result<(), Error> {
        if self.source_port.trim().is_empty() {
            return Err(Error::Invalid("invalid source port ID".into()));
        }
        if self.source_channel.trim().is_empty() {
            return Err(Error::Invalid("invalid source channel ID".into()));
        }
        validate_positive_coin(&self.token)?;
        verify_account(&self.sender, "string could not be parsed as address")?;
        if self.receiver.trim().is_empty() {
            return Err(Error::InvalidAddress("missing recipient address".into()));
        }
        if self.timeout_height.is_zero() && self.timeout_timestamp == 0 {
            return Err(Error::Invalid(
                "packet timeout height and packet timeout timestamp cannot both be 0".into(),
            ));
        }
        Ok(())
    }
}

macro_rules! host_msgs {
    ($($variant:ident),* $(,)?) => {
        /// Every message the gateway can hand to the host router.
        #[derive(Clone, Debug, PartialEq, Eq)]
        pub enum HostMsg {
            $($variant($variant),)*
        }

        $(
            impl From<$variant> for HostMsg {
                fn from(msg: $variant) -> Self {
                    HostMsg::$variant(msg)
                }
            }
        )*

        impl HostMsg {
            pub fn type_url(&self) -> &'static str {
                match self {
                    $(HostMsg::$variant(_) => <$variant as Msg>::TYPE_URL,)*
                }
            }

            pub fn route(&self) -> &'static str {
                match self {
                    $(HostMsg::$variant(_) => <$variant as Msg>::ROUTE,)*
                }
            }

            pub fn validate_basic(&self) -> Result<(), Error> {
                match self {
                    $(HostMsg::$variant(msg) => msg.validate_basic(),)*
                }
            }

            fn signer_addresses(&self) -> Vec<&str> {
                match self {
                    $(HostMsg::$variant(msg) => msg.signer_addresses(),)*
                }
            }

            /// JSON wire form, the inverse of [`TypeRegistry::decode`].
            pub fn encode(&self) -> Result<Binary, Error> {
                let raw = match self {
                    $(HostMsg::$variant(msg) => serde_json::to_vec(msg),)*
                };
                raw.map(Binary::from)
                    .map_err(|e| Error::InvalidMsg(e.to_string()))
            }
        }

        impl Default for TypeRegistry {
            /// Registry knowing every host message.
            fn default() -> Self {
                let mut registry = TypeRegistry::empty();
                $(registry.register::<$variant>();)*
                registry
            }
        }
    };
}

host_msgs!(
    MsgSend,
    MsgDelegate,
    MsgBeginRedelegate,
    MsgUndelegate,
    MsgSetWithdrawAddress,
    MsgWithdrawDelegatorReward,
    MsgExecuteContract,
    MsgInstantiateContract,
    MsgMigrateContract,
    MsgUpdateAdmin,
    MsgClearAdmin,
    MsgChannelCloseInit,
    MsgTransfer,
);

impl HostMsg {
    pub fn signers(&self) -> Result<Vec<AccountAddress>, Error> {
        self.signer_addresses()
            .into_iter()
            .map(AccountAddress::from_bech32)
            .collect()
    }
}

type Decoder = Rc<dyn Fn(&[u8]) -> Result<HostMsg, Error>>;

/// Type url to decoder map used to unpack stargate messages.
#[derive(Clone)]
pub struct TypeRegistry {
    decoders: BTreeMap<String, Decoder>,
}

impl TypeRegistry {
    pub fn empty() -> Self {
        TypeRegistry {
            decoders: BTreeMap::new(),
        }
    }

    pub fn register<M>(&mut self)
    where
        M: Msg + DeserializeOwned + Into<HostMsg> + 'static,
    {
        self.decoders.insert(
            M::TYPE_URL.to_owned(),
            Rc::new(|value: &[u8]| {
                serde_json::from_slice::<M>(value)
                    .map(Into::into)
                    .map_err(|e| Error::InvalidMsg(format!("{}: {e}", M::TYPE_URL)))
            }),
        );
    }

    pub fn contains(&self, type_url: &str) -> bool {
        self.decoders.contains_key(type_url)
    }

    pub fn decode(&self, type_url: &str, value: &[u8]) -> Result<HostMsg, Error> {
        let decoder = self.decoders.get(type_url).ok_or_else(|| {
            Error::InvalidMsg(format!("Cannot unpack proto message with type URL: {type_url}"))
        })?;
        decoder(value)
    }
}

/// Data returned by the wasm route for an execute.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct MsgExecuteContractResponse {
    pub data: Option<Binary>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct MsgInstantiateContractResponse {
    pub address: String,
    pub data: Option<Binary>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct MsgMigrateContractResponse {
    pub data: Option<Binary>,
}
