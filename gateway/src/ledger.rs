//! Accounts, balances and the router for every non wasm host message.

use crate::{
    address::AccountAddress, context::Context, directory::Transactional, error::Error,
    msgs::HostMsg,
};
use cosmwasm_std::{Binary, Coin, Event};

/// What the host router returns for one message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RouterResponse {
    pub events: Vec<Event>,
    pub data: Option<Binary>,
}

/// The host ledger as seen by the gateway. State changes must follow the
/// snapshots opened through [`Transactional`].
pub trait Ledger: Transactional<Error = Error> {
    fn account_exists(&self, address: &AccountAddress) -> bool;

    fn create_account(&mut self, address: &AccountAddress) -> Result<(), Error>;

    fn transfer(
        &mut self,
        ctx: &mut Context,
        from: &AccountAddress,
        to: &AccountAddress,
        amount: &[Coin],
    ) -> Result<(), Error>;

    fn balance(&self, address: &AccountAddress, denom: &str) -> Coin;

    fn all_balances(&self, address: &AccountAddress) -> Vec<Coin>;

    /// Execute `msg`. Unknown routes are [`Error::UnknownRequest`].
    fn route(&mut self, ctx: &mut Context, msg: &HostMsg) -> Result<RouterResponse, Error>;
}
