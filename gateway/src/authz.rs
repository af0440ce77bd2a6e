//! Who may upload, instantiate and administrate contracts.

use crate::{
    address::AccountAddress,
    context::Context,
    error::Error,
    keeper::Keeper,
    types::{AccessConfig, CodeId},
};
use cosmwasm_std::{Binary, Coin};
use wasmplus_vm::Checksum;

pub trait AuthorizationPolicy {
    fn can_create_code(&self, config: &AccessConfig, actor: &AccountAddress) -> bool;

    fn can_instantiate_contract(&self, config: &AccessConfig, actor: &AccountAddress) -> bool;

    fn can_modify_contract(&self, admin: Option<&AccountAddress>, actor: &AccountAddress) -> bool;
}

/// Enforces the access configs and contract admins.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultAuthorizationPolicy;

impl AuthorizationPolicy for DefaultAuthorizationPolicy {
    fn can_create_code(&self, config: &AccessConfig, actor: &AccountAddress) -> bool {
        config.allowed(actor)
    }

    fn can_instantiate_contract(&self, config: &AccessConfig, actor: &AccountAddress) -> bool {
        config.allowed(actor)
    }

    fn can_modify_contract(&self, admin: Option<&AccountAddress>, actor: &AccountAddress) -> bool {
        admin == Some(actor)
    }
}

/// Governance may do anything.
#[derive(Clone, Copy, Debug, Default)]
pub struct GovAuthorizationPolicy;

impl AuthorizationPolicy for GovAuthorizationPolicy {
    fn can_create_code(&self, _: &AccessConfig, _: &AccountAddress) -> bool {
        true
    }

    fn can_instantiate_contract(&self, _: &AccessConfig, _: &AccountAddress) -> bool {
        true
    }

    fn can_modify_contract(&self, _: Option<&AccountAddress>, _: &AccountAddress) -> bool {
        true
    }
}

/// Keeper operations checked against a policy of the caller's choosing,
/// typically [`GovAuthorizationPolicy`] for proposals.
pub struct PermissionedKeeper<'a, P> {
    keeper: &'a mut Keeper,
    policy: P,
}

impl<'a, P: AuthorizationPolicy> PermissionedKeeper<'a, P> {
    pub fn new(keeper: &'a mut Keeper, policy: P) -> Self {
        PermissionedKeeper { keeper, policy }
    }

    pub fn create(
        &mut self,
        ctx: &mut Context,
        creator: &AccountAddress,
        wasm_code: &[u8],
        instantiate_access: Option<AccessConfig>,
    ) -> Result<(CodeId, Checksum), Error> {
        self.keeper
            .create(ctx, creator, wasm_code, instantiate_access, &self.policy)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn instantiate(
        &mut self,
        ctx: &mut Context,
        code_id: CodeId,
        creator: &AccountAddress,
        admin: Option<AccountAddress>,
        init_msg: &[u8],
        label: &str,
        deposit: &[Coin],
    ) -> Result<(AccountAddress, Option<Binary>), Error> {
        self.keeper.instantiate_with(
            ctx,
            code_id,
            creator,
            admin,
            init_msg,
            label,
            deposit,
            &self.policy,
        )
    }

    pub fn migrate(
        &mut self,
        ctx: &mut Context,
        contract: &AccountAddress,
        caller: &AccountAddress,
        new_code_id: CodeId,
        msg: &[u8],
    ) -> Result<Option<Binary>, Error> {
        self.keeper
            .migrate_with(ctx, contract, caller, new_code_id, msg, &self.policy)
    }

    pub fn update_contract_admin(
        &mut self,
        ctx: &mut Context,
        contract: &AccountAddress,
        caller: &AccountAddress,
        new_admin: &AccountAddress,
    ) -> Result<(), Error> {
        self.keeper
            .set_contract_admin(ctx, contract, caller, Some(new_admin.clone()), &self.policy)
    }

    pub fn clear_contract_admin(
        &mut self,
        ctx: &mut Context,
        contract: &AccountAddress,
        caller: &AccountAddress,
    ) -> Result<(), Error> {
        self.keeper
            .set_contract_admin(ctx, contract, caller, None, &self.policy)
    }

    pub fn execute(
        &mut self,
        ctx: &mut Context,
        contract: &AccountAddress,
        caller: &AccountAddress,
        msg: &[u8],
        coins: &[Coin],
    ) -> Result<Option<Binary>, Error> {
        self.keeper.execute(ctx, contract, caller, msg, coins)
    }

    pub fn sudo(
        &mut self,
        ctx: &mut Context,
        contract: &AccountAddress,
        msg: &[u8],
    ) -> Result<Option<Binary>, Error> {
        self.keeper.sudo(ctx, contract, msg)
    }

    pub fn pin_code(&mut self, ctx: &mut Context, code_id: CodeId) -> Result<(), Error> {
        self.keeper.pin_code(ctx, code_id)
    }

    pub fn unpin_code(&mut self, ctx: &mut Context, code_id: CodeId) -> Result<(), Error> {
        self.keeper.unpin_code(ctx, code_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, MOCK_WASM};

    fn addr(byte: u8) -> AccountAddress {
        AccountAddress::from_canonical(&[byte; 20]).unwrap()
    }

    #[test]
    fn default_policy_follows_config_and_admin() {
        let policy = DefaultAuthorizationPolicy;
        let only = AccessConfig::OnlyAddress(addr(1));
        assert!(policy.can_create_code(&only, &addr(1)));
        assert!(!policy.can_create_code(&only, &addr(2)));
        assert!(!policy.can_instantiate_contract(&AccessConfig::Nobody, &addr(1)));
        assert!(policy.can_modify_contract(Some(&addr(1)), &addr(1)));
        assert!(!policy.can_modify_contract(Some(&addr(1)), &addr(2)));
        assert!(!policy.can_modify_contract(None, &addr(1)));
    }

    #[test]
    fn governance_bypasses_access_configs() {
        let mut keeper = testing::test_keeper();
        let mut ctx = testing::test_context();
        keeper.params.code_upload_access = AccessConfig::Nobody;

        let err = keeper.store_code(&mut ctx, &addr(1), MOCK_WASM, None).unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));

        let mut gov = PermissionedKeeper::new(&mut keeper, GovAuthorizationPolicy);
        let (code_id, _) = gov
            .create(&mut ctx, &addr(1), MOCK_WASM, Some(AccessConfig::Nobody))
            .unwrap();
        let (contract, _) = gov
            .instantiate(&mut ctx, code_id, &addr(2), None, b"{}", "gov", &[])
            .unwrap();
        gov.update_contract_admin(&mut ctx, &contract, &addr(3), &addr(4))
            .unwrap();
        assert_eq!(keeper.contract_info(&contract).unwrap().admin, Some(addr(4)));
    }
}
