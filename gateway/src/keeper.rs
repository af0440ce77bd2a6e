//! Contract lifecycle and the dispatch of everything a contract emits.

use crate::{
    address::{build_contract_address, AccountAddress},
    authz::{AuthorizationPolicy, DefaultAuthorizationPolicy},
    config::{Params, WasmConfig},
    context::{Context, EventManager},
    directory::{ContractDirectory, Sequence, Transactional},
    encoders::{EncoderOverrides, MessageEncoders, DEFAULT_TRANSFER_PORT},
    env::{new_env, new_info, ContractBackend},
    error::Error,
    events::{
        new_custom_events, new_wasm_module_event, ATTRIBUTE_KEY_CHECKSUM, ATTRIBUTE_KEY_CODE_ID,
        ATTRIBUTE_KEY_CONTRACT_ADDR, ATTRIBUTE_KEY_NEW_ADMIN, EVENT_TYPE_EXECUTE,
        EVENT_TYPE_INSTANTIATE, EVENT_TYPE_MIGRATE, EVENT_TYPE_PIN_CODE, EVENT_TYPE_REPLY,
        EVENT_TYPE_STORE_CODE, EVENT_TYPE_SUDO, EVENT_TYPE_UNPIN_CODE, EVENT_TYPE_UPDATE_ADMIN,
    },
    gas_meter::GasMeter,
    gas_register::{WasmGasRegister, WasmGasRegisterConfig},
    handler::{DispatchHost, DispatchResponse, MessageHandler, MessageHandlerChain},
    ibc::{port_id_for_contract, port_path, CapabilityKeeper, ChannelKeeper},
    ledger::{Ledger, RouterResponse},
    msgs::{
        HostMsg, MsgExecuteContractResponse, MsgInstantiateContractResponse,
        MsgMigrateContractResponse, TypeRegistry, ROUTE_WASM,
    },
    querier::{QueryPluginOverrides, QueryPlugins},
    store::KvGasConfig,
    types::{AccessConfig, CodeId, CodeInfo, ContractCodeHistoryEntry, ContractInfo},
};
use cosmwasm_std::{
    to_binary, Binary, Coin, ContractResult, Event, Reply, ReplyOn, SubMsgResponse, SubMsgResult,
};
use std::{
    panic::{self, AssertUnwindSafe},
    rc::Rc,
};
use wasmplus_vm::{
    Backend, Checksum, CosmosMsg, EngineResult, Invocation, Response, SubMsg, VmError, WasmEngine,
};

/// Event type the host router uses for message metadata. Never forwarded to
/// replies.
const SDK_MESSAGE_EVENT_TYPE: &str = "message";

#[derive(Debug)]
enum SubCallContinuation<E> {
    Continue,
    Reply(SubMsgResult),
    Abort(E),
}

/// Optional collaborators and tuning of a [`Keeper`].
pub struct KeeperOptions {
    pub encoders: EncoderOverrides,
    pub query_plugins: QueryPluginOverrides,
    pub gas_register: WasmGasRegisterConfig,
    pub kv_gas: KvGasConfig,
    pub params: Params,
    pub type_registry: TypeRegistry,
    pub transfer_port: String,
    /// Replaces the whole default handler chain, encoders included.
    pub message_handler: Option<Rc<dyn MessageHandler>>,
}

impl Default for KeeperOptions {
    fn default() -> Self {
        KeeperOptions {
            encoders: EncoderOverrides::default(),
            query_plugins: QueryPluginOverrides::default(),
            gas_register: WasmGasRegisterConfig::default(),
            kv_gas: KvGasConfig::default(),
            params: Params::default(),
            type_registry: TypeRegistry::default(),
            transfer_port: DEFAULT_TRANSFER_PORT.into(),
            message_handler: None,
        }
    }
}

pub struct Keeper {
    pub(crate) engine: Rc<dyn WasmEngine>,
    pub(crate) directory: ContractDirectory,
    pub(crate) ledger: Box<dyn Ledger>,
    pub(crate) channel_keeper: Box<dyn ChannelKeeper>,
    pub(crate) capability_keeper: Box<dyn CapabilityKeeper>,
    pub(crate) messenger: Rc<dyn MessageHandler>,
    pub(crate) query_plugins: Rc<QueryPlugins>,
    pub(crate) gas_register: WasmGasRegister,
    pub(crate) kv_gas: KvGasConfig,
    pub(crate) config: WasmConfig,
    pub(crate) params: Params,
}

impl Keeper {
    pub fn new(
        engine: Rc<dyn WasmEngine>,
        ledger: Box<dyn Ledger>,
        channel_keeper: Box<dyn ChannelKeeper>,
        capability_keeper: Box<dyn CapabilityKeeper>,
        config: WasmConfig,
        options: KeeperOptions,
    ) -> Self {
        let messenger = options.message_handler.unwrap_or_else(|| {
            let encoders = MessageEncoders::new(options.type_registry, options.transfer_port)
                .merge(options.encoders);
            Rc::new(MessageHandlerChain::with_defaults(encoders))
        });
        Keeper {
            engine,
            directory: ContractDirectory::new(),
            ledger,
            channel_keeper,
            capability_keeper,
            messenger,
            query_plugins: Rc::new(QueryPlugins::default().merge(options.query_plugins)),
            gas_register: WasmGasRegister::new(options.gas_register),
            kv_gas: options.kv_gas,
            config,
            params: options.params,
        }
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn set_params(&mut self, params: Params) -> Result<(), Error> {
        params.validate()?;
        self.params = params;
        Ok(())
    }

    pub fn config(&self) -> &WasmConfig {
        &self.config
    }

    pub fn gas_register(&self) -> &WasmGasRegister {
        &self.gas_register
    }

    pub fn directory(&self) -> &ContractDirectory {
        &self.directory
    }

    pub fn ledger(&self) -> &dyn Ledger {
        self.ledger.as_ref()
    }

    pub fn code_info(&self, code_id: CodeId) -> Option<&CodeInfo> {
        self.directory.code_info(code_id)
    }

    pub fn contract_info(&self, contract: &AccountAddress) -> Option<&ContractInfo> {
        self.directory.contract_info(contract)
    }

    pub fn contract_history(&self, contract: &AccountAddress) -> &[ContractCodeHistoryEntry] {
        self.directory.history(contract)
    }

    pub fn is_pinned_code(&self, code_id: CodeId) -> bool {
        self.directory.is_pinned(code_id)
    }

    /// Run `f` as one transaction: commit on success, otherwise roll back
    /// every state change and drop the events it emitted. Gas exhaustion
    /// burns what is left of the meter. A panic is turned into
    /// [`Error::Panic`] with the context restored and all gas burned.
    /// Inactive marks never outlive the call.
    pub fn run_tx<T>(
        &mut self,
        ctx: &mut Context,
        f: impl FnOnce(&mut Keeper, &mut Context) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let depth = self.directory.depth();
        let meter = ctx.gas_meter().clone();
        let events = ctx.events().len();
        self.transaction_begin()?;
        let result = panic::catch_unwind(AssertUnwindSafe(|| f(self, ctx)));
        let result = match result {
            Ok(Ok(value)) => self.transaction_commit().map(|()| value),
            Ok(Err(e)) => {
                self.rollback_to(depth)?;
                ctx.event_manager_mut().truncate(events);
                if e.is_out_of_gas() {
                    ctx.gas_meter_mut().consume_remaining();
                }
                Err(e)
            }
            Err(_) => {
                log::error!("Recovered from panic while executing transaction");
                self.rollback_to(depth)?;
                // a panic may have left a sub meter or event log in place
                ctx.replace_gas_meter(meter);
                ctx.gas_meter_mut().consume_remaining();
                ctx.event_manager_mut().truncate(events);
                Err(Error::Panic)
            }
        };
        ctx.clear_all_inactive();
        result
    }

    fn rollback_to(&mut self, depth: usize) -> Result<(), Error> {
        while self.directory.depth() > depth {
            self.transaction_rollback()?;
        }
        Ok(())
    }

    /// Execute a host message submitted in a transaction.
    pub fn deliver(&mut self, ctx: &mut Context, msg: &HostMsg) -> Result<RouterResponse, Error> {
        self.run_tx(ctx, |keeper, ctx| {
            msg.validate_basic()?;
            keeper.route(ctx, msg)
        })
    }

    pub fn store_code(
        &mut self,
        ctx: &mut Context,
        creator: &AccountAddress,
        wasm_code: &[u8],
        instantiate_access: Option<AccessConfig>,
    ) -> Result<(CodeId, Checksum), Error> {
        self.create(ctx, creator, wasm_code, instantiate_access, &DefaultAuthorizationPolicy)
    }

    pub(crate) fn create(
        &mut self,
        ctx: &mut Context,
        creator: &AccountAddress,
        wasm_code: &[u8],
        instantiate_access: Option<AccessConfig>,
        policy: &dyn AuthorizationPolicy,
    ) -> Result<(CodeId, Checksum), Error> {
        if !policy.can_create_code(&self.params.code_upload_access, creator) {
            return Err(Error::Unauthorized("can not create code".into()));
        }
        if wasm_code.is_empty() {
            return Err(Error::Empty("wasm code".into()));
        }
        if wasm_code.len() as u64 > self.params.max_wasm_code_size {
            return Err(Error::Limit(format!(
                "cannot be longer than {} bytes",
                self.params.max_wasm_code_size
            )));
        }
        let instantiate_access = instantiate_access
            .unwrap_or_else(|| self.params.instantiate_default_permission.with(creator));
        instantiate_access.validate_basic()?;

        ctx.gas_meter_mut().consume_gas(
            self.gas_register.compile_costs(wasm_code.len()),
            "Compiling wasm bytecode",
        )?;
        let checksum = self
            .engine
            .create(wasm_code)
            .map_err(|e| Error::CreateFailed(e.to_string()))?;
        let report = self
            .engine
            .analyze_code(&checksum)
            .map_err(|e| Error::CreateFailed(e.to_string()))?;

        let code_id = self.directory.auto_increment_id(Sequence::LastCodeId);
        self.directory.set_code_info(
            code_id,
            CodeInfo::new(checksum, creator.clone(), instantiate_access),
        );
        let mut event = Event::new(EVENT_TYPE_STORE_CODE)
            .add_attribute(ATTRIBUTE_KEY_CHECKSUM, checksum.to_hex())
            .add_attribute(ATTRIBUTE_KEY_CODE_ID, code_id.to_string());
        for capability in report.required_capabilities {
            event = event.add_attribute("required_capability", capability);
        }
        ctx.emit_event(event);
        log::debug!("stored code {code_id} with checksum {checksum}");
        Ok((code_id, checksum))
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
        self.instantiate_with(
            ctx,
            code_id,
            creator,
            admin,
            init_msg,
            label,
            deposit,
            &DefaultAuthorizationPolicy,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn instantiate_with(
        &mut self,
        ctx: &mut Context,
        code_id: CodeId,
        creator: &AccountAddress,
        admin: Option<AccountAddress>,
        init_msg: &[u8],
        label: &str,
        deposit: &[Coin],
        policy: &dyn AuthorizationPolicy,
    ) -> Result<(AccountAddress, Option<Binary>), Error> {
        let setup_costs = self
            .gas_register
            .instantiate_contract_costs(self.directory.is_pinned(code_id), init_msg.len());
        ctx.gas_meter_mut()
            .consume_gas(setup_costs, "Loading CosmWasm module: instantiate")?;

        let instance_id = self.directory.auto_increment_id(Sequence::LastInstanceId);
        let contract = build_contract_address(code_id, instance_id);
        if self.directory.has_contract(&contract) {
            return Err(Error::Duplicate(format!("instance with address {contract}")));
        }
        if self.ledger.account_exists(&contract) {
            return Err(Error::AccountExists(contract.to_string()));
        }
        self.ledger.create_account(&contract)?;
        if !deposit.is_empty() {
            self.ledger.transfer(ctx, creator, &contract, deposit)?;
        }

        let code_info = self
            .directory
            .code_info(code_id)
            .cloned()
            .ok_or_else(|| Error::NotFound("code".into()))?;
        if !policy.can_instantiate_contract(&code_info.instantiate_config, creator) {
            return Err(Error::Unauthorized("can not instantiate".into()));
        }

        let info = new_info(creator, deposit);
        let response = self.call_engine(
            ctx,
            &contract,
            &code_info.code_hash,
            false,
            Error::InstantiateFailed,
            |engine, call, backend| engine.instantiate(call, &info, init_msg, backend),
        )?;

        let mut contract_info = ContractInfo::new(
            code_id,
            creator.clone(),
            admin,
            label.to_owned(),
            ctx.tx_position(),
        );
        let report = self
            .engine
            .analyze_code(&code_info.code_hash)
            .map_err(|e| Error::InstantiateFailed(e.to_string()))?;
        if report.has_ibc_entry_points {
            contract_info.ibc_port_id = Some(self.ensure_ibc_port(&contract)?);
        }
        // stored before dispatch so the contract can be called back
        let history = contract_info.initial_history(init_msg);
        self.directory.append_history(&contract, vec![history]);
        let ibc_port = contract_info.ibc_port_id.clone();
        self.directory
            .set_contract_info(contract.clone(), contract_info);

        ctx.emit_event(
            Event::new(EVENT_TYPE_INSTANTIATE)
                .add_attribute(ATTRIBUTE_KEY_CONTRACT_ADDR, contract.to_string())
                .add_attribute(ATTRIBUTE_KEY_CODE_ID, code_id.to_string()),
        );
        let data = self
            .handle_contract_response(ctx, &contract, ibc_port.as_deref(), response)
            .map_err(|e| e.wrap("dispatch"))?;
        Ok((contract, data))
    }

    /// Upload and instantiate in one step. The uploader is the creator.
    #[allow(clippy::too_many_arguments)]
    pub fn store_code_and_instantiate(
        &mut self,
        ctx: &mut Context,
        creator: &AccountAddress,
        wasm_code: &[u8],
        instantiate_access: Option<AccessConfig>,
        admin: Option<AccountAddress>,
        init_msg: &[u8],
        label: &str,
        deposit: &[Coin],
    ) -> Result<(CodeId, AccountAddress, Option<Binary>), Error> {
        let (code_id, _) = self.store_code(ctx, creator, wasm_code, instantiate_access)?;
        let (contract, data) =
            self.instantiate(ctx, code_id, creator, admin, init_msg, label, deposit)?;
        Ok((code_id, contract, data))
    }

    pub fn execute(
        &mut self,
        ctx: &mut Context,
        contract: &AccountAddress,
        caller: &AccountAddress,
        msg: &[u8],
        coins: &[Coin],
    ) -> Result<Option<Binary>, Error> {
        let (contract_info, code_info) = self.directory.resolve(contract)?;
        if ctx.is_inactive(contract) {
            return Err(Error::ExecutionBlocked(contract.to_string()));
        }
        let setup_costs = self.gas_register.instantiate_contract_costs(
            self.directory.is_pinned(contract_info.code_id),
            msg.len(),
        );
        ctx.gas_meter_mut()
            .consume_gas(setup_costs, "Loading CosmWasm module: execute")?;
        if !coins.is_empty() {
            self.ledger.transfer(ctx, caller, contract, coins)?;
        }

        let info = new_info(caller, coins);
        let response = self.call_engine(
            ctx,
            contract,
            &code_info.code_hash,
            false,
            Error::ExecuteFailed,
            |engine, call, backend| engine.execute(call, &info, msg, backend),
        )?;

        ctx.emit_event(
            Event::new(EVENT_TYPE_EXECUTE)
                .add_attribute(ATTRIBUTE_KEY_CONTRACT_ADDR, contract.to_string()),
        );
        self.handle_contract_response(ctx, contract, contract_info.ibc_port_id.as_deref(), response)
            .map_err(|e| e.wrap("dispatch"))
    }

    pub fn migrate(
        &mut self,
        ctx: &mut Context,
        contract: &AccountAddress,
        caller: &AccountAddress,
        new_code_id: CodeId,
        msg: &[u8],
    ) -> Result<Option<Binary>, Error> {
        self.migrate_with(ctx, contract, caller, new_code_id, msg, &DefaultAuthorizationPolicy)
    }

    pub(crate) fn migrate_with(
        &mut self,
        ctx: &mut Context,
        contract: &AccountAddress,
        caller: &AccountAddress,
        new_code_id: CodeId,
        msg: &[u8],
        policy: &dyn AuthorizationPolicy,
    ) -> Result<Option<Binary>, Error> {
        let setup_costs = self
            .gas_register
            .instantiate_contract_costs(self.directory.is_pinned(new_code_id), msg.len());
        ctx.gas_meter_mut()
            .consume_gas(setup_costs, "Loading CosmWasm module: migrate")?;

        let mut contract_info = self
            .directory
            .contract_info(contract)
            .cloned()
            .ok_or_else(|| Error::NotFound("unknown contract".into()))?;
        if !policy.can_modify_contract(contract_info.admin.as_ref(), caller) {
            return Err(Error::Unauthorized("can not migrate".into()));
        }
        let new_code_info = self
            .directory
            .code_info(new_code_id)
            .cloned()
            .ok_or_else(|| Error::NotFound("unknown code".into()))?;
        if !policy.can_instantiate_contract(&new_code_info.instantiate_config, caller) {
            return Err(Error::Unauthorized("to use new code".into()));
        }

        let report = self
            .engine
            .analyze_code(&new_code_info.code_hash)
            .map_err(|e| Error::MigrationFailed(e.to_string()))?;
        match (report.has_ibc_entry_points, &contract_info.ibc_port_id) {
            (false, Some(_)) => {
                return Err(Error::MigrationFailed("requires ibc callbacks".into()));
            }
            (true, None) => {
                contract_info.ibc_port_id = Some(self.ensure_ibc_port(contract)?);
            }
            _ => {}
        }

        // nothing may call into the contract while its code is swapped
        let was_inactive = ctx.is_inactive(contract);
        ctx.mark_inactive(contract.clone());
        let response = self.call_engine(
            ctx,
            contract,
            &new_code_info.code_hash,
            false,
            Error::MigrationFailed,
            |engine, call, backend| engine.migrate(call, msg, backend),
        );
        if !was_inactive {
            ctx.clear_inactive(contract);
        }
        let response = response?;

        let history = contract_info.add_migration(ctx.tx_position(), new_code_id, msg);
        self.directory.append_history(contract, vec![history]);
        let ibc_port = contract_info.ibc_port_id.clone();
        self.directory
            .set_contract_info(contract.clone(), contract_info);

        ctx.emit_event(
            Event::new(EVENT_TYPE_MIGRATE)
                .add_attribute(ATTRIBUTE_KEY_CODE_ID, new_code_id.to_string())
                .add_attribute(ATTRIBUTE_KEY_CONTRACT_ADDR, contract.to_string()),
        );
        self.handle_contract_response(ctx, contract, ibc_port.as_deref(), response)
            .map_err(|e| e.wrap("dispatch"))
    }

    /// Privileged entry point, no caller.
    pub fn sudo(
        &mut self,
        ctx: &mut Context,
        contract: &AccountAddress,
        msg: &[u8],
    ) -> Result<Option<Binary>, Error> {
        let (contract_info, code_info) = self.directory.resolve(contract)?;
        let setup_costs = self.gas_register.instantiate_contract_costs(
            self.directory.is_pinned(contract_info.code_id),
            msg.len(),
        );
        ctx.gas_meter_mut()
            .consume_gas(setup_costs, "Loading CosmWasm module: sudo")?;

        let response = self.call_engine(
            ctx,
            contract,
            &code_info.code_hash,
            false,
            Error::ExecuteFailed,
            |engine, call, backend| engine.sudo(call, msg, backend),
        )?;

        ctx.emit_event(
            Event::new(EVENT_TYPE_SUDO)
                .add_attribute(ATTRIBUTE_KEY_CONTRACT_ADDR, contract.to_string()),
        );
        self.handle_contract_response(ctx, contract, contract_info.ibc_port_id.as_deref(), response)
            .map_err(|e| e.wrap("dispatch"))
    }

    /// Hand the result of a sub-message back to the contract that sent it.
    pub fn reply(
        &mut self,
        ctx: &mut Context,
        contract: &AccountAddress,
        reply: Reply,
    ) -> Result<Option<Binary>, Error> {
        let (contract_info, code_info) = self.directory.resolve(contract)?;
        // the contract was just running, so always priced as pinned
        let reply_costs = self.gas_register.reply_costs(true, &reply);
        ctx.gas_meter_mut()
            .consume_gas(reply_costs, "Loading CosmWasm module: reply")?;

        let response = self.call_engine(
            ctx,
            contract,
            &code_info.code_hash,
            false,
            Error::ExecuteFailed,
            |engine, call, backend| engine.reply(call, &reply, backend),
        )?;

        ctx.emit_event(
            Event::new(EVENT_TYPE_REPLY)
                .add_attribute(ATTRIBUTE_KEY_CONTRACT_ADDR, contract.to_string()),
        );
        self.handle_contract_response(ctx, contract, contract_info.ibc_port_id.as_deref(), response)
            .map_err(|e| e.wrap("dispatch"))
    }

    pub fn update_contract_admin(
        &mut self,
        ctx: &mut Context,
        contract: &AccountAddress,
        caller: &AccountAddress,
        new_admin: &AccountAddress,
    ) -> Result<(), Error> {
        self.set_contract_admin(
            ctx,
            contract,
            caller,
            Some(new_admin.clone()),
            &DefaultAuthorizationPolicy,
        )
    }

    pub fn clear_contract_admin(
        &mut self,
        ctx: &mut Context,
        contract: &AccountAddress,
        caller: &AccountAddress,
    ) -> Result<(), Error> {
        self.set_contract_admin(ctx, contract, caller, None, &DefaultAuthorizationPolicy)
    }

    pub(crate) fn set_contract_admin(
        &mut self,
        ctx: &mut Context,
        contract: &AccountAddress,
        caller: &AccountAddress,
        new_admin: Option<AccountAddress>,
        policy: &dyn AuthorizationPolicy,
    ) -> Result<(), Error> {
        let mut contract_info = self
            .directory
            .contract_info(contract)
            .cloned()
            .ok_or_else(|| Error::NotFound("contract".into()))?;
        if !policy.can_modify_contract(contract_info.admin.as_ref(), caller) {
            return Err(Error::Unauthorized("can not modify contract".into()));
        }
        let new_admin_attr = new_admin.as_ref().map(ToString::to_string).unwrap_or_default();
        contract_info.admin = new_admin;
        self.directory
            .set_contract_info(contract.clone(), contract_info);
        ctx.emit_event(
            Event::new(EVENT_TYPE_UPDATE_ADMIN)
                .add_attribute(ATTRIBUTE_KEY_CONTRACT_ADDR, contract.to_string())
                .add_attribute(ATTRIBUTE_KEY_NEW_ADMIN, new_admin_attr),
        );
        Ok(())
    }

    /// Keep the compiled code resident. Pinned code is cheaper to load.
    pub fn pin_code(&mut self, ctx: &mut Context, code_id: CodeId) -> Result<(), Error> {
        let code_info = self
            .directory
            .code_info(code_id)
            .ok_or_else(|| Error::NotFound("code info".into()))?;
        self.engine
            .pin(&code_info.code_hash)
            .map_err(|e| Error::PinContractFailed(e.to_string()))?;
        self.directory.pin(code_id);
        ctx.emit_event(
            Event::new(EVENT_TYPE_PIN_CODE).add_attribute(ATTRIBUTE_KEY_CODE_ID, code_id.to_string()),
        );
        Ok(())
    }

    pub fn unpin_code(&mut self, ctx: &mut Context, code_id: CodeId) -> Result<(), Error> {
        let code_info = self
            .directory
            .code_info(code_id)
            .ok_or_else(|| Error::NotFound("code info".into()))?;
        self.engine
            .unpin(&code_info.code_hash)
            .map_err(|e| Error::UnpinContractFailed(e.to_string()))?;
        self.directory.unpin(code_id);
        ctx.emit_event(
            Event::new(EVENT_TYPE_UNPIN_CODE)
                .add_attribute(ATTRIBUTE_KEY_CODE_ID, code_id.to_string()),
        );
        Ok(())
    }

    /// IBC port of `contract`, bound and claimed on first use.
    pub(crate) fn ensure_ibc_port(&mut self, contract: &AccountAddress) -> Result<String, Error> {
        let port_id = port_id_for_contract(contract);
        if self
            .capability_keeper
            .get_capability(&port_path(&port_id))
            .is_some()
        {
            return Ok(port_id);
        }
        let capability = self.capability_keeper.bind_port(&port_id)?;
        self.capability_keeper
            .claim_capability(capability, &port_path(&port_id))?;
        Ok(port_id)
    }

    /// Run one entry point of `contract` with whatever gas is left on the
    /// context meter, then charge what the VM used. A read only call gets a
    /// backend that refuses writes.
    pub(crate) fn call_engine<T>(
        &mut self,
        ctx: &mut Context,
        contract: &AccountAddress,
        checksum: &Checksum,
        read_only: bool,
        fail: fn(String) -> Error,
        run: impl FnOnce(&dyn WasmEngine, Invocation, &mut dyn Backend) -> EngineResult<ContractResult<T>>,
    ) -> Result<T, Error> {
        let env = new_env(ctx, contract);
        let invocation = Invocation {
            checksum,
            env: &env,
            gas_limit: self.gas_register.runtime_gas_for_contract(ctx.gas_meter()),
            deserialization_cost: self.gas_register.json_deserialization_cost(),
        };
        let engine = self.engine.clone();
        let (result, vm_gas) = {
            let mut backend = ContractBackend::new(self, ctx, contract.clone(), read_only);
            run(engine.as_ref(), invocation, &mut backend)
        };
        self.gas_register
            .consume_runtime_gas(ctx.gas_meter_mut(), vm_gas)?;
        match result {
            Ok(ContractResult::Ok(value)) => Ok(value),
            Ok(ContractResult::Err(e)) => Err(fail(e)),
            Err(VmError::OutOfGas) => Err(Error::OutOfGas("Wasmer function execution".into())),
            Err(e) => Err(fail(e.to_string())),
        }
    }

    /// Charge and emit the response events, then dispatch its messages.
    /// Data returned by a reply replaces the response data.
    fn handle_contract_response(
        &mut self,
        ctx: &mut Context,
        contract: &AccountAddress,
        ibc_port: Option<&str>,
        response: Response,
    ) -> Result<Option<Binary>, Error> {
        let Response {
            messages,
            attributes,
            events,
            data,
        } = response;
        let event_costs = self.gas_register.event_costs(&attributes, &events);
        ctx.gas_meter_mut()
            .consume_gas(event_costs, "Custom contract event attributes")?;
        if let Some(event) = new_wasm_module_event(&attributes, contract)? {
            ctx.emit_event(event);
        }
        ctx.emit_events(new_custom_events(&events, contract)?);
        self.dispatch_submessages(ctx, contract, ibc_port.unwrap_or_default(), messages, data)
    }

    fn dispatch_submessages(
        &mut self,
        ctx: &mut Context,
        contract: &AccountAddress,
        ibc_port: &str,
        messages: Vec<SubMsg>,
        data: Option<Binary>,
    ) -> Result<Option<Binary>, Error> {
        messages.into_iter().try_fold(
            data,
            |current,
             SubMsg {
                 id,
                 msg,
                 gas_limit,
                 reply_on,
             }|
             -> Result<Option<Binary>, Error> {
                log::debug!("Executing submessage {id}");
                self.transaction_begin()?;
                let parent_events = ctx.replace_event_manager(EventManager::new());
                let sub_res = match gas_limit {
                    Some(limit) if limit < ctx.gas_meter().remaining() => {
                        self.dispatch_msg_with_gas_limit(ctx, contract, ibc_port, &msg, limit)
                    }
                    _ => self.dispatch_msg(ctx, contract, ibc_port, &msg),
                };
                let emitted = ctx.replace_event_manager(parent_events).into_events();
                log::debug!("Submessage result: {:?}", sub_res);

                let sub_cont = match (sub_res, reply_on) {
                    (Err(e), _) if e.is_out_of_gas() => {
                        self.transaction_rollback()?;
                        return Err(e);
                    }
                    (Ok(response), ReplyOn::Never | ReplyOn::Error) => {
                        log::debug!("Commit & Continue");
                        self.transaction_commit()?;
                        ctx.emit_events(filter_events(emitted, response.events));
                        SubCallContinuation::Continue
                    }
                    (Ok(response), ReplyOn::Always | ReplyOn::Success) => {
                        log::debug!("Commit & Reply");
                        self.transaction_commit()?;
                        let events = filter_events(emitted, response.events);
                        ctx.emit_events(events.clone());
                        let events = match &msg {
                            CosmosMsg::Wasm(_) => sorted_attributes(events),
                            _ => vec![],
                        };
                        SubCallContinuation::Reply(SubMsgResult::Ok(SubMsgResponse {
                            events,
                            data: response.data.into_iter().next().flatten(),
                        }))
                    }
                    (Err(e), ReplyOn::Always | ReplyOn::Error) => {
                        log::debug!("Rollback & Reply");
                        self.transaction_rollback()?;
                        log::info!("Redacting submessage error: {e}");
                        SubCallContinuation::Reply(SubMsgResult::Err(e.redact()))
                    }
                    (Err(e), ReplyOn::Never | ReplyOn::Success) => {
                        log::debug!("Rollback & Abort");
                        self.transaction_rollback()?;
                        SubCallContinuation::Abort(e)
                    }
                };

                match sub_cont {
                    SubCallContinuation::Continue => Ok(current),
                    SubCallContinuation::Abort(e) => Err(e),
                    SubCallContinuation::Reply(result) => {
                        log::debug!("Replying");
                        let data = self
                            .reply(ctx, contract, Reply { id, result })
                            .map_err(|e| e.wrap("reply"))?;
                        Ok(data.or(current))
                    }
                }
            },
        )
    }

    fn dispatch_msg(
        &mut self,
        ctx: &mut Context,
        contract: &AccountAddress,
        ibc_port: &str,
        msg: &CosmosMsg,
    ) -> Result<DispatchResponse, Error> {
        let messenger = self.messenger.clone();
        messenger
            .dispatch_msg(self, ctx, contract, ibc_port, msg)?
            .ok_or_else(|| Error::UnknownMsg("no handler found".into()))
    }

    /// Dispatch on a meter of its own. Running out of it costs the whole
    /// limit but does not abort the parent.
    fn dispatch_msg_with_gas_limit(
        &mut self,
        ctx: &mut Context,
        contract: &AccountAddress,
        ibc_port: &str,
        msg: &CosmosMsg,
        gas_limit: u64,
    ) -> Result<DispatchResponse, Error> {
        let parent_meter = ctx.replace_gas_meter(GasMeter::new(gas_limit));
        let result = self.dispatch_msg(ctx, contract, ibc_port, msg);
        let limited_meter = ctx.replace_gas_meter(parent_meter);
        match result {
            Err(e) if e.is_out_of_gas() || limited_meter.is_past_limit() => {
                ctx.gas_meter_mut()
                    .consume_gas(gas_limit, "Sub-Message OutOfGas panic")?;
                Err(Error::SubMsgOutOfGas("SubMsg hit gas limit".into()))
            }
            result => {
                ctx.gas_meter_mut()
                    .consume_gas(limited_meter.consumed(), "From limited Sub-Message")?;
                result
            }
        }
    }

    /// Route a wasm host message as the message server does.
    fn handle_wasm_msg(&mut self, ctx: &mut Context, msg: &HostMsg) -> Result<RouterResponse, Error> {
        let encode = |e: cosmwasm_std::StdError| Error::Invalid(e.to_string());
        let (sender, data) = match msg {
            HostMsg::MsgExecuteContract(m) => {
                let sender = AccountAddress::from_bech32(&m.sender)?;
                let contract = AccountAddress::from_bech32(&m.contract)?;
                let data = self.execute(ctx, &contract, &sender, &m.msg, &m.funds)?;
                (sender, Some(to_binary(&MsgExecuteContractResponse { data }).map_err(encode)?))
            }
            HostMsg::MsgInstantiateContract(m) => {
                let sender = AccountAddress::from_bech32(&m.sender)?;
                let admin = match m.admin.as_deref() {
                    None | Some("") => None,
                    Some(admin) => Some(AccountAddress::from_bech32(admin)?),
                };
                let (address, data) =
                    self.instantiate(ctx, m.code_id, &sender, admin, &m.msg, &m.label, &m.funds)?;
                let response = MsgInstantiateContractResponse {
                    address: address.to_string(),
                    data,
                };
                (sender, Some(to_binary(&response).map_err(encode)?))
            }
            HostMsg::MsgMigrateContract(m) => {
                let sender = AccountAddress::from_bech32(&m.sender)?;
                let contract = AccountAddress::from_bech32(&m.contract)?;
                let data = self.migrate(ctx, &contract, &sender, m.code_id, &m.msg)?;
                (sender, Some(to_binary(&MsgMigrateContractResponse { data }).map_err(encode)?))
            }
            HostMsg::MsgUpdateAdmin(m) => {
                let sender = AccountAddress::from_bech32(&m.sender)?;
                let contract = AccountAddress::from_bech32(&m.contract)?;
                let new_admin = AccountAddress::from_bech32(&m.new_admin)?;
                self.update_contract_admin(ctx, &contract, &sender, &new_admin)?;
                (sender, None)
            }
            HostMsg::MsgClearAdmin(m) => {
                let sender = AccountAddress::from_bech32(&m.sender)?;
                let contract = AccountAddress::from_bech32(&m.contract)?;
                self.clear_contract_admin(ctx, &contract, &sender)?;
                (sender, None)
            }
            other => {
                return Err(Error::UnknownRequest(format!(
                    "unrecognized wasm message type: {}",
                    other.type_url()
                )))
            }
        };
        ctx.emit_event(
            Event::new(SDK_MESSAGE_EVENT_TYPE)
                .add_attribute("module", ROUTE_WASM)
                .add_attribute("sender", sender.to_string()),
        );
        Ok(RouterResponse {
            events: vec![],
            data,
        })
    }
}

/// Host metadata events are dropped, the rest keep their order.
fn filter_events(emitted: Vec<Event>, returned: Vec<Event>) -> Vec<Event> {
    emitted
        .into_iter()
        .chain(returned)
        .filter(|event| event.ty != SDK_MESSAGE_EVENT_TYPE)
        .collect()
}

fn sorted_attributes(mut events: Vec<Event>) -> Vec<Event> {
    for event in &mut events {
        event.attributes.sort_by(|a, b| a.key.cmp(&b.key));
    }
    events
}

impl DispatchHost for Keeper {
    fn route(&mut self, ctx: &mut Context, msg: &HostMsg) -> Result<RouterResponse, Error> {
        match msg.route() {
            ROUTE_WASM => self.handle_wasm_msg(ctx, msg),
            _ => self.ledger.route(ctx, msg),
        }
    }

    fn channel_keeper(&mut self) -> &mut dyn ChannelKeeper {
        self.channel_keeper.as_mut()
    }

    fn capability_keeper(&self) -> &dyn CapabilityKeeper {
        self.capability_keeper.as_ref()
    }
}

impl Transactional for Keeper {
    type Error = Error;

    fn transaction_begin(&mut self) -> Result<(), Self::Error> {
        self.directory.transaction_begin()?;
        self.ledger.transaction_begin()?;
        self.channel_keeper.transaction_begin()?;
        self.capability_keeper.transaction_begin()
    }

    fn transaction_commit(&mut self) -> Result<(), Self::Error> {
        self.directory.transaction_commit()?;
        self.ledger.transaction_commit()?;
        self.channel_keeper.transaction_commit()?;
        self.capability_keeper.transaction_commit()
    }

    fn transaction_rollback(&mut self) -> Result<(), Self::Error> {
        self.directory.transaction_rollback()?;
        self.ledger.transaction_rollback()?;
        self.channel_keeper.transaction_rollback()?;
        self.capability_keeper.transaction_rollback()
    }
}
