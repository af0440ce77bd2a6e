//! Import and export of the whole module state.

use crate::{
    address::AccountAddress,
    config::Params,
    context::Context,
    directory::Sequence,
    error::Error,
    keeper::Keeper,
    types::{CodeId, CodeInfo, ContractInfo, Model},
};
use cosmwasm_std::Binary;
use serde::{Deserialize, Serialize};

#[derive(Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub struct GenesisState {
    pub params: Params,
    #[serde(default)]
    pub codes: Vec<Code>,
    #[serde(default)]
    pub contracts: Vec<Contract>,
    #[serde(default)]
    pub sequences: Vec<SequenceEntry>,
}

#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Code {
    pub code_id: CodeId,
    pub code_info: CodeInfo,
    pub code_bytes: Binary,
    #[serde(default)]
    pub pinned: bool,
}

#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Contract {
    pub contract_address: AccountAddress,
    pub contract_info: ContractInfo,
    #[serde(default)]
    pub contract_state: Vec<Model>,
}

#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct SequenceEntry {
    pub id_key: Binary,
    pub value: u64,
}

impl GenesisState {
    pub fn validate_basic(&self) -> Result<(), Error> {
        self.params.validate().map_err(|e| e.wrap("params"))?;
        for (i, code) in self.codes.iter().enumerate() {
            code.validate_basic().map_err(|e| e.wrap(format!("code: {i}")))?;
        }
        for (i, contract) in self.contracts.iter().enumerate() {
            contract
                .contract_info
                .validate_basic()
                .map_err(|e| e.wrap(format!("contract: {i}")))?;
        }
        for (i, seq) in self.sequences.iter().enumerate() {
            if Sequence::from_key(&seq.id_key).is_none() {
                return Err(Error::InvalidGenesis(format!("sequence: {i}: unknown id key")));
            }
        }
        Ok(())
    }
}

impl Code {
    fn validate_basic(&self) -> Result<(), Error> {
        if self.code_id == 0 {
            return Err(Error::Empty("code id".into()));
        }
        self.code_info.validate_basic().map_err(|e| e.wrap("code info"))?;
        if self.code_bytes.is_empty() {
            return Err(Error::Empty("code bytes".into()));
        }
        Ok(())
    }
}

/// Load `state` into an empty keeper. Sequences must end past every
/// imported code id and contract.
pub fn init_genesis(keeper: &mut Keeper, ctx: &mut Context, state: GenesisState) -> Result<(), Error> {
    keeper.set_params(state.params)?;

    let mut max_code_id = 0;
    for (i, code) in state.codes.into_iter().enumerate() {
        import_code(keeper, &code)
            .map_err(|e| e.wrap(format!("code {i} with id: {}", code.code_id)))?;
        max_code_id = max_code_id.max(code.code_id);
        if code.pinned {
            keeper
                .pin_code(ctx, code.code_id)
                .map_err(|e| e.wrap(format!("contract number {i}")))?;
        }
    }

    let mut max_contract_id = 0;
    for (i, contract) in state.contracts.into_iter().enumerate() {
        import_contract(keeper, ctx, contract)
            .map_err(|e| e.wrap(format!("contract number {i}")))?;
        max_contract_id = i as u64 + 1;
    }

    for (i, seq) in state.sequences.into_iter().enumerate() {
        let sequence = Sequence::from_key(&seq.id_key)
            .ok_or_else(|| Error::InvalidGenesis(format!("unknown sequence {i}")))?;
        keeper
            .directory
            .import_auto_increment_id(sequence, seq.value)
            .map_err(|e| e.wrap(format!("sequence number {i}")))?;
    }

    for (sequence, max) in [
        (Sequence::LastCodeId, max_code_id),
        (Sequence::LastInstanceId, max_contract_id),
    ] {
        if keeper.directory.peek_auto_increment_id(sequence) <= max {
            return Err(Error::Invalid(format!(
                "seq {} must be greater {max}",
                String::from_utf8_lossy(sequence.key())
            )));
        }
    }
    log::info!("imported wasm genesis: {max_code_id} codes, {max_contract_id} contracts");
    Ok(())
}

fn import_code(keeper: &mut Keeper, code: &Code) -> Result<(), Error> {
    let checksum = keeper
        .engine
        .create(&code.code_bytes)
        .map_err(|e| Error::CreateFailed(e.to_string()))?;
    if checksum != code.code_info.code_hash {
        return Err(Error::Invalid("code hashes not same".into()));
    }
    if keeper.directory.code_info(code.code_id).is_some() {
        return Err(Error::Duplicate(format!("duplicate code: {}", code.code_id)));
    }
    keeper
        .directory
        .set_code_info(code.code_id, code.code_info.clone());
    Ok(())
}

fn import_contract(keeper: &mut Keeper, ctx: &Context, contract: Contract) -> Result<(), Error> {
    let Contract {
        contract_address,
        mut contract_info,
        contract_state,
    } = contract;
    if keeper.directory.code_info(contract_info.code_id).is_none() {
        return Err(Error::NotFound(format!("code id: {}", contract_info.code_id)));
    }
    if keeper.directory.has_contract(&contract_address) {
        return Err(Error::Duplicate(format!("contract: {contract_address}")));
    }
    let history = contract_info.reset_from_genesis(ctx.tx_position());
    keeper.directory.append_history(&contract_address, vec![history]);
    keeper
        .directory
        .set_contract_info(contract_address.clone(), contract_info);
    let records = contract_state
        .into_iter()
        .map(|model| (model.key.0, model.value.0))
        .collect();
    keeper
        .directory
        .import_contract_state(&contract_address, records)
}

/// Snapshot of the module state. Creation positions are not exported.
pub fn export_genesis(keeper: &Keeper) -> Result<GenesisState, Error> {
    let directory = keeper.directory();
    let mut codes = Vec::new();
    for (code_id, code_info) in directory.codes() {
        let code_bytes = keeper
            .engine
            .get_code(&code_info.code_hash)
            .map_err(|e| Error::NotFound(format!("code {code_id}: {e}")))?;
        codes.push(Code {
            code_id: *code_id,
            code_info: code_info.clone(),
            code_bytes: code_bytes.into(),
            pinned: directory.is_pinned(*code_id),
        });
    }

    let contracts = directory
        .contracts()
        .map(|(address, info)| Contract {
            contract_address: address.clone(),
            contract_info: ContractInfo {
                created: None,
                ..info.clone()
            },
            contract_state: directory
                .contract_state(address)
                .into_iter()
                .map(|(key, value)| Model {
                    key: key.into(),
                    value: value.into(),
                })
                .collect(),
        })
        .collect();

    let sequences = Sequence::ALL
        .into_iter()
        .map(|sequence| SequenceEntry {
            id_key: Binary::from(sequence.key()),
            value: directory.peek_auto_increment_id(sequence),
        })
        .collect();

    Ok(GenesisState {
        params: keeper.params().clone(),
        codes,
        contracts,
        sequences,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, MOCK_WASM};

    #[test]
    fn export_then_import_keeps_state() {
        let mut keeper = testing::test_keeper();
        let mut ctx = testing::test_context();
        let creator = AccountAddress::from_canonical(&[1; 20]).unwrap();
        let (code_id, _) = keeper.store_code(&mut ctx, &creator, MOCK_WASM, None).unwrap();
        keeper.pin_code(&mut ctx, code_id).unwrap();
        let (contract, _) = keeper
            .instantiate(&mut ctx, code_id, &creator, None, b"{}", "first", &[])
            .unwrap();
        keeper.directory.contract_store(&contract).set(b"k", b"v");

        let exported = export_genesis(&keeper).unwrap();
        exported.validate_basic().unwrap();
        assert_eq!(exported.contracts[0].contract_info.created, None);
        assert_eq!(exported.sequences[0].value, 2);

        let mut fresh = testing::test_keeper();
        init_genesis(&mut fresh, &mut testing::test_context(), exported.clone()).unwrap();
        assert!(fresh.is_pinned_code(code_id));
        assert_eq!(fresh.directory.contract_state(&contract), vec![(b"k".to_vec(), b"v".to_vec())]);
        assert_eq!(fresh.contract_history(&contract).len(), 1);

        assert_eq!(export_genesis(&fresh).unwrap(), exported);
    }

    #[test]
    fn sequences_must_pass_imported_ids() {
        let mut keeper = testing::test_keeper();
        let mut ctx = testing::test_context();
        let creator = AccountAddress::from_canonical(&[1; 20]).unwrap();
        keeper.store_code(&mut ctx, &creator, MOCK_WASM, None).unwrap();
        let mut state = export_genesis(&keeper).unwrap();
        state.sequences[0].value = 1;

        let err = init_genesis(&mut testing::test_keeper(), &mut ctx, state).unwrap_err();
        assert_eq!(err, Error::Invalid("seq lastCodeId must be greater 1".into()));
    }

    #[test]
    fn code_hash_must_match_bytes() {
        let mut keeper = testing::test_keeper();
        let mut ctx = testing::test_context();
        let creator = AccountAddress::from_canonical(&[1; 20]).unwrap();
        keeper.store_code(&mut ctx, &creator, MOCK_WASM, None).unwrap();
        let mut state = export_genesis(&keeper).unwrap();
        state.codes[0].code_info.code_hash = [0u8; 32].into();

        let err = init_genesis(&mut testing::test_keeper(), &mut ctx, state).unwrap_err();
        assert_eq!(err.root(), &Error::Invalid("code hashes not same".into()));
    }
}
