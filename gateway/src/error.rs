use thiserror::Error;

pub const WASM_CODESPACE: &str = "wasm";
pub const SDK_CODESPACE: &str = "sdk";
pub const CHANNEL_CODESPACE: &str = "channel";

#[derive(Error, Clone, PartialEq, Eq, Debug)]
pub enum Error {
    #[error("create wasm contract failed: {0}")]
    CreateFailed(String),
    #[error("contract account already exists: {0}")]
    AccountExists(String),
    #[error("instantiate wasm contract failed: {0}")]
    InstantiateFailed(String),
    #[error("execute wasm contract failed: {0}")]
    ExecuteFailed(String),
    #[error("invalid genesis: {0}")]
    InvalidGenesis(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("query wasm contract failed: {0}")]
    QueryFailed(String),
    #[error("invalid CosmosMsg from the contract: {0}")]
    InvalidMsg(String),
    #[error("migrate wasm contract failed: {0}")]
    MigrationFailed(String),
    #[error("empty: {0}")]
    Empty(String),
    #[error("exceeds limit: {0}")]
    Limit(String),
    #[error("invalid: {0}")]
    Invalid(String),
    #[error("duplicate: {0}")]
    Duplicate(String),
    #[error("unsupported for this contract: {0}")]
    UnsupportedForContract(String),
    #[error("pinning contract failed: {0}")]
    PinContractFailed(String),
    #[error("unpinning contract failed: {0}")]
    UnpinContractFailed(String),
    #[error("unknown message from the contract: {0}")]
    UnknownMsg(String),
    #[error("invalid event: {0}")]
    InvalidEvent(String),
    #[error("called contract cannot be executed: {0}")]
    ExecutionBlocked(String),
    #[error("a contract can only be called once per one call stack: {0}")]
    Reentrancy(String),
    #[error("callable point {0} is not read only")]
    ReadOnlyViolation(String),
    #[error("callable point not found: {0}")]
    CallablePointNotFound(String),
    #[error("lack of gas for calling callable point: limit {limit}, required {required}")]
    InsufficientGas { limit: u64, required: u64 },
    #[error("callable point failed: {0}")]
    CallablePointFailed(String),
    #[error("no such contract: {0}")]
    NoSuchContract(String),
    #[error("unsupported query type: {0}")]
    UnsupportedRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),
    #[error("unknown request: {0}")]
    UnknownRequest(String),
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("invalid coins: {0}")]
    InvalidCoins(String),
    /// Recoverable: a gas limited sub-message used its whole allowance.
    #[error("out of gas: {0}")]
    SubMsgOutOfGas(String),
    /// Fatal: the enclosing transaction aborts.
    #[error("out of gas in location: {0}")]
    OutOfGas(String),
    #[error("execution failure")]
    Panic,

    #[error("sequence send not found: port {port}, channel {channel}")]
    SequenceSendNotFound { port: String, channel: String },
    #[error("channel not found: port {port}, channel {channel}")]
    ChannelNotFound { port: String, channel: String },
    #[error("module does not own channel capability: {0}")]
    ChannelCapabilityNotFound(String),

    #[error("{context}: {source}")]
    Wrapped { context: String, source: Box<Error> },
}

impl Error {
    /// Add context. Gas exhaustion is returned untouched so the outermost
    /// boundary can still recognise it.
    #[must_use]
    pub fn wrap(self, context: impl Into<String>) -> Self {
        match self {
            e @ Error::OutOfGas(_) => e,
            e => Error::Wrapped {
                context: context.into(),
                source: Box::new(e),
            },
        }
    }

    /// The innermost error under any number of wraps.
    pub fn root(&self) -> &Error {
        match self {
            Error::Wrapped { source, .. } => source.root(),
            e => e,
        }
    }

    pub fn is_out_of_gas(&self) -> bool {
        matches!(self, Error::OutOfGas(_))
    }

    /// System errors are deterministic by construction and are handed to
    /// contracts verbatim.
    pub fn is_system_error(&self) -> bool {
        matches!(
            self.root(),
            Error::NoSuchContract(_) | Error::UnsupportedRequest(_)
        )
    }

    /// `(codespace, code)` pair identifying the error kind on chain.
    pub fn abci_code(&self) -> (&'static str, u32) {
        match self {
            Error::CreateFailed(_) => (WASM_CODESPACE, 2),
            Error::AccountExists(_) => (WASM_CODESPACE, 3),
            Error::InstantiateFailed(_) => (WASM_CODESPACE, 4),
            Error::ExecuteFailed(_) => (WASM_CODESPACE, 5),
            Error::InvalidGenesis(_) => (WASM_CODESPACE, 7),
            Error::NotFound(_) => (WASM_CODESPACE, 8),
            Error::QueryFailed(_) => (WASM_CODESPACE, 9),
            Error::InvalidMsg(_) => (WASM_CODESPACE, 10),
            Error::MigrationFailed(_) => (WASM_CODESPACE, 11),
            Error::Empty(_) => (WASM_CODESPACE, 12),
            Error::Limit(_) => (WASM_CODESPACE, 13),
            Error::Invalid(_) => (WASM_CODESPACE, 14),
            Error::Duplicate(_) => (WASM_CODESPACE, 15),
            Error::UnsupportedForContract(_) => (WASM_CODESPACE, 17),
            Error::PinContractFailed(_) => (WASM_CODESPACE, 18),
            Error::UnpinContractFailed(_) => (WASM_CODESPACE, 19),
            Error::UnknownMsg(_) => (WASM_CODESPACE, 20),
            Error::InvalidEvent(_) => (WASM_CODESPACE, 21),
            Error::ExecutionBlocked(_) => (WASM_CODESPACE, 22),
            Error::Reentrancy(_) => (WASM_CODESPACE, 23),
            Error::ReadOnlyViolation(_) => (WASM_CODESPACE, 24),
            Error::CallablePointNotFound(_) => (WASM_CODESPACE, 25),
            Error::InsufficientGas { .. } => (WASM_CODESPACE, 26),
            Error::CallablePointFailed(_) => (WASM_CODESPACE, 27),
            Error::NoSuchContract(_) => (WASM_CODESPACE, 28),
            Error::UnsupportedRequest(_) => (WASM_CODESPACE, 29),
            Error::Unauthorized(_) => (SDK_CODESPACE, 4),
            Error::InsufficientFunds(_) => (SDK_CODESPACE, 5),
            Error::UnknownRequest(_) => (SDK_CODESPACE, 6),
            Error::InvalidAddress(_) => (SDK_CODESPACE, 7),
            Error::InvalidCoins(_) => (SDK_CODESPACE, 10),
            Error::SubMsgOutOfGas(_) | Error::OutOfGas(_) => (SDK_CODESPACE, 11),
            Error::Panic => (SDK_CODESPACE, 111_222),
            Error::ChannelNotFound { .. } => (CHANNEL_CODESPACE, 3),
            Error::SequenceSendNotFound { .. } => (CHANNEL_CODESPACE, 4),
            Error::ChannelCapabilityNotFound(_) => (CHANNEL_CODESPACE, 6),
            Error::Wrapped { source, .. } => source.abci_code(),
        }
    }

    /// Deterministic rendering for errors that flow back into contract code.
    /// Free text from collaborators may differ between nodes, the code may not.
    #[must_use]
    pub fn redact(&self) -> String {
        if self.is_system_error() {
            return self.root().to_string();
        }
        let (codespace, code) = self.abci_code();
        format!("codespace: {codespace}, code: {code}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_keeps_code_and_skips_out_of_gas() {
        let err = Error::Unauthorized("contract doesn't have permission".into()).wrap("dispatch");
        assert_eq!(err.abci_code(), (SDK_CODESPACE, 4));
        assert!(matches!(err.root(), Error::Unauthorized(_)));
        assert_eq!(
            err.to_string(),
            "dispatch: unauthorized: contract doesn't have permission"
        );

        let oog = Error::OutOfGas("Wasmer function execution".into()).wrap("dispatch");
        assert!(oog.is_out_of_gas());
    }

    #[test]
    fn redaction_hides_message_but_not_system_errors() {
        let err = Error::ExecuteFailed("node specific details".into()).wrap("reply");
        assert_eq!(err.redact(), "codespace: wasm, code: 5");

        let err = Error::NoSuchContract("link1abc".into());
        assert_eq!(err.redact(), "no such contract: link1abc");
    }
}
