// src/error.rs
use ethers::types::Address;
use jsonrpsee::types::{
    error::{CALL_EXECUTION_FAILED_CODE, INTERNAL_ERROR_CODE, INVALID_PARAMS_CODE},
    ErrorObjectOwned,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PaymasterError {
    /// Malformed request, operation or context. No sponsorship was attempted.
    #[error("{0}")]
    Validation(String),

    #[error("entryPoint: {0:?} not supported")]
    UnsupportedEntryPoint(Address),

    #[error("type: {0} not recognized")]
    UnsupportedStrategy(String),

    /// Failure reaching the node or parsing its response.
    #[error("chain call failed: {0:#}")]
    ChainCall(#[source] anyhow::Error),

    #[error("signing failed: {0}")]
    Signing(String),

    /// A field does not fit its slot in paymasterAndData.
    #[error("encoding failed: {0}")]
    Encoding(String),
}

impl PaymasterError {
    /// Prefixes the failing pipeline stage while keeping the error kind.
    pub fn at_stage(self, stage: &'static str) -> Self {
        match self {
            Self::ChainCall(error) => Self::ChainCall(error.context(stage)),
            Self::Signing(msg) => Self::Signing(format!("{stage}: {msg}")),
            Self::Encoding(msg) => Self::Encoding(format!("{stage}: {msg}")),
            other => other,
        }
    }
}

pub trait StageContext<T> {
    fn stage(self, stage: &'static str) -> Result<T, PaymasterError>;
}

impl<T> StageContext<T> for Result<T, PaymasterError> {
    fn stage(self, stage: &'static str) -> Result<T, PaymasterError> {
        self.map_err(|error| error.at_stage(stage))
    }
}

impl<T> StageContext<T> for anyhow::Result<T> {
    fn stage(self, stage: &'static str) -> Result<T, PaymasterError> {
        self.map_err(|error| PaymasterError::ChainCall(error.context(stage)))
    }
}

impl From<PaymasterError> for ErrorObjectOwned {
    fn from(error: PaymasterError) -> Self {
        let code = match error {
            PaymasterError::Validation(_)
            | PaymasterError::UnsupportedEntryPoint(_)
            | PaymasterError::UnsupportedStrategy(_) => INVALID_PARAMS_CODE,
            PaymasterError::ChainCall(_) => CALL_EXECUTION_FAILED_CODE,
            PaymasterError::Signing(_) | PaymasterError::Encoding(_) => INTERNAL_ERROR_CODE,
        };
        ErrorObjectOwned::owned(code, error.to_string(), None::<()>)
    }
}
