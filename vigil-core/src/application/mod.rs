pub mod cosigner;
pub mod local_cosigner;
pub mod nonce_cache;
pub mod validator;

pub use cosigner::Cosigner;
pub use local_cosigner::LocalCosigner;
pub use nonce_cache::NonceCache;
pub use validator::{ThresholdValidator, ValidatorCtx};
