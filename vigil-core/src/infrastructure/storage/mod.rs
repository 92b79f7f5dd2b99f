mod sign_state_store;

pub use sign_state_store::{ChainStateSession, SignStateStore, StateKind};
