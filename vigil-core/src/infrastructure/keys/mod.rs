mod share_store;

pub use share_store::{KeyShare, ShareStore};
