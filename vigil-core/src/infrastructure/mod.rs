pub mod config;
pub mod keys;
pub mod logging;
pub mod rsm;
pub mod storage;
pub mod transport;
