pub mod block;
pub mod sign_state;
pub mod threshold;

pub use block::{Block, Hrs, Hrst, Step};
pub use sign_state::{Advance, SignState};
