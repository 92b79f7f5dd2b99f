mod handlers;
mod router;
mod state;

pub use router::{build_router, run_server};
pub use state::AppState;
