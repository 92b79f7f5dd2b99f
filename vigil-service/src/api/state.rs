use crate::gateway::Gateway;
use std::sync::Arc;
use vigil_core::application::ThresholdValidator;

#[derive(Clone)]
pub struct AppState {
    pub validator: Arc<ThresholdValidator>,
    pub gateway: Arc<Gateway>,
}
