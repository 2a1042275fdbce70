pub mod gemini_live;

use std::sync::Arc;

use crate::domain::models::RealtimeConnector;

pub struct RealtimeManager {}

impl RealtimeManager {
    pub fn get() -> Arc<dyn RealtimeConnector> {
        return Arc::new(gemini_live::GeminiLive::default());
    }
}
