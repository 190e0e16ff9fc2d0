use std::sync::Arc;

use crate::pipeline::Pipeline;

#[derive(Clone)]
pub(crate) struct ServerState {
    pub(crate) pipeline: Arc<Pipeline>,
}
