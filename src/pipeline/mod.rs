mod cancel;
mod controller;
mod state;
mod stats;
mod worker;

pub use cancel::CancelToken;
pub use controller::LifecycleController;
pub use state::{PipelineState, StatusReport};
pub use stats::{PipelineStats, StatsSnapshot};
