pub mod exchange;
pub mod worker;

pub use exchange::{Closed, LatestFrameExchange};
pub use worker::{FrameJob, FrameProcessingWorker, WorkerState};
