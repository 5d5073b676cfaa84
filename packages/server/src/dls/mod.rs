mod advisory;
mod recorder;
mod service;

pub use advisory::MaxDeliveriesAdvisory;
pub use recorder::{POISON_MESSAGE_TITLE, RecordOutcome, Recorder, SkipReason};
pub use service::DlsService;
