pub mod config;
pub mod dls;
pub mod headers;
pub mod retry;
pub mod station;
pub mod subject;

pub use config::{DlsConfig, MqAppConfig};
pub use dls::{
    DeadLetterRecord, DlsMessageResponse, LightDlsMessage, MessageDetails, MessagePayloadDls,
    PoisonedCg, ProducerDetails, StationDlsMessages,
};
pub use station::StationName;
pub use subject::{DlsKind, DlsSubject};
