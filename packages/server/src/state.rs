use std::sync::Arc;

use common::DlsConfig;
use mq::{LogStore, ReplayEngine};

use crate::directory::Directory;
use crate::dls::{DlsService, Recorder};
use crate::notifications::Notifier;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LogStore>,
    pub directory: Arc<dyn Directory>,
    pub notifier: Arc<dyn Notifier>,
    pub config: DlsConfig,
}

impl AppState {
    pub fn recorder(&self) -> Recorder {
        Recorder::new(
            self.store.clone(),
            self.directory.clone(),
            self.notifier.clone(),
            self.config.ui_url.clone(),
        )
    }

    pub fn dls_service(&self) -> DlsService {
        let engine = ReplayEngine::new(self.store.clone(), self.config.reply_channel_capacity);
        DlsService::new(engine, self.directory.clone(), self.config.clone())
    }
}
