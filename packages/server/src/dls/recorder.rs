use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use common::headers::{Attribution, resolve_attribution};
use common::station::revert_delimiters;
use common::subject::{dls_msg_id, dls_subject, identity_timestamp};
use common::{
    DeadLetterRecord, DlsKind, MessagePayloadDls, PoisonedCg, ProducerDetails, StationName,
};
use mq::LogStore;

use super::advisory::MaxDeliveriesAdvisory;
use crate::directory::Directory;
use crate::error::DlsError;
use crate::notifications::{NotificationCategory, Notifier};

pub const POISON_MESSAGE_TITLE: &str = "Poison message";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The station does not record poison messages.
    PoisonDetectionDisabled,
    /// The message is itself a re-publish out of the dead-letter station.
    DeadLetterReplay,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Recorded(DeadLetterRecord),
    Skipped(SkipReason),
}

/// Turns max-deliveries advisories into dead-letter records.
#[derive(Clone)]
pub struct Recorder {
    store: Arc<dyn LogStore>,
    directory: Arc<dyn Directory>,
    notifier: Arc<dyn Notifier>,
    ui_url: String,
}

impl Recorder {
    pub fn new(
        store: Arc<dyn LogStore>,
        directory: Arc<dyn Directory>,
        notifier: Arc<dyn Notifier>,
        ui_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            directory,
            notifier,
            ui_url: ui_url.into(),
        }
    }

    /// Record the message named by one advisory payload.
    pub async fn handle_advisory(&self, payload: &[u8]) -> Result<RecordOutcome, DlsError> {
        let advisory = MaxDeliveriesAdvisory::decode(payload)?;
        let station_name = StationName::from_intern(&advisory.stream);

        let station = self
            .directory
            .find_station(&station_name)
            .await?
            .ok_or_else(|| DlsError::StationNotFound(station_name.ext().to_string()))?;
        if !station.dls_configuration.poison {
            debug!(station = %station.name, "Poison detection disabled, skipping advisory");
            return Ok(RecordOutcome::Skipped(SkipReason::PoisonDetectionDisabled));
        }

        let message = self
            .store
            .get_message(station.name.intern(), advisory.stream_seq)
            .await?;
        let cg_name = revert_delimiters(&advisory.consumer);

        let mut headers = HashMap::new();
        let mut producer = ProducerDetails::default();
        if station.is_native {
            headers = message.headers.clone();
            let attribution =
                resolve_attribution(&headers).ok_or_else(|| DlsError::MissingAttribution {
                    station: station.name.ext().to_string(),
                    seq: message.sequence,
                })?;
            if attribution.is_dls_replay() {
                debug!(
                    station = %station.name,
                    seq = message.sequence,
                    "Skipping replayed dead-letter message"
                );
                return Ok(RecordOutcome::Skipped(SkipReason::DeadLetterReplay));
            }
            producer = self.producer_snapshot(&attribution).await?;
        }

        let now = Utc::now();
        let id = dls_msg_id(
            station.name.intern(),
            message.sequence,
            &producer.name,
            &identity_timestamp(message.time),
        );
        let record = DeadLetterRecord {
            id,
            station_name: station.name.ext().to_string(),
            message_seq: message.sequence,
            producer,
            poisoned_cg: Some(PoisonedCg::new(cg_name.clone(), advisory.deliveries)),
            message: MessagePayloadDls {
                time_sent: message.time,
                size: message.size(),
                data: hex::encode(&message.data),
                headers,
            },
            creation_unix: now.timestamp(),
            creation_date: Some(now),
        };

        let subject = dls_subject(
            DlsKind::Poison.as_str(),
            station.name.intern(),
            &record.id,
            &cg_name,
        );
        let body = serde_json::to_vec(&record).map_err(DlsError::Encode)?;
        self.store.publish(&subject, body).await?;
        info!(
            station = %station.name,
            seq = record.message_seq,
            cg = %cg_name,
            id = %record.id,
            "Recorded poison message"
        );

        self.notify(&station.name, &record.id).await;
        Ok(RecordOutcome::Recorded(record))
    }

    async fn producer_snapshot(&self, attribution: &Attribution) -> Result<ProducerDetails, DlsError> {
        let connection = self
            .directory
            .find_connection(&attribution.connection_id)
            .await?
            .ok_or_else(|| DlsError::ConnectionNotFound(attribution.connection_id.clone()))?;
        let producer = self
            .directory
            .find_producer(&attribution.produced_by, &attribution.connection_id)
            .await?
            .ok_or_else(|| DlsError::ProducerNotFound {
                name: attribution.produced_by.clone(),
                connection_id: attribution.connection_id.clone(),
            })?;

        Ok(ProducerDetails {
            name: attribution.produced_by.clone(),
            client_address: connection.client_address,
            connection_id: connection.id,
            created_by_user: producer.created_by_user,
            is_active: producer.is_active,
            is_deleted: producer.is_deleted,
        })
    }

    async fn notify(&self, station: &StationName, id: &str) {
        let url = format!(
            "{}/stations/{}/{}",
            self.ui_url.trim_end_matches('/'),
            station.ext(),
            id
        );
        let body = format!("Poison message has been identified, for more details head to: {url}");
        if let Err(e) = self
            .notifier
            .send(POISON_MESSAGE_TITLE, &body, NotificationCategory::PoisonMessage)
            .await
        {
            warn!(station = %station, error = %e, "Failed to send poison message notification");
        }
    }
}
