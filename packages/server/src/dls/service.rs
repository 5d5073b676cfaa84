use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use common::station::replace_delimiters;
use common::subject::{FULL_WILDCARD, WILDCARD, dls_msg_id, dls_subject, identity_timestamp};
use common::{
    DeadLetterRecord, DlsConfig, DlsKind, DlsMessageResponse, DlsSubject, LightDlsMessage,
    MessageDetails, PoisonedCg, ProducerDetails, StationDlsMessages, StationName,
};
use mq::{ReplayEngine, ReplayedMessage};

use crate::directory::{Directory, Station};
use crate::error::DlsError;

/// A replayed record with its parsed subject.
struct Entry {
    subject: DlsSubject,
    sequence: u64,
    record: DeadLetterRecord,
    subject_len: usize,
}

/// Queries over a station's dead-letter stream.
#[derive(Clone)]
pub struct DlsService {
    engine: ReplayEngine,
    directory: Arc<dyn Directory>,
    config: DlsConfig,
}

impl DlsService {
    pub fn new(engine: ReplayEngine, directory: Arc<dyn Directory>, config: DlsConfig) -> Self {
        Self {
            engine,
            directory,
            config,
        }
    }

    /// Decode replayed messages, skipping subjects that do not belong to the
    /// dead-letter hierarchy of `station`.
    fn decode(
        station: &StationName,
        messages: Vec<ReplayedMessage>,
    ) -> Result<Vec<Entry>, DlsError> {
        let mut entries = Vec::with_capacity(messages.len());
        for message in messages {
            let subject = match DlsSubject::parse(&message.subject, station.intern()) {
                Ok(subject) => subject,
                Err(e) => {
                    warn!(station = %station, seq = message.sequence, error = %e, "Skipping dead-letter entry");
                    continue;
                }
            };
            let record: DeadLetterRecord =
                serde_json::from_slice(&message.data).map_err(|source| DlsError::Decode {
                    seq: message.sequence,
                    source,
                })?;
            entries.push(Entry {
                subject,
                sequence: message.sequence,
                record,
                subject_len: message.subject.len(),
            });
        }
        Ok(entries)
    }

    async fn scan_all(&self, station: &StationName) -> Result<Vec<Entry>, DlsError> {
        let messages = self
            .engine
            .scan(&station.dls_stream(), self.config.scan_timeout())
            .await?;
        Self::decode(station, messages)
    }

    async fn scan_matching(
        &self,
        station: &StationName,
        filter: &str,
        start_sequence: Option<u64>,
    ) -> Result<(mq::FilteredScan, Vec<Entry>), DlsError> {
        let mut scan = self
            .engine
            .scan_filtered(
                &station.dls_stream(),
                filter,
                start_sequence,
                self.config.scan_timeout(),
            )
            .await?;
        let entries = Self::decode(station, std::mem::take(&mut scan.messages))?;
        Ok((scan, entries))
    }

    /// Summaries of both partitions, newest first, deduplicated by id and capped.
    pub async fn list_for_station(
        &self,
        station: &StationName,
    ) -> Result<StationDlsMessages, DlsError> {
        let entries = self.scan_all(station).await?;

        let mut poison_ids = HashSet::new();
        let mut schema_ids = HashSet::new();
        let mut poison_messages = Vec::new();
        let mut schema_messages = Vec::new();

        for entry in entries {
            let Entry {
                subject,
                sequence,
                record,
                subject_len,
            } = entry;
            match subject.kind {
                DlsKind::Poison => {
                    if poison_ids.insert(record.id.clone()) {
                        poison_messages.push(LightDlsMessage {
                            message_seq: sequence,
                            id: record.id,
                            message: record.message,
                        });
                    }
                }
                DlsKind::Schema => {
                    if schema_ids.insert(record.id.clone()) {
                        let created_at = record.created_at();
                        let mut message = record.message;
                        if let Some(created_at) = created_at {
                            message.time_sent = created_at;
                        }
                        message.size = subject_len + message.data.len() + message.headers_len();
                        schema_messages.push(LightDlsMessage {
                            message_seq: sequence,
                            id: record.id,
                            message,
                        });
                    }
                }
            }
        }

        let total_dls_amount = poison_messages.len() + schema_messages.len();
        for partition in [&mut poison_messages, &mut schema_messages] {
            partition.sort_by(|a, b| b.message.time_sent.cmp(&a.message.time_sent));
            partition.truncate(self.config.list_limit);
        }

        debug!(
            station = %station,
            poison = poison_messages.len(),
            schema = schema_messages.len(),
            total = total_dls_amount,
            "Listed dead-letter messages"
        );
        Ok(StationDlsMessages {
            poison_messages,
            schema_messages,
            total_dls_amount,
        })
    }

    /// Full detail of one id, with the live state of every poisoned group.
    pub async fn get_by_id(
        &self,
        station: &Station,
        id: &str,
    ) -> Result<DlsMessageResponse, DlsError> {
        let filter = dls_subject(WILDCARD, station.name.intern(), id, FULL_WILDCARD);
        let (_, entries) = self.scan_matching(&station.name, &filter, None).await?;

        let Some(first) = entries.first() else {
            // Schema subjects carry no group token, so `>` never reaches them.
            let filter = dls_subject(DlsKind::Schema.as_str(), station.name.intern(), id, "");
            let (_, schema) = self.scan_matching(&station.name, &filter, None).await?;
            if schema.is_empty() {
                return Err(DlsError::NotFound {
                    station: station.name.ext().to_string(),
                    id: id.to_string(),
                });
            }
            return Ok(DlsMessageResponse::default());
        };
        if !station.is_native {
            return Ok(DlsMessageResponse::default());
        }

        let attributed = &first.record.producer;
        let producer = self
            .directory
            .find_producer(&attributed.name, &attributed.connection_id)
            .await?
            .ok_or_else(|| DlsError::ProducerNotFound {
                name: attributed.name.clone(),
                connection_id: attributed.connection_id.clone(),
            })?;
        let producer = ProducerDetails {
            name: producer.name,
            client_address: attributed.client_address.clone(),
            connection_id: producer.connection_id,
            created_by_user: producer.created_by_user,
            is_active: producer.is_active,
            is_deleted: producer.is_deleted,
        };

        let mut poisoned_cgs = Vec::with_capacity(entries.len());
        for entry in &entries {
            let Some(cg) = entry.record.poisoned_cg.clone() else {
                continue;
            };
            poisoned_cgs.push(self.with_live_counts(&station.name, cg).await?);
        }

        Ok(DlsMessageResponse {
            id: id.to_string(),
            station_name: first.record.station_name.clone(),
            message_seq: first.record.message_seq,
            producer,
            message: Some(first.record.message.clone()),
            creation_date: first.record.created_at(),
            poisoned_cgs,
        })
    }

    async fn with_live_counts(
        &self,
        station: &StationName,
        mut cg: PoisonedCg,
    ) -> Result<PoisonedCg, DlsError> {
        let state = self
            .engine
            .store()
            .consumer_info(station.intern(), &replace_delimiters(&cg.cg_name))
            .await?;
        cg.unprocessed_messages = state.num_pending;
        cg.in_process_messages = state.num_ack_pending;
        cg.total_poison_messages = self.count_by_group(station, &cg.cg_name).await? as u64;
        Ok(cg)
    }

    /// Distinct poison ids plus every schema record.
    pub async fn count_total(&self, station: &StationName) -> Result<usize, DlsError> {
        let entries = self.scan_all(station).await?;
        let mut poison_ids = HashSet::new();
        let mut count = 0;
        for entry in entries {
            match entry.subject.kind {
                DlsKind::Poison => {
                    if poison_ids.insert(entry.record.id) {
                        count += 1;
                    }
                }
                DlsKind::Schema => count += 1,
            }
        }
        Ok(count)
    }

    /// Number of poison records of one consumer group.
    pub async fn count_by_group(
        &self,
        station: &StationName,
        cg_name: &str,
    ) -> Result<usize, DlsError> {
        let filter = dls_subject(DlsKind::Poison.as_str(), station.intern(), WILDCARD, cg_name);
        let scan = self
            .engine
            .scan_filtered(
                &station.dls_stream(),
                &filter,
                None,
                self.config.scan_timeout(),
            )
            .await?;
        Ok(scan.messages.len())
    }

    /// Delete the poison records of a removed consumer group. Returns how many were deleted.
    pub async fn remove_group(
        &self,
        station: &StationName,
        cg_name: &str,
    ) -> Result<usize, DlsError> {
        let stream = station.dls_stream();
        let entries = self.scan_all(station).await?;

        let mut removed = 0;
        for entry in entries {
            let poisoned_group = entry
                .record
                .poisoned_cg
                .as_ref()
                .map(|cg| cg.cg_name.as_str());
            if entry.subject.kind != DlsKind::Poison || poisoned_group != Some(cg_name) {
                continue;
            }
            if self
                .engine
                .store()
                .delete_message(&stream, entry.sequence)
                .await?
            {
                removed += 1;
            }
        }

        info!(station = %station, cg = cg_name, removed, "Removed poisoned consumer group records");
        Ok(removed)
    }

    /// Every consumer group poisoned by one original message, most recent first.
    ///
    /// The filtered read is repeated while retention moved the stream's first
    /// sequence during the read and fewer records than the stream holds came
    /// back, up to the configured number of attempts.
    pub async fn aggregate_by_original_message(
        &self,
        station: &StationName,
        message: &MessageDetails,
    ) -> Result<Vec<PoisonedCg>, DlsError> {
        let id = dls_msg_id(
            station.intern(),
            message.message_seq,
            &message.produced_by,
            &identity_timestamp(message.time_sent),
        );
        let filter = dls_subject(DlsKind::Poison.as_str(), station.intern(), &id, WILDCARD);
        let policy = self.config.aggregate_retry();

        let mut attempt: u8 = 1;
        let entries = loop {
            let (scan, entries) = self.scan_matching(station, &filter, Some(0)).await?;
            let current = self.engine.store().stream_info(&station.dls_stream()).await?;

            let raced = (entries.len() as u64) < current.messages
                && current.first_sequence > scan.state.first_sequence;
            if !raced {
                break entries;
            }
            if !policy.allows_retry_after(attempt) {
                warn!(
                    station = %station,
                    id = %id,
                    attempts = attempt,
                    "Dead-letter stream kept moving, returning last view"
                );
                break entries;
            }
            debug!(station = %station, attempt, "Stream moved during aggregation, retrying");
            tokio::time::sleep(policy.backoff(attempt)).await;
            attempt += 1;
        };

        let mut poisoned_cgs: Vec<PoisonedCg> = entries
            .into_iter()
            .filter_map(|entry| entry.record.poisoned_cg)
            .collect();
        poisoned_cgs.sort_by(|a, b| b.poisoning_time.cmp(&a.poisoning_time));
        Ok(poisoned_cgs)
    }
}
