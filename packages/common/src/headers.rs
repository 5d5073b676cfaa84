use std::collections::HashMap;

/// Producer name stamped on messages re-published out of the dead-letter
/// station. Such messages must never be dead-lettered again.
pub const DLS_REPLAY_PRODUCER: &str = "$memphis_dls";

/// One generation of producer-attribution header names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributionKeys {
    pub connection_id: &'static str,
    pub produced_by: &'static str,
}

/// Attribution header generations, newest first.
pub const ATTRIBUTION_HEADER_ALIASES: &[AttributionKeys] = &[
    AttributionKeys {
        connection_id: "$memphis_connectionId",
        produced_by: "$memphis_producedBy",
    },
    AttributionKeys {
        connection_id: "connectionId",
        produced_by: "producedBy",
    },
];

/// Who produced a message, as stated by its headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribution {
    pub connection_id: String,
    pub produced_by: String,
}

impl Attribution {
    /// Whether the message is a re-publish out of the dead-letter station.
    pub fn is_dls_replay(&self) -> bool {
        self.produced_by == DLS_REPLAY_PRODUCER
    }
}

/// Resolve attribution from the first alias generation where both headers
/// are present and non-empty.
pub fn resolve_attribution(headers: &HashMap<String, String>) -> Option<Attribution> {
    ATTRIBUTION_HEADER_ALIASES.iter().find_map(|keys| {
        let connection_id = headers.get(keys.connection_id).filter(|v| !v.is_empty())?;
        let produced_by = headers.get(keys.produced_by).filter(|v| !v.is_empty())?;
        Some(Attribution {
            connection_id: connection_id.clone(),
            produced_by: produced_by.clone(),
        })
    })
}
