use serde::{Deserialize, Serialize};

pub const SWEEP_SCHEMA_VERSION: &str = "v1";

/// An EBS snapshot as listed for the owning account. A missing `volume_id`
/// means the source volume was deleted after the snapshot was created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotRecord {
    pub snapshot_id: String,
    pub volume_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttachmentRecord {
    pub instance_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VolumeRecord {
    pub volume_id: String,
    pub attachments: Vec<AttachmentRecord>,
}

/// Running instances grouped per EC2 reservation, as the provider returns
/// them. Flattened into the active-instance set by the evaluation module.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstanceReservation {
    pub instance_ids: Vec<String>,
}

/// The two non-fatal outcomes of a volume lookup. Every other lookup
/// failure aborts the sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VolumeLookup {
    Found(VolumeRecord),
    NotFound,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrphanReason {
    NoSourceVolume,
    VolumeUnattached,
    VolumeMissing,
}

impl OrphanReason {
    pub fn message(self) -> &'static str {
        match self {
            Self::NoSourceVolume => "not attached to any volume",
            Self::VolumeUnattached => "not attached to any running instance",
            Self::VolumeMissing => "volume was not found",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeletedSnapshot {
    pub snapshot_id: String,
    pub reason: OrphanReason,
}

/// Invocation report returned to the scheduler on success.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SweepSummary {
    pub snapshots_evaluated: usize,
    pub snapshots_deleted: usize,
    pub snapshots_retained: usize,
    pub active_instances: usize,
    pub deleted: Vec<DeletedSnapshot>,
    pub status: String,
    pub schema_version: String,
}
