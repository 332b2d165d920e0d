use std::collections::BTreeSet;

use crate::contract::{InstanceReservation, OrphanReason, SnapshotRecord, VolumeLookup};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotDisposition {
    Delete(OrphanReason),
    Retain,
}

/// Applies the orphan decision table to one snapshot.
///
/// `lookup` is `None` exactly when the snapshot carries no volume id and no
/// lookup was made. Attachment presence alone decides; membership in the
/// active-instance set is not consulted.
pub fn classify_snapshot(
    snapshot: &SnapshotRecord,
    lookup: Option<&VolumeLookup>,
) -> SnapshotDisposition {
    if snapshot.volume_id.is_none() {
        return SnapshotDisposition::Delete(OrphanReason::NoSourceVolume);
    }

    match lookup {
        Some(VolumeLookup::NotFound) => SnapshotDisposition::Delete(OrphanReason::VolumeMissing),
        Some(VolumeLookup::Found(volume)) if volume.attachments.is_empty() => {
            SnapshotDisposition::Delete(OrphanReason::VolumeUnattached)
        }
        Some(VolumeLookup::Found(_)) => SnapshotDisposition::Retain,
        // Volume id present but no lookup outcome supplied: the caller has
        // not queried the provider yet, so nothing can justify a deletion.
        None => SnapshotDisposition::Retain,
    }
}

/// Flattens per-reservation instance groups into one deduplicated id set.
pub fn active_instance_set(reservations: &[InstanceReservation]) -> BTreeSet<String> {
    reservations
        .iter()
        .flat_map(|reservation| reservation.instance_ids.iter().cloned())
        .collect()
}
