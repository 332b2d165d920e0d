use std::time::Instant;

use serde_json::json;
use snapshot_reaper_core::contract::{
    DeletedSnapshot, SweepSummary, VolumeLookup, SWEEP_SCHEMA_VERSION,
};
use snapshot_reaper_core::evaluation::{
    active_instance_set, classify_snapshot, SnapshotDisposition,
};

use crate::adapters::ec2::{InstanceDirectory, SnapshotStore, VolumeDirectory};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepError {
    pub message: String,
}

impl SweepError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Runs one fetch-filter-delete pass: list owned snapshots, list running
/// instances, then evaluate and delete orphans strictly in listing order.
///
/// The first unexpected provider error aborts the pass. Deletions performed
/// before that point stand; snapshots after it are left unevaluated.
pub fn run_sweep(
    snapshots: &dyn SnapshotStore,
    instances: &dyn InstanceDirectory,
    volumes: &dyn VolumeDirectory,
) -> Result<SweepSummary, SweepError> {
    let started_at = Instant::now();

    match sweep(snapshots, instances, volumes) {
        Ok(summary) => {
            log_sweep_info(
                "sweep_completed",
                json!({
                    "snapshots_evaluated": summary.snapshots_evaluated,
                    "snapshots_deleted": summary.snapshots_deleted,
                    "snapshots_retained": summary.snapshots_retained,
                    "active_instances": summary.active_instances,
                    "duration_ms": started_at.elapsed().as_millis(),
                }),
            );
            Ok(summary)
        }
        Err(error) => {
            log_sweep_error(
                "sweep_failed",
                json!({
                    "duration_ms": started_at.elapsed().as_millis(),
                    "error": error.message.clone(),
                }),
            );
            Err(error)
        }
    }
}

fn sweep(
    snapshots: &dyn SnapshotStore,
    instances: &dyn InstanceDirectory,
    volumes: &dyn VolumeDirectory,
) -> Result<SweepSummary, SweepError> {
    let listed = snapshots
        .list_owned_snapshots()
        .map_err(|error| SweepError::new(format!("Failed to list owned snapshots: {error}")))?;

    let reservations = instances
        .list_running_reservations()
        .map_err(|error| SweepError::new(format!("Failed to list running instances: {error}")))?;
    // Computed per run but not consulted below: attachment presence alone
    // drives the deletion decision. Reported in the summary.
    let active_instances = active_instance_set(&reservations);

    log_sweep_info(
        "sweep_started",
        json!({
            "snapshots_listed": listed.len(),
            "active_instances": active_instances.len(),
        }),
    );

    let mut deleted = Vec::new();
    for snapshot in &listed {
        let lookup = match &snapshot.volume_id {
            Some(volume_id) => Some(describe_volume(volumes, volume_id)?),
            None => None,
        };

        match classify_snapshot(snapshot, lookup.as_ref()) {
            SnapshotDisposition::Delete(reason) => {
                snapshots
                    .delete_snapshot(&snapshot.snapshot_id)
                    .map_err(|error| {
                        SweepError::new(format!(
                            "Failed to delete snapshot {}: {error}",
                            snapshot.snapshot_id
                        ))
                    })?;
                log_sweep_info(
                    "snapshot_deleted",
                    json!({
                        "snapshot_id": snapshot.snapshot_id.clone(),
                        "reason": reason.message(),
                    }),
                );
                deleted.push(DeletedSnapshot {
                    snapshot_id: snapshot.snapshot_id.clone(),
                    reason,
                });
            }
            SnapshotDisposition::Retain => {}
        }
    }

    Ok(SweepSummary {
        snapshots_evaluated: listed.len(),
        snapshots_deleted: deleted.len(),
        snapshots_retained: listed.len() - deleted.len(),
        active_instances: active_instances.len(),
        deleted,
        status: "sweep_completed".to_string(),
        schema_version: SWEEP_SCHEMA_VERSION.to_string(),
    })
}

fn describe_volume(
    volumes: &dyn VolumeDirectory,
    volume_id: &str,
) -> Result<VolumeLookup, SweepError> {
    volumes.describe_volume(volume_id).map_err(|error| {
        SweepError::new(format!("Failed to describe volume {volume_id}: {error}"))
    })
}

fn log_sweep_info(event: &str, details: serde_json::Value) {
    eprintln!(
        "{}",
        json!({
            "component": "sweep_handler",
            "event": event,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "details": details,
        })
    );
}

fn log_sweep_error(event: &str, details: serde_json::Value) {
    eprintln!(
        "{}",
        json!({
            "component": "sweep_handler",
            "level": "error",
            "event": event,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "details": details,
        })
    );
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use snapshot_reaper_core::contract::{
        AttachmentRecord, InstanceReservation, OrphanReason, SnapshotRecord, VolumeRecord,
    };

    use super::*;

    #[derive(Clone)]
    enum VolumeOutcome {
        Found(Vec<&'static str>),
        NotFound,
        Fails(&'static str),
    }

    struct FakeEc2 {
        snapshots: Result<Vec<SnapshotRecord>, String>,
        reservations: Result<Vec<InstanceReservation>, String>,
        volumes: HashMap<String, VolumeOutcome>,
        denied_delete: Option<&'static str>,
        deleted: Mutex<Vec<String>>,
        described: Mutex<Vec<String>>,
    }

    impl FakeEc2 {
        fn new(snapshots: Vec<SnapshotRecord>) -> Self {
            Self {
                snapshots: Ok(snapshots),
                reservations: Ok(Vec::new()),
                volumes: HashMap::new(),
                denied_delete: None,
                deleted: Mutex::new(Vec::new()),
                described: Mutex::new(Vec::new()),
            }
        }

        fn with_volume(mut self, volume_id: &str, outcome: VolumeOutcome) -> Self {
            self.volumes.insert(volume_id.to_string(), outcome);
            self
        }

        fn with_reservations(mut self, reservations: Vec<InstanceReservation>) -> Self {
            self.reservations = Ok(reservations);
            self
        }

        fn deleted(&self) -> Vec<String> {
            self.deleted.lock().expect("poisoned mutex").clone()
        }

        fn described(&self) -> Vec<String> {
            self.described.lock().expect("poisoned mutex").clone()
        }
    }

    impl SnapshotStore for FakeEc2 {
        fn list_owned_snapshots(&self) -> Result<Vec<SnapshotRecord>, String> {
            self.snapshots.clone()
        }

        fn delete_snapshot(&self, snapshot_id: &str) -> Result<(), String> {
            if self.denied_delete == Some(snapshot_id) {
                return Err(format!("simulated delete failure for {snapshot_id}"));
            }
            self.deleted
                .lock()
                .expect("poisoned mutex")
                .push(snapshot_id.to_string());
            Ok(())
        }
    }

    impl InstanceDirectory for FakeEc2 {
        fn list_running_reservations(&self) -> Result<Vec<InstanceReservation>, String> {
            self.reservations.clone()
        }
    }

    impl VolumeDirectory for FakeEc2 {
        fn describe_volume(&self, volume_id: &str) -> Result<VolumeLookup, String> {
            self.described
                .lock()
                .expect("poisoned mutex")
                .push(volume_id.to_string());

            match self.volumes.get(volume_id) {
                Some(VolumeOutcome::Found(attached_to)) => Ok(VolumeLookup::Found(VolumeRecord {
                    volume_id: volume_id.to_string(),
                    attachments: attached_to
                        .iter()
                        .map(|instance_id| AttachmentRecord {
                            instance_id: instance_id.to_string(),
                        })
                        .collect(),
                })),
                Some(VolumeOutcome::NotFound) | None => Ok(VolumeLookup::NotFound),
                Some(VolumeOutcome::Fails(message)) => Err(message.to_string()),
            }
        }
    }

    fn snapshot(snapshot_id: &str, volume_id: Option<&str>) -> SnapshotRecord {
        SnapshotRecord {
            snapshot_id: snapshot_id.to_string(),
            volume_id: volume_id.map(str::to_string),
        }
    }

    #[test]
    fn deletes_snapshot_without_source_volume() {
        let fake = FakeEc2::new(vec![snapshot("snap-s1", None)]);

        let summary = run_sweep(&fake, &fake, &fake).expect("sweep should succeed");

        assert_eq!(fake.deleted(), vec!["snap-s1".to_string()]);
        assert!(fake.described().is_empty());
        assert_eq!(
            summary.deleted,
            vec![DeletedSnapshot {
                snapshot_id: "snap-s1".to_string(),
                reason: OrphanReason::NoSourceVolume,
            }]
        );
    }

    #[test]
    fn retains_snapshot_whose_volume_is_attached() {
        let fake = FakeEc2::new(vec![snapshot("snap-s2", Some("vol-v1"))])
            .with_volume("vol-v1", VolumeOutcome::Found(vec!["i-abc"]));

        let summary = run_sweep(&fake, &fake, &fake).expect("sweep should succeed");

        assert!(fake.deleted().is_empty());
        assert_eq!(fake.described(), vec!["vol-v1".to_string()]);
        assert_eq!(summary.snapshots_retained, 1);
        assert_eq!(summary.snapshots_deleted, 0);
    }

    #[test]
    fn deletes_snapshot_whose_volume_is_unattached() {
        let fake = FakeEc2::new(vec![snapshot("snap-s3", Some("vol-v2"))])
            .with_volume("vol-v2", VolumeOutcome::Found(Vec::new()));

        let summary = run_sweep(&fake, &fake, &fake).expect("sweep should succeed");

        assert_eq!(fake.deleted(), vec!["snap-s3".to_string()]);
        assert_eq!(summary.deleted[0].reason, OrphanReason::VolumeUnattached);
    }

    #[test]
    fn deletes_snapshot_whose_volume_is_missing() {
        let fake = FakeEc2::new(vec![snapshot("snap-s4", Some("vol-v3"))])
            .with_volume("vol-v3", VolumeOutcome::NotFound);

        let summary = run_sweep(&fake, &fake, &fake).expect("sweep should succeed");

        assert_eq!(fake.deleted(), vec!["snap-s4".to_string()]);
        assert_eq!(summary.deleted[0].reason, OrphanReason::VolumeMissing);
    }

    #[test]
    fn unexpected_lookup_failure_stops_evaluation() {
        let fake = FakeEc2::new(vec![
            snapshot("snap-s1", None),
            snapshot("snap-s5", Some("vol-v4")),
            snapshot("snap-s6", Some("vol-v5")),
        ])
        .with_volume("vol-v4", VolumeOutcome::Fails("access denied"))
        .with_volume("vol-v5", VolumeOutcome::Found(Vec::new()));

        let error = run_sweep(&fake, &fake, &fake).expect_err("sweep should fail");

        assert!(error.message.contains("vol-v4"));
        assert!(error.message.contains("access denied"));
        // The deletion issued before the failure stands; nothing after the
        // failing snapshot is evaluated.
        assert_eq!(fake.deleted(), vec!["snap-s1".to_string()]);
        assert_eq!(fake.described(), vec!["vol-v4".to_string()]);
    }

    #[test]
    fn snapshot_listing_failure_issues_no_deletes() {
        let mut fake = FakeEc2::new(Vec::new());
        fake.snapshots = Err("expired credentials".to_string());

        let error = run_sweep(&fake, &fake, &fake).expect_err("sweep should fail");

        assert!(error.message.contains("Failed to list owned snapshots"));
        assert!(fake.deleted().is_empty());
    }

    #[test]
    fn instance_listing_failure_issues_no_deletes() {
        let mut fake = FakeEc2::new(vec![snapshot("snap-s1", None)]);
        fake.reservations = Err("throttled".to_string());

        let error = run_sweep(&fake, &fake, &fake).expect_err("sweep should fail");

        assert!(error.message.contains("Failed to list running instances"));
        assert!(fake.deleted().is_empty());
    }

    #[test]
    fn delete_failure_aborts_the_run() {
        let mut fake = FakeEc2::new(vec![
            snapshot("snap-s1", None),
            snapshot("snap-s2", None),
        ]);
        fake.denied_delete = Some("snap-s1");

        let error = run_sweep(&fake, &fake, &fake).expect_err("sweep should fail");

        assert!(error.message.contains("Failed to delete snapshot snap-s1"));
        assert!(fake.deleted().is_empty());
    }

    #[test]
    fn mixed_sweep_reports_counts_and_reasons_in_order() {
        let fake = FakeEc2::new(vec![
            snapshot("snap-s1", None),
            snapshot("snap-s2", Some("vol-v1")),
            snapshot("snap-s3", Some("vol-v2")),
            snapshot("snap-s4", Some("vol-v3")),
        ])
        .with_volume("vol-v1", VolumeOutcome::Found(vec!["i-abc"]))
        .with_volume("vol-v2", VolumeOutcome::Found(Vec::new()))
        .with_volume("vol-v3", VolumeOutcome::NotFound)
        .with_reservations(vec![
            InstanceReservation {
                instance_ids: vec!["i-abc".to_string(), "i-def".to_string()],
            },
            InstanceReservation {
                instance_ids: vec!["i-def".to_string()],
            },
        ]);

        let summary = run_sweep(&fake, &fake, &fake).expect("sweep should succeed");

        assert_eq!(summary.snapshots_evaluated, 4);
        assert_eq!(summary.snapshots_deleted, 3);
        assert_eq!(summary.snapshots_retained, 1);
        assert_eq!(summary.active_instances, 2);
        assert_eq!(summary.schema_version, SWEEP_SCHEMA_VERSION);
        assert_eq!(
            fake.deleted(),
            vec![
                "snap-s1".to_string(),
                "snap-s3".to_string(),
                "snap-s4".to_string(),
            ]
        );
        assert_eq!(
            summary
                .deleted
                .iter()
                .map(|record| record.reason)
                .collect::<Vec<_>>(),
            vec![
                OrphanReason::NoSourceVolume,
                OrphanReason::VolumeUnattached,
                OrphanReason::VolumeMissing,
            ]
        );
    }

    #[test]
    fn attached_volume_retains_snapshot_even_without_running_instances() {
        // The active-instance set does not participate in the decision:
        // a volume attached to a stopped instance still protects its
        // snapshot.
        let fake = FakeEc2::new(vec![snapshot("snap-s2", Some("vol-v1"))])
            .with_volume("vol-v1", VolumeOutcome::Found(vec!["i-stopped"]))
            .with_reservations(Vec::new());

        let summary = run_sweep(&fake, &fake, &fake).expect("sweep should succeed");

        assert!(fake.deleted().is_empty());
        assert_eq!(summary.active_instances, 0);
        assert_eq!(summary.snapshots_retained, 1);
    }
}
