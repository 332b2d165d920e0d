use snapshot_reaper_core::contract::{InstanceReservation, SnapshotRecord, VolumeLookup};

pub trait SnapshotStore {
    fn list_owned_snapshots(&self) -> Result<Vec<SnapshotRecord>, String>;
    fn delete_snapshot(&self, snapshot_id: &str) -> Result<(), String>;
}

pub trait InstanceDirectory {
    fn list_running_reservations(&self) -> Result<Vec<InstanceReservation>, String>;
}

pub trait VolumeDirectory {
    fn describe_volume(&self, volume_id: &str) -> Result<VolumeLookup, String>;
}
