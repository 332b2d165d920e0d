use aws_sdk_ec2::error::ProvideErrorMetadata;
use aws_sdk_ec2::types::Filter;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::Value;
use snapshot_reaper_core::contract::{
    AttachmentRecord, InstanceReservation, SnapshotRecord, SweepSummary, VolumeLookup,
    VolumeRecord,
};
use snapshot_reaper_lambda::adapters::ec2::{InstanceDirectory, SnapshotStore, VolumeDirectory};
use snapshot_reaper_lambda::handlers::sweep::run_sweep;

const VOLUME_NOT_FOUND_CODE: &str = "InvalidVolume.NotFound";

struct Ec2Api {
    ec2_client: aws_sdk_ec2::Client,
}

impl SnapshotStore for Ec2Api {
    fn list_owned_snapshots(&self) -> Result<Vec<SnapshotRecord>, String> {
        let client = self.ec2_client.clone();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                let snapshots = client
                    .describe_snapshots()
                    .owner_ids("self")
                    .into_paginator()
                    .items()
                    .send()
                    .collect::<Result<Vec<_>, _>>()
                    .await
                    .map_err(|error| format!("failed to list owned snapshots: {error}"))?;

                Ok(snapshots
                    .into_iter()
                    .filter_map(|snapshot| {
                        let snapshot_id = snapshot.snapshot_id()?.to_string();
                        Some(SnapshotRecord {
                            snapshot_id,
                            volume_id: snapshot.volume_id().map(str::to_string),
                        })
                    })
                    .collect())
            })
        })
    }

    fn delete_snapshot(&self, snapshot_id: &str) -> Result<(), String> {
        let client = self.ec2_client.clone();
        let snapshot_id = snapshot_id.to_string();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                client
                    .delete_snapshot()
                    .snapshot_id(&snapshot_id)
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|error| format!("failed to delete snapshot {snapshot_id}: {error}"))
            })
        })
    }
}

impl InstanceDirectory for Ec2Api {
    fn list_running_reservations(&self) -> Result<Vec<InstanceReservation>, String> {
        let client = self.ec2_client.clone();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                let reservations = client
                    .describe_instances()
                    .filters(
                        Filter::builder()
                            .name("instance-state-name")
                            .values("running")
                            .build(),
                    )
                    .into_paginator()
                    .items()
                    .send()
                    .collect::<Result<Vec<_>, _>>()
                    .await
                    .map_err(|error| format!("failed to list running instances: {error}"))?;

                Ok(reservations
                    .into_iter()
                    .map(|reservation| InstanceReservation {
                        instance_ids: reservation
                            .instances()
                            .iter()
                            .filter_map(|instance| instance.instance_id().map(str::to_string))
                            .collect(),
                    })
                    .collect())
            })
        })
    }
}

impl VolumeDirectory for Ec2Api {
    fn describe_volume(&self, volume_id: &str) -> Result<VolumeLookup, String> {
        let client = self.ec2_client.clone();
        let volume_id = volume_id.to_string();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                match client
                    .describe_volumes()
                    .volume_ids(&volume_id)
                    .send()
                    .await
                {
                    Ok(output) => {
                        let Some(volume) = output.volumes().first() else {
                            return Ok(VolumeLookup::NotFound);
                        };

                        let attachments = volume
                            .attachments()
                            .iter()
                            .map(|attachment| AttachmentRecord {
                                instance_id: attachment
                                    .instance_id()
                                    .unwrap_or_default()
                                    .to_string(),
                            })
                            .collect();

                        Ok(VolumeLookup::Found(VolumeRecord {
                            volume_id: volume.volume_id().unwrap_or(&volume_id).to_string(),
                            attachments,
                        }))
                    }
                    Err(error) if error.code() == Some(VOLUME_NOT_FOUND_CODE) => {
                        Ok(VolumeLookup::NotFound)
                    }
                    Err(error) => Err(format!("failed to describe volume {volume_id}: {error}")),
                }
            })
        })
    }
}

// The event payload and invocation context are opaque pass-through; the
// sweep takes no input from them.
async fn handle_request(_event: LambdaEvent<Value>) -> Result<SweepSummary, Error> {
    let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let api = Ec2Api {
        ec2_client: aws_sdk_ec2::Client::new(&config),
    };

    run_sweep(&api, &api, &api).map_err(|error| Error::from(error.message))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    lambda_runtime::run(service_fn(handle_request)).await
}
