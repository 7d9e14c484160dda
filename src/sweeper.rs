//! Removes objects left behind by acceptance runs.
//!
//! Everything whose name starts with the given prefix is deleted, dependents
//! first: resources, connectors, groups, then remote networks.

use tracing::{info, warn};

use crate::client::{ApiError, Client};
use crate::model::GroupsFilter;

/// What a sweep removed and what it could not.
#[derive(Debug, Default)]
pub struct SweepReport {
    /// Ids of deleted objects, in deletion order.
    pub deleted: Vec<String>,
    pub errors: Vec<ApiError>,
}

impl SweepReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    fn record(&mut self, kind: &str, id: String, result: Result<(), ApiError>) {
        match result {
            Ok(()) => {
                info!(kind, id = %id, "Swept");
                self.deleted.push(id);
            },
            Err(e) => {
                warn!(kind, id = %id, error = %e, "Failed to sweep");
                self.errors.push(e);
            },
        }
    }
}

fn matching<T>(items: Vec<T>, prefix: &str, name: impl Fn(&T) -> &str, id: impl Fn(T) -> String) -> Vec<String> {
    items
        .into_iter()
        .filter(|item| name(item).starts_with(prefix))
        .map(id)
        .collect()
}

/// Delete every resource, connector, group and remote network named `prefix*`.
///
/// A failed listing or deletion is recorded and the sweep moves on.
pub async fn sweep(client: &Client, prefix: &str) -> SweepReport {
    let mut report = SweepReport::default();

    match client.read_resources().await {
        Ok(resources) => {
            for id in matching(resources, prefix, |r| r.name.as_str(), |r| r.id) {
                let result = client.delete_resource(&id).await;
                report.record("resource", id, result);
            }
        },
        Err(e) => report.errors.push(e),
    }

    // Connectors carry generated names; they are swept with their remote network.
    let networks = match client.read_remote_networks().await {
        Ok(networks) => matching(networks, prefix, |n| n.name.as_str(), |n| n.id),
        Err(e) => {
            report.errors.push(e);
            Vec::new()
        },
    };

    match client.read_connectors().await {
        Ok(connectors) => {
            let doomed = connectors
                .into_iter()
                .filter(|c| c.name.starts_with(prefix) || networks.contains(&c.remote_network_id));
            for connector in doomed {
                let result = client.delete_connector(&connector.id).await;
                report.record("connector", connector.id, result);
            }
        },
        Err(e) => report.errors.push(e),
    }

    // Inactive groups are only listed when asked for explicitly.
    let mut groups = Vec::new();
    for is_active in [true, false] {
        let filter = GroupsFilter {
            is_active: Some(is_active),
            ..Default::default()
        };
        match client.filter_groups(&filter).await {
            Ok(found) => groups.extend(found),
            Err(e) => report.errors.push(e),
        }
    }
    for id in matching(groups, prefix, |g| g.name.as_str(), |g| g.id) {
        let result = client.delete_group(&id).await;
        report.record("group", id, result);
    }

    for id in networks {
        let result = client.delete_remote_network(&id).await;
        report.record("remote network", id, result);
    }

    info!(
        prefix,
        deleted = report.deleted.len(),
        errors = report.errors.len(),
        "Sweep finished"
    );
    report
}
