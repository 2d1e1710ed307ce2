//! Flow record collection.

use crate::error::{NbResult, NbStatsError};
use crate::flow::{FlowRecord, FlowRecordCollection};
use crate::service::StatsService;
use nbapi_types::DatapathId;
use tracing::{debug, error, instrument, warn};

/// Collects every flow of `dpid` from the service.
///
/// The service pushes raw records one at a time; each is decoded into host
/// byte order on arrival and appended in order. A switch without flows
/// yields an empty collection. A record that fails to decode fails the
/// whole collection, so callers never see a partial dump.
///
/// Reissuing the call restarts the sequence from the first flow.
#[instrument(skip_all, fields(dpid = %dpid))]
pub fn collect_flows(
    service: &dyn StatsService,
    dpid: DatapathId,
    initial_capacity: usize,
) -> NbResult<FlowRecordCollection> {
    let mut collection = FlowRecordCollection::with_capacity(initial_capacity)?;
    let mut failure: Option<NbStatsError> = None;

    let reported = service.dump_flows(dpid, &mut |raw: &[u8]| {
        if failure.is_some() {
            return;
        }
        if let Err(e) = FlowRecord::decode(raw).and_then(|record| collection.push(record)) {
            failure = Some(e);
        }
    })?;

    if let Some(err) = failure {
        error!(dpid = %dpid, error = %err, "Failed to capture flow record");
        return Err(err);
    }

    if reported != collection.len() {
        warn!(
            dpid = %dpid,
            reported,
            received = collection.len(),
            "Service flow count differs from records received"
        );
    }
    collection.set_reported_count(reported);

    debug!(flows = collection.len(), "Collected flow records");
    Ok(collection)
}
