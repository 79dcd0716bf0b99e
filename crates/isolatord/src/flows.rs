//! Flow inspector: reduces the switch flow table to who-talks-to-whom pairs.

use crate::controller::{require_switch_dpid, FlowController, FlowEntry};
use crate::error::Result;
use crate::types::Communication;
use std::sync::Arc;
use tracing::debug;

pub struct FlowInspector {
    controller: Arc<dyn FlowController>,
    default_dpid: u64,
}

impl FlowInspector {
    pub fn new(controller: Arc<dyn FlowController>, default_dpid: u64) -> Self {
        Self {
            controller,
            default_dpid,
        }
    }

    /// Source/destination pairs of the current flow table
    ///
    /// The DPID is rediscovered on every call.
    pub async fn get_communications(&self) -> Result<Vec<Communication>> {
        let dpid = require_switch_dpid(self.controller.as_ref(), self.default_dpid).await?;
        let flows = self.controller.get_flows(dpid).await?;
        let communications = summarize(&flows);
        debug!(dpid, flows = flows.len(), pairs = communications.len(), "Flow table summarized");
        Ok(communications)
    }
}

/// Entries lacking either address are dropped.
pub fn summarize(flows: &[FlowEntry]) -> Vec<Communication> {
    flows
        .iter()
        .filter_map(|entry| {
            Some(Communication {
                source: entry.source()?,
                destination: entry.destination()?,
            })
        })
        .collect()
}
