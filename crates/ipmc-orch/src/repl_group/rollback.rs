//! Rollback of partially programmed hardware.
//!
//! Rollback is best effort: every undo step is attempted, failures are
//! logged and counted, and nothing is propagated to the caller, who is
//! already returning the original error.

use ipmc_sai::{IpmcApi, IpmcGroupOid, ReplGroupOid, RpfGroupOid, SaiResult};
use ipmc_types::DeviceId;
use log::{debug, warn};

/// Logs a failed undo step. Returns true if the step failed.
pub(super) fn log_rollback_error<T>(operation: &str, context: &str, result: SaiResult<T>) -> bool {
    match result {
        Ok(_) => {
            debug!("ReplGroupOrch: rollback {} {} done", operation, context);
            false
        }
        Err(e) => {
            warn!("ReplGroupOrch: rollback {} {} failed: {}", operation, context, e);
            true
        }
    }
}

/// Hardware objects created so far by a replication-group create.
///
/// Fields are filled in as each step succeeds; [`run`](Self::run) removes
/// them in reverse creation order.
pub(super) struct GroupCreateRollback<'a> {
    sai: &'a dyn IpmcApi,
    device: DeviceId,
    pub repl_group: ReplGroupOid,
    pub ipmc_group: IpmcGroupOid,
    pub rpf_group: RpfGroupOid,
}

impl<'a> GroupCreateRollback<'a> {
    pub fn new(sai: &'a dyn IpmcApi, device: DeviceId, repl_group: ReplGroupOid) -> Self {
        Self {
            sai,
            device,
            repl_group,
            ipmc_group: IpmcGroupOid::NULL,
            rpf_group: RpfGroupOid::NULL,
        }
    }

    /// Removes every recorded object and returns the number of undo steps
    /// that failed.
    pub fn run(&self) -> usize {
        let context = format!("for group {} on device {}", self.repl_group, self.device);
        let mut failed = 0;

        if self.rpf_group.is_valid()
            && log_rollback_error("remove_rpf_group", &context, self.sai.remove_rpf_group(self.device, self.rpf_group))
        {
            failed += 1;
        }
        if self.ipmc_group.is_valid()
            && log_rollback_error(
                "remove_ipmc_group",
                &context,
                self.sai.remove_ipmc_group(self.device, self.ipmc_group),
            )
        {
            failed += 1;
        }
        if log_rollback_error(
            "remove_repl_group",
            &context,
            self.sai.remove_repl_group(self.device, self.repl_group),
        ) {
            failed += 1;
        }
        failed
    }
}
