/*!
 * Monitoring
 * Diagnostic sink for failures and live resource accounting
 */

mod resources;
mod tracer;

pub(crate) use resources::{acquired, released};
pub use resources::{resource_stats, Resource, ResourceStats};
pub use tracer::{
    failure_count, init_tracing, report_anomaly, report_failure, report_native_failure,
    LOG_PREFIX,
};
