use std::time::Duration;

/// Number of slots in a full DMX universe frame.
pub const DMX_CHANNELS: usize = 512;

/// Cadence at which the DMX worker re-sends the last frame when no new
/// frame arrives, and the upper bound on how stale an emitted frame may be.
pub const DMX_REFRESH_INTERVAL: Duration = Duration::from_millis(50);

/// How long the RDM worker waits on its semaphore before running periodic
/// work (incremental scan, transport re-init) without a signal.
pub const RDM_QUEUE_WAIT: Duration = Duration::from_millis(1000);

/// Interval between incremental discovery passes when enabled.
pub const RDM_INCREMENTAL_SCAN_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Backoff before a worker retries opening a transport that reports closed.
pub const TRANSPORT_REINIT_BACKOFF: Duration = Duration::from_secs(1);

/// Backoff after the transport reports the USB device unavailable.
pub const TRANSPORT_UNAVAILABLE_BACKOFF: Duration = Duration::from_secs(1);

/// Capacity cap of the per-port work semaphores.
pub const SEMAPHORE_LIMIT: usize = 0xFFFF;

/// Default retry count of the transaction engine (the first attempt is not
/// a retry).
pub const RDM_DEFAULT_RETRIES: u32 = 5;

/// Default elapsed-time budget of one transaction engine call.
pub const RDM_DEFAULT_TIMEOUT: Duration = Duration::from_millis(2000);
