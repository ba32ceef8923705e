use std::time::Duration;

// ── Shutdown ───────────────────────────────────────────────────────

/// Upper bound on how long the process waits for tasks after the root
/// token fires. Matches the longest I/O deadline in the system (the
/// WebSocket read deadline), so every loop has had a chance to observe
/// cancellation.
pub const GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(60);
