//! Default values for the tunable inputs.

/// Conversation attempts per scenario, forwarded to the backend.
pub(crate) fn attempts() -> u32 {
    1
}

/// Two minutes between poll attempts; batches routinely take several.
pub(crate) fn poll_delay_seconds() -> u64 {
    120
}

pub(crate) fn poll_max_attempts() -> usize {
    30
}

/// Wall-clock cap on the whole poll phase, slightly above
/// `poll_delay_seconds * poll_max_attempts`.
pub(crate) fn poll_deadline_seconds() -> u64 {
    3900
}

/// The ingestion call spins up the batch synchronously and can take minutes
/// to answer.
pub(crate) fn submit_timeout_seconds() -> u64 {
    600
}
