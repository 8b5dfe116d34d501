use thiserror::Error;

/// Errors surfaced by timer construction and reconfiguration.
///
/// Run-time protocol violations (protected writes, unsupported mode requests)
/// are deliberately *not* errors at this layer: register adapters ignore and
/// log them, the way the modelled hardware refuses such writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TimerError {
    #[error("invalid timer configuration: {0}")]
    InvalidConfiguration(&'static str),
}
