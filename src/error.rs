use thiserror::Error;

/// Errors surfaced by the engine. Nothing is silently masked: stragglers are handled by
/// rollback (not an error), everything else in this enum is either refused up front
/// (configuration) or fatal (protocol corruption, remote I/O, resource exhaustion).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("allocation request of {requested} bytes exceeds the per-region limit of {limit} bytes")]
    OutOfMemory { requested: usize, limit: usize },
    #[error("duplicate (source, seq) pair ({0}, {1}) observed twice")]
    DuplicateMessageId(usize, u64),
    #[error("non-monotonic past-event log at LP {0}: entry {1} precedes entry {2}")]
    NonMonotonicPes(usize, u64, u64),
    #[error("unknown event tag {0}")]
    UnknownEventTag(u32),
    #[error("remote transport failure: {0}")]
    RemoteTransport(String),
    #[error("attempted to process an event whose timestamp precedes the current GVT")]
    GvtViolation,
    #[error("attempted to roll back to a time strictly after the LP's current bound")]
    TimeTravel,
    #[error("LP {0} is not owned by this worker")]
    NotOwned(usize),
    #[error("worker thread panicked: {0}")]
    ThreadPanic(String),
    #[error("error in `mesocarp` scheduling primitive: {0}")]
    MesoError(#[from] mesocarp::MesoError),
}

pub type Result<T> = std::result::Result<T, EngineError>;
