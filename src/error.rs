use std::fmt;

/// Errors raised while reading a trace file. The tag-memory core itself is
/// infallible once constructed; this type belongs to the driver/trace
/// layer, not to [`crate::tagmemory::TagMemory`].
#[derive(Debug)]
pub enum TraceError {
    Io(std::io::Error),
}

impl fmt::Display for TraceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceError::Io(e) => write!(f, "failed to read trace: {}", e),
        }
    }
}

impl std::error::Error for TraceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TraceError::Io(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for TraceError {
    fn from(e: std::io::Error) -> Self {
        TraceError::Io(e)
    }
}
