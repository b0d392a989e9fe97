use std::io;

/// Failures of a command line invocation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Iso(#[from] bkisofs::Error),

    #[error("unable to write output: {0}")]
    Io(#[from] io::Error),

    #[error("invalid argument {0:?}: {1}")]
    InvalidArgument(String, &'static str),
}
