use crate::k8s::source::SourceError;
use derive_more::From;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, From)]
pub enum Error {
    #[from]
    Kube(kube::Error),

    #[from]
    Infer(kube::config::InferConfigError),

    #[from]
    Source(SourceError),

    #[from]
    Join(tokio::task::JoinError),

    /// The one-shot initial list failed, the cache never became usable
    InitialList(SourceError),

    /// The watch could not be re-established within the configured attempts
    WatchRetriesExhausted { attempts: u32, last: SourceError },

    /// A component that may only be started once was started again
    AlreadyStarted(&'static str),
}

impl core::fmt::Display for Error {
    fn fmt(&self, fmt: &mut core::fmt::Formatter) -> core::result::Result<(), core::fmt::Error> {
        match self {
            Self::Kube(e) => write!(fmt, "kubernetes api error: {e}"),
            Self::Infer(e) => write!(fmt, "unable to infer kubernetes config: {e}"),
            Self::Source(e) => write!(fmt, "{e}"),
            Self::Join(e) => write!(fmt, "reflector task did not complete: {e}"),
            Self::InitialList(e) => write!(fmt, "initial list failed, cache is unusable: {e}"),
            Self::WatchRetriesExhausted { attempts, last } => write!(
                fmt,
                "watch could not be re-established after {attempts} attempts: {last}"
            ),
            Self::AlreadyStarted(component) => write!(fmt, "{component} already started"),
        }
    }
}

impl std::error::Error for Error {}
