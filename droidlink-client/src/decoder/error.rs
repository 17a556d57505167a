use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecoderError {
    #[error("failed to create decode session: {0}")]
    SessionCreation(String),
    #[error("failed to submit picture: {0}")]
    Submit(String),
    #[error("no decode session")]
    NoSession,
    #[error("failed to spawn decode thread: {0}")]
    ThreadSpawn(#[from] std::io::Error),
}
