use thiserror::Error;

use util::ArcStr;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Serializer '{0}' is no longer accepting tasks")]
    SerializerClosed(ArcStr),

    #[error("Serializer name '{0}' already in use")]
    SerializerNameTaken(ArcStr),
}
