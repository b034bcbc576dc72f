use thiserror::Error;

/// Misuse of a handle that is reported rather than left undefined.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandleError
{
    #[error("dereferenced a null handle")]
    Null,

    #[error("object at {address:#x} is already owned by a handle")]
    AlreadyOwned { address: usize },
}
