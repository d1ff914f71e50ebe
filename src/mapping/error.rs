//! Error definitions for the mapping module

use thiserror::Error;

use super::Trigger;

/// Problems found while validating a key map
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MappingError {
    /// The same trigger appears in more than one binding
    #[error("Trigger {0} is bound more than once")]
    DuplicateTrigger(Trigger),

    /// A character binding that is not a printable ASCII key
    #[error("Character key {0:?} is not printable ASCII")]
    UnprintableChar(char),
}
