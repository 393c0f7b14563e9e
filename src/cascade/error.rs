use thiserror::Error;

use super::report::Report;
use crate::database::DatabaseError;
use crate::filter::FilterError;
use crate::schema::{EntityKind, UnknownEntity};

#[derive(Debug, Error)]
pub enum CascadeError {
    /// Raised before any store access
    #[error(transparent)]
    UnknownEntity(#[from] UnknownEntity),

    #[error(transparent)]
    Filter(#[from] FilterError),

    /// A store call failed part way through.
    ///
    /// `applied` holds the counts of the steps that completed first; when
    /// `rolled_back` is true none of them were kept.
    #[error("{action} cascade failed on {entity}: {source}")]
    Persistence {
        action: &'static str,
        entity: EntityKind,
        #[source]
        source: DatabaseError,
        applied: Box<Report>,
        rolled_back: bool,
    },
}

impl CascadeError {
    /// Mutations that may have been left in place by a failed cascade
    pub fn applied(&self) -> Option<&Report> {
        match self {
            CascadeError::Persistence { applied, rolled_back: false, .. } => Some(applied),
            _ => None,
        }
    }
}
