//! Error types for `scorebook-core`.

use thiserror::Error;

use crate::code::{ClassroomCode, ExamCode, GradeCode, StudentCode, TermCode};

#[derive(Debug, Error)]
pub enum Error {
  #[error("score {0} is outside the range 0 to 10")]
  ScoreOutOfRange(f64),

  #[error("student not found: {0}")]
  StudentNotFound(StudentCode),

  #[error("classroom not found: {0}")]
  ClassroomNotFound(ClassroomCode),

  #[error("grade not found: {0}")]
  GradeNotFound(GradeCode),

  #[error("exam not found: {0}")]
  ExamNotFound(ExamCode),

  #[error("term not found: {0}")]
  TermNotFound(TermCode),

  #[error("student {student} is not enrolled in classroom {classroom}")]
  NotInClassroom {
    student:   StudentCode,
    classroom: ClassroomCode,
  },

  #[error("classroom {0} has no students")]
  EmptyClassroom(ClassroomCode),

  #[error("unknown performance tier: {0:?}")]
  UnknownTier(String),
}

impl Error {
  /// Whether this error names a reference that does not exist.
  pub fn is_not_found(&self) -> bool {
    matches!(
      self,
      Self::StudentNotFound(_)
        | Self::ClassroomNotFound(_)
        | Self::GradeNotFound(_)
        | Self::ExamNotFound(_)
        | Self::TermNotFound(_)
    )
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Error returned by the services that sit on top of a storage backend:
/// either a domain rule was violated, or the backend itself failed.
#[derive(Debug, Error)]
pub enum ServiceError<E>
where
  E: std::error::Error + 'static,
{
  #[error(transparent)]
  Domain(#[from] Error),

  #[error("store error: {0}")]
  Store(#[source] E),
}
