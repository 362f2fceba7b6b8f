//! Human-readable entity codes.
//!
//! Every entity in the school graph is addressed by a short, stable code
//! (`HS0001`, `10A1`, `HK1-2024`) rather than a surrogate key. Each kind of
//! code gets its own newtype so a term code can never be passed where a
//! subject code is expected.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! code_type {
  ($(#[$meta:meta])* $name:ident) => {
    $(#[$meta])*
    #[derive(
      Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
    )]
    #[serde(transparent)]
    pub struct $name(String);

    impl $name {
      pub fn new(code: impl Into<String>) -> Self { Self(code.into()) }

      pub fn as_str(&self) -> &str { &self.0 }

      pub fn into_inner(self) -> String { self.0 }
    }

    impl fmt::Display for $name {
      fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
      }
    }

    impl From<&str> for $name {
      fn from(code: &str) -> Self { Self(code.to_owned()) }
    }

    impl From<String> for $name {
      fn from(code: String) -> Self { Self(code) }
    }

    impl AsRef<str> for $name {
      fn as_ref(&self) -> &str { &self.0 }
    }
  };
}

code_type!(
  /// Identifies a student. Ranking ties are broken by ascending student code.
  StudentCode
);
code_type!(ClassroomCode);
code_type!(GradeCode);
code_type!(SubjectCode);
code_type!(ExamCode);
code_type!(TermCode);
code_type!(SchoolYearCode);

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn codes_order_lexicographically() {
    let mut codes = vec![
      StudentCode::from("HS010"),
      StudentCode::from("HS002"),
      StudentCode::from("HS001"),
    ];
    codes.sort();
    let sorted: Vec<&str> = codes.iter().map(StudentCode::as_str).collect();
    assert_eq!(sorted, ["HS001", "HS002", "HS010"]);
  }

  #[test]
  fn codes_serialize_as_plain_strings() {
    let code = TermCode::from("HK1-2024");
    let json = serde_json::to_string(&code).unwrap();
    assert_eq!(json, "\"HK1-2024\"");
    let back: TermCode = serde_json::from_str(&json).unwrap();
    assert_eq!(back, code);
  }
}
