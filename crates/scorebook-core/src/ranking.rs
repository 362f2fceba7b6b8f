//! Dense ranking over a population of students for one period.
//!
//! Ranks are sequential integers starting at 1. Equal averages never share a
//! rank: ties are broken by ascending student code, so `{A: 8.0, B: 8.0,
//! C: 6.0}` ranks A=1, B=2, C=3.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::{
  average::{StudentTermAverage, StudentYearlyAverage, Tier},
  code::{ClassroomCode, GradeCode, SchoolYearCode, StudentCode, TermCode},
};

// ─── Scopes ──────────────────────────────────────────────────────────────────

/// The period an average (and therefore a rank) belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "code", rename_all = "snake_case")]
pub enum Period {
  Term(TermCode),
  SchoolYear(SchoolYearCode),
}

/// Which rank field a ranking pass writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankScope {
  Classroom,
  Grade,
}

/// A set of students ranked against each other. Grade membership is derived
/// through each student's classroom.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "code", rename_all = "snake_case")]
pub enum Population {
  Classroom(ClassroomCode),
  Grade(GradeCode),
}

impl Population {
  pub fn scope(&self) -> RankScope {
    match self {
      Self::Classroom(_) => RankScope::Classroom,
      Self::Grade(_) => RankScope::Grade,
    }
  }
}

// ─── Standings ───────────────────────────────────────────────────────────────

/// A student's average and ranks for some period, regardless of whether the
/// period is a term or a school year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standing {
  pub student_code:   StudentCode,
  pub average:        f64,
  pub classroom_rank: Option<u32>,
  pub grade_rank:     Option<u32>,
  pub tier:           Tier,
}

impl Standing {
  pub fn rank(&self, scope: RankScope) -> Option<u32> {
    match scope {
      RankScope::Classroom => self.classroom_rank,
      RankScope::Grade => self.grade_rank,
    }
  }
}

impl From<StudentTermAverage> for Standing {
  fn from(row: StudentTermAverage) -> Self {
    Self {
      student_code:   row.student_code,
      average:        row.average,
      classroom_rank: row.classroom_rank,
      grade_rank:     row.grade_rank,
      tier:           row.tier,
    }
  }
}

impl From<StudentYearlyAverage> for Standing {
  fn from(row: StudentYearlyAverage) -> Self {
    Self {
      student_code:   row.student_code,
      average:        row.average,
      classroom_rank: row.classroom_rank,
      grade_rank:     row.grade_rank,
      tier:           row.tier,
    }
  }
}

// ─── Ranking ─────────────────────────────────────────────────────────────────

/// The rank a ranking pass assigned to one student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankAssignment {
  pub student_code: StudentCode,
  pub rank:         u32,
}

/// Rank `entries` by average descending, ties by ascending student code.
///
/// NaN averages sort after every real average.
pub fn dense_rank<I>(entries: I) -> Vec<RankAssignment>
where
  I: IntoIterator<Item = (StudentCode, f64)>,
{
  let mut entries: Vec<(StudentCode, f64)> = entries.into_iter().collect();
  entries.sort_by(|(code_a, avg_a), (code_b, avg_b)| {
    descending(*avg_a, *avg_b).then_with(|| code_a.cmp(code_b))
  });

  entries
    .into_iter()
    .zip(1_u32..)
    .map(|((student_code, _), rank)| RankAssignment { student_code, rank })
    .collect()
}

fn descending(a: f64, b: f64) -> Ordering {
  let key = |v: f64| if v.is_nan() { f64::NEG_INFINITY } else { v };
  key(b).total_cmp(&key(a))
}
