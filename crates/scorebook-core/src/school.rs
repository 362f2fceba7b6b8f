//! Reference data: the static school graph the engine reads but never
//! mutates.
//!
//! `Exam → Term → SchoolYear` tells the engine which periods a score feeds;
//! `Student → Classroom → Grade` tells it which populations to re-rank.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::code::{
  ClassroomCode, ExamCode, GradeCode, SchoolYearCode, StudentCode, SubjectCode,
  TermCode,
};

/// A school year, the top-level academic period grouping its terms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchoolYear {
  pub code: SchoolYearCode,
  pub name: String,
}

/// A grading period (e.g. a semester) within a school year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Term {
  pub code:             TermCode,
  pub name:             String,
  pub school_year_code: SchoolYearCode,
  pub start_date:       NaiveDate,
  pub end_date:         NaiveDate,
}

/// A grade level (e.g. "Khối 10") for one school year. Grade rankings span
/// every classroom of the grade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grade {
  pub code:             GradeCode,
  pub name:             String,
  pub school_year_code: SchoolYearCode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classroom {
  pub code:       ClassroomCode,
  pub name:       String,
  pub grade_code: GradeCode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
  pub code:           StudentCode,
  pub name:           String,
  /// A student without a classroom still gets averages, but no ranks.
  pub classroom_code: Option<ClassroomCode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
  pub code: SubjectCode,
  pub name: String,
}

/// A single assessment. Every score belongs to exactly one exam, and the exam
/// fixes the subject and term that score contributes to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exam {
  pub code:         ExamCode,
  pub subject_code: SubjectCode,
  pub term_code:    TermCode,
  pub date:         NaiveDate,
}

/// A complete snapshot of reference data, used to seed a store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SchoolData {
  pub school_years: Vec<SchoolYear>,
  pub terms:        Vec<Term>,
  pub grades:       Vec<Grade>,
  pub classrooms:   Vec<Classroom>,
  pub students:     Vec<Student>,
  pub subjects:     Vec<Subject>,
  pub exams:        Vec<Exam>,
}
