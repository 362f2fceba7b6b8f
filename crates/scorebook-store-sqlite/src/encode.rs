//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Dates are stored as `YYYY-MM-DD`. Tiers are stored as their snake_case
//! names. Ranks are nullable integers.

use std::str::FromStr as _;

use chrono::NaiveDate;
use rusqlite::Row;
use scorebook_core::{
  average::{
    StudentTermAverage, StudentYearlyAverage, SubjectTermAverage,
    SubjectYearlyAverage, Tier,
  },
  ranking::Standing,
  school::{Classroom, Exam, Grade, Student, Term},
  score::{ClassroomScore, Score, ScoreDetail},
};

use crate::{Error, Result};

// ─── NaiveDate ───────────────────────────────────────────────────────────────

const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn encode_date(date: NaiveDate) -> String {
  date.format(DATE_FORMAT).to_string()
}

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, DATE_FORMAT)
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

// ─── Tier ────────────────────────────────────────────────────────────────────

pub fn encode_tier(tier: Tier) -> String { tier.to_string() }

pub fn decode_tier(s: &str) -> Result<Tier> {
  Tier::from_str(s).map_err(|_| Error::Decode(format!("unknown tier: {s:?}")))
}

// ─── Ranks ───────────────────────────────────────────────────────────────────

pub fn decode_rank(rank: Option<i64>) -> Result<Option<u32>> {
  rank
    .map(|r| {
      u32::try_from(r).map_err(|_| Error::Decode(format!("invalid rank: {r}")))
    })
    .transpose()
}

// ─── Rows without encoded columns ────────────────────────────────────────────

pub fn read_grade(row: &Row<'_>) -> rusqlite::Result<Grade> {
  Ok(Grade {
    code:             row.get::<_, String>(0)?.into(),
    name:             row.get(1)?,
    school_year_code: row.get::<_, String>(2)?.into(),
  })
}

pub fn read_classroom(row: &Row<'_>) -> rusqlite::Result<Classroom> {
  Ok(Classroom {
    code:       row.get::<_, String>(0)?.into(),
    name:       row.get(1)?,
    grade_code: row.get::<_, String>(2)?.into(),
  })
}

pub fn read_student(row: &Row<'_>) -> rusqlite::Result<Student> {
  Ok(Student {
    code:           row.get::<_, String>(0)?.into(),
    name:           row.get(1)?,
    classroom_code: row.get::<_, Option<String>>(2)?.map(Into::into),
  })
}

pub fn read_score(row: &Row<'_>) -> rusqlite::Result<Score> {
  Ok(Score {
    student_code: row.get::<_, String>(0)?.into(),
    exam_code:    row.get::<_, String>(1)?.into(),
    value:        row.get(2)?,
  })
}

pub fn read_score_detail(row: &Row<'_>) -> rusqlite::Result<ScoreDetail> {
  Ok(ScoreDetail {
    exam_code:    row.get::<_, String>(0)?.into(),
    subject_code: row.get::<_, String>(1)?.into(),
    term_code:    row.get::<_, String>(2)?.into(),
    value:        row.get(3)?,
  })
}

/// `(student_code, student_name, exam_code, subject_code, term_code, value)`
pub fn read_classroom_score(
  row: &Row<'_>,
) -> rusqlite::Result<ClassroomScore> {
  Ok(ClassroomScore {
    student_code: row.get::<_, String>(0)?.into(),
    student_name: row.get(1)?,
    exam_code:    row.get::<_, String>(2)?.into(),
    subject_code: row.get::<_, String>(3)?.into(),
    term_code:    row.get::<_, String>(4)?.into(),
    value:        row.get(5)?,
  })
}

/// `(student_code, subject_code, term_code, average)`
pub fn read_subject_term(row: &Row<'_>) -> rusqlite::Result<SubjectTermAverage> {
  Ok(SubjectTermAverage {
    student_code: row.get::<_, String>(0)?.into(),
    subject_code: row.get::<_, String>(1)?.into(),
    term_code:    row.get::<_, String>(2)?.into(),
    average:      row.get(3)?,
  })
}

/// `(student_code, subject_code, school_year_code, average)`
pub fn read_subject_yearly(
  row: &Row<'_>,
) -> rusqlite::Result<SubjectYearlyAverage> {
  Ok(SubjectYearlyAverage {
    student_code:     row.get::<_, String>(0)?.into(),
    subject_code:     row.get::<_, String>(1)?.into(),
    school_year_code: row.get::<_, String>(2)?.into(),
    average:          row.get(3)?,
  })
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from a `terms` row.
pub struct RawTerm {
  pub code:             String,
  pub name:             String,
  pub school_year_code: String,
  pub start_date:       String,
  pub end_date:         String,
}

impl RawTerm {
  pub fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      code:             row.get(0)?,
      name:             row.get(1)?,
      school_year_code: row.get(2)?,
      start_date:       row.get(3)?,
      end_date:         row.get(4)?,
    })
  }

  pub fn into_term(self) -> Result<Term> {
    Ok(Term {
      code:             self.code.into(),
      name:             self.name,
      school_year_code: self.school_year_code.into(),
      start_date:       decode_date(&self.start_date)?,
      end_date:         decode_date(&self.end_date)?,
    })
  }
}

/// Raw strings read directly from an `exams` row.
pub struct RawExam {
  pub code:         String,
  pub subject_code: String,
  pub term_code:    String,
  pub date:         String,
}

impl RawExam {
  pub fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      code:         row.get(0)?,
      subject_code: row.get(1)?,
      term_code:    row.get(2)?,
      date:         row.get(3)?,
    })
  }

  pub fn into_exam(self) -> Result<Exam> {
    Ok(Exam {
      code:         self.code.into(),
      subject_code: self.subject_code.into(),
      term_code:    self.term_code.into(),
      date:         decode_date(&self.date)?,
    })
  }
}

/// A `student_term_averages` or `student_yearly_averages` row. `period_code`
/// is the term or school-year code, depending on the table.
pub struct RawStudentAverage {
  pub student_code:   String,
  pub period_code:    String,
  pub average:        f64,
  pub classroom_rank: Option<i64>,
  pub grade_rank:     Option<i64>,
  pub tier:           String,
}

impl RawStudentAverage {
  pub fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      student_code:   row.get(0)?,
      period_code:    row.get(1)?,
      average:        row.get(2)?,
      classroom_rank: row.get(3)?,
      grade_rank:     row.get(4)?,
      tier:           row.get(5)?,
    })
  }

  pub fn into_term_average(self) -> Result<StudentTermAverage> {
    Ok(StudentTermAverage {
      student_code:   self.student_code.into(),
      term_code:      self.period_code.into(),
      average:        self.average,
      classroom_rank: decode_rank(self.classroom_rank)?,
      grade_rank:     decode_rank(self.grade_rank)?,
      tier:           decode_tier(&self.tier)?,
    })
  }

  pub fn into_yearly_average(self) -> Result<StudentYearlyAverage> {
    Ok(StudentYearlyAverage {
      student_code:     self.student_code.into(),
      school_year_code: self.period_code.into(),
      average:          self.average,
      classroom_rank:   decode_rank(self.classroom_rank)?,
      grade_rank:       decode_rank(self.grade_rank)?,
      tier:             decode_tier(&self.tier)?,
    })
  }

  pub fn into_standing(self) -> Result<Standing> {
    Ok(Standing {
      student_code:   self.student_code.into(),
      average:        self.average,
      classroom_rank: decode_rank(self.classroom_rank)?,
      grade_rank:     decode_rank(self.grade_rank)?,
      tier:           decode_tier(&self.tier)?,
    })
  }
}
