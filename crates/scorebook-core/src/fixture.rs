//! A small school used by the unit tests in this crate.
//!
//! ```text
//! Y2024 ─┬─ T1, T2
//!        ├─ G10 ─┬─ 10A1: S01 S02 S03
//!        │       └─ 10A2: S04 S05
//!        └─ G11 ─── 11B1: S06
//! S07 has no classroom.
//! ```
//!
//! Exams: `MATH-T1-a`, `MATH-T1-b`, `LIT-T1`, `SCI-T1` in T1; `MATH-T2`,
//! `LIT-T2` in T2; `ORPHAN` points at a term that does not exist.

use std::sync::Arc;

use chrono::NaiveDate;

use crate::{
  code::{ExamCode, StudentCode},
  engine::Recomputer,
  memory::MemoryStore,
  school::{Classroom, Exam, Grade, SchoolData, SchoolYear, Student, Subject, Term},
  score::Score,
  store::ScoreStore,
};

fn date(m: u32, d: u32) -> NaiveDate {
  let year = if m >= 8 { 2024 } else { 2025 };
  NaiveDate::from_ymd_opt(year, m, d).unwrap()
}

fn student(code: &str, classroom: Option<&str>) -> Student {
  Student {
    code:           code.into(),
    name:           format!("Student {code}"),
    classroom_code: classroom.map(Into::into),
  }
}

fn exam(code: &str, subject: &str, term: &str, when: NaiveDate) -> Exam {
  Exam {
    code:         code.into(),
    subject_code: subject.into(),
    term_code:    term.into(),
    date:         when,
  }
}

pub fn school() -> SchoolData {
  SchoolData {
    school_years: vec![SchoolYear { code: "Y2024".into(), name: "2024-2025".into() }],
    terms:        vec![
      Term {
        code:             "T1".into(),
        name:             "Học kỳ 1".into(),
        school_year_code: "Y2024".into(),
        start_date:       date(9, 5),
        end_date:         date(1, 15),
      },
      Term {
        code:             "T2".into(),
        name:             "Học kỳ 2".into(),
        school_year_code: "Y2024".into(),
        start_date:       date(1, 20),
        end_date:         date(5, 31),
      },
    ],
    grades:       vec![
      Grade { code: "G10".into(), name: "Khối 10".into(), school_year_code: "Y2024".into() },
      Grade { code: "G11".into(), name: "Khối 11".into(), school_year_code: "Y2024".into() },
    ],
    classrooms:   vec![
      Classroom { code: "10A1".into(), name: "10A1".into(), grade_code: "G10".into() },
      Classroom { code: "10A2".into(), name: "10A2".into(), grade_code: "G10".into() },
      Classroom { code: "11B1".into(), name: "11B1".into(), grade_code: "G11".into() },
    ],
    students:     vec![
      student("S01", Some("10A1")),
      student("S02", Some("10A1")),
      student("S03", Some("10A1")),
      student("S04", Some("10A2")),
      student("S05", Some("10A2")),
      student("S06", Some("11B1")),
      student("S07", None),
    ],
    subjects:     vec![
      Subject { code: "MATH".into(), name: "Toán".into() },
      Subject { code: "LIT".into(), name: "Ngữ văn".into() },
      Subject { code: "SCI".into(), name: "Khoa học".into() },
    ],
    exams:        vec![
      exam("MATH-T1-a", "MATH", "T1", date(10, 1)),
      exam("MATH-T1-b", "MATH", "T1", date(12, 1)),
      exam("LIT-T1", "LIT", "T1", date(11, 1)),
      exam("SCI-T1", "SCI", "T1", date(11, 15)),
      exam("MATH-T2", "MATH", "T2", date(3, 1)),
      exam("LIT-T2", "LIT", "T2", date(4, 1)),
      exam("ORPHAN", "MATH", "T9", date(4, 2)),
    ],
  }
}

pub fn engine() -> Recomputer<MemoryStore> {
  Recomputer::new(Arc::new(MemoryStore::new(school())))
}

/// Write a score straight to the store and fire the trigger, the way the
/// score-entry workflow does.
pub async fn enter(
  engine: &Recomputer<MemoryStore>,
  student: &str,
  exam: &str,
  value: f64,
) {
  let score = Score::new(student.into(), exam.into(), value).unwrap();
  engine.store().put_score(score).await.unwrap();
  engine
    .on_score_changed(&StudentCode::from(student), &ExamCode::from(exam))
    .await;
}
