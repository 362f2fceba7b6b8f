//! [`MemoryStore`], an in-process implementation of every storage trait.
//!
//! Used by the engine and API tests, and handy for embedding the engine
//! without a database. All state sits behind one mutex, so each trait call is
//! atomic with respect to every other.

use std::{
  collections::{BTreeMap, HashSet},
  convert::Infallible,
  sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crate::{
  average::{
    StudentTermAverage, StudentYearlyAverage, SubjectTermAverage,
    SubjectYearlyAverage,
  },
  code::{
    ClassroomCode, ExamCode, GradeCode, SchoolYearCode, StudentCode,
    SubjectCode, TermCode,
  },
  ranking::{Period, RankAssignment, RankScope, Standing, dense_rank},
  school::{Classroom, Exam, Grade, SchoolData, Student, Term},
  score::{ClassroomScore, Score, ScoreDetail},
  store::{AggregateStore, ReferenceReader, ScoreStore, Store},
};

/// A copy of every derived aggregate row, for comparing store states.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateSnapshot {
  pub subject_term:   BTreeMap<(StudentCode, SubjectCode, TermCode), f64>,
  pub student_term:   BTreeMap<(StudentCode, TermCode), StudentTermAverage>,
  pub subject_yearly: BTreeMap<(StudentCode, SubjectCode, SchoolYearCode), f64>,
  pub student_yearly: BTreeMap<(StudentCode, SchoolYearCode), StudentYearlyAverage>,
}

#[derive(Debug, Default)]
struct Inner {
  students:   BTreeMap<StudentCode, Student>,
  classrooms: BTreeMap<ClassroomCode, Classroom>,
  grades:     BTreeMap<GradeCode, Grade>,
  terms:      BTreeMap<TermCode, Term>,
  exams:      BTreeMap<ExamCode, Exam>,
  scores:     BTreeMap<(StudentCode, ExamCode), f64>,
  aggregates: AggregateSnapshot,
}

impl Inner {
  fn grade_members(&self, grade: &GradeCode) -> Vec<Student> {
    let classrooms: HashSet<&ClassroomCode> = self
      .classrooms
      .values()
      .filter(|c| &c.grade_code == grade)
      .map(|c| &c.code)
      .collect();
    self
      .students
      .values()
      .filter(|s| {
        s.classroom_code
          .as_ref()
          .is_some_and(|c| classrooms.contains(c))
      })
      .cloned()
      .collect()
  }
}

/// In-memory store. Cloning is cheap and clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
  inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
  /// A store holding `school` as its reference data and no scores.
  pub fn new(school: SchoolData) -> Self {
    let store = Self::default();
    store.load_school_data(school);
    store
  }

  /// Insert or replace reference data. School years and subjects carry no
  /// information the engine needs, so they are not retained.
  pub fn load_school_data(&self, school: SchoolData) {
    let mut inner = self.lock();
    for term in school.terms {
      inner.terms.insert(term.code.clone(), term);
    }
    for grade in school.grades {
      inner.grades.insert(grade.code.clone(), grade);
    }
    for classroom in school.classrooms {
      inner.classrooms.insert(classroom.code.clone(), classroom);
    }
    for student in school.students {
      inner.students.insert(student.code.clone(), student);
    }
    for exam in school.exams {
      inner.exams.insert(exam.code.clone(), exam);
    }
  }

  pub fn snapshot(&self) -> AggregateSnapshot { self.lock().aggregates.clone() }

  fn lock(&self) -> MutexGuard<'_, Inner> {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

impl Store for MemoryStore {
  type Error = Infallible;
}

// ─── ReferenceReader impl ────────────────────────────────────────────────────

impl ReferenceReader for MemoryStore {
  async fn student<'a>(
    &'a self,
    code: &'a StudentCode,
  ) -> Result<Option<Student>, Infallible> {
    Ok(self.lock().students.get(code).cloned())
  }

  async fn classroom<'a>(
    &'a self,
    code: &'a ClassroomCode,
  ) -> Result<Option<Classroom>, Infallible> {
    Ok(self.lock().classrooms.get(code).cloned())
  }

  async fn grade<'a>(
    &'a self,
    code: &'a GradeCode,
  ) -> Result<Option<Grade>, Infallible> {
    Ok(self.lock().grades.get(code).cloned())
  }

  async fn exam<'a>(
    &'a self,
    code: &'a ExamCode,
  ) -> Result<Option<Exam>, Infallible> {
    Ok(self.lock().exams.get(code).cloned())
  }

  async fn term<'a>(
    &'a self,
    code: &'a TermCode,
  ) -> Result<Option<Term>, Infallible> {
    Ok(self.lock().terms.get(code).cloned())
  }

  async fn terms_in_year<'a>(
    &'a self,
    school_year: &'a SchoolYearCode,
  ) -> Result<Vec<Term>, Infallible> {
    Ok(
      self
        .lock()
        .terms
        .values()
        .filter(|t| &t.school_year_code == school_year)
        .cloned()
        .collect(),
    )
  }

  async fn classroom_students<'a>(
    &'a self,
    classroom: &'a ClassroomCode,
  ) -> Result<Vec<Student>, Infallible> {
    Ok(
      self
        .lock()
        .students
        .values()
        .filter(|s| s.classroom_code.as_ref() == Some(classroom))
        .cloned()
        .collect(),
    )
  }

  async fn grade_students<'a>(
    &'a self,
    grade: &'a GradeCode,
  ) -> Result<Vec<Student>, Infallible> {
    Ok(self.lock().grade_members(grade))
  }
}

// ─── ScoreStore impl ─────────────────────────────────────────────────────────

impl ScoreStore for MemoryStore {
  async fn get_score<'a>(
    &'a self,
    student: &'a StudentCode,
    exam: &'a ExamCode,
  ) -> Result<Option<Score>, Infallible> {
    let inner = self.lock();
    Ok(
      inner
        .scores
        .get(&(student.clone(), exam.clone()))
        .map(|&value| Score {
          student_code: student.clone(),
          exam_code: exam.clone(),
          value,
        }),
    )
  }

  async fn put_score(&self, score: Score) -> Result<(), Infallible> {
    self
      .lock()
      .scores
      .insert((score.student_code, score.exam_code), score.value);
    Ok(())
  }

  async fn put_scores(&self, scores: Vec<Score>) -> Result<(), Infallible> {
    let mut inner = self.lock();
    for score in scores {
      inner
        .scores
        .insert((score.student_code, score.exam_code), score.value);
    }
    Ok(())
  }

  async fn delete_score<'a>(
    &'a self,
    student: &'a StudentCode,
    exam: &'a ExamCode,
  ) -> Result<Option<Score>, Infallible> {
    let removed = self.lock().scores.remove(&(student.clone(), exam.clone()));
    Ok(removed.map(|value| Score {
      student_code: student.clone(),
      exam_code: exam.clone(),
      value,
    }))
  }

  async fn subject_term_scores<'a>(
    &'a self,
    student: &'a StudentCode,
    subject: &'a SubjectCode,
    term: &'a TermCode,
  ) -> Result<Vec<f64>, Infallible> {
    let inner = self.lock();
    Ok(
      inner
        .scores
        .iter()
        .filter(|((s, _), _)| s == student)
        .filter(|((_, e), _)| {
          inner
            .exams
            .get(e)
            .is_some_and(|exam| {
              &exam.subject_code == subject && &exam.term_code == term
            })
        })
        .map(|(_, &value)| value)
        .collect(),
    )
  }

  async fn student_scores<'a>(
    &'a self,
    student: &'a StudentCode,
  ) -> Result<Vec<ScoreDetail>, Infallible> {
    let inner = self.lock();
    Ok(
      inner
        .scores
        .iter()
        .filter(|((s, _), _)| s == student)
        .filter_map(|((_, e), &value)| {
          inner.exams.get(e).map(|exam| ScoreDetail {
            exam_code: exam.code.clone(),
            subject_code: exam.subject_code.clone(),
            term_code: exam.term_code.clone(),
            value,
          })
        })
        .collect(),
    )
  }

  async fn classroom_scores<'a>(
    &'a self,
    classroom: &'a ClassroomCode,
  ) -> Result<Vec<ClassroomScore>, Infallible> {
    let inner = self.lock();
    Ok(
      inner
        .scores
        .iter()
        .filter_map(|((s, e), &value)| {
          let student = inner
            .students
            .get(s)
            .filter(|st| st.classroom_code.as_ref() == Some(classroom))?;
          let exam = inner.exams.get(e)?;
          Some(ClassroomScore {
            student_code: student.code.clone(),
            student_name: student.name.clone(),
            exam_code: exam.code.clone(),
            subject_code: exam.subject_code.clone(),
            term_code: exam.term_code.clone(),
            value,
          })
        })
        .collect(),
    )
  }

  async fn list_scores(&self) -> Result<Vec<Score>, Infallible> {
    Ok(
      self
        .lock()
        .scores
        .iter()
        .map(|((student_code, exam_code), &value)| Score {
          student_code: student_code.clone(),
          exam_code: exam_code.clone(),
          value,
        })
        .collect(),
    )
  }
}

// ─── AggregateStore impl ─────────────────────────────────────────────────────

impl AggregateStore for MemoryStore {
  async fn upsert_subject_term_average(
    &self,
    row: SubjectTermAverage,
  ) -> Result<(), Infallible> {
    self.lock().aggregates.subject_term.insert(
      (row.student_code, row.subject_code, row.term_code),
      row.average,
    );
    Ok(())
  }

  async fn get_subject_term_average<'a>(
    &'a self,
    student: &'a StudentCode,
    subject: &'a SubjectCode,
    term: &'a TermCode,
  ) -> Result<Option<SubjectTermAverage>, Infallible> {
    let key = (student.clone(), subject.clone(), term.clone());
    let average = self.lock().aggregates.subject_term.get(&key).copied();
    Ok(average.map(|average| SubjectTermAverage {
      student_code: key.0,
      subject_code: key.1,
      term_code: key.2,
      average,
    }))
  }

  async fn subject_term_averages<'a>(
    &'a self,
    student: &'a StudentCode,
    term: &'a TermCode,
  ) -> Result<Vec<SubjectTermAverage>, Infallible> {
    Ok(
      self
        .lock()
        .aggregates
        .subject_term
        .iter()
        .filter(|((s, _, t), _)| s == student && t == term)
        .map(|((s, sub, t), &average)| SubjectTermAverage {
          student_code: s.clone(),
          subject_code: sub.clone(),
          term_code: t.clone(),
          average,
        })
        .collect(),
    )
  }

  async fn subject_averages_in_terms<'a>(
    &'a self,
    student: &'a StudentCode,
    subject: &'a SubjectCode,
    terms: &'a [TermCode],
  ) -> Result<Vec<SubjectTermAverage>, Infallible> {
    Ok(
      self
        .lock()
        .aggregates
        .subject_term
        .iter()
        .filter(|((s, sub, t), _)| {
          s == student && sub == subject && terms.contains(t)
        })
        .map(|((s, sub, t), &average)| SubjectTermAverage {
          student_code: s.clone(),
          subject_code: sub.clone(),
          term_code: t.clone(),
          average,
        })
        .collect(),
    )
  }

  async fn list_subject_term_averages(
    &self,
  ) -> Result<Vec<SubjectTermAverage>, Infallible> {
    Ok(
      self
        .lock()
        .aggregates
        .subject_term
        .iter()
        .map(|((s, sub, t), &average)| SubjectTermAverage {
          student_code: s.clone(),
          subject_code: sub.clone(),
          term_code: t.clone(),
          average,
        })
        .collect(),
    )
  }

  async fn upsert_student_term_average(
    &self,
    row: StudentTermAverage,
  ) -> Result<(), Infallible> {
    let mut inner = self.lock();
    let key = (row.student_code.clone(), row.term_code.clone());
    match inner.aggregates.student_term.get_mut(&key) {
      Some(existing) => {
        existing.average = row.average;
        existing.tier = row.tier;
      }
      None => {
        inner.aggregates.student_term.insert(key, row);
      }
    }
    Ok(())
  }

  async fn get_student_term_average<'a>(
    &'a self,
    student: &'a StudentCode,
    term: &'a TermCode,
  ) -> Result<Option<StudentTermAverage>, Infallible> {
    Ok(
      self
        .lock()
        .aggregates
        .student_term
        .get(&(student.clone(), term.clone()))
        .cloned(),
    )
  }

  async fn upsert_subject_yearly_average(
    &self,
    row: SubjectYearlyAverage,
  ) -> Result<(), Infallible> {
    self.lock().aggregates.subject_yearly.insert(
      (row.student_code, row.subject_code, row.school_year_code),
      row.average,
    );
    Ok(())
  }

  async fn get_subject_yearly_average<'a>(
    &'a self,
    student: &'a StudentCode,
    subject: &'a SubjectCode,
    school_year: &'a SchoolYearCode,
  ) -> Result<Option<SubjectYearlyAverage>, Infallible> {
    let key = (student.clone(), subject.clone(), school_year.clone());
    let average = self.lock().aggregates.subject_yearly.get(&key).copied();
    Ok(average.map(|average| SubjectYearlyAverage {
      student_code: key.0,
      subject_code: key.1,
      school_year_code: key.2,
      average,
    }))
  }

  async fn subject_yearly_averages<'a>(
    &'a self,
    student: &'a StudentCode,
    school_year: &'a SchoolYearCode,
  ) -> Result<Vec<SubjectYearlyAverage>, Infallible> {
    Ok(
      self
        .lock()
        .aggregates
        .subject_yearly
        .iter()
        .filter(|((s, _, y), _)| s == student && y == school_year)
        .map(|((s, sub, y), &average)| SubjectYearlyAverage {
          student_code: s.clone(),
          subject_code: sub.clone(),
          school_year_code: y.clone(),
          average,
        })
        .collect(),
    )
  }

  async fn upsert_student_yearly_average(
    &self,
    row: StudentYearlyAverage,
  ) -> Result<(), Infallible> {
    let mut inner = self.lock();
    let key = (row.student_code.clone(), row.school_year_code.clone());
    match inner.aggregates.student_yearly.get_mut(&key) {
      Some(existing) => {
        existing.average = row.average;
        existing.tier = row.tier;
      }
      None => {
        inner.aggregates.student_yearly.insert(key, row);
      }
    }
    Ok(())
  }

  async fn get_student_yearly_average<'a>(
    &'a self,
    student: &'a StudentCode,
    school_year: &'a SchoolYearCode,
  ) -> Result<Option<StudentYearlyAverage>, Infallible> {
    Ok(
      self
        .lock()
        .aggregates
        .student_yearly
        .get(&(student.clone(), school_year.clone()))
        .cloned(),
    )
  }

  async fn standings<'a>(
    &'a self,
    period: &'a Period,
  ) -> Result<Vec<Standing>, Infallible> {
    let inner = self.lock();
    let rows = match period {
      Period::Term(term) => inner
        .aggregates
        .student_term
        .values()
        .filter(|row| &row.term_code == term)
        .cloned()
        .map(Standing::from)
        .collect(),
      Period::SchoolYear(year) => inner
        .aggregates
        .student_yearly
        .values()
        .filter(|row| &row.school_year_code == year)
        .cloned()
        .map(Standing::from)
        .collect(),
    };
    Ok(rows)
  }

  async fn apply_ranking<'a>(
    &'a self,
    period: &'a Period,
    scope: RankScope,
    members: &'a [StudentCode],
  ) -> Result<Vec<RankAssignment>, Infallible> {
    // The guard is held across read, sort, and write.
    let mut inner = self.lock();
    let aggregates = &mut inner.aggregates;

    let ranks = match period {
      Period::Term(term) => {
        let ranks = dense_rank(members.iter().filter_map(|m| {
          aggregates
            .student_term
            .get(&(m.clone(), term.clone()))
            .map(|row| (m.clone(), row.average))
        }));
        for r in &ranks {
          if let Some(row) = aggregates
            .student_term
            .get_mut(&(r.student_code.clone(), term.clone()))
          {
            match scope {
              RankScope::Classroom => row.classroom_rank = Some(r.rank),
              RankScope::Grade => row.grade_rank = Some(r.rank),
            }
          }
        }
        ranks
      }
      Period::SchoolYear(year) => {
        let ranks = dense_rank(members.iter().filter_map(|m| {
          aggregates
            .student_yearly
            .get(&(m.clone(), year.clone()))
            .map(|row| (m.clone(), row.average))
        }));
        for r in &ranks {
          if let Some(row) = aggregates
            .student_yearly
            .get_mut(&(r.student_code.clone(), year.clone()))
          {
            match scope {
              RankScope::Classroom => row.classroom_rank = Some(r.rank),
              RankScope::Grade => row.grade_rank = Some(r.rank),
            }
          }
        }
        ranks
      }
    };
    Ok(ranks)
  }
}
