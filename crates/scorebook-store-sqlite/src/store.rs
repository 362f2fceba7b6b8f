//! [`SqliteStore`], the SQLite implementation of the Scorebook storage
//! traits.

use std::{collections::HashSet, path::Path};

use rusqlite::OptionalExtension as _;
use tracing::debug;

use scorebook_core::{
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

use crate::{
  Result,
  encode::{
    RawExam, RawStudentAverage, RawTerm, encode_date, encode_tier,
    read_classroom, read_classroom_score, read_grade, read_score,
    read_score_detail, read_student, read_subject_term, read_subject_yearly,
  },
  error::Error,
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Scorebook store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

/// Table and period column holding student-level rows for a period.
fn student_table(period: &Period) -> (&'static str, &'static str, String) {
  match period {
    Period::Term(code) => {
      ("student_term_averages", "term_code", code.as_str().to_owned())
    }
    Period::SchoolYear(code) => (
      "student_yearly_averages",
      "school_year_code",
      code.as_str().to_owned(),
    ),
  }
}

fn rank_column(scope: RankScope) -> &'static str {
  match scope {
    RankScope::Classroom => "classroom_rank",
    RankScope::Grade => "grade_rank",
  }
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Insert or update every reference entity in `school`, in one
  /// transaction. Existing scores and aggregates are left alone.
  pub async fn load_school_data(&self, school: SchoolData) -> Result<()> {
    let counts = (
      school.students.len(),
      school.classrooms.len(),
      school.exams.len(),
    );

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        for year in &school.school_years {
          tx.execute(
            "INSERT INTO school_years (code, name) VALUES (?1, ?2)
             ON CONFLICT (code) DO UPDATE SET name = excluded.name",
            rusqlite::params![year.code.as_str(), year.name],
          )?;
        }
        for term in &school.terms {
          tx.execute(
            "INSERT INTO terms (code, name, school_year_code, start_date, end_date)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (code) DO UPDATE SET
               name = excluded.name,
               school_year_code = excluded.school_year_code,
               start_date = excluded.start_date,
               end_date = excluded.end_date",
            rusqlite::params![
              term.code.as_str(),
              term.name,
              term.school_year_code.as_str(),
              encode_date(term.start_date),
              encode_date(term.end_date),
            ],
          )?;
        }
        for grade in &school.grades {
          tx.execute(
            "INSERT INTO grades (code, name, school_year_code) VALUES (?1, ?2, ?3)
             ON CONFLICT (code) DO UPDATE SET
               name = excluded.name,
               school_year_code = excluded.school_year_code",
            rusqlite::params![
              grade.code.as_str(),
              grade.name,
              grade.school_year_code.as_str(),
            ],
          )?;
        }
        for classroom in &school.classrooms {
          tx.execute(
            "INSERT INTO classrooms (code, name, grade_code) VALUES (?1, ?2, ?3)
             ON CONFLICT (code) DO UPDATE SET
               name = excluded.name,
               grade_code = excluded.grade_code",
            rusqlite::params![
              classroom.code.as_str(),
              classroom.name,
              classroom.grade_code.as_str(),
            ],
          )?;
        }
        for student in &school.students {
          tx.execute(
            "INSERT INTO students (code, name, classroom_code) VALUES (?1, ?2, ?3)
             ON CONFLICT (code) DO UPDATE SET
               name = excluded.name,
               classroom_code = excluded.classroom_code",
            rusqlite::params![
              student.code.as_str(),
              student.name,
              student.classroom_code.as_ref().map(ClassroomCode::as_str),
            ],
          )?;
        }
        for subject in &school.subjects {
          tx.execute(
            "INSERT INTO subjects (code, name) VALUES (?1, ?2)
             ON CONFLICT (code) DO UPDATE SET name = excluded.name",
            rusqlite::params![subject.code.as_str(), subject.name],
          )?;
        }
        for exam in &school.exams {
          tx.execute(
            "INSERT INTO exams (code, subject_code, term_code, date)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (code) DO UPDATE SET
               subject_code = excluded.subject_code,
               term_code = excluded.term_code,
               date = excluded.date",
            rusqlite::params![
              exam.code.as_str(),
              exam.subject_code.as_str(),
              exam.term_code.as_str(),
              encode_date(exam.date),
            ],
          )?;
        }
        tx.commit()?;
        Ok(())
      })
      .await?;

    debug!(
      students = counts.0,
      classrooms = counts.1,
      exams = counts.2,
      "loaded school data"
    );
    Ok(())
  }

  async fn student_average(
    &self,
    student: &StudentCode,
    period: &Period,
  ) -> Result<Option<RawStudentAverage>> {
    let (table, column, period_code) = student_table(period);
    let student = student.as_str().to_owned();
    let sql = format!(
      "SELECT student_code, {column}, average, classroom_rank, grade_rank, tier
       FROM {table} WHERE student_code = ?1 AND {column} = ?2"
    );

    Ok(
      self
        .conn
        .call(move |conn| {
          Ok(
            conn
              .query_row(
                &sql,
                rusqlite::params![student, period_code],
                RawStudentAverage::read,
              )
              .optional()?,
          )
        })
        .await?,
    )
  }

  /// Upsert the average and tier of a student-level row, leaving its ranks
  /// untouched.
  async fn upsert_student_average(
    &self,
    student: &StudentCode,
    period: &Period,
    average: f64,
    tier: String,
  ) -> Result<()> {
    let (table, column, period_code) = student_table(period);
    let student = student.as_str().to_owned();
    let sql = format!(
      "INSERT INTO {table} (student_code, {column}, average, tier)
       VALUES (?1, ?2, ?3, ?4)
       ON CONFLICT (student_code, {column}) DO UPDATE SET
         average = excluded.average,
         tier = excluded.tier"
    );

    self
      .conn
      .call(move |conn| {
        conn.execute(
          &sql,
          rusqlite::params![student, period_code, average, tier],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn students_where(
    &self,
    sql: &'static str,
    code: String,
  ) -> Result<Vec<Student>> {
    Ok(
      self
        .conn
        .call(move |conn| {
          let mut stmt = conn.prepare(sql)?;
          let rows = stmt
            .query_map(rusqlite::params![code], read_student)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
          Ok(rows)
        })
        .await?,
    )
  }
}

impl Store for SqliteStore {
  type Error = Error;
}

// ─── ReferenceReader impl ────────────────────────────────────────────────────

impl ReferenceReader for SqliteStore {
  async fn student<'a>(&'a self, code: &'a StudentCode) -> Result<Option<Student>> {
    let code = code.as_str().to_owned();
    Ok(
      self
        .conn
        .call(move |conn| {
          Ok(
            conn
              .query_row(
                "SELECT code, name, classroom_code FROM students WHERE code = ?1",
                rusqlite::params![code],
                read_student,
              )
              .optional()?,
          )
        })
        .await?,
    )
  }

  async fn classroom<'a>(
    &'a self,
    code: &'a ClassroomCode,
  ) -> Result<Option<Classroom>> {
    let code = code.as_str().to_owned();
    Ok(
      self
        .conn
        .call(move |conn| {
          Ok(
            conn
              .query_row(
                "SELECT code, name, grade_code FROM classrooms WHERE code = ?1",
                rusqlite::params![code],
                read_classroom,
              )
              .optional()?,
          )
        })
        .await?,
    )
  }

  async fn grade<'a>(&'a self, code: &'a GradeCode) -> Result<Option<Grade>> {
    let code = code.as_str().to_owned();
    Ok(
      self
        .conn
        .call(move |conn| {
          Ok(
            conn
              .query_row(
                "SELECT code, name, school_year_code FROM grades WHERE code = ?1",
                rusqlite::params![code],
                read_grade,
              )
              .optional()?,
          )
        })
        .await?,
    )
  }

  async fn exam<'a>(&'a self, code: &'a ExamCode) -> Result<Option<Exam>> {
    let code = code.as_str().to_owned();
    let raw: Option<RawExam> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT code, subject_code, term_code, date FROM exams WHERE code = ?1",
              rusqlite::params![code],
              RawExam::read,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawExam::into_exam).transpose()
  }

  async fn term<'a>(&'a self, code: &'a TermCode) -> Result<Option<Term>> {
    let code = code.as_str().to_owned();
    let raw: Option<RawTerm> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT code, name, school_year_code, start_date, end_date
               FROM terms WHERE code = ?1",
              rusqlite::params![code],
              RawTerm::read,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawTerm::into_term).transpose()
  }

  async fn terms_in_year<'a>(
    &'a self,
    school_year: &'a SchoolYearCode,
  ) -> Result<Vec<Term>> {
    let year = school_year.as_str().to_owned();
    let raws: Vec<RawTerm> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT code, name, school_year_code, start_date, end_date
           FROM terms WHERE school_year_code = ?1
           ORDER BY start_date, code",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![year], RawTerm::read)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawTerm::into_term).collect()
  }

  async fn classroom_students<'a>(
    &'a self,
    classroom: &'a ClassroomCode,
  ) -> Result<Vec<Student>> {
    self
      .students_where(
        "SELECT code, name, classroom_code FROM students
         WHERE classroom_code = ?1 ORDER BY code",
        classroom.as_str().to_owned(),
      )
      .await
  }

  async fn grade_students<'a>(&'a self, grade: &'a GradeCode) -> Result<Vec<Student>> {
    self
      .students_where(
        "SELECT s.code, s.name, s.classroom_code
         FROM students s
         JOIN classrooms c ON c.code = s.classroom_code
         WHERE c.grade_code = ?1
         ORDER BY s.code",
        grade.as_str().to_owned(),
      )
      .await
  }
}

// ─── ScoreStore impl ─────────────────────────────────────────────────────────

const UPSERT_SCORE: &str = "
  INSERT INTO scores (student_code, exam_code, value) VALUES (?1, ?2, ?3)
  ON CONFLICT (student_code, exam_code) DO UPDATE SET value = excluded.value";

impl ScoreStore for SqliteStore {
  async fn get_score<'a>(
    &'a self,
    student: &'a StudentCode,
    exam: &'a ExamCode,
  ) -> Result<Option<Score>> {
    let student = student.as_str().to_owned();
    let exam = exam.as_str().to_owned();
    Ok(
      self
        .conn
        .call(move |conn| {
          Ok(
            conn
              .query_row(
                "SELECT student_code, exam_code, value FROM scores
                 WHERE student_code = ?1 AND exam_code = ?2",
                rusqlite::params![student, exam],
                read_score,
              )
              .optional()?,
          )
        })
        .await?,
    )
  }

  async fn put_score(&self, score: Score) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute(
          UPSERT_SCORE,
          rusqlite::params![
            score.student_code.as_str(),
            score.exam_code.as_str(),
            score.value,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn put_scores(&self, scores: Vec<Score>) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        {
          let mut stmt = tx.prepare(UPSERT_SCORE)?;
          for score in &scores {
            stmt.execute(rusqlite::params![
              score.student_code.as_str(),
              score.exam_code.as_str(),
              score.value,
            ])?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn delete_score<'a>(
    &'a self,
    student: &'a StudentCode,
    exam: &'a ExamCode,
  ) -> Result<Option<Score>> {
    let student = student.as_str().to_owned();
    let exam = exam.as_str().to_owned();
    Ok(
      self
        .conn
        .call(move |conn| {
          Ok(
            conn
              .query_row(
                "DELETE FROM scores WHERE student_code = ?1 AND exam_code = ?2
                 RETURNING student_code, exam_code, value",
                rusqlite::params![student, exam],
                read_score,
              )
              .optional()?,
          )
        })
        .await?,
    )
  }

  async fn subject_term_scores<'a>(
    &'a self,
    student: &'a StudentCode,
    subject: &'a SubjectCode,
    term: &'a TermCode,
  ) -> Result<Vec<f64>> {
    let student = student.as_str().to_owned();
    let subject = subject.as_str().to_owned();
    let term = term.as_str().to_owned();
    Ok(
      self
        .conn
        .call(move |conn| {
          let mut stmt = conn.prepare(
            "SELECT s.value
             FROM scores s
             JOIN exams e ON e.code = s.exam_code
             WHERE s.student_code = ?1
               AND e.subject_code = ?2
               AND e.term_code    = ?3",
          )?;
          let rows = stmt
            .query_map(rusqlite::params![student, subject, term], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<f64>>>()?;
          Ok(rows)
        })
        .await?,
    )
  }

  async fn student_scores<'a>(
    &'a self,
    student: &'a StudentCode,
  ) -> Result<Vec<ScoreDetail>> {
    let student = student.as_str().to_owned();
    Ok(
      self
        .conn
        .call(move |conn| {
          let mut stmt = conn.prepare(
            "SELECT e.code, e.subject_code, e.term_code, s.value
             FROM scores s
             JOIN exams e ON e.code = s.exam_code
             WHERE s.student_code = ?1
             ORDER BY e.date, e.code",
          )?;
          let rows = stmt
            .query_map(rusqlite::params![student], read_score_detail)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
          Ok(rows)
        })
        .await?,
    )
  }

  async fn classroom_scores<'a>(
    &'a self,
    classroom: &'a ClassroomCode,
  ) -> Result<Vec<ClassroomScore>> {
    let classroom = classroom.as_str().to_owned();
    Ok(
      self
        .conn
        .call(move |conn| {
          let mut stmt = conn.prepare(
            "SELECT st.code, st.name, e.code, e.subject_code, e.term_code,
                    s.value
             FROM scores s
             JOIN students st ON st.code = s.student_code
             JOIN exams e ON e.code = s.exam_code
             WHERE st.classroom_code = ?1
             ORDER BY e.date, e.code, st.code",
          )?;
          let rows = stmt
            .query_map(rusqlite::params![classroom], read_classroom_score)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
          Ok(rows)
        })
        .await?,
    )
  }

  async fn list_scores(&self) -> Result<Vec<Score>> {
    Ok(
      self
        .conn
        .call(|conn| {
          let mut stmt = conn.prepare(
            "SELECT student_code, exam_code, value FROM scores
             ORDER BY student_code, exam_code",
          )?;
          let rows = stmt
            .query_map([], read_score)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
          Ok(rows)
        })
        .await?,
    )
  }
}

// ─── AggregateStore impl ─────────────────────────────────────────────────────

impl AggregateStore for SqliteStore {
  // ── Subject-term ──────────────────────────────────────────────────────────

  async fn upsert_subject_term_average(&self, row: SubjectTermAverage) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO subject_term_averages
             (student_code, subject_code, term_code, average)
           VALUES (?1, ?2, ?3, ?4)
           ON CONFLICT (student_code, subject_code, term_code)
           DO UPDATE SET average = excluded.average",
          rusqlite::params![
            row.student_code.as_str(),
            row.subject_code.as_str(),
            row.term_code.as_str(),
            row.average,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_subject_term_average<'a>(
    &'a self,
    student: &'a StudentCode,
    subject: &'a SubjectCode,
    term: &'a TermCode,
  ) -> Result<Option<SubjectTermAverage>> {
    let student = student.as_str().to_owned();
    let subject = subject.as_str().to_owned();
    let term = term.as_str().to_owned();
    Ok(
      self
        .conn
        .call(move |conn| {
          Ok(
            conn
              .query_row(
                "SELECT student_code, subject_code, term_code, average
                 FROM subject_term_averages
                 WHERE student_code = ?1 AND subject_code = ?2 AND term_code = ?3",
                rusqlite::params![student, subject, term],
                read_subject_term,
              )
              .optional()?,
          )
        })
        .await?,
    )
  }

  async fn subject_term_averages<'a>(
    &'a self,
    student: &'a StudentCode,
    term: &'a TermCode,
  ) -> Result<Vec<SubjectTermAverage>> {
    let student = student.as_str().to_owned();
    let term = term.as_str().to_owned();
    Ok(
      self
        .conn
        .call(move |conn| {
          let mut stmt = conn.prepare(
            "SELECT student_code, subject_code, term_code, average
             FROM subject_term_averages
             WHERE student_code = ?1 AND term_code = ?2
             ORDER BY subject_code",
          )?;
          let rows = stmt
            .query_map(rusqlite::params![student, term], read_subject_term)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
          Ok(rows)
        })
        .await?,
    )
  }

  async fn subject_averages_in_terms<'a>(
    &'a self,
    student: &'a StudentCode,
    subject: &'a SubjectCode,
    terms: &'a [TermCode],
  ) -> Result<Vec<SubjectTermAverage>> {
    let student = student.as_str().to_owned();
    let subject = subject.as_str().to_owned();
    let wanted: HashSet<TermCode> = terms.iter().cloned().collect();

    let rows: Vec<SubjectTermAverage> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT student_code, subject_code, term_code, average
           FROM subject_term_averages
           WHERE student_code = ?1 AND subject_code = ?2
           ORDER BY term_code",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![student, subject], read_subject_term)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(
      rows
        .into_iter()
        .filter(|row| wanted.contains(&row.term_code))
        .collect(),
    )
  }

  async fn list_subject_term_averages(&self) -> Result<Vec<SubjectTermAverage>> {
    Ok(
      self
        .conn
        .call(|conn| {
          let mut stmt = conn.prepare(
            "SELECT student_code, subject_code, term_code, average
             FROM subject_term_averages
             ORDER BY student_code, subject_code, term_code",
          )?;
          let rows = stmt
            .query_map([], read_subject_term)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
          Ok(rows)
        })
        .await?,
    )
  }

  // ── Student-term ──────────────────────────────────────────────────────────

  async fn upsert_student_term_average(&self, row: StudentTermAverage) -> Result<()> {
    self
      .upsert_student_average(
        &row.student_code,
        &Period::Term(row.term_code.clone()),
        row.average,
        encode_tier(row.tier),
      )
      .await
  }

  async fn get_student_term_average<'a>(
    &'a self,
    student: &'a StudentCode,
    term: &'a TermCode,
  ) -> Result<Option<StudentTermAverage>> {
    self
      .student_average(student, &Period::Term(term.clone()))
      .await?
      .map(RawStudentAverage::into_term_average)
      .transpose()
  }

  // ── Subject-yearly ────────────────────────────────────────────────────────

  async fn upsert_subject_yearly_average(
    &self,
    row: SubjectYearlyAverage,
  ) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO subject_yearly_averages
             (student_code, subject_code, school_year_code, average)
           VALUES (?1, ?2, ?3, ?4)
           ON CONFLICT (student_code, subject_code, school_year_code)
           DO UPDATE SET average = excluded.average",
          rusqlite::params![
            row.student_code.as_str(),
            row.subject_code.as_str(),
            row.school_year_code.as_str(),
            row.average,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_subject_yearly_average<'a>(
    &'a self,
    student: &'a StudentCode,
    subject: &'a SubjectCode,
    school_year: &'a SchoolYearCode,
  ) -> Result<Option<SubjectYearlyAverage>> {
    let student = student.as_str().to_owned();
    let subject = subject.as_str().to_owned();
    let year = school_year.as_str().to_owned();
    Ok(
      self
        .conn
        .call(move |conn| {
          Ok(
            conn
              .query_row(
                "SELECT student_code, subject_code, school_year_code, average
                 FROM subject_yearly_averages
                 WHERE student_code = ?1
                   AND subject_code = ?2
                   AND school_year_code = ?3",
                rusqlite::params![student, subject, year],
                read_subject_yearly,
              )
              .optional()?,
          )
        })
        .await?,
    )
  }

  async fn subject_yearly_averages<'a>(
    &'a self,
    student: &'a StudentCode,
    school_year: &'a SchoolYearCode,
  ) -> Result<Vec<SubjectYearlyAverage>> {
    let student = student.as_str().to_owned();
    let year = school_year.as_str().to_owned();
    Ok(
      self
        .conn
        .call(move |conn| {
          let mut stmt = conn.prepare(
            "SELECT student_code, subject_code, school_year_code, average
             FROM subject_yearly_averages
             WHERE student_code = ?1 AND school_year_code = ?2
             ORDER BY subject_code",
          )?;
          let rows = stmt
            .query_map(rusqlite::params![student, year], read_subject_yearly)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
          Ok(rows)
        })
        .await?,
    )
  }

  // ── Student-yearly ────────────────────────────────────────────────────────

  async fn upsert_student_yearly_average(
    &self,
    row: StudentYearlyAverage,
  ) -> Result<()> {
    self
      .upsert_student_average(
        &row.student_code,
        &Period::SchoolYear(row.school_year_code.clone()),
        row.average,
        encode_tier(row.tier),
      )
      .await
  }

  async fn get_student_yearly_average<'a>(
    &'a self,
    student: &'a StudentCode,
    school_year: &'a SchoolYearCode,
  ) -> Result<Option<StudentYearlyAverage>> {
    self
      .student_average(student, &Period::SchoolYear(school_year.clone()))
      .await?
      .map(RawStudentAverage::into_yearly_average)
      .transpose()
  }

  // ── Ranking ───────────────────────────────────────────────────────────────

  async fn standings<'a>(&'a self, period: &'a Period) -> Result<Vec<Standing>> {
    let (table, column, period_code) = student_table(period);
    let sql = format!(
      "SELECT student_code, {column}, average, classroom_rank, grade_rank, tier
       FROM {table} WHERE {column} = ?1
       ORDER BY student_code"
    );

    let raws: Vec<RawStudentAverage> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![period_code], RawStudentAverage::read)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawStudentAverage::into_standing).collect()
  }

  async fn apply_ranking<'a>(
    &'a self,
    period: &'a Period,
    scope: RankScope,
    members: &'a [StudentCode],
  ) -> Result<Vec<RankAssignment>> {
    let (table, column, period_code) = student_table(period);
    let rank = rank_column(scope);
    let select = format!(
      "SELECT average FROM {table} WHERE student_code = ?1 AND {column} = ?2"
    );
    let update = format!(
      "UPDATE {table} SET {rank} = ?3 WHERE student_code = ?1 AND {column} = ?2"
    );
    let members: Vec<String> =
      members.iter().map(|m| m.as_str().to_owned()).collect();

    let ranks = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let ranks = {
          let mut averages = Vec::with_capacity(members.len());
          let mut stmt = tx.prepare(&select)?;
          for member in members {
            let average: Option<f64> = stmt
              .query_row(rusqlite::params![member, period_code], |row| row.get(0))
              .optional()?;
            if let Some(average) = average {
              averages.push((StudentCode::from(member), average));
            }
          }

          let ranks = dense_rank(averages);
          let mut stmt = tx.prepare(&update)?;
          for assignment in &ranks {
            stmt.execute(rusqlite::params![
              assignment.student_code.as_str(),
              period_code,
              assignment.rank,
            ])?;
          }
          ranks
        };
        tx.commit()?;
        Ok(ranks)
      })
      .await?;

    debug!(?period, ?scope, ranked = ranks.len(), "ranking written");
    Ok(ranks)
  }
}
