//! Read-side queries: rankings and performance-tier listings over the
//! aggregate tables, plus raw score listings per student or classroom.

use std::{cmp::Ordering, collections::HashMap, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
  Error, ServiceError,
  average::Tier,
  code::{ClassroomCode, ExamCode, StudentCode, SubjectCode, TermCode},
  ranking::{Period, Population, Standing},
  school::Student,
  score::{ClassroomScore, ScoreDetail},
  store::{AggregateStore, ReferenceReader, ScoreStore},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingEntry {
  pub student_code: StudentCode,
  pub name:         String,
  pub average:      f64,
  pub rank:         Option<u32>,
  pub tier:         Tier,
  /// Report-card label of `tier`, e.g. `"Khá"`.
  pub tier_label:   String,
}

/// A population's standings for one period, best first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingList {
  pub population:     Population,
  pub period:         Period,
  /// Everyone enrolled in the population, with or without an average.
  pub total_students: usize,
  pub entries:        Vec<RankingEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceEntry {
  pub student_code:   StudentCode,
  pub name:           String,
  pub average:        f64,
  pub classroom_rank: Option<u32>,
  pub grade_rank:     Option<u32>,
}

/// The students of a population whose average falls in one tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceList {
  pub population:     Population,
  pub period:         Period,
  pub tier:           Tier,
  pub tier_label:     String,
  /// Number of entries.
  pub total_students: usize,
  pub entries:        Vec<PerformanceEntry>,
}

pub struct Reports<S> {
  store: Arc<S>,
}

impl<S> Clone for Reports<S> {
  fn clone(&self) -> Self { Self { store: Arc::clone(&self.store) } }
}

impl<S> Reports<S>
where
  S: ReferenceReader + ScoreStore + AggregateStore,
{
  pub fn new(store: Arc<S>) -> Self { Self { store } }

  /// Students of `population`, failing if the classroom or grade is unknown.
  pub async fn members(
    &self,
    population: &Population,
  ) -> Result<Vec<Student>, ServiceError<S::Error>> {
    match population {
      Population::Classroom(code) => {
        self
          .store
          .classroom(code)
          .await
          .map_err(ServiceError::Store)?
          .ok_or_else(|| Error::ClassroomNotFound(code.clone()))?;
        self
          .store
          .classroom_students(code)
          .await
          .map_err(ServiceError::Store)
      }
      Population::Grade(code) => {
        self
          .store
          .grade(code)
          .await
          .map_err(ServiceError::Store)?
          .ok_or_else(|| Error::GradeNotFound(code.clone()))?;
        self
          .store
          .grade_students(code)
          .await
          .map_err(ServiceError::Store)
      }
    }
  }

  /// `period` if given, otherwise the school year of the population's grade.
  pub async fn resolve_period(
    &self,
    population: &Population,
    period: Option<Period>,
  ) -> Result<Period, ServiceError<S::Error>> {
    if let Some(period) = period {
      return Ok(period);
    }
    let grade_code = match population {
      Population::Grade(code) => code.clone(),
      Population::Classroom(code) => {
        self
          .store
          .classroom(code)
          .await
          .map_err(ServiceError::Store)?
          .ok_or_else(|| Error::ClassroomNotFound(code.clone()))?
          .grade_code
      }
    };
    let grade = self
      .store
      .grade(&grade_code)
      .await
      .map_err(ServiceError::Store)?
      .ok_or(Error::GradeNotFound(grade_code))?;
    Ok(Period::SchoolYear(grade.school_year_code))
  }

  /// Standings of `population` for `period`, joined with student names.
  async fn standings(
    &self,
    population: &Population,
    period: &Period,
  ) -> Result<(usize, Vec<(Student, Standing)>), ServiceError<S::Error>> {
    let members = self.members(population).await?;
    let total = members.len();
    let mut by_code: HashMap<StudentCode, Student> =
      members.into_iter().map(|s| (s.code.clone(), s)).collect();

    let rows = self
      .store
      .standings(period)
      .await
      .map_err(ServiceError::Store)?
      .into_iter()
      .filter_map(|row| by_code.remove(&row.student_code).map(|s| (s, row)))
      .collect();
    Ok((total, rows))
  }

  pub async fn ranking(
    &self,
    population: &Population,
    period: &Period,
  ) -> Result<RankingList, ServiceError<S::Error>> {
    let scope = population.scope();
    let (total_students, rows) = self.standings(population, period).await?;

    let mut entries: Vec<RankingEntry> = rows
      .into_iter()
      .map(|(student, row)| RankingEntry {
        rank:         row.rank(scope),
        student_code: row.student_code,
        name:         student.name,
        average:      row.average,
        tier:         row.tier,
        tier_label:   row.tier.label_vi().to_owned(),
      })
      .collect();
    entries.sort_by(|a, b| {
      by_rank(a.rank, b.rank)
        .then_with(|| b.average.total_cmp(&a.average))
        .then_with(|| a.student_code.cmp(&b.student_code))
    });

    Ok(RankingList {
      population: population.clone(),
      period: period.clone(),
      total_students,
      entries,
    })
  }

  pub async fn performance(
    &self,
    population: &Population,
    period: &Period,
    tier: Tier,
  ) -> Result<PerformanceList, ServiceError<S::Error>> {
    let scope = population.scope();
    let (_, rows) = self.standings(population, period).await?;

    let mut rows: Vec<(Student, Standing)> =
      rows.into_iter().filter(|(_, row)| row.tier == tier).collect();
    rows.sort_by(|(_, a), (_, b)| {
      by_rank(a.rank(scope), b.rank(scope))
        .then_with(|| b.average.total_cmp(&a.average))
        .then_with(|| a.student_code.cmp(&b.student_code))
    });

    let entries: Vec<PerformanceEntry> = rows
      .into_iter()
      .map(|(student, row)| PerformanceEntry {
        student_code:   row.student_code,
        name:           student.name,
        average:        row.average,
        classroom_rank: row.classroom_rank,
        grade_rank:     row.grade_rank,
      })
      .collect();

    Ok(PerformanceList {
      population: population.clone(),
      period: period.clone(),
      tier,
      tier_label: tier.label_vi().to_owned(),
      total_students: entries.len(),
      entries,
    })
  }

  /// Every score of `student`, optionally narrowed to one subject and/or
  /// term.
  pub async fn student_scores(
    &self,
    student: &StudentCode,
    subject: Option<&SubjectCode>,
    term: Option<&TermCode>,
  ) -> Result<Vec<ScoreDetail>, ServiceError<S::Error>> {
    self
      .store
      .student(student)
      .await
      .map_err(ServiceError::Store)?
      .ok_or_else(|| Error::StudentNotFound(student.clone()))?;

    let mut scores = self
      .store
      .student_scores(student)
      .await
      .map_err(ServiceError::Store)?;
    scores.retain(|s| {
      subject.is_none_or(|c| *c == s.subject_code)
        && term.is_none_or(|c| *c == s.term_code)
    });
    scores.sort_by(|a, b| {
      (&a.term_code, &a.subject_code, &a.exam_code).cmp(&(
        &b.term_code,
        &b.subject_code,
        &b.exam_code,
      ))
    });
    Ok(scores)
  }

  /// Scores of the students enrolled in `classroom`, optionally narrowed to
  /// one exam and/or subject. Both `classroom` and `exam` must exist.
  pub async fn classroom_scores(
    &self,
    classroom: &ClassroomCode,
    exam: Option<&ExamCode>,
    subject: Option<&SubjectCode>,
  ) -> Result<Vec<ClassroomScore>, ServiceError<S::Error>> {
    self
      .store
      .classroom(classroom)
      .await
      .map_err(ServiceError::Store)?
      .ok_or_else(|| Error::ClassroomNotFound(classroom.clone()))?;
    if let Some(exam) = exam {
      self
        .store
        .exam(exam)
        .await
        .map_err(ServiceError::Store)?
        .ok_or_else(|| Error::ExamNotFound(exam.clone()))?;
    }

    let mut scores = self
      .store
      .classroom_scores(classroom)
      .await
      .map_err(ServiceError::Store)?;
    scores.retain(|s| {
      exam.is_none_or(|c| *c == s.exam_code)
        && subject.is_none_or(|c| *c == s.subject_code)
    });
    scores.sort_by(|a, b| {
      (&a.term_code, &a.subject_code, &a.exam_code, &a.student_code).cmp(&(
        &b.term_code,
        &b.subject_code,
        &b.exam_code,
        &b.student_code,
      ))
    });
    Ok(scores)
  }
}

/// Ranked rows first, ascending; unranked rows last.
fn by_rank(a: Option<u32>, b: Option<u32>) -> Ordering {
  match (a, b) {
    (Some(a), Some(b)) => a.cmp(&b),
    (Some(_), None) => Ordering::Less,
    (None, Some(_)) => Ordering::Greater,
    (None, None) => Ordering::Equal,
  }
}
