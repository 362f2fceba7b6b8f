//! Cascade tests against an in-memory store.

use std::sync::Arc;

use crate::{
  average::Tier,
  code::{ExamCode, SchoolYearCode, StudentCode, SubjectCode, TermCode},
  fixture::{engine, enter, school},
  memory::{AggregateSnapshot, MemoryStore},
  ranking::{Period, Population},
  score::Score,
  store::{AggregateStore, ScoreStore},
};

use super::*;

fn s(code: &str) -> StudentCode { code.into() }
fn t(code: &str) -> TermCode { code.into() }
fn y(code: &str) -> SchoolYearCode { code.into() }
fn sub(code: &str) -> SubjectCode { code.into() }

async fn term_row(
  engine: &Recomputer<MemoryStore>,
  student: &str,
  term: &str,
) -> StudentTermAverage {
  engine
    .store()
    .get_student_term_average(&s(student), &t(term))
    .await
    .unwrap()
    .expect("term row")
}

async fn year_row(
  engine: &Recomputer<MemoryStore>,
  student: &str,
) -> StudentYearlyAverage {
  engine
    .store()
    .get_student_yearly_average(&s(student), &y("Y2024"))
    .await
    .unwrap()
    .expect("yearly row")
}

// ─── Aggregators ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn subject_term_average_is_mean_of_scores() {
  let e = engine();
  enter(&e, "S01", "MATH-T1-a", 6.0).await;
  enter(&e, "S01", "MATH-T1-b", 9.0).await;

  let row = e
    .store()
    .get_subject_term_average(&s("S01"), &sub("MATH"), &t("T1"))
    .await
    .unwrap()
    .unwrap();
  assert_eq!(row.average, 7.5);
}

#[tokio::test]
async fn subject_without_scores_averages_to_zero() {
  let e = engine();
  let row = e
    .update_subject_term_average(&s("S01"), &sub("LIT"), &t("T1"))
    .await
    .unwrap();
  assert_eq!(row.average, 0.0);

  let stored = e
    .store()
    .get_subject_term_average(&s("S01"), &sub("LIT"), &t("T1"))
    .await
    .unwrap();
  assert_eq!(stored.map(|r| r.average), Some(0.0));
}

#[tokio::test]
async fn student_term_average_is_mean_of_subject_means() {
  let e = engine();
  // MATH has two exams, LIT and SCI one each; each subject still counts once.
  enter(&e, "S01", "MATH-T1-a", 6.0).await;
  enter(&e, "S01", "MATH-T1-b", 8.0).await;
  enter(&e, "S01", "LIT-T1", 5.0).await;
  enter(&e, "S01", "SCI-T1", 9.0).await;

  let row = term_row(&e, "S01", "T1").await;
  assert_eq!(row.average, 7.0);
  assert_eq!(row.tier, Tier::Good);
}

#[tokio::test]
async fn student_with_no_subject_rows_is_weak_with_zero() {
  let e = engine();
  let row = e.update_student_term_average(&s("S02"), &t("T1")).await.unwrap();
  assert_eq!(row.average, 0.0);
  assert_eq!(row.tier, Tier::Weak);
}

#[tokio::test]
async fn yearly_averages_span_all_terms_of_the_year() {
  let e = engine();
  enter(&e, "S01", "MATH-T1-a", 6.0).await;
  enter(&e, "S01", "MATH-T2", 9.0).await;
  enter(&e, "S01", "LIT-T2", 8.0).await;

  let math = e
    .store()
    .get_subject_yearly_average(&s("S01"), &sub("MATH"), &y("Y2024"))
    .await
    .unwrap()
    .unwrap();
  assert_eq!(math.average, 7.5);

  // LIT only has a T2 row, so its yearly average is that row alone.
  let lit = e
    .store()
    .get_subject_yearly_average(&s("S01"), &sub("LIT"), &y("Y2024"))
    .await
    .unwrap()
    .unwrap();
  assert_eq!(lit.average, 8.0);

  let year = year_row(&e, "S01").await;
  assert_eq!(year.average, 7.75);
  assert_eq!(year.tier, Tier::Good);
}

#[tokio::test]
async fn deleting_the_last_score_recomputes_to_zero() {
  let e = engine();
  enter(&e, "S01", "MATH-T1-a", 9.0).await;
  assert_eq!(term_row(&e, "S01", "T1").await.tier, Tier::Excellent);

  e.store()
    .delete_score(&s("S01"), &ExamCode::from("MATH-T1-a"))
    .await
    .unwrap();
  e.on_score_changed(&s("S01"), &"MATH-T1-a".into()).await;

  let row = term_row(&e, "S01", "T1").await;
  assert_eq!(row.average, 0.0);
  assert_eq!(row.tier, Tier::Weak);
}

// ─── Ranking ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn equal_averages_get_sequential_ranks_by_code() {
  let e = engine();
  enter(&e, "S02", "MATH-T1-a", 8.0).await;
  enter(&e, "S03", "MATH-T1-a", 6.0).await;
  enter(&e, "S01", "MATH-T1-a", 8.0).await;

  assert_eq!(term_row(&e, "S01", "T1").await.classroom_rank, Some(1));
  assert_eq!(term_row(&e, "S02", "T1").await.classroom_rank, Some(2));
  assert_eq!(term_row(&e, "S03", "T1").await.classroom_rank, Some(3));
}

#[tokio::test]
async fn classmates_are_reranked_when_one_score_changes() {
  let e = engine();
  enter(&e, "S01", "MATH-T1-a", 7.0).await;
  enter(&e, "S02", "MATH-T1-a", 6.0).await;
  assert_eq!(term_row(&e, "S02", "T1").await.classroom_rank, Some(2));

  enter(&e, "S02", "MATH-T1-a", 9.5).await;
  assert_eq!(term_row(&e, "S02", "T1").await.classroom_rank, Some(1));
  assert_eq!(term_row(&e, "S01", "T1").await.classroom_rank, Some(2));
  assert_eq!(year_row(&e, "S01").await.classroom_rank, Some(2));
}

#[tokio::test]
async fn classroom_rank_ignores_other_classrooms_grade_rank_does_not() {
  let e = engine();
  enter(&e, "S01", "MATH-T1-a", 7.0).await;
  enter(&e, "S02", "MATH-T1-a", 6.0).await;
  enter(&e, "S04", "MATH-T1-a", 5.0).await;

  let s01 = term_row(&e, "S01", "T1").await;
  assert_eq!((s01.classroom_rank, s01.grade_rank), (Some(1), Some(1)));

  // S04 in the other G10 classroom overtakes everyone.
  enter(&e, "S04", "MATH-T1-a", 10.0).await;

  let s01 = term_row(&e, "S01", "T1").await;
  let s02 = term_row(&e, "S02", "T1").await;
  let s04 = term_row(&e, "S04", "T1").await;
  assert_eq!(s01.classroom_rank, Some(1));
  assert_eq!(s02.classroom_rank, Some(2));
  assert_eq!(s04.classroom_rank, Some(1));
  assert_eq!(s04.grade_rank, Some(1));
  assert_eq!(s01.grade_rank, Some(2));
  assert_eq!(s02.grade_rank, Some(3));
}

#[tokio::test]
async fn other_grades_are_not_ranked_together() {
  let e = engine();
  enter(&e, "S01", "MATH-T1-a", 4.0).await;
  enter(&e, "S06", "MATH-T1-a", 9.0).await;

  assert_eq!(term_row(&e, "S01", "T1").await.grade_rank, Some(1));
  assert_eq!(term_row(&e, "S06", "T1").await.grade_rank, Some(1));
}

#[tokio::test]
async fn student_without_classroom_gets_averages_but_no_ranks() {
  let e = engine();
  enter(&e, "S07", "MATH-T1-a", 8.5).await;

  let row = term_row(&e, "S07", "T1").await;
  assert_eq!(row.average, 8.5);
  assert_eq!(row.tier, Tier::Excellent);
  assert_eq!((row.classroom_rank, row.grade_rank), (None, None));
}

#[tokio::test]
async fn ranking_an_empty_population_is_a_no_op() {
  let e = engine();
  let ranks = e
    .rank_population(&Population::Classroom("10A2".into()), &Period::Term(t("T1")))
    .await
    .unwrap();
  assert!(ranks.is_empty());
}

// ─── Failure handling ────────────────────────────────────────────────────────

#[tokio::test]
async fn unknown_exam_aborts_without_writing() {
  let e = engine();
  let before = e.store().snapshot();

  assert!(e.on_score_changed(&s("S01"), &"NOPE".into()).await.is_none());
  let err = e.recompute(&s("S01"), &"NOPE".into()).await.unwrap_err();
  assert!(matches!(err, CascadeError::ExamNotFound(_)));
  assert_eq!(e.store().snapshot(), before);
}

#[tokio::test]
async fn exam_with_unknown_term_aborts_without_writing() {
  let e = engine();
  enter(&e, "S01", "ORPHAN", 5.0).await;

  let err = e.recompute(&s("S01"), &"ORPHAN".into()).await.unwrap_err();
  assert!(matches!(err, CascadeError::TermNotFound(_)));
  assert_eq!(e.store().snapshot(), AggregateSnapshot::default());
}

// ─── Whole-cascade properties ────────────────────────────────────────────────

#[tokio::test]
async fn rerunning_the_cascade_is_idempotent() {
  let e = engine();
  enter(&e, "S01", "MATH-T1-a", 6.0).await;
  enter(&e, "S02", "LIT-T1", 8.0).await;
  let first = e.store().snapshot();

  let report = e.recompute(&s("S01"), &"MATH-T1-a".into()).await.unwrap();
  e.recompute(&s("S01"), &"MATH-T1-a".into()).await.unwrap();
  assert_eq!(e.store().snapshot(), first);
  assert_eq!(report.subject_term.average, 6.0);
}

#[tokio::test]
async fn trigger_order_does_not_change_the_result() {
  let scores = [
    ("S01", "MATH-T1-a", 7.0),
    ("S01", "LIT-T1", 5.5),
    ("S02", "MATH-T1-a", 8.0),
    ("S02", "MATH-T2", 6.0),
    ("S04", "SCI-T1", 9.0),
    ("S01", "MATH-T2", 8.0),
    ("S03", "LIT-T2", 4.0),
  ];

  let forward = engine();
  for (student, exam, value) in scores {
    enter(&forward, student, exam, value).await;
  }

  let backward = engine();
  for (student, exam, value) in scores.iter().rev().copied() {
    enter(&backward, student, exam, value).await;
  }

  // Same scores written without triggers, then rebuilt in one pass.
  let batch_store = Arc::new(MemoryStore::new(school()));
  let batch = Recomputer::new(Arc::clone(&batch_store));
  let rows = scores
    .iter()
    .map(|(st, ex, v)| Score::new((*st).into(), (*ex).into(), *v).unwrap())
    .collect();
  batch_store.put_scores(rows).await.unwrap();
  let report = batch.rebuild().await.unwrap();

  assert_eq!(forward.store().snapshot(), backward.store().snapshot());
  assert_eq!(forward.store().snapshot(), batch_store.snapshot());
  assert_eq!(report.skipped, 0);
}

#[tokio::test]
async fn one_score_touches_only_its_dependent_rows() {
  let e = engine();
  enter(&e, "S01", "MATH-T1-a", 7.0).await;
  enter(&e, "S01", "LIT-T2", 6.0).await;
  enter(&e, "S06", "MATH-T1-a", 5.0).await;
  let before = e.store().snapshot();

  enter(&e, "S01", "MATH-T1-b", 9.0).await;
  let after = e.store().snapshot();

  let math_t1 = (s("S01"), sub("MATH"), t("T1"));
  assert_ne!(before.subject_term[&math_t1], after.subject_term[&math_t1]);
  let lit_t2 = (s("S01"), sub("LIT"), t("T2"));
  assert_eq!(before.subject_term[&lit_t2], after.subject_term[&lit_t2]);

  let s01_t2 = (s("S01"), t("T2"));
  assert_eq!(before.student_term[&s01_t2], after.student_term[&s01_t2]);
  let s06_t1 = (s("S06"), t("T1"));
  assert_eq!(before.student_term[&s06_t1], after.student_term[&s06_t1]);

  let s01_t1 = (s("S01"), t("T1"));
  assert_eq!(after.student_term[&s01_t1].average, 8.0);

  let lit_year = (s("S01"), sub("LIT"), y("Y2024"));
  assert_eq!(before.subject_yearly[&lit_year], after.subject_yearly[&lit_year]);
  let math_year = (s("S01"), sub("MATH"), y("Y2024"));
  assert_eq!(after.subject_yearly[&math_year], 8.0);

  let s06_year = (s("S06"), y("Y2024"));
  assert_eq!(before.student_yearly[&s06_year], after.student_yearly[&s06_year]);
  assert_eq!(after.subject_term.len(), before.subject_term.len());
}

#[tokio::test]
async fn rebuild_resets_rows_whose_scores_vanished() {
  let e = engine();
  enter(&e, "S01", "MATH-T1-a", 9.0).await;
  // Deleted without firing the trigger: the aggregates are now stale.
  e.store()
    .delete_score(&s("S01"), &"MATH-T1-a".into())
    .await
    .unwrap();
  assert_eq!(term_row(&e, "S01", "T1").await.average, 9.0);

  e.rebuild().await.unwrap();
  assert_eq!(term_row(&e, "S01", "T1").await.average, 0.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_triggers_for_one_student_converge() {
  let e = Arc::new(engine());
  let exams = ["MATH-T1-a", "MATH-T1-b", "LIT-T1", "SCI-T1", "MATH-T2", "LIT-T2"];

  let mut handles = Vec::new();
  for (i, exam) in exams.into_iter().enumerate() {
    let e = Arc::clone(&e);
    handles.push(tokio::spawn(async move {
      enter(&e, "S01", exam, 4.0 + i as f64).await;
    }));
  }
  for handle in handles {
    handle.await.unwrap();
  }
  let concurrent = e.store().snapshot();

  e.rebuild().await.unwrap();
  assert_eq!(e.store().snapshot(), concurrent);
}
