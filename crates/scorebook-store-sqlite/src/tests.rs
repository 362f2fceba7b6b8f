//! Integration tests for `SqliteStore` against an in-memory database.

use std::sync::Arc;

use chrono::NaiveDate;
use scorebook_core::{
  average::{StudentTermAverage, SubjectTermAverage, Tier},
  book::ScoreBook,
  code::{ClassroomCode, ExamCode, StudentCode, TermCode},
  engine::Recomputer,
  memory::MemoryStore,
  report::Reports,
  ranking::{Period, RankScope},
  school::{Classroom, Exam, Grade, SchoolData, SchoolYear, Student, Subject, Term},
  score::{Score, ScoreEntry},
  store::{AggregateStore, ReferenceReader, ScoreStore},
};

use crate::SqliteStore;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
  NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn school() -> SchoolData {
  let student = |code: &str, classroom: Option<&str>| Student {
    code:           code.into(),
    name:           format!("Học sinh {code}"),
    classroom_code: classroom.map(Into::into),
  };
  let exam = |code: &str, subject: &str, term: &str| Exam {
    code:         code.into(),
    subject_code: subject.into(),
    term_code:    term.into(),
    date:         date(2024, 10, 1),
  };

  SchoolData {
    school_years: vec![SchoolYear { code: "Y2024".into(), name: "2024-2025".into() }],
    terms:        vec![
      Term {
        code:             "HK1".into(),
        name:             "Học kỳ 1".into(),
        school_year_code: "Y2024".into(),
        start_date:       date(2024, 9, 5),
        end_date:         date(2025, 1, 15),
      },
      Term {
        code:             "HK2".into(),
        name:             "Học kỳ 2".into(),
        school_year_code: "Y2024".into(),
        start_date:       date(2025, 1, 20),
        end_date:         date(2025, 5, 31),
      },
    ],
    grades:       vec![Grade {
      code:             "K10".into(),
      name:             "Khối 10".into(),
      school_year_code: "Y2024".into(),
    }],
    classrooms:   vec![
      Classroom { code: "10A1".into(), name: "10A1".into(), grade_code: "K10".into() },
      Classroom { code: "10A2".into(), name: "10A2".into(), grade_code: "K10".into() },
    ],
    students:     vec![
      student("HS01", Some("10A1")),
      student("HS02", Some("10A1")),
      student("HS03", Some("10A2")),
      student("HS04", None),
    ],
    subjects:     vec![
      Subject { code: "TOAN".into(), name: "Toán".into() },
      Subject { code: "VAN".into(), name: "Ngữ văn".into() },
    ],
    exams:        vec![
      exam("TOAN-1", "TOAN", "HK1"),
      exam("TOAN-2", "TOAN", "HK1"),
      exam("VAN-1", "VAN", "HK1"),
      exam("TOAN-HK2", "TOAN", "HK2"),
      exam("LOST", "TOAN", "HK9"),
    ],
  }
}

async fn store() -> SqliteStore {
  let store = SqliteStore::open_in_memory()
    .await
    .expect("in-memory store");
  store.load_school_data(school()).await.expect("school data");
  store
}

fn score(student: &str, exam: &str, value: f64) -> Score {
  Score::new(student.into(), exam.into(), value).unwrap()
}

// ─── Reference data ──────────────────────────────────────────────────────────

#[tokio::test]
async fn reference_lookups() {
  let s = store().await;

  let student = s.student(&"HS01".into()).await.unwrap().unwrap();
  assert_eq!(student.classroom_code, Some("10A1".into()));
  assert!(s.student(&"HS99".into()).await.unwrap().is_none());

  let exam = s.exam(&"TOAN-2".into()).await.unwrap().unwrap();
  assert_eq!(exam.term_code, TermCode::from("HK1"));
  assert_eq!(exam.date, date(2024, 10, 1));

  let term = s.term(&"HK2".into()).await.unwrap().unwrap();
  assert_eq!(term.start_date, date(2025, 1, 20));

  let terms = s.terms_in_year(&"Y2024".into()).await.unwrap();
  let codes: Vec<&str> = terms.iter().map(|t| t.code.as_str()).collect();
  assert_eq!(codes, ["HK1", "HK2"]);
}

#[tokio::test]
async fn grade_membership_goes_through_classrooms() {
  let s = store().await;

  let classroom = s.classroom_students(&"10A1".into()).await.unwrap();
  assert_eq!(classroom.len(), 2);

  let grade = s.grade_students(&"K10".into()).await.unwrap();
  let codes: Vec<&str> = grade.iter().map(|s| s.code.as_str()).collect();
  assert_eq!(codes, ["HS01", "HS02", "HS03"]);
}

#[tokio::test]
async fn reloading_school_data_updates_in_place() {
  let s = store().await;
  s.put_score(score("HS01", "TOAN-1", 7.0)).await.unwrap();

  let mut school = school();
  school.students[0].name = "Nguyễn Văn A".into();
  s.load_school_data(school).await.unwrap();

  let student = s.student(&"HS01".into()).await.unwrap().unwrap();
  assert_eq!(student.name, "Nguyễn Văn A");
  assert!(s.get_score(&"HS01".into(), &"TOAN-1".into()).await.unwrap().is_some());
}

// ─── Scores ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn put_score_overwrites_the_same_pair() {
  let s = store().await;
  s.put_score(score("HS01", "TOAN-1", 4.0)).await.unwrap();
  s.put_score(score("HS01", "TOAN-1", 9.0)).await.unwrap();

  let all = s.list_scores().await.unwrap();
  assert_eq!(all, vec![score("HS01", "TOAN-1", 9.0)]);
}

#[tokio::test]
async fn delete_score_returns_the_removed_row() {
  let s = store().await;
  s.put_score(score("HS02", "VAN-1", 6.5)).await.unwrap();

  let removed = s.delete_score(&"HS02".into(), &"VAN-1".into()).await.unwrap();
  assert_eq!(removed, Some(score("HS02", "VAN-1", 6.5)));

  let again = s.delete_score(&"HS02".into(), &"VAN-1".into()).await.unwrap();
  assert!(again.is_none());
}

#[tokio::test]
async fn put_scores_is_atomic() {
  let s = store().await;
  let batch = vec![score("HS01", "TOAN-1", 5.0), score("HS99", "TOAN-1", 5.0)];

  assert!(s.put_scores(batch).await.is_err());
  assert!(s.list_scores().await.unwrap().is_empty());
}

#[tokio::test]
async fn subject_term_scores_join_exams() {
  let s = store().await;
  s.put_score(score("HS01", "TOAN-1", 6.0)).await.unwrap();
  s.put_score(score("HS01", "TOAN-2", 8.0)).await.unwrap();
  s.put_score(score("HS01", "VAN-1", 3.0)).await.unwrap();
  s.put_score(score("HS01", "TOAN-HK2", 10.0)).await.unwrap();

  let mut values = s
    .subject_term_scores(&"HS01".into(), &"TOAN".into(), &"HK1".into())
    .await
    .unwrap();
  values.sort_by(f64::total_cmp);
  assert_eq!(values, [6.0, 8.0]);

  let details = s.student_scores(&"HS01".into()).await.unwrap();
  assert_eq!(details.len(), 4);
}

#[tokio::test]
async fn classroom_scores_join_students_and_exams() {
  let s = store().await;
  s.put_score(score("HS02", "TOAN-1", 7.5)).await.unwrap();
  s.put_score(score("HS01", "TOAN-1", 6.0)).await.unwrap();
  s.put_score(score("HS01", "VAN-1", 8.0)).await.unwrap();
  s.put_score(score("HS03", "TOAN-1", 9.0)).await.unwrap();
  s.put_score(score("HS04", "TOAN-1", 4.0)).await.unwrap();

  let rows = s.classroom_scores(&"10A1".into()).await.unwrap();
  assert_eq!(rows.len(), 3);
  assert!(rows.iter().all(|r| r.student_code.as_str() != "HS03"));
  let van = rows.iter().find(|r| r.exam_code.as_str() == "VAN-1").unwrap();
  assert_eq!(van.student_name, "Học sinh HS01");
  assert_eq!(van.subject_code.as_str(), "VAN");
  assert_eq!(van.term_code.as_str(), "HK1");

  let reports = Reports::new(Arc::new(s));
  let classroom = ClassroomCode::from("10A1");
  let exam = ExamCode::from("TOAN-1");
  let sheet = reports
    .classroom_scores(&classroom, Some(&exam), None)
    .await
    .unwrap();
  let values: Vec<(&str, f64)> = sheet
    .iter()
    .map(|r| (r.student_code.as_str(), r.value))
    .collect();
  assert_eq!(values, [("HS01", 6.0), ("HS02", 7.5)]);

  let missing = reports
    .classroom_scores(&classroom, Some(&"NOPE".into()), None)
    .await
    .unwrap_err();
  assert!(matches!(
    missing,
    scorebook_core::ServiceError::Domain(scorebook_core::Error::ExamNotFound(_))
  ));
}

// ─── Aggregates ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn upserts_preserve_ranks() {
  let s = store().await;
  let student = StudentCode::from("HS01");
  let term = TermCode::from("HK1");

  s.upsert_student_term_average(StudentTermAverage::unranked(
    student.clone(),
    term.clone(),
    7.0,
  ))
  .await
  .unwrap();
  s.apply_ranking(&Period::Term(term.clone()), RankScope::Classroom, &[
    student.clone(),
  ])
  .await
  .unwrap();
  s.upsert_student_term_average(StudentTermAverage::unranked(
    student.clone(),
    term.clone(),
    8.5,
  ))
  .await
  .unwrap();

  let row = s
    .get_student_term_average(&student, &term)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(row.average, 8.5);
  assert_eq!(row.tier, Tier::Excellent);
  assert_eq!(row.classroom_rank, Some(1));
  assert_eq!(row.grade_rank, None);
}

#[tokio::test]
async fn apply_ranking_breaks_ties_by_code() {
  let s = store().await;
  let term = TermCode::from("HK1");
  for (code, average) in [("HS03", 8.0), ("HS01", 8.0), ("HS02", 6.0)] {
    s.upsert_student_term_average(StudentTermAverage::unranked(
      code.into(),
      term.clone(),
      average,
    ))
    .await
    .unwrap();
  }

  let members: Vec<StudentCode> =
    ["HS01", "HS02", "HS03", "HS04"].into_iter().map(Into::into).collect();
  let ranks = s
    .apply_ranking(&Period::Term(term), RankScope::Grade, &members)
    .await
    .unwrap();

  let got: Vec<(&str, u32)> = ranks
    .iter()
    .map(|r| (r.student_code.as_str(), r.rank))
    .collect();
  assert_eq!(got, [("HS01", 1), ("HS03", 2), ("HS02", 3)]);
}

#[tokio::test]
async fn subject_averages_in_terms_filters_terms() {
  let s = store().await;
  for (term, average) in [("HK1", 6.0), ("HK2", 8.0), ("HK3", 1.0)] {
    s.upsert_subject_term_average(SubjectTermAverage {
      student_code: "HS01".into(),
      subject_code: "TOAN".into(),
      term_code:    term.into(),
      average,
    })
    .await
    .unwrap();
  }

  let terms = [TermCode::from("HK1"), TermCode::from("HK2")];
  let rows = s
    .subject_averages_in_terms(&"HS01".into(), &"TOAN".into(), &terms)
    .await
    .unwrap();
  let averages: Vec<f64> = rows.iter().map(|r| r.average).collect();
  assert_eq!(averages, [6.0, 8.0]);
}

// ─── Engine over SQLite ──────────────────────────────────────────────────────

#[tokio::test]
async fn cascade_writes_every_level() {
  let s = Arc::new(store().await);
  let book = ScoreBook::new(Arc::clone(&s));

  book.put_score(score("HS01", "TOAN-1", 6.0)).await.unwrap();
  book.put_score(score("HS01", "TOAN-2", 8.0)).await.unwrap();
  book.put_score(score("HS01", "VAN-1", 9.0)).await.unwrap();
  book.put_score(score("HS01", "TOAN-HK2", 5.0)).await.unwrap();

  let hs01 = StudentCode::from("HS01");
  let toan = s
    .get_subject_term_average(&hs01, &"TOAN".into(), &"HK1".into())
    .await
    .unwrap()
    .unwrap();
  assert_eq!(toan.average, 7.0);

  let hk1 = s.get_student_term_average(&hs01, &"HK1".into()).await.unwrap().unwrap();
  assert_eq!(hk1.average, 8.0);
  assert_eq!(hk1.tier, Tier::Excellent);
  assert_eq!(hk1.classroom_rank, Some(1));
  assert_eq!(hk1.grade_rank, Some(1));

  let toan_year = s
    .get_subject_yearly_average(&hs01, &"TOAN".into(), &"Y2024".into())
    .await
    .unwrap()
    .unwrap();
  assert_eq!(toan_year.average, 6.0);

  let year = s
    .get_student_yearly_average(&hs01, &"Y2024".into())
    .await
    .unwrap()
    .unwrap();
  assert_eq!(year.average, 7.5);
  assert_eq!(year.tier, Tier::Good);
}

#[tokio::test]
async fn orphan_exam_keeps_the_score_but_writes_no_aggregates() {
  let s = Arc::new(store().await);
  let book = ScoreBook::new(Arc::clone(&s));

  let written = book.put_score(score("HS01", "LOST", 7.0)).await.unwrap();
  assert!(written.cascade.is_none());
  assert_eq!(s.list_scores().await.unwrap().len(), 1);
  assert!(s.list_subject_term_averages().await.unwrap().is_empty());
}

#[tokio::test]
async fn exam_sheet_entry_ranks_the_classroom() {
  let s = Arc::new(store().await);
  let book = ScoreBook::new(Arc::clone(&s));

  let sheet = book
    .enter_exam_scores(&"10A1".into(), &"TOAN-1".into(), vec![
      ScoreEntry { student_code: "HS01".into(), value: 5.0 },
      ScoreEntry { student_code: "HS02".into(), value: 7.0 },
    ])
    .await
    .unwrap();
  assert_eq!(sheet, [score("HS01", "TOAN-1", 5.0), score("HS02", "TOAN-1", 7.0)]);

  let standings = s.standings(&Period::Term("HK1".into())).await.unwrap();
  let ranks: Vec<(&str, Option<u32>)> = standings
    .iter()
    .map(|r| (r.student_code.as_str(), r.classroom_rank))
    .collect();
  assert_eq!(ranks, [("HS01", Some(2)), ("HS02", Some(1))]);
}

#[tokio::test]
async fn sqlite_and_memory_backends_agree() {
  let sqlite = Arc::new(store().await);
  let memory = Arc::new(MemoryStore::new(school()));
  let on_sqlite = ScoreBook::new(Arc::clone(&sqlite));
  let on_memory = ScoreBook::new(Arc::clone(&memory));

  let scores = [
    ("HS01", "TOAN-1", 6.0),
    ("HS02", "TOAN-1", 9.0),
    ("HS03", "VAN-1", 7.5),
    ("HS01", "VAN-1", 8.0),
    ("HS02", "TOAN-HK2", 4.0),
    ("HS03", "TOAN-2", 7.5),
  ];
  for (student, exam, value) in scores {
    on_sqlite.put_score(score(student, exam, value)).await.unwrap();
    on_memory.put_score(score(student, exam, value)).await.unwrap();
  }

  for period in [Period::Term("HK1".into()), Period::SchoolYear("Y2024".into())] {
    let left = sqlite.standings(&period).await.unwrap();
    let right = memory.standings(&period).await.unwrap();
    assert_eq!(left, right, "standings differ for {period:?}");
  }
}

#[tokio::test]
async fn rebuild_resets_rows_whose_scores_are_gone() {
  let s = Arc::new(store().await);
  let engine = Recomputer::new(Arc::clone(&s));
  let hs01 = StudentCode::from("HS01");

  s.put_score(score("HS01", "TOAN-1", 9.0)).await.unwrap();
  engine.on_score_changed(&hs01, &"TOAN-1".into()).await;

  // Bypass the trigger so the aggregates go stale.
  s.delete_score(&hs01, &"TOAN-1".into()).await.unwrap();
  let stale = s.get_student_term_average(&hs01, &"HK1".into()).await.unwrap().unwrap();
  assert_eq!(stale.average, 9.0);

  let report = engine.rebuild().await.unwrap();
  assert_eq!(report.cascades, 1);

  let fresh = s.get_student_term_average(&hs01, &"HK1".into()).await.unwrap().unwrap();
  assert_eq!(fresh.average, 0.0);
  assert_eq!(fresh.tier, Tier::Weak);
}
