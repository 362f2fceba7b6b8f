//! SQL schema for the Scorebook SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Reference data. Loaded by seeding; never written by the engine.
CREATE TABLE IF NOT EXISTS school_years (
    code  TEXT PRIMARY KEY,
    name  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS terms (
    code              TEXT PRIMARY KEY,
    name              TEXT NOT NULL,
    school_year_code  TEXT NOT NULL REFERENCES school_years(code),
    start_date        TEXT NOT NULL,   -- YYYY-MM-DD
    end_date          TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS grades (
    code              TEXT PRIMARY KEY,
    name              TEXT NOT NULL,
    school_year_code  TEXT NOT NULL REFERENCES school_years(code)
);

CREATE TABLE IF NOT EXISTS classrooms (
    code        TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    grade_code  TEXT NOT NULL REFERENCES grades(code)
);

CREATE TABLE IF NOT EXISTS students (
    code            TEXT PRIMARY KEY,
    name            TEXT NOT NULL,
    classroom_code  TEXT REFERENCES classrooms(code)
);

CREATE TABLE IF NOT EXISTS subjects (
    code  TEXT PRIMARY KEY,
    name  TEXT NOT NULL
);

-- No foreign key on term_code; an exam whose term is missing is skipped
-- by the engine.
CREATE TABLE IF NOT EXISTS exams (
    code          TEXT PRIMARY KEY,
    subject_code  TEXT NOT NULL REFERENCES subjects(code),
    term_code     TEXT NOT NULL,
    date          TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS scores (
    student_code  TEXT NOT NULL REFERENCES students(code),
    exam_code     TEXT NOT NULL REFERENCES exams(code),
    value         REAL NOT NULL CHECK (value >= 0 AND value <= 10),
    PRIMARY KEY (student_code, exam_code)
);

-- Derived aggregates. Rows are keyed by code only, with no foreign keys;
-- every row can be rebuilt from scores.
CREATE TABLE IF NOT EXISTS subject_term_averages (
    student_code  TEXT NOT NULL,
    subject_code  TEXT NOT NULL,
    term_code     TEXT NOT NULL,
    average       REAL NOT NULL,
    PRIMARY KEY (student_code, subject_code, term_code)
);

CREATE TABLE IF NOT EXISTS student_term_averages (
    student_code    TEXT NOT NULL,
    term_code       TEXT NOT NULL,
    average         REAL NOT NULL,
    classroom_rank  INTEGER,
    grade_rank      INTEGER,
    tier            TEXT NOT NULL,   -- 'excellent' | 'good' | 'average' | 'weak'
    PRIMARY KEY (student_code, term_code)
);

CREATE TABLE IF NOT EXISTS subject_yearly_averages (
    student_code      TEXT NOT NULL,
    subject_code      TEXT NOT NULL,
    school_year_code  TEXT NOT NULL,
    average           REAL NOT NULL,
    PRIMARY KEY (student_code, subject_code, school_year_code)
);

CREATE TABLE IF NOT EXISTS student_yearly_averages (
    student_code      TEXT NOT NULL,
    school_year_code  TEXT NOT NULL,
    average           REAL NOT NULL,
    classroom_rank    INTEGER,
    grade_rank        INTEGER,
    tier              TEXT NOT NULL,
    PRIMARY KEY (student_code, school_year_code)
);

CREATE INDEX IF NOT EXISTS terms_year_idx         ON terms(school_year_code);
CREATE INDEX IF NOT EXISTS students_classroom_idx ON students(classroom_code);
CREATE INDEX IF NOT EXISTS classrooms_grade_idx   ON classrooms(grade_code);
CREATE INDEX IF NOT EXISTS exams_subject_term_idx ON exams(subject_code, term_code);
CREATE INDEX IF NOT EXISTS student_term_idx       ON student_term_averages(term_code);
CREATE INDEX IF NOT EXISTS student_yearly_idx     ON student_yearly_averages(school_year_code);

PRAGMA user_version = 1;
";
