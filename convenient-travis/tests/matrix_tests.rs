//! Build matrix expansion tests
//!
//! The fixtures mirror real-world `.travis.yml` files of PHP libraries and
//! check the exact job order, environment lines and allow-failure flags.

use convenient_travis::{ConfigError, Job, MatrixBuilder};
use serde_yaml::Value;
use std::path::Path;

fn compute(project: &str, yaml: &str) -> Vec<Job> {
    let config: Value = serde_yaml::from_str(yaml).unwrap();
    MatrixBuilder::new()
        .compute_jobs(project, Path::new("/tmp/project"), &config)
        .unwrap()
}

/// (version, env line, allowed failure) of every job
fn summary(jobs: &[Job]) -> Vec<(String, String, bool)> {
    jobs.iter()
        .map(|job| (job.version().to_string(), job.env_line(), job.is_allowed_failure()))
        .collect()
}

fn row(version: &str, env: &str, allowed: bool) -> (String, String, bool) {
    (version.to_string(), env.to_string(), allowed)
}

#[test]
fn test_consistence() {
    let jobs = compute(
        "consistence/consistence",
        r#"
language: php
php:
  - 7.0
  - 7.1
  - hhvm
  - nightly
env:
  - ""
  - 'COMPOSER_DEPENDENCIES_OPTIONS="--prefer-lowest --prefer-stable"'
matrix:
  allow_failures:
    - php: hhvm
    - php: nightly
script:
  - vendor/bin/phing
"#,
    );

    let lowest = r#"COMPOSER_DEPENDENCIES_OPTIONS="--prefer-lowest --prefer-stable""#;
    assert_eq!(
        summary(&jobs),
        vec![
            row("7.0", "", false),
            row("7.0", lowest, false),
            row("7.1", "", false),
            row("7.1", lowest, false),
            row("hhvm", "", true),
            row("hhvm", lowest, true),
            row("nightly", "", true),
            row("nightly", lowest, true),
        ]
    );
}

#[test]
fn test_kdyby_annotations() {
    let jobs = compute(
        "kdyby/annotations",
        r#"
language: php
php:
  - 5.6
  - 7.0
env:
  - NETTE=nette-2.4-dev
  - NETTE=nette-2.4
  - NETTE=nette-2.3
matrix:
  include:
    - php: 5.4
      env: NETTE=nette-2.3
    - php: 5.5
      env: NETTE=nette-2.3
    - php: 5.6
      env: NETTE=nette-2.3 COMPOSER_EXTRA_ARGS="--prefer-lowest --prefer-stable"
    - php: 7.0
      env: NETTE=nette-2.4 COVERAGE="--coverage ./coverage.xml --coverage-src ./src" TESTER_RUNTIME="phpdbg"
  allow_failures:
    - env: NETTE=nette-2.4 COVERAGE="--coverage ./coverage.xml --coverage-src ./src" TESTER_RUNTIME="phpdbg"
"#,
    );

    assert_eq!(
        summary(&jobs),
        vec![
            row("5.4", "NETTE=nette-2.3", false),
            row("5.5", "NETTE=nette-2.3", false),
            row("5.6", "NETTE=nette-2.4-dev", false),
            row("5.6", "NETTE=nette-2.4", false),
            row("5.6", "NETTE=nette-2.3", false),
            row(
                "5.6",
                r#"NETTE=nette-2.3 COMPOSER_EXTRA_ARGS="--prefer-lowest --prefer-stable""#,
                false
            ),
            row("7.0", "NETTE=nette-2.4-dev", false),
            row("7.0", "NETTE=nette-2.4", false),
            row("7.0", "NETTE=nette-2.3", false),
            row(
                "7.0",
                r#"NETTE=nette-2.4 COVERAGE="--coverage ./coverage.xml --coverage-src ./src" TESTER_RUNTIME="phpdbg""#,
                true
            ),
        ]
    );
}

#[test]
fn test_kdyby_doctrine_cache() {
    let jobs = compute(
        "kdyby/doctrine-cache",
        r#"
language: php
php:
  - 5.6
  - 7.0
  - 7.1
env:
  -
  - COMPOSER_EXTRA_ARGS="--prefer-stable"
  - COMPOSER_EXTRA_ARGS="--prefer-lowest --prefer-stable"
matrix:
  include:
    - php: 7.1
      env: COMPOSER_EXTRA_ARGS="--prefer-stable" COVERAGE="--coverage ./coverage.xml --coverage-src ./src" TESTER_RUNTIME="phpdbg"
  allow_failures:
    - env:
    - env: COMPOSER_EXTRA_ARGS="--prefer-stable" COVERAGE="--coverage ./coverage.xml --coverage-src ./src" TESTER_RUNTIME="phpdbg"
"#,
    );

    let stable = r#"COMPOSER_EXTRA_ARGS="--prefer-stable""#;
    let lowest = r#"COMPOSER_EXTRA_ARGS="--prefer-lowest --prefer-stable""#;
    assert_eq!(
        summary(&jobs),
        vec![
            row("5.6", "", true),
            row("5.6", stable, false),
            row("5.6", lowest, false),
            row("7.0", "", true),
            row("7.0", stable, false),
            row("7.0", lowest, false),
            row("7.1", "", true),
            row("7.1", stable, false),
            row("7.1", lowest, false),
            row(
                "7.1",
                r#"COMPOSER_EXTRA_ARGS="--prefer-stable" COVERAGE="--coverage ./coverage.xml --coverage-src ./src" TESTER_RUNTIME="phpdbg""#,
                true
            ),
        ]
    );
}

#[test]
fn test_kdyby_datetime_provider_env_matrix() {
    let jobs = compute(
        "kdyby/datetime-provider",
        r#"
language: php
php: 7.1
env:
  global:
    - TESTER_RUNTIME=php
  matrix:
    -
    - COMPOSER_EXTRA_ARGS="--prefer-stable"
    - COMPOSER_EXTRA_ARGS="--prefer-lowest --prefer-stable"
matrix:
  include:
    - php: 7.1
      env: COMPOSER_EXTRA_ARGS="--prefer-stable" COVERAGE="--coverage ./coverage.xml --coverage-src ./src" TESTER_RUNTIME="phpdbg"
    - php: 7.1
      env: COMPOSER_EXTRA_ARGS="--prefer-stable" PHPSTAN=1
    - php: 7.1
      env: COMPOSER_EXTRA_ARGS="--prefer-stable" CODING_STANDARD=1
  allow_failures:
    - env:
"#,
    );

    assert_eq!(
        summary(&jobs),
        vec![
            row("7.1", "", true),
            row("7.1", r#"COMPOSER_EXTRA_ARGS="--prefer-stable""#, false),
            row("7.1", r#"COMPOSER_EXTRA_ARGS="--prefer-lowest --prefer-stable""#, false),
            row(
                "7.1",
                r#"COMPOSER_EXTRA_ARGS="--prefer-stable" COVERAGE="--coverage ./coverage.xml --coverage-src ./src" TESTER_RUNTIME="phpdbg""#,
                false
            ),
            row("7.1", r#"COMPOSER_EXTRA_ARGS="--prefer-stable" PHPSTAN=1"#, false),
            row("7.1", r#"COMPOSER_EXTRA_ARGS="--prefer-stable" CODING_STANDARD=1"#, false),
        ]
    );
}

#[test]
fn test_version_by_env_grid_order() {
    let jobs = compute(
        "vendor/grid",
        r#"
php: [7.1, 7.0]
env:
  matrix:
    - ""
    - X=1
"#,
    );

    assert_eq!(
        summary(&jobs),
        vec![
            row("7.0", "", false),
            row("7.0", "X=1", false),
            row("7.1", "", false),
            row("7.1", "X=1", false),
        ]
    );
}

#[test]
fn test_exclude_version_only_removes_every_env() {
    let jobs = compute(
        "vendor/exclude",
        r#"
php: [7.0, 7.1]
env: ["", "X=1"]
matrix:
  exclude:
    - php: 7.0
"#,
    );

    assert_eq!(summary(&jobs), vec![row("7.1", "", false), row("7.1", "X=1", false)]);
}

#[test]
fn test_exclude_exact_pair() {
    let jobs = compute(
        "vendor/exclude",
        r#"
php: [7.0, 7.1]
env: ["", "X=1"]
matrix:
  exclude:
    - php: 7.0
      env: X=1
"#,
    );

    assert_eq!(
        summary(&jobs),
        vec![
            row("7.0", "", false),
            row("7.1", "", false),
            row("7.1", "X=1", false),
        ]
    );
}

#[test]
fn test_allow_failures_mirrors_exclude_matcher() {
    let jobs = compute(
        "vendor/allow",
        r#"
php: [7.0, 7.1]
env: ["", "X=1"]
matrix:
  allow_failures:
    - php: 7.0
    - php: 7.1
      env: X=1
"#,
    );

    assert_eq!(
        summary(&jobs),
        vec![
            row("7.0", "", true),
            row("7.0", "X=1", true),
            row("7.1", "", false),
            row("7.1", "X=1", true),
        ]
    );
}

#[test]
fn test_exclude_only_version_scenario() {
    let jobs = compute(
        "vendor/scenario",
        r"
php: [7.0, 7.1]
matrix:
  exclude:
    - php: 7.0
",
    );

    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].version(), "7.1");
}

#[test]
fn test_expansion_is_idempotent() {
    let yaml = r#"
php: [7.0, 7.1, nightly]
env: ["", "A=1 B=\"x y\""]
matrix:
  include:
    - php: 5.6
  allow_failures:
    - php: nightly
"#;

    let first = compute("vendor/idempotent", yaml);
    let second = compute("vendor/idempotent", yaml);

    assert_eq!(first, second);
    let ids: Vec<_> = first.iter().map(Job::id).collect();
    let mut unique = ids.clone();
    unique.sort_unstable();
    unique.dedup();
    assert_eq!(ids.len(), unique.len());
}

#[test]
fn test_include_missing_version_is_fatal() {
    let config: Value = serde_yaml::from_str(
        r"
php: [7.1]
matrix:
  include:
    - php: 7.0
    - env: A=1
",
    )
    .unwrap();

    let err = MatrixBuilder::new()
        .compute_jobs("vendor/broken", Path::new("/tmp"), &config)
        .unwrap_err();

    match err {
        ConfigError::MissingVersion { section, index, entry } => {
            assert_eq!(section, "include");
            assert_eq!(index, 1);
            assert!(entry.contains("A=1"));
        }
        other => panic!("unexpected error: {other}"),
    }
}
