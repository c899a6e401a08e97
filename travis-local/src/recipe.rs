//! Build recipe and entry point generation
//!
//! Every job is baked into its own image: the staged sources are copied to
//! `/build`, the job environment becomes `ENV` directives and the script
//! phases are written into an entry point that runs them under `set -e`.

use convenient_docker::MARKER_LABEL;
use convenient_travis::{Job, Phase};

/// Where the entry point lands inside the image
pub const ENTRYPOINT_PATH: &str = "/usr/local/bin/travis-entrypoint";

/// Paths excluded from the build context
pub const DOCKER_IGNORE: [&str; 2] = ["src/.git", "src/vendor"];

/// File name of the recipe of `job`
pub fn recipe_file_name(job: &Job) -> String {
    format!("Dockerfile.{}", job.id())
}

/// File name of the entry point of `job`
pub fn entrypoint_file_name(job: &Job) -> String {
    format!("travis-entrypoint.{}", job.id())
}

/// Directives of the image recipe, in order
pub fn recipe_directives(job: &Job, base_image: &str) -> Vec<String> {
    let mut directives = vec![
        format!("FROM {}:{}", base_image, job.version()),
        format!("LABEL {MARKER_LABEL}=\"true\""),
        "WORKDIR /build".to_string(),
        format!("ENV TRAVIS_PHP_VERSION {}", job.version()),
    ];
    directives.extend(job.env().iter().map(|(key, value)| format!("ENV {key} {value}")));
    directives.extend([
        "COPY src/ /build".to_string(),
        format!("COPY {} {ENTRYPOINT_PATH}", entrypoint_file_name(job)),
        format!("CMD [\"{ENTRYPOINT_PATH}\"]"),
        format!("LABEL {MARKER_LABEL}.project=\"{}\"", job.project_name()),
        format!("LABEL {MARKER_LABEL}.job=\"{}\"", job.id()),
    ]);
    directives
}

/// Recipe file content
pub fn render_recipe(job: &Job, base_image: &str) -> String {
    recipe_directives(job, base_image).join("\n")
}

/// `.dockerignore` content
pub fn render_docker_ignore() -> String {
    DOCKER_IGNORE.join("\n")
}

/// Single-quote `value` for bash
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Yellow `<stage> > <command>` banner printed before a command runs
fn banner(phase: Phase, command: &str) -> String {
    format!(
        r#"echo ""; printf '\033[33m%s\033[0m\n' {}; echo """#,
        shell_quote(&format!("{} > {}", phase.label(), command))
    )
}

/// Entry point script running every phase in order
pub fn render_entrypoint(job: &Job) -> String {
    let mut lines = vec!["#!/bin/bash".to_string(), "set -e".to_string(), String::new()];
    for (phase, command) in job.phases().iter() {
        lines.push(banner(phase, command));
        lines.push(format!("{command}\n"));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use convenient_travis::{Environment, ScriptPhases};

    fn job() -> Job {
        let phases = ScriptPhases::default()
            .with(Phase::Install, vec!["composer install".into()])
            .with(Phase::Script, vec!["vendor/bin/tester tests/".into(), "echo 'done'".into()]);
        Job::new(
            "kdyby/redis",
            "/src",
            "7.1",
            Environment::parse(r#"NETTE=nette-2.4 COVERAGE="--coverage x""#),
            phases,
            Vec::new(),
            Vec::new(),
        )
    }

    #[test]
    fn test_recipe_directive_order() {
        let job = job();
        let id = job.id().to_string();
        assert_eq!(
            recipe_directives(&job, "travisci/php"),
            vec![
                "FROM travisci/php:7.1".to_string(),
                "LABEL org.travis-local.build=\"true\"".to_string(),
                "WORKDIR /build".to_string(),
                "ENV TRAVIS_PHP_VERSION 7.1".to_string(),
                "ENV NETTE nette-2.4".to_string(),
                "ENV COVERAGE \"--coverage x\"".to_string(),
                "COPY src/ /build".to_string(),
                format!("COPY travis-entrypoint.{id} /usr/local/bin/travis-entrypoint"),
                "CMD [\"/usr/local/bin/travis-entrypoint\"]".to_string(),
                "LABEL org.travis-local.build.project=\"kdyby/redis\"".to_string(),
                format!("LABEL org.travis-local.build.job=\"{id}\""),
            ]
        );
        assert_eq!(recipe_file_name(&job), format!("Dockerfile.{id}"));
    }

    #[test]
    fn test_entrypoint_content() {
        let script = render_entrypoint(&job());
        let lines: Vec<&str> = script.lines().collect();

        assert_eq!(lines[0], "#!/bin/bash");
        assert_eq!(lines[1], "set -e");
        assert_eq!(
            lines[3],
            r#"echo ""; printf '\033[33m%s\033[0m\n' 'install > composer install'; echo """#
        );
        assert_eq!(lines[4], "composer install");

        let install = script.find("composer install\n").unwrap();
        let tester = script.find("vendor/bin/tester tests/\n").unwrap();
        assert!(install < tester);
        assert!(script.contains(r"'script > echo '\''done'\'''"));
        assert!(script.contains("\necho 'done'\n"));
    }

    #[test]
    fn test_empty_phases_only_have_prologue() {
        let job = Job::new(
            "a/b",
            "/src",
            "7.0",
            Environment::default(),
            ScriptPhases::default(),
            Vec::new(),
            Vec::new(),
        );
        assert_eq!(render_entrypoint(&job), "#!/bin/bash\nset -e\n");
    }

    #[test]
    fn test_docker_ignore() {
        assert_eq!(render_docker_ignore(), "src/.git\nsrc/vendor");
    }
}
