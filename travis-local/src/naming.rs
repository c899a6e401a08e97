//! Names of runtime objects derived from project and job data

use regex::Regex;
use std::sync::LazyLock;

static NON_SLUG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("[^a-z0-9_]+").expect("slug pattern is valid"));

/// Lowercase, runs of anything but `[a-z0-9_]` collapsed to `_`, outer `_` trimmed
pub fn slug(value: &str) -> String {
    NON_SLUG
        .replace_all(&value.to_lowercase(), "_")
        .trim_matches('_')
        .to_string()
}

/// Container name of `service` for `project`
pub fn service_container_name(project: &str, service: &str) -> String {
    slug(&format!("{project}_{service}"))
}

/// Container name of the readiness wait of `service`
pub fn readiness_helper_name(project: &str, service: &str) -> String {
    format!("{}_wait", service_container_name(project, service))
}

/// Cache volume of one cache directory of `project`
pub fn cache_volume_name(project: &str, cache_dir: &str) -> String {
    format!("{}-cache-{}", slug(project), slug(cache_dir))
}

/// Cache directory inside the job container, `$HOME` being `/root`
pub fn cache_mount_target(cache_dir: &str) -> String {
    cache_dir.replace("$HOME", "/root")
}
