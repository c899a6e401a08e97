//! `clean` command

use colored::Colorize;
use convenient_docker::{ContainerDriver, DriverResult, ImageDetails};
use std::path::PathBuf;
use tracing::{info, warn};

/// Attempts per image before it is reported as failed
const REMOVAL_ATTEMPTS: usize = 2;

/// What a clean cycle did
#[derive(Debug, Default)]
pub struct CleanReport {
    /// Images that are gone
    pub removed: Vec<ImageDetails>,
    /// Images (id or tag) still present, with the last error
    pub failed: Vec<(String, String)>,
}

/// Remove every image built by travis-local
pub async fn execute(docker: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let driver = ContainerDriver::system(docker);
    let report = clean_images(&driver).await?;

    if report.removed.is_empty() && report.failed.is_empty() {
        println!("No images to remove");
        return Ok(());
    }

    for image in &report.removed {
        println!("{} {} ({})", "Removed".green(), image.tag, image.id);
    }
    for (image, reason) in &report.failed {
        println!("{} {}: {}", "Failed to remove".red(), image, reason);
    }
    Ok(())
}

/// Inspect and force-remove each tagged image, retrying a failed removal once
pub async fn clean_images(driver: &ContainerDriver) -> DriverResult<CleanReport> {
    let mut report = CleanReport::default();

    for id in driver.list_tagged_image_ids().await? {
        let image = match driver.inspect_image(&id).await {
            Ok(image) => image,
            Err(e) => {
                warn!("Failed to inspect image {}: {}", id, e);
                report.failed.push((id, e.to_string()));
                continue;
            }
        };

        let mut last_error = None;
        for attempt in 1..=REMOVAL_ATTEMPTS {
            match driver.remove_image(&image.id).await {
                Ok(()) => {
                    last_error = None;
                    break;
                }
                Err(e) => {
                    warn!("Removing image {} failed (attempt {}): {}", image.tag, attempt, e);
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            None => {
                info!("Removed image {} ({})", image.tag, image.id);
                report.removed.push(image);
            }
            Some(e) => report.failed.push((image.tag, e.to_string())),
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use convenient_docker::fake::{Behaviour, ScriptedRunner};
    use std::sync::Arc;

    fn driver() -> (ContainerDriver, ScriptedRunner) {
        let runner = ScriptedRunner::new();
        let driver = ContainerDriver::new("/usr/bin/docker", Arc::new(runner.clone()));
        (driver, runner)
    }

    fn inspect_json(id: &str, tag: &str) -> Behaviour {
        Behaviour::print([format!(r#"[{{"Id": "{id}", "RepoTags": ["{tag}"]}}]"#)])
    }

    #[tokio::test]
    async fn test_removes_every_tagged_image() {
        let (driver, runner) = driver();
        let _ = runner.on("images -q", Behaviour::print(["aaa", "bbb"]));
        let _ = runner.on("image inspect aaa", inspect_json("sha256:aaa", "vendor/app:v1"));
        let _ = runner.on("image inspect bbb", inspect_json("sha256:bbb", "vendor/app:v2"));

        let report = clean_images(&driver).await.unwrap();

        let tags: Vec<_> = report.removed.iter().map(|image| image.tag.as_str()).collect();
        assert_eq!(tags, vec!["vendor/app:v1", "vendor/app:v2"]);
        assert!(report.failed.is_empty());
        assert!(runner.position("rmi --force sha256:aaa").is_some());
        assert!(runner.position("rmi --force sha256:bbb").is_some());
    }

    #[tokio::test]
    async fn test_failed_removal_is_retried_once() {
        let (driver, runner) = driver();
        let _ = runner.on("images -q", Behaviour::print(["aaa"]));
        let _ = runner.on("image inspect", inspect_json("sha256:aaa", "vendor/app:v1"));
        let _ = runner.once("rmi", Behaviour::exit(1));

        let report = clean_images(&driver).await.unwrap();

        assert_eq!(report.removed.len(), 1);
        let removals = runner.commands().iter().filter(|c| c.starts_with("rmi")).count();
        assert_eq!(removals, 2);
    }

    #[tokio::test]
    async fn test_persistent_failure_is_reported() {
        let (driver, runner) = driver();
        let _ = runner.on("images -q", Behaviour::print(["aaa"]));
        let _ = runner.on("image inspect", inspect_json("sha256:aaa", "vendor/app:v1"));
        let _ = runner.on("rmi", Behaviour::exit(1));

        let report = clean_images(&driver).await.unwrap();

        assert!(report.removed.is_empty());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "vendor/app:v1");
        let removals = runner.commands().iter().filter(|c| c.starts_with("rmi")).count();
        assert_eq!(removals, REMOVAL_ATTEMPTS);
    }

    #[tokio::test]
    async fn test_nothing_to_clean() {
        let (driver, runner) = driver();
        let report = clean_images(&driver).await.unwrap();
        assert!(report.removed.is_empty());
        assert_eq!(runner.commands().len(), 1);
    }
}
