//! Sidecar services
//!
//! A job may declare services (databases, caches, queues). Each one runs as a
//! named container on the job network, reachable under its service name.
//! Services with a known port are polled by a helper container until they
//! accept connections, bounded by a timeout.
//!
//! The [`ServiceManager`] owns every container it started. Whatever is still
//! tracked when it is dropped gets force-removed synchronously.

use crate::config::ServiceConfig;
use crate::naming::{readiness_helper_name, service_container_name};
use convenient_docker::{ContainerDriver, DriverError, RuntimeProcess};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors raised while bringing a service up
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The catalog has no such service
    #[error("Unknown service {0}")]
    UnknownService(String),

    /// The readiness wait did not finish in time
    #[error("Service {service} did not become ready within {}s", timeout.as_secs())]
    ReadinessTimeout {
        /// Service name
        service: String,
        /// Bound that elapsed
        timeout: Duration,
    },

    /// The readiness helper gave up
    #[error("Service {service} is not reachable (wait exited with {exit_code:?})")]
    NotReady {
        /// Service name
        service: String,
        /// Exit code of the helper
        exit_code: Option<i32>,
    },

    /// The runtime refused a command
    #[error("Service {service}: {source}")]
    Driver {
        /// Service name
        service: String,
        /// Runtime error
        #[source]
        source: DriverError,
    },
}

/// How to run one service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDefinition {
    /// Image reference
    pub image: String,
    /// Port polled before the service counts as ready
    pub readiness_port: Option<u16>,
    /// Container environment
    pub environment: Vec<(String, String)>,
}

impl ServiceDefinition {
    /// Service without readiness port or environment
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            readiness_port: None,
            environment: Vec::new(),
        }
    }

    /// Poll `port` before reporting the service ready
    pub fn with_readiness_port(mut self, port: u16) -> Self {
        self.readiness_port = Some(port);
        self
    }

    /// Add an environment variable
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.push((key.into(), value.into()));
        self
    }
}

/// Read-only table of known services
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceCatalog {
    services: BTreeMap<String, ServiceDefinition>,
}

impl ServiceCatalog {
    /// Catalog without any service
    pub fn empty() -> Self {
        Self::default()
    }

    /// The services a hosted Travis worker offers
    pub fn travis() -> Self {
        Self::empty()
            .with("mongodb", ServiceDefinition::new("mongo:2.6"))
            .with(
                "mysql",
                ServiceDefinition::new("mysql:5.7")
                    .with_readiness_port(3306)
                    .with_env("MYSQL_ALLOW_EMPTY_PASSWORD", "yes")
                    .with_env("MYSQL_USER", "travis")
                    .with_env("MYSQL_PASSWORD", "\"\""),
            )
            .with("postgresql", ServiceDefinition::new("postgres:9.6").with_readiness_port(5432))
            .with("couchdb", ServiceDefinition::new("fedora/couchdb:latest"))
            .with("rabbitmq", ServiceDefinition::new("dockerfile/rabbitmq:latest"))
            .with("memcached", ServiceDefinition::new("sylvainlasnier/memcached:latest"))
            .with("redis-server", ServiceDefinition::new("redis:2.8"))
            .with("cassandra", ServiceDefinition::new("spotify/cassandra:latest"))
            .with("neo4j", ServiceDefinition::new("tpires/neo4j:latest"))
            .with("elasticsearch", ServiceDefinition::new("dockerfile/elasticsearch:latest"))
    }

    /// Add or replace a service
    pub fn with(mut self, name: impl Into<String>, definition: ServiceDefinition) -> Self {
        let _ = self.services.insert(name.into(), definition);
        self
    }

    /// Look up a service
    pub fn get(&self, name: &str) -> Option<&ServiceDefinition> {
        self.services.get(name)
    }

    /// Known service names, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }
}

struct ServiceInstance {
    container_name: String,
    process: Box<dyn RuntimeProcess>,
}

/// Starts services and owns their teardown
pub struct ServiceManager {
    driver: ContainerDriver,
    catalog: ServiceCatalog,
    config: ServiceConfig,
    /// Keyed by (project, service)
    instances: BTreeMap<(String, String), ServiceInstance>,
}

impl std::fmt::Debug for ServiceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceManager")
            .field("config", &self.config)
            .field("tracked", &self.tracked())
            .finish_non_exhaustive()
    }
}

impl ServiceManager {
    /// Manager starting services from `catalog` through `driver`
    pub fn new(driver: ContainerDriver, catalog: ServiceCatalog, config: ServiceConfig) -> Self {
        Self {
            driver,
            catalog,
            config,
            instances: BTreeMap::new(),
        }
    }

    /// (project, service) pairs currently running
    pub fn tracked(&self) -> Vec<(String, String)> {
        self.instances.keys().cloned().collect()
    }

    /// Start `name` for `project` and wait until it is reachable
    ///
    /// On any failure the service container is torn down before returning.
    pub async fn start_service(&mut self, name: &str, project: &str) -> Result<(), ServiceError> {
        let definition = self
            .catalog
            .get(name)
            .cloned()
            .ok_or_else(|| ServiceError::UnknownService(name.to_string()))?;
        let driver_error = |source| ServiceError::Driver {
            service: name.to_string(),
            source,
        };

        let container_name = service_container_name(project, name);
        debug!("Starting service {} as {}", name, container_name);
        let process = self
            .driver
            .start_service_container(
                &definition.image,
                &self.config.network_name,
                name,
                &container_name,
                &definition.environment,
            )
            .await
            .map_err(driver_error)?;
        let _ = self.instances.insert(
            (project.to_string(), name.to_string()),
            ServiceInstance {
                container_name,
                process,
            },
        );

        let Some(port) = definition.readiness_port else {
            info!("Started {} service", name);
            return Ok(());
        };

        info!("Waiting for {} to start up", name);
        if let Err(e) = self.wait_until_ready(name, project, port).await {
            self.stop_service(name, project).await;
            return Err(e);
        }
        info!("Service {} is ready", name);
        Ok(())
    }

    async fn wait_until_ready(&self, name: &str, project: &str, port: u16) -> Result<(), ServiceError> {
        let timeout = self.config.readiness_timeout;
        let command = vec![
            "-h".to_string(),
            name.to_string(),
            "-p".to_string(),
            port.to_string(),
            "-t".to_string(),
            timeout.as_secs().to_string(),
        ];

        let helper_name = readiness_helper_name(project, name);
        let mut helper = self
            .driver
            .spawn_container(&self.config.wait_image, &self.config.network_name, &helper_name, &command)
            .await
            .map_err(|source| ServiceError::Driver {
                service: name.to_string(),
                source,
            })?;

        let waited = tokio::time::timeout(timeout, helper.wait(&mut |line| debug!("{}", line.text))).await;
        match waited {
            Err(_) => {
                if let Err(e) = helper.stop().await {
                    warn!("Failed to stop readiness wait of {}: {}", name, e);
                }
                self.remove_helper(&helper_name).await;
                Err(ServiceError::ReadinessTimeout {
                    service: name.to_string(),
                    timeout,
                })
            }
            Ok(Err(source)) => {
                self.remove_helper(&helper_name).await;
                Err(ServiceError::Driver {
                    service: name.to_string(),
                    source,
                })
            }
            Ok(Ok(outcome)) if !outcome.success() => Err(ServiceError::NotReady {
                service: name.to_string(),
                exit_code: outcome.exit_code,
            }),
            Ok(Ok(_)) => Ok(()),
        }
    }

    /// Stopping the `docker run` client leaves the helper container running
    async fn remove_helper(&self, helper_name: &str) {
        if let Err(e) = self.driver.kill_and_remove(helper_name).await {
            warn!("Failed to remove container {}: {}", helper_name, e);
        }
    }

    /// Stop and remove `name` of `project`; a no-op when it is not running
    ///
    /// Failures are logged, never returned.
    pub async fn stop_service(&mut self, name: &str, project: &str) {
        let Some(mut instance) = self.instances.remove(&(project.to_string(), name.to_string())) else {
            debug!("Service {} of {} is not running", name, project);
            return;
        };

        info!("Terminating service {}", name);
        if let Err(e) = instance.process.stop().await {
            warn!("Failed to stop service {}: {}", name, e);
        }
        if let Err(e) = self.driver.kill_and_remove(&instance.container_name).await {
            warn!("Failed to remove container {}: {}", instance.container_name, e);
        }
    }

    /// Stop every tracked service
    pub async fn stop_all(&mut self) {
        for (project, name) in self.tracked() {
            self.stop_service(&name, &project).await;
        }
    }

    /// Force-remove every tracked service without an async runtime
    pub fn remove_all_blocking(&mut self) {
        for ((_, service), instance) in std::mem::take(&mut self.instances) {
            warn!("Force-removing service {} left running", service);
            if let Err(e) = self.driver.kill_and_remove_blocking(&instance.container_name) {
                warn!("Failed to remove container {}: {}", instance.container_name, e);
            }
        }
    }
}

impl Drop for ServiceManager {
    fn drop(&mut self) {
        self.remove_all_blocking();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convenient_docker::fake::{Behaviour, ScriptedRunner};
    use std::sync::Arc;
    use tracing_test::traced_test;

    fn manager(timeout: Duration) -> (ServiceManager, ScriptedRunner) {
        let runner = ScriptedRunner::new();
        let driver = ContainerDriver::new("docker", Arc::new(runner.clone()));
        let config = ServiceConfig {
            readiness_timeout: timeout,
            ..ServiceConfig::default()
        };
        (ServiceManager::new(driver, ServiceCatalog::travis(), config), runner)
    }

    #[test]
    fn test_catalog() {
        let catalog = ServiceCatalog::travis();
        assert_eq!(catalog.names().count(), 10);
        assert_eq!(catalog.get("mysql").unwrap().readiness_port, Some(3306));
        assert_eq!(catalog.get("postgresql").unwrap().image, "postgres:9.6");
        assert_eq!(catalog.get("redis-server").unwrap().readiness_port, None);
        assert!(catalog.get("oracle").is_none());
    }

    #[tokio::test]
    async fn test_unknown_service() {
        let (mut manager, runner) = manager(Duration::from_secs(1));
        let err = manager.start_service("oracle", "vendor/app").await.unwrap_err();
        assert!(matches!(err, ServiceError::UnknownService(name) if name == "oracle"));
        assert!(runner.commands().is_empty());
    }

    #[tokio::test]
    async fn test_service_without_port_is_ready_immediately() {
        let (mut manager, runner) = manager(Duration::from_secs(1));
        manager.start_service("redis-server", "Vendor/App").await.unwrap();

        assert_eq!(manager.tracked(), vec![("Vendor/App".to_string(), "redis-server".to_string())]);
        let commands = runner.commands();
        assert_eq!(commands.len(), 1);
        assert!(commands[0].contains("--name vendor_app_redis_server"));
        assert!(commands[0].contains("--network-alias redis-server"));

        manager.stop_all().await;
        assert!(manager.tracked().is_empty());
    }

    #[tokio::test]
    async fn test_readiness_wait() {
        let (mut manager, runner) = manager(Duration::from_secs(60));
        manager.start_service("mysql", "vendor/app").await.unwrap();

        let commands = runner.commands();
        assert!(commands[0].contains("-e MYSQL_USER=travis"));
        assert_eq!(
            commands[1],
            "run --rm --name vendor_app_mysql_wait --network travis_ci travisci/wait:latest -h mysql -p 3306 -t 60"
        );
        assert_eq!(manager.tracked().len(), 1);
    }

    #[tokio::test]
    async fn test_readiness_timeout_tears_service_down() {
        let (mut manager, runner) = manager(Duration::from_millis(20));
        let _ = runner.on("travisci/wait", Behaviour::Hang);

        let err = manager.start_service("mysql", "vendor/app").await.unwrap_err();

        assert!(matches!(err, ServiceError::ReadinessTimeout { ref service, .. } if service == "mysql"));
        assert!(manager.tracked().is_empty());
        assert!(runner.commands().contains(&"rm --force vendor_app_mysql".to_string()));
        assert_eq!(runner.stopped().len(), 2);

        let helper_removal = runner.position("rm --force vendor_app_mysql_wait").unwrap();
        let service_removal = runner
            .commands()
            .iter()
            .position(|command| command == "rm --force vendor_app_mysql")
            .unwrap();
        assert!(helper_removal < service_removal);
    }

    #[tokio::test]
    async fn test_failed_readiness_wait() {
        let (mut manager, runner) = manager(Duration::from_secs(1));
        let _ = runner.on("travisci/wait", Behaviour::exit(1));

        let err = manager.start_service("postgresql", "vendor/app").await.unwrap_err();

        assert!(matches!(err, ServiceError::NotReady { exit_code: Some(1), .. }));
        assert!(manager.tracked().is_empty());
    }

    #[tokio::test]
    #[traced_test]
    async fn test_stop_service_is_idempotent_and_logs_failures() {
        let (mut manager, runner) = manager(Duration::from_secs(1));
        let _ = runner.on("rm --force", Behaviour::exit(1));
        manager.start_service("memcached", "vendor/app").await.unwrap();

        manager.stop_service("memcached", "vendor/app").await;
        manager.stop_service("memcached", "vendor/app").await;

        assert!(manager.tracked().is_empty());
        assert!(logs_contain("Failed to remove container vendor_app_memcached"));
        let removals = runner.commands().iter().filter(|c| c.starts_with("rm --force")).count();
        assert_eq!(removals, 1);
    }

    #[tokio::test]
    async fn test_drop_force_removes_tracked_services() {
        let (mut manager, runner) = manager(Duration::from_secs(1));
        manager.start_service("mongodb", "vendor/app").await.unwrap();
        manager.start_service("redis-server", "vendor/app").await.unwrap();

        drop(manager);

        assert_eq!(
            runner.blocking_commands(),
            vec!["rm --force vendor_app_mongodb", "rm --force vendor_app_redis_server"]
        );
    }
}
