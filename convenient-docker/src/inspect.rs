//! Decoding of `docker ... inspect` output

use crate::error::{DriverError, DriverResult};
use serde::Deserialize;

/// Tag reported for images without any repository tag
pub const UNTAGGED: &str = "<none>:<none>";

/// Identity of a built image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDetails {
    /// Image id as reported by the runtime
    pub id: String,
    /// First repository tag, or [`UNTAGGED`]
    pub tag: String,
}

/// Identity and address range of a network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkDetails {
    /// Network id
    pub id: String,
    /// Network name
    pub name: String,
    /// First IPAM subnet, if any
    pub subnet: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawImage {
    id: String,
    #[serde(default)]
    repo_tags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawNetwork {
    id: String,
    name: String,
    #[serde(rename = "IPAM", default)]
    ipam: Option<RawIpam>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawIpam {
    #[serde(default)]
    config: Option<Vec<RawIpamConfig>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawIpamConfig {
    #[serde(default)]
    subnet: Option<String>,
}

/// `inspect` prints a JSON array; take its single element
fn first<T: for<'de> Deserialize<'de>>(json: &str, what: &str) -> DriverResult<T> {
    let invalid = |reason: String| DriverError::InvalidInspect {
        what: what.to_string(),
        reason,
    };

    let items: Vec<T> = serde_json::from_str(json).map_err(|e| invalid(e.to_string()))?;
    items
        .into_iter()
        .next()
        .ok_or_else(|| invalid("empty result".to_string()))
}

impl ImageDetails {
    /// Decode `docker image inspect <id>` output
    pub fn from_inspect(json: &str, what: &str) -> DriverResult<Self> {
        let raw: RawImage = first(json, what)?;
        let tag = raw
            .repo_tags
            .and_then(|tags| tags.into_iter().next())
            .unwrap_or_else(|| UNTAGGED.to_string());
        Ok(Self { id: raw.id, tag })
    }
}

impl NetworkDetails {
    /// Decode `docker network inspect <id>` output
    pub fn from_inspect(json: &str, what: &str) -> DriverResult<Self> {
        let raw: RawNetwork = first(json, what)?;
        let subnet = raw
            .ipam
            .and_then(|ipam| ipam.config)
            .into_iter()
            .flatten()
            .find_map(|config| config.subnet);
        Ok(Self {
            id: raw.id,
            name: raw.name,
            subnet,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_with_tag() {
        let json = r#"[{"Id": "sha256:abc", "RepoTags": ["kdyby/redis:v1a2b3c4d", "other:latest"]}]"#;
        let image = ImageDetails::from_inspect(json, "abc").unwrap();
        assert_eq!(image.id, "sha256:abc");
        assert_eq!(image.tag, "kdyby/redis:v1a2b3c4d");
    }

    #[test]
    fn test_untagged_image() {
        let json = r#"[{"Id": "sha256:abc", "RepoTags": []}]"#;
        assert_eq!(ImageDetails::from_inspect(json, "abc").unwrap().tag, UNTAGGED);

        let json = r#"[{"Id": "sha256:abc", "RepoTags": null}]"#;
        assert_eq!(ImageDetails::from_inspect(json, "abc").unwrap().tag, UNTAGGED);
    }

    #[test]
    fn test_network_subnet() {
        let json = r#"[{
            "Name": "travis_ci",
            "Id": "f00",
            "IPAM": {"Driver": "default", "Config": [{"Subnet": "10.101.0.0/16", "Gateway": "10.101.0.1"}]}
        }]"#;
        let network = NetworkDetails::from_inspect(json, "f00").unwrap();
        assert_eq!(network.name, "travis_ci");
        assert_eq!(network.subnet.as_deref(), Some("10.101.0.0/16"));
    }

    #[test]
    fn test_network_without_config() {
        let json = r#"[{"Name": "bridge", "Id": "b", "IPAM": {"Config": null}}]"#;
        assert_eq!(NetworkDetails::from_inspect(json, "b").unwrap().subnet, None);
    }

    #[test]
    fn test_invalid_json() {
        let err = ImageDetails::from_inspect("not json", "abc").unwrap_err();
        assert!(matches!(err, DriverError::InvalidInspect { .. }));

        let err = NetworkDetails::from_inspect("[]", "gone").unwrap_err();
        assert!(err.to_string().contains("gone"));
    }
}
