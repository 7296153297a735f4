//! Registry credential resolution for image pulls.
//!
//! Given an image reference and a docker-style credential map, this module
//! derives the registry host, looks up the matching credentials (falling back
//! to anonymous access) and extracts the tag or digest portion used by the
//! pull policy.
//!
//! Credentials follow the shape of one `auths` entry of a docker
//! configuration file and can be encoded into the engine's `X-Registry-Auth`
//! header form (URL-safe base64 over the canonical JSON rendering).

use std::collections::HashMap;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE;
use oci_distribution::Reference;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Registry credentials keyed by registry host, mirroring the `auths` table
/// of a docker configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DockerConfig {
    #[serde(default)]
    pub auths: HashMap<String, RegistryAuth>,
}

/// Credentials for a single registry.
///
/// All fields are optional in the file format; an all-empty value means
/// anonymous access.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryAuth {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub auth: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub identitytoken: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub registrytoken: String,
}

impl RegistryAuth {
    /// Returns true when no credential material is present.
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self == &RegistryAuth::default()
    }

    /// Encodes the credentials into the engine's `X-Registry-Auth` header
    /// value: URL-safe base64 over the canonical JSON form.
    pub fn encode(&self) -> Result<String> {
        let json = serde_json::to_vec(self)
            .map_err(|err| Error::runtime("failed to encode registry auth", err))?;
        Ok(URL_SAFE.encode(json))
    }
}

fn parse_reference(image: &str) -> Result<Reference> {
    image
        .parse()
        .map_err(|err| Error::BadInput(format!("invalid image reference {image:?}: {err}")))
}

/// Returns the registry host an image reference points at.
pub fn registry_host(image: &str) -> Result<String> {
    Ok(parse_reference(image)?.registry().to_string())
}

/// Looks up credentials for an image in an optional credential map.
///
/// Absent maps or unknown registries resolve to anonymous access.
pub fn resolve_auth(image: &str, config: Option<&DockerConfig>) -> Result<RegistryAuth> {
    let registry = registry_host(image)?;
    Ok(config
        .and_then(|c| c.auths.get(&registry))
        .cloned()
        .unwrap_or_default())
}

/// Returns the digest of an image reference, or its tag, falling back to
/// `latest` when neither is present.
///
/// When both are present the digest wins, matching how the engine resolves
/// pulls.
pub fn tag_or_digest(image: &str) -> Result<String> {
    let reference = parse_reference(image)?;
    Ok(reference
        .digest()
        .or_else(|| reference.tag())
        .unwrap_or("latest")
        .to_string())
}
