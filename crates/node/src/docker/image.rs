use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

const DEFAULT_TAG: &str = "latest";

/// `repository[:tag]` reference. Registry ports (`host:5000/repo`) are not
/// mistaken for tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ImageReference {
    pub(crate) repository: String,
    pub(crate) tag: String,
}

impl FromStr for ImageReference {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(anyhow::anyhow!("Image reference must not be empty"));
        }
        if s.contains('@') {
            return Err(anyhow::anyhow!(
                "Image reference {s} is pinned to a digest, use a tag instead"
            ));
        }

        let name_start = s.rfind('/').map(|idx| idx + 1).unwrap_or(0);
        match s[name_start..].rfind(':') {
            Some(idx) => {
                let split = name_start + idx;
                let tag = &s[split + 1..];
                if tag.is_empty() {
                    return Err(anyhow::anyhow!("Image reference {s} has an empty tag"));
                }
                Ok(Self {
                    repository: s[..split].to_string(),
                    tag: tag.to_string(),
                })
            }
            None => Ok(Self {
                repository: s.to_string(),
                tag: DEFAULT_TAG.to_string(),
            }),
        }
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)
    }
}

#[derive(Debug, Deserialize)]
struct InspectedImage {
    #[serde(rename = "RepoDigests", default)]
    repo_digests: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ManifestDescriptor {
    digest: String,
}

#[derive(Debug, Deserialize)]
struct VerboseManifest {
    #[serde(rename = "Descriptor")]
    descriptor: ManifestDescriptor,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ManifestOutput {
    Single(VerboseManifest),
    List(Vec<VerboseManifest>),
}

/// `RepoDigests` of every image in `docker image inspect` output.
pub(crate) fn parse_repo_digests(json: &str) -> Result<Vec<String>, serde_json::Error> {
    let images: Vec<InspectedImage> = serde_json::from_str(json)?;
    Ok(images.into_iter().flat_map(|i| i.repo_digests).collect())
}

/// Descriptor digests of `docker manifest inspect --verbose` output, which is
/// a single object for plain manifests and an array for manifest lists.
pub(crate) fn parse_manifest_digests(json: &str) -> Result<Vec<String>, serde_json::Error> {
    let manifest: ManifestOutput = serde_json::from_str(json)?;
    Ok(match manifest {
        ManifestOutput::Single(m) => vec![m.descriptor.digest],
        ManifestOutput::List(list) => list.into_iter().map(|m| m.descriptor.digest).collect(),
    })
}

/// An image is up to date only when one of its recorded `repo@digest`
/// entries for `repository` carries one of the registry digests.
pub(crate) fn is_stale(repository: &str, local_digests: &[String], remote_digests: &[String]) -> bool {
    !local_digests.iter().any(|entry| match entry.split_once('@') {
        Some((repo, digest)) => {
            repo == repository && remote_digests.iter().any(|remote| remote == digest)
        }
        None => false,
    })
}
