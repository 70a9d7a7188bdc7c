//! Semantic version bumps and release planning.

use std::fmt;
use std::str::FromStr;

use semver::Version;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::graph::PackageGraph;

const DEFAULT_VERSION: &str = "0.1.0";

/// A plan for releasing packages with version bumps.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReleasePlan {
    /// Packages that will be version-bumped, sorted by name.
    pub packages: Vec<ReleasePackage>,
}

impl ReleasePlan {
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ReleasePackage> {
        self.packages.iter().find(|p| p.name == name)
    }
}

/// A package that will be version-bumped as part of a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleasePackage {
    pub name: String,
    /// Old version (if it existed).
    pub old_version: Option<String>,
    pub new_version: String,
    pub bump_type: BumpType,
}

/// Type of semantic version bump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BumpType {
    /// Major version bump (1.0.0 -> 2.0.0).
    Major,
    /// Minor version bump (1.0.0 -> 1.1.0).
    Minor,
    /// Patch version bump (1.0.0 -> 1.0.1).
    Patch,
}

impl fmt::Display for BumpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BumpType::Major => "major",
            BumpType::Minor => "minor",
            BumpType::Patch => "patch",
        })
    }
}

impl FromStr for BumpType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "major" => Ok(BumpType::Major),
            "minor" => Ok(BumpType::Minor),
            "patch" => Ok(BumpType::Patch),
            other => Err(Error::Release(format!(
                "Unknown release kind '{}' (expected patch, minor or major)",
                other
            ))),
        }
    }
}

/// Applies `bump_type` to `current`, treating a missing version as `0.1.0`.
pub fn bump_version(current: Option<&str>, bump_type: BumpType) -> Result<String> {
    let current = current.unwrap_or(DEFAULT_VERSION);
    let version = Version::parse(current)
        .map_err(|e| Error::Release(format!("Invalid version {}: {}", current, e)))?;

    let new_version = match bump_type {
        BumpType::Major => Version::new(version.major + 1, 0, 0),
        BumpType::Minor => Version::new(version.major, version.minor + 1, 0),
        BumpType::Patch => Version::new(version.major, version.minor, version.patch + 1),
    };

    Ok(new_version.to_string())
}

/// Plans version bumps.
///
/// Without a target every versioned package is bumped in lockstep. With a
/// target, that package receives `bump_type` and each of its transitive
/// dependents a patch bump.
///
/// # Errors
///
/// Returns an error if the target is unknown or a version is not valid semver.
pub fn plan_release(
    graph: &PackageGraph,
    bump_type: BumpType,
    target: Option<&str>,
) -> Result<ReleasePlan> {
    let mut plan = ReleasePlan::default();

    match target {
        None => {
            for package in graph.packages() {
                if let Some(version) = package.version.as_deref() {
                    plan.packages.push(ReleasePackage {
                        name: package.name.clone(),
                        old_version: Some(version.to_string()),
                        new_version: bump_version(Some(version), bump_type)?,
                        bump_type,
                    });
                }
            }
        }
        Some(target) => {
            let package = graph.get_package(target).ok_or_else(|| Error::PackageNotFound {
                name: target.to_string(),
                available: graph
                    .packages()
                    .iter()
                    .map(|p| p.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            })?;
            plan.packages.push(ReleasePackage {
                name: package.name.clone(),
                old_version: package.version.clone(),
                new_version: bump_version(package.version.as_deref(), bump_type)?,
                bump_type,
            });

            for name in graph.all_dependents(target)? {
                let Some(dependent) = graph.get_package(&name) else {
                    continue;
                };
                plan.packages.push(ReleasePackage {
                    name,
                    old_version: dependent.version.clone(),
                    new_version: bump_version(dependent.version.as_deref(), BumpType::Patch)?,
                    bump_type: BumpType::Patch,
                });
            }
        }
    }

    plan.packages.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(plan)
}
