use serde::de::Visitor;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::*;

/// Suffix appended to every per-target directory. It keeps a target's directory from ever being
/// mistaken for a package directory with the same name.
pub const TARGET_DIR_SUFFIX: &str = "__";

/// An immutable identifier for a build rule: a namespace path, a short name, and an optional set
/// of flavors.
///
/// Written as `//base/path:short_name#flavor1,flavor2`. Flavors are always kept (and printed)
/// sorted, so `//a:b#y,x` and `//a:b#x,y` are the same target.
///
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BuildTarget {
    base_path: String,
    short_name: String,
    flavors: BTreeSet<String>,
}

impl BuildTarget {
    pub fn new<B, S>(base_path: B, short_name: S) -> Result<Self, TargetError>
    where
        B: Into<String>,
        S: Into<String>,
    {
        let base_path = base_path.into();
        let short_name = short_name.into();

        for component in base_path.split('/').filter(|_| !base_path.is_empty()) {
            validate_base_component(&base_path, component)?;
        }
        validate_short_name(&short_name)?;

        Ok(Self {
            base_path,
            short_name,
            flavors: BTreeSet::new(),
        })
    }

    pub fn with_flavors<I, F>(mut self, flavors: I) -> Result<Self, TargetError>
    where
        I: IntoIterator<Item = F>,
        F: Into<String>,
    {
        for flavor in flavors {
            let flavor = flavor.into();
            validate_flavor(&flavor)?;
            self.flavors.insert(flavor);
        }
        Ok(self)
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    pub fn flavors(&self) -> &BTreeSet<String> {
        &self.flavors
    }

    pub fn is_flavored(&self) -> bool {
        !self.flavors.is_empty()
    }

    /// The same target with no flavors.
    pub fn unflavored(&self) -> Self {
        Self {
            base_path: self.base_path.clone(),
            short_name: self.short_name.clone(),
            flavors: BTreeSet::new(),
        }
    }

    /// `short_name#flavors` without the namespace.
    pub fn short_name_with_flavors(&self) -> String {
        if self.flavors.is_empty() {
            return self.short_name.clone();
        }
        let flavors: Vec<&str> = self.flavors.iter().map(|f| f.as_str()).collect();
        format!("{}#{}", self.short_name, flavors.join(","))
    }

    pub fn full_name(&self) -> String {
        self.to_string()
    }

    /// The relative path under which this target keeps its outputs, e.g. `a/b/name#flavor__`.
    ///
    /// Short names and flavors can not contain `/`, `#` or `,`, so this mapping is injective.
    ///
    pub fn relative_dir(&self) -> PathBuf {
        let mut dir = PathBuf::new();
        for component in self.base_path.split('/').filter(|c| !c.is_empty()) {
            dir.push(component);
        }
        dir.push(format!(
            "{}{}",
            self.short_name_with_flavors(),
            TARGET_DIR_SUFFIX
        ));
        dir
    }
}

fn validate_base_component(base_path: &str, component: &str) -> Result<(), TargetError> {
    if component.is_empty() || component == "." || component == ".." {
        return Err(TargetError::InvalidBasePath {
            base_path: base_path.to_string(),
        });
    }
    if component.contains(|c| c == ':' || c == '#') {
        return Err(TargetError::InvalidBasePath {
            base_path: base_path.to_string(),
        });
    }
    Ok(())
}

fn validate_short_name(short_name: &str) -> Result<(), TargetError> {
    if short_name.is_empty()
        || short_name == "."
        || short_name == ".."
        || short_name.contains(|c| c == '/' || c == ':' || c == '#')
    {
        return Err(TargetError::InvalidShortName {
            short_name: short_name.to_string(),
        });
    }
    Ok(())
}

fn validate_flavor(flavor: &str) -> Result<(), TargetError> {
    if flavor.is_empty() || flavor.contains(|c| c == '/' || c == ':' || c == '#' || c == ',') {
        return Err(TargetError::InvalidFlavor {
            flavor: flavor.to_string(),
        });
    }
    Ok(())
}

impl fmt::Display for BuildTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "//{}:{}",
            self.base_path,
            self.short_name_with_flavors()
        )
    }
}

impl FromStr for BuildTarget {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unprefixed = s.strip_prefix("//").unwrap_or(s);

        let (base_path, name) =
            unprefixed
                .rsplit_once(':')
                .ok_or_else(|| TargetError::MissingShortName {
                    target: s.to_string(),
                })?;

        let (short_name, flavors) = match name.split_once('#') {
            Some((short_name, flavors)) => (short_name, flavors.split(',').collect()),
            None => (name, vec![]),
        };

        BuildTarget::new(base_path, short_name)?.with_flavors(flavors)
    }
}

impl TryFrom<&str> for BuildTarget {
    type Error = TargetError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl Serialize for BuildTarget {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

struct BuildTargetVisitor;

impl Visitor<'_> for BuildTargetVisitor {
    type Value = BuildTarget;

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        v.parse().map_err(E::custom)
    }

    fn expecting(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        fmt.write_str("a build target like //path/to:name#flavor")
    }
}

impl<'de> Deserialize<'de> for BuildTarget {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_str(BuildTargetVisitor)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TargetError {
    #[error("Build target {target:?} is missing a `:short_name`")]
    MissingShortName { target: String },

    #[error("Invalid base path {base_path:?}: components must be non-empty, can not be `.` or `..`, and can not contain `:` or `#`")]
    InvalidBasePath { base_path: String },

    #[error("Invalid short name {short_name:?}: it must be non-empty and can not contain `/`, `:` or `#`")]
    InvalidShortName { short_name: String },

    #[error("Invalid flavor {flavor:?}: it must be non-empty and can not contain `/`, `:`, `#` or `,`")]
    InvalidFlavor { flavor: String },
}
