use std::fmt;

use semver::Version;

use crate::{Error, Result, ServerInfo, Topology};

/// Gates a scenario on the store it runs against.
///
/// An empty requirement set runs everywhere.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Requirements {
    min_server_version: Option<Version>,
    topologies: Vec<Topology>,
}

impl Requirements {
    /// Parse the raw fixture fields.
    ///
    /// Versions may omit trailing components (`"3.6"` means `3.6.0`).
    pub fn parse(min_server_version: Option<&str>, topologies: &[String]) -> Result<Self> {
        let min_server_version = min_server_version.map(parse_version).transpose()?;
        let topologies = topologies
            .iter()
            .map(|t| t.parse::<Topology>().map_err(Error::Config))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            min_server_version,
            topologies,
        })
    }

    pub fn with_topology(mut self, topology: Topology) -> Self {
        self.topologies.push(topology);
        self
    }

    #[inline]
    pub fn min_server_version(&self) -> Option<&Version> {
        self.min_server_version.as_ref()
    }

    #[inline]
    pub fn topologies(&self) -> &[Topology] {
        &self.topologies
    }

    /// Returns `None` if a scenario with these requirements can run on
    /// `server`, or the unmet requirement otherwise.
    pub fn unmet(&self, server: &ServerInfo) -> Option<Unmet> {
        if let Some(min) = &self.min_server_version
            && server.version < *min
        {
            return Some(Unmet::Version {
                required: min.clone(),
                actual: server.version.clone(),
            });
        }
        if !self.topologies.is_empty() && !self.topologies.contains(&server.topology) {
            return Some(Unmet::Topology {
                required: self.topologies.clone(),
                actual: server.topology,
            });
        }
        None
    }

    pub fn can_run_on(&self, server: &ServerInfo) -> bool {
        self.unmet(server).is_none()
    }
}

/// Why a scenario cannot run on a given store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unmet {
    Version { required: Version, actual: Version },
    Topology { required: Vec<Topology>, actual: Topology },
}

impl fmt::Display for Unmet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unmet::Version { required, actual } => {
                write!(f, "requires server >= {required}, found {actual}")
            }
            Unmet::Topology { required, actual } => {
                let names: Vec<String> = required.iter().map(Topology::to_string).collect();
                write!(f, "requires topology {}, found {actual}", names.join("|"))
            }
        }
    }
}

fn parse_version(raw: &str) -> Result<Version> {
    let mut parts: Vec<&str> = raw.trim().split('.').collect();
    while parts.len() < 3 {
        parts.push("0");
    }
    Version::parse(&parts.join("."))
        .map_err(|e| Error::config(format!("invalid server version '{raw}': {e}")))
}
