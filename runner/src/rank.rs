use serde::{Deserialize, Serialize};
use std::{env, fmt};
use thiserror::Error;

/// number of accelerators per node when neither the environment nor the config say otherwise
pub const DEFAULT_DEVICES_PER_NODE: usize = 4;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RankError {
    #[error("{name} must be an integer, got {value:?}")]
    NotAnInteger { name: String, value: String },
    #[error("{name} must not be negative, got {value}")]
    Negative { name: String, value: i64 },
    #[error("{name} must be at least 1")]
    Zero { name: String },
    #[error("local index {local_index} is out of range for {devices_per_node} devices per node")]
    LocalIndexOutOfRange {
        local_index: usize,
        devices_per_node: usize,
    },
    #[error("node index {node_index} is out of range for {node_count} nodes")]
    NodeIndexOutOfRange { node_index: usize, node_count: usize },
    #[error("{node_count} nodes with {devices_per_node} devices each exceed the addressable rank range")]
    TopologyTooLarge {
        node_count: usize,
        devices_per_node: usize,
    },
}

/// Names of the environment variables set by the job launcher
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TopologyConfig {
    #[serde(default = "default_node_index_var")]
    pub node_index_var: String,
    #[serde(default = "default_local_index_var")]
    pub local_index_var: String,
    #[serde(default = "default_node_count_var")]
    pub node_count_var: String,
    #[serde(default = "default_devices_per_node_var")]
    pub devices_per_node_var: String,
    // used when `devices_per_node_var` is not set in the environment
    #[serde(default = "default_devices_per_node")]
    pub devices_per_node: usize,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            node_index_var: default_node_index_var(),
            local_index_var: default_local_index_var(),
            node_count_var: default_node_count_var(),
            devices_per_node_var: default_devices_per_node_var(),
            devices_per_node: default_devices_per_node(),
        }
    }
}

/// Position of this worker process in the (node, local device) grid
///
/// Constructed once at startup and handed to everything that needs to know
/// which part of the batch belongs to this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankIdentity {
    pub node_index: usize,
    pub local_index: usize,
    pub node_count: usize,
    pub devices_per_node: usize,
}

impl RankIdentity {
    pub fn new(
        node_index: usize,
        local_index: usize,
        node_count: usize,
        devices_per_node: usize,
    ) -> Result<Self, RankError> {
        if node_count == 0 {
            return Err(RankError::Zero {
                name: "node count".into(),
            });
        }

        if devices_per_node == 0 {
            return Err(RankError::Zero {
                name: "devices per node".into(),
            });
        }

        if local_index >= devices_per_node {
            return Err(RankError::LocalIndexOutOfRange {
                local_index,
                devices_per_node,
            });
        }

        if node_index >= node_count {
            return Err(RankError::NodeIndexOutOfRange {
                node_index,
                node_count,
            });
        }

        // node_index < node_count, so the global rank can't overflow once the world size fits
        if node_count.checked_mul(devices_per_node).is_none() {
            return Err(RankError::TopologyTooLarge {
                node_count,
                devices_per_node,
            });
        }

        Ok(Self {
            node_index,
            local_index,
            node_count,
            devices_per_node,
        })
    }

    /// read the identity from the process environment
    pub fn from_env(config: &TopologyConfig) -> Result<Self, RankError> {
        Self::from_lookup(config, |name| env::var(name).ok())
    }

    /// read the identity through `lookup`, missing or blank values fall back to their defaults
    pub fn from_lookup<F>(config: &TopologyConfig, lookup: F) -> Result<Self, RankError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str, default: usize| -> Result<usize, RankError> {
            match lookup(name) {
                Some(value) if !value.trim().is_empty() => parse_index(name, &value),
                _ => Ok(default),
            }
        };

        Self::new(
            read(&config.node_index_var, 0)?,
            read(&config.local_index_var, 0)?,
            read(&config.node_count_var, 1)?,
            read(&config.devices_per_node_var, config.devices_per_node)?,
        )
    }

    /// `node_index * devices_per_node + local_index`
    pub fn global_rank(&self) -> usize {
        self.node_index * self.devices_per_node + self.local_index
    }

    /// total number of workers over all nodes
    pub fn world_size(&self) -> usize {
        self.node_count * self.devices_per_node
    }
}

impl fmt::Display for RankIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "gpu {} of node {} (rank {}/{})",
            self.local_index,
            self.node_index,
            self.global_rank(),
            self.world_size()
        )
    }
}

fn parse_index(name: &str, value: &str) -> Result<usize, RankError> {
    let parsed = value
        .trim()
        .parse::<i64>()
        .map_err(|_| RankError::NotAnInteger {
            name: name.to_string(),
            value: value.to_string(),
        })?;

    usize::try_from(parsed).map_err(|_| RankError::Negative {
        name: name.to_string(),
        value: parsed,
    })
}

fn default_node_index_var() -> String {
    "NODE_RANK".into()
}

fn default_local_index_var() -> String {
    "PMI_LOCAL_RANK".into()
}

fn default_node_count_var() -> String {
    "NRANKS".into()
}

fn default_devices_per_node_var() -> String {
    "DEVICES_PER_NODE".into()
}

fn default_devices_per_node() -> usize {
    DEFAULT_DEVICES_PER_NODE
}

#[cfg(test)]
mod tests {
    use super::{RankError, RankIdentity, TopologyConfig, DEFAULT_DEVICES_PER_NODE};
    use std::collections::HashMap;

    fn resolve(vars: &[(&str, &str)]) -> Result<RankIdentity, RankError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();

        RankIdentity::from_lookup(&TopologyConfig::default(), |name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        let rank = resolve(&[]).unwrap();

        assert_eq!(rank, RankIdentity::new(0, 0, 1, DEFAULT_DEVICES_PER_NODE).unwrap());
        assert_eq!(rank.global_rank(), 0);
        assert_eq!(rank.world_size(), DEFAULT_DEVICES_PER_NODE);
    }

    #[test]
    fn global_rank_from_node_and_device() {
        let rank = resolve(&[("NODE_RANK", "2"), ("PMI_LOCAL_RANK", "3"), ("NRANKS", "4")]).unwrap();

        assert_eq!(rank.global_rank(), 11);
        assert_eq!(rank.world_size(), 16);
    }

    #[test]
    fn devices_per_node_override() {
        let rank = resolve(&[
            ("NODE_RANK", "1"),
            ("PMI_LOCAL_RANK", "5"),
            ("NRANKS", "2"),
            ("DEVICES_PER_NODE", "8"),
        ])
        .unwrap();

        assert_eq!(rank.global_rank(), 13);
        assert_eq!(rank.world_size(), 16);
    }

    #[test]
    fn blank_values_use_defaults() {
        let rank = resolve(&[("NODE_RANK", " "), ("NRANKS", "")]).unwrap();

        assert_eq!(rank.node_index, 0);
        assert_eq!(rank.node_count, 1);
    }

    #[test]
    fn negative_values_fail() {
        assert_eq!(
            resolve(&[("PMI_LOCAL_RANK", "-1")]),
            Err(RankError::Negative {
                name: "PMI_LOCAL_RANK".into(),
                value: -1
            })
        );
    }

    #[test]
    fn non_integer_values_fail() {
        assert!(matches!(
            resolve(&[("NRANKS", "two")]),
            Err(RankError::NotAnInteger { .. })
        ));
    }

    #[test]
    fn local_index_must_fit_on_node() {
        assert_eq!(
            resolve(&[("PMI_LOCAL_RANK", "4")]),
            Err(RankError::LocalIndexOutOfRange {
                local_index: 4,
                devices_per_node: 4
            })
        );
    }

    #[test]
    fn node_index_must_fit_in_job() {
        assert!(matches!(
            resolve(&[("NODE_RANK", "1"), ("NRANKS", "1")]),
            Err(RankError::NodeIndexOutOfRange { .. })
        ));
    }

    #[test]
    fn zero_sized_topology_fails() {
        assert!(matches!(resolve(&[("NRANKS", "0")]), Err(RankError::Zero { .. })));
        assert!(matches!(
            resolve(&[("DEVICES_PER_NODE", "0")]),
            Err(RankError::Zero { .. })
        ));
    }

    #[test]
    fn oversized_topology_fails() {
        assert_eq!(
            resolve(&[
                ("NODE_RANK", "5000000000"),
                ("NRANKS", "5000000001"),
                ("DEVICES_PER_NODE", "5000000000"),
            ]),
            Err(RankError::TopologyTooLarge {
                node_count: 5_000_000_001,
                devices_per_node: 5_000_000_000
            })
        );
        assert!(matches!(
            RankIdentity::new(usize::MAX - 1, 1, usize::MAX, 2),
            Err(RankError::TopologyTooLarge { .. })
        ));
    }

    #[test]
    fn custom_variable_names() {
        let config = TopologyConfig {
            node_index_var: "SLURM_NODEID".into(),
            local_index_var: "SLURM_LOCALID".into(),
            node_count_var: "SLURM_NNODES".into(),
            devices_per_node_var: "GPUS".into(),
            devices_per_node: 2,
        };
        let rank = RankIdentity::from_lookup(&config, |name| match name {
            "SLURM_NODEID" => Some("1".into()),
            "SLURM_LOCALID" => Some("1".into()),
            "SLURM_NNODES" => Some("3".into()),
            _ => None,
        })
        .unwrap();

        assert_eq!(rank.global_rank(), 3);
        assert_eq!(rank.world_size(), 6);
    }
}
