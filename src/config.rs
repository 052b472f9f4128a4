//! Node Configuration
//!
//! Command-line flags and the per-node bootstrap files.
//!
//! ```text
//! chat-node --node A --bind 127.0.0.1:5000 [--http 127.0.0.1:6000]
//!           [--seed 127.0.0.1:5001]... [--bootstrap <dir>] [--history 5]
//!           [--forward-timeout-ms 5000] [--session-timeout-secs 30] [--verbose]
//! ```

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::chat::RoomInfo;
use crate::membership::service::HTTP_PORT_OFFSET;
use crate::membership::types::NodeId;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("{flag} expects a value")]
    MissingValue { flag: String },

    #[error("invalid value '{value}' for {flag}")]
    InvalidValue { flag: String, value: String },
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub node_id: NodeId,
    pub bind_addr: SocketAddr,
    pub http_addr: SocketAddr,
    pub seeds: Vec<SocketAddr>,
    pub bootstrap_dir: PathBuf,
    pub history_size: usize,
    pub forward_timeout: Duration,
    pub session_timeout: Duration,
    pub verbose: bool,
}

impl NodeConfig {
    /// Parses flags, skipping the program name in `args[0]`. Unknown flags
    /// are ignored.
    pub fn from_args(args: &[String]) -> Result<Self, ConfigError> {
        let mut node_id: Option<NodeId> = None;
        let mut bind_addr: Option<SocketAddr> = None;
        let mut http_addr: Option<SocketAddr> = None;
        let mut seeds: Vec<SocketAddr> = vec![];
        let mut bootstrap_dir = PathBuf::from(".");
        let mut history_size: usize = 5;
        let mut forward_timeout_ms: u64 = 5000;
        let mut session_timeout_secs: u64 = 30;
        let mut verbose = false;

        let mut i = 1;
        while i < args.len() {
            let flag = args[i].as_str();
            match flag {
                "--verbose" => {
                    verbose = true;
                    i += 1;
                    continue;
                }
                "--node" | "--bind" | "--http" | "--seed" | "--bootstrap" | "--history"
                | "--forward-timeout-ms" | "--session-timeout-secs" => {}
                _ => {
                    i += 1;
                    continue;
                }
            }

            let value = args.get(i + 1).ok_or_else(|| ConfigError::MissingValue {
                flag: flag.to_string(),
            })?;
            match flag {
                "--node" => node_id = Some(NodeId::new(value)),
                "--bind" => bind_addr = Some(parse(flag, value)?),
                "--http" => http_addr = Some(parse(flag, value)?),
                "--seed" => seeds.push(parse(flag, value)?),
                "--bootstrap" => bootstrap_dir = PathBuf::from(value),
                "--history" => history_size = parse(flag, value)?,
                "--forward-timeout-ms" => forward_timeout_ms = parse(flag, value)?,
                "--session-timeout-secs" => session_timeout_secs = parse(flag, value)?,
                _ => {}
            }
            i += 2;
        }

        let bind_addr = bind_addr.ok_or(ConfigError::Missing("--bind"))?;
        let node_id = node_id.unwrap_or_else(|| NodeId::new(bind_addr.to_string()));
        let http_addr = http_addr.unwrap_or_else(|| {
            SocketAddr::new(bind_addr.ip(), bind_addr.port().wrapping_add(HTTP_PORT_OFFSET))
        });

        Ok(Self {
            node_id,
            bind_addr,
            http_addr,
            seeds,
            bootstrap_dir,
            history_size,
            forward_timeout: Duration::from_millis(forward_timeout_ms),
            session_timeout: Duration::from_secs(session_timeout_secs),
            verbose,
        })
    }
}

fn parse<T: std::str::FromStr>(flag: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        flag: flag.to_string(),
        value: value.to_string(),
    })
}

/// Initial state of a node, read from `<dir>/rooms-<node>.json` and
/// `<dir>/room_ids-<node>.json`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bootstrap {
    /// Rooms seeded into this node's partition.
    pub rooms: Vec<RoomInfo>,
    /// Set on the node holding the `room_ids` counter, with its start value.
    pub room_ids: Option<i64>,
}

#[derive(Deserialize)]
struct CounterFile {
    value: i64,
}

impl Bootstrap {
    /// Missing files mean no rooms and no counter; unreadable ones are errors.
    pub fn load(dir: &Path, node_id: &NodeId) -> anyhow::Result<Self> {
        let rooms_path = dir.join(format!("rooms-{}.json", node_id));
        let rooms = match read_optional(&rooms_path)? {
            Some(text) => serde_json::from_str::<Vec<RoomInfo>>(&text)
                .map_err(|e| anyhow::anyhow!("{}: {}", rooms_path.display(), e))?,
            None => vec![],
        };

        let counter_path = dir.join(format!("room_ids-{}.json", node_id));
        let room_ids = match read_optional(&counter_path)? {
            Some(text) => Some(
                serde_json::from_str::<CounterFile>(&text)
                    .map_err(|e| anyhow::anyhow!("{}: {}", counter_path.display(), e))?
                    .value,
            ),
            None => None,
        };

        tracing::debug!(
            "Bootstrap for {}: {} room(s), room id counter {:?}",
            node_id,
            rooms.len(),
            room_ids
        );
        Ok(Self { rooms, room_ids })
    }
}

fn read_optional(path: &Path) -> anyhow::Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(anyhow::anyhow!("cannot read {}: {}", path.display(), e)),
    }
}
