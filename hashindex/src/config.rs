//! Index configuration module.
//!
//! Configuration for the `hashindex` binary, loaded from environment
//! variables.
//!
//! # Environment Variables
//!
//! - `HASHINDEX_TREE_PATH`: Tree file to build (default: `./data/hash.tree`)
//! - `HASHINDEX_BLOCK_LENGTH`: Block length in bytes (default: `4096`)
//! - `HASHINDEX_NUM_POINTS`: Number of projection values to index (default: `100000`)
//! - `HASHINDEX_TOP_K`: Number of nearest keys to report (default: `10`)
//! - `HASHINDEX_SEED`: Seed for the random generator (default: `0`)
//!
//! # Invariants
//!
//! - `block_length` always yields a valid [`NodeLayout`]
//! - `num_points` fits in an `i32` object id
//! - `top_k` is positive

use std::path::PathBuf;

use crate::btree::NodeLayout;
use crate::storage::MIN_BLOCK_LENGTH;

/// Index build configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexConfig {
    /// Path of the tree file. Replaced if it already exists.
    pub tree_path: PathBuf,
    /// Block length shared by the header block and every node.
    pub block_length: usize,
    /// Number of random projection values to bulk-load.
    pub num_points: usize,
    /// Size of the nearest-key list.
    pub top_k: usize,
    pub seed: u64,
}

/// Error returned when loading configuration fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    InvalidValue { name: String, message: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { name, message } => {
                write!(f, "invalid value for {name}: {message}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl IndexConfig {
    pub const DEFAULT_TREE_PATH: &'static str = "./data/hash.tree";
    pub const DEFAULT_BLOCK_LENGTH: usize = 4096;
    pub const DEFAULT_NUM_POINTS: usize = 100_000;
    pub const DEFAULT_TOP_K: usize = 10;
    pub const DEFAULT_SEED: u64 = 0;

    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but cannot be parsed, or if
    /// the block length cannot hold a tree.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup`, which returns the value of a
    /// variable or `None` if it is unset.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let tree_path = lookup("HASHINDEX_TREE_PATH")
            .map_or_else(|| PathBuf::from(Self::DEFAULT_TREE_PATH), PathBuf::from);

        let block_length = parse_var(
            &lookup,
            "HASHINDEX_BLOCK_LENGTH",
            Self::DEFAULT_BLOCK_LENGTH,
        )?;
        if block_length < MIN_BLOCK_LENGTH {
            return Err(invalid(
                "HASHINDEX_BLOCK_LENGTH",
                format!("must be at least {MIN_BLOCK_LENGTH} bytes"),
            ));
        }
        if let Err(e) = NodeLayout::new(block_length) {
            return Err(invalid("HASHINDEX_BLOCK_LENGTH", e.to_string()));
        }

        let num_points = parse_var(&lookup, "HASHINDEX_NUM_POINTS", Self::DEFAULT_NUM_POINTS)?;
        if i32::try_from(num_points).is_err() {
            return Err(invalid(
                "HASHINDEX_NUM_POINTS",
                format!("{num_points} exceeds the largest object id"),
            ));
        }

        let top_k = parse_var(&lookup, "HASHINDEX_TOP_K", Self::DEFAULT_TOP_K)?;
        if top_k == 0 {
            return Err(invalid("HASHINDEX_TOP_K", "must be positive".to_string()));
        }

        let seed = parse_var(&lookup, "HASHINDEX_SEED", Self::DEFAULT_SEED)?;

        Ok(Self {
            tree_path,
            block_length,
            num_points,
            top_k,
            seed,
        })
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError> {
    lookup(name).map_or(Ok(default), |value| {
        value
            .trim()
            .parse::<T>()
            .map_err(|_| invalid(name, format!("'{value}' is not a valid number")))
    })
}

fn invalid(name: &str, message: String) -> ConfigError {
    ConfigError::InvalidValue {
        name: name.to_string(),
        message,
    }
}
