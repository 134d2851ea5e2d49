/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Planner configuration.

use std::env;

use serde::Deserialize;
use serde::Serialize;

use crate::ops::Dtype;

/// Environment variable toggling the slice-update fast path.
pub const SLICE_UPDATE_FAST_PATH_ENV: &str = "NDINDEX_SLICE_UPDATE_FAST_PATH";

/// Environment variable selecting the dtype of planner-built index
/// tensors.
pub const INDEX_DTYPE_ENV: &str = "NDINDEX_INDEX_DTYPE";

/// Errors loading configuration.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("invalid value `{value}` in ${var}: {reason}")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Knobs for [`Indexer`](crate::Indexer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingConfig {
    /// Try compiling array-free writes to a single `slice_update`
    /// before falling back to scatter.
    pub slice_update_fast_path: bool,
    /// Dtype of the index tensors the planner creates itself (`arange`
    /// ranges and scalar indices). Must be integral.
    pub index_dtype: Dtype,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            slice_update_fast_path: true,
            index_dtype: Dtype::UInt32,
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl IndexingConfig {
    /// Load configuration from environment variables, starting from
    /// the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().overlay(|var| env::var(var).ok())
    }

    /// Override fields with the values `lookup` finds for the
    /// `NDINDEX_*` variables.
    pub fn overlay(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(value) = lookup(SLICE_UPDATE_FAST_PATH_ENV) {
            self.slice_update_fast_path =
                parse_bool(&value).ok_or_else(|| ConfigError::InvalidValue {
                    var: SLICE_UPDATE_FAST_PATH_ENV,
                    value: value.clone(),
                    reason: "expected a boolean".to_string(),
                })?;
        }

        if let Some(value) = lookup(INDEX_DTYPE_ENV) {
            let dtype = value
                .parse::<Dtype>()
                .map_err(|reason| ConfigError::InvalidValue {
                    var: INDEX_DTYPE_ENV,
                    value: value.clone(),
                    reason,
                })?;
            if !dtype.is_integral() {
                return Err(ConfigError::InvalidValue {
                    var: INDEX_DTYPE_ENV,
                    value,
                    reason: "index dtype must be integral".to_string(),
                });
            }
            self.index_dtype = dtype;
        }

        tracing::debug!(
            slice_update_fast_path = self.slice_update_fast_path,
            index_dtype = %self.index_dtype,
            "loaded indexing config"
        );
        Ok(self)
    }
}
