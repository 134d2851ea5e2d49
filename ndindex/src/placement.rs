/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use serde::Deserialize;
use serde::Serialize;

use crate::normalize::AxisIndex;
use crate::ops::Array;

/// Where the axes produced by advanced indices end up.
///
/// NumPy places the broadcast shape of all integer and array indices
/// at the position of the first such index when they are adjacent, and
/// at the front of the result when a slice or newaxis separates two of
/// them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    /// Advanced-index axes go first in the result.
    pub gather_first: bool,
    /// Rank of the broadcast of every index array. Integers count as
    /// rank 0.
    pub max_advanced_rank: usize,
    /// Number of array entries. When this is zero integers are handled
    /// by slicing and squeezing, and no gather is needed.
    pub num_arrays: usize,
    /// Position of the last integer or array entry.
    pub last_advanced: Option<usize>,
}

impl Placement {
    /// Plan placement for normalized `entries` in a single pass.
    pub fn plan<A: Array>(entries: &[AxisIndex<A>]) -> Self {
        let mut have_advanced = false;
        let mut separated = false;
        let mut gather_first = false;
        let mut max_advanced_rank = 0;
        let mut num_arrays = 0;
        let mut last_advanced = None;

        for (pos, entry) in entries.iter().enumerate() {
            if entry.is_advanced() {
                if have_advanced && separated {
                    gather_first = true;
                }
                have_advanced = true;
                last_advanced = Some(pos);
            } else {
                separated |= have_advanced;
            }
            if let AxisIndex::Array(a) = entry {
                max_advanced_rank = max_advanced_rank.max(a.ndim());
                num_arrays += 1;
            }
        }

        let placement = Self {
            gather_first,
            max_advanced_rank,
            num_arrays,
            last_advanced,
        };
        tracing::debug!(
            gather_first,
            max_advanced_rank,
            num_arrays,
            "planned advanced index placement"
        );
        placement
    }

    /// Whether a gather is needed at all.
    pub fn needs_gather(&self) -> bool {
        self.num_arrays > 0
    }
}
