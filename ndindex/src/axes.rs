/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use serde::Deserialize;
use serde::Serialize;

/// What happens to one position of a post-slice index list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AxisAction {
    /// The axis survives unchanged.
    Keep,
    /// The axis was selected by an integer and is removed.
    Squeeze,
    /// A size-1 axis is inserted here (`None` / newaxis).
    Insert,
}

/// Compute the arguments of the `squeeze` and `expand_dims` calls that
/// follow a slice, given one action per position of the index list.
///
/// `Insert` positions do not exist in the sliced array, so a squeeze
/// position is its list position minus the inserts before it. The
/// expansion runs after the squeeze, so an insert position is its list
/// position minus the squeezes before it.
///
/// ```
/// # use ndindex::axes::AxisAction::*;
/// # use ndindex::axes::squeeze_and_expand_axes;
/// let (squeeze, expand) = squeeze_and_expand_axes(&[Insert, Squeeze, Keep, Insert]);
/// assert_eq!(squeeze, vec![0]);
/// assert_eq!(expand, vec![0, 2]);
/// ```
pub fn squeeze_and_expand_axes(actions: &[AxisAction]) -> (Vec<isize>, Vec<isize>) {
    let mut squeeze = Vec::new();
    let mut expand = Vec::new();
    for (pos, action) in actions.iter().enumerate() {
        match action {
            AxisAction::Keep => {}
            AxisAction::Squeeze => squeeze.push((pos - expand.len()) as isize),
            AxisAction::Insert => expand.push((pos - squeeze.len()) as isize),
        }
    }
    (squeeze, expand)
}
