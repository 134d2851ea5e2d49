/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use serde::Deserialize;
use serde::Serialize;

use crate::index::IndexError;
use crate::index::SliceSpec;

/// A slice with every bound filled in, relative to one axis.
///
/// Following NumPy's convention, let `n` be the number of elements in
/// the axis being sliced and `k` the step. If the start `i` is not
/// given it defaults to `0` for `k > 0` and `n - 1` for `k < 0`. If the
/// stop `j` is not given it defaults to `n` for `k > 0` and `-n - 1`
/// for `k < 0`. If `k` is not given it defaults to `1`.
///
/// ```
/// # use ndindex::ResolvedSlice;
/// # use ndindex::SliceSpec;
/// let r = ResolvedSlice::resolve(&SliceSpec::new(None, None, Some(-1)), 5).unwrap();
/// assert_eq!(r, ResolvedSlice::new(4, -6, -1));
/// assert_eq!(r.clamp(5), ResolvedSlice::new(4, -1, -1));
/// assert_eq!(r.clamp(5).len(), 5);
/// ```
///
/// The values returned by [`ResolvedSlice::resolve`] are raw: a
/// negative start or end still counts from the end of the axis. The
/// `slice` primitive normalizes them itself. Call sites that
/// materialize an index range use [`ResolvedSlice::clamp`] first, so
/// both routes select the same elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResolvedSlice {
    pub start: i64,
    pub end: i64,
    pub stride: i64,
}

impl ResolvedSlice {
    pub fn new(start: i64, end: i64, stride: i64) -> Self {
        Self { start, end, stride }
    }

    /// Fill in the unspecified bounds of `spec` for an axis of `size`
    /// elements.
    pub fn resolve(spec: &SliceSpec, size: usize) -> Result<Self, IndexError> {
        let n = size as i64;
        let stride = spec.step.unwrap_or(1);
        if stride == 0 {
            return Err(IndexError::ZeroStep);
        }
        let start = spec.start.unwrap_or(if stride < 0 { n - 1 } else { 0 });
        let end = spec.stop.unwrap_or(if stride < 0 { -n - 1 } else { n });
        Ok(Self { start, end, stride })
    }

    /// Normalize against an axis of `size` elements: negative bounds
    /// count from the end, then bounds are clamped to `[0, n]` for
    /// positive strides and `[-1, n - 1]` for negative ones. After
    /// clamping, `start, start + stride, ...` up to (excluding) `end`
    /// enumerates exactly the selected positions.
    pub fn clamp(&self, size: usize) -> Self {
        let n = size as i64;
        let (low, high) = if self.stride < 0 { (-1, n - 1) } else { (0, n) };
        let adjust = |v: i64| {
            let v = if v < 0 { v + n } else { v };
            v.clamp(low, high)
        };
        Self {
            start: adjust(self.start),
            end: adjust(self.end),
            stride: self.stride,
        }
    }

    /// Number of positions selected, assuming `self` has been clamped.
    ///
    /// Works in `i128`, so extreme bounds and strides such as
    /// `i64::MIN` do not overflow.
    pub fn len(&self) -> usize {
        let (start, end) = (i128::from(self.start), i128::from(self.end));
        let span = if self.stride > 0 { end - start } else { start - end };
        if span <= 0 {
            return 0;
        }
        let step = i128::from(self.stride.unsigned_abs());
        usize::try_from((span - 1) / step + 1).unwrap_or(usize::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether this slice selects every element of an axis of `size`
    /// elements, in order.
    pub fn is_identity(&self, size: usize) -> bool {
        let clamped = self.clamp(size);
        clamped.stride == 1 && clamped.start == 0 && clamped.end == size as i64
    }

    /// Iterate over the positions selected, assuming `self` has been
    /// clamped.
    pub fn positions(&self) -> impl Iterator<Item = i64> {
        let Self { start, stride, .. } = *self;
        (0..self.len() as i64).map(move |i| start + i * stride)
    }
}
