/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Row-major addressing for [`DenseArray`](super::DenseArray).

use itertools::izip;

/// Row-major strides for `shape`.
pub(crate) fn row_major_strides(shape: &[usize]) -> Vec<usize> {
    // "flip it and reverse it" --Missy Elliott
    let mut strides: Vec<usize> = shape.to_vec();
    let _ = strides.iter_mut().rev().fold(1, |acc, n| {
        let next = *n * acc;
        *n = acc;
        next
    });
    strides
}

/// Linear offset of `coord` under `strides`.
pub(crate) fn offset(coord: &[usize], strides: &[usize]) -> usize {
    izip!(coord, strides).map(|(c, s)| c * s).sum()
}

/// Offset into an array of shape `from` of the element that
/// broadcasting maps to `coord` in the (right-aligned, larger) shape.
pub(crate) fn broadcast_offset(coord: &[usize], from: &[usize], from_strides: &[usize]) -> usize {
    let lead = coord.len() - from.len();
    izip!(&coord[lead..], from, from_strides)
        .map(|(&c, &dim, &stride)| if dim == 1 { 0 } else { c * stride })
        .sum()
}

/// An iterator over every coordinate of a shape in row-major order.
///
/// ```ignore
/// let iter = CartesianIterator::new(vec![2, 3]);
/// let coords: Vec<_> = iter.collect();
/// assert_eq!(
///     coords,
///     vec![
///         vec![0, 0],
///         vec![0, 1],
///         vec![0, 2],
///         vec![1, 0],
///         vec![1, 1],
///         vec![1, 2],
///     ]
/// );
/// ```
///
/// A zero-dimensional shape yields a single empty coordinate; any
/// zero-sized dimension yields nothing.
pub(crate) struct CartesianIterator {
    dims: Vec<usize>,
    index: usize,
    len: usize,
}

impl CartesianIterator {
    pub(crate) fn new(dims: Vec<usize>) -> Self {
        let len = dims.iter().product();
        CartesianIterator {
            dims,
            index: 0,
            len,
        }
    }
}

impl Iterator for CartesianIterator {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.len {
            return None;
        }

        let mut result: Vec<usize> = vec![0; self.dims.len()];
        let mut rest = self.index;
        for (i, dim) in self.dims.iter().enumerate().rev() {
            result[i] = rest % dim;
            rest /= dim;
        }
        self.index += 1;
        Some(result)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.len - self.index;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for CartesianIterator {}
