/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use crate::index::IndexEntry;
use crate::index::IndexError;
use crate::index::SliceSpec;
use crate::ops::Array;
use crate::ops::ArrayOps;
use crate::ops::Dtype;

/// One entry of a normalized index: ellipsis expanded and lists
/// materialized.
#[derive(Debug, Clone, PartialEq)]
pub enum AxisIndex<A> {
    Integer(i64),
    Slice(SliceSpec),
    NewAxis,
    Array(A),
}

impl<A> AxisIndex<A> {
    /// Whether the entry consumes a source axis.
    pub fn consumes_axis(&self) -> bool {
        !matches!(self, AxisIndex::NewAxis)
    }

    /// Integers and index arrays take part in advanced indexing.
    pub fn is_advanced(&self) -> bool {
        matches!(self, AxisIndex::Integer(_) | AxisIndex::Array(_))
    }

    /// The entry without its array payload, if it has none.
    pub fn to_basic(&self) -> Option<BasicIndex> {
        match self {
            AxisIndex::Integer(i) => Some(BasicIndex::Integer(*i)),
            AxisIndex::Slice(spec) => Some(BasicIndex::Slice(*spec)),
            AxisIndex::NewAxis => Some(BasicIndex::NewAxis),
            AxisIndex::Array(_) => None,
        }
    }
}

/// A normalized entry that a plain strided slice can express.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BasicIndex {
    Integer(i64),
    Slice(SliceSpec),
    NewAxis,
}

/// The result of [`normalize`].
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedIndex<A> {
    pub entries: Vec<AxisIndex<A>>,
    /// Number of entries that consume an axis. Always at most the rank
    /// of the indexed array.
    pub non_none: usize,
}

/// Check that `array` can be used as an index tensor.
pub fn check_index_array<A: Array>(array: &A) -> Result<(), IndexError> {
    match array.dtype() {
        Dtype::Bool => Err(IndexError::BooleanMask),
        dtype if dtype.is_integral() => Ok(()),
        dtype => Err(IndexError::NonIntegerIndex {
            found: dtype.to_string(),
        }),
    }
}

/// Normalize integer `index` against an axis of `size` elements,
/// counting negative values from the end.
pub fn normalize_integer(index: i64, axis: usize, size: usize) -> Result<i64, IndexError> {
    let n = size as i64;
    let normalized = if index < 0 { index + n } else { index };
    if normalized < 0 || normalized >= n {
        return Err(IndexError::OutOfBounds { index, axis, size });
    }
    Ok(normalized)
}

fn convert<O: ArrayOps>(
    ops: &O,
    entry: &IndexEntry<O::Array>,
) -> Result<AxisIndex<O::Array>, IndexError> {
    Ok(match entry {
        IndexEntry::Integer(i) => AxisIndex::Integer(*i),
        IndexEntry::Slice(spec) => {
            if spec.step == Some(0) {
                return Err(IndexError::ZeroStep);
            }
            AxisIndex::Slice(*spec)
        }
        IndexEntry::NewAxis => AxisIndex::NewAxis,
        IndexEntry::Array(a) => {
            check_index_array(a)?;
            AxisIndex::Array(a.clone())
        }
        IndexEntry::List(list) => AxisIndex::Array(list.to_index_array(ops)?),
        IndexEntry::Ellipsis => return Err(IndexError::MultipleEllipsis),
    })
}

/// Expand the ellipsis (if any) into full slices, materialize list
/// literals, and validate the entry count against `shape`.
///
/// Entries before the ellipsis are scanned left to right, entries
/// after it right to left; the ellipsis stands for one full slice per
/// axis neither side covers. A second ellipsis is an error.
pub fn normalize<O: ArrayOps>(
    ops: &O,
    shape: &[usize],
    entries: &[IndexEntry<O::Array>],
) -> Result<NormalizedIndex<O::Array>, IndexError> {
    let split = entries
        .iter()
        .position(|e| matches!(e, IndexEntry::Ellipsis));

    let (before, after) = match split {
        Some(pos) => (&entries[..pos], &entries[pos + 1..]),
        None => (entries, &entries[..0]),
    };

    let before = before
        .iter()
        .map(|e| convert(ops, e))
        .collect::<Result<Vec<_>, _>>()?;
    let after = after
        .iter()
        .rev()
        .map(|e| convert(ops, e))
        .collect::<Result<Vec<_>, _>>()?;

    let consumed = |v: &[AxisIndex<O::Array>]| v.iter().filter(|e| e.consumes_axis()).count();
    let mut non_none = consumed(&before) + consumed(&after);
    if non_none > shape.len() {
        return Err(if shape.is_empty() {
            IndexError::ZeroDimensional
        } else {
            IndexError::TooManyIndices { ndim: shape.len() }
        });
    }

    let mut normalized = before;
    if split.is_some() {
        let fill = shape.len() - non_none;
        normalized.extend(itertools::repeat_n(AxisIndex::Slice(SliceSpec::full()), fill));
        non_none += fill;
    }
    normalized.extend(after.into_iter().rev());

    tracing::trace!(
        entries = entries.len(),
        normalized = normalized.len(),
        non_none,
        "normalized index"
    );

    Ok(NormalizedIndex {
        entries: normalized,
        non_none,
    })
}
