/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! The read path.
//!
//! A tuple index is compiled in up to three steps:
//!
//! 1. If any index array is present, every entry up to the last
//!    integer or array becomes a gather index: slices are materialized
//!    with `arange`, integers become scalar indices, and arrays are
//!    used as they are. One `gather` reads all of them at once; the
//!    singleton window axes it leaves behind are squeezed.
//! 2. The entries the gather did not consume (trailing slices,
//!    newaxis, and full slices standing in for the gathered axes) are
//!    applied with a single strided `slice`.
//! 3. Integer axes are squeezed and newaxis positions expanded.
//!
//! Steps that would not change the array are skipped.

use crate::axes::AxisAction;
use crate::axes::squeeze_and_expand_axes;
use crate::index::IndexEntry;
use crate::index::IndexError;
use crate::index::IndexExpression;
use crate::index::SliceSpec;
use crate::indexer::Indexer;
use crate::normalize::AxisIndex;
use crate::normalize::BasicIndex;
use crate::normalize::check_index_array;
use crate::normalize::normalize;
use crate::normalize::normalize_integer;
use crate::ops::Array;
use crate::ops::ArrayOps;
use crate::placement::Placement;
use crate::slice::ResolvedSlice;

/// The arguments of the single `gather` call of a read.
#[derive(Debug, Clone)]
pub struct GatherPlan<A> {
    /// Index tensors, already reshaped so that they broadcast to
    /// `max_advanced_rank + num_slices` dimensions.
    pub indices: Vec<A>,
    /// Source axes the indices address: `0..indices.len()`.
    pub axes: Vec<usize>,
    /// Window size per source axis: 1 on gathered axes, full elsewhere.
    pub slice_sizes: Vec<usize>,
    pub max_advanced_rank: usize,
    /// Number of slices materialized as index tensors.
    pub num_slices: usize,
    pub gather_first: bool,
}

impl<A> GatherPlan<A> {
    /// Rank of the broadcast index tensors.
    pub fn index_rank(&self) -> usize {
        self.max_advanced_rank + self.num_slices
    }

    /// The window axes `gather` leaves behind on the gathered axes.
    pub fn squeeze_axes(&self) -> Vec<isize> {
        self.axes
            .iter()
            .map(|&axis| (axis + self.index_rank()) as isize)
            .collect()
    }
}

impl<O: ArrayOps> Indexer<'_, O> {
    /// Read `src[index]`.
    pub fn get_item(
        &self,
        src: &O::Array,
        index: &IndexExpression<O::Array>,
    ) -> Result<O::Array, IndexError> {
        match index {
            IndexExpression::Single(entry) => self.get_single(src, entry),
            IndexExpression::Tuple(entries) => self.get_nd(src, entries),
        }
    }

    fn get_single(
        &self,
        src: &O::Array,
        entry: &IndexEntry<O::Array>,
    ) -> Result<O::Array, IndexError> {
        let ops = self.ops();
        match entry {
            IndexEntry::Ellipsis => Ok(src.clone()),
            IndexEntry::NewAxis => Ok(ops.expand_dims(src, &[0])?),
            _ if src.ndim() == 0 => Err(IndexError::ZeroDimensional),
            IndexEntry::Slice(spec) if spec.is_full() => Ok(src.clone()),
            IndexEntry::Slice(spec) => {
                let r = ResolvedSlice::resolve(spec, src.shape()[0])?;
                let (mut starts, mut ends, mut strides) = full_region(src.shape());
                starts[0] = r.start;
                ends[0] = r.end;
                strides[0] = r.stride;
                Ok(ops.slice(src, &starts, &ends, &strides)?)
            }
            IndexEntry::Integer(i) => {
                let index = self.scalar_index(normalize_integer(*i, 0, src.shape()[0])?)?;
                Ok(ops.take(src, &index, 0)?)
            }
            IndexEntry::Array(a) => {
                check_index_array(a)?;
                Ok(ops.take(src, a, 0)?)
            }
            IndexEntry::List(list) => {
                let index = list.to_index_array(ops)?;
                Ok(ops.take(src, &index, 0)?)
            }
        }
    }

    fn get_nd(
        &self,
        src: &O::Array,
        entries: &[IndexEntry<O::Array>],
    ) -> Result<O::Array, IndexError> {
        if entries.is_empty() {
            return Ok(src.clone());
        }

        let normalized = normalize(self.ops(), src.shape(), entries)?;
        let placement = Placement::plan(&normalized.entries);

        let Some(last) = placement.last_advanced.filter(|_| placement.needs_gather()) else {
            let basic: Vec<BasicIndex> = normalized
                .entries
                .iter()
                .filter_map(AxisIndex::to_basic)
                .collect();
            return self.slice_remaining(src, &basic);
        };

        let plan = self.gather_plan(src, &normalized.entries[..=last], &placement)?;
        tracing::debug!(
            num_indices = plan.indices.len(),
            index_rank = plan.index_rank(),
            gather_first = plan.gather_first,
            "gathering"
        );
        let gathered = self
            .ops()
            .gather(src, &plan.indices, &plan.axes, &plan.slice_sizes)?;
        let gathered = self.ops().squeeze(&gathered, &plan.squeeze_axes())?;

        let remaining = remaining_after_gather(&normalized.entries, last, &placement);
        self.slice_remaining(&gathered, &remaining)
    }

    /// Build the gather for `entries`, which end at the last advanced
    /// entry.
    pub fn gather_plan(
        &self,
        src: &O::Array,
        entries: &[AxisIndex<O::Array>],
        placement: &Placement,
    ) -> Result<GatherPlan<O::Array>, IndexError> {
        let ops = self.ops();
        let shape = src.shape();

        let mut indices = Vec::with_capacity(entries.len());
        let mut is_slice = Vec::with_capacity(entries.len());
        for entry in entries.iter().filter(|e| e.consumes_axis()) {
            let axis = indices.len();
            match entry {
                AxisIndex::Slice(spec) => {
                    let r = ResolvedSlice::resolve(spec, shape[axis])?.clamp(shape[axis]);
                    indices.push(self.range_index(&r)?);
                    is_slice.push(true);
                }
                AxisIndex::Integer(i) => {
                    let i = normalize_integer(*i, axis, shape[axis])?;
                    indices.push(self.scalar_index(i)?);
                    is_slice.push(false);
                }
                AxisIndex::Array(a) => {
                    indices.push(a.clone());
                    is_slice.push(false);
                }
                AxisIndex::NewAxis => {}
            }
        }

        let max_advanced_rank = placement.max_advanced_rank;
        let num_slices = is_slice.iter().filter(|&&s| s).count();
        let rank = max_advanced_rank + num_slices;

        if placement.gather_first {
            // Advanced axes first, then one axis per slice in order.
            let mut slice_index = 0;
            for (index, &slice) in indices.iter_mut().zip(&is_slice) {
                let target = if slice {
                    let mut target = vec![1; rank];
                    target[max_advanced_rank + slice_index] = index.shape()[0];
                    slice_index += 1;
                    target
                } else {
                    let mut target = index.shape().to_vec();
                    target.resize(index.ndim() + num_slices, 1);
                    target
                };
                if index.shape() != target.as_slice() {
                    *index = ops.reshape(index, &target)?;
                }
            }
        } else {
            // The slices all precede the advanced entries, whose axes
            // are right-aligned after them.
            for (i, index) in indices.iter_mut().take(num_slices).enumerate() {
                let mut target = vec![1; rank];
                target[i] = index.shape()[0];
                if index.shape() != target.as_slice() {
                    *index = ops.reshape(index, &target)?;
                }
            }
        }

        let axes: Vec<usize> = (0..indices.len()).collect();
        let mut slice_sizes = shape.to_vec();
        slice_sizes[..indices.len()].fill(1);

        Ok(GatherPlan {
            indices,
            axes,
            slice_sizes,
            max_advanced_rank,
            num_slices,
            gather_first: placement.gather_first,
        })
    }

    /// Apply integer, slice and newaxis entries with at most one
    /// `slice`, one `squeeze` and one `expand_dims`.
    pub(crate) fn slice_remaining(
        &self,
        src: &O::Array,
        remaining: &[BasicIndex],
    ) -> Result<O::Array, IndexError> {
        let ops = self.ops();
        let shape = src.shape();
        let (mut starts, mut ends, mut strides) = full_region(shape);
        let mut actions = Vec::with_capacity(remaining.len());

        let mut axis = 0;
        for entry in remaining {
            match entry {
                BasicIndex::NewAxis => {
                    actions.push(AxisAction::Insert);
                    continue;
                }
                BasicIndex::Integer(i) => {
                    let i = normalize_integer(*i, axis, shape[axis])?;
                    starts[axis] = i;
                    ends[axis] = i + 1;
                    actions.push(AxisAction::Squeeze);
                }
                BasicIndex::Slice(spec) => {
                    let r = ResolvedSlice::resolve(spec, shape[axis])?;
                    starts[axis] = r.start;
                    ends[axis] = r.end;
                    strides[axis] = r.stride;
                    actions.push(AxisAction::Keep);
                }
            }
            axis += 1;
        }

        let identity = (0..shape.len())
            .all(|a| ResolvedSlice::new(starts[a], ends[a], strides[a]).is_identity(shape[a]));
        let mut out = if identity {
            src.clone()
        } else {
            ops.slice(src, &starts, &ends, &strides)?
        };

        let (squeeze, expand) = squeeze_and_expand_axes(&actions);
        if !squeeze.is_empty() {
            out = ops.squeeze(&out, &squeeze)?;
        }
        if !expand.is_empty() {
            out = ops.expand_dims(&out, &expand)?;
        }
        Ok(out)
    }
}

/// `(starts, ends, strides)` selecting every element of `shape`.
pub(crate) fn full_region(shape: &[usize]) -> (Vec<i64>, Vec<i64>, Vec<i64>) {
    (
        vec![0; shape.len()],
        shape.iter().map(|&d| d as i64).collect(),
        vec![1; shape.len()],
    )
}

/// The entries still to apply after the gather: full slices over the
/// gathered axes, the newaxis entries among them, and everything after
/// the last advanced entry.
fn remaining_after_gather<A>(
    entries: &[AxisIndex<A>],
    last: usize,
    placement: &Placement,
) -> Vec<BasicIndex> {
    let full = BasicIndex::Slice(SliceSpec::full());
    let mut remaining = Vec::with_capacity(entries.len() + placement.max_advanced_rank);

    if placement.gather_first {
        remaining.extend(itertools::repeat_n(full, placement.max_advanced_rank));
        for entry in &entries[..last] {
            match entry {
                AxisIndex::NewAxis => remaining.push(BasicIndex::NewAxis),
                AxisIndex::Slice(_) => remaining.push(full),
                AxisIndex::Integer(_) | AxisIndex::Array(_) => {}
            }
        }
    } else {
        for entry in entries.iter().take_while(|e| !e.is_advanced()) {
            match entry {
                AxisIndex::NewAxis => remaining.push(BasicIndex::NewAxis),
                _ => remaining.push(full),
            }
        }
        remaining.extend(itertools::repeat_n(full, placement.max_advanced_rank));
    }

    remaining.extend(entries[last + 1..].iter().filter_map(AxisIndex::to_basic));
    remaining
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dense::DenseArray;
    use crate::dense::DenseOps;
    use crate::index::dsl::*;
    use crate::ops::Dtype;
    use crate::record::Recorder;

    fn iota(shape: &[usize]) -> DenseArray {
        DenseArray::iota(shape.to_vec(), Dtype::Int64)
    }

    fn get(src: &DenseArray, index: IndexExpression<DenseArray>) -> DenseArray {
        Indexer::new(&DenseOps).get_item(src, &index).unwrap()
    }

    fn index_array(values: &[i64], shape: &[usize]) -> DenseArray {
        DenseArray::new(
            values.iter().map(|&v| v as f64).collect(),
            shape.to_vec(),
            Dtype::Int64,
        )
        .unwrap()
    }

    #[test]
    fn test_single_entries() {
        let a = iota(&[4, 5]);

        let r = get(&a, single(range(1, 3)));
        assert_eq!(r.shape(), &[2, 5]);
        assert_eq!(r.data()[0], 5.0);

        let r = get(&a, single(int(-1)));
        assert_eq!(r.shape(), &[5]);
        assert_eq!(r.data(), &[15.0, 16.0, 17.0, 18.0, 19.0]);

        let r = get(&a, single(list(vec![3i64, 0])));
        assert_eq!(r.shape(), &[2, 5]);
        assert_eq!(r.data()[5], 0.0);

        assert_eq!(get(&a, single(ellipsis())), a);
        assert_eq!(get(&a, single(newaxis())).shape(), &[1, 4, 5]);
        assert_eq!(get(&a, single(full())), a);
        assert_eq!(get(&a, tuple(vec![])), a);
    }

    #[test]
    fn test_zero_dimensional() {
        let s = DenseArray::scalar(3.0, Dtype::Float32);
        let indexer = Indexer::new(&DenseOps);
        for entry in [int(0), full(), list(vec![0i64])] {
            assert!(matches!(
                indexer.get_item(&s, &single(entry)),
                Err(IndexError::ZeroDimensional)
            ));
        }
        assert!(matches!(
            indexer.get_item(&s, &tuple(vec![int(0)])),
            Err(IndexError::ZeroDimensional)
        ));
        assert_eq!(get(&s, single(ellipsis())), s);
        assert_eq!(get(&s, tuple(vec![newaxis(), ellipsis()])).shape(), &[1]);
    }

    #[test]
    fn test_reversed_rows() {
        let a = iota(&[4, 5]);
        let r = get(&a, tuple(vec![range(1, 3), step(-1)]));
        assert_eq!(r.shape(), &[2, 5]);
        assert_eq!(
            r.data(),
            &[9.0, 8.0, 7.0, 6.0, 5.0, 14.0, 13.0, 12.0, 11.0, 10.0]
        );
    }

    #[test]
    fn test_pointwise_gather() {
        let a = iota(&[4, 5]);
        let r = get(&a, tuple(vec![list(vec![0i64, 2]), list(vec![1i64, 3])]));
        assert_eq!(r.shape(), &[2]);
        assert_eq!(r.data(), &[1.0, 13.0]);
    }

    #[test]
    fn test_newaxis_with_integer() {
        let a = iota(&[4, 5]);
        let r = get(&a, tuple(vec![full(), newaxis(), int(2)]));
        assert_eq!(r.shape(), &[4, 1]);
        assert_eq!(r.data(), &[2.0, 7.0, 12.0, 17.0]);
    }

    #[test]
    fn test_advanced_adjacent_after_slice() {
        // a[:, [2, 0]] keeps the advanced axis in place.
        let a = iota(&[3, 4]);
        let r = get(&a, tuple(vec![full(), list(vec![2i64, 0])]));
        assert_eq!(r.shape(), &[3, 2]);
        assert_eq!(r.data(), &[2.0, 0.0, 6.0, 4.0, 10.0, 8.0]);
    }

    #[test]
    fn test_advanced_separated_goes_first() {
        // a[[0, 1], :, [1, 2]] on (2, 3, 4): advanced axes move to the
        // front.
        let a = iota(&[2, 3, 4]);
        let r = get(
            &a,
            tuple(vec![list(vec![0i64, 1]), full(), list(vec![1i64, 2])]),
        );
        assert_eq!(r.shape(), &[2, 3]);
        assert_eq!(r.data(), &[1.0, 5.0, 9.0, 14.0, 18.0, 22.0]);

        // An integer is advanced too: a[0, :, [1, 2]] has shape (2, 3).
        let r = get(&a, tuple(vec![int(0), full(), list(vec![1i64, 2])]));
        assert_eq!(r.shape(), &[2, 3]);
        assert_eq!(r.data(), &[1.0, 5.0, 9.0, 2.0, 6.0, 10.0]);
    }

    #[test]
    fn test_advanced_with_trailing_entries() {
        // a[[1, 0], 1:, None] on (2, 3, 4)
        let a = iota(&[2, 3, 4]);
        let r = get(&a, tuple(vec![list(vec![1i64, 0]), slice(Some(1), None, None), newaxis()]));
        assert_eq!(r.shape(), &[2, 2, 1, 4]);
        assert_eq!(r.data()[0], 16.0);

        // a[..., [0, 3]] picks columns.
        let r = get(&a, tuple(vec![ellipsis(), list(vec![0i64, 3])]));
        assert_eq!(r.shape(), &[2, 3, 2]);
        assert_eq!(&r.data()[..4], &[0.0, 3.0, 4.0, 7.0]);
    }

    #[test]
    fn test_broadcast_index_arrays() {
        // a[[[0], [1]], [0, 2]] -> shape (2, 2)
        let a = iota(&[2, 3]);
        let r = get(
            &a,
            tuple(vec![array(index_array(&[0, 1], &[2, 1])), list(vec![0i64, 2])]),
        );
        assert_eq!(r.shape(), &[2, 2]);
        assert_eq!(r.data(), &[0.0, 2.0, 3.0, 5.0]);
    }

    #[test]
    fn test_strided_slice_in_gather() {
        // a[::-2, [1]] on (4, 3)
        let a = iota(&[4, 3]);
        let r = get(&a, tuple(vec![step(-2), list(vec![1i64])]));
        assert_eq!(r.shape(), &[2, 1]);
        assert_eq!(r.data(), &[10.0, 4.0]);
    }

    #[test]
    fn test_empty_axis_with_index_array() {
        // a[:, [0, 2]] on (0, 3) has shape (0, 2).
        let a = iota(&[0, 3]);
        let r = get(&a, tuple(vec![full(), list(vec![0i64, 2])]));
        assert_eq!(r.shape(), &[0, 2]);

        let r = get(&a, tuple(vec![step(-1), list(vec![1i64]), newaxis()]));
        assert_eq!(r.shape(), &[0, 1, 1]);
    }

    #[test]
    fn test_extreme_step() {
        let a = iota(&[4, 5]);
        let r = get(&a, single(slice(None, None, Some(i64::MIN))));
        assert_eq!(r.shape(), &[1, 5]);
        assert_eq!(r.data(), &[15.0, 16.0, 17.0, 18.0, 19.0]);

        let r = get(&a, tuple(vec![list(vec![0i64]), step(i64::MAX)]));
        assert_eq!(r.shape(), &[1, 1]);
        assert_eq!(r.data(), &[0.0]);
    }

    #[test]
    fn test_out_of_bounds_integer() {
        let a = iota(&[4, 5]);
        let indexer = Indexer::new(&DenseOps);
        assert!(matches!(
            indexer.get_item(&a, &tuple(vec![full(), int(5)])),
            Err(IndexError::OutOfBounds {
                index: 5,
                axis: 1,
                size: 5
            })
        ));
        assert!(matches!(
            indexer.get_item(&a, &single(int(-5))),
            Err(IndexError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_minimal_plans() {
        let a = iota(&[4, 5]);
        let recorder = Recorder::new(DenseOps);
        let indexer = Indexer::new(&recorder);

        // A full tuple slice issues nothing.
        indexer.get_item(&a, &tuple(vec![full(), full()])).unwrap();
        assert!(recorder.take_calls().is_empty());

        // A pure slice read is one `slice`.
        indexer.get_item(&a, &tuple(vec![range(1, 3), step(2)])).unwrap();
        let names: Vec<_> = recorder.take_calls().iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["slice"]);

        // Integers without arrays slice and squeeze; no gather.
        indexer.get_item(&a, &tuple(vec![int(1), int(2)])).unwrap();
        let names: Vec<_> = recorder.take_calls().iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["slice", "squeeze"]);

        // One array: scalar index, gather, squeeze.
        indexer
            .get_item(&a, &tuple(vec![int(1), list(vec![0i64, 2])]))
            .unwrap();
        let names: Vec<_> = recorder.take_calls().iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["array", "full", "gather", "squeeze"]);
    }
}
