/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! The general write path.
//!
//! Every write is expressed as a [`ScatterPlan`]: index tensors, the
//! source axes they address, and an update shaped `broadcast(indices)
//! ++ window`, where the window has one entry per source axis. Axes
//! addressed by an integer, an index array or a strided slice get a
//! window of 1; a unit-stride slice that comes after all of those is
//! addressed by its start offset alone and gets a window of its
//! length. Unaddressed trailing axes get their full size.
//!
//! A plan without indices means the update already covers the whole
//! destination and is applied elementwise.

use crate::index::IndexEntry;
use crate::index::IndexError;
use crate::index::IndexExpression;
use crate::index::SliceSpec;
use crate::indexer::Indexer;
use crate::normalize::AxisIndex;
use crate::normalize::check_index_array;
use crate::normalize::normalize;
use crate::normalize::normalize_integer;
use crate::ops::Array;
use crate::ops::ArrayOps;
use crate::ops::broadcastable;
use crate::placement::Placement;
use crate::slice::ResolvedSlice;

/// The arguments of a scatter-family call.
#[derive(Debug, Clone)]
pub struct ScatterPlan<A> {
    pub indices: Vec<A>,
    /// Shaped `broadcast(indices) ++ window`.
    pub update: A,
    pub axes: Vec<usize>,
}

impl<A> ScatterPlan<A> {
    /// Whether the update covers the whole destination, so no scatter
    /// is needed.
    pub fn is_elementwise(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Whether each entry is a simple slice: unit stride, with no index
/// array, newaxis or strided slice anywhere after it.
fn simple_slices<A: Array>(entries: &[AxisIndex<A>]) -> Vec<bool> {
    let mut simple = vec![false; entries.len()];
    let mut tail_ok = true;
    for (i, entry) in entries.iter().enumerate().rev() {
        match entry {
            AxisIndex::Slice(spec) => {
                let unit = spec.stride() == 1;
                simple[i] = tail_ok && unit;
                tail_ok &= unit;
            }
            AxisIndex::Array(_) | AxisIndex::NewAxis => tail_ok = false,
            AxisIndex::Integer(_) => {}
        }
    }
    simple
}

impl<O: ArrayOps> Indexer<'_, O> {
    /// Plan the write `dst[index] = update`. `update` must already have
    /// the destination's dtype.
    pub fn scatter_plan(
        &self,
        dst: &O::Array,
        index: &IndexExpression<O::Array>,
        update: &O::Array,
    ) -> Result<ScatterPlan<O::Array>, IndexError> {
        match index {
            IndexExpression::Single(IndexEntry::Slice(spec)) => self.scatter_slice(dst, spec, update),
            IndexExpression::Single(IndexEntry::Integer(i)) => self.scatter_int(dst, *i, update),
            IndexExpression::Single(IndexEntry::Array(a)) => {
                check_index_array(a)?;
                self.scatter_array(dst, a, update)
            }
            IndexExpression::Single(IndexEntry::List(list)) => {
                let index = list.to_index_array(self.ops())?;
                self.scatter_array(dst, &index, update)
            }
            IndexExpression::Single(IndexEntry::NewAxis | IndexEntry::Ellipsis) => {
                self.scatter_all(dst, update)
            }
            IndexExpression::Tuple(entries) => self.scatter_nd(dst, entries, update),
        }
    }

    /// Drop leading size-1 axes of `update` beyond the rank of
    /// `target`, as NumPy does for assignment, and check that the rest
    /// broadcasts to `target`.
    pub(crate) fn strip_update(
        &self,
        update: &O::Array,
        target: &[usize],
    ) -> Result<O::Array, IndexError> {
        let shape = update.shape();
        let strip = shape
            .iter()
            .take(shape.len().saturating_sub(target.len()))
            .take_while(|&&d| d == 1)
            .count();

        if !broadcastable(&shape[strip..], target) {
            return Err(IndexError::UpdateShape {
                update: shape.to_vec(),
                target: target.to_vec(),
            });
        }
        if strip == 0 {
            return Ok(update.clone());
        }
        let axes: Vec<isize> = (0..strip as isize).collect();
        Ok(self.ops().squeeze(update, &axes)?)
    }

    /// Fit `update` to a write whose selection has shape `target`, then
    /// lay it out as `layout`, which differs from `target` only by
    /// size-1 axes.
    pub(crate) fn fit_update(
        &self,
        update: &O::Array,
        target: &[usize],
        layout: &[usize],
    ) -> Result<O::Array, IndexError> {
        let ops = self.ops();
        let mut up = self.strip_update(update, target)?;
        if up.shape() != target {
            up = ops.broadcast_to(&up, target)?;
        }
        if up.shape() != layout {
            up = ops.reshape(&up, layout)?;
        }
        Ok(up)
    }

    fn scatter_all(
        &self,
        dst: &O::Array,
        update: &O::Array,
    ) -> Result<ScatterPlan<O::Array>, IndexError> {
        Ok(ScatterPlan {
            indices: vec![],
            update: self.fit_update(update, dst.shape(), dst.shape())?,
            axes: vec![],
        })
    }

    fn scatter_slice(
        &self,
        dst: &O::Array,
        spec: &SliceSpec,
        update: &O::Array,
    ) -> Result<ScatterPlan<O::Array>, IndexError> {
        if dst.ndim() == 0 {
            return Err(IndexError::ZeroDimensional);
        }
        if spec.is_full() {
            return self.scatter_all(dst, update);
        }

        let shape = dst.shape();
        let r = ResolvedSlice::resolve(spec, shape[0])?.clamp(shape[0]);
        if r.stride != 1 {
            let index = self.range_index(&r)?;
            return self.scatter_array(dst, &index, update);
        }

        // A unit-stride slice is one window starting at `start`.
        let index = self
            .ops()
            .array(vec![r.start as f64], vec![1], self.config().index_dtype)?;
        let mut target = vec![1, r.len()];
        target.extend_from_slice(&shape[1..]);
        Ok(ScatterPlan {
            indices: vec![index],
            update: self.fit_update(update, &target, &target)?,
            axes: vec![0],
        })
    }

    fn scatter_int(
        &self,
        dst: &O::Array,
        i: i64,
        update: &O::Array,
    ) -> Result<ScatterPlan<O::Array>, IndexError> {
        if dst.ndim() == 0 {
            return Err(IndexError::ZeroDimensional);
        }
        let shape = dst.shape();
        let index = self.scalar_index(normalize_integer(i, 0, shape[0])?)?;
        let mut target = vec![1];
        target.extend_from_slice(&shape[1..]);
        Ok(ScatterPlan {
            indices: vec![index],
            update: self.fit_update(update, &shape[1..], &target)?,
            axes: vec![0],
        })
    }

    fn scatter_array(
        &self,
        dst: &O::Array,
        index: &O::Array,
        update: &O::Array,
    ) -> Result<ScatterPlan<O::Array>, IndexError> {
        if dst.ndim() == 0 {
            return Err(IndexError::ZeroDimensional);
        }
        let shape = dst.shape();
        let mut target = index.shape().to_vec();
        target.extend_from_slice(&shape[1..]);
        let mut layout = index.shape().to_vec();
        layout.push(1);
        layout.extend_from_slice(&shape[1..]);
        Ok(ScatterPlan {
            indices: vec![index.clone()],
            update: self.fit_update(update, &target, &layout)?,
            axes: vec![0],
        })
    }

    fn scatter_nd(
        &self,
        dst: &O::Array,
        entries: &[IndexEntry<O::Array>],
        update: &O::Array,
    ) -> Result<ScatterPlan<O::Array>, IndexError> {
        let ops = self.ops();
        let shape = dst.shape();
        let normalized = normalize(ops, shape, entries)?;
        let non_none = normalized.non_none;
        if non_none == 0 {
            return self.scatter_all(dst, update);
        }

        let entries = &normalized.entries;
        let placement = Placement::plan(entries);
        let max_rank = placement.max_advanced_rank;
        let arrays_first = placement.gather_first;
        let simple = simple_slices(entries);

        let num_none = entries.iter().filter(|e| !e.consumes_axis()).count();
        let num_slices = entries
            .iter()
            .filter(|e| matches!(e, AxisIndex::Slice(_)))
            .count();
        let num_simple = simple.iter().filter(|&&s| s).count();
        let index_rank = (max_rank + num_none + num_slices - num_simple).max(1);

        let mut indices = Vec::with_capacity(non_none);
        let mut window = vec![1usize; non_none];
        let mut simple_lens = Vec::new();
        // Next free index axis for a newaxis or strided slice.
        let mut slot = 0;
        let mut arrays_seen = 0;
        let mut axis = 0;

        for (entry, &is_simple) in entries.iter().zip(&simple) {
            match entry {
                AxisIndex::Slice(spec) => {
                    let r = ResolvedSlice::resolve(spec, shape[axis])?.clamp(shape[axis]);
                    if is_simple {
                        indices.push(ops.array(
                            vec![r.start as f64],
                            vec![1; index_rank],
                            self.config().index_dtype,
                        )?);
                        window[axis] = r.len();
                        simple_lens.push(r.len());
                    } else {
                        let range = self.range_index(&r)?;
                        let mut range_shape = vec![1; index_rank];
                        range_shape[slot + if arrays_first { max_rank } else { 0 }] = r.len();
                        indices.push(ops.reshape(&range, &range_shape)?);
                        slot += 1;
                    }
                    axis += 1;
                }
                AxisIndex::Integer(i) => {
                    let i = normalize_integer(*i, axis, shape[axis])?;
                    indices.push(self.scalar_index(i)?);
                    axis += 1;
                }
                AxisIndex::NewAxis => slot += 1,
                AxisIndex::Array(a) => {
                    // Right-align within the advanced block.
                    let start = if arrays_first { 0 } else { slot } + max_rank - a.ndim();
                    let mut array_shape = vec![1; index_rank];
                    array_shape[start..start + a.ndim()].copy_from_slice(a.shape());
                    indices.push(if a.shape() == array_shape.as_slice() {
                        a.clone()
                    } else {
                        ops.reshape(a, &array_shape)?
                    });
                    arrays_seen += 1;
                    if !arrays_first && arrays_seen == placement.num_arrays {
                        slot += max_rank;
                    }
                    axis += 1;
                }
            }
        }

        let indices = ops.broadcast_arrays(&indices)?;
        let index_shape = indices
            .first()
            .map(|a| a.shape().to_vec())
            .unwrap_or_default();

        let trailing = &shape[non_none..];
        let target: Vec<usize> = index_shape
            .iter()
            .chain(&simple_lens)
            .chain(trailing)
            .copied()
            .collect();
        let layout: Vec<usize> = index_shape
            .iter()
            .chain(&window)
            .chain(trailing)
            .copied()
            .collect();

        tracing::debug!(
            num_indices = indices.len(),
            index_rank,
            num_simple,
            arrays_first,
            "planned scatter"
        );

        let axes = (0..indices.len()).collect();
        Ok(ScatterPlan {
            indices,
            update: self.fit_update(update, &target, &layout)?,
            axes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dense::DenseArray;
    use crate::dense::DenseOps;
    use crate::index::dsl::*;
    use crate::ops::Dtype;

    fn zeros(shape: &[usize]) -> DenseArray {
        let len = shape.iter().product();
        DenseArray::new(vec![0.0; len], shape.to_vec(), Dtype::Float32).unwrap()
    }

    fn plan(
        dst: &DenseArray,
        index: IndexExpression<DenseArray>,
        update: &DenseArray,
    ) -> ScatterPlan<DenseArray> {
        Indexer::new(&DenseOps)
            .scatter_plan(dst, &index, update)
            .unwrap()
    }

    fn shapes(plan: &ScatterPlan<DenseArray>) -> (Vec<Vec<usize>>, Vec<usize>, Vec<usize>) {
        (
            plan.indices.iter().map(|i| i.shape().to_vec()).collect(),
            plan.update.shape().to_vec(),
            plan.axes.clone(),
        )
    }

    #[test]
    fn test_simple_slices() {
        let full = AxisIndex::<DenseArray>::Slice(SliceSpec::full());
        let strided = AxisIndex::Slice(SliceSpec::new(None, None, Some(2)));
        let arr = AxisIndex::Array(zeros(&[2]));

        assert_eq!(simple_slices(&[full.clone(), full.clone()]), vec![true, true]);
        assert_eq!(
            simple_slices(&[full.clone(), arr.clone(), full.clone()]),
            vec![false, false, true]
        );
        assert_eq!(
            simple_slices(&[full.clone(), strided.clone(), full.clone()]),
            vec![false, false, true]
        );
        assert_eq!(
            simple_slices(&[full.clone(), AxisIndex::NewAxis]),
            vec![false, false]
        );
        assert_eq!(
            simple_slices(&[full.clone(), AxisIndex::Integer(0), full]),
            vec![true, false, true]
        );
    }

    #[test]
    fn test_single_slice() {
        let a = zeros(&[4, 5]);
        let p = plan(&a, single(range(1, 3)), &DenseArray::scalar(1.0, Dtype::Float32));
        assert_eq!(shapes(&p), (vec![vec![1]], vec![1, 2, 5], vec![0]));
        assert_eq!(p.indices[0].data(), &[1.0]);

        // Bounds are clamped before the length is taken.
        let p = plan(&a, single(slice(Some(-2), Some(100), None)), &DenseArray::scalar(1.0, Dtype::Float32));
        assert_eq!(shapes(&p).1, vec![1, 2, 5]);
        assert_eq!(p.indices[0].data(), &[2.0]);

        // Strided slices become index arrays.
        let p = plan(&a, single(step(-2)), &DenseArray::scalar(1.0, Dtype::Float32));
        assert_eq!(shapes(&p), (vec![vec![2]], vec![2, 1, 5], vec![0]));
        assert_eq!(p.indices[0].data(), &[3.0, 1.0]);

        let p = plan(&a, single(full()), &zeros(&[5]));
        assert!(p.is_elementwise());
        assert_eq!(p.update.shape(), &[4, 5]);
    }

    #[test]
    fn test_single_int_and_array() {
        let a = zeros(&[4, 5]);
        let p = plan(&a, single(int(-1)), &zeros(&[1, 1, 5]));
        assert_eq!(shapes(&p), (vec![vec![]], vec![1, 5], vec![0]));
        assert_eq!(p.indices[0].data(), &[3.0]);

        let p = plan(&a, single(list(vec![0i64, 2, 3])), &zeros(&[3, 1]));
        assert_eq!(shapes(&p), (vec![vec![3]], vec![3, 1, 5], vec![0]));
    }

    #[test]
    fn test_nd_pointwise() {
        // a[[0, 2], [1, 3]] = [1, 13]
        let a = zeros(&[4, 5]);
        let u = DenseArray::new(vec![1.0, 13.0], vec![2], Dtype::Float32).unwrap();
        let p = plan(&a, tuple(vec![list(vec![0i64, 2]), list(vec![1i64, 3])]), &u);
        assert_eq!(shapes(&p), (vec![vec![2], vec![2]], vec![2, 1, 1], vec![0, 1]));
    }

    #[test]
    fn test_nd_simple_slice_window() {
        // a[[0, 1], 1:3] on (4, 5): the trailing slice is a window.
        let a = zeros(&[4, 5]);
        let p = plan(&a, tuple(vec![list(vec![0i64, 1]), range(1, 3)]), &zeros(&[2, 2]));
        assert_eq!(
            shapes(&p),
            (vec![vec![2], vec![2]], vec![2, 1, 2], vec![0, 1])
        );
        assert_eq!(p.indices[1].data(), &[1.0, 1.0]);

        // a[:, 0] has no advanced index: one start offset per axis.
        let p = plan(&a, tuple(vec![full(), int(0)]), &zeros(&[4]));
        assert_eq!(shapes(&p), (vec![vec![1], vec![1]], vec![1, 4, 1], vec![0, 1]));
    }

    #[test]
    fn test_nd_matches_read_shapes() {
        let a = zeros(&[2, 3, 4]);

        // a[0, :, [1, 2]] reads shape (2, 3).
        let p = plan(&a, tuple(vec![int(0), full(), list(vec![1i64, 2])]), &zeros(&[2, 3]));
        assert_eq!(p.update.shape(), &[2, 3, 1, 1, 1]);

        // a[[0, 1], 1:3, None] reads shape (2, 2, 1).
        let p = plan(
            &a,
            tuple(vec![list(vec![0i64, 1]), range(1, 3), newaxis()]),
            &zeros(&[2, 2, 1, 4]),
        );
        assert_eq!(p.update.shape(), &[2, 2, 1, 1, 1, 4]);

        // a[::2, [0, 2]] reads shape (1, 2, 4).
        let p = plan(&a, tuple(vec![step(2), list(vec![0i64, 2])]), &zeros(&[1, 2, 4]));
        assert_eq!(p.update.shape(), &[1, 2, 1, 1, 4]);
    }

    #[test]
    fn test_update_shape_error() {
        let a = zeros(&[4, 5]);
        let err = Indexer::new(&DenseOps)
            .scatter_plan(&a, &single(range(0, 2)), &zeros(&[3, 5]))
            .unwrap_err();
        assert!(matches!(err, IndexError::UpdateShape { .. }));
    }
}
