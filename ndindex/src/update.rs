/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Assignment and in-place update.
//!
//! Writes whose index has no arrays or lists can be expressed as one
//! strided region, and are compiled to a single `slice_update` when the
//! configuration allows it. Everything else goes through a
//! [`ScatterPlan`](crate::scatter::ScatterPlan).

use serde::Deserialize;
use serde::Serialize;

use crate::gather::full_region;
use crate::index::IndexEntry;
use crate::index::IndexError;
use crate::index::IndexExpression;
use crate::index::Operand;
use crate::indexer::Indexer;
use crate::normalize::BasicIndex;
use crate::normalize::normalize;
use crate::normalize::normalize_integer;
use crate::ops::Array;
use crate::ops::ArrayOps;
use crate::ops::BinaryOp;
use crate::ops::ScatterKind;
use crate::ops::UnaryOp;
use crate::slice::ResolvedSlice;

/// The combining operation of a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpdateOp {
    /// `a[i] = v`
    Assign,
    /// `a[i] += v`
    Add,
    /// `a[i] -= v`
    Subtract,
    /// `a[i] *= v`
    Multiply,
    /// `a[i] /= v`
    Divide,
    Maximum,
    Minimum,
}

impl UpdateOp {
    /// The scatter variant that applies this operation. Subtraction and
    /// division scatter the negated or reciprocal update.
    pub fn scatter_kind(self) -> ScatterKind {
        match self {
            UpdateOp::Assign => ScatterKind::Assign,
            UpdateOp::Add | UpdateOp::Subtract => ScatterKind::Add,
            UpdateOp::Multiply | UpdateOp::Divide => ScatterKind::Prod,
            UpdateOp::Maximum => ScatterKind::Max,
            UpdateOp::Minimum => ScatterKind::Min,
        }
    }

    /// The elementwise operation combining the destination with the
    /// update, or `None` for plain assignment.
    pub fn binary_op(self) -> Option<BinaryOp> {
        match self {
            UpdateOp::Assign => None,
            UpdateOp::Add => Some(BinaryOp::Add),
            UpdateOp::Subtract => Some(BinaryOp::Subtract),
            UpdateOp::Multiply => Some(BinaryOp::Multiply),
            UpdateOp::Divide => Some(BinaryOp::Divide),
            UpdateOp::Maximum => Some(BinaryOp::Maximum),
            UpdateOp::Minimum => Some(BinaryOp::Minimum),
        }
    }

    fn scatter_transform(self) -> Option<UnaryOp> {
        match self {
            UpdateOp::Subtract => Some(UnaryOp::Negative),
            UpdateOp::Divide => Some(UnaryOp::Reciprocal),
            _ => None,
        }
    }
}

impl<O: ArrayOps> Indexer<'_, O> {
    /// Perform `dst[index] = value`. On error `dst` is left untouched.
    pub fn set_item(
        &self,
        dst: &mut O::Array,
        index: &IndexExpression<O::Array>,
        value: &Operand<O::Array>,
    ) -> Result<(), IndexError> {
        let ops = self.ops();
        let update = value.to_value_array(ops, dst.dtype())?;

        if self.config().slice_update_fast_path {
            if let Some(out) = self.try_slice_update(dst, index, &update)? {
                tracing::debug!(%index, "write compiled to slice_update");
                *dst = out;
                return Ok(());
            }
        }

        let plan = self.scatter_plan(dst, index, &update)?;
        let out = if plan.is_elementwise() {
            tracing::debug!(%index, "write covers the whole array");
            plan.update
        } else {
            tracing::debug!(%index, num_indices = plan.indices.len(), "write compiled to scatter");
            ops.scatter(dst, &plan.indices, &plan.update, &plan.axes, ScatterKind::Assign)?
        };
        *dst = out;
        Ok(())
    }

    /// Perform `dst[index] op= value`. Repeated positions in index
    /// arrays accumulate for every operation but [`UpdateOp::Assign`].
    pub fn update_item(
        &self,
        dst: &mut O::Array,
        index: &IndexExpression<O::Array>,
        op: UpdateOp,
        value: &Operand<O::Array>,
    ) -> Result<(), IndexError> {
        let Some(binary) = op.binary_op() else {
            return self.set_item(dst, index, value);
        };

        let ops = self.ops();
        let update = value.to_value_array(ops, dst.dtype())?;
        let plan = self.scatter_plan(dst, index, &update)?;

        let out = if plan.is_elementwise() {
            tracing::debug!(%index, ?op, "update applied elementwise");
            let combined = ops.binary(dst, &plan.update, binary)?;
            if combined.dtype() == dst.dtype() {
                combined
            } else {
                ops.astype(&combined, dst.dtype())?
            }
        } else {
            tracing::debug!(%index, ?op, num_indices = plan.indices.len(), "update compiled to scatter");
            let update = match op.scatter_transform() {
                Some(unary) => ops.unary(&plan.update, unary)?,
                None => plan.update,
            };
            ops.scatter(dst, &plan.indices, &update, &plan.axes, op.scatter_kind())?
        };
        *dst = out;
        Ok(())
    }

    /// Compile `dst[index] = update` to one `slice_update`, or return
    /// `None` if the index needs a scatter.
    ///
    /// The update is brought to the rank of the written region: integer
    /// positions get a size-1 axis inserted, newaxis positions have
    /// theirs removed. Update axes are matched from the right, so
    /// positions to the left of the update's leading axis are left
    /// alone.
    pub(crate) fn try_slice_update(
        &self,
        dst: &O::Array,
        index: &IndexExpression<O::Array>,
        update: &O::Array,
    ) -> Result<Option<O::Array>, IndexError> {
        let ops = self.ops();
        let shape = dst.shape();
        if shape.is_empty() {
            return Ok(None);
        }

        let entries = match index {
            IndexExpression::Single(
                entry @ (IndexEntry::Slice(_) | IndexEntry::Integer(_) | IndexEntry::Ellipsis),
            ) => std::slice::from_ref(entry),
            IndexExpression::Single(_) => return Ok(None),
            IndexExpression::Tuple(entries) if index.has_array_like() => {
                tracing::trace!(entries = entries.len(), "index arrays present, no fast path");
                return Ok(None);
            }
            IndexExpression::Tuple(entries) => entries.as_slice(),
        };

        let normalized = normalize(ops, shape, entries)?;
        let basic: Vec<BasicIndex> = normalized
            .entries
            .iter()
            .filter_map(|e| e.to_basic())
            .collect();

        let (mut starts, mut ends, mut strides) = full_region(shape);
        let mut read_shape = Vec::with_capacity(basic.len() + shape.len());
        let mut axis = 0;
        for entry in &basic {
            match entry {
                BasicIndex::NewAxis => {
                    read_shape.push(1);
                    continue;
                }
                BasicIndex::Integer(i) => {
                    let i = normalize_integer(*i, axis, shape[axis])?;
                    starts[axis] = i;
                    ends[axis] = i + 1;
                }
                BasicIndex::Slice(spec) => {
                    let r = ResolvedSlice::resolve(spec, shape[axis])?;
                    read_shape.push(r.clamp(shape[axis]).len());
                    starts[axis] = r.start;
                    ends[axis] = r.end;
                    strides[axis] = r.stride;
                }
            }
            axis += 1;
        }
        let unspecified = shape.len() - axis;
        read_shape.extend_from_slice(&shape[axis..]);

        let mut up = self.strip_update(update, &read_shape)?;
        if normalized.non_none == 0 {
            // Only newaxis entries: the write covers the whole array.
            let extra = up.ndim().saturating_sub(shape.len());
            if extra > 0 {
                let axes: Vec<isize> = (0..extra as isize).collect();
                up = ops.squeeze(&up, &axes)?;
            }
            if up.shape() != shape {
                up = ops.broadcast_to(&up, shape)?;
            }
            return Ok(Some(up));
        }

        let mut expand = Vec::new();
        let mut squeeze = Vec::new();
        let total = (basic.len() + unspecified) as isize;
        let mut update_axis = up.ndim() as isize - unspecified as isize - 1;
        for (pos, entry) in basic.iter().enumerate().rev() {
            let from_end = pos as isize - total;
            match entry {
                BasicIndex::Slice(_) => update_axis -= 1,
                BasicIndex::Integer(_) => {
                    if update_axis >= 0 {
                        expand.push(from_end);
                    }
                }
                BasicIndex::NewAxis => {
                    if update_axis >= 0 {
                        squeeze.push(from_end);
                    }
                    update_axis -= 1;
                }
            }
        }
        if !expand.is_empty() {
            up = ops.expand_dims(&up, &expand)?;
        }
        if !squeeze.is_empty() {
            up = ops.squeeze(&up, &squeeze)?;
        }

        Ok(Some(ops.slice_update(dst, &up, &starts, &ends, &strides)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexingConfig;
    use crate::dense::DenseArray;
    use crate::dense::DenseOps;
    use crate::index::ListLiteral;
    use crate::index::dsl::*;
    use crate::indexer::IndexingExt;
    use crate::ops::Dtype;
    use crate::record::Recorder;

    fn iota(shape: &[usize]) -> DenseArray {
        DenseArray::iota(shape.to_vec(), Dtype::Int64)
    }

    fn values(data: Vec<f64>, shape: &[usize]) -> DenseArray {
        DenseArray::new(data, shape.to_vec(), Dtype::Int64).unwrap()
    }

    /// Perform the write with and without the fast path and check they
    /// agree.
    fn write(
        dst: &DenseArray,
        index: IndexExpression<DenseArray>,
        value: Operand<DenseArray>,
    ) -> DenseArray {
        let fast = Indexer::new(&DenseOps);
        let general = Indexer::with_config(
            &DenseOps,
            IndexingConfig {
                slice_update_fast_path: false,
                ..Default::default()
            },
        );
        let mut a = dst.clone();
        fast.set_item(&mut a, &index, &value).unwrap();
        let mut b = dst.clone();
        general.set_item(&mut b, &index, &value).unwrap();
        assert_eq!(a, b, "fast path disagrees for {}", index);
        a
    }

    #[test]
    fn test_update_op_mapping() {
        assert_eq!(UpdateOp::Subtract.scatter_kind(), ScatterKind::Add);
        assert_eq!(UpdateOp::Divide.scatter_kind(), ScatterKind::Prod);
        assert_eq!(UpdateOp::Assign.binary_op(), None);
        assert_eq!(UpdateOp::Minimum.binary_op(), Some(BinaryOp::Minimum));
        assert_eq!(
            serde_json::to_string(&UpdateOp::Maximum).unwrap(),
            "\"Maximum\""
        );
    }

    #[test]
    fn test_assign_row_slice() {
        let a = write(&iota(&[4, 5]), tuple(vec![int(1), range(1, 4)]), Operand::Scalar(0.0));
        assert_eq!(&a.data()[5..10], &[5.0, 0.0, 0.0, 0.0, 9.0]);
    }

    #[test]
    fn test_assign_column() {
        let col = values(vec![-1.0, -2.0, -3.0, -4.0], &[4]);
        let a = write(&iota(&[4, 5]), tuple(vec![full(), int(0)]), Operand::Array(col));
        assert_eq!(a.get(&[2, 0]), Some(-3.0));
        assert_eq!(a.get(&[2, 1]), Some(11.0));
    }

    #[test]
    fn test_assign_with_leading_singletons() {
        // a[0, :] = ones((1, 5))
        let ones = values(vec![1.0; 5], &[1, 5]);
        let a = write(&iota(&[4, 5]), tuple(vec![int(0), full()]), Operand::Array(ones));
        assert_eq!(&a.data()[..6], &[1.0, 1.0, 1.0, 1.0, 1.0, 5.0]);
    }

    #[test]
    fn test_assign_with_newaxis() {
        let b = iota(&[2, 3, 4]);
        let x = values(vec![7.0, 8.0, 9.0], &[1, 3]);
        let out = write(&b, tuple(vec![int(0), newaxis(), full(), int(1)]), Operand::Array(x));
        assert_eq!(out.get(&[0, 0, 1]), Some(7.0));
        assert_eq!(out.get(&[0, 2, 1]), Some(9.0));
        assert_eq!(out.get(&[1, 2, 1]), b.get(&[1, 2, 1]));

        let y = values((0..12).map(|v| -v as f64).collect(), &[1, 3, 4]);
        let out = write(&b, tuple(vec![int(1), newaxis()]), Operand::Array(y));
        assert_eq!(out.get(&[1, 2, 3]), Some(-11.0));
        assert_eq!(out.get(&[0, 2, 3]), Some(11.0));
    }

    #[test]
    fn test_assign_reversed_and_strided() {
        let row = values(vec![10.0, 11.0, 12.0], &[3]);
        let a = write(&iota(&[2, 6]), tuple(vec![int(-1), slice(None, None, Some(-2))]), Operand::Array(row));
        // Positions 5, 3, 1 of the last row.
        assert_eq!(&a.data()[6..], &[6.0, 12.0, 8.0, 11.0, 10.0, 10.0]);
    }

    #[test]
    fn test_assign_extreme_step() {
        let a = write(&iota(&[4, 2]), single(step(i64::MIN)), Operand::Scalar(-1.0));
        assert_eq!(a.data(), &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0, -1.0, -1.0]);
    }

    #[test]
    fn test_write_to_empty_axis() {
        // a[:, [0]] = 1 on (0, 3) writes nothing.
        let empty = iota(&[0, 3]);
        let index = tuple(vec![full(), list(vec![0i64])]);
        let a = write(&empty, index.clone(), Operand::Scalar(1.0));
        assert_eq!(a, empty);

        let mut b = empty.clone();
        Indexer::new(&DenseOps)
            .update_item(&mut b, &index, UpdateOp::Add, &Operand::Scalar(1.0))
            .unwrap();
        assert_eq!(b, empty);
    }

    #[test]
    fn test_assign_everything() {
        let a = write(&iota(&[2, 3]), single(ellipsis()), Operand::Scalar(4.0));
        assert_eq!(a.data(), &[4.0; 6]);
        let a = write(&iota(&[2, 3]), tuple(vec![newaxis()]), Operand::Scalar(4.0));
        assert_eq!(a.data(), &[4.0; 6]);
    }

    #[test]
    fn test_assign_pointwise() {
        // a[[0, 2], [1, 3]] = [1, 13]
        let mut a = iota(&[4, 5]);
        DenseOps
            .set_item(
                &mut a,
                &tuple(vec![list(vec![0i64, 2]), list(vec![1i64, 3])]),
                &Operand::List(ListLiteral::from(vec![1i64, 13])),
            )
            .unwrap();
        assert_eq!(a.get(&[0, 1]), Some(1.0));
        assert_eq!(a.get(&[2, 3]), Some(13.0));
        assert_eq!(a.get(&[1, 1]), Some(6.0));
    }

    #[test]
    fn test_add_to_rows() {
        // a[0:2] += 10
        let mut a = iota(&[4, 5]);
        Indexer::new(&DenseOps)
            .update_item(&mut a, &single(range(0, 2)), UpdateOp::Add, &Operand::Scalar(10.0))
            .unwrap();
        assert_eq!(a.get(&[0, 0]), Some(10.0));
        assert_eq!(a.get(&[1, 4]), Some(19.0));
        assert_eq!(a.get(&[2, 0]), Some(10.0));
    }

    #[test]
    fn test_repeated_indices_accumulate() {
        let mut a = DenseArray::new(vec![0.0; 3], vec![3], Dtype::Float32).unwrap();
        Indexer::new(&DenseOps)
            .update_item(
                &mut a,
                &single(list(vec![0i64, 0, 2])),
                UpdateOp::Add,
                &Operand::Scalar(1.0),
            )
            .unwrap();
        assert_eq!(a.data(), &[2.0, 0.0, 1.0]);
    }

    #[test]
    fn test_subtract_and_divide() {
        let indexer = Indexer::new(&DenseOps);
        let mut a = DenseArray::new(vec![8.0; 4], vec![4], Dtype::Float32).unwrap();
        indexer
            .update_item(&mut a, &single(list(vec![1i64, 2])), UpdateOp::Subtract, &Operand::Scalar(3.0))
            .unwrap();
        indexer
            .update_item(&mut a, &single(step(2)), UpdateOp::Divide, &Operand::Scalar(4.0))
            .unwrap();
        assert_eq!(a.data(), &[2.0, 5.0, 1.25, 8.0]);
    }

    #[test]
    fn test_elementwise_update_keeps_dtype() {
        let mut a = iota(&[2, 2]);
        Indexer::new(&DenseOps)
            .update_item(&mut a, &single(ellipsis()), UpdateOp::Divide, &Operand::Scalar(2.0))
            .unwrap();
        assert_eq!(a.dtype(), Dtype::Int64);
        assert_eq!(a.data(), &[0.0, 0.0, 1.0, 1.0]);

        let mut b = iota(&[3]);
        Indexer::new(&DenseOps)
            .update_item(&mut b, &single(full()), UpdateOp::Maximum, &Operand::Scalar(1.0))
            .unwrap();
        assert_eq!(b.data(), &[1.0, 1.0, 2.0]);
    }

    #[test]
    fn test_failed_write_leaves_destination() {
        let mut a = iota(&[4, 5]);
        let before = a.clone();
        let err = Indexer::new(&DenseOps)
            .set_item(
                &mut a,
                &single(range(0, 2)),
                &Operand::Array(values(vec![0.0; 3], &[3])),
            )
            .unwrap_err();
        assert!(matches!(err, IndexError::UpdateShape { .. }));
        assert_eq!(a, before);

        assert!(matches!(
            Indexer::new(&DenseOps).set_item(&mut a, &single(int(4)), &Operand::Scalar(0.0)),
            Err(IndexError::OutOfBounds { .. })
        ));
        assert_eq!(a, before);
    }

    #[test]
    fn test_fast_path_is_one_slice_update() {
        let recorder = Recorder::new(DenseOps);
        let mut a = iota(&[4, 5]);
        Indexer::new(&recorder)
            .set_item(&mut a, &tuple(vec![range(1, 3), step(2)]), &Operand::Scalar(0.0))
            .unwrap();
        let names: Vec<_> = recorder.take_calls().iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["full", "slice_update"]);
    }
}
