/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! An eager, row-major reference runtime.
//!
//! [`DenseOps`] implements every primitive of [`ArrayOps`] directly
//! over a `Vec<f64>`. Values are stored widened to `f64` and rounded
//! to the array's [`Dtype`] whenever an array is produced, which is
//! exact for every dtype the seam knows about as long as integers stay
//! below 2^53.
//!
//! This is the runtime the planner's tests run against. It favors
//! obviously-correct loops over speed.

mod layout;

use itertools::izip;
use serde::Deserialize;
use serde::Serialize;

use crate::ops::Array;
use crate::ops::ArrayOps;
use crate::ops::BinaryOp;
use crate::ops::Dtype;
use crate::ops::OpError;
use crate::ops::ScatterKind;
use crate::ops::UnaryOp;
use crate::ops::broadcast_shapes;
use crate::ops::broadcastable;
use crate::slice::ResolvedSlice;
use layout::CartesianIterator;
use layout::broadcast_offset;
use layout::offset;
use layout::row_major_strides;

/// A dense, row-major array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseArray {
    shape: Vec<usize>,
    dtype: Dtype,
    data: Vec<f64>,
}

impl DenseArray {
    /// Build an array from row-major `data`, rounding every value to
    /// `dtype`.
    pub fn new(data: Vec<f64>, shape: Vec<usize>, dtype: Dtype) -> Result<Self, OpError> {
        let len: usize = shape.iter().product();
        if data.len() != len {
            return Err(OpError::DataLength {
                len: data.len(),
                shape,
            });
        }
        let data = data.into_iter().map(|v| dtype.cast(v)).collect();
        Ok(Self { shape, dtype, data })
    }

    /// A 0-dimensional array holding `value`.
    pub fn scalar(value: f64, dtype: Dtype) -> Self {
        Self {
            shape: vec![],
            dtype,
            data: vec![dtype.cast(value)],
        }
    }

    /// `0, 1, ..., size - 1` laid out in `shape`.
    pub fn iota(shape: Vec<usize>, dtype: Dtype) -> Self {
        let len: usize = shape.iter().product();
        let data = (0..len).map(|v| dtype.cast(v as f64)).collect();
        Self { shape, dtype, data }
    }

    /// The elements in row-major order.
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// The element at `coord`, if it is in bounds.
    pub fn get(&self, coord: &[usize]) -> Option<f64> {
        if coord.len() != self.shape.len() || izip!(coord, &self.shape).any(|(c, d)| c >= d) {
            return None;
        }
        Some(self.data[offset(coord, &row_major_strides(&self.shape))])
    }

    fn strides(&self) -> Vec<usize> {
        row_major_strides(&self.shape)
    }
}

impl Array for DenseArray {
    fn shape(&self) -> &[usize] {
        &self.shape
    }

    fn dtype(&self) -> Dtype {
        self.dtype
    }
}

/// The [`ArrayOps`] implementation for [`DenseArray`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DenseOps;

fn invalid(op: &'static str, reason: impl Into<String>) -> OpError {
    OpError::InvalidArgument {
        op,
        reason: reason.into(),
    }
}

/// Resolve possibly negative `axes` against `ndim`, rejecting
/// duplicates.
fn resolve_axes(axes: &[isize], ndim: usize) -> Result<Vec<usize>, OpError> {
    let mut resolved = Vec::with_capacity(axes.len());
    for &axis in axes {
        let a = if axis < 0 { axis + ndim as isize } else { axis };
        if a < 0 || a >= ndim as isize {
            return Err(OpError::AxisOutOfRange { axis, ndim });
        }
        let a = a as usize;
        if resolved.contains(&a) {
            return Err(invalid("axes", format!("repeated axis {}", axis)));
        }
        resolved.push(a);
    }
    Ok(resolved)
}

/// Clamp per-axis `(start, end, stride)` triples against `shape`.
fn resolve_region(
    op: &'static str,
    shape: &[usize],
    starts: &[i64],
    ends: &[i64],
    strides: &[i64],
) -> Result<Vec<ResolvedSlice>, OpError> {
    if starts.len() != shape.len() || ends.len() != shape.len() || strides.len() != shape.len() {
        return Err(invalid(
            op,
            format!("expected {} start/end/stride values", shape.len()),
        ));
    }
    izip!(shape, starts, ends, strides)
        .map(|(&size, &start, &end, &stride)| {
            if stride == 0 {
                return Err(invalid(op, "zero stride"));
            }
            Ok(ResolvedSlice::new(start, end, stride).clamp(size))
        })
        .collect()
}

/// Read a non-negative index value, wrapping negatives once.
fn wrap_index(value: f64, axis: usize, size: usize) -> Result<usize, OpError> {
    let index = value as i64;
    let wrapped = if index < 0 { index + size as i64 } else { index };
    if wrapped < 0 || wrapped >= size as i64 {
        return Err(OpError::IndexOutOfRange { index, axis, size });
    }
    Ok(wrapped as usize)
}

impl DenseOps {
    /// Broadcast `indices` and read them as per-axis start offsets.
    ///
    /// Returns the broadcast index shape and, for each index position,
    /// the window origin in `src` coordinates.
    fn window_origins(
        &self,
        op: &'static str,
        shape: &[usize],
        indices: &[DenseArray],
        axes: &[usize],
        window: &[usize],
    ) -> Result<(Vec<usize>, Vec<Vec<usize>>), OpError> {
        if indices.len() != axes.len() {
            return Err(invalid(op, "one axis is required per index array"));
        }
        if window.len() != shape.len() {
            return Err(invalid(op, "window rank must match the source rank"));
        }
        if let Some(&axis) = axes.iter().find(|&&axis| axis >= shape.len()) {
            return Err(OpError::AxisOutOfRange {
                axis: axis as isize,
                ndim: shape.len(),
            });
        }
        if let Some(index) = indices.iter().find(|a| !a.dtype.is_integral()) {
            return Err(invalid(
                op,
                format!("index arrays must be integral, got {}", index.dtype),
            ));
        }
        let indices = self.broadcast_arrays(indices)?;
        let index_shape = indices
            .first()
            .map(|a| a.shape.clone())
            .unwrap_or_default();

        // With no index positions nothing is read or written, and the
        // window may exceed an empty axis.
        let count: usize = index_shape.iter().product();
        if count == 0 {
            return Ok((index_shape, vec![]));
        }
        for (axis, (&w, &size)) in window.iter().zip(shape).enumerate() {
            if w > size {
                return Err(invalid(
                    op,
                    format!("window {} exceeds axis {} of size {}", w, axis, size),
                ));
            }
        }

        let mut origins = Vec::with_capacity(count);
        for pos in 0..count {
            let mut origin = vec![0usize; shape.len()];
            for (index, &axis) in indices.iter().zip(axes) {
                // An empty window may start one past the end.
                let size = shape[axis] as i64;
                let raw = index.data[pos] as i64;
                let start = if raw < 0 { raw + size } else { raw };
                if start < 0 || start + window[axis] as i64 > size {
                    return Err(OpError::IndexOutOfRange {
                        index: raw,
                        axis,
                        size: shape[axis],
                    });
                }
                origin[axis] = start as usize;
            }
            origins.push(origin);
        }
        Ok((index_shape, origins))
    }
}

impl ArrayOps for DenseOps {
    type Array = DenseArray;

    fn array(&self, data: Vec<f64>, shape: Vec<usize>, dtype: Dtype) -> Result<DenseArray, OpError> {
        DenseArray::new(data, shape, dtype)
    }

    fn arange(&self, start: i64, end: i64, stride: i64, dtype: Dtype) -> Result<DenseArray, OpError> {
        if stride == 0 {
            return Err(invalid("arange", "zero stride"));
        }
        let range = ResolvedSlice::new(start, end, stride);
        let data: Vec<f64> = range.positions().map(|v| v as f64).collect();
        let len = data.len();
        DenseArray::new(data, vec![len], dtype)
    }

    fn slice(
        &self,
        src: &DenseArray,
        starts: &[i64],
        ends: &[i64],
        strides: &[i64],
    ) -> Result<DenseArray, OpError> {
        let region = resolve_region("slice", &src.shape, starts, ends, strides)?;
        let shape: Vec<usize> = region.iter().map(ResolvedSlice::len).collect();
        let src_strides = src.strides();
        let data = CartesianIterator::new(shape.clone())
            .map(|coord| {
                let at: usize = izip!(&coord, &region, &src_strides)
                    .map(|(&c, r, &s)| (r.start + c as i64 * r.stride) as usize * s)
                    .sum();
                src.data[at]
            })
            .collect();
        Ok(DenseArray {
            shape,
            dtype: src.dtype,
            data,
        })
    }

    fn slice_update(
        &self,
        src: &DenseArray,
        update: &DenseArray,
        starts: &[i64],
        ends: &[i64],
        strides: &[i64],
    ) -> Result<DenseArray, OpError> {
        let region = resolve_region("slice_update", &src.shape, starts, ends, strides)?;
        let shape: Vec<usize> = region.iter().map(ResolvedSlice::len).collect();
        let update = self.broadcast_to(update, &shape)?;
        let dst_strides = src.strides();
        let mut out = src.clone();
        for (value, coord) in update.data.iter().zip(CartesianIterator::new(shape)) {
            let at: usize = izip!(&coord, &region, &dst_strides)
                .map(|(&c, r, &s)| (r.start + c as i64 * r.stride) as usize * s)
                .sum();
            out.data[at] = out.dtype.cast(*value);
        }
        Ok(out)
    }

    fn gather(
        &self,
        src: &DenseArray,
        indices: &[DenseArray],
        axes: &[usize],
        slice_sizes: &[usize],
    ) -> Result<DenseArray, OpError> {
        let (index_shape, origins) =
            self.window_origins("gather", &src.shape, indices, axes, slice_sizes)?;
        let src_strides = src.strides();
        let mut data = Vec::with_capacity(origins.len() * slice_sizes.iter().product::<usize>());
        for origin in &origins {
            for w in CartesianIterator::new(slice_sizes.to_vec()) {
                let at: usize = izip!(origin, &w, &src_strides)
                    .map(|(o, w, s)| (o + w) * s)
                    .sum();
                data.push(src.data[at]);
            }
        }
        let mut shape = index_shape;
        shape.extend_from_slice(slice_sizes);
        Ok(DenseArray {
            shape,
            dtype: src.dtype,
            data,
        })
    }

    fn scatter(
        &self,
        src: &DenseArray,
        indices: &[DenseArray],
        update: &DenseArray,
        axes: &[usize],
        kind: ScatterKind,
    ) -> Result<DenseArray, OpError> {
        if update.shape.len() < src.shape.len() {
            return Err(invalid("scatter", "update rank is below the source rank"));
        }
        let lead = update.shape.len() - src.shape.len();
        let window = &update.shape[lead..];
        let (index_shape, origins) =
            self.window_origins("scatter", &src.shape, indices, axes, window)?;
        if index_shape != update.shape[..lead] {
            return Err(invalid(
                "scatter",
                format!(
                    "update shape {:?} does not start with index shape {:?}",
                    update.shape, index_shape
                ),
            ));
        }

        let dst_strides = src.strides();
        let mut out = src.clone();
        let mut values = update.data.iter();
        for origin in &origins {
            for w in CartesianIterator::new(window.to_vec()) {
                let Some(&value) = values.next() else {
                    return Err(invalid("scatter", "update is shorter than its shape"));
                };
                let at: usize = izip!(origin, &w, &dst_strides)
                    .map(|(o, w, s)| (o + w) * s)
                    .sum();
                let current = out.data[at];
                out.data[at] = match kind {
                    ScatterKind::Assign => value,
                    ScatterKind::Add => current + value,
                    ScatterKind::Prod => current * value,
                    ScatterKind::Max => current.max(value),
                    ScatterKind::Min => current.min(value),
                };
            }
        }
        let dtype = out.dtype;
        out.data.iter_mut().for_each(|v| *v = dtype.cast(*v));
        Ok(out)
    }

    fn take(&self, src: &DenseArray, index: &DenseArray, axis: usize) -> Result<DenseArray, OpError> {
        if axis >= src.shape.len() {
            return Err(OpError::AxisOutOfRange {
                axis: axis as isize,
                ndim: src.shape.len(),
            });
        }
        if !index.dtype.is_integral() {
            return Err(invalid(
                "take",
                format!("index arrays must be integral, got {}", index.dtype),
            ));
        }
        let outer: usize = src.shape[..axis].iter().product();
        let inner: usize = src.shape[axis + 1..].iter().product();
        let size = src.shape[axis];
        let positions = index
            .data
            .iter()
            .map(|&v| wrap_index(v, axis, size))
            .collect::<Result<Vec<_>, _>>()?;

        let mut data = Vec::with_capacity(outer * positions.len() * inner);
        for o in 0..outer {
            for &p in &positions {
                let base = (o * size + p) * inner;
                data.extend_from_slice(&src.data[base..base + inner]);
            }
        }
        let mut shape = src.shape[..axis].to_vec();
        shape.extend_from_slice(&index.shape);
        shape.extend_from_slice(&src.shape[axis + 1..]);
        Ok(DenseArray {
            shape,
            dtype: src.dtype,
            data,
        })
    }

    fn reshape(&self, src: &DenseArray, shape: &[usize]) -> Result<DenseArray, OpError> {
        if shape.iter().product::<usize>() != src.data.len() {
            return Err(OpError::Reshape {
                size: src.data.len(),
                shape: shape.to_vec(),
            });
        }
        Ok(DenseArray {
            shape: shape.to_vec(),
            dtype: src.dtype,
            data: src.data.clone(),
        })
    }

    fn squeeze(&self, src: &DenseArray, axes: &[isize]) -> Result<DenseArray, OpError> {
        let axes = resolve_axes(axes, src.shape.len())?;
        if let Some(&axis) = axes.iter().find(|&&a| src.shape[a] != 1) {
            return Err(OpError::NotSingleton {
                axis,
                size: src.shape[axis],
            });
        }
        let shape: Vec<usize> = src
            .shape
            .iter()
            .enumerate()
            .filter(|(i, _)| !axes.contains(i))
            .map(|(_, &d)| d)
            .collect();
        self.reshape(src, &shape)
    }

    fn expand_dims(&self, src: &DenseArray, axes: &[isize]) -> Result<DenseArray, OpError> {
        let ndim = src.shape.len() + axes.len();
        let axes = resolve_axes(axes, ndim)?;
        let mut dims = src.shape.iter();
        let shape: Vec<usize> = (0..ndim)
            .map(|i| {
                if axes.contains(&i) {
                    1
                } else {
                    dims.next().copied().unwrap_or(1)
                }
            })
            .collect();
        self.reshape(src, &shape)
    }

    fn broadcast_to(&self, src: &DenseArray, shape: &[usize]) -> Result<DenseArray, OpError> {
        if !broadcastable(&src.shape, shape) {
            return Err(OpError::Broadcast {
                from: src.shape.clone(),
                to: shape.to_vec(),
            });
        }
        if src.shape == shape {
            return Ok(src.clone());
        }
        let src_strides = src.strides();
        let data = CartesianIterator::new(shape.to_vec())
            .map(|coord| src.data[broadcast_offset(&coord, &src.shape, &src_strides)])
            .collect();
        Ok(DenseArray {
            shape: shape.to_vec(),
            dtype: src.dtype,
            data,
        })
    }

    fn broadcast_arrays(&self, arrays: &[DenseArray]) -> Result<Vec<DenseArray>, OpError> {
        let shapes: Vec<&[usize]> = arrays.iter().map(|a| a.shape.as_slice()).collect();
        let shape = broadcast_shapes(&shapes)?;
        arrays.iter().map(|a| self.broadcast_to(a, &shape)).collect()
    }

    fn binary(&self, lhs: &DenseArray, rhs: &DenseArray, op: BinaryOp) -> Result<DenseArray, OpError> {
        let shape = broadcast_shapes(&[&lhs.shape, &rhs.shape])?;
        let dtype = match op {
            BinaryOp::Divide => lhs.dtype.promote(rhs.dtype).promote(Dtype::Float32),
            _ => lhs.dtype.promote(rhs.dtype),
        };
        let lhs = self.broadcast_to(lhs, &shape)?;
        let rhs = self.broadcast_to(rhs, &shape)?;
        let data = izip!(&lhs.data, &rhs.data)
            .map(|(&l, &r)| dtype.cast(op.apply(l, r)))
            .collect();
        Ok(DenseArray { shape, dtype, data })
    }

    fn unary(&self, src: &DenseArray, op: UnaryOp) -> Result<DenseArray, OpError> {
        let dtype = match op {
            UnaryOp::Negative => src.dtype,
            UnaryOp::Reciprocal => src.dtype.promote(Dtype::Float32),
        };
        let data = src
            .data
            .iter()
            .map(|&v| match op {
                UnaryOp::Negative => dtype.cast(-v),
                UnaryOp::Reciprocal => dtype.cast(1.0 / v),
            })
            .collect();
        Ok(DenseArray {
            shape: src.shape.clone(),
            dtype,
            data,
        })
    }

    fn astype(&self, src: &DenseArray, dtype: Dtype) -> Result<DenseArray, OpError> {
        DenseArray::new(src.data.clone(), src.shape.clone(), dtype)
    }
}
