/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! The primitive seam between index planning and an array runtime.
//!
//! The planner never touches element data. Everything it emits is a
//! call on [`ArrayOps`]: `slice`, `gather`, `scatter`, `take`,
//! `reshape`, `squeeze`, `expand_dims`, `broadcast_to`,
//! `broadcast_arrays`, `arange` and a handful of elementwise helpers
//! used by compound assignment. Implementations are expected to be
//! total over well-formed arguments; an [`OpError`] coming back from a
//! call the planner computed indicates a planning bug, not bad user
//! input.

use std::fmt;
use std::str::FromStr;

use itertools::izip;
use serde::Deserialize;
use serde::Serialize;

/// The type of error for primitive array operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum OpError {
    #[error("cannot broadcast shape {from:?} to {to:?}")]
    Broadcast { from: Vec<usize>, to: Vec<usize> },

    #[error("incompatible shapes for broadcasting: {shapes:?}")]
    IncompatibleShapes { shapes: Vec<Vec<usize>> },

    #[error("cannot reshape array of size {size} into shape {shape:?}")]
    Reshape { size: usize, shape: Vec<usize> },

    #[error("axis {axis} out of range for {ndim}-dimensional array")]
    AxisOutOfRange { axis: isize, ndim: usize },

    #[error("cannot squeeze axis {axis} with size {size}")]
    NotSingleton { axis: usize, size: usize },

    #[error("index {index} out of range for axis {axis} of size {size}")]
    IndexOutOfRange { index: i64, axis: usize, size: usize },

    #[error("data of length {len} does not fill shape {shape:?}")]
    DataLength { len: usize, shape: Vec<usize> },

    #[error("invalid arguments to {op}: {reason}")]
    InvalidArgument { op: &'static str, reason: String },
}

/// Element types understood by the primitive seam.
///
/// Variants are ordered by promotion: combining two dtypes yields the
/// larger one.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize
)]
#[serde(rename_all = "lowercase")]
pub enum Dtype {
    Bool,
    UInt32,
    Int64,
    Float32,
}

impl Dtype {
    /// Whether values of this dtype are integers (booleans excluded).
    pub fn is_integral(self) -> bool {
        matches!(self, Dtype::UInt32 | Dtype::Int64)
    }

    pub fn is_floating(self) -> bool {
        matches!(self, Dtype::Float32)
    }

    /// The dtype both `self` and `other` convert to without loss.
    pub fn promote(self, other: Dtype) -> Dtype {
        std::cmp::max(self, other)
    }

    /// Round `value` to what this dtype can hold. Unsigned values wrap.
    pub fn cast(self, value: f64) -> f64 {
        match self {
            Dtype::Bool => {
                if value != 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Dtype::UInt32 => (value.trunc() as i64).rem_euclid(1 << 32) as f64,
            Dtype::Int64 => value.trunc(),
            Dtype::Float32 => value as f32 as f64,
        }
    }
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dtype::Bool => "bool",
            Dtype::UInt32 => "uint32",
            Dtype::Int64 => "int64",
            Dtype::Float32 => "float32",
        };
        f.write_str(name)
    }
}

impl FromStr for Dtype {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bool" => Ok(Dtype::Bool),
            "uint32" => Ok(Dtype::UInt32),
            "int64" => Ok(Dtype::Int64),
            "float32" => Ok(Dtype::Float32),
            other => Err(format!("unknown dtype `{}`", other)),
        }
    }
}

/// Combination applied by [`ArrayOps::scatter`] where an update lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScatterKind {
    Assign,
    Add,
    Prod,
    Max,
    Min,
}

/// Elementwise binary operators used when a write needs no index
/// tensors at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Maximum,
    Minimum,
}

impl BinaryOp {
    pub fn apply(self, lhs: f64, rhs: f64) -> f64 {
        match self {
            BinaryOp::Add => lhs + rhs,
            BinaryOp::Subtract => lhs - rhs,
            BinaryOp::Multiply => lhs * rhs,
            BinaryOp::Divide => lhs / rhs,
            BinaryOp::Maximum => lhs.max(rhs),
            BinaryOp::Minimum => lhs.min(rhs),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Negative,
    Reciprocal,
}

/// An array value as seen by the planner: only its shape and dtype
/// are ever inspected.
pub trait Array: Clone + fmt::Debug {
    fn shape(&self) -> &[usize];

    fn dtype(&self) -> Dtype;

    fn ndim(&self) -> usize {
        self.shape().len()
    }

    /// Total number of elements.
    fn size(&self) -> usize {
        self.shape().iter().product()
    }
}

/// The primitive operations index planning compiles to.
///
/// Conventions shared by all implementations:
///
/// - `slice` and `slice_update` take raw, possibly negative
///   `(start, end, stride)` triples per axis and normalize them against
///   the axis size the way NumPy does (see
///   [`ResolvedSlice::clamp`](crate::ResolvedSlice::clamp)).
/// - `gather` and `scatter` broadcast their index tensors together.
///   The result of `gather` (and the `update` of `scatter`) has shape
///   `broadcast(indices) ++ window`, where the window has one entry per
///   source axis. Negative index values wrap once.
/// - `squeeze` and `expand_dims` accept negative axes; for
///   `expand_dims` they count from the end of the *output*.
pub trait ArrayOps {
    type Array: Array;

    /// Materialize host data with the given shape, casting each value
    /// to `dtype`.
    fn array(
        &self,
        data: Vec<f64>,
        shape: Vec<usize>,
        dtype: Dtype,
    ) -> Result<Self::Array, OpError>;

    fn full(&self, shape: &[usize], value: f64, dtype: Dtype) -> Result<Self::Array, OpError> {
        let len = shape.iter().product();
        self.array(vec![value; len], shape.to_vec(), dtype)
    }

    fn arange(&self, start: i64, end: i64, stride: i64, dtype: Dtype)
    -> Result<Self::Array, OpError>;

    fn slice(
        &self,
        src: &Self::Array,
        starts: &[i64],
        ends: &[i64],
        strides: &[i64],
    ) -> Result<Self::Array, OpError>;

    /// Overwrite the strided region of `src` with `update`, broadcast
    /// to the region's shape.
    fn slice_update(
        &self,
        src: &Self::Array,
        update: &Self::Array,
        starts: &[i64],
        ends: &[i64],
        strides: &[i64],
    ) -> Result<Self::Array, OpError>;

    fn gather(
        &self,
        src: &Self::Array,
        indices: &[Self::Array],
        axes: &[usize],
        slice_sizes: &[usize],
    ) -> Result<Self::Array, OpError>;

    fn scatter(
        &self,
        src: &Self::Array,
        indices: &[Self::Array],
        update: &Self::Array,
        axes: &[usize],
        kind: ScatterKind,
    ) -> Result<Self::Array, OpError>;

    fn take(
        &self,
        src: &Self::Array,
        index: &Self::Array,
        axis: usize,
    ) -> Result<Self::Array, OpError>;

    fn reshape(&self, src: &Self::Array, shape: &[usize]) -> Result<Self::Array, OpError>;

    fn squeeze(&self, src: &Self::Array, axes: &[isize]) -> Result<Self::Array, OpError>;

    fn expand_dims(&self, src: &Self::Array, axes: &[isize]) -> Result<Self::Array, OpError>;

    fn broadcast_to(&self, src: &Self::Array, shape: &[usize]) -> Result<Self::Array, OpError>;

    fn broadcast_arrays(&self, arrays: &[Self::Array]) -> Result<Vec<Self::Array>, OpError>;

    fn binary(
        &self,
        lhs: &Self::Array,
        rhs: &Self::Array,
        op: BinaryOp,
    ) -> Result<Self::Array, OpError>;

    fn unary(&self, src: &Self::Array, op: UnaryOp) -> Result<Self::Array, OpError>;

    fn astype(&self, src: &Self::Array, dtype: Dtype) -> Result<Self::Array, OpError>;
}

/// Compute the NumPy broadcast of `shapes`.
pub fn broadcast_shapes(shapes: &[&[usize]]) -> Result<Vec<usize>, OpError> {
    let ndim = shapes.iter().map(|s| s.len()).max().unwrap_or(0);
    let mut out = vec![1usize; ndim];
    for shape in shapes {
        let offset = ndim - shape.len();
        for (out_dim, &dim) in out[offset..].iter_mut().zip(shape.iter()) {
            if *out_dim == 1 {
                *out_dim = dim;
            } else if dim != 1 && dim != *out_dim {
                return Err(OpError::IncompatibleShapes {
                    shapes: shapes.iter().map(|s| s.to_vec()).collect(),
                });
            }
        }
    }
    Ok(out)
}

/// Whether an array of shape `from` broadcasts to exactly `to`.
pub fn broadcastable(from: &[usize], to: &[usize]) -> bool {
    if from.len() > to.len() {
        return false;
    }
    let offset = to.len() - from.len();
    izip!(from, &to[offset..]).all(|(&f, &t)| f == t || f == 1)
}
