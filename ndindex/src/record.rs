/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! A pass-through [`ArrayOps`] that records every primitive call.
//!
//! Recorded calls keep only argument shapes, dtypes and scalar
//! parameters, so two plans can be compared structurally, or
//! serialized to inspect what an index expression compiles to.

use std::sync::Mutex;
use std::sync::MutexGuard;

use serde::Deserialize;
use serde::Serialize;

use crate::ops::Array;
use crate::ops::ArrayOps;
use crate::ops::BinaryOp;
use crate::ops::Dtype;
use crate::ops::OpError;
use crate::ops::ScatterKind;
use crate::ops::UnaryOp;

/// One recorded primitive call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum PrimitiveCall {
    Array {
        shape: Vec<usize>,
        dtype: Dtype,
    },
    Full {
        shape: Vec<usize>,
        value: f64,
        dtype: Dtype,
    },
    Arange {
        start: i64,
        end: i64,
        stride: i64,
        dtype: Dtype,
    },
    Slice {
        src: Vec<usize>,
        starts: Vec<i64>,
        ends: Vec<i64>,
        strides: Vec<i64>,
    },
    SliceUpdate {
        src: Vec<usize>,
        update: Vec<usize>,
        starts: Vec<i64>,
        ends: Vec<i64>,
        strides: Vec<i64>,
    },
    Gather {
        src: Vec<usize>,
        indices: Vec<Vec<usize>>,
        axes: Vec<usize>,
        slice_sizes: Vec<usize>,
    },
    Scatter {
        src: Vec<usize>,
        indices: Vec<Vec<usize>>,
        update: Vec<usize>,
        axes: Vec<usize>,
        kind: ScatterKind,
    },
    Take {
        src: Vec<usize>,
        index: Vec<usize>,
        axis: usize,
    },
    Reshape {
        src: Vec<usize>,
        shape: Vec<usize>,
    },
    Squeeze {
        src: Vec<usize>,
        axes: Vec<isize>,
    },
    ExpandDims {
        src: Vec<usize>,
        axes: Vec<isize>,
    },
    BroadcastTo {
        src: Vec<usize>,
        shape: Vec<usize>,
    },
    BroadcastArrays {
        shapes: Vec<Vec<usize>>,
    },
    Binary {
        lhs: Vec<usize>,
        rhs: Vec<usize>,
        op: BinaryOp,
    },
    Unary {
        src: Vec<usize>,
        op: UnaryOp,
    },
    Astype {
        src: Vec<usize>,
        dtype: Dtype,
    },
}

impl PrimitiveCall {
    /// The name of the primitive, as in [`ArrayOps`].
    pub fn name(&self) -> &'static str {
        match self {
            PrimitiveCall::Array { .. } => "array",
            PrimitiveCall::Full { .. } => "full",
            PrimitiveCall::Arange { .. } => "arange",
            PrimitiveCall::Slice { .. } => "slice",
            PrimitiveCall::SliceUpdate { .. } => "slice_update",
            PrimitiveCall::Gather { .. } => "gather",
            PrimitiveCall::Scatter { .. } => "scatter",
            PrimitiveCall::Take { .. } => "take",
            PrimitiveCall::Reshape { .. } => "reshape",
            PrimitiveCall::Squeeze { .. } => "squeeze",
            PrimitiveCall::ExpandDims { .. } => "expand_dims",
            PrimitiveCall::BroadcastTo { .. } => "broadcast_to",
            PrimitiveCall::BroadcastArrays { .. } => "broadcast_arrays",
            PrimitiveCall::Binary { .. } => "binary",
            PrimitiveCall::Unary { .. } => "unary",
            PrimitiveCall::Astype { .. } => "astype",
        }
    }
}

fn shapes<A: Array>(arrays: &[A]) -> Vec<Vec<usize>> {
    arrays.iter().map(|a| a.shape().to_vec()).collect()
}

/// Wraps an [`ArrayOps`] implementation, forwarding every call and
/// recording it.
#[derive(Debug, Default)]
pub struct Recorder<O> {
    inner: O,
    calls: Mutex<Vec<PrimitiveCall>>,
}

impl<O> Recorder<O> {
    pub fn new(inner: O) -> Self {
        Self {
            inner,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn inner(&self) -> &O {
        &self.inner
    }

    fn lock(&self) -> MutexGuard<'_, Vec<PrimitiveCall>> {
        // A poisoned log is still a complete list of calls.
        self.calls.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, call: PrimitiveCall) {
        tracing::trace!(op = call.name(), "primitive call");
        self.lock().push(call);
    }

    /// The calls recorded so far.
    pub fn calls(&self) -> Vec<PrimitiveCall> {
        self.lock().clone()
    }

    /// The calls recorded so far, clearing the log.
    pub fn take_calls(&self) -> Vec<PrimitiveCall> {
        std::mem::take(&mut *self.lock())
    }
}

impl<O: ArrayOps> ArrayOps for Recorder<O> {
    type Array = O::Array;

    fn array(
        &self,
        data: Vec<f64>,
        shape: Vec<usize>,
        dtype: Dtype,
    ) -> Result<Self::Array, OpError> {
        self.record(PrimitiveCall::Array {
            shape: shape.clone(),
            dtype,
        });
        self.inner.array(data, shape, dtype)
    }

    fn full(&self, shape: &[usize], value: f64, dtype: Dtype) -> Result<Self::Array, OpError> {
        self.record(PrimitiveCall::Full {
            shape: shape.to_vec(),
            value,
            dtype,
        });
        self.inner.full(shape, value, dtype)
    }

    fn arange(
        &self,
        start: i64,
        end: i64,
        stride: i64,
        dtype: Dtype,
    ) -> Result<Self::Array, OpError> {
        self.record(PrimitiveCall::Arange {
            start,
            end,
            stride,
            dtype,
        });
        self.inner.arange(start, end, stride, dtype)
    }

    fn slice(
        &self,
        src: &Self::Array,
        starts: &[i64],
        ends: &[i64],
        strides: &[i64],
    ) -> Result<Self::Array, OpError> {
        self.record(PrimitiveCall::Slice {
            src: src.shape().to_vec(),
            starts: starts.to_vec(),
            ends: ends.to_vec(),
            strides: strides.to_vec(),
        });
        self.inner.slice(src, starts, ends, strides)
    }

    fn slice_update(
        &self,
        src: &Self::Array,
        update: &Self::Array,
        starts: &[i64],
        ends: &[i64],
        strides: &[i64],
    ) -> Result<Self::Array, OpError> {
        self.record(PrimitiveCall::SliceUpdate {
            src: src.shape().to_vec(),
            update: update.shape().to_vec(),
            starts: starts.to_vec(),
            ends: ends.to_vec(),
            strides: strides.to_vec(),
        });
        self.inner.slice_update(src, update, starts, ends, strides)
    }

    fn gather(
        &self,
        src: &Self::Array,
        indices: &[Self::Array],
        axes: &[usize],
        slice_sizes: &[usize],
    ) -> Result<Self::Array, OpError> {
        self.record(PrimitiveCall::Gather {
            src: src.shape().to_vec(),
            indices: shapes(indices),
            axes: axes.to_vec(),
            slice_sizes: slice_sizes.to_vec(),
        });
        self.inner.gather(src, indices, axes, slice_sizes)
    }

    fn scatter(
        &self,
        src: &Self::Array,
        indices: &[Self::Array],
        update: &Self::Array,
        axes: &[usize],
        kind: ScatterKind,
    ) -> Result<Self::Array, OpError> {
        self.record(PrimitiveCall::Scatter {
            src: src.shape().to_vec(),
            indices: shapes(indices),
            update: update.shape().to_vec(),
            axes: axes.to_vec(),
            kind,
        });
        self.inner.scatter(src, indices, update, axes, kind)
    }

    fn take(
        &self,
        src: &Self::Array,
        index: &Self::Array,
        axis: usize,
    ) -> Result<Self::Array, OpError> {
        self.record(PrimitiveCall::Take {
            src: src.shape().to_vec(),
            index: index.shape().to_vec(),
            axis,
        });
        self.inner.take(src, index, axis)
    }

    fn reshape(&self, src: &Self::Array, shape: &[usize]) -> Result<Self::Array, OpError> {
        self.record(PrimitiveCall::Reshape {
            src: src.shape().to_vec(),
            shape: shape.to_vec(),
        });
        self.inner.reshape(src, shape)
    }

    fn squeeze(&self, src: &Self::Array, axes: &[isize]) -> Result<Self::Array, OpError> {
        self.record(PrimitiveCall::Squeeze {
            src: src.shape().to_vec(),
            axes: axes.to_vec(),
        });
        self.inner.squeeze(src, axes)
    }

    fn expand_dims(&self, src: &Self::Array, axes: &[isize]) -> Result<Self::Array, OpError> {
        self.record(PrimitiveCall::ExpandDims {
            src: src.shape().to_vec(),
            axes: axes.to_vec(),
        });
        self.inner.expand_dims(src, axes)
    }

    fn broadcast_to(&self, src: &Self::Array, shape: &[usize]) -> Result<Self::Array, OpError> {
        self.record(PrimitiveCall::BroadcastTo {
            src: src.shape().to_vec(),
            shape: shape.to_vec(),
        });
        self.inner.broadcast_to(src, shape)
    }

    fn broadcast_arrays(&self, arrays: &[Self::Array]) -> Result<Vec<Self::Array>, OpError> {
        self.record(PrimitiveCall::BroadcastArrays {
            shapes: shapes(arrays),
        });
        self.inner.broadcast_arrays(arrays)
    }

    fn binary(
        &self,
        lhs: &Self::Array,
        rhs: &Self::Array,
        op: BinaryOp,
    ) -> Result<Self::Array, OpError> {
        self.record(PrimitiveCall::Binary {
            lhs: lhs.shape().to_vec(),
            rhs: rhs.shape().to_vec(),
            op,
        });
        self.inner.binary(lhs, rhs, op)
    }

    fn unary(&self, src: &Self::Array, op: UnaryOp) -> Result<Self::Array, OpError> {
        self.record(PrimitiveCall::Unary {
            src: src.shape().to_vec(),
            op,
        });
        self.inner.unary(src, op)
    }

    fn astype(&self, src: &Self::Array, dtype: Dtype) -> Result<Self::Array, OpError> {
        self.record(PrimitiveCall::Astype {
            src: src.shape().to_vec(),
            dtype,
        });
        self.inner.astype(src, dtype)
    }
}
