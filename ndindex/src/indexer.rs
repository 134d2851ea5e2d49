/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use crate::config::IndexingConfig;
use crate::index::IndexError;
use crate::index::IndexExpression;
use crate::index::Operand;
use crate::ops::ArrayOps;
use crate::slice::ResolvedSlice;
use crate::update::UpdateOp;

/// Compiles index expressions into calls on an [`ArrayOps`]
/// implementation.
///
/// An `Indexer` holds no state besides its configuration: the same
/// expression applied to arrays of the same shape always issues the
/// same sequence of primitive calls.
///
/// ```
/// use ndindex::Indexer;
/// use ndindex::dense::DenseArray;
/// use ndindex::dense::DenseOps;
/// use ndindex::dsl::*;
/// use ndindex::ops::Array;
/// use ndindex::ops::Dtype;
///
/// let a = DenseArray::iota(vec![4, 5], Dtype::Int64);
/// let indexer = Indexer::new(&DenseOps);
/// let row = indexer.get_item(&a, &tuple(vec![int(1), step(-1)])).unwrap();
/// assert_eq!(row.shape(), &[5]);
/// assert_eq!(row.data(), &[9.0, 8.0, 7.0, 6.0, 5.0]);
/// ```
#[derive(Debug, Clone)]
pub struct Indexer<'a, O> {
    ops: &'a O,
    config: IndexingConfig,
}

impl<'a, O: ArrayOps> Indexer<'a, O> {
    /// An indexer with the default configuration.
    pub fn new(ops: &'a O) -> Self {
        Self::with_config(ops, IndexingConfig::default())
    }

    pub fn with_config(ops: &'a O, config: IndexingConfig) -> Self {
        Self { ops, config }
    }

    pub fn ops(&self) -> &'a O {
        self.ops
    }

    pub fn config(&self) -> &IndexingConfig {
        &self.config
    }

    /// A 0-d index tensor holding `value`, which must already be
    /// normalized.
    pub(crate) fn scalar_index(&self, value: i64) -> Result<O::Array, IndexError> {
        Ok(self.ops.full(&[], value as f64, self.config.index_dtype)?)
    }

    /// A 1-d index tensor enumerating the positions of a clamped slice.
    pub(crate) fn range_index(&self, r: &ResolvedSlice) -> Result<O::Array, IndexError> {
        Ok(self
            .ops
            .arange(r.start, r.end, r.stride, self.config.index_dtype)?)
    }
}

/// Indexing methods on any [`ArrayOps`] implementation, using the
/// default configuration.
pub trait IndexingExt: ArrayOps + Sized {
    /// `src[index]`
    fn get_item(
        &self,
        src: &Self::Array,
        index: &IndexExpression<Self::Array>,
    ) -> Result<Self::Array, IndexError> {
        Indexer::new(self).get_item(src, index)
    }

    /// `dst[index] = value`
    fn set_item(
        &self,
        dst: &mut Self::Array,
        index: &IndexExpression<Self::Array>,
        value: &Operand<Self::Array>,
    ) -> Result<(), IndexError> {
        Indexer::new(self).set_item(dst, index, value)
    }

    /// `dst[index] op= value`
    fn update_item(
        &self,
        dst: &mut Self::Array,
        index: &IndexExpression<Self::Array>,
        op: UpdateOp,
        value: &Operand<Self::Array>,
    ) -> Result<(), IndexError> {
        Indexer::new(self).update_item(dst, index, op, value)
    }
}

impl<O: ArrayOps> IndexingExt for O {}
