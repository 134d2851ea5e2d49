/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Index expressions.
//!
//! An [`IndexExpression`] is what a NumPy-style subscript `a[...]`
//! denotes once a host language has parsed it: either a single
//! [`IndexEntry`] (`a[1:3]`) or a tuple of entries (`a[1:3, None,
//! [0, 2]]`). The distinction matters: single entries have dedicated
//! lowering rules that avoid the general tuple machinery.
//!
//! Entries are a closed set. Anything a host language can express
//! that is not one of these variants (boolean masks in particular) is
//! rejected during normalization with an [`IndexError`].

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::ops::Array;
use crate::ops::ArrayOps;
use crate::ops::Dtype;
use crate::ops::OpError;

/// The type of error for index planning.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum IndexError {
    #[error("too many indices for array: array is 0-dimensional")]
    ZeroDimensional,

    #[error("too many indices for array with {ndim} dimensions")]
    TooManyIndices { ndim: usize },

    #[error("index {index} is out of bounds for axis {axis} with size {size}")]
    OutOfBounds { index: i64, axis: usize, size: usize },

    #[error("an index can only have a single ellipsis (...)")]
    MultipleEllipsis,

    #[error("boolean indices are not yet supported")]
    BooleanMask,

    #[error("cannot index an array using {kind}")]
    UnsupportedIndex { kind: String },

    #[error("slice indices must be integers or None, got `{bound}`")]
    NonIntegerSliceBound { bound: String },

    #[error("arrays used as indices must be of integer type, got {found}")]
    NonIntegerIndex { found: String },

    #[error("slice step cannot be zero")]
    ZeroStep,

    #[error("list literal is not rectangular")]
    RaggedList,

    #[error("cannot broadcast update of shape {update:?} to shape {target:?}")]
    UpdateShape {
        update: Vec<usize>,
        target: Vec<usize>,
    },

    #[error(transparent)]
    Op(#[from] OpError),
}

/// A slice with optional bounds, as written: `start:stop:step`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SliceSpec {
    pub start: Option<i64>,
    pub stop: Option<i64>,
    pub step: Option<i64>,
}

impl SliceSpec {
    pub fn new(start: Option<i64>, stop: Option<i64>, step: Option<i64>) -> Self {
        Self { start, stop, step }
    }

    /// The slice `:`.
    pub fn full() -> Self {
        Self::default()
    }

    /// Whether no bound at all was given.
    pub fn is_full(&self) -> bool {
        self.start.is_none() && self.stop.is_none() && self.step.is_none()
    }

    /// The step, defaulting to 1.
    pub fn stride(&self) -> i64 {
        self.step.unwrap_or(1)
    }
}

impl From<std::ops::Range<i64>> for SliceSpec {
    fn from(r: std::ops::Range<i64>) -> Self {
        Self::new(Some(r.start), Some(r.end), None)
    }
}

impl From<std::ops::RangeFrom<i64>> for SliceSpec {
    fn from(r: std::ops::RangeFrom<i64>) -> Self {
        Self::new(Some(r.start), None, None)
    }
}

impl From<std::ops::RangeTo<i64>> for SliceSpec {
    fn from(r: std::ops::RangeTo<i64>) -> Self {
        Self::new(None, Some(r.end), None)
    }
}

impl From<std::ops::RangeFull> for SliceSpec {
    fn from(_: std::ops::RangeFull) -> Self {
        Self::full()
    }
}

impl fmt::Display for SliceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(start) = self.start {
            write!(f, "{}", start)?;
        }
        write!(f, ":")?;
        if let Some(stop) = self.stop {
            write!(f, "{}", stop)?;
        }
        if let Some(step) = self.step {
            write!(f, ":{}", step)?;
        }
        Ok(())
    }
}

/// A (possibly nested) list literal, such as `[[0, 1], [2, 3]]`.
///
/// Lists show up both as indices (`a[[0, 2]]`) and as values
/// (`a[0] = [1, 2, 3]`). They are converted to arrays explicitly, by
/// [`ListLiteral::to_index_array`] and [`ListLiteral::to_value_array`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ListLiteral {
    Int(i64),
    Float(f64),
    Bool(bool),
    List(Vec<ListLiteral>),
}

impl ListLiteral {
    /// Split into a rectangular shape and the row-major leaves.
    pub fn flatten(&self) -> Result<(Vec<usize>, Vec<&ListLiteral>), IndexError> {
        match self {
            ListLiteral::List(items) => {
                let mut shape: Option<Vec<usize>> = None;
                let mut leaves = Vec::new();
                for item in items {
                    let (item_shape, item_leaves) = item.flatten()?;
                    match &shape {
                        Some(shape) if *shape != item_shape => return Err(IndexError::RaggedList),
                        Some(_) => {}
                        None => shape = Some(item_shape),
                    }
                    leaves.extend(item_leaves);
                }
                let mut out = vec![items.len()];
                out.extend(shape.unwrap_or_default());
                Ok((out, leaves))
            }
            leaf => Ok((vec![], vec![leaf])),
        }
    }

    /// Materialize as an int64 index array. Booleans make this a mask,
    /// which is unsupported; floats are not valid indices.
    pub fn to_index_array<O: ArrayOps>(&self, ops: &O) -> Result<O::Array, IndexError> {
        let (shape, leaves) = self.flatten()?;
        let mut data = Vec::with_capacity(leaves.len());
        for leaf in leaves {
            match leaf {
                ListLiteral::Int(v) => data.push(*v as f64),
                ListLiteral::Bool(_) => return Err(IndexError::BooleanMask),
                ListLiteral::Float(v) => {
                    return Err(IndexError::NonIntegerIndex {
                        found: v.to_string(),
                    });
                }
                ListLiteral::List(_) => {
                    return Err(IndexError::UnsupportedIndex {
                        kind: "a nested list".to_string(),
                    });
                }
            }
        }
        Ok(ops.array(data, shape, Dtype::Int64)?)
    }

    /// Materialize as a value array of `dtype`.
    pub fn to_value_array<O: ArrayOps>(&self, ops: &O, dtype: Dtype) -> Result<O::Array, IndexError> {
        let (shape, leaves) = self.flatten()?;
        let data = leaves
            .into_iter()
            .map(|leaf| match leaf {
                ListLiteral::Int(v) => *v as f64,
                ListLiteral::Float(v) => *v,
                ListLiteral::Bool(v) => f64::from(u8::from(*v)),
                ListLiteral::List(_) => 0.0,
            })
            .collect();
        Ok(ops.array(data, shape, dtype)?)
    }
}

impl From<i64> for ListLiteral {
    fn from(v: i64) -> Self {
        ListLiteral::Int(v)
    }
}

impl From<f64> for ListLiteral {
    fn from(v: f64) -> Self {
        ListLiteral::Float(v)
    }
}

impl From<bool> for ListLiteral {
    fn from(v: bool) -> Self {
        ListLiteral::Bool(v)
    }
}

impl<T: Into<ListLiteral>> From<Vec<T>> for ListLiteral {
    fn from(items: Vec<T>) -> Self {
        ListLiteral::List(items.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for ListLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListLiteral::Int(v) => write!(f, "{}", v),
            ListLiteral::Float(v) if v.fract() == 0.0 && v.is_finite() => write!(f, "{:.1}", v),
            ListLiteral::Float(v) => write!(f, "{}", v),
            ListLiteral::Bool(true) => write!(f, "True"),
            ListLiteral::Bool(false) => write!(f, "False"),
            ListLiteral::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

/// One entry of an index expression.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexEntry<A> {
    /// Selects one position and drops the axis.
    Integer(i64),
    Slice(SliceSpec),
    /// Stands for as many full slices as needed to cover the rank.
    Ellipsis,
    /// Inserts a size-1 axis without consuming one.
    NewAxis,
    /// An integer index array.
    Array(A),
    /// A nested list, materialized into an index array.
    List(ListLiteral),
}

impl<A> IndexEntry<A> {
    /// Whether the entry may name arbitrary positions (an index array
    /// or list). Such entries rule out the slice-update fast path.
    pub fn is_array_like(&self) -> bool {
        matches!(self, IndexEntry::Array(_) | IndexEntry::List(_))
    }
}

impl<A> From<i64> for IndexEntry<A> {
    fn from(i: i64) -> Self {
        IndexEntry::Integer(i)
    }
}

impl<A> From<SliceSpec> for IndexEntry<A> {
    fn from(spec: SliceSpec) -> Self {
        IndexEntry::Slice(spec)
    }
}

impl<A> From<ListLiteral> for IndexEntry<A> {
    fn from(list: ListLiteral) -> Self {
        IndexEntry::List(list)
    }
}

impl<A: Array> fmt::Display for IndexEntry<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexEntry::Integer(i) => write!(f, "{}", i),
            IndexEntry::Slice(spec) => write!(f, "{}", spec),
            IndexEntry::Ellipsis => write!(f, "..."),
            IndexEntry::NewAxis => write!(f, "None"),
            IndexEntry::Array(a) => write!(f, "array(shape={:?}, dtype={})", a.shape(), a.dtype()),
            IndexEntry::List(list) => write!(f, "{}", list),
        }
    }
}

/// A full subscript: a single entry or a tuple of entries.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexExpression<A> {
    Single(IndexEntry<A>),
    Tuple(Vec<IndexEntry<A>>),
}

impl<A> IndexExpression<A> {
    /// The entries of the expression, in order.
    pub fn entries(&self) -> &[IndexEntry<A>] {
        match self {
            IndexExpression::Single(entry) => std::slice::from_ref(entry),
            IndexExpression::Tuple(entries) => entries,
        }
    }

    /// Whether any entry is an index array or a list.
    pub fn has_array_like(&self) -> bool {
        self.entries().iter().any(IndexEntry::is_array_like)
    }
}

impl<A> From<IndexEntry<A>> for IndexExpression<A> {
    fn from(entry: IndexEntry<A>) -> Self {
        IndexExpression::Single(entry)
    }
}

impl<A> From<Vec<IndexEntry<A>>> for IndexExpression<A> {
    fn from(entries: Vec<IndexEntry<A>>) -> Self {
        IndexExpression::Tuple(entries)
    }
}

impl<A: Array> fmt::Display for IndexExpression<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexExpression::Single(entry) => write!(f, "{}", entry),
            IndexExpression::Tuple(entries) if entries.is_empty() => write!(f, "()"),
            IndexExpression::Tuple(entries) if entries.len() == 1 => write!(f, "{},", entries[0]),
            IndexExpression::Tuple(entries) => {
                for (i, entry) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", entry)?;
                }
                Ok(())
            }
        }
    }
}

/// The right-hand side of a write.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand<A> {
    Scalar(f64),
    Array(A),
    List(ListLiteral),
}

impl<A: Array> Operand<A> {
    /// Materialize as an array of the destination's `dtype`.
    pub fn to_value_array<O>(&self, ops: &O, dtype: Dtype) -> Result<A, IndexError>
    where
        O: ArrayOps<Array = A>,
    {
        match self {
            Operand::Scalar(v) => Ok(ops.full(&[], *v, dtype)?),
            Operand::Array(a) if a.dtype() == dtype => Ok(a.clone()),
            Operand::Array(a) => Ok(ops.astype(a, dtype)?),
            Operand::List(list) => list.to_value_array(ops, dtype),
        }
    }
}

impl<A> From<f64> for Operand<A> {
    fn from(v: f64) -> Self {
        Operand::Scalar(v)
    }
}

impl<A> From<ListLiteral> for Operand<A> {
    fn from(list: ListLiteral) -> Self {
        Operand::List(list)
    }
}

/// Shorthand constructors for index expressions.
///
/// ```
/// use ndindex::dense::DenseArray;
/// use ndindex::dsl::*;
///
/// let e: ndindex::IndexExpression<DenseArray> = tuple(vec![range(1, 3), step(-1)]);
/// assert_eq!(e.to_string(), "1:3, ::-1");
/// ```
pub mod dsl {
    use super::IndexEntry;
    use super::IndexExpression;
    use super::ListLiteral;
    use super::SliceSpec;

    pub fn int<A>(i: i64) -> IndexEntry<A> {
        IndexEntry::Integer(i)
    }

    /// The slice `start:stop`.
    pub fn range<A>(start: i64, stop: i64) -> IndexEntry<A> {
        IndexEntry::Slice(SliceSpec::new(Some(start), Some(stop), None))
    }

    pub fn slice<A>(start: Option<i64>, stop: Option<i64>, step: Option<i64>) -> IndexEntry<A> {
        IndexEntry::Slice(SliceSpec::new(start, stop, step))
    }

    /// The slice `::step`.
    pub fn step<A>(step: i64) -> IndexEntry<A> {
        IndexEntry::Slice(SliceSpec::new(None, None, Some(step)))
    }

    /// The slice `:`.
    pub fn full<A>() -> IndexEntry<A> {
        IndexEntry::Slice(SliceSpec::full())
    }

    pub fn ellipsis<A>() -> IndexEntry<A> {
        IndexEntry::Ellipsis
    }

    pub fn newaxis<A>() -> IndexEntry<A> {
        IndexEntry::NewAxis
    }

    pub fn array<A>(a: A) -> IndexEntry<A> {
        IndexEntry::Array(a)
    }

    pub fn list<A>(items: impl Into<ListLiteral>) -> IndexEntry<A> {
        IndexEntry::List(items.into())
    }

    pub fn tuple<A>(entries: Vec<IndexEntry<A>>) -> IndexExpression<A> {
        IndexExpression::Tuple(entries)
    }

    pub fn single<A>(entry: IndexEntry<A>) -> IndexExpression<A> {
        IndexExpression::Single(entry)
    }
}
