/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! NumPy-style indexing compiled to primitive array operations.
//!
//! Provides [`Indexer`], which turns an [`IndexExpression`] (integers,
//! slices, ellipsis, newaxis, index arrays and list literals, in any
//! combination) into a short, deterministic sequence of calls on an
//! [`ArrayOps`](ops::ArrayOps) implementation: one batched `gather`
//! for reads with advanced indices, one strided `slice` for the rest,
//! and one `slice_update` or `scatter` for writes.
//!
//! The crate never touches array data itself. [`dense`] provides a
//! small host-memory implementation of the primitives, used for
//! testing and as a reference for their semantics; [`record`] wraps
//! any implementation to capture the calls a plan makes.

mod slice;
pub use slice::ResolvedSlice;

mod index;
pub use index::IndexEntry;
pub use index::IndexError;
pub use index::IndexExpression;
pub use index::ListLiteral;
pub use index::Operand;
pub use index::SliceSpec;
/// DSL-style constructors for building `IndexExpression`s.
pub use index::dsl;

mod indexer;
pub use indexer::Indexer;
pub use indexer::IndexingExt;

/// The primitive seam: array values, dtypes, and the operations index
/// plans compile to.
pub mod ops;

/// Ellipsis expansion and entry validation.
pub mod normalize;

/// Where advanced-index result axes go.
pub mod placement;

/// Squeeze and expand-dims positions after a slice.
pub mod axes;

/// The read path.
pub mod gather;

/// The general write path.
pub mod scatter;

/// Assignment, compound updates and the slice-update fast path.
pub mod update;
pub use update::UpdateOp;

/// Planner configuration.
pub mod config;
pub use config::IndexingConfig;

/// Textual index syntax.
pub mod parse;
pub use parse::parse;

/// A host-memory reference implementation of the primitives.
pub mod dense;

/// Recording of primitive calls.
pub mod record;

/// Property-based generators for randomized test input.
#[cfg(test)]
pub mod strategy;
