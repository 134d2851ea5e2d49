/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Property-based generators for index expressions and shapes.
//!
//! These strategies are used in `proptest`-based tests to construct
//! randomized basic (array-free) index expressions, either against a
//! known shape, so that the expression is valid for it, or on their
//! own, for syntax tests.
//!
//! Example usage:
//!
//! ```ignore
//! use proptest::prelude::*;
//!
//! use crate::strategy::gen_indexed_shape;
//!
//! proptest! {
//!     #[test]
//!     fn test_read((shape, index) in gen_indexed_shape(3, 5)) {
//!         // Read `index` from an array of `shape`.
//!     }
//! }
//! ```
//!
//! This module is only included in test builds (`#[cfg(test)]`).

use proptest::prelude::*;

use crate::dense::DenseArray;
use crate::index::IndexEntry;
use crate::index::IndexExpression;
use crate::index::SliceSpec;

/// Generates a shape with up to `max_dims` dimensions, each of size
/// between 0 and `max_len` (inclusive).
pub fn gen_shape(max_dims: usize, max_len: usize) -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(0..=max_len, 0..=max_dims)
}

/// Generates a [`SliceSpec`] for an axis of `n` elements. Bounds range
/// a little past `[-n, n]` so that clamping is exercised; the step is
/// never zero.
pub fn gen_slice_spec(n: usize) -> impl Strategy<Value = SliceSpec> {
    let bound = n as i64 + 2;
    let step = prop_oneof![-3i64..=-1, 1i64..=3];
    (
        prop::option::of(-bound..=bound),
        prop::option::of(-bound..=bound),
        prop::option::of(step),
    )
        .prop_map(|(start, stop, step)| SliceSpec::new(start, stop, step))
}

/// Generates an integer or slice entry valid for an axis of `n`
/// elements.
pub fn gen_axis_entry(n: usize) -> BoxedStrategy<IndexEntry<DenseArray>> {
    let slice = gen_slice_spec(n).prop_map(IndexEntry::Slice);
    if n == 0 {
        return slice.boxed();
    }
    let n = n as i64;
    prop_oneof![
        (-n..n).prop_map(IndexEntry::Integer),
        slice,
    ]
    .boxed()
}

/// Generates a shape together with a basic index expression valid for
/// it: integer and slice entries (slices only on empty axes) for a
/// prefix of the axes, with
/// newaxis entries mixed in, and the middle of the axes sometimes
/// covered by an ellipsis.
pub fn gen_indexed_shape(
    max_dims: usize,
    max_len: usize,
) -> impl Strategy<Value = (Vec<usize>, IndexExpression<DenseArray>)> {
    gen_shape(max_dims, max_len).prop_flat_map(|shape| {
        let ndim = shape.len();
        let entries: Vec<_> = shape.iter().map(|&n| gen_axis_entry(n)).collect();
        (
            Just(shape),
            entries,
            0..=ndim,
            prop::option::of((0..=ndim, 0..=ndim)),
            prop::collection::vec(0..=ndim, 0..=2),
            any::<bool>(),
        )
            .prop_map(|(shape, axis_entries, used, ellipsis, newaxes, single)| {
                let mut entries: Vec<IndexEntry<DenseArray>> = match ellipsis {
                    // The ellipsis stands for axes `lo..hi`.
                    Some((a, b)) => {
                        let (lo, hi) = (a.min(b), a.max(b));
                        let mut entries = axis_entries;
                        entries.splice(lo..hi, [IndexEntry::Ellipsis]);
                        entries
                    }
                    None => axis_entries.into_iter().take(used).collect(),
                };
                for pos in newaxes {
                    let pos = pos.min(entries.len());
                    entries.insert(pos, IndexEntry::NewAxis);
                }
                let expr = if single && entries.len() == 1 {
                    IndexExpression::Single(entries.remove(0))
                } else {
                    IndexExpression::Tuple(entries)
                };
                (shape, expr)
            })
    })
}

/// Generates a basic index expression of up to `max_entries` entries
/// with no reference to a shape. At most one entry is an ellipsis.
pub fn gen_basic_expression(max_entries: usize) -> impl Strategy<Value = IndexExpression<DenseArray>> {
    let entry = prop_oneof![
        (-10i64..10).prop_map(IndexEntry::Integer),
        gen_slice_spec(6).prop_map(IndexEntry::Slice),
        Just(IndexEntry::NewAxis),
    ];
    (
        prop::collection::vec(entry, 0..=max_entries),
        prop::option::of(0..=max_entries),
        any::<bool>(),
    )
        .prop_map(|(mut entries, ellipsis, single)| {
            if let Some(pos) = ellipsis {
                entries.insert(pos.min(entries.len()), IndexEntry::Ellipsis);
            }
            if single && entries.len() == 1 {
                IndexExpression::Single(entries.remove(0))
            } else {
                IndexExpression::Tuple(entries)
            }
        })
}

mod tests {
    use proptest::strategy::ValueTree;
    use proptest::test_runner::Config;
    use proptest::test_runner::TestRunner;

    use super::*;
    use crate::dense::DenseOps;
    use crate::normalize::normalize;

    #[test]
    fn print_some_indexed_shapes() {
        let mut runner = TestRunner::new(Config::default());

        for _ in 0..64 {
            let strat = gen_indexed_shape(3, 5);
            let (shape, expr) = strat.new_tree(&mut runner).unwrap().current();
            println!("{:?}[{}]", shape, expr);
        }
    }

    proptest! {
        #[test]
        fn test_indexed_shapes_normalize((shape, expr) in gen_indexed_shape(4, 6)) {
            prop_assert!(normalize(&DenseOps, &shape, expr.entries()).is_ok());
        }

        #[test]
        fn test_slice_specs_have_nonzero_steps(spec in gen_slice_spec(5)) {
            prop_assert_ne!(spec.step, Some(0));
        }
    }
}
