/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! End-to-end indexing through the public API, checked against the
//! dense runtime.

use anyhow::Result;
use ndindex::IndexError;
use ndindex::IndexExpression;
use ndindex::Indexer;
use ndindex::IndexingExt;
use ndindex::Operand;
use ndindex::UpdateOp;
use ndindex::dense::DenseArray;
use ndindex::dense::DenseOps;
use ndindex::dsl::*;
use ndindex::ops::Array;
use ndindex::ops::Dtype;
use ndindex::record::Recorder;

type Expr = IndexExpression<DenseArray>;

fn iota(shape: &[usize]) -> DenseArray {
    DenseArray::iota(shape.to_vec(), Dtype::Float32)
}

fn zeros(shape: &[usize]) -> DenseArray {
    let len = shape.iter().product();
    DenseArray::new(vec![0.0; len], shape.to_vec(), Dtype::Float32).unwrap()
}

#[test]
fn reversed_rows() -> Result<()> {
    let a = iota(&[4, 5]);
    let out = DenseOps.get_item(&a, &"1:3, ::-1".parse()?)?;
    assert_eq!(out.shape(), &[2, 5]);
    assert_eq!(
        out.data(),
        &[9.0, 8.0, 7.0, 6.0, 5.0, 14.0, 13.0, 12.0, 11.0, 10.0]
    );
    Ok(())
}

#[test]
fn pointwise_pairs() -> Result<()> {
    let a = iota(&[4, 5]);
    let out = DenseOps.get_item(&a, &"[0, 2], [1, 3]".parse()?)?;
    assert_eq!(out.data(), &[1.0, 13.0]);
    Ok(())
}

#[test]
fn newaxis_before_integer() -> Result<()> {
    let a = iota(&[4, 5]);
    let out = DenseOps.get_item(&a, &tuple(vec![full(), newaxis(), int(2)]))?;
    assert_eq!(out.shape(), &[4, 1]);
    assert_eq!(out.data(), &[2.0, 7.0, 12.0, 17.0]);
    Ok(())
}

#[test]
fn add_to_leading_rows() -> Result<()> {
    let mut a = iota(&[4, 5]);
    DenseOps.update_item(&mut a, &"0:2".parse()?, UpdateOp::Add, &Operand::Scalar(10.0))?;
    let expected: Vec<f64> = (0..20)
        .map(|v| if v < 10 { v as f64 + 10.0 } else { v as f64 })
        .collect();
    assert_eq!(a.data(), expected.as_slice());
    Ok(())
}

#[test]
fn plans_are_deterministic() -> Result<()> {
    let recorder = Recorder::new(DenseOps);
    let indexer = Indexer::new(&recorder);
    let index: Expr = "[[0], [2]], ..., 1:, None".parse()?;

    indexer.get_item(&iota(&[3, 4, 5]), &index)?;
    let first = recorder.take_calls();
    assert!(!first.is_empty());

    indexer.get_item(&zeros(&[3, 4, 5]), &index)?;
    assert_eq!(recorder.take_calls(), first);
    Ok(())
}

#[test]
fn slice_writes_issue_one_slice_update() -> Result<()> {
    let recorder = Recorder::new(DenseOps);
    let indexer = Indexer::new(&recorder);
    for text in ["1:3", "..., ::2", "0, 1:, None", "-1, ::-1"] {
        let mut a = iota(&[4, 5]);
        indexer.set_item(&mut a, &text.parse()?, &Operand::Scalar(0.0))?;
        let names: Vec<_> = recorder.take_calls().iter().map(|c| c.name()).collect();
        assert_eq!(
            names.iter().filter(|&&n| n == "slice_update").count(),
            1,
            "{text}: {names:?}"
        );
        assert!(!names.contains(&"scatter"), "{text}: {names:?}");
    }
    Ok(())
}

#[test]
fn empty_axes() -> Result<()> {
    let mut a = iota(&[0, 3]);
    let index: Expr = ":, [0, 2]".parse()?;
    assert_eq!(DenseOps.get_item(&a, &index)?.shape(), &[0, 2]);

    DenseOps.set_item(&mut a, &":, [0]".parse()?, &Operand::Scalar(1.0))?;
    assert_eq!(a, iota(&[0, 3]));
    Ok(())
}

#[test]
fn extreme_steps() -> Result<()> {
    let a = iota(&[4, 5]);
    let index = single(slice(None, None, Some(i64::MIN)));
    assert_eq!(DenseOps.get_item(&a, &index)?.data(), &[15.0, 16.0, 17.0, 18.0, 19.0]);
    Ok(())
}

#[test]
fn boolean_masks_are_rejected() {
    let a = iota(&[4]);
    let mask = DenseArray::new(vec![1.0, 0.0, 1.0, 0.0], vec![4], Dtype::Bool).unwrap();
    assert!(matches!(
        DenseOps.get_item(&a, &single(array(mask.clone()))),
        Err(IndexError::BooleanMask)
    ));
    assert!(matches!(
        DenseOps.get_item(&a, &single(list(vec![true, false, true, false]))),
        Err(IndexError::BooleanMask)
    ));

    let mut b = a.clone();
    assert!(matches!(
        DenseOps.set_item(&mut b, &tuple(vec![array(mask)]), &Operand::Scalar(1.0)),
        Err(IndexError::BooleanMask)
    ));
    assert_eq!(b, a);
}
