/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! This module defines a parser for the textual form of index
//! expressions, the part of a NumPy subscript between the brackets.
//! ```text
//! expression ::= "()"
//!              | entry ( "," entry )* ","?
//!              | ""
//! entry      ::= "..." | "None" | slice | integer | list
//! slice      ::= number? ":" number? ( ":" number? )?
//! list       ::= "[" ( value ( "," value )* ","? )? "]"
//! value      ::= list | "True" | "False" | number
//! number     ::= "-"? [0-9]+ ( "." [0-9]* )? ( [eE] [+-]? [0-9]+ )?
//! ```
//!
//! Notes:
//! - A single entry without a trailing comma is a
//!   [`IndexExpression::Single`]; anything else, including `1,` and the
//!   empty expression, is a [`IndexExpression::Tuple`].
//! - Slice bounds and integer entries must be integers. Floats are
//!   only meaningful inside list literals, where they are values.
//! - Whitespace is ignored.
//!
//! The output of `Display` for an index expression without index
//! arrays parses back to the same expression.

use std::str::FromStr;

use nom::IResult;
use nom::Parser as _;
use nom::branch::alt;
use nom::bytes::complete::tag;
use nom::character::complete::char;
use nom::character::complete::digit0;
use nom::character::complete::digit1;
use nom::character::complete::one_of;
use nom::combinator::map;
use nom::combinator::map_res;
use nom::combinator::opt;
use nom::combinator::recognize;
use nom::combinator::value;
use nom::multi::separated_list0;
use nom::multi::separated_list1;
use nom::sequence::delimited;
use nom::sequence::preceded;
use nom::sequence::terminated;

use crate::index::IndexEntry;
use crate::index::IndexError;
use crate::index::IndexExpression;
use crate::index::ListLiteral;
use crate::index::SliceSpec;

/// A numeric token. Whether it is acceptable depends on where it
/// appears.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn into_integer(self) -> Result<i64, f64> {
        match self {
            Number::Int(v) => Ok(v),
            Number::Float(v) => Err(v),
        }
    }
}

/// An entry as written, before bounds are checked to be integers.
#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(Number),
    Slice([Option<Number>; 3]),
    Ellipsis,
    NewAxis,
    List(ListLiteral),
}

fn number(input: &str) -> IResult<&str, Number> {
    map_res(
        recognize((
            opt(char('-')),
            digit1,
            opt((char('.'), digit0)),
            opt((one_of("eE"), opt(one_of("+-")), digit1)),
        )),
        |text: &str| {
            if text.contains(['.', 'e', 'E']) {
                text.parse().map(Number::Float).map_err(|e| e.to_string())
            } else {
                text.parse().map(Number::Int).map_err(|e| e.to_string())
            }
        },
    )
    .parse(input)
}

fn slice(input: &str) -> IResult<&str, Token> {
    let (input, (start, stop, step)) = (
        opt(number),
        preceded(char(':'), opt(number)),
        opt(preceded(char(':'), opt(number))),
    )
        .parse(input)?;
    Ok((input, Token::Slice([start, stop, step.flatten()])))
}

fn list_value(input: &str) -> IResult<&str, ListLiteral> {
    alt((
        map(list, ListLiteral::List),
        value(ListLiteral::Bool(true), tag("True")),
        value(ListLiteral::Bool(false), tag("False")),
        map(number, |n| match n {
            Number::Int(v) => ListLiteral::Int(v),
            Number::Float(v) => ListLiteral::Float(v),
        }),
    ))
    .parse(input)
}

fn list(input: &str) -> IResult<&str, Vec<ListLiteral>> {
    delimited(
        char('['),
        terminated(separated_list0(char(','), list_value), opt(char(','))),
        char(']'),
    )
    .parse(input)
}

fn token(input: &str) -> IResult<&str, Token> {
    alt((
        value(Token::Ellipsis, tag("...")),
        value(Token::NewAxis, tag("None")),
        slice,
        map(number, Token::Number),
        map(list, |items| Token::List(ListLiteral::List(items))),
    ))
    .parse(input)
}

/// The tokens and whether the expression is a tuple.
fn expression(input: &str) -> IResult<&str, (Vec<Token>, bool)> {
    alt((
        value((vec![], true), tag("()")),
        map(
            (separated_list1(char(','), token), opt(char(','))),
            |(tokens, trailing)| {
                let tuple = tokens.len() > 1 || trailing.is_some();
                (tokens, tuple)
            },
        ),
        value((vec![], true), tag("")),
    ))
    .parse(input)
}

fn slice_bound(bound: Option<Number>) -> Result<Option<i64>, IndexError> {
    bound
        .map(|n| {
            n.into_integer()
                .map_err(|v| IndexError::NonIntegerSliceBound {
                    bound: v.to_string(),
                })
        })
        .transpose()
}

impl Token {
    fn into_entry<A>(self) -> Result<IndexEntry<A>, IndexError> {
        Ok(match self {
            Token::Number(n) => IndexEntry::Integer(
                n.into_integer()
                    .map_err(|v| IndexError::NonIntegerIndex {
                        found: v.to_string(),
                    })?,
            ),
            Token::Slice([start, stop, step]) => {
                let spec = SliceSpec::new(slice_bound(start)?, slice_bound(stop)?, slice_bound(step)?);
                if spec.step == Some(0) {
                    return Err(IndexError::ZeroStep);
                }
                IndexEntry::Slice(spec)
            }
            Token::Ellipsis => IndexEntry::Ellipsis,
            Token::NewAxis => IndexEntry::NewAxis,
            Token::List(list) => IndexEntry::List(list),
        })
    }
}

/// Parses an index expression from a string, ignoring all
/// whitespace.
///
/// Syntax errors are reported with the offending input. Well-formed
/// input that is not a valid index (a float slice bound, a zero step,
/// more than one ellipsis) fails with the corresponding
/// [`IndexError`], which can be recovered with
/// [`anyhow::Error::downcast_ref`].
pub fn parse<A>(input: &str) -> anyhow::Result<IndexExpression<A>> {
    use nom::combinator::all_consuming;

    let input: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    let (_, (tokens, tuple)) = all_consuming(expression).parse(&input).map_err(|err| {
        anyhow::anyhow!("failed to parse index expression: {err:?} (input: {input:?})")
    })?;

    let mut entries = tokens
        .into_iter()
        .map(Token::into_entry)
        .collect::<Result<Vec<IndexEntry<A>>, _>>()?;
    if entries
        .iter()
        .filter(|e| matches!(e, IndexEntry::Ellipsis))
        .count()
        > 1
    {
        return Err(IndexError::MultipleEllipsis.into());
    }

    Ok(match (tuple, entries.pop()) {
        (false, Some(entry)) => IndexExpression::Single(entry),
        (_, last) => {
            entries.extend(last);
            IndexExpression::Tuple(entries)
        }
    })
}

impl<A> FromStr for IndexExpression<A> {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}
