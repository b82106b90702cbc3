//! Shape and buffer utilities.
//!
//! Tensors store their elements as a flat, row-major `Vec<f64>` next to a
//! shape (`Vec<usize>`, empty for scalars). This module converts between that
//! flat form and the nested form users write literals in, and provides the
//! few shape computations the operations need.
//!
//! ## Example
//!
//! ```rust
//! use tensorgraph::nested;
//! use tensorgraph::shape::{flatten, shape_of, unflatten};
//!
//! let n = nested!([[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
//! assert_eq!(shape_of(&n).unwrap(), vec![2, 3]);
//! let flat = flatten(&n);
//! assert_eq!(unflatten(&flat, &[2, 3]).unwrap(), n);
//! ```

use crate::error::{Result, TensorError};

/// Nested (list-of-lists) representation of tensor data.
#[derive(Debug, Clone, PartialEq)]
pub enum Nested {
    /// A single element.
    Scalar(f64),
    /// One axis worth of sub-tensors.
    List(Vec<Nested>),
}

impl From<f64> for Nested {
    fn from(value: f64) -> Self {
        Self::Scalar(value)
    }
}

impl<T: Into<Nested>> From<Vec<T>> for Nested {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Nested>, const N: usize> From<[T; N]> for Nested {
    fn from(items: [T; N]) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

/// Number of elements addressed by `shape`. A rank-0 shape holds one element.
pub fn numel(shape: &[usize]) -> usize {
    shape.iter().product()
}

/// Computes the shape of nested data.
///
/// # Errors
/// - [`TensorError::RaggedData`] if sibling lists have different shapes.
/// - [`TensorError::InvalidShape`] for an empty list, since every dimension must be positive.
pub fn shape_of(data: &Nested) -> Result<Vec<usize>> {
    match data {
        Nested::Scalar(_) => Ok(Vec::new()),
        Nested::List(items) => {
            let Some(first) = items.first() else {
                return Err(TensorError::InvalidShape { shape: vec![0], len: 0 });
            };
            let inner = shape_of(first)?;
            for item in &items[1..] {
                if shape_of(item)? != inner {
                    return Err(TensorError::RaggedData);
                }
            }
            let mut shape = Vec::with_capacity(inner.len() + 1);
            shape.push(items.len());
            shape.extend(inner);
            Ok(shape)
        }
    }
}

/// Flattens nested data into a row-major buffer.
///
/// No shape validation happens here; pair it with [`shape_of`].
pub fn flatten(data: &Nested) -> Vec<f64> {
    fn walk(node: &Nested, out: &mut Vec<f64>) {
        match node {
            Nested::Scalar(v) => out.push(*v),
            Nested::List(items) => items.iter().for_each(|item| walk(item, out)),
        }
    }

    let mut out = Vec::new();
    walk(data, &mut out);
    out
}

/// Rebuilds nested data from a flat buffer and a shape.
///
/// # Errors
/// Returns [`TensorError::InvalidShape`] if `flat.len() != numel(shape)`.
pub fn unflatten(flat: &[f64], shape: &[usize]) -> Result<Nested> {
    if flat.len() != numel(shape) {
        return Err(TensorError::InvalidShape { shape: shape.to_vec(), len: flat.len() });
    }

    fn build(flat: &[f64], shape: &[usize]) -> Nested {
        match shape.split_first() {
            None => Nested::Scalar(flat[0]),
            Some((&dim, rest)) => {
                let stride = numel(rest);
                Nested::List(
                    (0..dim)
                        .map(|i| build(&flat[i * stride..(i + 1) * stride], rest))
                        .collect(),
                )
            }
        }
    }

    Ok(build(flat, shape))
}

/// A buffer of `numel(shape)` copies of `value`.
pub fn filled(shape: &[usize], value: f64) -> Vec<f64> {
    vec![value; numel(shape)]
}

/// Shape of the transpose of a rank-2 shape.
///
/// # Errors
/// Returns [`TensorError::UnsupportedRank`] unless `shape` has rank 2.
pub fn transposed_shape(shape: &[usize]) -> Result<Vec<usize>> {
    match shape {
        [rows, cols] => Ok(vec![*cols, *rows]),
        _ => Err(TensorError::UnsupportedRank {
            op: "transpose",
            expected: 2,
            actual: shape.len(),
        }),
    }
}

/// Whether `shape` describes a scalar for the purpose of an implicit
/// backward seed: rank 0, or rank 1 with a single element.
pub fn is_scalar_shape(shape: &[usize]) -> bool {
    shape.is_empty() || shape == [1]
}

/// Parses a JSON-style array literal such as `[[1, 2], [3.5, -4e2]]`.
///
/// A bare number parses as [`Nested::Scalar`].
///
/// # Errors
/// - [`TensorError::Parse`] for malformed text (unbalanced brackets,
///   missing or trailing commas, bad numbers, trailing input).
/// - [`TensorError::RaggedData`] if the parsed lists are not rectangular.
pub fn parse_nested(text: &str) -> Result<Nested> {
    let mut parser = Parser { src: text.as_bytes(), pos: 0 };
    let value = parser.value()?;
    parser.skip_ws();
    if parser.pos != parser.src.len() {
        return Err(TensorError::Parse(format!("unexpected trailing input at byte {}", parser.pos)));
    }
    shape_of(&value)?;
    Ok(value)
}

struct Parser<'a> {
    src: &'a [u8],
    pos: usize,
}

impl Parser<'_> {
    fn skip_ws(&mut self) {
        while self.src.get(self.pos).is_some_and(u8::is_ascii_whitespace) {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_ws();
        self.src.get(self.pos).copied()
    }

    fn value(&mut self) -> Result<Nested> {
        match self.peek() {
            Some(b'[') => self.list(),
            Some(b'-' | b'+' | b'.' | b'0'..=b'9') => self.number(),
            Some(c) => Err(TensorError::Parse(format!(
                "invalid character {:?} at byte {}",
                c as char, self.pos
            ))),
            None => Err(TensorError::Parse("unexpected end of input".into())),
        }
    }

    fn list(&mut self) -> Result<Nested> {
        self.pos += 1;
        let mut items = Vec::new();
        if self.peek() == Some(b']') {
            self.pos += 1;
            return Ok(Nested::List(items));
        }
        loop {
            items.push(self.value()?);
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b']') => {
                    self.pos += 1;
                    return Ok(Nested::List(items));
                }
                Some(_) => {
                    let msg = format!("expected ',' or ']' at byte {}", self.pos);
                    return Err(TensorError::Parse(msg));
                }
                None => return Err(TensorError::Parse("unterminated list".into())),
            }
        }
    }

    fn number(&mut self) -> Result<Nested> {
        let start = self.pos;
        while self
            .src
            .get(self.pos)
            .is_some_and(|&c| c.is_ascii_digit() || matches!(c, b'.' | b'e' | b'E' | b'+' | b'-'))
        {
            self.pos += 1;
        }
        let token = std::str::from_utf8(&self.src[start..self.pos])
            .map_err(|e| TensorError::Parse(e.to_string()))?;
        token
            .parse::<f64>()
            .map(Nested::Scalar)
            .map_err(|_| TensorError::Parse(format!("bad number {token:?}")))
    }
}

/// Builds a [`Nested`] value from literal arrays.
///
/// ```
/// use tensorgraph::{nested, shape::Nested};
/// assert_eq!(nested!([1, -2]), Nested::List(vec![Nested::Scalar(1.0), Nested::Scalar(-2.0)]));
/// ```
#[macro_export]
macro_rules! nested {
    ([ $( [ $($inner:tt)* ] ),+ $(,)? ]) => {
        $crate::shape::Nested::List(vec![ $( $crate::nested!([ $($inner)* ]) ),+ ])
    };
    ([ $( $x:expr ),+ $(,)? ]) => {
        $crate::shape::Nested::List(vec![ $( $crate::shape::Nested::Scalar(($x) as f64) ),+ ])
    };
    ($x:expr) => {
        $crate::shape::Nested::Scalar(($x) as f64)
    };
}

/// Defines a leaf tensor (no gradient tracking, default device) from nested literal arrays.
///
/// # Panics
/// Panics if the literal is ragged.
///
/// ```
/// use tensorgraph::tensor;
/// let t = tensor!([[1.0, 2.0], [3.0, 4.0]]);
/// assert_eq!(t.shape(), vec![2, 2]);
/// ```
#[macro_export]
macro_rules! tensor {
    ($($data:tt)+) => {
        $crate::tensors::Tensor::from_nested(&$crate::nested!($($data)+))
            .expect("ragged tensor literal (rows have mismatched shapes)")
    };
}
