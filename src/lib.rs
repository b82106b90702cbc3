//! # `tensorgraph`
//!
//! Reverse-mode automatic differentiation over dense `f64` tensors.
//!
//! Every operation on a [`Tensor`] computes its result eagerly and records
//! itself, with its operands, on the output. The recorded graph is rebuilt on
//! every forward pass, so ordinary Rust control flow shapes the model.
//! Calling [`Tensor::backward`] on a scalar result walks that graph in
//! reverse and accumulates `∂result/∂t` into every tensor `t` created with
//! `requires_grad`.
//!
//! ## Features
//!
//! - **Operations**: element-wise add and multiply (tensor or scalar
//!   right-hand side), matrix product, mean, rank-2 transpose
//! - **Backends**: a reference backend of plain loops and an accelerated one
//!   built on rayon, selected per tensor through [`Device`]
//! - **Backward engines**: a single reverse-topological sweep (default) or an
//!   eager depth-first walk, see [`BackwardStrategy`]
//! - **GPU matrix product**: optional, behind the `wgpu` feature
//!
//! ## Example
//!
//! ```rust
//! use tensorgraph::{tensor, Device, Tensor};
//!
//! # fn main() -> tensorgraph::Result<()> {
//! let x = tensor!([[1.0, 2.0], [3.0, 4.0]]);
//! let w1 = Tensor::random_normal(&[2, 3], true, Device::Accelerated);
//! let w2 = Tensor::random_normal(&[3, 1], true, Device::Accelerated);
//!
//! let hidden = x.matmul(&w1)?;
//! let loss = hidden.matmul(&w2)?.mean()?;
//! loss.backward()?;
//!
//! assert_eq!(w1.grad().unwrap().shape(), &[2, 3]);
//! assert_eq!(w2.grad().unwrap().shape(), &[3, 1]);
//! assert!(x.grad().is_none());
//!
//! tensorgraph::optim::sgd_all(&[w1, w2], 0.01);
//! # Ok(())
//! # }
//! ```
//!
//! ## Logging
//!
//! Kernel dispatch, backward passes and GPU fallbacks are reported through
//! [`tracing`]. No subscriber is installed by this crate.

#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::many_single_char_names,
    clippy::cast_possible_truncation,
    clippy::similar_names,
    clippy::cast_precision_loss,
    clippy::must_use_candidate,
    clippy::module_name_repetitions
)]
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod approx;
pub mod backend;
mod backprop;
pub mod error;
pub mod graph;
pub mod ops;
pub mod optim;
pub mod random;
pub mod shape;
pub mod tensors;

pub use backend::{BackwardStrategy, Device};
pub use error::{Result, TensorError};
pub use tensors::{Operand, Tensor};
