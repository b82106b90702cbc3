//! Backend selection module.
//!
//! This module defines the execution backends a tensor can run on and the
//! process-wide defaults used when a constructor is not given one explicitly.
//!
//! # Supported Devices
//!
//! - `Reference` — plain nested loops over flat buffers (default). This is the
//!   backend of record: every other path must reproduce its results up to
//!   floating-point rounding.
//! - `Accelerated` — data-parallel kernels on the `rayon` thread pool, one task
//!   per output element (or per output row for matrix products). With the
//!   `wgpu` feature, matrix products are first offered to a GPU compute shader.
//!
//! The device is chosen when a tensor is constructed and inherited by every
//! tensor derived from it. Defaults are stored in `AtomicU8`s so they can be
//! switched at runtime without locking.
//!
//! # Acceleration coverage
//!
//! Coverage is per operation and per pass; [`Device::accelerates`] reports it:
//!
//! | Op        | Forward                  | Backward                      |
//! |-----------|--------------------------|-------------------------------|
//! | Add       | accelerated              | reference (identity, no kernel) |
//! | Multiply  | accelerated              | accelerated                   |
//! | MatMul    | accelerated (GPU w/ `wgpu`) | accelerated                |
//! | Mean      | reference                | accelerated (uniform fill)    |
//! | Transpose | accelerated              | accelerated                   |

use core::convert::TryFrom;
use core::sync::atomic::{AtomicU8, Ordering};

/// Execution backend a tensor's kernels run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Device {
    /// Portable nested-loop kernels (default).
    #[default]
    Reference = 0,
    /// Data-parallel kernels (rayon, optionally GPU for matrix products).
    Accelerated = 1,
}

impl TryFrom<u8> for Device {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Reference),
            1 => Ok(Self::Accelerated),
            _ => Err(()),
        }
    }
}

/// The primitive operations a backend implements kernels for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    /// Element-wise addition.
    Add,
    /// Element-wise multiplication.
    Multiply,
    /// Rank-2 matrix product.
    MatMul,
    /// Full reduction to a scalar mean.
    Mean,
    /// Rank-2 axis swap.
    Transpose,
}

impl OpKind {
    /// Lower-case operation name, used in errors and trace events.
    pub fn name(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Multiply => "multiply",
            Self::MatMul => "matmul",
            Self::Mean => "mean",
            Self::Transpose => "transpose",
        }
    }
}

/// Forward or backward half of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pass {
    /// Computing the output from the operands.
    Forward,
    /// Computing operand gradients from the output gradient.
    Backward,
}

impl Device {
    /// Whether this device runs `op`'s `pass` on its own kernels rather than
    /// falling back to the reference loops.
    ///
    /// The reference device trivially "accelerates" nothing.
    pub fn accelerates(self, op: OpKind, pass: Pass) -> bool {
        match self {
            Self::Reference => false,
            Self::Accelerated => !matches!(
                (op, pass),
                (OpKind::Add, Pass::Backward) | (OpKind::Mean, Pass::Forward)
            ),
        }
    }
}

/// Graph traversal used by `Tensor::backward`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum BackwardStrategy {
    /// Visit every node once, after all of its consumers have contributed (default).
    #[default]
    Topological = 0,
    /// Eager depth-first walk; a node reachable by several paths is visited once per path.
    Recursive = 1,
}

impl TryFrom<u8> for BackwardStrategy {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Topological),
            1 => Ok(Self::Recursive),
            _ => Err(()),
        }
    }
}

/// Device used by constructors that don't take one.
///
/// Relaxed ordering: the default only changes between graph constructions.
static GLOBAL_DEFAULT_DEVICE: AtomicU8 = AtomicU8::new(Device::Reference as u8);

static GLOBAL_BACKWARD_STRATEGY: AtomicU8 = AtomicU8::new(BackwardStrategy::Topological as u8);

/// Sets the device used by constructors that are not given one.
///
/// Existing tensors keep the device they were built with.
///
/// # Example
/// ```
/// use tensorgraph::backend::{default_device, set_default_device, Device};
/// set_default_device(Device::Accelerated);
/// assert_eq!(default_device(), Device::Accelerated);
/// set_default_device(Device::Reference);
/// ```
pub fn set_default_device(device: Device) {
    GLOBAL_DEFAULT_DEVICE.store(device as u8, Ordering::Relaxed);
}

/// Returns the device used by constructors that are not given one.
///
/// If the stored value is invalid, defaults to [`Device::Reference`].
pub fn default_device() -> Device {
    Device::try_from(GLOBAL_DEFAULT_DEVICE.load(Ordering::Relaxed)).unwrap_or_default()
}

/// Sets the traversal used by `Tensor::backward` and `Tensor::backward_with`.
pub fn set_backward_strategy(strategy: BackwardStrategy) {
    GLOBAL_BACKWARD_STRATEGY.store(strategy as u8, Ordering::Relaxed);
}

/// Returns the traversal used by `Tensor::backward` and `Tensor::backward_with`.
pub fn backward_strategy() -> BackwardStrategy {
    BackwardStrategy::try_from(GLOBAL_BACKWARD_STRATEGY.load(Ordering::Relaxed)).unwrap_or_default()
}
