//! # Execution backends
//!
//! Numeric kernels for every primitive operation, per backend, plus the layer
//! that routes each call to the right one.
//!
//! ## Submodules
//!
//! - [`cpu`] — reference nested-loop kernels (backend of record)
//! - [`parallel`] — rayon data-parallel kernels behind `Device::Accelerated`
//! - [`wgpu`] *(opt-in)* — WGSL compute-shader matrix product
//! - [`dispatch`] — picks a kernel from the tensor's `Device`
//!
//! ## Kernel contract
//!
//! Every kernel takes flat row-major operand buffers plus dimension sizes and
//! returns a flat output buffer; the caller owns reshaping. Shape validation
//! happens before dispatch, in the graph layer. Results of the accelerated
//! paths must agree with [`cpu`] within floating-point tolerance
//! (see [`crate::approx`]).
//!
//! ## Feature Flags
//!
//! - `wgpu` — route accelerated matrix products to the GPU when an adapter is present

pub mod cpu;
pub mod dispatch;
pub mod parallel;
#[cfg(feature = "wgpu")]
pub mod wgpu;
