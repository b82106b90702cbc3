//! Core tensor handle and graph node.
//!
//! # Tensors
//!
//! A [`Tensor`] is a cheap, clonable handle onto a reference-counted graph
//! node. The node owns:
//!
//! - a dense row-major `f64` buffer and its shape (empty shape = scalar)
//! - a `requires_grad` flag and the [`Device`] its kernels run on, both fixed at construction
//! - a lazily created gradient buffer of the same shape
//! - for non-leaf tensors, the [`Operation`] that produced it and the operand
//!   tensors (its *parents*)
//!
//! Parents are shared handles, so one tensor can feed many operations. The
//! graph cannot contain cycles: an operation's parents always exist before
//! it runs.
//!
//! ## Mutability
//!
//! `data` and `grad` sit behind one `RefCell` per node. Gradient accumulation
//! and the SGD update mutate them in place through shared handles; no borrow
//! is ever held across a call into another node. Tensors are therefore not
//! `Send`: one graph lives on one thread, while the kernels it calls may use
//! the rayon pool internally.
//!
//! ## Example
//!
//! ```rust
//! use tensorgraph::{tensor, Tensor};
//!
//! let w = tensor!([[1.0, 2.0], [3.0, 4.0]]).with_requires_grad(true);
//! let loss = w.multiply(&w).unwrap().mean().unwrap();
//! loss.backward().unwrap();
//! assert_eq!(w.grad().unwrap().data(), vec![0.5, 1.0, 1.5, 2.0]);
//! ```

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::backend::{self, BackwardStrategy, Device};
use crate::backprop;
use crate::error::{Result, TensorError};
use crate::graph::{self, Operation};
use crate::ops::dispatch;
use crate::random;
use crate::shape::{self, Nested};

fn next_id() -> usize {
    static LAST_ID: AtomicUsize = AtomicUsize::new(0);
    LAST_ID.fetch_add(1, Ordering::Relaxed)
}

/// Mutable part of a node.
struct TensorState {
    data: Vec<f64>,
    grad: Option<Vec<f64>>,
}

/// Producing operation of a non-leaf tensor.
struct Origin {
    operation: Operation,
    parents: Vec<Tensor>,
}

struct TensorNode {
    id: usize,
    shape: Vec<usize>,
    requires_grad: bool,
    device: Device,
    state: RefCell<TensorState>,
    origin: Option<Origin>,
}

// Dropping the last handle to a long chain would otherwise free it by
// recursion, one stack frame per ancestor.
impl Drop for TensorNode {
    fn drop(&mut self) {
        let Some(origin) = self.origin.take() else {
            return;
        };
        let mut pending = origin.parents;
        while let Some(parent) = pending.pop() {
            if let Ok(mut node) = Rc::try_unwrap(parent.node) {
                if let Some(origin) = node.origin.take() {
                    pending.extend(origin.parents);
                }
            }
        }
    }
}

/// Shared handle to a node in the computational graph.
///
/// Cloning a `Tensor` clones the handle, not the data.
#[derive(Clone)]
pub struct Tensor {
    node: Rc<TensorNode>,
}

/// Right-hand side of [`Tensor::add`] and [`Tensor::multiply`]: another
/// tensor of the same shape, or a scalar constant.
#[derive(Debug, Clone, Copy)]
pub enum Operand<'a> {
    /// A tensor operand.
    Tensor(&'a Tensor),
    /// A constant, expanded to a non-tracked tensor of the left operand's shape.
    Scalar(f64),
}

impl<'a> From<&'a Tensor> for Operand<'a> {
    fn from(t: &'a Tensor) -> Self {
        Self::Tensor(t)
    }
}

impl From<f64> for Operand<'_> {
    fn from(v: f64) -> Self {
        Self::Scalar(v)
    }
}

impl From<f32> for Operand<'_> {
    fn from(v: f32) -> Self {
        Self::Scalar(f64::from(v))
    }
}

impl From<i32> for Operand<'_> {
    fn from(v: i32) -> Self {
        Self::Scalar(f64::from(v))
    }
}

impl Tensor {
    fn build(
        shape: Vec<usize>,
        data: Vec<f64>,
        requires_grad: bool,
        device: Device,
        origin: Option<Origin>,
    ) -> Self {
        debug_assert_eq!(shape::numel(&shape), data.len());
        Self {
            node: Rc::new(TensorNode {
                id: next_id(),
                shape,
                requires_grad,
                device,
                state: RefCell::new(TensorState { data, grad: None }),
                origin,
            }),
        }
    }

    /// Leaf tensor with explicit flags. `data` must already match `shape`.
    pub(crate) fn leaf(
        shape: Vec<usize>,
        data: Vec<f64>,
        requires_grad: bool,
        device: Device,
    ) -> Self {
        Self::build(shape, data, requires_grad, device, None)
    }

    /// Output of `operation`: tracks gradients if any parent does and
    /// inherits the first parent's device.
    pub(crate) fn from_operation(
        shape: Vec<usize>,
        data: Vec<f64>,
        operation: Operation,
        parents: Vec<Tensor>,
    ) -> Self {
        let requires_grad = parents.iter().any(Tensor::requires_grad);
        let device = parents.first().map_or_else(backend::default_device, Tensor::device);
        Self::build(shape, data, requires_grad, device, Some(Origin { operation, parents }))
    }

    /// Creates a leaf tensor from a shape and flat row-major data, on the
    /// default device, without gradient tracking.
    ///
    /// # Errors
    /// [`TensorError::InvalidShape`] if `data.len()` differs from the shape's element count.
    pub fn from_vec(shape: impl Into<Vec<usize>>, data: Vec<f64>) -> Result<Self> {
        let shape = shape.into();
        if shape::numel(&shape) != data.len() {
            return Err(TensorError::InvalidShape { shape, len: data.len() });
        }
        Ok(Self::leaf(shape, data, false, backend::default_device()))
    }

    /// Creates a leaf tensor from nested data, deriving the shape from it.
    ///
    /// # Errors
    /// [`TensorError::RaggedData`] if the nesting is not rectangular.
    pub fn from_nested(data: &Nested) -> Result<Self> {
        let shape = shape::shape_of(data)?;
        Ok(Self::leaf(shape, shape::flatten(data), false, backend::default_device()))
    }

    /// Parses a nested array literal such as `"[[1, 2], [3, 4]]"`.
    ///
    /// # Errors
    /// See [`shape::parse_nested`].
    pub fn parse(text: &str) -> Result<Self> {
        Self::from_nested(&shape::parse_nested(text)?)
    }

    /// Rank-0 tensor holding `value`.
    pub fn scalar(value: f64) -> Self {
        Self::leaf(Vec::new(), vec![value], false, backend::default_device())
    }

    /// Tensor of zeros.
    pub fn zeros(shape: &[usize]) -> Self {
        Self::full(shape, 0.0)
    }

    /// Tensor of ones.
    pub fn ones(shape: &[usize]) -> Self {
        Self::full(shape, 1.0)
    }

    /// Tensor with every element set to `value`.
    pub fn full(shape: &[usize], value: f64) -> Self {
        Self::leaf(shape.to_vec(), shape::filled(shape, value), false, backend::default_device())
    }

    /// Non-tracked tensor with this tensor's shape and device, filled with `value`.
    pub fn full_like(&self, value: f64) -> Self {
        let data = dispatch::fill(self.device(), self.numel(), value);
        Self::leaf(self.shape().to_vec(), data, false, self.device())
    }

    /// Tensor of independent standard-normal samples (Box–Muller).
    pub fn random_normal(shape: &[usize], requires_grad: bool, device: Device) -> Self {
        let data = random::standard_normal(shape::numel(shape));
        Self::leaf(shape.to_vec(), data, requires_grad, device)
    }

    /// Rebuilds this tensor as a leaf with the given gradient flag.
    ///
    /// Meant for construction, e.g. `tensor!(...).with_requires_grad(true)`.
    /// The result shares no graph history or gradient with `self`.
    #[must_use]
    pub fn with_requires_grad(self, requires_grad: bool) -> Self {
        Self::leaf(self.shape().to_vec(), self.data(), requires_grad, self.device())
    }

    /// Rebuilds this tensor as a leaf on `device`. Same caveats as
    /// [`Tensor::with_requires_grad`].
    #[must_use]
    pub fn on_device(self, device: Device) -> Self {
        Self::leaf(self.shape().to_vec(), self.data(), self.requires_grad(), device)
    }

    /// Leaf copy of the data with no history and no gradient tracking.
    pub fn detach(&self) -> Self {
        Self::leaf(self.shape().to_vec(), self.data(), false, self.device())
    }

    /// Process-unique node identifier.
    pub fn id(&self) -> usize {
        self.node.id
    }

    /// Dimension sizes; empty for a scalar.
    pub fn shape(&self) -> &[usize] {
        &self.node.shape
    }

    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        self.node.shape.len()
    }

    /// Number of elements.
    pub fn numel(&self) -> usize {
        shape::numel(&self.node.shape)
    }

    /// Rank 0, or rank 1 with one element.
    pub fn is_scalar(&self) -> bool {
        shape::is_scalar_shape(&self.node.shape)
    }

    /// Whether gradients are accumulated into this tensor during backward.
    pub fn requires_grad(&self) -> bool {
        self.node.requires_grad
    }

    /// Backend this tensor's kernels run on.
    pub fn device(&self) -> Device {
        self.node.device
    }

    /// Copy of the flat row-major data.
    pub fn data(&self) -> Vec<f64> {
        self.node.state.borrow().data.clone()
    }

    /// Data in nested form.
    pub fn nested(&self) -> Nested {
        let state = self.node.state.borrow();
        shape::unflatten(&state.data, &self.node.shape).unwrap_or(Nested::List(Vec::new()))
    }

    /// The single element of a one-element tensor.
    ///
    /// # Errors
    /// [`TensorError::NotScalar`] if the tensor holds more than one element.
    pub fn item(&self) -> Result<f64> {
        if self.numel() != 1 {
            return Err(TensorError::NotScalar { shape: self.shape().to_vec() });
        }
        Ok(self.node.state.borrow().data[0])
    }

    /// Snapshot of the accumulated gradient as a leaf tensor, or `None` if no
    /// gradient has reached this tensor since creation or the last reset.
    pub fn grad(&self) -> Option<Tensor> {
        let state = self.node.state.borrow();
        state
            .grad
            .as_ref()
            .map(|g| Self::leaf(self.shape().to_vec(), g.clone(), false, self.device()))
    }

    /// Drops the accumulated gradient.
    pub fn zero_grad(&self) {
        self.node.state.borrow_mut().grad = None;
    }

    /// Whether this tensor was created directly rather than by an operation.
    pub fn is_leaf(&self) -> bool {
        self.node.origin.is_none()
    }

    /// Operation that produced this tensor.
    pub fn operation(&self) -> Option<&Operation> {
        self.node.origin.as_ref().map(|o| &o.operation)
    }

    /// Operands of the producing operation; empty for leaves.
    pub fn parents(&self) -> &[Tensor] {
        self.node.origin.as_ref().map(|o| o.parents.as_slice()).unwrap_or(&[])
    }

    /// Borrows the data for the duration of `f`.
    pub(crate) fn with_data<R>(&self, f: impl FnOnce(&[f64]) -> R) -> R {
        f(&self.node.state.borrow().data)
    }

    /// Adds `contribution` into the gradient, creating it as zeros first.
    pub(crate) fn accumulate_grad(&self, contribution: &[f64]) {
        let device = self.device();
        let mut state = self.node.state.borrow_mut();
        let grad = state.grad.get_or_insert_with(|| vec![0.0; contribution.len()]);
        dispatch::accumulate(device, grad, contribution);
    }

    /// Hands the data and the taken gradient to `update`, leaving the
    /// gradient cleared. Returns `false` if there was no gradient.
    pub(crate) fn consume_grad(&self, update: impl FnOnce(&mut [f64], &[f64])) -> bool {
        let mut guard = self.node.state.borrow_mut();
        let state = &mut *guard;
        match state.grad.take() {
            Some(grad) => {
                update(&mut state.data, &grad);
                true
            }
            None => false,
        }
    }

    /// Element-wise sum with a same-shaped tensor or a scalar.
    ///
    /// # Errors
    /// [`TensorError::ShapeMismatch`] if `other` is a tensor of a different shape.
    pub fn add<'a>(&self, other: impl Into<Operand<'a>>) -> Result<Tensor> {
        graph::add(self, other.into())
    }

    /// Element-wise product with a same-shaped tensor or a scalar.
    ///
    /// # Errors
    /// [`TensorError::ShapeMismatch`] if `other` is a tensor of a different shape.
    pub fn multiply<'a>(&self, other: impl Into<Operand<'a>>) -> Result<Tensor> {
        graph::multiply(self, other.into())
    }

    /// Matrix product `(m×k) × (k×n) → (m×n)`.
    ///
    /// # Errors
    /// - [`TensorError::UnsupportedRank`] unless both operands are rank 2.
    /// - [`TensorError::ShapeMismatch`] if the inner dimensions differ.
    pub fn matmul(&self, other: &Tensor) -> Result<Tensor> {
        graph::matmul(self, other)
    }

    /// Mean over all elements, as a rank-0 tensor.
    ///
    /// # Errors
    /// Infallible for tensors built through this crate; the `Result` keeps
    /// the operation signatures uniform.
    pub fn mean(&self) -> Result<Tensor> {
        graph::mean(self)
    }

    /// Swaps the two axes of a rank-2 tensor.
    ///
    /// # Errors
    /// [`TensorError::UnsupportedRank`] unless the tensor is rank 2.
    pub fn transpose(&self) -> Result<Tensor> {
        graph::transpose(self)
    }

    /// Back-propagates from this scalar tensor with an implicit gradient of one.
    ///
    /// Does nothing when `requires_grad` is false.
    ///
    /// # Errors
    /// [`TensorError::MissingGradientForNonScalar`] if the tensor is not scalar.
    pub fn backward(&self) -> Result<()> {
        self.backward_with_strategy(None, backend::backward_strategy())
    }

    /// Back-propagates `grad`, which must have this tensor's shape.
    ///
    /// Does nothing when `requires_grad` is false.
    ///
    /// # Errors
    /// [`TensorError::ShapeMismatch`] if `grad` has a different shape.
    pub fn backward_with(&self, grad: &Tensor) -> Result<()> {
        self.backward_with_strategy(Some(grad), backend::backward_strategy())
    }

    /// Back-propagates with an explicit traversal strategy.
    ///
    /// # Errors
    /// As [`Tensor::backward`] when `grad` is `None`, as
    /// [`Tensor::backward_with`] otherwise.
    pub fn backward_with_strategy(
        &self,
        grad: Option<&Tensor>,
        strategy: BackwardStrategy,
    ) -> Result<()> {
        if !self.requires_grad() {
            return Ok(());
        }

        let seed = match grad {
            None if self.is_scalar() => dispatch::fill(self.device(), self.numel(), 1.0),
            None => {
                return Err(TensorError::MissingGradientForNonScalar {
                    shape: self.shape().to_vec(),
                });
            }
            Some(g) if g.shape() != self.shape() => {
                return Err(TensorError::ShapeMismatch {
                    op: "backward",
                    left: self.shape().to_vec(),
                    right: g.shape().to_vec(),
                });
            }
            Some(g) => g.data(),
        };

        match strategy {
            BackwardStrategy::Topological => backprop::topological(self, seed),
            BackwardStrategy::Recursive => backprop::recursive(self, seed),
        }
        Ok(())
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.node.state.borrow();
        f.debug_struct("Tensor")
            .field("id", &self.node.id)
            .field("shape", &self.node.shape)
            .field("data", &state.data)
            .field("requires_grad", &self.node.requires_grad)
            .field("device", &self.node.device)
            .field("operation", &self.operation().map(Operation::kind))
            .field("has_grad", &state.grad.is_some())
            .finish()
    }
}
