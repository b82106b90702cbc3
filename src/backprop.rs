//! Backward engine.
//!
//! Two traversals over the graph rooted at the tensor `backward` is called
//! on. Both add every contribution into the visited tensors' gradients and
//! agree up to floating-point rounding; they differ in how often shared
//! ancestors are visited.
//!
//! - [`topological`]: a first pass orders the nodes that require gradients
//!   so each comes after all of its consumers; the second pass walks that
//!   order once, summing consumer contributions in a pass-local table before
//!   a node routes anything to its own parents. Work is linear in the number
//!   of nodes.
//! - [`recursive`]: eager depth-first walk. Each call accumulates its
//!   contribution and immediately recurses into the parents, so a node
//!   reachable along several paths (a weight used twice, a diamond) is
//!   visited, and its ancestors re-walked, once per path.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use crate::ops::dispatch;
use crate::tensors::Tensor;

/// Nodes reachable from `root` through parents that require gradients,
/// parents before consumers.
fn post_order(root: &Tensor) -> Vec<Tensor> {
    let mut order = Vec::new();
    let mut visited = HashSet::new();
    let mut stack = vec![(root.clone(), false)];

    while let Some((node, expanded)) = stack.pop() {
        if expanded {
            order.push(node);
            continue;
        }
        if !visited.insert(node.id()) {
            continue;
        }
        stack.push((node.clone(), true));
        for parent in node.parents() {
            if parent.requires_grad() && !visited.contains(&parent.id()) {
                stack.push((parent.clone(), false));
            }
        }
    }

    order
}

/// Reverse-topological backward pass seeded with `seed` at `root`.
pub fn topological(root: &Tensor, seed: Vec<f64>) {
    let order = post_order(root);
    tracing::debug!(
        strategy = "topological",
        root = root.id(),
        nodes = order.len(),
        "backward pass"
    );

    let mut pending: HashMap<usize, Vec<f64>> = HashMap::new();
    pending.insert(root.id(), seed);

    for node in order.iter().rev() {
        // Nodes only reachable through non-differentiable edges get nothing.
        let Some(grad) = pending.remove(&node.id()) else {
            continue;
        };
        node.accumulate_grad(&grad);

        let Some(operation) = node.operation() else {
            continue;
        };
        let parents = node.parents();
        let contributions = operation.gradients(&grad, node, parents);
        for (parent, contribution) in parents.iter().zip(contributions) {
            let Some(contribution) = contribution else {
                continue;
            };
            match pending.entry(parent.id()) {
                Entry::Occupied(mut slot) => {
                    dispatch::accumulate(parent.device(), slot.get_mut(), &contribution);
                }
                Entry::Vacant(slot) => {
                    slot.insert(contribution);
                }
            }
        }
    }
}

/// Eager depth-first backward pass seeded with `grad` at `tensor`.
pub fn recursive(tensor: &Tensor, grad: Vec<f64>) {
    tracing::debug!(strategy = "recursive", root = tensor.id(), "backward pass");
    visit(tensor, &grad);
}

fn visit(tensor: &Tensor, grad: &[f64]) {
    if !tensor.requires_grad() {
        return;
    }
    tensor.accumulate_grad(grad);

    if let Some(operation) = tensor.operation() {
        let parents = tensor.parents();
        let contributions = operation.gradients(grad, tensor, parents);
        for (parent, contribution) in parents.iter().zip(contributions) {
            if let Some(contribution) = contribution {
                visit(parent, &contribution);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor;

    #[test]
    fn post_order_puts_parents_first() {
        let a = tensor!([[1.0, 2.0], [3.0, 4.0]]).with_requires_grad(true);
        let b = a.transpose().unwrap();
        let c = a.add(&b).unwrap();
        let loss = c.mean().unwrap();

        let order: Vec<usize> = post_order(&loss).iter().map(Tensor::id).collect();
        let pos = |t: &Tensor| order.iter().position(|&id| id == t.id()).unwrap();
        assert_eq!(order.len(), 4);
        assert!(pos(&a) < pos(&b));
        assert!(pos(&b) < pos(&c));
        assert!(pos(&c) < pos(&loss));
    }

    #[test]
    fn post_order_skips_constant_branches() {
        let a = tensor!([1.0, 2.0]).with_requires_grad(true);
        let k = tensor!([3.0, 4.0]);
        let loss = a.multiply(&k).unwrap().mean().unwrap();
        let ids: Vec<usize> = post_order(&loss).iter().map(Tensor::id).collect();
        assert!(!ids.contains(&k.id()));
    }
}
