use tensorgraph::approx::{all_close, CPU_TOLERANCE};
use tensorgraph::graph::Operation;
use tensorgraph::{tensor, BackwardStrategy, Tensor, TensorError};

#[test]
fn test_backward_without_grad_is_noop() {
    let a = tensor!([[1.0, 2.0], [3.0, 4.0]]);
    let b = tensor!([[5.0, 6.0], [7.0, 8.0]]);
    let loss = a.multiply(&b).unwrap().mean().unwrap();
    assert!(!loss.requires_grad());
    loss.backward().unwrap();
    assert!(a.grad().is_none());
    assert!(b.grad().is_none());
    assert!(loss.grad().is_none());
}

#[test]
fn test_mul_mean_gradients() {
    let a = tensor!([[1.0, 2.0], [3.0, 4.0]]).with_requires_grad(true);
    let b = tensor!([[5.0, 6.0], [7.0, 8.0]]).with_requires_grad(true);
    a.multiply(&b).unwrap().mean().unwrap().backward().unwrap();

    assert_eq!(a.grad().unwrap().data(), vec![1.25, 1.5, 1.75, 2.0]);
    assert_eq!(b.grad().unwrap().data(), vec![0.25, 0.5, 0.75, 1.0]);
}

#[test]
fn test_matmul_shape_law() {
    let a = Tensor::ones(&[2, 3]);
    let b = Tensor::ones(&[3, 4]);
    let c = a.matmul(&b).unwrap();
    assert_eq!(c.shape(), &[2, 4]);
    assert_eq!(c.data(), vec![3.0; 8]);
    assert_eq!(c.operation(), Some(&Operation::MatMul { m: 2, k: 3, n: 4 }));

    let err = a.matmul(&Tensor::ones(&[2, 4])).unwrap_err();
    assert_eq!(
        err,
        TensorError::ShapeMismatch { op: "matmul", left: vec![2, 3], right: vec![2, 4] }
    );
}

#[test]
fn test_matmul_identity_gradient() {
    let a = tensor!([[1.0, 2.0], [3.0, 4.0]]).with_requires_grad(true);
    let eye = tensor!([[1.0, 0.0], [0.0, 1.0]]);
    let out = a.matmul(&eye).unwrap();
    assert_eq!(out.data(), a.data());

    out.mean().unwrap().backward().unwrap();
    assert_eq!(a.grad().unwrap().data(), vec![0.25; 4]);
    assert!(eye.grad().is_none());
}

#[test]
fn test_transpose_round_trip() {
    let a = tensor!([[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
    let t = a.transpose().unwrap();
    assert_eq!(t.shape(), &[3, 2]);
    assert_eq!(t.data(), vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);

    let back = t.transpose().unwrap();
    assert_eq!(back.shape(), a.shape());
    assert_eq!(back.data(), a.data());

    assert!(matches!(
        Tensor::ones(&[2, 2, 2]).transpose(),
        Err(TensorError::UnsupportedRank { op: "transpose", expected: 2, actual: 3 })
    ));
}

#[test]
fn test_transpose_gradient() {
    let a = tensor!([[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]).with_requires_grad(true);
    let weights = tensor!([[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]]);
    a.transpose().unwrap().multiply(&weights).unwrap().mean().unwrap().backward().unwrap();
    // weights transposed, divided by 6
    let expected: Vec<f64> = [1.0, 3.0, 5.0, 2.0, 4.0, 6.0].iter().map(|w| w / 6.0).collect();
    assert!(all_close(&a.grad().unwrap().data(), &expected, CPU_TOLERANCE));
}

#[test]
fn test_mean_and_gradient() {
    let a = tensor!([[1.0, 2.0], [3.0, 4.0]]).with_requires_grad(true);
    let m = a.mean().unwrap();
    assert_eq!(m.rank(), 0);
    assert_eq!(m.item().unwrap(), 2.5);
    m.backward().unwrap();
    assert_eq!(a.grad().unwrap().data(), vec![0.25; 4]);
}

#[test]
fn test_add_scalar_constant() {
    let a = tensor!([[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]).with_requires_grad(true);
    let out = a.add(5).unwrap();
    assert_eq!(out.shape(), &[2, 3]);
    assert_eq!(out.data(), vec![6.0, 7.0, 8.0, 9.0, 10.0, 11.0]);
    assert_eq!(out.parents().len(), 1);
    assert_eq!(out.operation(), Some(&Operation::Add { scalar: Some(5.0) }));

    out.mean().unwrap().backward().unwrap();
    let expected = vec![1.0 / 6.0; 6];
    assert!(all_close(&a.grad().unwrap().data(), &expected, CPU_TOLERANCE));
}

#[test]
fn test_multiply_scalar_gradient() {
    let a = tensor!([2.0, 4.0]).with_requires_grad(true);
    a.multiply(-3.0).unwrap().mean().unwrap().backward().unwrap();
    assert_eq!(a.grad().unwrap().data(), vec![-1.5, -1.5]);
}

#[test]
fn test_two_layer_without_bias() {
    let x = tensor!([[1.0, 2.0], [3.0, 4.0]]);
    let w1 = Tensor::ones(&[2, 3]).with_requires_grad(true);
    let w2 = Tensor::ones(&[3, 1]).with_requires_grad(true);

    let hidden = x.matmul(&w1).unwrap();
    let out = hidden.matmul(&w2).unwrap();
    let loss = out.mean().unwrap();
    assert_eq!(loss.item().unwrap(), 15.0);

    loss.backward().unwrap();
    assert_eq!(w1.grad().unwrap().data(), vec![2.0, 2.0, 2.0, 3.0, 3.0, 3.0]);
    assert_eq!(w2.grad().unwrap().data(), vec![5.0, 5.0, 5.0]);
    assert_eq!(hidden.grad().unwrap().data(), vec![0.5; 6]);
    assert!(x.grad().is_none());
}

const PARAM_SHAPES: [[usize; 2]; 4] = [[3, 2], [4, 2], [2, 1], [4, 1]];

fn two_layer_params() -> [Vec<f64>; 4] {
    [
        vec![0.2, -0.4, 0.6, 0.1, -0.3, 0.5],
        vec![0.1, 0.0, -0.1, 0.2, 0.3, -0.2, 0.0, 0.1],
        vec![0.7, -0.5],
        vec![0.05, -0.05, 0.1, 0.0],
    ]
}

/// `mean(((X@W1 + b1)@W2 + b2 + target*(-1))²)`
fn two_layer_loss(x: &Tensor, target: &Tensor, params: &[Tensor]) -> Tensor {
    let [w1, b1, w2, b2] = params else {
        panic!("expected four parameters");
    };
    let hidden = x.matmul(w1).unwrap().add(b1).unwrap();
    let out = hidden.matmul(w2).unwrap().add(b2).unwrap();
    let diff = out.add(&target.multiply(-1).unwrap()).unwrap();
    diff.multiply(&diff).unwrap().mean().unwrap()
}

fn two_layer_inputs() -> (Tensor, Tensor) {
    let x = tensor!([[1.0, 2.0, 3.0], [-1.0, 0.5, 2.0], [0.0, 1.0, -2.0], [3.0, -1.0, 1.0]]);
    let target = tensor!([[1.0], [0.0], [-1.0], [2.0]]);
    (x, target)
}

fn leaves(data: &[Vec<f64>], requires_grad: bool) -> Vec<Tensor> {
    data.iter()
        .zip(PARAM_SHAPES)
        .map(|(d, shape)| {
            Tensor::from_vec(shape.to_vec(), d.clone()).unwrap().with_requires_grad(requires_grad)
        })
        .collect()
}

/// Central differences of the loss with respect to every parameter element.
fn numeric_gradients() -> Vec<Vec<f64>> {
    const EPS: f64 = 1e-6;
    let (x, target) = two_layer_inputs();
    let base = two_layer_params();
    let loss_at = |data: &[Vec<f64>]| two_layer_loss(&x, &target, &leaves(data, false)).item();

    (0..base.len())
        .map(|p| {
            (0..base[p].len())
                .map(|i| {
                    let mut plus = base.clone();
                    plus[p][i] += EPS;
                    let mut minus = base.clone();
                    minus[p][i] -= EPS;
                    (loss_at(&plus).unwrap() - loss_at(&minus).unwrap()) / (2.0 * EPS)
                })
                .collect()
        })
        .collect()
}

#[test]
fn test_two_layer_end_to_end() {
    let expected = numeric_gradients();

    for strategy in [BackwardStrategy::Topological, BackwardStrategy::Recursive] {
        let (x, target) = two_layer_inputs();
        let params = leaves(&two_layer_params(), true);
        let loss = two_layer_loss(&x, &target, &params);
        assert_eq!(loss.rank(), 0);
        loss.backward_with_strategy(None, strategy).unwrap();

        assert!(x.grad().is_none());
        assert!(target.grad().is_none());
        for (param, numeric) in params.iter().zip(&expected) {
            let grad = param.grad().expect("every parameter receives a gradient");
            assert_eq!(grad.shape(), param.shape());
            assert!(
                all_close(&grad.data(), numeric, 1e-5),
                "{strategy:?}: {:?} vs {numeric:?}",
                grad.data()
            );
        }
    }
}

#[test]
fn test_gradients_accumulate_across_passes() {
    let w = tensor!([1.0, 2.0]).with_requires_grad(true);
    w.mean().unwrap().backward().unwrap();
    w.mean().unwrap().backward().unwrap();
    assert_eq!(w.grad().unwrap().data(), vec![1.0, 1.0]);

    w.zero_grad();
    w.mean().unwrap().backward().unwrap();
    assert_eq!(w.grad().unwrap().data(), vec![0.5, 0.5]);
}

/// `loss = mean((a*a + a) * (a*a))`, with `a*a` shared by both branches.
fn diamond(strategy: BackwardStrategy) -> (Vec<f64>, Vec<f64>) {
    let a = tensor!([[0.5, -1.0], [2.0, 3.0]]).with_requires_grad(true);
    let sq = a.multiply(&a).unwrap();
    let left = sq.add(&a).unwrap();
    let loss = left.multiply(&sq).unwrap().mean().unwrap();
    loss.backward_with_strategy(None, strategy).unwrap();
    (a.grad().unwrap().data(), sq.grad().unwrap().data())
}

#[test]
fn test_strategies_agree_on_diamond() {
    let (topo_a, topo_sq) = diamond(BackwardStrategy::Topological);
    let (rec_a, rec_sq) = diamond(BackwardStrategy::Recursive);
    assert!(all_close(&topo_a, &rec_a, CPU_TOLERANCE));
    assert!(all_close(&topo_sq, &rec_sq, CPU_TOLERANCE));

    // d/da (a⁴ + a³) / 4
    let expected: Vec<f64> = [0.5_f64, -1.0, 2.0, 3.0]
        .iter()
        .map(|a| (4.0 * a.powi(3) + 3.0 * a.powi(2)) / 4.0)
        .collect();
    assert!(all_close(&topo_a, &expected, CPU_TOLERANCE));
}

#[test]
fn test_explicit_seed_gradient() {
    let a = tensor!([1.0, 2.0, 3.0]).with_requires_grad(true);
    let y = a.multiply(2.0).unwrap();
    y.backward_with(&tensor!([1.0, 0.0, -1.0])).unwrap();
    assert_eq!(a.grad().unwrap().data(), vec![2.0, 0.0, -2.0]);
}
