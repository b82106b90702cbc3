use proptest::prelude::*;
use tensorgraph::approx::{all_close, CPU_TOLERANCE};
use tensorgraph::{BackwardStrategy, Device, Tensor};

fn matrix(max_dim: usize) -> impl Strategy<Value = (usize, usize, Vec<f64>)> {
    (1..=max_dim, 1..=max_dim).prop_flat_map(|(r, c)| {
        (Just(r), Just(c), prop::collection::vec(-10.0_f64..10.0, r * c))
    })
}

fn leaf(shape: &[usize], data: Vec<f64>, device: Device) -> Tensor {
    Tensor::from_vec(shape.to_vec(), data).unwrap().on_device(device).with_requires_grad(true)
}

fn device() -> impl Strategy<Value = Device> {
    prop_oneof![Just(Device::Reference), Just(Device::Accelerated)]
}

proptest! {
    #[test]
    fn transpose_twice_is_identity((r, c, data) in matrix(8), dev in device()) {
        let t = leaf(&[r, c], data, dev);
        let back = t.transpose().unwrap().transpose().unwrap();
        prop_assert_eq!(back.shape(), t.shape());
        prop_assert_eq!(back.data(), t.data());
    }

    #[test]
    fn matmul_output_shape((m, k, a) in matrix(6), n in 1usize..6, dev in device()) {
        let a = leaf(&[m, k], a, dev);
        let b = Tensor::ones(&[k, n]).on_device(dev);
        let c = a.matmul(&b).unwrap();
        prop_assert_eq!(c.shape(), &[m, n][..]);
    }

    #[test]
    fn mean_gradient_is_uniform((r, c, data) in matrix(8), dev in device()) {
        let t = leaf(&[r, c], data, dev);
        t.mean().unwrap().backward().unwrap();
        let expected = vec![1.0 / (r * c) as f64; r * c];
        prop_assert!(all_close(&t.grad().unwrap().data(), &expected, CPU_TOLERANCE));
    }

    #[test]
    fn constant_add_leaves_gradient_unchanged((r, c, data) in matrix(6), k in -5.0_f64..5.0) {
        let plain = leaf(&[r, c], data.clone(), Device::Reference);
        plain.multiply(&plain).unwrap().mean().unwrap().backward().unwrap();

        let shifted = leaf(&[r, c], data, Device::Reference);
        shifted.multiply(&shifted).unwrap().add(k).unwrap().mean().unwrap().backward().unwrap();

        prop_assert!(all_close(
            &plain.grad().unwrap().data(),
            &shifted.grad().unwrap().data(),
            CPU_TOLERANCE,
        ));
    }

    #[test]
    fn strategies_agree((m, k, a) in matrix(5), seed in any::<u64>()) {
        let b_data: Vec<f64> = (0..k * 3)
            .map(|i| ((seed.wrapping_add(i as u64) % 17) as f64) - 8.0)
            .collect();
        let mut grads = Vec::new();
        for strategy in [BackwardStrategy::Topological, BackwardStrategy::Recursive] {
            let x = leaf(&[m, k], a.clone(), Device::Reference);
            let w = leaf(&[k, 3], b_data.clone(), Device::Reference);
            let h = x.matmul(&w).unwrap();
            let loss = h.multiply(&h).unwrap().add(&h).unwrap().mean().unwrap();
            loss.backward_with_strategy(None, strategy).unwrap();
            grads.push((x.grad().unwrap().data(), w.grad().unwrap().data()));
        }
        prop_assert!(all_close(&grads[0].0, &grads[1].0, 1e-6));
        prop_assert!(all_close(&grads[0].1, &grads[1].1, 1e-6));
    }
}
