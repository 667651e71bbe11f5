use netvis::ops::cpu::{self, Nhwc, Window};
use netvis::{tensor, tensors::Tensor};

#[test]
fn test_tensor_creation() {
    let t = Tensor::new(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]);
    assert_eq!(t.shape, vec![2, 2]);
    assert_eq!(t.data, vec![1.0, 2.0, 3.0, 4.0]);
}

#[test]
fn test_tensor_macro() {
    let t = tensor!([[1.0, 2.0], [3.0, 4.0]]);
    assert_eq!(t.shape, vec![2, 2]);
    assert_eq!(t.data, vec![1.0, 2.0, 3.0, 4.0]);

    let cube = tensor!([[[1, 2], [3, 4]], [[5, 6], [7, 8]]]);
    assert_eq!(cube.shape, vec![2, 2, 2]);
    assert_eq!(cube.data[7], 8.0);
}

#[test]
fn test_matmul_shapes_and_values() {
    let a = Tensor::new(vec![2, 3], vec![
        1.0, 2.0, 3.0,
        4.0, 5.0, 6.0
    ]);
    let b = Tensor::new(vec![3, 2], vec![
        7.0, 8.0,
        9.0, 10.0,
        11.0, 12.0
    ]);
    let c = a.matmul(&b);
    assert_eq!(c.shape, vec![2, 2]);
    assert_eq!(c.data, vec![58.0, 64.0, 139.0, 154.0]);
}

#[test]
#[should_panic(expected = "matmul shape mismatch")]
fn test_matmul_inner_mismatch_panics() {
    let a = Tensor::new(vec![2, 3], vec![0.0; 6]);
    let _ = a.matmul(&a);
}

#[test]
fn test_transpose_and_row_sums() {
    let t = tensor!([[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
    assert_eq!(t.transpose(), tensor!([[1.0, 4.0], [2.0, 5.0], [3.0, 6.0]]));
    assert_eq!(t.sum_rows(), tensor!([[6.0], [15.0]]));
    assert_eq!(t.sum(), 21.0);
}

#[test]
fn test_sub_scaled_is_a_descent_step() {
    let mut w = tensor!([1.0, 2.0]);
    w.sub_scaled(&tensor!([0.1, 0.2]), 0.5);
    assert_eq!(w.data, vec![0.95, 1.9]);
}

#[test]
fn test_strided_padded_convolution() {
    // 3x3 single-channel input, all-ones 2x2 kernel, stride 2, padding 1
    let dims = Nhwc { n: 1, h: 3, w: 3, c: 1 };
    let input: Vec<f64> = (1..=9).map(f64::from).collect();
    let win = Window { size: 2, stride: 2, padding: 1 };
    let (z, out) = cpu::conv2d(&input, dims, &[1.0; 4], &[0.5], 1, win);
    assert_eq!(out, Nhwc { n: 1, h: 2, w: 2, c: 1 });
    assert_eq!(z, vec![1.5, 5.5, 11.5, 28.5]);
}

#[test]
fn test_conv_backward_bias_sums_upstream() {
    let dims = Nhwc { n: 2, h: 2, w: 2, c: 1 };
    let input = vec![1.0; 8];
    let win = Window { size: 1, stride: 1, padding: 0 };
    let out = Nhwc { n: 2, h: 2, w: 2, c: 1 };
    let dz: Vec<f64> = (0..8).map(f64::from).collect();
    let grads = cpu::conv2d_backward(&input, dims, &[2.0], win, &dz, out);
    assert_eq!(grads.d_bias, vec![28.0]);
    assert_eq!(grads.d_weights, vec![28.0]);
    assert_eq!(grads.d_input, dz.iter().map(|g| g * 2.0).collect::<Vec<_>>());
}
