use netvis::activation::Activation;
use netvis::approx::approx_eq;
use netvis::backprop::*;
use netvis::cost::{Loss, compute_cost};
use netvis::forward::*;
use netvis::params::*;
use netvis::tensor;
use netvis::tensors::{Ten64, Tensor};
use rand::SeedableRng;
use rand::rngs::StdRng;

fn assert_close(got: &Ten64, want: &Ten64) {
    assert!(approx_eq(got, want), "got {got:?}, want {want:?}");
}

fn layer(w: Ten64, b: Ten64) -> LayerParams {
    LayerParams::new(w, b)
}

#[test]
fn test_tensor_shape_mismatch_panics() {
    let result = std::panic::catch_unwind(|| {
        Tensor::new(vec![2, 2], vec![1.0, 2.0, 3.0]);
    });
    assert!(result.is_err());
}

#[test]
fn test_initialize_params_shapes() {
    let mut rng = StdRng::seed_from_u64(1);
    let dims = [12, 7, 5, 3, 1];
    let params = initialize_params(&dims, &mut rng);
    assert_eq!(params.len(), dims.len() - 1);
    for (l, p) in params.iter().enumerate() {
        assert_eq!(p.w.shape, vec![dims[l + 1], dims[l]]);
        assert_eq!(p.b.shape, vec![dims[l + 1], 1]);
        assert!(p.b.data.iter().all(|&v| v == 0.0));
        assert!(p.w.data.iter().all(|v| v.abs() < 0.1));
    }
}

#[test]
fn test_linear_forward() {
    let a = tensor!([
        [1.62434536, -0.61175641],
        [-0.52817175, -1.07296862],
        [0.86540763, -2.3015387]
    ]);
    let p = layer(tensor!([[1.74481176, -0.7612069, 0.3190391]]), tensor!([[-0.24937038]]));
    assert_close(&linear_forward(&a, &p), &tensor!([[3.26295337, -1.23429987]]));
}

#[test]
fn test_linear_activation_forward() {
    let a_prev = tensor!([
        [-0.41675785, -0.05626683],
        [-2.1361961, 1.64027081],
        [-1.79343559, -0.84174737]
    ]);
    let p = layer(tensor!([[0.50288142, -1.24528809, -1.05795222]]), tensor!([[-0.90900761]]));

    let (a, cache) = linear_activation_forward(a_prev.clone(), &p, Activation::Sigmoid);
    assert_close(&a, &tensor!([[0.96890023, 0.11013289]]));
    assert_eq!(cache.linear.a_prev, a_prev);
    assert_eq!(cache.z.shape, vec![1, 2]);

    let (a, _) = linear_activation_forward(a_prev, &p, Activation::Relu);
    assert_close(&a, &tensor!([[3.43896131, 0.0]]));
}

#[test]
fn test_model_forward_three_layers() {
    let x = tensor!([
        [-0.31178367, 0.72900392, 0.21782079, -0.8990918],
        [-2.48678065, 0.91325152, 1.12706373, -1.51409323],
        [1.63929108, -0.4298936, 2.63128056, 0.60182225],
        [-0.33588161, 1.23773784, 0.11112817, 0.12915125],
        [0.07612761, -0.15512816, 0.63422534, 0.810655]
    ]);
    let params = ParamStore::new(vec![
        layer(
            tensor!([
                [0.35480861, 1.81259031, -1.3564758, -0.46363197, 0.82465384],
                [-1.17643148, 1.56448966, 0.71270509, -0.1810066, 0.53419953],
                [-0.58661296, -1.48185327, 0.85724762, 0.94309899, 0.11444143],
                [-0.02195668, -2.12714455, -0.83440747, -0.46550831, 0.23371059]
            ]),
            tensor!([[1.38503523], [-0.51962709], [-0.78015214], [0.95560959]]),
        ),
        layer(
            tensor!([
                [-0.12673638, -1.36861282, 1.21848065, -0.85750144],
                [-0.56147088, -1.0335199, 0.35877096, 1.07368134],
                [-0.37550472, 0.39636757, -0.47144628, 2.33660781]
            ]),
            tensor!([[1.50278553], [-0.59545972], [0.52834106]]),
        ),
        layer(tensor!([[0.9398248, 0.42628539, -0.75815703]]), tensor!([[-0.16236698]])),
    ]);

    let (al, caches) = model_forward(&x, &params, Activation::Sigmoid);
    assert_close(&al, &tensor!([[0.03921668, 0.70498921, 0.19734387, 0.04728177]]));
    assert_eq!(caches.len(), 3);
    assert_eq!(caches[0].activation, Activation::Relu);
    assert_eq!(caches[1].activation, Activation::Relu);
    assert_eq!(caches[2].activation, Activation::Sigmoid);
    assert_eq!(caches[2].linear.a_prev.shape, vec![3, 4]);
}

#[test]
fn test_single_layer_runs_only_the_output_step() {
    let params = ParamStore::new(vec![layer(tensor!([[-2.0, 1.0]]), tensor!([[0.0]]))]);
    let x = tensor!([[1.0], [1.0]]);
    let (al, caches) = model_forward(&x, &params, Activation::Sigmoid);
    assert_eq!(caches.len(), 1);
    assert_eq!(caches[0].activation, Activation::Sigmoid);
    assert!(al.data[0] > 0.0 && al.data[0] < 0.5);
}

#[test]
fn test_compute_cost() {
    let y = tensor!([[1.0, 1.0, 0.0]]);
    let al = tensor!([[0.8, 0.9, 0.4]]);
    let cost = compute_cost(&al, &y).unwrap();
    assert!((cost - 0.2797765635793422).abs() < 1e-12);
    assert!((Loss::BinaryCrossEntropy.cost(&al, &y).unwrap() - cost).abs() < 1e-15);
}

#[test]
fn test_linear_backward() {
    let dz = tensor!([
        [1.62434536, -0.61175641, -0.52817175, -1.07296862],
        [0.86540763, -2.3015387, 1.74481176, -0.7612069],
        [0.3190391, -0.24937038, 1.46210794, -2.06014071]
    ]);
    let p = layer(
        tensor!([
            [-0.6871727, -0.84520564, -0.67124613, -0.0126646, -1.11731035],
            [0.2344157, 1.65980218, 0.74204416, -0.19183555, -0.88762896],
            [-0.74715829, 1.6924546, 0.05080775, -0.63699565, 0.19091548]
        ]),
        tensor!([[2.10025514], [0.12015895], [0.61720311]]),
    );
    let cache = LinearCache {
        a_prev: tensor!([
            [-0.3224172, -0.38405435, 1.13376944, -1.09989127],
            [-0.17242821, -0.87785842, 0.04221375, 0.58281521],
            [-1.10061918, 1.14472371, 0.90159072, 0.50249434],
            [0.90085595, -0.68372786, -0.12289023, -0.93576943],
            [-0.26788808, 0.53035547, -0.69166075, -0.39675353]
        ]),
        params: &p,
    };

    let grads = linear_backward(&dz, &cache);
    assert_close(
        &grads.da_prev,
        &tensor!([
            [-1.15171336, 0.06718465, -0.3204696, 2.09812712],
            [0.60345879, -3.72508701, 5.81700741, -3.84326836],
            [-0.4319552, -1.30987417, 1.72354705, 0.05070578],
            [-0.38981415, 0.60811244, -1.25938424, 1.47191593],
            [-2.52214926, 2.67882552, -0.67947465, 1.48119548]
        ]),
    );
    assert_close(
        &grads.dw,
        &tensor!([
            [0.07313866, -0.0976715, -0.87585828, 0.73763362, 0.00785716],
            [0.85508818, 0.37530413, -0.59912655, 0.71278189, -0.58931808],
            [0.97913304, -0.24376494, -0.08839671, 0.55151192, -0.10290907]
        ]),
    );
    assert_close(&grads.db, &tensor!([[-0.14713786], [-0.11313155], [-0.13209101]]));
}

#[test]
fn test_linear_activation_backward() {
    let da = tensor!([[-0.41675785, -0.05626683]]);
    let p = layer(tensor!([[-1.05795222, -0.90900761, 0.55145404]]), tensor!([[2.29220801]]));
    let cache = |activation| LayerCache {
        linear: LinearCache {
            a_prev: tensor!([
                [-2.1361961, 1.64027081],
                [-1.79343559, -0.84174737],
                [0.50288142, -1.24528809]
            ]),
            params: &p,
        },
        z: tensor!([[0.04153939, -1.11792545]]),
        activation,
    };

    let g = linear_activation_backward(&da, &cache(Activation::Sigmoid));
    assert_close(
        &g.da_prev,
        &tensor!([[0.11017994, 0.01105339], [0.09466817, 0.00949723], [-0.05743092, -0.00576154]]),
    );
    assert_close(&g.dw, &tensor!([[0.10266786, 0.09778551, -0.01968084]]));
    assert_close(&g.db, &tensor!([[-0.05729622]]));

    let g = linear_activation_backward(&da, &cache(Activation::Relu));
    assert_close(&g.da_prev, &tensor!([[0.44090989, 0.0], [0.37883606, 0.0], [-0.2298228, 0.0]]));
    assert_close(&g.dw, &tensor!([[0.44513824, 0.37371418, -0.10478989]]));
    assert_close(&g.db, &tensor!([[-0.20837892]]));
}

#[test]
fn test_model_backward_two_layers() {
    let al = tensor!([[1.78862847, 0.43650985]]);
    let y = tensor!([[1.0, 0.0]]);
    let p1 = layer(
        tensor!([
            [-1.31386475, 0.88462238, 0.88131804, 1.70957306],
            [0.05003364, -0.40467741, -0.54535995, -1.54647732],
            [0.98236743, -1.10106763, -1.18504653, -0.2056499]
        ]),
        tensor!([[1.48614836], [0.23671627], [-1.02378514]]),
    );
    let p2 = layer(tensor!([[-1.02387576, 1.12397796, -0.13191423]]), tensor!([[-1.62328545]]));
    let caches = vec![
        LayerCache {
            linear: LinearCache {
                a_prev: tensor!([
                    [0.09649747, -1.8634927],
                    [-0.2773882, -0.35475898],
                    [-0.08274148, -0.62700068],
                    [-0.04381817, -0.47721803]
                ]),
                params: &p1,
            },
            z: tensor!([
                [-0.7129932, 0.62524497],
                [-0.16051336, -0.76883635],
                [-0.23003072, 0.74505627]
            ]),
            activation: Activation::Relu,
        },
        LayerCache {
            linear: LinearCache {
                a_prev: tensor!([
                    [1.97611078, -1.24412333],
                    [-0.62641691, -0.80376609],
                    [-2.41908317, -0.92379202]
                ]),
                params: &p2,
            },
            z: tensor!([[0.64667545, -0.35627076]]),
            activation: Activation::Sigmoid,
        },
    ];

    let grads = model_backward(&al, &y, &caches, Loss::BinaryCrossEntropy).unwrap();
    assert_eq!(grads.len(), 2);

    let g1 = grads.layer(0);
    assert_close(
        &g1.dw,
        &tensor!([
            [0.41010002, 0.07807203, 0.13798444, 0.10502167],
            [0.0, 0.0, 0.0, 0.0],
            [0.05283652, 0.01005865, 0.01777766, 0.0135308]
        ]),
    );
    assert_close(&g1.db, &tensor!([[-0.22007063], [0.0], [-0.02835349]]));

    let g2 = grads.layer(1);
    assert_close(&g2.dw, &tensor!([[-0.39202432, -0.13325855, -0.04601089]]));
    assert_close(&g2.db, &tensor!([[0.15187861]]));
    assert_close(
        &g2.da_prev,
        &tensor!([[0.12913162, -0.44014127], [-0.14175655, 0.48317296], [0.01663708, -0.05670698]]),
    );

    let da0 = grads.input_grad().unwrap();
    assert_close(
        da0,
        &tensor!([[0.0, 0.52257901], [0.0, -0.3269206], [0.0, -0.32070404], [0.0, -0.74079187]]),
    );
}

#[test]
fn test_update_parameters() {
    let params = ParamStore::new(vec![
        layer(
            tensor!([
                [-0.41675785, -0.05626683, -2.1361961, 1.64027081],
                [-1.79343559, -0.84174737, 0.50288142, -1.24528809],
                [-1.05795222, -0.90900761, 0.55145404, 2.29220801]
            ]),
            tensor!([[0.04153939], [-1.11792545], [0.53905832]]),
        ),
        layer(tensor!([[-0.5961597, -0.0191305, 1.17500122]]), tensor!([[-0.74787095]])),
    ]);
    let grad = |dw: Ten64, db: Ten64| LayerGrads { da_prev: Ten64::zeros([1, 1]), dw, db };
    let grads = GradientBundle::new(vec![
        grad(
            tensor!([
                [1.78862847, 0.43650985, 0.09649747, -1.8634927],
                [-0.2773882, -0.35475898, -0.08274148, -0.62700068],
                [-0.04381817, -0.47721803, -1.31386475, 0.88462238]
            ]),
            tensor!([[0.88131804], [1.70957306], [0.05003364]]),
        ),
        grad(tensor!([[-0.40467741, -0.54535995, -1.54647732]]), tensor!([[0.98236743]])),
    ]);

    let updated = update_parameters(params, &grads, 0.1);
    assert_close(
        &updated.layer(0).w,
        &tensor!([
            [-0.59562069, -0.09991781, -2.14584584, 1.82662008],
            [-1.76569676, -0.80627147, 0.51115557, -1.18258802],
            [-1.0535704, -0.86128581, 0.68284052, 2.20374577]
        ]),
    );
    assert_close(&updated.layer(0).b, &tensor!([[-0.04659241], [-1.28888275], [0.53405496]]));
    assert_close(&updated.layer(1).w, &tensor!([[-0.55569196, 0.0354055, 1.32964895]]));
    assert_close(&updated.layer(1).b, &tensor!([[-0.84610769]]));
}

#[test]
fn test_gradient_shapes_mirror_forward() {
    let mut rng = StdRng::seed_from_u64(9);
    let params = initialize_params_scaled(&[6, 5, 4, 1], 0.5, &mut rng);
    let x = Ten64::randn([6, 7], 1.0, &mut rng);
    let y = Ten64::new(vec![1, 7], vec![1.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0]);
    let (al, caches) = model_forward(&x, &params, Activation::Sigmoid);
    let grads = model_backward(&al, &y, &caches, Loss::BinaryCrossEntropy).unwrap();
    for (p, g) in params.iter().zip(grads.iter()) {
        assert_eq!(p.w.shape, g.dw.shape);
        assert_eq!(p.b.shape, g.db.shape);
    }
    for (cache, g) in caches.iter().zip(grads.iter()) {
        assert_eq!(cache.linear.a_prev.shape, g.da_prev.shape);
    }
}
