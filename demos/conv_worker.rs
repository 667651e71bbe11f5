use netvis::activation::Activation;
use netvis::network::LayerConfig;
use netvis::protocol::{Command, Event, TensorPayload, TrainingParams};
use netvis::worker::WorkerHandle;
use rand::{Rng, SeedableRng};
use std::error::Error;
use tracing_subscriber::EnvFilter;

const SIDE: usize = 6;
const SAMPLES: usize = 60;

/// Bars on a 6x6 canvas: class 0 horizontal, 1 vertical, 2 diagonal.
fn bars(rng: &mut impl Rng) -> (Vec<f64>, Vec<f64>) {
    let mut x = vec![0.0; SAMPLES * SIDE * SIDE];
    let mut y = vec![0.0; SAMPLES * 3];
    for s in 0..SAMPLES {
        let class = s % 3;
        let at = rng.random_range(1..SIDE - 1);
        let image = &mut x[s * SIDE * SIDE..(s + 1) * SIDE * SIDE];
        for i in 0..SIDE {
            let (r, c) = match class {
                0 => (at, i),
                1 => (i, at),
                _ => (i, i),
            };
            image[r * SIDE + c] = 1.0;
        }
        for px in image.iter_mut() {
            *px += rng.random_range(-0.1..0.1);
        }
        y[s * 3 + class] = 1.0;
    }
    (x, y)
}

fn main() -> Result<(), Box<dyn Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut rng = rand::rngs::StdRng::seed_from_u64(7);
    let (x, y) = bars(&mut rng);

    let worker = WorkerHandle::spawn()?;
    worker.send(Command::Setup {
        layer_config: vec![
            LayerConfig::Conv {
                out_channels: 4,
                kernel_size: 3,
                stride: 1,
                padding: 1,
                activation: Activation::Relu,
            },
            LayerConfig::MaxPool { pool_size: 2, stride: 2 },
            LayerConfig::Flatten {},
            LayerConfig::Dense { neurons: 3, activation: Activation::Softmax },
        ],
        x_train: TensorPayload { shape: vec![SAMPLES, SIDE, SIDE, 1], buffer: x },
        y_train: TensorPayload { shape: vec![SAMPLES, 3], buffer: y },
        training_params: TrainingParams::new(0.05, 30, 10),
    })?;

    let total_batches = match worker.recv()? {
        Event::SetupComplete { total_batches, .. } => total_batches,
        other => return Err(format!("setup failed: {other:?}").into()),
    };
    println!("{total_batches} batches per epoch");

    // stop once the batch accuracy holds at 100% for a whole epoch
    let mut perfect = 0;
    loop {
        worker.send(Command::Tick)?;
        match worker.recv()? {
            Event::BatchEnd { epoch, batch_idx, loss, accuracy, iter_time, vis_data } => {
                perfect = if accuracy >= 100.0 { perfect + 1 } else { 0 };
                if batch_idx + 1 == total_batches {
                    let maps = vis_data.layer_outputs[0].a_shape.clone().unwrap_or_default();
                    println!(
                        "Epoch {epoch:3}: loss={loss:.5} acc={accuracy:.1}% ({iter_time:.2} ms) \
                         conv maps {maps:?}"
                    );
                }
                if perfect == total_batches {
                    worker.send(Command::Stop)?;
                }
            }
            Event::Complete { reason } => {
                println!("complete: {reason:?}");
                break;
            }
            Event::Error { message } => return Err(message.into()),
            _ => {}
        }
    }

    worker.shutdown();
    Ok(())
}
