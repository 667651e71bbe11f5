use netvis::activation::Activation;
use netvis::controller::Controller;
use netvis::modelio::save_params;
use netvis::network::LayerConfig;
use netvis::protocol::{Command, Event, TensorPayload, TrainingParams};
use std::error::Error;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // XOR, repeated so one epoch spans several batches
    let base = [([0.0, 0.0], 0.0), ([0.0, 1.0], 1.0), ([1.0, 0.0], 1.0), ([1.0, 1.0], 0.0)];
    let mut x = Vec::new();
    let mut y = Vec::new();
    for _ in 0..4 {
        for (input, target) in base {
            x.extend(input);
            y.push(target);
        }
    }

    let mut controller = Controller::new();
    let setup = controller.handle(Command::Setup {
        layer_config: vec![
            LayerConfig::Flatten {},
            LayerConfig::Dense { neurons: 8, activation: Activation::Tanh },
            LayerConfig::Dense { neurons: 1, activation: Activation::Sigmoid },
        ],
        x_train: TensorPayload { shape: vec![16, 2], buffer: x },
        y_train: TensorPayload { shape: vec![16, 1], buffer: y },
        training_params: TrainingParams { vis_sample: 1, ..TrainingParams::new(0.5, 400, 4) },
    });
    println!("{}", setup.map(|e| e.to_json()).transpose()?.unwrap_or_default());

    // the consumer decides the pace: one tick per batch, pausing halfway
    let mut ticks = 0usize;
    loop {
        ticks += 1;
        if ticks == 800 {
            controller.handle(Command::Pause);
            controller.handle(Command::Resume);
        }
        match controller.tick() {
            Event::BatchEnd { epoch, batch_idx: 0, loss, accuracy, vis_data, .. }
                if epoch % 50 == 0 =>
            {
                let p = vis_data
                    .layer_outputs
                    .last()
                    .and_then(|out| out.a_data.as_ref())
                    .map_or(f64::NAN, |a| a[0]);
                println!(
                    "Epoch {epoch:4}: loss={loss:.6} acc={accuracy:.2}% p(sample {})={p:.4}",
                    vis_data.sample_y_label
                );
            }
            Event::EpochEnd { epoch } if epoch % 100 == 99 => {
                if let Some(session) = controller.session() {
                    save_params("xor_model.bpat", session.network().params())?;
                    println!("checkpoint written after epoch {epoch}");
                }
            }
            Event::Complete { reason } => {
                println!("complete: {reason:?} after {ticks} ticks");
                break;
            }
            Event::Error { message } => return Err(message.into()),
            _ => {}
        }
    }
    Ok(())
}
