//! Calibrate a queueing model against a simulated server.
//!
//! Pass `prefill-decode` as argument to calibrate the prefill-decode model, the decode model is
//! used otherwise. The simulated server's service coefficients shift in the second phase and return
//! in the third.
//! Each cycle prints the environment, the estimate, the innovation and the state covariance.
//!
//! Run with `RUST_LOG=queue_calibrate=debug` to also see the tuner's own events.

use rand::rngs::StdRng;
use rand::SeedableRng;

use queue_calibrate::config::ConfigData;
use queue_calibrate::display::{mat_string, vec_string};
use queue_calibrate::observation::{QueueModel, QueueModelKind};
use queue_calibrate::observer::{SimulatedObserver, SimulationStep};
use queue_calibrate::tuner::Tuner;

const DECODE_CONFIG: &str = r#"{
    "filterData": {
        "gammaFactor": 1.0,
        "errorLevel": 0.05,
        "studentPercentile": 1.96,
        "percentChange": 5.0,
        "stepSize": 0.001
    },
    "modelData": {
        "initState": [20.0, 0.9],
        "boundedState": true,
        "minState": [1.0, 0.01],
        "maxState": [100.0, 10.0],
        "expectedObservations": [200.0, 47.0]
    }
}"#;

const PREFILL_DECODE_CONFIG: &str = r#"{
    "modelData": {
        "initState": [20.0, 0.5, 50.0, 0.02],
        "boundedState": true,
        "minState": [1.0, 0.01, 1.0, 0.001],
        "maxState": [100.0, 10.0, 200.0, 1.0],
        "expectedObservations": [60.0, 30.0]
    }
}"#;

const PHASE_STEPS: usize = 20;

fn phase(alpha: f64, beta: f64) -> impl Iterator<Item = SimulationStep> {
    std::iter::repeat(SimulationStep::decode(35.2, 1024., alpha, beta, 48).with_noise(0.05, 0.)).take(PHASE_STEPS)
}

fn prefill_phase(rpm: f64, params: [f64; 4]) -> impl Iterator<Item = SimulationStep> {
    let [alpha, beta, gamma, delta] = params;
    let step = SimulationStep::decode(rpm, 512., alpha, beta, 96)
        .with_prefill(gamma, delta, 128.)
        .with_noise(0.01, 0.01);
    std::iter::repeat(step).take(PHASE_STEPS)
}

fn simulation(kind: QueueModelKind) -> (Vec<SimulationStep>, &'static str) {
    match kind {
        QueueModelKind::Decode => (
            phase(18., 1.).chain(phase(22., 0.7)).chain(phase(18., 1.)).collect(),
            DECODE_CONFIG,
        ),
        QueueModelKind::PrefillDecode => (
            prefill_phase(120., [18., 0.4, 56., 0.01])
                .chain(prefill_phase(60., [24., 0.8, 72., 0.02]))
                .chain(prefill_phase(120., [18., 0.4, 56., 0.01]))
                .collect(),
            PREFILL_DECODE_CONFIG,
        ),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive("queue_calibrate=info".parse()?))
        .init();

    let kind = match std::env::args().nth(1) {
        Some(arg) => arg.parse::<QueueModelKind>()?,
        None => QueueModelKind::Decode,
    };
    let (steps, config) = simulation(kind);
    let num_steps = steps.len();
    let mut observer = SimulatedObserver::new(steps, StdRng::seed_from_u64(42))?;

    let config = ConfigData::from_json(config)?;
    let mut tuner = Tuner::from_config_data(&config, QueueModel::new(kind))?;
    println!("{}", tuner);

    for k in 0..num_steps {
        let env = observer.environment()?;
        println!("{}", env);

        if let Err(e) = tuner.run(env) {
            println!("{}", e);
            continue;
        }
        println!(
            "{} : {};   {};   {}",
            k,
            vec_string("X", &tuner.x()),
            vec_string("Delta", tuner.innovation().ok_or("no innovation")?),
            mat_string("P", tuner.p())
        );
    }
    Ok(())
}
