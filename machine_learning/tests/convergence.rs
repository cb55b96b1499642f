use std::{num::NonZeroUsize, thread};

use comms::{LocalGroup, ProcessGroup, SoloGroup};
use machine_learning::{
    config::TrainConfig,
    data::{Batch, InMemoryDataset, LinearSynth, train_val_split},
    training::{Mode, TrainerBuilder, TrainerState},
};
use rand::{SeedableRng, rngs::StdRng};

const LONG_EPOCHS: usize = 200;

fn long_config() -> TrainConfig {
    TrainConfig {
        epochs: LONG_EPOCHS,
        ..TrainConfig::default()
    }
}

/// The train split every worker derives from `config`.
fn train_split(config: &TrainConfig) -> InMemoryDataset {
    let data = &config.data;
    let synth =
        LinearSynth::new(data.n_samples, data.true_bias, data.true_slope, data.noise_scale).unwrap();
    let dataset = synth.generate(&mut StdRng::seed_from_u64(data.seed)).unwrap();

    let split = &config.split;
    let mut rng = StdRng::seed_from_u64(split.seed);
    let (train, _) = train_val_split(&dataset, split.train_fraction, split.policy, &mut rng).unwrap();
    train
}

/// Closed form ordinary least squares fit, `(slope, intercept)`.
fn least_squares(ds: &InMemoryDataset) -> (f32, f32) {
    let n = ds.len() as f64;
    let mean_x = ds.xs().iter().map(|&x| x as f64).sum::<f64>() / n;
    let mean_y = ds.ys().iter().map(|&y| y as f64).sum::<f64>() / n;

    let (cov, var) = ds.iter().fold((0.0, 0.0), |(cov, var), s| {
        let dx = s.x as f64 - mean_x;
        (cov + dx * (s.y as f64 - mean_y), var + dx * dx)
    });

    let slope = cov / var;
    (slope as f32, (mean_y - slope * mean_x) as f32)
}

#[test]
fn default_run_lands_near_the_true_line() {
    let config = TrainConfig::default();
    assert_eq!(config.epochs, 50);

    let mut trainer = TrainerBuilder::new(config).build(SoloGroup).unwrap();
    let reports = trainer.train(config.epochs).unwrap();
    assert_eq!(reports.len(), 50);
    assert_eq!(trainer.state(), TrainerState::Done);

    let (w, b) = (trainer.params()[0], trainer.params()[1]);
    assert!((w - 2.0).abs() < 0.05, "slope {w}");
    assert!((b - 1.0).abs() < 0.05, "bias {b}");

    let last = reports.last().unwrap();
    assert!(last.val_loss.unwrap() < 0.05, "val loss {:?}", last.val_loss);
}

#[test]
fn long_run_approaches_least_squares() {
    let config = long_config();
    let mut trainer = TrainerBuilder::new(config).build(SoloGroup).unwrap();

    let reports = trainer.train(config.epochs).unwrap();
    assert_eq!(reports.len(), LONG_EPOCHS);
    assert_eq!(trainer.state(), TrainerState::Done);

    let (w, b) = (trainer.params()[0], trainer.params()[1]);
    let (ls_w, ls_b) = least_squares(&train_split(&config));

    assert!((w - ls_w).abs() < 0.08, "slope {w} vs least squares {ls_w}");
    assert!((b - ls_b).abs() < 0.08, "bias {b} vs least squares {ls_b}");

    let last = reports.last().unwrap();
    assert!(last.val_loss.unwrap() < 0.05, "val loss {:?}", last.val_loss);
    assert!(last.train_loss < reports[0].train_loss);

    let sd = trainer.state_dict().unwrap();
    assert_eq!(sd["weight"], vec![w]);
    assert_eq!(sd["bias"], vec![b]);
}

#[test]
fn four_workers_match_a_single_one() {
    let config = TrainConfig::default();

    let mut solo = TrainerBuilder::new(config).build(SoloGroup).unwrap();
    solo.train(config.epochs).unwrap();
    let expected = solo.params().to_vec();

    let groups = LocalGroup::new(NonZeroUsize::new(4).unwrap());
    let replicas: Vec<Vec<f32>> = thread::scope(|s| {
        let handles: Vec<_> = groups
            .into_iter()
            .map(|group| {
                s.spawn(move || {
                    let mut trainer = TrainerBuilder::new(config).build(group).unwrap();
                    trainer.train(config.epochs).unwrap();

                    let params = trainer.params().to_vec();
                    trainer.into_group().destroy().unwrap();
                    params
                })
            })
            .collect();

        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let bits = |p: &[f32]| p.iter().map(|v| v.to_bits()).collect::<Vec<_>>();
    for replica in &replicas[1..] {
        assert_eq!(bits(replica), bits(&replicas[0]), "replicas diverged");
    }

    for (got, want) in replicas[0].iter().zip(&expected) {
        assert!((got - want).abs() < 0.1, "world 4 {got} vs world 1 {want}");
    }
    assert!((replicas[0][0] - 2.0).abs() < 0.05, "slope {}", replicas[0][0]);
    assert!((replicas[0][1] - 1.0).abs() < 0.05, "bias {}", replicas[0][1]);
}

#[test]
fn validation_never_moves_the_parameters() {
    let mut trainer = TrainerBuilder::new(TrainConfig::default()).build(SoloGroup).unwrap();
    trainer.train(3).unwrap();

    let before = trainer.params().to_vec();
    let batch = Batch {
        xs: vec![0.1, 0.5, 0.9],
        ys: vec![1.2, 2.0, 2.8],
    };

    let first = trainer.val_step(&batch).unwrap();
    let second = trainer.val_step(&batch).unwrap();

    assert_eq!(first, second);
    assert_eq!(trainer.params(), before.as_slice());
    assert_eq!(trainer.mode(), Mode::Eval);

    let ys = trainer.predict(&[0.0, 1.0]).unwrap();
    assert_eq!(ys.len(), 2);
    assert_eq!(trainer.mode(), Mode::Train);
    assert_eq!(trainer.params(), before.as_slice());
}

#[test]
fn training_resumes_where_it_stopped() {
    let mut trainer = TrainerBuilder::new(TrainConfig::default()).build(SoloGroup).unwrap();

    trainer.train(2).unwrap();
    let reports = trainer.train(3).unwrap();

    assert_eq!(trainer.total_epochs(), 5);
    assert_eq!(reports.first().map(|r| r.epoch), Some(3));
    assert_eq!(trainer.world().size(), 1);
}
