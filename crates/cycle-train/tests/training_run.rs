//! End-to-end runs of the training loop with recording collaborators.

use candle_core::{DType, Device, Tensor};
use candle_nn::{Init, VarBuilder, VarMap};
use cycle_core::{CycleError, Domain, PairingPolicy, TrainConfig};
use cycle_data::{Batches, InMemorySource, Order, SourcePair};
use cycle_nets::{ImageModel, NetConfig};
use cycle_train::{
    CancelToken, CycleModels, CycleTrainer, EvalSplit, EvaluationSink, LossKind, Persistence,
    SafetensorsStore, SampleWriter, TrainHistory,
};

/// Elementwise `x · w` with a single trainable scalar.
struct Scale {
    name: String,
    var_map: VarMap,
    w: Tensor,
}

impl Scale {
    fn boxed(name: &str, init: f64) -> Box<dyn ImageModel> {
        let var_map = VarMap::new();
        let vb = VarBuilder::from_varmap(&var_map, DType::F32, &Device::Cpu);
        let w = vb.get_with_hints(1, "w", Init::Const(init)).unwrap();
        Box::new(Self {
            name: name.to_string(),
            var_map,
            w,
        })
    }
}

impl ImageModel for Scale {
    fn name(&self) -> &str {
        &self.name
    }

    fn forward(&self, xs: &Tensor) -> Result<Tensor, CycleError> {
        xs.broadcast_mul(&self.w).map_err(|e| CycleError::Tensor {
            message: e.to_string(),
        })
    }

    fn var_map(&self) -> &VarMap {
        &self.var_map
    }
}

fn scale_models(g_a_init: f64) -> CycleModels {
    CycleModels::new(
        Scale::boxed("G_A", g_a_init),
        Scale::boxed("G_B", 0.9),
        Scale::boxed("D_A", 0.5),
        Scale::boxed("D_B", 0.5),
    )
}

fn source(domain: Domain, n: usize, side: usize, order: Order) -> Box<InMemorySource> {
    let images = (0..n)
        .map(|_| Tensor::rand(-1f32, 1.0, (3, side, side), &Device::Cpu).unwrap())
        .collect();
    Box::new(InMemorySource::new(domain, images, 1, order).unwrap())
}

fn pair(n_a: usize, n_b: usize, side: usize, seed: u64) -> SourcePair {
    SourcePair::new(
        source(Domain::A, n_a, side, Order::shuffled(seed)),
        source(Domain::B, n_b, side, Order::shuffled(seed + 1)),
    )
    .unwrap()
}

fn held_out(side: usize) -> SourcePair {
    SourcePair::new(
        source(Domain::A, 1, side, Order::Stable),
        source(Domain::B, 1, side, Order::Stable),
    )
    .unwrap()
}

fn small_config() -> TrainConfig {
    TrainConfig {
        train_epoch: 3,
        decay_epoch: 1,
        pool_capacity: 2,
        eval_interval: 2,
        ..TrainConfig::default()
    }
}

#[derive(Default)]
struct RecordingSink {
    calls: Vec<(EvalSplit, usize)>,
}

impl EvaluationSink for RecordingSink {
    fn evaluate(
        &mut self,
        split: EvalSplit,
        epoch: usize,
        sources: &mut SourcePair,
        g_a: &dyn ImageModel,
        _g_b: &dyn ImageModel,
    ) -> Result<(), CycleError> {
        for batch in Batches::new(sources.a_mut()) {
            g_a.forward(&batch?)?;
        }
        self.calls.push((split, epoch));
        Ok(())
    }
}

#[derive(Default)]
struct RecordingStore {
    saved: Vec<(String, usize)>,
}

impl Persistence for RecordingStore {
    fn persist(
        &mut self,
        tag: &str,
        _models: &CycleModels,
        history: &TrainHistory,
    ) -> Result<(), CycleError> {
        self.saved.push((tag.to_string(), history.epochs_completed()));
        Ok(())
    }
}

#[test]
fn full_run_records_history_and_persists() {
    let mut trainer = CycleTrainer::new(small_config(), scale_models(0.9)).unwrap();
    let mut train = pair(3, 2, 4, 0);
    let mut test = held_out(4);
    let mut sink = RecordingSink::default();
    let mut store = RecordingStore::default();

    let history = trainer
        .run(&mut train, &mut test, &mut sink, &mut store, &CancelToken::new())
        .unwrap();

    assert_eq!(history.epochs_completed(), 3);
    assert!(history.epochs.iter().all(|s| s.iterations == 2));
    assert_eq!(history.per_epoch_ptimes.len(), 3);
    assert!(history.total_time >= 0.0);
    for kind in LossKind::ALL {
        assert_eq!(history.series(kind).len(), 3);
        assert!(history.series(kind).iter().all(|v| v.is_finite()));
        assert_eq!(history.per_iteration.get(kind).len(), 6);
    }

    assert_eq!(
        sink.calls,
        vec![(EvalSplit::Train, 1), (EvalSplit::HeldOut, 2), (EvalSplit::Train, 3)]
    );
    assert_eq!(store.saved, vec![("final".to_string(), 3)]);
    assert!(trainer.learning_rates().generator.abs() < 1e-12);
    assert_eq!(trainer.pool(Domain::A).len(), 2);
}

#[test]
fn cycle_shorter_walks_longer_source() {
    let config = TrainConfig {
        train_epoch: 2,
        pairing: PairingPolicy::CycleShorter,
        ..small_config()
    };
    let mut trainer = CycleTrainer::new(config, scale_models(0.9)).unwrap();
    let mut train = pair(3, 2, 4, 5);
    let summary = trainer
        .train_epoch(0, &mut train, &CancelToken::new())
        .unwrap();
    assert_eq!(summary.iterations, 3);
    assert_eq!(summary.epoch, 1);
}

#[test]
fn cancellation_saves_postmortem() {
    let mut trainer = CycleTrainer::new(small_config(), scale_models(0.9)).unwrap();
    let mut store = RecordingStore::default();
    let token = CancelToken::new();
    token.cancel();

    let err = trainer
        .run(&mut pair(2, 2, 4, 1), &mut held_out(4), &mut RecordingSink::default(), &mut store, &token)
        .unwrap_err();
    assert!(matches!(err, CycleError::Cancelled { epoch: 1, iteration: 0 }));
    assert_eq!(store.saved, vec![("postmortem".to_string(), 0)]);
}

#[test]
fn postmortem_can_be_disabled() {
    let config = TrainConfig {
        save_on_failure: false,
        ..small_config()
    };
    let mut trainer = CycleTrainer::new(config, scale_models(0.9)).unwrap();
    let mut store = RecordingStore::default();
    let token = CancelToken::new();
    token.cancel();
    assert!(trainer
        .run(&mut pair(2, 2, 4, 1), &mut held_out(4), &mut RecordingSink::default(), &mut store, &token)
        .is_err());
    assert!(store.saved.is_empty());
}

#[test]
fn non_finite_loss_is_divergence() {
    let mut trainer = CycleTrainer::new(small_config(), scale_models(f64::NAN)).unwrap();
    let mut store = RecordingStore::default();
    let err = trainer
        .run(
            &mut pair(2, 2, 4, 2),
            &mut held_out(4),
            &mut RecordingSink::default(),
            &mut store,
            &CancelToken::new(),
        )
        .unwrap_err();
    match err {
        CycleError::Divergence { loss, epoch, iteration, value } => {
            assert_eq!(loss, "G_A_losses");
            assert_eq!((epoch, iteration), (1, 0));
            assert!(value.is_nan());
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(store.saved.len(), 1);
}

#[test]
fn empty_source_is_fatal_without_postmortem() {
    let mut trainer = CycleTrainer::new(small_config(), scale_models(0.9)).unwrap();
    let mut store = RecordingStore::default();
    let err = trainer
        .run(
            &mut pair(0, 2, 4, 3),
            &mut held_out(4),
            &mut RecordingSink::default(),
            &mut store,
            &CancelToken::new(),
        )
        .unwrap_err();
    assert!(matches!(err, CycleError::EmptySource { domain: Domain::A }));
    assert!(store.saved.is_empty());
}

#[test]
fn real_networks_write_samples_and_checkpoints() {
    let tmp = tempfile::tempdir().unwrap();
    let net = NetConfig {
        ngf: 2,
        ndf: 2,
        n_blocks: 1,
        n_layers_d: 1,
        ..NetConfig::default()
    };
    let config = TrainConfig {
        train_epoch: 1,
        decay_epoch: 0,
        eval_interval: 1,
        ..TrainConfig::default()
    };
    let models = CycleModels::build(&net, 16, 11, &Device::Cpu).unwrap();
    let mut trainer = CycleTrainer::new(config.clone(), models).unwrap();
    let mut sink = SampleWriter::new(tmp.path().join("samples"), 1);
    let mut store = SafetensorsStore::new(tmp.path().join("run"))
        .with_manifest(&config)
        .unwrap();

    trainer
        .run(&mut pair(2, 2, 16, 9), &mut held_out(16), &mut sink, &mut store, &CancelToken::new())
        .unwrap();

    let epoch_dir = tmp.path().join("samples/test_results/epoch_001");
    assert!(epoch_dir.join("AtoB_000.png").is_file());
    assert!(epoch_dir.join("BtoA_000.png").is_file());
    assert!(!epoch_dir.join("AtoB_001.png").exists());

    let final_dir = tmp.path().join("run/final");
    assert!(final_dir.join("generatorA_param.safetensors").is_file());
    assert!(final_dir.join("discriminatorB_param.safetensors").is_file());
    assert!(final_dir.join("train_hist.png").is_file());
    let hist: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(final_dir.join("train_hist.json")).unwrap())
            .unwrap();
    assert_eq!(hist["D_A_losses"].as_array().map(Vec::len), Some(1));
    let manifest: TrainConfig =
        serde_json::from_str(&std::fs::read_to_string(final_dir.join("config.json")).unwrap())
            .unwrap();
    assert_eq!(manifest, config);
}
