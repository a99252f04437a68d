//! The adversarial training loop.
//!
//! ## Iteration order
//!
//! 1. Generator pass: both translations, both reconstructions and both
//!    frozen discriminators produce `G_total`; backward; step only the
//!    generator-pair optimizer.
//! 2. `D_A`: real B vs `pool_b.insert(fake_b.detach())`; backward; step `D_A`.
//! 3. `D_B`: real A vs `pool_a.insert(fake_a.detach())`; backward; step `D_B`.
//! 4. Record the six losses.
//!
//! candle builds a fresh gradient store for every backward pass and each
//! optimizer owns only its own variables, so a step never touches another
//! network's parameters.

use std::time::Instant;

use candle_core::{Tensor, Var};
use candle_nn::{AdamW, Optimizer, ParamsAdamW};
use cycle_core::{CycleError, Domain, TrainConfig};
use cycle_data::{for_each_pair, SourcePair};
use cycle_pool::{ImagePool, RandomReplay, ReplaySource};
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::eval::{EvalSplit, EvaluationSink};
use crate::loss::{discriminator_loss, generator_losses, CycleWeights};
use crate::metrics::{EpochMeter, EpochSummary, LossKind, LossRecord, TrainHistory};
use crate::models::CycleModels;
use crate::persist::Persistence;
use crate::schedule::LinearDecay;

/// Current learning rate of each optimizer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LearningRates {
    /// Generator pair.
    pub generator: f64,
    /// Discriminator A.
    pub disc_a: f64,
    /// Discriminator B.
    pub disc_b: f64,
}

/// Scalar generator losses plus the detached fakes the discriminator
/// steps consume.
#[derive(Debug, Clone)]
pub struct GeneratorStep {
    /// `MSE(D_A(fake_b), 1)`.
    pub g_a: f32,
    /// `MSE(D_B(fake_a), 1)`.
    pub g_b: f32,
    /// Weighted A cycle loss.
    pub a_cycle: f32,
    /// Weighted B cycle loss.
    pub b_cycle: f32,
    /// Detached `G_B(real_b)`.
    pub fake_a: Tensor,
    /// Detached `G_A(real_a)`.
    pub fake_b: Tensor,
}

/// Owns the four networks, three optimizers, two history buffers and the
/// loss history of one run.
///
/// `S` drives the history buffers' replay decisions; [`CycleTrainer::new`]
/// uses seeded [`RandomReplay`] sources.
///
/// # Example
///
/// ```no_run
/// use candle_core::Device;
/// use cycle_core::TrainConfig;
/// use cycle_nets::NetConfig;
/// use cycle_train::{CycleModels, CycleTrainer};
///
/// let config = TrainConfig::default();
/// let models = CycleModels::build(&NetConfig::default(), 256, config.seed, &Device::Cpu).unwrap();
/// let trainer = CycleTrainer::new(config, models).unwrap();
/// assert_eq!(trainer.learning_rates().generator, 2e-4);
/// ```
pub struct CycleTrainer<S: ReplaySource = RandomReplay> {
    config: TrainConfig,
    models: CycleModels,
    opt_g: AdamW,
    opt_d_a: AdamW,
    opt_d_b: AdamW,
    decay_g: LinearDecay,
    decay_d: LinearDecay,
    /// Generated A-domain samples (G_B output), replayed to D_B.
    pool_a: ImagePool<Tensor, S>,
    /// Generated B-domain samples (G_A output), replayed to D_A.
    pool_b: ImagePool<Tensor, S>,
    history: TrainHistory,
    epoch: usize,
    iteration: usize,
}

impl<S: ReplaySource> std::fmt::Debug for CycleTrainer<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "CycleTrainer({:?}, epoch={}/{}, lr_g={:.2e})",
            self.models,
            self.epoch,
            self.config.train_epoch,
            self.opt_g.learning_rate()
        )
    }
}

impl CycleTrainer {
    /// Validates `config` and sets up optimizers and history buffers seeded
    /// from `config.seed`.
    ///
    /// # Errors
    ///
    /// Returns [`CycleError::InvalidConfig`] if `config` is invalid and
    /// [`CycleError::Tensor`] if an optimizer cannot be built.
    pub fn new(config: TrainConfig, models: CycleModels) -> Result<Self, CycleError> {
        let replay_a = RandomReplay::seeded(config.seed);
        let replay_b = RandomReplay::seeded(config.seed.wrapping_add(1));
        Self::with_replay(config, models, replay_a, replay_b)
    }
}

impl<S: ReplaySource> CycleTrainer<S> {
    /// Like [`CycleTrainer::new`], with explicit replay sources for the A and
    /// B history buffers.
    ///
    /// # Errors
    ///
    /// Same as [`CycleTrainer::new`].
    pub fn with_replay(
        config: TrainConfig,
        models: CycleModels,
        replay_a: S,
        replay_b: S,
    ) -> Result<Self, CycleError> {
        config.validate()?;

        let adam = |vars: Vec<Var>, lr: f64| {
            AdamW::new(
                vars,
                ParamsAdamW {
                    lr,
                    beta1: config.beta1,
                    beta2: config.beta2,
                    weight_decay: 0.0,
                    ..Default::default()
                },
            )
            .map_err(|e| CycleError::Tensor {
                message: format!("CycleTrainer new: {e}"),
            })
        };

        let mut g_vars = models.g_a.vars();
        g_vars.extend(models.g_b.vars());
        let opt_g = adam(g_vars, config.lr_g)?;
        let opt_d_a = adam(models.d_a.vars(), config.lr_d)?;
        let opt_d_b = adam(models.d_b.vars(), config.lr_d)?;

        let decay_g = LinearDecay::new(config.lr_g, config.decay_epoch, config.train_epoch)?;
        let decay_d = LinearDecay::new(config.lr_d, config.decay_epoch, config.train_epoch)?;

        let pool_a = ImagePool::with_source(config.pool_capacity, replay_a)?;
        let pool_b = ImagePool::with_source(config.pool_capacity, replay_b)?;

        Ok(Self {
            config,
            models,
            opt_g,
            opt_d_a,
            opt_d_b,
            decay_g,
            decay_d,
            pool_a,
            pool_b,
            history: TrainHistory::new(),
            epoch: 0,
            iteration: 0,
        })
    }

    /// Run configuration.
    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    /// The four networks.
    pub fn models(&self) -> &CycleModels {
        &self.models
    }

    /// Consumes the trainer, returning the networks.
    pub fn into_models(self) -> CycleModels {
        self.models
    }

    /// Loss history so far.
    pub fn history(&self) -> &TrainHistory {
        &self.history
    }

    /// History buffer for `domain`.
    pub fn pool(&self, domain: Domain) -> &ImagePool<Tensor, S> {
        match domain {
            Domain::A => &self.pool_a,
            Domain::B => &self.pool_b,
        }
    }

    /// Current learning rates.
    pub fn learning_rates(&self) -> LearningRates {
        LearningRates {
            generator: self.opt_g.learning_rate(),
            disc_a: self.opt_d_a.learning_rate(),
            disc_b: self.opt_d_b.learning_rate(),
        }
    }

    fn weights(&self) -> CycleWeights {
        CycleWeights {
            lambda_a: self.config.lambda_a,
            lambda_b: self.config.lambda_b,
        }
    }

    fn divergence(&self, kind: LossKind, value: f32) -> CycleError {
        CycleError::Divergence {
            loss: kind.key().to_string(),
            epoch: self.epoch,
            iteration: self.iteration,
            value,
        }
    }

    /// Epoch-boundary hook for 0-based `epoch_index`: applies the linear
    /// decay to all three optimizers. Returns whether any rate changed.
    pub fn begin_epoch(&mut self, epoch_index: usize) -> bool {
        self.epoch = epoch_index + 1;
        self.iteration = 0;

        let before = self.learning_rates();
        let lr_g = self.decay_g.advance(epoch_index, before.generator);
        let lr_d_a = self.decay_d.advance(epoch_index, before.disc_a);
        let lr_d_b = self.decay_d.advance(epoch_index, before.disc_b);
        self.opt_g.set_learning_rate(lr_g);
        self.opt_d_a.set_learning_rate(lr_d_a);
        self.opt_d_b.set_learning_rate(lr_d_b);

        let decayed = self.learning_rates() != before;
        if decayed {
            debug!(epoch = self.epoch, lr_g, lr_d_a, lr_d_b, "learning rates decayed");
        }
        decayed
    }

    /// Generator-pair update on one paired batch.
    ///
    /// Discriminator variables take part in the forward pass but are not
    /// owned by the generator optimizer, so they are left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`CycleError::Divergence`] without stepping if a loss is not
    /// finite.
    pub fn generator_step(&mut self, real_a: &Tensor, real_b: &Tensor) -> Result<GeneratorStep, CycleError> {
        let losses = generator_losses(&self.models, real_a, real_b, self.weights())?;
        let [g_a, g_b, a_cycle, b_cycle] = losses.scalars()?;
        for (kind, value) in [
            (LossKind::GA, g_a),
            (LossKind::GB, g_b),
            (LossKind::ACycle, a_cycle),
            (LossKind::BCycle, b_cycle),
        ] {
            if !value.is_finite() {
                return Err(self.divergence(kind, value));
            }
        }

        self.opt_g
            .backward_step(&losses.total)
            .map_err(|e| CycleError::Tensor {
                message: format!("generator_step: {e}"),
            })?;

        Ok(GeneratorStep {
            g_a,
            g_b,
            a_cycle,
            b_cycle,
            fake_a: losses.fake_a.detach(),
            fake_b: losses.fake_b.detach(),
        })
    }

    /// Update of discriminator `disc` (`Domain::A` → `D_A`, which judges
    /// B-domain images) on `real` images and freshly generated `fake` ones.
    ///
    /// `fake` passes through the matching history buffer first, so the
    /// discriminator may see an older sample instead.
    ///
    /// # Errors
    ///
    /// Returns [`CycleError::Divergence`] without stepping if the loss is not
    /// finite.
    pub fn discriminator_step(&mut self, disc: Domain, real: &Tensor, fake: &Tensor) -> Result<f32, CycleError> {
        let map_err = |e: candle_core::Error| CycleError::Tensor {
            message: format!("discriminator_step {disc}: {e}"),
        };
        let fake = fake.detach();
        let (model, pool, optimizer, kind) = match disc {
            Domain::A => (self.models.d_a.as_ref(), &mut self.pool_b, &mut self.opt_d_a, LossKind::DA),
            Domain::B => (self.models.d_b.as_ref(), &mut self.pool_a, &mut self.opt_d_b, LossKind::DB),
        };
        let replayed = pool.insert_batch(&fake)?;
        let loss = discriminator_loss(model, real, &replayed)?;
        let value = loss.to_vec0::<f32>().map_err(map_err)?;
        if !value.is_finite() {
            return Err(CycleError::Divergence {
                loss: kind.key().to_string(),
                epoch: self.epoch,
                iteration: self.iteration,
                value,
            });
        }
        optimizer.backward_step(&loss).map_err(map_err)?;
        Ok(value)
    }

    /// One full iteration on a paired batch.
    ///
    /// # Errors
    ///
    /// Returns [`CycleError::ShapeMismatch`] if the two batches differ in
    /// shape, plus any step error.
    pub fn train_step(&mut self, real_a: &Tensor, real_b: &Tensor) -> Result<LossRecord, CycleError> {
        if real_a.dims() != real_b.dims() {
            return Err(CycleError::ShapeMismatch {
                context: "paired batches",
                left: real_a.dims().to_vec(),
                right: real_b.dims().to_vec(),
            });
        }

        let gen = self.generator_step(real_a, real_b)?;
        let d_a = self.discriminator_step(Domain::A, real_b, &gen.fake_b)?;
        let d_b = self.discriminator_step(Domain::B, real_a, &gen.fake_a)?;

        let record = LossRecord {
            d_a,
            d_b,
            g_a: gen.g_a,
            g_b: gen.g_b,
            a_cycle: gen.a_cycle,
            b_cycle: gen.b_cycle,
        };
        self.iteration += 1;
        Ok(record)
    }

    /// Trains one epoch over `sources`, appends its summary to the history
    /// and returns it.
    ///
    /// Batches are pulled from `sources` one pair at a time.
    ///
    /// # Errors
    ///
    /// Returns [`CycleError::EmptySource`] if either source has no batches,
    /// [`CycleError::Cancelled`] if `cancel` is set at an iteration boundary,
    /// plus any step error.
    pub fn train_epoch(
        &mut self,
        epoch_index: usize,
        sources: &mut SourcePair,
        cancel: &CancelToken,
    ) -> Result<EpochSummary, CycleError> {
        self.begin_epoch(epoch_index);
        let mut meter = EpochMeter::new(self.epoch);

        let (batches_a, batches_b) = sources.num_batches();
        if batches_a == 0 {
            return Err(CycleError::EmptySource { domain: Domain::A });
        }
        if batches_b == 0 {
            return Err(CycleError::EmptySource { domain: Domain::B });
        }

        let pairing = self.config.pairing;
        for_each_pair(sources, pairing, |real_a, real_b| {
            if cancel.is_cancelled() {
                return Err(CycleError::Cancelled {
                    epoch: self.epoch,
                    iteration: self.iteration,
                });
            }
            let record = self.train_step(&real_a, &real_b)?;
            meter.record(&record);
            self.history.record_iteration(&record);
            Ok(())
        })?;

        let summary = meter.finish();
        self.history.push_epoch(summary.clone());
        Ok(summary)
    }

    /// Full run: `train_epoch` epochs, an evaluation pass after each, then
    /// persistence of the final state under the `final` tag.
    ///
    /// On divergence or cancellation with `save_on_failure` set, the current
    /// state is first persisted under `postmortem`.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by training, evaluation or
    /// persistence.
    pub fn run(
        &mut self,
        train: &mut SourcePair,
        held_out: &mut SourcePair,
        sink: &mut dyn EvaluationSink,
        store: &mut dyn Persistence,
        cancel: &CancelToken,
    ) -> Result<TrainHistory, CycleError> {
        let started = Instant::now();
        let total = self.config.train_epoch;
        info!(
            epochs = total,
            decay_epoch = self.config.decay_epoch,
            batches = ?train.num_batches(),
            pairing = ?self.config.pairing,
            "training start"
        );

        for epoch_index in 0..total {
            let summary = match self.train_epoch(epoch_index, train, cancel) {
                Ok(summary) => summary,
                Err(e) => return Err(self.postmortem(e, store, started)),
            };
            info!("{}", summary.log_line(total));

            let split = EvalSplit::for_epoch(epoch_index, self.config.eval_interval);
            let sources = match split {
                EvalSplit::HeldOut => &mut *held_out,
                EvalSplit::Train => &mut *train,
            };
            sink.evaluate(
                split,
                summary.epoch,
                sources,
                self.models.g_a.as_ref(),
                self.models.g_b.as_ref(),
            )?;
        }

        self.history.total_time = started.elapsed().as_secs_f64();
        info!(
            mean_epoch_secs = self.history.mean_epoch_time().unwrap_or_default(),
            total_secs = self.history.total_time,
            "training finished, saving results"
        );
        store.persist("final", &self.models, &self.history)?;
        Ok(self.history.clone())
    }

    fn postmortem(&mut self, err: CycleError, store: &mut dyn Persistence, started: Instant) -> CycleError {
        if self.config.save_on_failure && err.is_postmortem_worthy() {
            self.history.total_time = started.elapsed().as_secs_f64();
            warn!(error = %err, "run aborted, saving postmortem state");
            if let Err(save_err) = store.persist("postmortem", &self.models, &self.history) {
                warn!(error = %save_err, "postmortem save failed");
            }
        }
        err
    }
}
