//! # cycle-cli
//!
//! Argument parsing and wiring for the `cyclegan-train` binary.
//!
//! Expected dataset layout:
//!
//! ```text
//! <data_root>/<dataset>/<train_subfolder>A/*.png
//! <data_root>/<dataset>/<train_subfolder>B/*.png
//! <data_root>/<dataset>/<test_subfolder>A/*.png
//! <data_root>/<dataset>/<test_subfolder>B/*.png
//! ```
//!
//! Results go to `<save_root>/<dataset>_results/`.

use std::path::PathBuf;

use candle_core::Device;
use clap::Parser;
use cycle_core::{CycleError, Domain, PairingPolicy, TrainConfig};
use cycle_data::image_io::load_image_dir;
use cycle_data::{AugmentConfig, Augmenter, InMemorySource, Order, SourcePair};
use cycle_nets::NetConfig;
use cycle_train::{CancelToken, CycleModels, CycleTrainer, SafetensorsStore, SampleWriter, TrainHistory};
use serde::Serialize;

/// Train a CycleGAN on an unpaired A/B image dataset.
#[derive(Debug, Clone, Parser)]
#[command(author, version, about)]
pub struct TrainArgs {
    /// Dataset name (sub-directory of the data root)
    #[arg(long, default_value = "horse2zebra")]
    pub dataset: String,

    /// Directory holding the datasets
    #[arg(long, default_value = "data")]
    pub data_root: PathBuf,

    /// Training folder prefix; `A` and `B` are appended
    #[arg(long, default_value = "train")]
    pub train_subfolder: String,

    /// Held-out folder prefix; `A` and `B` are appended
    #[arg(long, default_value = "test")]
    pub test_subfolder: String,

    /// Image channels of both domains
    #[arg(long, default_value_t = 3)]
    pub channels: usize,

    /// Images per batch
    #[arg(long, default_value_t = 1)]
    pub batch_size: usize,

    /// Base generator filters
    #[arg(long, default_value_t = 32)]
    pub ngf: usize,

    /// Base discriminator filters
    #[arg(long, default_value_t = 64)]
    pub ndf: usize,

    /// Residual blocks in each generator
    #[arg(long = "nb", default_value_t = 9)]
    pub n_blocks: usize,

    /// Stride-2 layers in each discriminator
    #[arg(long, default_value_t = 3)]
    pub n_layers_d: usize,

    /// Side of the square training images
    #[arg(long, default_value_t = 256)]
    pub input_size: usize,

    /// Resize side before cropping; 0 disables resizing
    #[arg(long, default_value_t = 286)]
    pub resize_scale: usize,

    /// Skip the random crop back to `input_size`
    #[arg(long)]
    pub no_crop: bool,

    /// Skip random horizontal flips
    #[arg(long)]
    pub no_fliplr: bool,

    /// Total training epochs
    #[arg(long, default_value_t = 200)]
    pub train_epoch: usize,

    /// Epochs at full learning rate before linear decay
    #[arg(long, default_value_t = 100)]
    pub decay_epoch: usize,

    /// Discriminator learning rate
    #[arg(long = "lrD", default_value_t = 2e-4)]
    pub lr_d: f64,

    /// Generator learning rate
    #[arg(long = "lrG", default_value_t = 2e-4)]
    pub lr_g: f64,

    /// Weight of the A→B→A cycle loss
    #[arg(long = "lambdaA", default_value_t = 10.0)]
    pub lambda_a: f64,

    /// Weight of the B→A→B cycle loss
    #[arg(long = "lambdaB", default_value_t = 10.0)]
    pub lambda_b: f64,

    /// Adam beta1
    #[arg(long, default_value_t = 0.5)]
    pub beta1: f64,

    /// Adam beta2
    #[arg(long, default_value_t = 0.999)]
    pub beta2: f64,

    /// History buffer capacity per domain
    #[arg(long, default_value_t = 50)]
    pub pool_capacity: usize,

    /// Pairing of unequal sources: `truncate` or `cycle`
    #[arg(long, default_value = "truncate")]
    pub pairing: PairingPolicy,

    /// Held-out evaluation every N epochs (training samples otherwise)
    #[arg(long, default_value_t = 10)]
    pub eval_interval: usize,

    /// Sample strips written per direction per evaluation
    #[arg(long, default_value_t = 10)]
    pub eval_samples: usize,

    /// RNG seed for init, shuffling, augmentation and the history buffers
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Results directory
    #[arg(long, default_value = "results")]
    pub save_root: PathBuf,

    /// Do not save a postmortem snapshot when a run aborts
    #[arg(long)]
    pub no_postmortem: bool,

    /// Force CPU even when CUDA is available
    #[arg(long)]
    pub cpu: bool,
}

/// Everything needed to reproduce a run, saved as `config.json`.
#[derive(Debug, Clone, Serialize)]
pub struct RunManifest {
    /// Dataset name.
    pub dataset: String,
    /// Training side length.
    pub input_size: usize,
    /// Loop hyper-parameters.
    pub train: TrainConfig,
    /// Architecture.
    pub nets: NetConfig,
    /// Training augmentation.
    pub augment: AugmentConfig,
}

impl TrainArgs {
    /// Loop hyper-parameters.
    pub fn train_config(&self) -> TrainConfig {
        TrainConfig {
            train_epoch: self.train_epoch,
            decay_epoch: self.decay_epoch,
            batch_size: self.batch_size,
            lambda_a: self.lambda_a,
            lambda_b: self.lambda_b,
            lr_g: self.lr_g,
            lr_d: self.lr_d,
            beta1: self.beta1,
            beta2: self.beta2,
            pool_capacity: self.pool_capacity,
            eval_interval: self.eval_interval,
            pairing: self.pairing,
            seed: self.seed,
            save_on_failure: !self.no_postmortem,
        }
    }

    /// Network architecture.
    pub fn net_config(&self) -> NetConfig {
        NetConfig {
            input_nc: self.channels,
            output_nc: self.channels,
            disc_input_nc: self.channels,
            ngf: self.ngf,
            ndf: self.ndf,
            n_blocks: self.n_blocks,
            n_layers_d: self.n_layers_d,
            ..NetConfig::default()
        }
    }

    /// Training-time augmentation.
    pub fn augment_config(&self) -> AugmentConfig {
        AugmentConfig {
            resize_scale: (self.resize_scale > 0).then_some(self.resize_scale),
            crop_size: (!self.no_crop).then_some(self.input_size),
            fliplr: !self.no_fliplr,
        }
    }

    /// Folder holding one domain of one split.
    pub fn domain_dir(&self, subfolder: &str, domain: Domain) -> PathBuf {
        self.data_root
            .join(&self.dataset)
            .join(format!("{subfolder}{domain}"))
    }

    /// Output directory of this run.
    pub fn results_dir(&self) -> PathBuf {
        self.save_root.join(format!("{}_results", self.dataset))
    }

    /// Validates every configuration block before anything is loaded.
    ///
    /// # Errors
    ///
    /// Returns the first [`CycleError::InvalidConfig`] found.
    pub fn validate(&self) -> Result<(), CycleError> {
        self.train_config().validate()?;
        self.net_config().validate(self.input_size)?;
        let augment = self.augment_config();
        augment.validate(self.input_size)?;
        if augment.output_size(self.input_size) != self.input_size {
            return Err(CycleError::InvalidConfig {
                field: "resize_scale",
                message: format!(
                    "training images would be {}px but input_size is {}; keep cropping enabled or set --resize-scale 0",
                    augment.output_size(self.input_size),
                    self.input_size
                ),
            });
        }
        Ok(())
    }

    /// Requested compute device.
    ///
    /// # Errors
    ///
    /// Returns [`CycleError::Tensor`] if CUDA is present but cannot be
    /// initialized.
    pub fn device(&self) -> Result<Device, CycleError> {
        if self.cpu {
            return Ok(Device::Cpu);
        }
        Device::cuda_if_available(0).map_err(|e| CycleError::Tensor {
            message: format!("device selection: {e}"),
        })
    }
}

fn load_source(
    args: &TrainArgs,
    subfolder: &str,
    domain: Domain,
    order: Order,
    augmenter: Option<Augmenter>,
    device: &Device,
) -> Result<InMemorySource, CycleError> {
    let dir = args.domain_dir(subfolder, domain);
    let images = load_image_dir(&dir, args.channels, Some(args.input_size as u32), device)?;
    let source = InMemorySource::new(domain, images, args.batch_size, order)?;
    Ok(match augmenter {
        Some(aug) => source.with_augmenter(aug).with_drop_last(true),
        None => source,
    })
}

/// Shuffled, augmented training sources.
///
/// # Errors
///
/// Propagates folder loading failures.
pub fn load_train_split(args: &TrainArgs, device: &Device) -> Result<SourcePair, CycleError> {
    let augment = args.augment_config();
    let mut sources = Vec::with_capacity(2);
    for (offset, domain) in (0u64..).zip(Domain::ALL) {
        sources.push(load_source(
            args,
            &args.train_subfolder,
            domain,
            Order::shuffled(args.seed.wrapping_add(10 + offset)),
            Some(Augmenter::new(augment.clone(), args.seed.wrapping_add(20 + offset))),
            device,
        )?);
    }
    let b = sources.pop();
    let a = sources.pop();
    match (a, b) {
        (Some(a), Some(b)) => SourcePair::new(Box::new(a), Box::new(b)),
        _ => Err(CycleError::Data {
            message: "training split incomplete".to_string(),
        }),
    }
}

/// Stable-order, unaugmented held-out sources.
///
/// # Errors
///
/// Propagates folder loading failures.
pub fn load_test_split(args: &TrainArgs, device: &Device) -> Result<SourcePair, CycleError> {
    let a = load_source(args, &args.test_subfolder, Domain::A, Order::Stable, None, device)?;
    let b = load_source(args, &args.test_subfolder, Domain::B, Order::Stable, None, device)?;
    SourcePair::new(Box::new(a), Box::new(b))
}

/// Loads data, builds the networks and runs training to completion.
///
/// # Errors
///
/// Returns configuration errors before any data is read, then any loading,
/// training or persistence error.
pub fn run(args: &TrainArgs, cancel: &CancelToken) -> Result<TrainHistory, CycleError> {
    args.validate()?;
    let device = args.device()?;
    tracing::info!(dataset = %args.dataset, device = ?device, "preparing run");

    let mut train = load_train_split(args, &device)?;
    let mut test = load_test_split(args, &device)?;

    let net = args.net_config();
    let models = CycleModels::build(&net, args.input_size, args.seed, &device)?;

    let results = args.results_dir();
    let manifest = RunManifest {
        dataset: args.dataset.clone(),
        input_size: args.input_size,
        train: args.train_config(),
        nets: net,
        augment: args.augment_config(),
    };
    let mut store = SafetensorsStore::new(&results).with_manifest(&manifest)?;
    let mut sink = SampleWriter::new(&results, args.eval_samples);

    let mut trainer = CycleTrainer::new(args.train_config(), models)?;
    trainer.run(&mut train, &mut test, &mut sink, &mut store, cancel)
}
