//! Periodic qualitative evaluation.

use std::path::{Path, PathBuf};

use candle_core::Tensor;
use cycle_core::CycleError;
use cycle_data::image_io::save_image;
use cycle_data::{BatchSource, Batches, SourcePair};
use cycle_nets::ImageModel;

/// Which split an evaluation pass reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvalSplit {
    /// Held-out (test) sources.
    HeldOut,
    /// Training sources.
    Train,
}

impl EvalSplit {
    /// Split for 0-based `epoch_index`: every `interval`-th epoch is held-out,
    /// every other epoch samples the training set.
    ///
    /// ```
    /// use cycle_train::EvalSplit;
    ///
    /// assert_eq!(EvalSplit::for_epoch(9, 10), EvalSplit::HeldOut);
    /// assert_eq!(EvalSplit::for_epoch(10, 10), EvalSplit::Train);
    /// ```
    pub fn for_epoch(epoch_index: usize, interval: usize) -> Self {
        if interval > 0 && (epoch_index + 1) % interval == 0 {
            Self::HeldOut
        } else {
            Self::Train
        }
    }

    /// Directory name for written artifacts.
    pub fn label(&self) -> &'static str {
        match self {
            Self::HeldOut => "test_results",
            Self::Train => "train_results",
        }
    }
}

/// Side-effecting hook run after every epoch. The loop only propagates
/// its errors.
pub trait EvaluationSink {
    /// Produces artifacts for 1-based `epoch` from `sources` using the two
    /// generators.
    fn evaluate(
        &mut self,
        split: EvalSplit,
        epoch: usize,
        sources: &mut SourcePair,
        g_a: &dyn ImageModel,
        g_b: &dyn ImageModel,
    ) -> Result<(), CycleError>;
}

/// Sink that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl EvaluationSink for NoopSink {
    fn evaluate(
        &mut self,
        _split: EvalSplit,
        _epoch: usize,
        _sources: &mut SourcePair,
        _g_a: &dyn ImageModel,
        _g_b: &dyn ImageModel,
    ) -> Result<(), CycleError> {
        Ok(())
    }
}

/// Writes `input | translated | reconstructed` PNG strips to
/// `<root>/<split>/epoch_NNN/{AtoB,BtoA}_III.png`.
///
/// Batches are pulled from the sources only until `max_images` strips per
/// direction are written.
#[derive(Debug, Clone)]
pub struct SampleWriter {
    root: PathBuf,
    max_images: usize,
}

impl SampleWriter {
    /// Writes at most `max_images` strips per direction per pass.
    pub fn new(root: impl Into<PathBuf>, max_images: usize) -> Self {
        Self {
            root: root.into(),
            max_images,
        }
    }

    /// Output root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory one pass writes into.
    pub fn epoch_dir(&self, split: EvalSplit, epoch: usize) -> PathBuf {
        self.root.join(split.label()).join(format!("epoch_{epoch:03}"))
    }

    fn write_direction(
        &self,
        dir: &Path,
        source: &mut dyn BatchSource,
        forward: &dyn ImageModel,
        backward: &dyn ImageModel,
    ) -> Result<usize, CycleError> {
        let map_err = |e: candle_core::Error| CycleError::Tensor {
            message: format!("SampleWriter write_direction: {e}"),
        };
        let from = source.domain();
        let prefix = format!("{from}to{}", from.other());
        let mut written = 0;
        if self.max_images == 0 {
            return Ok(written);
        }
        for batch in Batches::new(source) {
            let batch = batch?;
            let translated = forward.forward(&batch)?.detach();
            let reconstructed = backward.forward(&translated)?.detach();
            let strip = Tensor::cat(&[&batch, &translated, &reconstructed], 3).map_err(map_err)?;
            let n = strip.dim(0).map_err(map_err)?;
            for i in 0..n {
                if written >= self.max_images {
                    break;
                }
                let image = strip.get(i).map_err(map_err)?;
                save_image(&image, &dir.join(format!("{prefix}_{written:03}.png")))?;
                written += 1;
            }
            if written >= self.max_images {
                break;
            }
        }
        Ok(written)
    }
}

impl EvaluationSink for SampleWriter {
    fn evaluate(
        &mut self,
        split: EvalSplit,
        epoch: usize,
        sources: &mut SourcePair,
        g_a: &dyn ImageModel,
        g_b: &dyn ImageModel,
    ) -> Result<(), CycleError> {
        let dir = self.epoch_dir(split, epoch);
        let (source_a, source_b) = sources.both_mut();
        let a_to_b = self.write_direction(&dir, source_a, g_a, g_b)?;
        let b_to_a = self.write_direction(&dir, source_b, g_b, g_a)?;
        tracing::info!(
            split = split.label(),
            epoch,
            a_to_b,
            b_to_a,
            dir = %dir.display(),
            "wrote evaluation samples"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    use candle_core::Device;
    use cycle_core::Domain;
    use cycle_data::{InMemorySource, Order};
    use cycle_nets::NetConfig;

    use crate::models::CycleModels;

    /// Counts how many batches were pulled from the wrapped source.
    struct Counting {
        inner: InMemorySource,
        pulled: Rc<Cell<usize>>,
    }

    impl BatchSource for Counting {
        fn domain(&self) -> Domain {
            self.inner.domain()
        }

        fn num_batches(&self) -> usize {
            self.inner.num_batches()
        }

        fn rewind(&mut self) {
            self.inner.rewind();
        }

        fn next_batch(&mut self) -> Option<Result<Tensor, CycleError>> {
            self.pulled.set(self.pulled.get() + 1);
            self.inner.next_batch()
        }
    }

    fn counting(domain: Domain, pulled: &Rc<Cell<usize>>) -> Box<Counting> {
        let images = (0..6)
            .map(|_| Tensor::rand(-1f32, 1.0, (3, 16, 16), &Device::Cpu).unwrap())
            .collect();
        Box::new(Counting {
            inner: InMemorySource::new(domain, images, 1, Order::Stable).unwrap(),
            pulled: Rc::clone(pulled),
        })
    }

    #[test]
    fn stops_pulling_after_max_images() {
        let tmp = tempfile::tempdir().unwrap();
        let net = NetConfig {
            ngf: 2,
            ndf: 2,
            n_blocks: 1,
            n_layers_d: 1,
            ..NetConfig::default()
        };
        let models = CycleModels::build(&net, 16, 3, &Device::Cpu).unwrap();
        let pulled_a = Rc::new(Cell::new(0));
        let pulled_b = Rc::new(Cell::new(0));
        let mut pair = SourcePair::new(counting(Domain::A, &pulled_a), counting(Domain::B, &pulled_b)).unwrap();

        let mut writer = SampleWriter::new(tmp.path(), 2);
        writer
            .evaluate(EvalSplit::Train, 1, &mut pair, models.g_a.as_ref(), models.g_b.as_ref())
            .unwrap();

        assert_eq!((pulled_a.get(), pulled_b.get()), (2, 2));
        let dir = writer.epoch_dir(EvalSplit::Train, 1);
        assert!(dir.join("AtoB_001.png").is_file());
        assert!(dir.join("BtoA_001.png").is_file());
        assert!(!dir.join("AtoB_002.png").exists());
    }

    #[test]
    fn every_tenth_epoch_is_held_out() {
        let held: Vec<usize> = (0..30)
            .filter(|&e| EvalSplit::for_epoch(e, 10) == EvalSplit::HeldOut)
            .collect();
        assert_eq!(held, vec![9, 19, 29]);
        assert_eq!(EvalSplit::for_epoch(0, 1), EvalSplit::HeldOut);
    }

    #[test]
    fn epoch_dir_layout() {
        let writer = SampleWriter::new("/tmp/run", 4);
        assert_eq!(
            writer.epoch_dir(EvalSplit::Train, 7),
            PathBuf::from("/tmp/run/train_results/epoch_007")
        );
    }
}
