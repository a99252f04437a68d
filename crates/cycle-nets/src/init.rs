//! Seeded weight initialization and parameter copying.

use std::collections::BTreeMap;

use candle_core::{Tensor, Var};
use candle_nn::VarMap;
use cycle_core::CycleError;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

fn sorted_vars(var_map: &VarMap) -> Result<Vec<(String, Var)>, CycleError> {
    let data = var_map.data().lock().map_err(|_| CycleError::Tensor {
        message: "var map lock poisoned".to_string(),
    })?;
    let mut vars: Vec<(String, Var)> = data
        .iter()
        .map(|(name, var)| (name.clone(), var.clone()))
        .collect();
    vars.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(vars)
}

/// Re-initializes every `*.weight` variable from N(0, `std`) and zeroes every
/// `*.bias`, drawing from `StdRng::seed_from_u64(seed)` in sorted name order.
///
/// # Errors
///
/// Returns [`CycleError::InvalidConfig`] for a non-positive `std` and
/// [`CycleError::Tensor`] if a variable cannot be overwritten.
pub fn normal_init(var_map: &VarMap, seed: u64, std: f64) -> Result<(), CycleError> {
    let map_err = |e: candle_core::Error| CycleError::Tensor {
        message: format!("normal_init: {e}"),
    };
    let normal = Normal::new(0.0f32, std as f32).map_err(|e| CycleError::InvalidConfig {
        field: "init_std",
        message: e.to_string(),
    })?;
    let mut rng = StdRng::seed_from_u64(seed);

    for (name, var) in sorted_vars(var_map)? {
        let dims = var.dims().to_vec();
        let values: Vec<f32> = if name.ends_with("bias") {
            vec![0.0; var.elem_count()]
        } else {
            (0..var.elem_count()).map(|_| normal.sample(&mut rng)).collect()
        };
        let tensor = Tensor::from_vec(values, dims, var.device()).map_err(map_err)?;
        var.set(&tensor).map_err(map_err)?;
    }
    Ok(())
}

/// Copies every parameter of `src` into the same-named parameter of `dst`.
///
/// # Errors
///
/// Returns [`CycleError::ShapeMismatch`] if names or shapes disagree.
pub fn copy_parameters(src: &VarMap, dst: &VarMap) -> Result<(), CycleError> {
    let map_err = |e: candle_core::Error| CycleError::Tensor {
        message: format!("copy_parameters: {e}"),
    };
    let src_vars = sorted_vars(src)?;
    let dst_vars = sorted_vars(dst)?;
    if src_vars.len() != dst_vars.len() {
        return Err(CycleError::ShapeMismatch {
            context: "copy_parameters variable count",
            left: vec![src_vars.len()],
            right: vec![dst_vars.len()],
        });
    }
    for ((src_name, src_var), (dst_name, dst_var)) in src_vars.iter().zip(dst_vars.iter()) {
        if src_name != dst_name || src_var.dims() != dst_var.dims() {
            return Err(CycleError::ShapeMismatch {
                context: "copy_parameters",
                left: src_var.dims().to_vec(),
                right: dst_var.dims().to_vec(),
            });
        }
        let copied = src_var.as_tensor().copy().map_err(map_err)?;
        dst_var.set(&copied).map_err(map_err)?;
    }
    Ok(())
}

/// Host-side copy of every parameter, keyed by variable name.
///
/// # Example
///
/// ```
/// use candle_core::Device;
/// use cycle_nets::{ImageModel, NetConfig, ParameterSnapshot, PatchDiscriminator};
///
/// let config = NetConfig { ndf: 4, n_layers_d: 1, ..NetConfig::default() };
/// let d = PatchDiscriminator::new("D_A", &config, 1, &Device::Cpu).unwrap();
/// let before = ParameterSnapshot::capture(d.var_map()).unwrap();
/// let after = ParameterSnapshot::capture(d.var_map()).unwrap();
/// assert_eq!(before.max_abs_diff(&after), Some(0.0));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSnapshot {
    values: BTreeMap<String, Vec<f32>>,
}

impl ParameterSnapshot {
    /// Copies all parameters of `var_map` to host memory.
    pub fn capture(var_map: &VarMap) -> Result<Self, CycleError> {
        let map_err = |e: candle_core::Error| CycleError::Tensor {
            message: format!("ParameterSnapshot capture: {e}"),
        };
        let mut values = BTreeMap::new();
        for (name, var) in sorted_vars(var_map)? {
            let flat = var
                .as_tensor()
                .flatten_all()
                .map_err(map_err)?
                .to_dtype(candle_core::DType::F32)
                .map_err(map_err)?
                .to_vec1::<f32>()
                .map_err(map_err)?;
            values.insert(name, flat);
        }
        Ok(Self { values })
    }

    /// Largest absolute element-wise difference, or `None` if the two
    /// snapshots do not cover the same variables and shapes.
    pub fn max_abs_diff(&self, other: &Self) -> Option<f32> {
        if self.values.len() != other.values.len() {
            return None;
        }
        let mut max = 0.0f32;
        for (name, a) in &self.values {
            let b = other.values.get(name)?;
            if a.len() != b.len() {
                return None;
            }
            for (x, y) in a.iter().zip(b) {
                max = max.max((x - y).abs());
            }
        }
        Some(max)
    }

    /// Number of captured variables.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if no variables were captured.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::{Init, VarBuilder};

    fn tiny_map(device: &Device) -> VarMap {
        let var_map = VarMap::new();
        let vb = VarBuilder::from_varmap(&var_map, DType::F32, device);
        vb.get_with_hints((4, 3), "layer.weight", Init::Const(0.0)).unwrap();
        vb.get_with_hints(4, "layer.bias", Init::Const(1.0)).unwrap();
        var_map
    }

    #[test]
    fn normal_init_is_seeded() {
        let device = Device::Cpu;
        let a = tiny_map(&device);
        let b = tiny_map(&device);
        normal_init(&a, 5, 0.02).unwrap();
        normal_init(&b, 5, 0.02).unwrap();
        let sa = ParameterSnapshot::capture(&a).unwrap();
        let sb = ParameterSnapshot::capture(&b).unwrap();
        assert_eq!(sa, sb);
        assert_eq!(sa.len(), 2);
    }

    #[test]
    fn normal_init_zeroes_bias() {
        let device = Device::Cpu;
        let map = tiny_map(&device);
        normal_init(&map, 1, 0.02).unwrap();
        let snap = ParameterSnapshot::capture(&map).unwrap();
        assert!(snap.values["layer.bias"].iter().all(|&v| v == 0.0));
        assert!(snap.values["layer.weight"].iter().any(|&v| v != 0.0));
    }

    #[test]
    fn different_seeds_differ() {
        let device = Device::Cpu;
        let a = tiny_map(&device);
        let b = tiny_map(&device);
        normal_init(&a, 1, 0.02).unwrap();
        normal_init(&b, 2, 0.02).unwrap();
        let diff = ParameterSnapshot::capture(&a)
            .unwrap()
            .max_abs_diff(&ParameterSnapshot::capture(&b).unwrap())
            .unwrap();
        assert!(diff > 0.0);
    }

    #[test]
    fn copy_parameters_matches_source() {
        let device = Device::Cpu;
        let a = tiny_map(&device);
        let b = tiny_map(&device);
        normal_init(&a, 11, 0.5).unwrap();
        copy_parameters(&a, &b).unwrap();
        let sa = ParameterSnapshot::capture(&a).unwrap();
        let sb = ParameterSnapshot::capture(&b).unwrap();
        assert_eq!(sa.max_abs_diff(&sb), Some(0.0));
    }

    #[test]
    fn copy_parameters_rejects_mismatch() {
        let device = Device::Cpu;
        let a = tiny_map(&device);
        let b = VarMap::new();
        assert!(copy_parameters(&a, &b).is_err());
    }
}
