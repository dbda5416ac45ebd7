//! Transplant checkpoint weights into a model with a different projection scheme.
//!
//! The bond network's first layer has one row per reduced bond type, the onsite
//! networks have one column (`uniform`, `split`) or one row (`strain`) per
//! onsite type. When the orbital scheme changes between training runs, the
//! shapes change and rows move. [`load_paras`] builds freshly initialised
//! tensors for the new scheme and copies every row or column whose type key
//! exists in both schemes. Anything the checkpoint does not have starts from
//! $\mathcal N(0,1)\cdot\varepsilon$ with $\varepsilon = 10^{-5}$.
use crate::config::{ModelConfig, OnsiteMode};
use crate::error::{Result, TbError};
use crate::index_mapping::{IndexMapping, OnsiteIndex, OnsiteScheme, StrainIndex};
use crate::skint_types::{ReducedTypes, all_onsite_intgrl_types, all_skint_types};
use indexmap::IndexMap;
use ndarray::Array2;
use rand::Rng;
use rand_distr::StandardNormal;
use std::collections::BTreeMap;

/// Scale of freshly initialised weights.
pub const EPS: f64 = 1e-5;

/// Parameter name -> weight tensor.
pub type StateDict = BTreeMap<String, Array2<f64>>;

pub const BOND_LAYER1: &str = "bond_net.layer1";
pub const BOND_LAYER2: &str = "bond_net.layer2";
pub const STRAIN_LAYER1: &str = "onsite_net.layer1";
pub const STRAIN_LAYER2: &str = "onsite_net.layer2";

/// Parameter name of a per-species onsite layer, e.g. `onsite_net.N.layer2`.
pub fn onsite_layer(species: &str, layer: usize) -> String {
    format!("onsite_net.{}.layer{}", species, layer)
}

/// Standard normal samples scaled by [`EPS`].
pub fn scaled_randn<R: Rng + ?Sized>(shape: (usize, usize), rng: &mut R) -> Array2<f64> {
    Array2::from_shape_simple_fn(shape, || rng.sample::<f64, _>(StandardNormal) * EPS)
}

/// Transplant `state_dict` into the scheme `proj_atom_anglr_m` with onsite mode
/// `onsitemode`.
///
/// `model_config` is the configuration the checkpoint was trained with: its
/// `proj_atom_anglr_m` and `onsitemode` describe the layout of `state_dict`.
/// On success the state dict holds tensors shaped for the new scheme and the
/// returned configuration records the new projection, reduced bond types and
/// onsite counts. Its `onsitemode` is the checkpoint's.
///
/// # Errors
/// * `TbError::UnknownOnsiteMode` for a mode outside `none`, `uniform`, `split`, `strain`.
/// * `TbError::ShapeMismatch` when a checkpoint tensor contradicts its own configuration.
/// * `TbError::InvalidConfiguration` when `strain` is requested and the bond network's
///   output width is unknown.
///
/// The state dict is untouched whenever an error is returned.
pub fn load_paras<R: Rng + ?Sized>(
    model_config: &ModelConfig,
    state_dict: &mut StateDict,
    proj_atom_anglr_m: &IndexMap<String, Vec<String>>,
    onsitemode: &str,
    rng: &mut R,
) -> Result<ModelConfig> {
    let mode: OnsiteMode = onsitemode.parse()?;
    load_paras_with_mode(model_config, state_dict, proj_atom_anglr_m, mode, rng)
}

/// [`load_paras`] with an already parsed onsite mode.
pub fn load_paras_with_mode<R: Rng + ?Sized>(
    model_config: &ModelConfig,
    state_dict: &mut StateDict,
    proj_atom_anglr_m: &IndexMap<String, Vec<String>>,
    onsitemode: OnsiteMode,
    rng: &mut R,
) -> Result<ModelConfig> {
    let target = IndexMapping::new(proj_atom_anglr_m)?;
    let ckpt = IndexMapping::new(&model_config.proj_atom_anglr_m)?;
    let target_types = all_skint_types(&target.bond_index_map().0)?;
    let ckpt_types = all_skint_types(&ckpt.bond_index_map().0)?;

    let mut staged = StateDict::new();
    let layer1 = transplant_bond_net(model_config, state_dict, &target_types, &ckpt_types, rng)?;
    staged.insert(BOND_LAYER1.to_string(), layer1);

    let scheme = target.onsite_scheme(onsitemode, &model_config.atomtype)?;
    let ckpt_mode = model_config.onsitemode;
    match &scheme {
        OnsiteScheme::None => {}
        OnsiteScheme::Uniform(index) | OnsiteScheme::Split(index) => {
            let ckpt_index = (ckpt_mode == onsitemode).then(|| ckpt.onsite_index(ckpt_mode));
            if ckpt_index.is_none() {
                log::warn!(
                    "checkpoint onsite mode '{}' differs from '{}', onsite weights start fresh",
                    ckpt_mode,
                    onsitemode
                );
            }
            transplant_onsite_net(
                model_config,
                state_dict,
                index,
                ckpt_index.as_ref(),
                &mut staged,
                rng,
            )?;
        }
        OnsiteScheme::Strain(index) => {
            let ckpt_index = if ckpt_mode == OnsiteMode::Strain {
                Some(ckpt.onsite_strain_index(&model_config.atomtype)?)
            } else {
                log::warn!(
                    "checkpoint onsite mode '{}' has no strain weights, onsite network starts fresh",
                    ckpt_mode
                );
                None
            };
            transplant_strain_net(
                model_config,
                state_dict,
                index,
                ckpt_index.as_ref(),
                &mut staged,
                rng,
            )?;
        }
    }

    log::info!(
        "transplanted {} tensors into a scheme of {} reduced bond types (onsite mode '{}')",
        staged.len(),
        target_types.len(),
        onsitemode
    );
    state_dict.extend(staged);

    let mut updated = model_config.clone();
    updated.proj_atom_anglr_m = proj_atom_anglr_m.clone();
    updated.skint_types = Some(target_types.reduced);
    updated.onsite_num = Some(target.onsite_index(onsitemode).num);
    Ok(updated)
}

fn check_shape(context: &str, found: &Array2<f64>, expected: (usize, usize)) -> Result<()> {
    if found.dim() != expected {
        return Err(TbError::ShapeMismatch {
            context: context.to_string(),
            expected: vec![expected.0, expected.1],
            found: found.shape().to_vec(),
        });
    }
    Ok(())
}

/// Copy every row of `old` whose reduced type also exists in `target`.
/// Returns the number of rows copied.
fn copy_rows(new: &mut Array2<f64>, target: &ReducedTypes, old: &Array2<f64>, ckpt: &ReducedTypes) -> usize {
    let mut copied = 0;
    for (row, key) in target.reduced.iter().enumerate() {
        if let Some(src) = ckpt.position(key) {
            new.row_mut(row).assign(&old.row(src));
            copied += 1;
        }
    }
    copied
}

fn transplant_bond_net<R: Rng + ?Sized>(
    model_config: &ModelConfig,
    state_dict: &StateDict,
    target_types: &ReducedTypes,
    ckpt_types: &ReducedTypes,
    rng: &mut R,
) -> Result<Array2<f64>> {
    let nhidden = model_config.sknetwork.sk_hop_nhidden;
    let mut layer1 = scaled_randn((target_types.len(), nhidden), rng);
    match state_dict.get(BOND_LAYER1) {
        Some(old) => {
            check_shape(BOND_LAYER1, old, (ckpt_types.len(), nhidden))?;
            let copied = copy_rows(&mut layer1, target_types, old, ckpt_types);
            log::info!(
                "{}: {} of {} bond types taken from the checkpoint",
                BOND_LAYER1,
                copied,
                target_types.len()
            );
        }
        None => log::warn!("checkpoint has no {}, bond network starts fresh", BOND_LAYER1),
    }
    Ok(layer1)
}

fn transplant_onsite_net<R: Rng + ?Sized>(
    model_config: &ModelConfig,
    state_dict: &StateDict,
    index: &OnsiteIndex,
    ckpt_index: Option<&OnsiteIndex>,
    staged: &mut StateDict,
    rng: &mut R,
) -> Result<()> {
    let nhidden = model_config.sknetwork.sk_onsite_nhidden;
    for (species, &num) in index.num.iter() {
        let name1 = onsite_layer(species, 1);
        let name2 = onsite_layer(species, 2);
        let mut layer1 = scaled_randn((1, nhidden), rng);
        let mut layer2 = scaled_randn((nhidden, num), rng);
        if let Some(ckpt_index) = ckpt_index {
            match state_dict.get(&name2) {
                Some(old) => {
                    if old.nrows() != nhidden {
                        return Err(TbError::ShapeMismatch {
                            context: name2,
                            expected: vec![nhidden, old.ncols()],
                            found: old.shape().to_vec(),
                        });
                    }
                    let orbs = &index.index_map[species];
                    if let Some(ckpt_orbs) = ckpt_index.index_map.get(species) {
                        for (orb, cols) in orbs.iter() {
                            let Some(src) = ckpt_orbs.get(orb) else {
                                continue;
                            };
                            for (&c, &sc) in cols.iter().zip(src.iter()) {
                                if sc >= old.ncols() {
                                    return Err(TbError::ShapeMismatch {
                                        context: name2,
                                        expected: vec![nhidden, ckpt_index.num[species]],
                                        found: old.shape().to_vec(),
                                    });
                                }
                                layer2.column_mut(c).assign(&old.column(sc));
                            }
                        }
                    }
                }
                None => log::warn!("checkpoint has no {}, it starts fresh", name2),
            }
            if let Some(old) = state_dict.get(&name1) {
                check_shape(&name1, old, (1, nhidden))?;
                layer1.assign(old);
            }
        }
        staged.insert(name1, layer1);
        staged.insert(name2, layer2);
    }
    Ok(())
}

/// Output width of the bond network, which the strain network shares.
fn bond_net_nout(model_config: &ModelConfig, state_dict: &StateDict) -> Result<usize> {
    if let Some(layer2) = state_dict.get(BOND_LAYER2) {
        return Ok(layer2.ncols());
    }
    model_config.sknetwork.sk_hop_nout.ok_or_else(|| {
        TbError::InvalidConfiguration(format!(
            "strain onsite mode needs the bond network output width: no {} in the checkpoint and no sk_hop_nout",
            BOND_LAYER2
        ))
    })
}

fn transplant_strain_net<R: Rng + ?Sized>(
    model_config: &ModelConfig,
    state_dict: &StateDict,
    index: &StrainIndex,
    ckpt_index: Option<&StrainIndex>,
    staged: &mut StateDict,
    rng: &mut R,
) -> Result<()> {
    let nhidden = model_config.sknetwork.sk_onsite_nhidden;
    let nhop_out = bond_net_nout(model_config, state_dict)?;
    let target_types = all_onsite_intgrl_types(&index.index_map)?;
    let mut layer1 = scaled_randn((target_types.len(), nhidden), rng);
    let mut layer2 = scaled_randn((nhidden, nhop_out), rng);
    if let Some(ckpt_index) = ckpt_index {
        let ckpt_types = all_onsite_intgrl_types(&ckpt_index.index_map)?;
        match state_dict.get(STRAIN_LAYER1) {
            Some(old) => {
                check_shape(STRAIN_LAYER1, old, (ckpt_types.len(), nhidden))?;
                let copied = copy_rows(&mut layer1, &target_types, old, &ckpt_types);
                log::info!(
                    "{}: {} of {} onsite types taken from the checkpoint",
                    STRAIN_LAYER1,
                    copied,
                    target_types.len()
                );
            }
            None => log::warn!("checkpoint has no {}, it starts fresh", STRAIN_LAYER1),
        }
        if let Some(old) = state_dict.get(STRAIN_LAYER2) {
            check_shape(STRAIN_LAYER2, old, (nhidden, nhop_out))?;
            layer2.assign(old);
        }
    }
    staged.insert(STRAIN_LAYER1.to_string(), layer1);
    staged.insert(STRAIN_LAYER2.to_string(), layer2);
    Ok(())
}
