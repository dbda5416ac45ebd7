//! The capability set a structure has to offer to be batched.
//!
//! A structure knows its species, can list its bonds and onsite terms, and can
//! compute (once) the neighbour environment of its projected atoms within a
//! cutoff. The environment is memoised inside the structure itself through an
//! [`EnvCache`].
use crate::atom_struct::AtomType;
use crate::error::{Result, TbError};
use indexmap::IndexMap;
use ndarray::Array2;
use std::sync::OnceLock;

/// Neighbour environment keyed by `"<center>-<neighbour>"` species pair.
///
/// Each row is `[i, j, itype, |r|, x̂, ŷ, ẑ]`: centre atom index, neighbour atom
/// index, atomic number of the centre, distance and unit vector from `i` to `j`.
pub type EnvMap = IndexMap<String, Array2<f64>>;

/// Number of columns of an environment row.
pub const ENV_COLUMNS: usize = 7;
/// Number of columns of a bond or onsite row:
/// `[i, itype, j, jtype, Rx, Ry, Rz, |r|, x̂, ŷ, ẑ]`.
pub const BOND_COLUMNS: usize = 11;

pub trait Structure {
    /// Unique species present in the structure.
    fn atom_type(&self) -> Vec<AtomType>;
    /// Unique species that carry orbital projections.
    fn proj_atom_type(&self) -> Vec<AtomType>;
    /// Whether the environment has already been computed.
    fn env_ready(&self) -> bool;
    /// Compute the environment within `env_cutoff`. Calling it again is a no-op.
    fn cal_env(&self, env_cutoff: f64) -> Result<()>;
    /// The cached environment, `TbError::EnvNotReady` before [`Structure::cal_env`].
    fn get_env(&self) -> Result<&EnvMap>;
    /// Bond rows and onsite rows, see [`BOND_COLUMNS`].
    fn cal_bond(&self) -> Result<(Array2<f64>, Array2<f64>)>;
}

/// Memoised environment of one structure.
///
/// The first successful computation wins. Backed by a `OnceLock`, a warmed
/// cache is safe to read from several threads.
#[derive(Debug, Default)]
pub struct EnvCache {
    cell: OnceLock<(f64, EnvMap)>,
}

impl EnvCache {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline(always)]
    pub fn is_ready(&self) -> bool {
        self.cell.get().is_some()
    }

    /// Cutoff the cached environment was computed with.
    pub fn cutoff(&self) -> Option<f64> {
        self.cell.get().map(|(c, _)| *c)
    }

    pub fn get(&self) -> Result<&EnvMap> {
        self.cell.get().map(|(_, env)| env).ok_or(TbError::EnvNotReady)
    }

    /// Return the cached environment, computing it with `compute` if needed.
    pub fn get_or_try_init<F>(&self, env_cutoff: f64, compute: F) -> Result<&EnvMap>
    where
        F: FnOnce(f64) -> Result<EnvMap>,
    {
        if let Some((cached, env)) = self.cell.get() {
            if (cached - env_cutoff).abs() > 1e-12 {
                log::warn!(
                    "environment already computed with cutoff {}, ignoring request for {}",
                    cached,
                    env_cutoff
                );
            }
            return Ok(env);
        }
        let env = compute(env_cutoff)?;
        // 另一个线程可能先算完了, 这时保留先写入的结果
        let _ = self.cell.set((env_cutoff, env));
        self.get()
    }
}

impl Clone for EnvCache {
    fn clone(&self) -> Self {
        let cell = OnceLock::new();
        if let Some(v) = self.cell.get() {
            let _ = cell.set(v.clone());
        }
        EnvCache { cell }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn one_key_env(cutoff: f64) -> Result<EnvMap> {
        let mut env = EnvMap::new();
        env.insert("C-C".to_string(), Array2::from_elem((1, ENV_COLUMNS), cutoff));
        Ok(env)
    }

    #[test]
    fn test_env_cache_computes_once() {
        let cache = EnvCache::new();
        assert!(!cache.is_ready());
        assert!(matches!(cache.get(), Err(TbError::EnvNotReady)));

        let calls = Cell::new(0);
        let compute = |c: f64| {
            calls.set(calls.get() + 1);
            one_key_env(c)
        };
        cache.get_or_try_init(2.0, compute).unwrap();
        let env = cache
            .get_or_try_init(3.0, |c| {
                calls.set(calls.get() + 1);
                one_key_env(c)
            })
            .unwrap();
        assert_eq!(calls.get(), 1);
        assert_eq!(env["C-C"][[0, 0]], 2.0);
        assert_eq!(cache.cutoff(), Some(2.0));
    }

    #[test]
    fn test_env_cache_failure_leaves_cache_empty() {
        let cache = EnvCache::new();
        let r = cache.get_or_try_init(2.0, |_| Err(TbError::InvalidConfiguration("boom".into())));
        assert!(r.is_err());
        assert!(!cache.is_ready());
        cache.get_or_try_init(2.0, one_key_env).unwrap();
        assert!(cache.is_ready());
    }

    #[test]
    fn test_env_cache_clone_keeps_value() {
        let cache = EnvCache::new();
        cache.get_or_try_init(1.5, one_key_env).unwrap();
        let copy = cache.clone();
        assert!(copy.is_ready());
        assert_eq!(copy.cutoff(), Some(1.5));
    }
}
