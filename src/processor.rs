//! Mini-batch sampling of structures for training.
//!
//! A [`Processor`] owns the structure list of a training run and hands out one
//! [`Epoch`] at a time. Every step of an epoch draws a workspace of at most
//! `batch_size` structures from a shuffled pool and assembles their bond,
//! onsite and environment rows into batch tensors. Each row is tagged in column
//! 0 with the position of its structure inside the workspace (the batch-local
//! frame), so per-structure results can be scattered back.
//!
//! When the pool holds no more than `batch_size` indices, the whole remainder
//! becomes the workspace and the pool is refilled at once with a fresh
//! permutation. An epoch stops after `n_batch = ceil(N / B)` steps regardless.
//!
//! Iteration mutates the pool, so an epoch borrows the processor mutably: one
//! consumer at a time. Independent consumers need independent processors.
use crate::atom_struct::AtomType;
use crate::config::ProcessorConfig;
use crate::error::{Result, TbError};
use crate::generics::TensorFloat;
use crate::structure::{BOND_COLUMNS, ENV_COLUMNS, Structure};
use indexmap::IndexMap;
use ndarray::{Array2, Array3, ArrayView2, Axis, concatenate, s, stack};
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::marker::PhantomData;
use std::sync::Arc;

/// Bond or onsite rows of a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum BondBatch<T> {
    /// Rows of every frame stacked along axis 0.
    Concatenated(Array2<T>),
    /// Rows keyed by batch-local frame.
    PerFrame(BTreeMap<usize, Array2<T>>),
}

impl<T> BondBatch<T> {
    /// Total number of rows over all frames.
    pub fn nrows(&self) -> usize {
        match self {
            BondBatch::Concatenated(a) => a.nrows(),
            BondBatch::PerFrame(m) => m.values().map(|a| a.nrows()).sum(),
        }
    }
}

/// One step of an epoch.
#[derive(Debug, Clone)]
pub struct Batch<S, T> {
    pub bonds: BondBatch<T>,
    pub bonds_onsite: BondBatch<T>,
    /// Environment rows merged per `"<center>-<neighbour>"` key.
    pub env: IndexMap<String, Array2<T>>,
    pub structures: Vec<Arc<S>>,
    pub kpoints: Array2<f64>,
    /// Eigenvalue labels of the workspace, in workspace order.
    pub eigenvalues: Vec<Array2<f64>>,
    /// Original indices of the workspace structures.
    pub indices: Vec<usize>,
}

impl<S, T> Batch<S, T> {
    #[inline(always)]
    pub fn n_frames(&self) -> usize {
        self.indices.len()
    }

    /// The eigenvalue labels as one `[n_frames, nk, nband]` array.
    pub fn stacked_eigenvalues(&self) -> Result<Array3<f64>> {
        let views: Vec<ArrayView2<f64>> = self.eigenvalues.iter().map(|e| e.view()).collect();
        stack(Axis(0), &views).map_err(|_| TbError::ShapeMismatch {
            context: "eigenvalue labels of a batch".to_string(),
            expected: self
                .eigenvalues
                .first()
                .map(|e| e.shape().to_vec())
                .unwrap_or_default(),
            found: self
                .eigenvalues
                .iter()
                .find(|e| Some(e.shape()) != self.eigenvalues.first().map(|f| f.shape()))
                .map(|e| e.shape().to_vec())
                .unwrap_or_default(),
        })
    }
}

pub struct Processor<S: Structure, T: TensorFloat = f64> {
    structures: Vec<Arc<S>>,
    kpoints: Array2<f64>,
    eigenvalues: Vec<Array2<f64>>,
    batch_size: usize,
    env_cutoff: f64,
    require_dict: bool,
    n_batch: usize,
    unsampled: Vec<usize>,
    workspace: Vec<usize>,
    it: usize,
    rng: ChaCha8Rng,
    _dtype: PhantomData<T>,
}

impl<S: Structure, T: TensorFloat> Processor<S, T> {
    /// Create a processor over `structures`.
    ///
    /// `eigenvalues[i]` is the label of `structures[i]`. `kpoints` is handed to
    /// every batch unchanged.
    ///
    /// # Errors
    /// `TbError::InvalidConfiguration` for an empty structure list, a zero batch
    /// size, a non-positive environment cutoff or a label count that differs
    /// from the structure count.
    pub fn new(
        structures: Vec<Arc<S>>,
        kpoints: Array2<f64>,
        eigenvalues: Vec<Array2<f64>>,
        config: &ProcessorConfig,
    ) -> Result<Self> {
        config.validate()?;
        if structures.is_empty() {
            return Err(TbError::InvalidConfiguration(
                "a processor needs at least one structure".to_string(),
            ));
        }
        if eigenvalues.len() != structures.len() {
            return Err(TbError::InvalidConfiguration(format!(
                "{} eigenvalue labels for {} structures",
                eigenvalues.len(),
                structures.len()
            )));
        }
        let n = structures.len();
        let n_batch = n.div_ceil(config.batch_size);
        let rng = config
            .seed
            .map_or_else(ChaCha8Rng::from_entropy, ChaCha8Rng::seed_from_u64);
        let mut processor = Processor {
            structures,
            kpoints,
            eigenvalues,
            batch_size: config.batch_size,
            env_cutoff: config.env_cutoff,
            require_dict: config.require_dict,
            n_batch,
            unsampled: Vec::with_capacity(n),
            workspace: Vec::new(),
            it: 0,
            rng,
            _dtype: PhantomData,
        };
        processor.reset_pool();
        log::debug!(
            "processor over {} structures, batch size {}, {} batches per epoch",
            n,
            processor.batch_size,
            n_batch
        );
        Ok(processor)
    }

    /// Number of batches per epoch.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.n_batch
    }

    /// Always `false`: construction rejects an empty structure list.
    pub fn is_empty(&self) -> bool {
        self.n_batch == 0
    }

    pub fn n_structures(&self) -> usize {
        self.structures.len()
    }
    pub fn structures(&self) -> &[Arc<S>] {
        &self.structures
    }
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
    pub fn env_cutoff(&self) -> f64 {
        self.env_cutoff
    }

    /// Original indices of the current workspace, empty before the first step.
    pub fn workspace_indices(&self) -> &[usize] {
        &self.workspace
    }

    /// Union of the species of every structure, sorted by atomic number.
    pub fn atom_type(&self) -> Vec<AtomType> {
        self.structures
            .iter()
            .flat_map(|st| st.atom_type())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Union of the projected species of every structure, sorted by atomic number.
    pub fn proj_atom_type(&self) -> Vec<AtomType> {
        self.structures
            .iter()
            .flat_map(|st| st.proj_atom_type())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Start a new epoch: fresh permutation, counter back to zero.
    pub fn epoch(&mut self) -> Epoch<'_, S, T> {
        self.reset_pool();
        self.it = 0;
        log::debug!("new epoch of {} batches", self.n_batch);
        Epoch { processor: self }
    }

    fn reset_pool(&mut self) {
        self.unsampled.clear();
        self.unsampled.extend(0..self.structures.len());
        self.unsampled.shuffle(&mut self.rng);
    }

    fn shuffle(&mut self) {
        if self.unsampled.len() <= self.batch_size {
            self.workspace = std::mem::take(&mut self.unsampled);
            self.reset_pool();
            log::debug!("sampling pool exhausted, reshuffled");
        } else {
            self.workspace = self.unsampled.drain(..self.batch_size).collect();
        }
    }

    /// Workspace structures, or the whole list in original order before the
    /// first step.
    fn frames(&self) -> Vec<&Arc<S>> {
        if self.workspace.is_empty() {
            self.structures.iter().collect()
        } else {
            self.workspace.iter().map(|&i| &self.structures[i]).collect()
        }
    }

    /// Bond and onsite rows of the current frames, frame-tagged.
    pub fn get_bond(&self) -> Result<(BondBatch<T>, BondBatch<T>)> {
        let frames = self.frames();
        let mut bonds = Vec::with_capacity(frames.len());
        let mut onsite = Vec::with_capacity(frames.len());
        for (frame, st) in frames.into_iter().enumerate() {
            let (b, o) = st.cal_bond()?;
            bonds.push(tag_frame::<T>(frame, &b.view()));
            onsite.push(tag_frame::<T>(frame, &o.view()));
        }
        if self.require_dict {
            Ok((
                BondBatch::PerFrame(bonds.into_iter().enumerate().collect()),
                BondBatch::PerFrame(onsite.into_iter().enumerate().collect()),
            ))
        } else {
            Ok((
                BondBatch::Concatenated(stack_rows("bond rows", BOND_COLUMNS + 1, &bonds)?),
                BondBatch::Concatenated(stack_rows("onsite rows", BOND_COLUMNS + 1, &onsite)?),
            ))
        }
    }

    /// Environment rows of the current frames, computing each structure's
    /// environment on first use.
    pub fn get_env(&self) -> Result<IndexMap<String, Array2<T>>> {
        let mut grouped: IndexMap<String, Vec<Array2<T>>> = IndexMap::new();
        for (frame, st) in self.frames().into_iter().enumerate() {
            if !st.env_ready() {
                st.cal_env(self.env_cutoff)?;
            }
            for (key, rows) in st.get_env()? {
                grouped
                    .entry(key.clone())
                    .or_default()
                    .push(tag_frame::<T>(frame, &rows.view()));
            }
        }
        grouped
            .into_iter()
            .map(|(key, parts)| {
                let merged = stack_rows(&key, ENV_COLUMNS + 1, &parts)?;
                Ok((key, merged))
            })
            .collect()
    }

    /// Compute the environment of every structure in parallel.
    ///
    /// Afterwards the structures are only read, so they can be shared with
    /// other processors or threads.
    pub fn warm_up_env(&self) -> Result<()>
    where
        S: Send + Sync,
    {
        let env_cutoff = self.env_cutoff;
        self.structures
            .par_iter()
            .try_for_each(|st| if st.env_ready() { Ok(()) } else { st.cal_env(env_cutoff) })
    }

    fn next_batch(&mut self) -> Result<Batch<S, T>> {
        self.shuffle();
        let (bonds, bonds_onsite) = self.get_bond()?;
        let env = self.get_env()?;
        log::debug!(
            "batch {}/{}: {} frames, {} bond rows, {} onsite rows, {} env keys",
            self.it,
            self.n_batch,
            self.workspace.len(),
            bonds.nrows(),
            bonds_onsite.nrows(),
            env.len()
        );
        Ok(Batch {
            bonds,
            bonds_onsite,
            env,
            structures: self
                .workspace
                .iter()
                .map(|&i| Arc::clone(&self.structures[i]))
                .collect(),
            kpoints: self.kpoints.clone(),
            eigenvalues: self
                .workspace
                .iter()
                .map(|&i| self.eigenvalues[i].clone())
                .collect(),
            indices: self.workspace.clone(),
        })
    }
}

/// One pass over the structure list, see [`Processor::epoch`].
pub struct Epoch<'a, S: Structure, T: TensorFloat> {
    processor: &'a mut Processor<S, T>,
}

impl<S: Structure, T: TensorFloat> Iterator for Epoch<'_, S, T> {
    type Item = Result<Batch<S, T>>;

    fn next(&mut self) -> Option<Self::Item> {
        let p = &mut *self.processor;
        if p.it >= p.n_batch {
            return None;
        }
        p.it += 1;
        Some(p.next_batch())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.processor.n_batch.saturating_sub(self.processor.it);
        (left, Some(left))
    }
}

impl<S: Structure, T: TensorFloat> ExactSizeIterator for Epoch<'_, S, T> {}

impl<'a, S: Structure, T: TensorFloat> IntoIterator for &'a mut Processor<S, T> {
    type Item = Result<Batch<S, T>>;
    type IntoIter = Epoch<'a, S, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.epoch()
    }
}

/// Prepend the frame index as column 0 and cast to the batch dtype.
fn tag_frame<T: TensorFloat>(frame: usize, rows: &ArrayView2<f64>) -> Array2<T> {
    let (n, m) = rows.dim();
    let mut out = Array2::<T>::zeros((n, m + 1));
    out.column_mut(0).fill(T::from_f64(frame as f64));
    out.slice_mut(s![.., 1..])
        .zip_mut_with(rows, |o, &x| *o = T::from_f64(x));
    out
}

fn stack_rows<T: TensorFloat>(context: &str, ncols: usize, parts: &[Array2<T>]) -> Result<Array2<T>> {
    if parts.is_empty() {
        return Ok(Array2::zeros((0, ncols)));
    }
    let views: Vec<ArrayView2<T>> = parts.iter().map(|a| a.view()).collect();
    concatenate(Axis(0), &views).map_err(|_| TbError::ShapeMismatch {
        context: context.to_string(),
        expected: vec![ncols],
        found: parts.iter().map(|a| a.ncols()).collect(),
    })
}
