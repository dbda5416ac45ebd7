#![allow(non_snake_case)]
//! Data plumbing for neural-network corrected Slater-Koster tight-binding models.
//!
//! This crate currently provides:
//!
//! 1: [`Processor`], which samples structures without replacement into
//! mini-batches and assembles their bond, onsite and environment rows into
//! frame-tagged batch tensors.
//!
//! 2: [`load_paras`], which transplants the weights of a checkpoint trained with
//! one orbital projection scheme into freshly initialised tensors shaped for
//! another scheme.
//!
//! 3: The leaf pieces both need: a [`Structure`] abstraction with a memoised
//! environment, a concrete [`BaseStruct`], the bond and onsite index mappings,
//! and reduced Slater-Koster type enumeration.
//!
//! The networks, the training loop and the transport solver live elsewhere.
pub mod atom_struct;
pub mod base_struct;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod generics;
pub mod index_mapping;
pub mod kpoints;
pub mod load_paras;
pub mod processor;
pub mod skint_types;
pub mod structure;

pub use crate::atom_struct::{AngularMomentum, AtomType};
pub use crate::base_struct::BaseStruct;
pub use crate::checkpoint::Checkpoint;
pub use crate::config::{ModelConfig, OnsiteMode, ProcessorConfig, SkNetworkConfig};
pub use crate::error::{Result, TbError};
pub use crate::generics::TensorFloat;
pub use crate::index_mapping::{IndexMapping, OnsiteScheme};
pub use crate::kpoints::gen_kmesh;
pub use crate::load_paras::{StateDict, load_paras, load_paras_with_mode};
pub use crate::processor::{Batch, BondBatch, Epoch, Processor};
pub use crate::skint_types::{ReducedTypes, all_onsite_intgrl_types, all_skint_types};
pub use crate::structure::{EnvCache, EnvMap, Structure};
