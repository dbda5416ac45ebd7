//! A model configuration and its weights, persisted together as JSON.
use crate::config::ModelConfig;
use crate::error::{Result, TbError};
use crate::load_paras::{StateDict, load_paras};
use indexmap::IndexMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Checkpoint {
    pub model_config: ModelConfig,
    pub state_dict: StateDict,
}

impl Checkpoint {
    pub fn new(model_config: ModelConfig, state_dict: StateDict) -> Self {
        Checkpoint {
            model_config,
            state_dict,
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        log::info!(
            "saved checkpoint with {} tensors to {}",
            self.state_dict.len(),
            path.display()
        );
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        let ckpt: Checkpoint = serde_json::from_reader(reader).map_err(|e| TbError::FileParse {
            file: path.display().to_string(),
            message: e.to_string(),
        })?;
        log::info!(
            "loaded checkpoint with {} tensors from {}",
            ckpt.state_dict.len(),
            path.display()
        );
        Ok(ckpt)
    }

    /// Re-shape the stored weights for a new projection scheme and onsite mode.
    ///
    /// On error `self` is consumed but nothing on disk changes; reload it to retry.
    pub fn restore<R: Rng + ?Sized>(
        mut self,
        proj_atom_anglr_m: &IndexMap<String, Vec<String>>,
        onsitemode: &str,
        rng: &mut R,
    ) -> Result<Checkpoint> {
        let model_config = load_paras(
            &self.model_config,
            &mut self.state_dict,
            proj_atom_anglr_m,
            onsitemode,
            rng,
        )?;
        Ok(Checkpoint {
            model_config,
            state_dict: self.state_dict,
        })
    }
}
