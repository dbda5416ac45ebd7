//! Deterministic enumeration of hopping and onsite columns.
//!
//! Given the orbital shells of every projected species, this module decides
//! which column of a bond (or onsite) output block belongs to which orbital pair.
//! The maps are a pure function of the projection scheme: two models built from
//! the same `proj_atom_anglr_m` always agree on them.
use crate::atom_struct::{AngularMomentum, AtomType};
use crate::config::OnsiteMode;
use crate::error::{Result, TbError};
use indexmap::IndexMap;

/// Orbital pair label `"ish-jsh"` -> hop columns, in enumeration order.
pub type OrbitalPairIndex = IndexMap<String, Vec<usize>>;
/// Bond type `"A-B"` -> its orbital pair columns.
pub type BondIndexMap = IndexMap<String, OrbitalPairIndex>;
/// Species -> orbital label -> onsite columns.
pub type OnsiteIndexMap = IndexMap<String, IndexMap<String, Vec<usize>>>;

/// Per-species onsite layout, used by the `uniform` and `split` modes.
#[derive(Debug, Clone, PartialEq)]
pub struct OnsiteIndex {
    pub index_map: OnsiteIndexMap,
    /// Number of onsite outputs of every species.
    pub num: IndexMap<String, usize>,
}

/// Environment dependent onsite layout of the `strain` mode, keyed by
/// `"<center>-<neighbour>"`.
#[derive(Debug, Clone, PartialEq)]
pub struct StrainIndex {
    pub index_map: BondIndexMap,
    pub num: IndexMap<String, usize>,
}

/// The onsite parameterisation resolved for a concrete projection scheme.
#[derive(Debug, Clone, PartialEq)]
pub enum OnsiteScheme {
    None,
    Uniform(OnsiteIndex),
    Split(OnsiteIndex),
    Strain(StrainIndex),
}

impl OnsiteScheme {
    pub fn mode(&self) -> OnsiteMode {
        match self {
            OnsiteScheme::None => OnsiteMode::None,
            OnsiteScheme::Uniform(_) => OnsiteMode::Uniform,
            OnsiteScheme::Split(_) => OnsiteMode::Split,
            OnsiteScheme::Strain(_) => OnsiteMode::Strain,
        }
    }
}

#[derive(Debug, Clone)]
struct Shell {
    label: String,
    l: AngularMomentum,
}

#[derive(Debug, Clone, Default)]
pub struct IndexMapping {
    /// Projected species, sorted by atomic number.
    bondtype: Vec<AtomType>,
    shells: IndexMap<AtomType, Vec<Shell>>,
}

impl IndexMapping {
    pub fn new(proj_atom_anglr_m: &IndexMap<String, Vec<String>>) -> Result<Self> {
        let mut mapping = IndexMapping::default();
        mapping.update(proj_atom_anglr_m)?;
        Ok(mapping)
    }

    /// Replace the projection scheme. On error the mapping is left unchanged.
    pub fn update(&mut self, proj_atom_anglr_m: &IndexMap<String, Vec<String>>) -> Result<()> {
        let mut shells = IndexMap::new();
        for (symbol, labels) in proj_atom_anglr_m {
            let atom = AtomType::from_symbol(symbol)?;
            let mut list: Vec<Shell> = Vec::with_capacity(labels.len());
            for label in labels {
                if list.iter().any(|s| &s.label == label) {
                    return Err(TbError::InvalidConfiguration(format!(
                        "orbital '{}' listed twice for {}",
                        label, symbol
                    )));
                }
                list.push(Shell {
                    label: label.clone(),
                    l: AngularMomentum::from_label(label)?,
                });
            }
            if shells.insert(atom, list).is_some() {
                return Err(TbError::InvalidConfiguration(format!(
                    "species {} listed twice",
                    symbol
                )));
            }
        }
        let mut bondtype: Vec<AtomType> = shells.keys().copied().collect();
        bondtype.sort();
        self.bondtype = bondtype;
        self.shells = shells;
        Ok(())
    }

    pub fn bondtype(&self) -> &[AtomType] {
        &self.bondtype
    }

    /// Orbital labels of a projected species.
    pub fn orbitals(&self, atom: AtomType) -> Vec<&str> {
        self.shells
            .get(&atom)
            .map(|s| s.iter().map(|x| x.label.as_str()).collect())
            .unwrap_or_default()
    }

    fn shells_of(&self, atom: &AtomType) -> &[Shell] {
        self.shells.get(atom).map(|s| s.as_slice()).unwrap_or(&[])
    }

    /// Hop columns of every ordered species pair.
    ///
    /// An orbital pair with angular momenta $l_i, l_j$ owns $\min(l_i,l_j)+1$
    /// columns ($\sigma$, $\pi$, $\delta$, ...). Within a same-species block `ish-jsh`
    /// and `jsh-ish` share columns; the block `B-A` with $Z_B>Z_A$ reuses the
    /// columns of `A-B`. Returns the map and the number of hops per bond type.
    pub fn bond_index_map(&self) -> (BondIndexMap, IndexMap<String, usize>) {
        let mut bond_index_map = BondIndexMap::new();
        let mut bond_num_hops = IndexMap::new();
        for (it, itype) in self.bondtype.iter().enumerate() {
            for (jt, jtype) in self.bondtype.iter().enumerate() {
                let mut orbdict = OrbitalPairIndex::new();
                let mut ist = 0;
                let mut numhops = 0;
                for ish in self.shells_of(itype) {
                    for jsh in self.shells_of(jtype) {
                        let nhop = ish.l.l().min(jsh.l.l()) + 1;
                        let key = format!("{}-{}", ish.label, jsh.label);
                        let shared = if it > jt {
                            bond_index_map
                                .get(&format!("{}-{}", jtype, itype))
                                .and_then(|m: &OrbitalPairIndex| {
                                    m.get(&format!("{}-{}", jsh.label, ish.label))
                                })
                                .cloned()
                        } else if it == jt {
                            orbdict.get(&format!("{}-{}", jsh.label, ish.label)).cloned()
                        } else {
                            None
                        };
                        match shared {
                            Some(cols) => {
                                // 镜像的 bond 仍然计入 hop 数, 同种原子的对称项不计入
                                if it != jt {
                                    numhops += nhop;
                                }
                                orbdict.insert(key, cols);
                            }
                            None => {
                                orbdict.insert(key, (ist..ist + nhop).collect());
                                ist += nhop;
                                numhops += nhop;
                            }
                        }
                    }
                }
                let bond = format!("{}-{}", itype, jtype);
                bond_index_map.insert(bond.clone(), orbdict);
                bond_num_hops.insert(bond, numhops);
            }
        }
        (bond_index_map, bond_num_hops)
    }

    /// Onsite columns per species: one per shell for every mode except `split`,
    /// which gives every shell $2l+1$ columns.
    pub fn onsite_index(&self, mode: OnsiteMode) -> OnsiteIndex {
        let mut index_map = OnsiteIndexMap::new();
        let mut num = IndexMap::new();
        for itype in &self.bondtype {
            let mut orbdict = IndexMap::new();
            let mut ist = 0;
            for ish in self.shells_of(itype) {
                let width = match mode {
                    OnsiteMode::Split => ish.l.degeneracy(),
                    _ => 1,
                };
                orbdict.insert(ish.label.clone(), (ist..ist + width).collect());
                ist += width;
            }
            index_map.insert(itype.to_string(), orbdict);
            num.insert(itype.to_string(), ist);
        }
        OnsiteIndex { index_map, num }
    }

    /// Columns of the environment dependent onsite block of every
    /// (projected centre, any neighbour species) pair. Orbital pairs are taken on
    /// the centre only and are symmetric.
    pub fn onsite_strain_index(&self, atomtype: &[String]) -> Result<StrainIndex> {
        let neighbours = atomtype
            .iter()
            .map(|s| AtomType::from_symbol(s))
            .collect::<Result<Vec<_>>>()?;
        let mut index_map = BondIndexMap::new();
        let mut num = IndexMap::new();
        for itype in &self.bondtype {
            for jtype in &neighbours {
                let mut orbdict = OrbitalPairIndex::new();
                let mut ist = 0;
                for ish in self.shells_of(itype) {
                    for jsh in self.shells_of(itype) {
                        let key = format!("{}-{}", ish.label, jsh.label);
                        if let Some(cols) = orbdict.get(&format!("{}-{}", jsh.label, ish.label)) {
                            let cols = cols.clone();
                            orbdict.insert(key, cols);
                            continue;
                        }
                        let nhop = ish.l.l().min(jsh.l.l()) + 1;
                        orbdict.insert(key, (ist..ist + nhop).collect());
                        ist += nhop;
                    }
                }
                let key = format!("{}-{}", itype, jtype);
                index_map.insert(key.clone(), orbdict);
                num.insert(key, ist);
            }
        }
        Ok(StrainIndex { index_map, num })
    }

    /// Resolve the onsite parameterisation of `mode`.
    pub fn onsite_scheme(&self, mode: OnsiteMode, atomtype: &[String]) -> Result<OnsiteScheme> {
        Ok(match mode {
            OnsiteMode::None => OnsiteScheme::None,
            OnsiteMode::Uniform => OnsiteScheme::Uniform(self.onsite_index(mode)),
            OnsiteMode::Split => OnsiteScheme::Split(self.onsite_index(mode)),
            OnsiteMode::Strain => OnsiteScheme::Strain(self.onsite_strain_index(atomtype)?),
        })
    }
}
