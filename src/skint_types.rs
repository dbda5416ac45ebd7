//! Reduced (symmetry-unique) Slater-Koster integral types.
//!
//! Every column of every block in a [`BondIndexMap`] is one full integral name
//! `"<A>-<B>-<ish>-<jsh>-<k>"`. Columns shared through the index map (the
//! mirrored `B-A` block, the swapped `jsh-ish` pair of a same-species block) are
//! the same physical integral and collapse onto one reduced type. The reduced
//! list is ordered by first appearance, which makes it deterministic for a
//! given projection scheme.
use crate::atom_struct::AtomType;
use crate::error::{Result, TbError};
use crate::index_mapping::BondIndexMap;
use indexmap::IndexMap;
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReducedTypes {
    /// Full integral name -> reduced name.
    pub all_types: IndexMap<String, String>,
    /// Reduced names, in enumeration order. Position is the parameter row.
    pub reduced: Vec<String>,
    /// Per block, the reduced row of every column.
    pub column_types: IndexMap<String, Vec<usize>>,
}

impl ReducedTypes {
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.reduced.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reduced.is_empty()
    }

    /// Row of a reduced type.
    pub fn position(&self, reduced: &str) -> Option<usize> {
        self.reduced.iter().position(|r| r == reduced)
    }
}

/// Reduce the hopping integrals of a bond index map.
///
/// Reduced names follow the enumeration order, so they depend on the order of
/// each species' orbital list: `C: [s, p]` yields `C-C-s-p-0` where
/// `C: [p, s]` yields `C-C-p-s-0`. Two schemes only share a reduced type when
/// they define the orbitals identically, order included.
pub fn all_skint_types(bond_index_map: &BondIndexMap) -> Result<ReducedTypes> {
    reduce(bond_index_map, |block| {
        let (a, b) = split_block(block)?;
        let (za, zb) = (AtomType::from_symbol(a)?, AtomType::from_symbol(b)?);
        Ok(if za > zb {
            format!("{}-{}", b, a)
        } else {
            block.to_string()
        })
    })
}

/// Reduce the environment dependent onsite integrals of a strain index map.
///
/// Blocks are never mirrored: `A-X` is the onsite of `A` perturbed by `X`.
pub fn all_onsite_intgrl_types(strain_index_map: &BondIndexMap) -> Result<ReducedTypes> {
    reduce(strain_index_map, |block| {
        split_block(block)?;
        Ok(block.to_string())
    })
}

fn split_block(block: &str) -> Result<(&str, &str)> {
    block.split_once('-').ok_or_else(|| {
        TbError::InvalidConfiguration(format!("block key '{}' is not of the form A-B", block))
    })
}

fn reduce<F>(index_map: &BondIndexMap, canonical: F) -> Result<ReducedTypes>
where
    F: Fn(&str) -> Result<String>,
{
    let mut out = ReducedTypes::default();
    let mut seen: HashMap<(String, usize), usize> = HashMap::new();
    for (block, orbdict) in index_map {
        let owner = canonical(block)?;
        let ncol = orbdict
            .values()
            .flatten()
            .max()
            .map_or(0, |&c| c + 1);
        let mut column_types = vec![0; ncol];
        for (pair, cols) in orbdict {
            for (k, &col) in cols.iter().enumerate() {
                let full = format!("{}-{}-{}", block, pair, k);
                let id = *seen.entry((owner.clone(), col)).or_insert_with(|| {
                    out.reduced.push(full.clone());
                    out.reduced.len() - 1
                });
                out.all_types.insert(full, out.reduced[id].clone());
                column_types[col] = id;
            }
        }
        out.column_types.insert(block.clone(), column_types);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base_struct::tests::proj;
    use crate::index_mapping::IndexMapping;

    fn bond_map(entries: &[(&str, &str)]) -> BondIndexMap {
        IndexMapping::new(&proj(entries)).unwrap().bond_index_map().0
    }

    #[test]
    fn test_same_species_pairs_collapse() {
        let types = all_skint_types(&bond_map(&[("C", "s p")])).unwrap();
        assert_eq!(
            types.reduced,
            vec!["C-C-s-s-0", "C-C-s-p-0", "C-C-p-p-0", "C-C-p-p-1"]
        );
        assert_eq!(types.all_types["C-C-p-s-0"], "C-C-s-p-0");
        assert_eq!(types.column_types["C-C"], vec![0, 1, 2, 3]);
        assert_eq!(types.position("C-C-p-p-1"), Some(3));
    }

    #[test]
    fn test_mirrored_blocks_share_types() {
        let types = all_skint_types(&bond_map(&[("N", "2s 2p"), ("B", "2s")])).unwrap();
        // B-B: 1, B-N: 2, N-N: 4
        assert_eq!(types.len(), 7);
        assert_eq!(types.all_types["N-B-2p-2s-0"], "B-N-2s-2p-0");
        assert_eq!(types.column_types["N-B"], types.column_types["B-N"]);
        assert!(types.reduced.iter().all(|r| !r.starts_with("N-B")));
    }

    #[test]
    fn test_onsite_types_are_not_mirrored() {
        let map = IndexMapping::new(&proj(&[("C", "s p")]))
            .unwrap()
            .onsite_strain_index(&["C".to_string(), "H".to_string()])
            .unwrap();
        let types = all_onsite_intgrl_types(&map.index_map).unwrap();
        assert_eq!(types.len(), 8);
        assert_eq!(types.all_types["C-H-p-s-0"], "C-H-s-p-0");
        assert_eq!(types.position("C-H-s-s-0"), Some(4));
    }

    #[test]
    fn test_reduced_names_follow_orbital_order() {
        let sp = all_skint_types(&bond_map(&[("C", "s p")])).unwrap();
        let ps = all_skint_types(&bond_map(&[("C", "p s")])).unwrap();
        assert_eq!(
            ps.reduced,
            vec!["C-C-p-p-0", "C-C-p-p-1", "C-C-p-s-0", "C-C-s-s-0"]
        );
        assert!(sp.position("C-C-s-p-0").is_some());
        assert!(ps.position("C-C-s-p-0").is_none());
    }

    #[test]
    fn test_bad_block_key() {
        let mut map = BondIndexMap::new();
        map.insert("CC".to_string(), IndexMap::new());
        assert!(all_skint_types(&map).is_err());
    }
}
