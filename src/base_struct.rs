use crate::atom_struct::{AngularMomentum, AtomType};
use crate::error::{Result, TbError};
use crate::structure::{BOND_COLUMNS, ENV_COLUMNS, EnvCache, EnvMap, Structure};
use indexmap::IndexMap;
use ndarray::{Array1, Array2, ArrayBase, ArrayView1, Data, Ix1, arr1};
use std::collections::BTreeSet;

/// A periodic (or partially periodic) atomic structure.
///
/// Positions are Cartesian, `lat.row(i)` is the i-th lattice vector. Atoms whose
/// species has an entry in `proj_atom_anglr_m` carry orbitals: they form bonds and
/// onsite terms, and they are the centres of the environment. Every atom,
/// projected or not, can appear as an environment neighbour.
#[derive(Debug, Clone)]
pub struct BaseStruct {
    lat: Array2<f64>,
    positions: Array2<f64>,
    species: Vec<AtomType>,
    pbc: [bool; 3],
    proj_atom_anglr_m: IndexMap<String, Vec<String>>,
    /// Bond cutoff used by [`Structure::cal_bond`].
    cutoff: f64,
    env: EnvCache,
}

/// One directed neighbour `i -> j + R` within a cutoff.
#[derive(Debug, Clone, Copy)]
struct Neighbour {
    i: usize,
    j: usize,
    R: [i32; 3],
    dvec: [f64; 3],
    dist: f64,
}

impl BaseStruct {
    /// Create a new structure.
    ///
    /// # Arguments
    /// * `lat` - $3\times 3$ lattice, rows are the lattice vectors
    /// * `positions` - Cartesian coordinates, one row per atom
    /// * `species` - element of every atom, same order as `positions`
    /// * `pbc` - periodicity along each lattice vector
    /// * `proj_atom_anglr_m` - orbital labels of every projected species, e.g. `{"C": ["2s", "2p"]}`
    /// * `cutoff` - bond cutoff radius
    ///
    /// # Errors
    /// `TbError::InvalidConfiguration` for inconsistent shapes, a non-positive cutoff
    /// or a degenerate periodic cell; `InvalidAtomType` / `InvalidOrbitalProjection`
    /// for unparseable projection entries.
    pub fn new(
        lat: Array2<f64>,
        positions: Array2<f64>,
        species: Vec<AtomType>,
        pbc: [bool; 3],
        proj_atom_anglr_m: IndexMap<String, Vec<String>>,
        cutoff: f64,
    ) -> Result<Self> {
        if lat.shape() != [3, 3] {
            return Err(TbError::ShapeMismatch {
                context: "lattice".to_string(),
                expected: vec![3, 3],
                found: lat.shape().to_vec(),
            });
        }
        if positions.ncols() != 3 || positions.nrows() != species.len() {
            return Err(TbError::ShapeMismatch {
                context: "positions".to_string(),
                expected: vec![species.len(), 3],
                found: positions.shape().to_vec(),
            });
        }
        if species.is_empty() {
            return Err(TbError::InvalidConfiguration(
                "a structure needs at least one atom".to_string(),
            ));
        }
        if !(cutoff.is_finite() && cutoff > 0.0) {
            return Err(TbError::InvalidConfiguration(format!(
                "bond cutoff must be positive, got {}",
                cutoff
            )));
        }
        for (atom, orbitals) in proj_atom_anglr_m.iter() {
            AtomType::from_symbol(atom)?;
            for orb in orbitals {
                AngularMomentum::from_label(orb)?;
            }
        }
        if pbc.iter().any(|&p| p) && cell_volume(&lat) < 1e-10 {
            return Err(TbError::InvalidConfiguration(
                "periodic structure with a zero-volume cell".to_string(),
            ));
        }
        Ok(BaseStruct {
            lat,
            positions,
            species,
            pbc,
            proj_atom_anglr_m,
            cutoff,
            env: EnvCache::new(),
        })
    }

    #[inline(always)]
    pub fn natom(&self) -> usize {
        self.species.len()
    }
    pub fn lat(&self) -> &Array2<f64> {
        &self.lat
    }
    pub fn positions(&self) -> &Array2<f64> {
        &self.positions
    }
    pub fn species(&self) -> &[AtomType] {
        &self.species
    }
    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }
    pub fn proj_atom_anglr_m(&self) -> &IndexMap<String, Vec<String>> {
        &self.proj_atom_anglr_m
    }

    #[inline(always)]
    fn is_projected(&self, atom: usize) -> bool {
        self.proj_atom_anglr_m
            .contains_key(self.species[atom].to_str())
    }

    /// 根据截断半径确定每个方向上需要搜索的晶格矢量范围
    fn search_range(&self, cutoff: f64) -> [i32; 3] {
        let mut range = [0; 3];
        if !self.pbc.iter().any(|&p| p) {
            return range;
        }
        let volume = cell_volume(&self.lat);
        for a in 0..3 {
            if !self.pbc[a] {
                continue;
            }
            let b = self.lat.row((a + 1) % 3);
            let c = self.lat.row((a + 2) % 3);
            let area = norm(&cross(&b, &c));
            let height = volume / area;
            // 原胞内两个原子最多相差一个晶格矢量, 所以多搜一层
            range[a] = (cutoff / height).ceil() as i32 + 1;
        }
        range
    }

    fn neighbor_vectors(&self, cutoff: f64) -> Vec<[i32; 3]> {
        let [n0, n1, n2] = self.search_range(cutoff);
        (-n0..=n0)
            .flat_map(|i| (-n1..=n1).flat_map(move |j| (-n2..=n2).map(move |k| [i, j, k])))
            .collect()
    }

    /// All directed neighbours with $0<|r|\le$ `cutoff`, in `(i, j, R)` order.
    fn neighbours(&self, cutoff: f64) -> Vec<Neighbour> {
        let neighbor_R = self.neighbor_vectors(cutoff);
        let mut found = Vec::new();
        for i in 0..self.natom() {
            let ri = self.positions.row(i);
            for j in 0..self.natom() {
                let rj = self.positions.row(j);
                for R in &neighbor_R {
                    let shift: Array1<f64> =
                        arr1(&[R[0] as f64, R[1] as f64, R[2] as f64]).dot(&self.lat);
                    let d = &rj + &shift - &ri;
                    let dist = norm(&d);
                    if dist < 1e-8 || dist > cutoff {
                        continue;
                    }
                    found.push(Neighbour {
                        i,
                        j,
                        R: *R,
                        dvec: [d[0], d[1], d[2]],
                        dist,
                    });
                }
            }
        }
        found
    }

    fn compute_env(&self, env_cutoff: f64) -> Result<EnvMap> {
        if !(env_cutoff.is_finite() && env_cutoff > 0.0) {
            return Err(TbError::InvalidConfiguration(format!(
                "environment cutoff must be positive, got {}",
                env_cutoff
            )));
        }
        let mut rows: IndexMap<String, Vec<f64>> = IndexMap::new();
        for nb in self.neighbours(env_cutoff) {
            if !self.is_projected(nb.i) {
                continue;
            }
            let key = format!("{}-{}", self.species[nb.i], self.species[nb.j]);
            let u = unit(&nb);
            rows.entry(key).or_default().extend_from_slice(&[
                nb.i as f64,
                nb.j as f64,
                self.species[nb.i].atomic_number() as f64,
                nb.dist,
                u[0],
                u[1],
                u[2],
            ]);
        }
        let mut env = EnvMap::new();
        for (key, data) in rows {
            env.insert(key, to_rows(data, ENV_COLUMNS, "environment")?);
        }
        Ok(env)
    }
}

impl Structure for BaseStruct {
    fn atom_type(&self) -> Vec<AtomType> {
        let set: BTreeSet<AtomType> = self.species.iter().copied().collect();
        set.into_iter().collect()
    }

    fn proj_atom_type(&self) -> Vec<AtomType> {
        let set: BTreeSet<AtomType> = (0..self.natom())
            .filter(|&i| self.is_projected(i))
            .map(|i| self.species[i])
            .collect();
        set.into_iter().collect()
    }

    fn env_ready(&self) -> bool {
        self.env.is_ready()
    }

    fn cal_env(&self, env_cutoff: f64) -> Result<()> {
        self.env
            .get_or_try_init(env_cutoff, |c| self.compute_env(c))
            .map(|_| ())
    }

    fn get_env(&self) -> Result<&EnvMap> {
        self.env.get()
    }

    fn cal_bond(&self) -> Result<(Array2<f64>, Array2<f64>)> {
        let mut bonds = Vec::new();
        for nb in self.neighbours(self.cutoff) {
            if !(self.is_projected(nb.i) && self.is_projected(nb.j)) {
                continue;
            }
            // 只保留一半的 bond, i<j 或者 i==j 且 R 为正
            let keep = nb.i < nb.j || (nb.i == nb.j && lexicographic_positive(&nb.R));
            if !keep {
                continue;
            }
            let u = unit(&nb);
            bonds.extend_from_slice(&[
                nb.i as f64,
                self.species[nb.i].atomic_number() as f64,
                nb.j as f64,
                self.species[nb.j].atomic_number() as f64,
                nb.R[0] as f64,
                nb.R[1] as f64,
                nb.R[2] as f64,
                nb.dist,
                u[0],
                u[1],
                u[2],
            ]);
        }
        let mut onsite = Vec::new();
        for i in (0..self.natom()).filter(|&i| self.is_projected(i)) {
            let z = self.species[i].atomic_number() as f64;
            onsite.extend_from_slice(&[i as f64, z, i as f64, z]);
            onsite.extend_from_slice(&[0.0; BOND_COLUMNS - 4]);
        }
        Ok((
            to_rows(bonds, BOND_COLUMNS, "bond")?,
            to_rows(onsite, BOND_COLUMNS, "onsite bond")?,
        ))
    }
}

fn to_rows(data: Vec<f64>, ncols: usize, context: &str) -> Result<Array2<f64>> {
    let n = data.len() / ncols;
    Array2::from_shape_vec((n, ncols), data).map_err(|_| TbError::ShapeMismatch {
        context: context.to_string(),
        expected: vec![n, ncols],
        found: vec![n * ncols],
    })
}

#[inline(always)]
fn unit(nb: &Neighbour) -> [f64; 3] {
    [nb.dvec[0] / nb.dist, nb.dvec[1] / nb.dist, nb.dvec[2] / nb.dist]
}

fn lexicographic_positive(R: &[i32; 3]) -> bool {
    R.iter().find(|&&x| x != 0).is_some_and(|&x| x > 0)
}

#[inline(always)]
fn norm<S: Data<Elem = f64>>(v: &ArrayBase<S, Ix1>) -> f64 {
    v.dot(v).sqrt()
}

fn cross(a: &ArrayView1<f64>, b: &ArrayView1<f64>) -> Array1<f64> {
    arr1(&[
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ])
}

fn cell_volume(lat: &Array2<f64>) -> f64 {
    let c = cross(&lat.row(1), &lat.row(2));
    lat.row(0).dot(&c).abs()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    /// `proj(&[("C", "2s 2p")])` -> `{"C": ["2s", "2p"]}`
    pub(crate) fn proj(entries: &[(&str, &str)]) -> IndexMap<String, Vec<String>> {
        entries
            .iter()
            .map(|(a, orbs)| {
                (a.to_string(), orbs.split_whitespace().map(|o| o.to_string()).collect())
            })
            .collect()
    }

    /// A linear chain along x with lattice constant `a` and one atom per cell.
    pub(crate) fn chain(symbol: &str, a: f64) -> BaseStruct {
        BaseStruct::new(
            array![[a, 0.0, 0.0], [0.0, 10.0, 0.0], [0.0, 0.0, 10.0]],
            array![[0.0, 0.0, 0.0]],
            vec![AtomType::from_symbol(symbol).unwrap()],
            [true, false, false],
            proj(&[(symbol, "s p")]),
            1.1 * a,
        )
        .unwrap()
    }

    /// An isolated hBN-like dimer: B projected, N projected, H unprojected.
    pub(crate) fn dimer_with_h() -> BaseStruct {
        BaseStruct::new(
            Array2::zeros((3, 3)),
            array![[0.0, 0.0, 0.0], [1.4, 0.0, 0.0], [-1.0, 0.0, 0.0]],
            vec![
                AtomType::from_symbol("B").unwrap(),
                AtomType::from_symbol("N").unwrap(),
                AtomType::from_symbol("H").unwrap(),
            ],
            [false; 3],
            proj(&[("N", "2s 2p"), ("B", "2s 2p")]),
            1.6,
        )
        .unwrap()
    }

    #[test]
    fn test_chain_bonds_are_a_half_list() {
        let st = chain("C", 1.4);
        let (bonds, onsite) = st.cal_bond().unwrap();
        // only the +x image survives, -x is its mirror
        assert_eq!(bonds.shape(), &[1, BOND_COLUMNS]);
        assert_eq!(bonds[[0, 0]], 0.0);
        assert_eq!(bonds[[0, 1]], 6.0);
        assert_eq!(bonds[[0, 4]], 1.0);
        assert_relative_eq!(bonds[[0, 7]], 1.4, epsilon = 1e-12);
        assert_relative_eq!(bonds[[0, 8]], 1.0, epsilon = 1e-12);
        assert_eq!(onsite.shape(), &[1, BOND_COLUMNS]);
        assert_eq!(onsite[[0, 2]], 0.0);
        assert_eq!(onsite[[0, 7]], 0.0);
    }

    #[test]
    fn test_dimer_bonds_skip_unprojected_atoms() {
        let st = dimer_with_h();
        let (bonds, onsite) = st.cal_bond().unwrap();
        assert_eq!(bonds.nrows(), 1);
        assert_eq!(bonds[[0, 0]], 0.0);
        assert_eq!(bonds[[0, 2]], 1.0);
        assert_eq!(bonds[[0, 3]], 7.0);
        assert_eq!(onsite.nrows(), 2);
        assert_eq!(
            st.proj_atom_type(),
            vec![AtomType::from_symbol("B").unwrap(), AtomType::from_symbol("N").unwrap()]
        );
        assert_eq!(st.atom_type().len(), 3);
    }

    #[test]
    fn test_env_is_lazy_and_keyed_by_species_pair() {
        let st = dimer_with_h();
        assert!(!st.env_ready());
        assert!(matches!(st.get_env(), Err(TbError::EnvNotReady)));
        st.cal_env(2.0).unwrap();
        assert!(st.env_ready());
        let env = st.get_env().unwrap();
        // B sees N at 1.4 and H at 1.0, N sees B at 1.4, H is never a centre
        assert_eq!(env["B-N"].nrows(), 1);
        assert_eq!(env["B-H"].nrows(), 1);
        assert_eq!(env["N-B"].nrows(), 1);
        assert!(!env.contains_key("H-B"));
        let row = env["B-H"].row(0);
        assert_eq!(row[0], 0.0);
        assert_eq!(row[1], 2.0);
        assert_eq!(row[2], 5.0);
        assert_relative_eq!(row[3], 1.0, epsilon = 1e-12);
        assert_relative_eq!(row[4], -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_invalid_structures_are_rejected() {
        let r = BaseStruct::new(
            Array2::eye(3),
            array![[0.0, 0.0, 0.0]],
            vec![],
            [true; 3],
            proj(&[("C", "s")]),
            1.0,
        );
        assert!(r.is_err());
        let r = BaseStruct::new(
            Array2::eye(3),
            array![[0.0, 0.0, 0.0]],
            vec![AtomType::from_symbol("C").unwrap()],
            [true; 3],
            proj(&[("C", "x")]),
            1.0,
        );
        assert!(matches!(r, Err(TbError::InvalidOrbitalProjection(_))));
        let r = BaseStruct::new(
            Array2::zeros((3, 3)),
            array![[0.0, 0.0, 0.0]],
            vec![AtomType::from_symbol("C").unwrap()],
            [true, false, false],
            proj(&[("C", "s")]),
            1.0,
        );
        assert!(matches!(r, Err(TbError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_simple_cubic_search_range_and_shells() {
        let st = BaseStruct::new(
            Array2::<f64>::eye(3) * 2.0,
            array![[0.0, 0.0, 0.0]],
            vec![AtomType::from_symbol("Si").unwrap()],
            [true; 3],
            proj(&[("Si", "3s 3p")]),
            2.2,
        )
        .unwrap();
        // layer spacing 2.0, ceil(3.0 / 2.0) + 1
        assert_eq!(st.search_range(3.0), [3, 3, 3]);
        assert_eq!(st.neighbor_vectors(3.0).len(), 7 * 7 * 7);
        // six nearest neighbours, three survive the half list
        let (bonds, onsite) = st.cal_bond().unwrap();
        assert_eq!(bonds.nrows(), 3);
        assert_eq!(onsite.nrows(), 1);
        // first shell at 2.0, second at 2*sqrt(2)
        st.cal_env(3.0).unwrap();
        assert_eq!(st.get_env().unwrap()["Si-Si"].nrows(), 6 + 12);
        assert_relative_eq!(norm(&array![3.0, 4.0]), 5.0);
        assert_relative_eq!(norm(&array![3.0, 4.0].view()), 5.0);
    }
}
