use crate::error::{Result, TbError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Element symbols ordered by atomic number, `ELEMENTS[z - 1]` is element `z`.
const ELEMENTS: [&str; 88] = [
    "H", "He", "Li", "Be", "B", "C", "N", "O", "F", "Ne", "Na", "Mg", "Al", "Si", "P", "S", "Cl",
    "Ar", "K", "Ca", "Sc", "Ti", "V", "Cr", "Mn", "Fe", "Co", "Ni", "Cu", "Zn", "Ga", "Ge", "As",
    "Se", "Br", "Kr", "Rb", "Sr", "Y", "Zr", "Nb", "Mo", "Tc", "Ru", "Rh", "Pd", "Ag", "Cd", "In",
    "Sn", "Sb", "Te", "I", "Xe", "Cs", "Ba", "La", "Ce", "Pr", "Nd", "Pm", "Sm", "Eu", "Gd", "Tb",
    "Dy", "Ho", "Er", "Tm", "Yb", "Lu", "Hf", "Ta", "W", "Re", "Os", "Ir", "Pt", "Au", "Hg", "Tl",
    "Pb", "Bi", "Po", "At", "Rn", "Fr", "Ra",
];

/// The chemical element of an atom.
///
/// Stored as the atomic number, so the derived ordering is the ordering by
/// atomic number that the bond-type enumeration relies on: `H < C < N < Si`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct AtomType(u8);

impl AtomType {
    pub fn from_symbol(s: &str) -> Result<Self> {
        ELEMENTS
            .iter()
            .position(|&e| e == s)
            .map(|i| AtomType(i as u8 + 1))
            .ok_or_else(|| TbError::InvalidAtomType(s.to_string()))
    }
    pub fn from_atomic_number(z: usize) -> Result<Self> {
        if z == 0 || z > ELEMENTS.len() {
            return Err(TbError::InvalidAtomType(format!("Z={}", z)));
        }
        Ok(AtomType(z as u8))
    }
    #[inline(always)]
    pub fn atomic_number(&self) -> usize {
        self.0 as usize
    }
    pub fn to_str(&self) -> &'static str {
        ELEMENTS[self.0 as usize - 1]
    }
}

impl FromStr for AtomType {
    type Err = TbError;
    fn from_str(s: &str) -> Result<Self> {
        AtomType::from_symbol(s.trim())
    }
}

impl TryFrom<String> for AtomType {
    type Error = TbError;
    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<AtomType> for String {
    fn from(a: AtomType) -> String {
        a.to_str().to_string()
    }
}

impl fmt::Display for AtomType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_str())
    }
}

/// Angular momentum channel of an atomic orbital shell.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
pub enum AngularMomentum {
    /// $l=0$
    S,
    /// $l=1$
    P,
    /// $l=2$
    D,
    /// $l=3$
    F,
}

impl AngularMomentum {
    /// Resolve an orbital label such as `"s"`, `"2s"`, `"3p"` or `"s*"`.
    ///
    /// Only the alphabetic characters of the label decide the channel, the
    /// principal number and any decoration just tell shells of the same $l$ apart.
    pub fn from_label(label: &str) -> Result<Self> {
        let symbol: String = label.chars().filter(|c| c.is_ascii_alphabetic()).collect();
        match symbol.as_str() {
            "s" => Ok(AngularMomentum::S),
            "p" => Ok(AngularMomentum::P),
            "d" => Ok(AngularMomentum::D),
            "f" => Ok(AngularMomentum::F),
            _ => Err(TbError::InvalidOrbitalProjection(label.to_string())),
        }
    }
    #[inline(always)]
    pub fn l(&self) -> usize {
        *self as usize
    }
    /// Number of magnetic sub-orbitals, $2l+1$.
    #[inline(always)]
    pub fn degeneracy(&self) -> usize {
        2 * self.l() + 1
    }
}

impl fmt::Display for AngularMomentum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AngularMomentum::S => "s",
            AngularMomentum::P => "p",
            AngularMomentum::D => "d",
            AngularMomentum::F => "f",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atom_type_order_follows_atomic_number() {
        let h = AtomType::from_symbol("H").unwrap();
        let c = AtomType::from_symbol("C").unwrap();
        let si: AtomType = "Si".parse().unwrap();
        assert_eq!(c.atomic_number(), 6);
        assert_eq!(si.atomic_number(), 14);
        assert!(h < c && c < si);
        assert_eq!(si.to_string(), "Si");
    }

    #[test]
    fn test_atom_type_rejects_unknown_symbol() {
        assert!(matches!(
            AtomType::from_symbol("Xx"),
            Err(TbError::InvalidAtomType(_))
        ));
        assert!(AtomType::from_atomic_number(0).is_err());
        assert_eq!(AtomType::from_atomic_number(88).unwrap().to_str(), "Ra");
    }

    #[test]
    fn test_atom_type_serde_uses_symbol() {
        let n = AtomType::from_symbol("N").unwrap();
        let s = serde_json::to_string(&n).unwrap();
        assert_eq!(s, "\"N\"");
        let back: AtomType = serde_json::from_str(&s).unwrap();
        assert_eq!(back, n);
        assert!(serde_json::from_str::<AtomType>("\"Qq\"").is_err());
    }

    #[test]
    fn test_angular_momentum_from_label() {
        assert_eq!(AngularMomentum::from_label("s").unwrap(), AngularMomentum::S);
        assert_eq!(AngularMomentum::from_label("2s").unwrap(), AngularMomentum::S);
        assert_eq!(AngularMomentum::from_label("s*").unwrap(), AngularMomentum::S);
        assert_eq!(AngularMomentum::from_label("3p").unwrap().l(), 1);
        assert_eq!(AngularMomentum::from_label("d").unwrap().degeneracy(), 5);
        assert!(AngularMomentum::from_label("sp").is_err());
        assert!(AngularMomentum::from_label("4").is_err());
    }
}
