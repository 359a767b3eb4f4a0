//! Coordinate-level constraints for a single search step.
//!
//! Solvers speak 1-based atom indices; everything downstream of
//! [`ConstraintSet::to_zero_based`] is 0-based.

use anyhow::{Result, anyhow};
use serde::de::Error as _;
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Internal coordinate defined by 2 (bond), 3 (angle) or 4 (dihedral) atoms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Coordinate(Vec<usize>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinateKind {
    Bond,
    Angle,
    Dihedral,
}

impl Coordinate {
    pub fn new(atoms: Vec<usize>) -> Self {
        Self(atoms)
    }

    pub fn atoms(&self) -> &[usize] {
        &self.0
    }

    pub fn kind(&self) -> Result<CoordinateKind> {
        match self.0.len() {
            2 => Ok(CoordinateKind::Bond),
            3 => Ok(CoordinateKind::Angle),
            4 => Ok(CoordinateKind::Dihedral),
            n => Err(anyhow!("coordinate {:?} has {n} atoms (expected 2-4)", self.0)),
        }
    }

    /// Shift 1-based indices down by one. Every atom may appear only once.
    pub fn to_zero_based(&self) -> Result<Self> {
        self.kind()?;
        if let Some((pos, dup)) = self
            .0
            .iter()
            .enumerate()
            .find(|(pos, atom)| self.0[..*pos].contains(atom))
        {
            return Err(anyhow!(
                "coordinate {:?} repeats atom {dup} at position {pos}",
                self.0
            ));
        }
        let atoms = self
            .0
            .iter()
            .map(|&i| {
                i.checked_sub(1)
                    .ok_or_else(|| anyhow!("coordinate {:?} uses index 0 (indices are 1-based)", self.0))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self(atoms))
    }

    fn check_bounds(&self, natom: usize) -> Result<()> {
        if let Some(bad) = self.0.iter().find(|&&i| i >= natom) {
            return Err(anyhow!(
                "coordinate {:?} references atom {bad} but the species has {natom} atoms",
                self.0
            ));
        }
        Ok(())
    }
}

/// Coordinate to drive to a target value (Angstrom for bonds, degrees
/// otherwise).
///
/// Serialized as a flat list: the atom indices followed by the target, e.g.
/// `[2, 3, 1.4]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub coordinate: Coordinate,
    pub target: f64,
}

impl Change {
    pub fn new(atoms: Vec<usize>, target: f64) -> Self {
        Self {
            coordinate: Coordinate::new(atoms),
            target,
        }
    }

    pub fn to_zero_based(&self) -> Result<Self> {
        Ok(Self {
            coordinate: self.coordinate.to_zero_based()?,
            target: self.target,
        })
    }
}

impl Serialize for Change {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let atoms = self.coordinate.atoms();
        let mut seq = serializer.serialize_seq(Some(atoms.len() + 1))?;
        for atom in atoms {
            seq.serialize_element(atom)?;
        }
        seq.serialize_element(&self.target)?;
        seq.end()
    }
}

impl<'de> Deserialize<'de> for Change {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Vec::<f64>::deserialize(deserializer)?;
        let Some((&target, indices)) = raw.split_last() else {
            return Err(D::Error::custom("change entry must not be empty"));
        };
        let atoms = indices
            .iter()
            .map(|&v| {
                if v >= 0.0 && v.fract() == 0.0 {
                    Ok(v as usize)
                } else {
                    Err(D::Error::custom(format!(
                        "change index {v} is not a non-negative integer"
                    )))
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(atoms, target))
    }
}

/// Fix/change/release lists for one step.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConstraintSet {
    #[serde(default)]
    pub fix: Vec<Coordinate>,
    #[serde(default)]
    pub change: Vec<Change>,
    #[serde(default)]
    pub release: Vec<Coordinate>,
}

impl ConstraintSet {
    /// Convert every list from 1-based to 0-based indices and check them
    /// against the atom count.
    pub fn to_zero_based(&self, natom: usize) -> Result<Self> {
        let fix = self
            .fix
            .iter()
            .map(Coordinate::to_zero_based)
            .collect::<Result<Vec<_>>>()?;
        let change = self
            .change
            .iter()
            .map(Change::to_zero_based)
            .collect::<Result<Vec<_>>>()?;
        let release = self
            .release
            .iter()
            .map(Coordinate::to_zero_based)
            .collect::<Result<Vec<_>>>()?;

        for coordinate in fix
            .iter()
            .chain(change.iter().map(|c| &c.coordinate))
            .chain(release.iter())
        {
            coordinate.check_bounds(natom)?;
        }
        Ok(Self {
            fix,
            change,
            release,
        })
    }

    /// Lock every changed coordinate at its new value.
    ///
    /// Each `change` coordinate moves into `fix` (once) and `change` is left
    /// empty.
    pub fn lock_changes(&mut self) {
        for change in self.change.drain(..) {
            if !self.fix.contains(&change.coordinate) {
                self.fix.push(change.coordinate);
            }
        }
    }
}

/// Solver answer for a requested step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepConstraints {
    /// Step the solver settled on; never below the requested step.
    pub step: u32,
    pub set: ConstraintSet,
}
