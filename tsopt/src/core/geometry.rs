//! Cartesian geometry, species description and log snapshots.
//!
//! Coordinates are in Angstrom, one `[x, y, z]` triple per atom, in the same
//! order as the species' atom list.

use std::collections::VecDeque;
use std::fmt::Write as _;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

/// Ordered Cartesian coordinates, one point per atom.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Geometry(Vec<[f64; 3]>);

impl Geometry {
    pub fn new(points: Vec<[f64; 3]>) -> Self {
        Self(points)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn points(&self) -> &[[f64; 3]] {
        &self.0
    }

    pub fn point(&self, index: usize) -> [f64; 3] {
        self.0[index]
    }

    /// Whether every coordinate is a finite number.
    pub fn is_finite(&self) -> bool {
        self.0.iter().flatten().all(|c| c.is_finite())
    }

    /// Distance between two atoms.
    pub fn distance(&self, a: usize, b: usize) -> f64 {
        let (pa, pb) = (self.0[a], self.0[b]);
        ((pa[0] - pb[0]).powi(2) + (pa[1] - pb[1]).powi(2) + (pa[2] - pb[2]).powi(2)).sqrt()
    }
}

/// The chemical species a reaction instance is searched on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Species {
    /// Content-based identifier used to tag log records.
    pub chemid: String,
    /// Element symbols, one per atom.
    pub atom: Vec<String>,
    /// Base geometry (used at step 0).
    pub geom: Geometry,
    #[serde(default = "default_mult")]
    pub mult: u32,
    #[serde(default)]
    pub charge: i32,
    /// Bond-order matrix (`natom x natom`). Perceived from the geometry when
    /// left empty.
    #[serde(default)]
    pub bond: Vec<Vec<u8>>,
}

fn default_mult() -> u32 {
    1
}

impl Species {
    pub fn natom(&self) -> usize {
        self.atom.len()
    }

    /// Check that the geometry and bond matrix agree with the atom list.
    pub fn validate(&self) -> Result<()> {
        if self.atom.is_empty() {
            return Err(anyhow!("species {} has no atoms", self.chemid));
        }
        if self.geom.len() != self.natom() {
            return Err(anyhow!(
                "species {} has {} atoms but {} coordinates",
                self.chemid,
                self.natom(),
                self.geom.len()
            ));
        }
        if self.mult == 0 {
            return Err(anyhow!("species {} multiplicity must be >= 1", self.chemid));
        }
        if !self.bond.is_empty()
            && (self.bond.len() != self.natom()
                || self.bond.iter().any(|row| row.len() != self.natom()))
        {
            return Err(anyhow!(
                "species {} bond matrix must be {n}x{n}",
                self.chemid,
                n = self.natom()
            ));
        }
        Ok(())
    }

    /// Fill in the bond matrix from covalent radii if it was not provided.
    pub fn ensure_bonds(&mut self) {
        if self.bond.is_empty() {
            self.bond = perceive_bonds(&self.atom, &self.geom);
        }
    }
}

/// Atoms reachable from `start` over the bond matrix without crossing the
/// `cut` bond.
///
/// `start` is always included. If the cut bond is part of a ring the result
/// also contains the other end of the cut bond.
pub fn fragment(bond: &[Vec<u8>], start: usize, cut: (usize, usize)) -> Vec<usize> {
    let mut seen = vec![false; bond.len()];
    let mut queue = VecDeque::from([start]);
    seen[start] = true;
    let mut out = Vec::new();
    while let Some(i) = queue.pop_front() {
        out.push(i);
        for (j, order) in bond[i].iter().enumerate() {
            if *order == 0 || seen[j] || is_cut(i, j, cut) {
                continue;
            }
            seen[j] = true;
            queue.push_back(j);
        }
    }
    out.sort_unstable();
    out
}

fn is_cut(i: usize, j: usize, cut: (usize, usize)) -> bool {
    (i, j) == cut || (j, i) == cut
}

/// Covalent radius in Angstrom.
fn covalent_radius(symbol: &str) -> f64 {
    match symbol {
        "H" => 0.31,
        "C" => 0.76,
        "N" => 0.71,
        "O" => 0.66,
        "F" => 0.57,
        "Si" => 1.11,
        "P" => 1.07,
        "S" => 1.05,
        "Cl" => 1.02,
        "Br" => 1.20,
        "I" => 1.39,
        _ => 1.50,
    }
}

/// Single-bond matrix from interatomic distances (within 1.2x the summed
/// covalent radii).
pub fn perceive_bonds(atom: &[String], geom: &Geometry) -> Vec<Vec<u8>> {
    let n = atom.len();
    let mut bond = vec![vec![0u8; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let limit = 1.2 * (covalent_radius(&atom[i]) + covalent_radius(&atom[j]));
            if geom.distance(i, j) < limit {
                bond[i][j] = 1;
                bond[j][i] = 1;
            }
        }
    }
    bond
}

/// Render one geometry record for the geometry log.
///
/// ```text
/// 3
/// Original Geom, chemid: 180010000000000000002
/// O 0.000000 0.000000 0.000000
/// H 0.757000 0.586000 0.000000
/// H -0.757000 0.586000 0.000000
/// ```
pub fn snapshot(label: &str, chemid: &str, atom: &[String], geom: &Geometry) -> String {
    let mut buf = String::new();
    let _ = writeln!(buf, "{}", atom.len());
    let _ = writeln!(buf, "{label}, chemid: {chemid}");
    for (symbol, [x, y, z]) in atom.iter().zip(geom.points()) {
        let _ = writeln!(buf, "{symbol} {x:.6} {y:.6} {z:.6}");
    }
    buf
}
