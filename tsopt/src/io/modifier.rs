//! Geometry modification for requested coordinate changes.
//!
//! [`CartesianModifier`] moves rigid fragments: for every change it cuts the
//! defining bond, finds the atoms on the far side through the bond matrix and
//! translates or rotates them until the coordinate reaches its target.

use anyhow::Result;
use nalgebra::{Rotation3, Unit, Vector3};
use tracing::{debug, warn};

use crate::core::constraints::{Change, CoordinateKind};
use crate::core::geometry::{Geometry, Species, fragment, perceive_bonds};

const BOND_TOLERANCE: f64 = 1e-3;
const ANGLE_TOLERANCE_DEG: f64 = 0.1;
const MAX_PASSES: usize = 10;

/// Geometry after applying changes, and whether every target was reached.
#[derive(Debug, Clone, PartialEq)]
pub struct ModifiedGeometry {
    pub success: bool,
    pub geometry: Geometry,
}

/// Applies coordinate changes consistently with the bond topology.
pub trait GeometryModifier {
    /// `changes` are 0-based. `bonds` is the species' bond matrix.
    fn modify_coordinates(
        &self,
        species: &Species,
        name: &str,
        geom: &Geometry,
        changes: &[Change],
        bonds: &[Vec<u8>],
    ) -> Result<ModifiedGeometry>;
}

/// Rigid-fragment modifier working directly on Cartesian coordinates.
#[derive(Debug, Clone, Copy, Default)]
pub struct CartesianModifier;

impl GeometryModifier for CartesianModifier {
    fn modify_coordinates(
        &self,
        species: &Species,
        name: &str,
        geom: &Geometry,
        changes: &[Change],
        bonds: &[Vec<u8>],
    ) -> Result<ModifiedGeometry> {
        let perceived;
        let bonds = if bonds.is_empty() {
            perceived = perceive_bonds(&species.atom, geom);
            perceived.as_slice()
        } else {
            bonds
        };

        let mut coords: Vec<Vector3<f64>> = geom
            .points()
            .iter()
            .map(|p| Vector3::new(p[0], p[1], p[2]))
            .collect();

        // Changes can disturb each other when fragments overlap, so sweep
        // until all hold or the pass budget runs out.
        let mut success = false;
        for pass in 0..MAX_PASSES {
            for change in changes {
                apply_change(&mut coords, bonds, change)?;
            }
            if changes.iter().all(|c| is_satisfied(&coords, c)) {
                debug!(name, passes = pass + 1, "coordinate changes applied");
                success = true;
                break;
            }
        }
        if !success {
            warn!(name, "coordinate changes did not converge");
        }

        let geometry = Geometry::new(coords.iter().map(|v| [v.x, v.y, v.z]).collect());
        Ok(ModifiedGeometry { success, geometry })
    }
}

fn apply_change(coords: &mut [Vector3<f64>], bonds: &[Vec<u8>], change: &Change) -> Result<()> {
    let atoms = change.coordinate.atoms();
    match change.coordinate.kind()? {
        CoordinateKind::Bond => {
            let (i, j) = (atoms[0], atoms[1]);
            let moving = moving_fragment(bonds, j, i, j);
            let axis = coords[j] - coords[i];
            let length = axis.norm();
            if length < 1e-8 {
                return Ok(());
            }
            let shift = axis / length * (change.target - length);
            for &a in &moving {
                coords[a] += shift;
            }
        }
        CoordinateKind::Angle => {
            let (i, j, k) = (atoms[0], atoms[1], atoms[2]);
            let moving = moving_fragment(bonds, k, j, k);
            let current = angle(coords, i, j, k);
            let normal = (coords[i] - coords[j]).cross(&(coords[k] - coords[j]));
            let normal = if normal.norm() < 1e-8 {
                any_perpendicular(&(coords[k] - coords[j]))
            } else {
                normal
            };
            let delta = (change.target - current).to_radians();
            let pivot = coords[j];
            rotate(coords, &moving, pivot, normal, delta);
        }
        CoordinateKind::Dihedral => {
            let (i, j, k, l) = (atoms[0], atoms[1], atoms[2], atoms[3]);
            let moving = moving_fragment(bonds, k, j, l);
            let axis = coords[k] - coords[j];
            if axis.norm() < 1e-8 {
                return Ok(());
            }
            let delta = wrap_degrees(change.target - dihedral(coords, i, j, k, l));
            let pivot = coords[k];
            rotate(coords, &moving, pivot, axis, delta.to_radians());
            // Undo and go the other way if the sign convention disagreed.
            let after = wrap_degrees(change.target - dihedral(coords, i, j, k, l)).abs();
            if after > ANGLE_TOLERANCE_DEG {
                rotate(coords, &moving, pivot, axis, -2.0 * delta.to_radians());
            }
        }
    }
    Ok(())
}

/// Atoms to move for a change: the side of `start` once the `anchor`-`start`
/// bond is cut. Ring bonds fall back to moving `single` alone.
fn moving_fragment(bonds: &[Vec<u8>], start: usize, anchor: usize, single: usize) -> Vec<usize> {
    let side = fragment(bonds, start, (anchor, start));
    if side.contains(&anchor) {
        return vec![single];
    }
    side
}

fn rotate(
    coords: &mut [Vector3<f64>],
    atoms: &[usize],
    pivot: Vector3<f64>,
    axis: Vector3<f64>,
    radians: f64,
) {
    let rotation = Rotation3::from_axis_angle(&Unit::new_normalize(axis), radians);
    for &a in atoms {
        coords[a] = pivot + rotation * (coords[a] - pivot);
    }
}

fn any_perpendicular(v: &Vector3<f64>) -> Vector3<f64> {
    let trial = if v.x.abs() < 0.9 {
        Vector3::x()
    } else {
        Vector3::y()
    };
    v.cross(&trial)
}

fn is_satisfied(coords: &[Vector3<f64>], change: &Change) -> bool {
    let atoms = change.coordinate.atoms();
    match change.coordinate.kind() {
        Ok(CoordinateKind::Bond) => {
            ((coords[atoms[1]] - coords[atoms[0]]).norm() - change.target).abs() < BOND_TOLERANCE
        }
        Ok(CoordinateKind::Angle) => {
            (angle(coords, atoms[0], atoms[1], atoms[2]) - change.target).abs()
                < ANGLE_TOLERANCE_DEG
        }
        Ok(CoordinateKind::Dihedral) => {
            let current = dihedral(coords, atoms[0], atoms[1], atoms[2], atoms[3]);
            wrap_degrees(current - change.target).abs() < ANGLE_TOLERANCE_DEG
        }
        Err(_) => false,
    }
}

/// Bond angle `i-j-k` in degrees.
pub fn angle(coords: &[Vector3<f64>], i: usize, j: usize, k: usize) -> f64 {
    let a = coords[i] - coords[j];
    let b = coords[k] - coords[j];
    let cos = (a.dot(&b) / (a.norm() * b.norm())).clamp(-1.0, 1.0);
    cos.acos().to_degrees()
}

/// Dihedral angle `i-j-k-l` in degrees, in (-180, 180].
pub fn dihedral(coords: &[Vector3<f64>], i: usize, j: usize, k: usize, l: usize) -> f64 {
    let b1 = coords[j] - coords[i];
    let b2 = coords[k] - coords[j];
    let b3 = coords[l] - coords[k];
    let n1 = b1.cross(&b2);
    let n2 = b2.cross(&b3);
    let y = b2.norm() * b1.dot(&n2);
    let x = n1.dot(&n2);
    y.atan2(x).to_degrees()
}

fn wrap_degrees(deg: f64) -> f64 {
    let mut d = deg % 360.0;
    if d > 180.0 {
        d -= 360.0;
    } else if d <= -180.0 {
        d += 360.0;
    }
    d
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Planar zig-zag C0-C1-C2-C3 with an H on C3.
    fn butane_like() -> Species {
        let mut species = Species {
            chemid: "c4h".to_string(),
            atom: ["C", "C", "C", "C", "H"].map(String::from).to_vec(),
            geom: Geometry::new(vec![
                [0.0, 0.0, 0.0],
                [1.5, 0.0, 0.0],
                [2.0, 1.4, 0.0],
                [3.5, 1.4, 0.0],
                [4.1, 2.3, 0.0],
            ]),
            mult: 1,
            charge: 0,
            bond: Vec::new(),
        };
        species.ensure_bonds();
        species
    }

    fn vectors(geom: &Geometry) -> Vec<Vector3<f64>> {
        geom.points()
            .iter()
            .map(|p| Vector3::new(p[0], p[1], p[2]))
            .collect()
    }

    #[test]
    fn bond_change_moves_far_fragment_only() {
        let species = butane_like();
        let out = CartesianModifier
            .modify_coordinates(
                &species,
                "rxn",
                &species.geom,
                &[Change::new(vec![2, 3], 1.9)],
                &species.bond,
            )
            .expect("modify");
        assert!(out.success);
        assert!((out.geometry.distance(2, 3) - 1.9).abs() < BOND_TOLERANCE);
        // C0..C2 untouched, C3 and its H moved rigidly.
        for atom in 0..3 {
            assert_eq!(out.geometry.point(atom), species.geom.point(atom));
        }
        assert!((out.geometry.distance(3, 4) - species.geom.distance(3, 4)).abs() < 1e-9);
    }

    #[test]
    fn angle_change_reaches_target() {
        let species = butane_like();
        let out = CartesianModifier
            .modify_coordinates(
                &species,
                "rxn",
                &species.geom,
                &[Change::new(vec![0, 1, 2], 100.0)],
                &species.bond,
            )
            .expect("modify");
        assert!(out.success);
        let coords = vectors(&out.geometry);
        assert!((angle(&coords, 0, 1, 2) - 100.0).abs() < ANGLE_TOLERANCE_DEG);
    }

    #[test]
    fn dihedral_change_reaches_target() {
        let species = butane_like();
        let out = CartesianModifier
            .modify_coordinates(
                &species,
                "rxn",
                &species.geom,
                &[Change::new(vec![0, 1, 2, 3], 60.0)],
                &species.bond,
            )
            .expect("modify");
        assert!(out.success);
        let coords = vectors(&out.geometry);
        assert!(wrap_degrees(dihedral(&coords, 0, 1, 2, 3) - 60.0).abs() < ANGLE_TOLERANCE_DEG);
    }

    #[test]
    fn empty_bond_matrix_is_perceived() {
        let mut species = butane_like();
        species.bond.clear();
        let out = CartesianModifier
            .modify_coordinates(
                &species,
                "rxn",
                &species.geom,
                &[Change::new(vec![0, 1], 1.3)],
                &[],
            )
            .expect("modify");
        assert!(out.success);
        assert!((out.geometry.distance(0, 1) - 1.3).abs() < BOND_TOLERANCE);
    }
}
