use std::collections::HashMap;

use qfit_geom::Vec3;
use qfit_model::Atom;

use crate::residue::ResidueModel;
use crate::vdw::vdw_radius;

/// One receptor atom as seen by the clash detector: its position and
/// element, with its global index used only to test `exclude` pairs.
#[derive(Clone, Debug)]
struct ReceptorAtom {
    global_index: usize,
    pos: Vec3,
    element: String,
}

/// Steric clash check of a residue against its receptor environment
/// (SPEC_FULL §4.2). Receptor atoms are bucketed into a cubic spatial grid
/// of edge `2 * max_radius` so lookups are average O(1), the same bucketing
/// idiom `bioshell-ff`'s neighbor list uses for its own cutoff search.
pub struct ClashDetector {
    cell_size: f64,
    cells: HashMap<(i64, i64, i64), Vec<usize>>,
    receptor: Vec<ReceptorAtom>,
    exclude: Vec<(usize, usize)>,
}

impl ClashDetector {
    /// Builds a detector from the receptor atoms (the rest of the structure
    /// excluding the residue being fit), each tagged with its global atom
    /// index so `exclude` pairs — the N-C peptide bonds to the previous and
    /// next residue — can be honored.
    pub fn new(receptor_atoms: Vec<(usize, Atom)>, exclude: Vec<(usize, usize)>) -> ClashDetector {
        let max_radius = receptor_atoms
            .iter()
            .map(|(_, a)| vdw_radius(&a.element))
            .fold(1.8_f64, f64::max);
        let cell_size = max_radius * 2.0;

        let receptor: Vec<ReceptorAtom> = receptor_atoms
            .into_iter()
            .map(|(global_index, a)| ReceptorAtom { global_index, pos: a.pos, element: a.element })
            .collect();

        let mut cells: HashMap<(i64, i64, i64), Vec<usize>> = HashMap::new();
        for (i, atom) in receptor.iter().enumerate() {
            cells.entry(cell_of(&atom.pos, cell_size)).or_default().push(i);
        }

        ClashDetector { cell_size, cells, receptor, exclude }
    }

    /// Finds the peptide-bond exclusion pairs between `residue` and its
    /// immediate neighbors in sequence: an (N, C) pair closer than 2 Å is
    /// treated as a bonded linkage, not a clash (SPEC_FULL §4.2).
    pub fn peptide_bond_exclusions(
        residue_n_index: Option<usize>,
        residue_c_index: Option<usize>,
        prev_c: Option<(usize, &Atom)>,
        next_n: Option<(usize, &Atom)>,
        residue_atoms: &[Atom],
    ) -> Vec<(usize, usize)> {
        let mut exclude = Vec::new();
        if let (Some(n_idx), Some((prev_idx, prev_atom))) = (residue_n_index, prev_c) {
            if residue_atoms[n_idx].pos.distance_to(&prev_atom.pos) < 2.0 {
                exclude.push((n_idx, prev_idx));
            }
        }
        if let (Some(c_idx), Some((next_idx, next_atom))) = (residue_c_index, next_n) {
            if residue_atoms[c_idx].pos.distance_to(&next_atom.pos) < 2.0 {
                exclude.push((c_idx, next_idx));
            }
        }
        exclude
    }

    /// Returns `true` iff any unexcluded receptor atom lies within
    /// `scaling * (r_receptor + r_residue)` of an active residue atom.
    pub fn clashes(&self, residue: &ResidueModel, scaling: f64) -> bool {
        for (local_idx, atom) in residue.atoms().iter().enumerate() {
            if !residue.is_active(local_idx) {
                continue;
            }
            let r_res = vdw_radius(&atom.element);
            for bucket_cell in neighbor_cells(&atom.pos, self.cell_size) {
                let Some(indices) = self.cells.get(&bucket_cell) else { continue };
                for &ri in indices {
                    let receptor_atom = &self.receptor[ri];
                    if self.exclude.contains(&(local_idx, receptor_atom.global_index)) {
                        continue;
                    }
                    let threshold = scaling * (r_res + vdw_radius(&receptor_atom.element));
                    if atom.pos.distance_to(&receptor_atom.pos) < threshold {
                        return true;
                    }
                }
            }
        }
        false
    }
}

fn cell_of(pos: &Vec3, cell_size: f64) -> (i64, i64, i64) {
    ((pos.x / cell_size).floor() as i64, (pos.y / cell_size).floor() as i64, (pos.z / cell_size).floor() as i64)
}

fn neighbor_cells(pos: &Vec3, cell_size: f64) -> Vec<(i64, i64, i64)> {
    let (cx, cy, cz) = cell_of(pos, cell_size);
    let mut out = Vec::with_capacity(27);
    for dx in -1..=1 {
        for dy in -1..=1 {
            for dz in -1..=1 {
                out.push((cx + dx, cy + dy, cz + dz));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use qfit_model::RotamerLibrary;

    fn leucine_atoms() -> Vec<Atom> {
        let coords = [
            ("N", 0.0, 1.4, 0.0),
            ("CA", 0.0, 0.0, 0.0),
            ("C", 1.4, -0.3, 0.4),
            ("O", 1.8, -1.4, 0.4),
            ("CB", -0.8, -0.6, -1.2),
            ("CG", -2.3, -0.5, -1.1),
            ("CD1", -2.9, -1.2, -2.3),
            ("CD2", -2.8, 0.9, -1.0),
        ];
        coords.iter().map(|(name, x, y, z)| Atom::new(name, "LEU", "A", 5, Vec3::new(*x, *y, *z))).collect()
    }

    #[test]
    fn detects_a_nearby_receptor_atom() {
        let rotamer = RotamerLibrary::get("LEU").unwrap();
        let residue = ResidueModel::new("A/5", leucine_atoms(), rotamer).unwrap();
        let clashing_neighbor = Atom::new("CA", "ALA", "A", 6, Vec3::new(-2.2, -0.4, -1.0));
        let detector = ClashDetector::new(vec![(100, clashing_neighbor)], Vec::new());
        assert!(detector.clashes(&residue, 0.80));
    }

    #[test]
    fn excluded_pair_does_not_count_as_a_clash() {
        let rotamer = RotamerLibrary::get("LEU").unwrap();
        let residue = ResidueModel::new("A/5", leucine_atoms(), rotamer).unwrap();
        let cg_index = 5; // CG in leucine_atoms() ordering
        let neighbor = Atom::new("CA", "ALA", "A", 6, Vec3::new(-2.2, -0.4, -1.0));
        let detector = ClashDetector::new(vec![(100, neighbor)], vec![(cg_index, 100)]);
        assert!(!detector.clashes(&residue, 0.80));
    }

    #[test]
    fn distant_receptor_atom_is_not_a_clash() {
        let rotamer = RotamerLibrary::get("LEU").unwrap();
        let residue = ResidueModel::new("A/5", leucine_atoms(), rotamer).unwrap();
        let far_away = Atom::new("CA", "ALA", "A", 50, Vec3::new(100.0, 100.0, 100.0));
        let detector = ClashDetector::new(vec![(200, far_away)], Vec::new());
        assert!(!detector.clashes(&residue, 0.80));
    }
}
