use std::collections::{HashMap, HashSet, VecDeque};

use qfit_geom::{dihedral_angle4, Vec3};
use qfit_model::{Atom, RotamerLibraryEntry};

use crate::error::FitError;
use crate::vdw::vdw_radius;

/// A mutable atomic model of one residue being fit (SPEC_FULL §3/§4.1):
/// coordinates, the active mask, and the internal clash mask, all indexed
/// by the atom's position in `atoms`.
#[derive(Clone, Debug)]
pub struct ResidueModel {
    residue_id: String,
    atoms: Vec<Atom>,
    rotamer: &'static RotamerLibraryEntry,
    name_to_index: HashMap<String, usize>,
    bond_graph: Vec<Vec<usize>>,
    active: Vec<bool>,
    /// Atoms permanently excluded from clash/density consideration
    /// (SPEC_FULL §6 `exclude_atoms`): never activated by
    /// [`ResidueModel::activate_all`], regardless of chi iteration.
    excluded: Vec<bool>,
    /// `clash_mask[i][j] == true` means the pair (i, j) is eligible for a
    /// clash check: both active and not bonded within 1-4.
    clash_mask: Vec<Vec<bool>>,
}

impl ResidueModel {
    /// Builds a model from the residue's atoms and its rotamer library
    /// entry, checking every atom the library's chi definitions and
    /// chi-rotate lists name is actually present.
    ///
    /// # Errors
    /// Returns [`FitError::StructureIncomplete`] if any named atom is
    /// missing (SPEC_FULL §8 "S6").
    pub fn new(residue_id: &str, atoms: Vec<Atom>, rotamer: &'static RotamerLibraryEntry) -> Result<Self, FitError> {
        let mut name_to_index = HashMap::with_capacity(atoms.len());
        for (i, atom) in atoms.iter().enumerate() {
            name_to_index.insert(atom.name.clone(), i);
        }

        let mut required: HashSet<&str> = HashSet::new();
        for i in 1..=rotamer.nchi() {
            for name in rotamer.chi_atoms(i) {
                required.insert(name.as_str());
            }
            for name in rotamer.chi_rotate_atoms(i) {
                required.insert(name.as_str());
            }
        }
        for name in required {
            if !name_to_index.contains_key(name) {
                return Err(FitError::StructureIncomplete { residue_id: residue_id.to_string() });
            }
        }

        let bond_graph = build_bond_graph(atoms.len(), &name_to_index, rotamer);
        let active = vec![true; atoms.len()];
        let excluded = vec![false; atoms.len()];
        let mut model = ResidueModel {
            residue_id: residue_id.to_string(),
            atoms,
            rotamer,
            name_to_index,
            bond_graph,
            active,
            excluded,
            clash_mask: Vec::new(),
        };
        model.update_clash_mask();
        Ok(model)
    }

    /// Permanently excludes the named atoms from clash/density
    /// consideration (SPEC_FULL §6 `exclude_atoms`): from this call on,
    /// [`ResidueModel::activate_all`] never reactivates them. Unknown names
    /// are ignored. Rebuilds the clash mask.
    pub fn exclude_atoms(&mut self, names: &[String]) {
        for name in names {
            if let Some(&idx) = self.name_to_index.get(name) {
                self.excluded[idx] = true;
                self.active[idx] = false;
            }
        }
        self.update_clash_mask();
    }

    pub fn residue_id(&self) -> &str {
        &self.residue_id
    }

    pub fn nchi(&self) -> usize {
        self.rotamer.nchi()
    }

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    pub fn coords(&self) -> Vec<Vec3> {
        self.atoms.iter().map(|a| a.pos.clone()).collect()
    }

    /// Replaces all coordinates at once, e.g. when adopting a candidate
    /// from the fitter's coordinate set.
    pub fn set_coords(&mut self, coords: &[Vec3]) {
        assert_eq!(coords.len(), self.atoms.len());
        for (atom, c) in self.atoms.iter_mut().zip(coords.iter()) {
            atom.pos = c.clone();
        }
    }

    fn index_of(&self, name: &str) -> usize {
        *self.name_to_index.get(name).expect("atom name checked present at construction")
    }

    /// Dihedral angle, in degrees, for chi index `i` in `[1, nchi()]`.
    pub fn get_chi(&self, i: usize) -> f64 {
        let quad = self.rotamer.chi_atoms(i);
        let p: Vec<&Vec3> = quad.iter().map(|n| &self.atoms[self.index_of(n)].pos).collect();
        dihedral_angle4(p[0], p[1], p[2], p[3]).to_degrees()
    }

    /// Rotates the atoms named in `chi_rotate[i]` about the bond between
    /// atoms 2 and 3 of chi `i`'s definition so that `get_chi(i) == theta`
    /// (SPEC_FULL §4.1).
    pub fn set_chi(&mut self, i: usize, theta_deg: f64) {
        let quad = self.rotamer.chi_atoms(i).clone();
        let current = self.get_chi(i);
        let mut delta = theta_deg - current;
        delta = ((delta + 180.0).rem_euclid(360.0)) - 180.0;

        let axis_origin = self.atoms[self.index_of(&quad[1])].pos.clone();
        let axis_end = self.atoms[self.index_of(&quad[2])].pos.clone();
        let axis = Vec3::new(axis_end.x - axis_origin.x, axis_end.y - axis_origin.y, axis_end.z - axis_origin.z);

        let moving: Vec<usize> = self.rotamer.chi_rotate_atoms(i).iter().map(|n| self.index_of(n)).collect();
        let delta_rad = delta.to_radians();
        for idx in moving {
            let rotated = self.atoms[idx].pos.rotated_about_axis(&axis_origin, &axis, delta_rad);
            self.atoms[idx].pos = rotated;
        }
    }

    /// Marks every atom active (start of a chi iteration, SPEC_FULL §4.5
    /// step 2a), then rebuilds the clash mask.
    pub fn activate_all(&mut self) {
        for i in 0..self.active.len() {
            self.active[i] = !self.excluded[i];
        }
        self.update_clash_mask();
    }

    /// Deactivates the named atoms (controlled by not-yet-fit dihedrals)
    /// and rebuilds the clash mask.
    pub fn deactivate(&mut self, names: &[String]) {
        for name in names {
            if let Some(&idx) = self.name_to_index.get(name) {
                self.active[idx] = false;
            }
        }
        self.update_clash_mask();
    }

    pub fn is_active(&self, index: usize) -> bool {
        self.active[index]
    }

    pub fn active_indices(&self) -> Vec<usize> {
        (0..self.atoms.len()).filter(|&i| self.active[i]).collect()
    }

    /// Rebuilds the symmetric clash mask from the current active set and
    /// the bond graph, excluding self pairs and 1-2/1-3/1-4 bonded
    /// neighbors (SPEC_FULL §4.1). Idempotent: calling it twice in a row
    /// yields an identical mask (SPEC_FULL §8 invariant 6).
    pub fn update_clash_mask(&mut self) {
        let n = self.atoms.len();
        let mut mask = vec![vec![false; n]; n];
        for i in 0..n {
            if !self.active[i] {
                continue;
            }
            let bonded_within_4 = bonded_neighbors_within(&self.bond_graph, i, 3);
            for j in 0..n {
                if i == j || !self.active[j] {
                    continue;
                }
                if bonded_within_4.contains(&j) {
                    continue;
                }
                mask[i][j] = true;
            }
        }
        self.clash_mask = mask;
    }

    /// Count of internally clashing active atom pairs (SPEC_FULL §4.1):
    /// `clash_mask[a][b]` and `dist(a,b) < scaling * (r_a + r_b)`.
    pub fn clashes(&self, clash_scaling_factor: f64) -> usize {
        let n = self.atoms.len();
        let mut count = 0;
        for i in 0..n {
            for j in (i + 1)..n {
                if !self.clash_mask[i][j] {
                    continue;
                }
                let d = self.atoms[i].pos.distance_to(&self.atoms[j].pos);
                let threshold = clash_scaling_factor * (vdw_radius(&self.atoms[i].element) + vdw_radius(&self.atoms[j].element));
                if d < threshold {
                    count += 1;
                }
            }
        }
        count
    }
}

fn build_bond_graph(n_atoms: usize, name_to_index: &HashMap<String, usize>, rotamer: &RotamerLibraryEntry) -> Vec<Vec<usize>> {
    let mut graph = vec![Vec::new(); n_atoms];
    for (a, b) in rotamer.bonds() {
        if let (Some(&i), Some(&j)) = (name_to_index.get(a), name_to_index.get(b)) {
            graph[i].push(j);
            graph[j].push(i);
        }
    }
    graph
}

/// BFS over the bond graph, returning every atom within `max_depth` bonds
/// of `start` (excluding `start` itself).
fn bonded_neighbors_within(graph: &[Vec<usize>], start: usize, max_depth: usize) -> HashSet<usize> {
    let mut visited = HashSet::new();
    let mut queue = VecDeque::new();
    queue.push_back((start, 0usize));
    visited.insert(start);
    let mut result = HashSet::new();
    while let Some((node, depth)) = queue.pop_front() {
        if depth >= max_depth {
            continue;
        }
        for &next in &graph[node] {
            if visited.insert(next) {
                result.insert(next);
                queue.push_back((next, depth + 1));
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use qfit_model::RotamerLibrary;

    fn leucine_atoms() -> Vec<Atom> {
        // A roughly extended leucine sidechain; exact geometry doesn't
        // matter for these tests beyond being non-degenerate.
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
    fn set_chi_then_get_chi_round_trips() {
        let rotamer = RotamerLibrary::get("LEU").unwrap();
        let mut model = ResidueModel::new("A/5", leucine_atoms(), rotamer).unwrap();
        model.set_chi(1, 123.0);
        let got = model.get_chi(1);
        let diff = ((got - 123.0 + 180.0).rem_euclid(360.0)) - 180.0;
        assert!(diff.abs() < 1e-6, "got chi1={}", got);
    }

    #[test]
    fn set_chi_leaves_backbone_untouched() {
        let rotamer = RotamerLibrary::get("LEU").unwrap();
        let mut model = ResidueModel::new("A/5", leucine_atoms(), rotamer).unwrap();
        let before_n = model.atoms()[0].pos.clone();
        let before_ca = model.atoms()[1].pos.clone();
        model.set_chi(1, -45.0);
        assert!(model.atoms()[0].pos.distance_to(&before_n) < 1e-9);
        assert!(model.atoms()[1].pos.distance_to(&before_ca) < 1e-9);
    }

    #[test]
    fn update_clash_mask_is_idempotent() {
        let rotamer = RotamerLibrary::get("LEU").unwrap();
        let mut model = ResidueModel::new("A/5", leucine_atoms(), rotamer).unwrap();
        model.update_clash_mask();
        let first = model.clash_mask.clone();
        model.update_clash_mask();
        assert_eq!(first, model.clash_mask);
    }

    #[test]
    fn bonded_1_to_4_pairs_are_excluded_from_clash_mask() {
        let rotamer = RotamerLibrary::get("LEU").unwrap();
        let model = ResidueModel::new("A/5", leucine_atoms(), rotamer).unwrap();
        let n_idx = model.index_of("N");
        let cb_idx = model.index_of("CB");
        // N-CA-CB-CG would put N and CG at 1-4; N and CB are 1-3.
        assert!(!model.clash_mask[n_idx][cb_idx]);
    }

    #[test]
    fn excluded_atom_stays_inactive_through_activate_all() {
        let rotamer = RotamerLibrary::get("LEU").unwrap();
        let mut model = ResidueModel::new("A/5", leucine_atoms(), rotamer).unwrap();
        let o_idx = model.index_of("O");
        model.exclude_atoms(&["O".to_string()]);
        assert!(!model.is_active(o_idx));
        model.activate_all();
        assert!(!model.is_active(o_idx));
        assert!(model.is_active(model.index_of("CA")));
    }

    #[test]
    fn missing_required_atom_is_rejected() {
        let rotamer = RotamerLibrary::get("LEU").unwrap();
        let mut atoms = leucine_atoms();
        atoms.retain(|a| a.name != "CG");
        let result = ResidueModel::new("A/5", atoms, rotamer);
        assert!(matches!(result, Err(FitError::StructureIncomplete { .. })));
    }
}
