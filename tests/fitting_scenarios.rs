//! End-to-end fitting scenarios against synthetic density maps.

use std::fs;
use std::path::PathBuf;

use approx::assert_relative_eq;
use qfit_core::{
    dihedral_angle4, Atom, ClashDetector, DensityGrid, DensityTransformer, FitError, FitterConfig,
    ResidueModel, RotamerLibrary, RotamericFitter, ScatteringTable, UnitCell, Vec3,
};

fn leucine_base(res_seq: i32) -> Vec<Atom> {
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
    coords.iter().map(|(n, x, y, z)| Atom::new(n, "LEU", "A", res_seq, Vec3::new(*x, *y, *z))).collect()
}

fn leucine_at(chi1: f64, chi2: f64, res_seq: i32) -> Vec<Atom> {
    let rotamer = RotamerLibrary::get("LEU").unwrap();
    let mut model = ResidueModel::new("A/test", leucine_base(res_seq), rotamer).unwrap();
    model.set_chi(1, chi1);
    model.set_chi(2, chi2);
    model.atoms().to_vec()
}

fn coords_chi1(coords: &[Vec3]) -> f64 {
    dihedral_angle4(&coords[0], &coords[1], &coords[4], &coords[5]).to_degrees()
}

#[test]
fn coords_chi1_helper_agrees_with_the_angle_set_chi_was_given() {
    let atoms = leucine_at(-60.0, 170.0, 99);
    let coords: Vec<Vec3> = atoms.iter().map(|a| a.pos.clone()).collect();
    assert_relative_eq!(coords_chi1(&coords), -60.0, epsilon = 1e-6);
}

fn lysine_base(res_seq: i32) -> Vec<Atom> {
    let coords = [
        ("N", 0.0, 1.4, 0.0),
        ("CA", 0.0, 0.0, 0.0),
        ("C", 1.4, -0.3, 0.4),
        ("O", 1.8, -1.4, 0.4),
        ("CB", -0.8, -0.6, -1.2),
        ("CG", -2.3, -0.5, -1.1),
        ("CD", -3.0, -1.3, -1.0),
        ("CE", -4.4, -1.2, -1.6),
        ("NZ", -5.1, -2.4, -1.1),
    ];
    coords.iter().map(|(n, x, y, z)| Atom::new(n, "LYS", "A", res_seq, Vec3::new(*x, *y, *z))).collect()
}

fn serine_base(res_seq: i32) -> Vec<Atom> {
    let coords = [
        ("N", 0.0, 1.4, 0.0),
        ("CA", 0.0, 0.0, 0.0),
        ("C", 1.4, -0.3, 0.4),
        ("O", 1.8, -1.4, 0.4),
        ("CB", -0.8, -0.6, -1.2),
        ("OG", -2.1, -0.4, -1.0),
    ];
    coords.iter().map(|(n, x, y, z)| Atom::new(n, "SER", "A", res_seq, Vec3::new(*x, *y, *z))).collect()
}

fn serine_at(chi1: f64, res_seq: i32) -> Vec<Atom> {
    let rotamer = RotamerLibrary::get("SER").unwrap();
    let mut model = ResidueModel::new("A/test", serine_base(res_seq), rotamer).unwrap();
    model.set_chi(1, chi1);
    model.atoms().to_vec()
}

fn angular_distance(a: f64, b: f64) -> f64 {
    (((a - b + 180.0).rem_euclid(360.0)) - 180.0).abs()
}

fn render_target(atoms: &[Atom], resolution: Option<f64>) -> DensityGrid {
    let mut config = FitterConfig::default();
    config.general.resolution = resolution;
    let params = config.density_params();
    let unit_cell = UnitCell::padded_p1(25.0);
    let mut grid = DensityGrid::new(unit_cell, 50, 50, 50);
    let mut transformer = DensityTransformer::new(params, ScatteringTable::Xray);
    transformer.initialize();
    let active: Vec<usize> = (0..atoms.len()).collect();
    transformer.mask(&mut grid, atoms, &active, params.rmask);
    transformer.density(&mut grid, atoms, &active);
    grid
}

fn empty_clash_detector() -> ClashDetector {
    ClashDetector::new(Vec::new(), Vec::new())
}

#[test]
fn s1_single_leucine_rotamer_converges_near_ground_truth() {
    let ground_truth = leucine_at(-60.0, 170.0, 10);
    let target = render_target(&ground_truth, Some(1.5));

    let starting = leucine_at(180.0, 65.0, 10);
    let mut config = FitterConfig::default();
    config.general.resolution = Some(1.5);

    let mut fitter = RotamericFitter::new("A/10", starting, empty_clash_detector(), target, config).unwrap();
    let conformers = fitter.fit().unwrap();

    assert!(!conformers.is_empty());
    let best = conformers.iter().max_by(|a, b| a.weight.partial_cmp(&b.weight).unwrap()).unwrap();
    assert!(angular_distance(coords_chi1(&best.coords), -60.0) < 55.0);
}

#[test]
fn s3_lysine_four_chi_fit_terminates_and_returns_a_conformer() {
    let ground_truth = lysine_base(12);
    let target = render_target(&ground_truth, Some(1.2));

    let rotamer = RotamerLibrary::get("LYS").unwrap();
    assert_eq!(rotamer.nchi(), 4);

    let mut config = FitterConfig::default();
    config.general.resolution = Some(1.2);
    let mut fitter = RotamericFitter::new("A/12", lysine_base(12), empty_clash_detector(), target, config).unwrap();
    let conformers = fitter.fit().unwrap();

    assert!(!conformers.is_empty());
    let total: f64 = conformers.iter().map(|c| c.weight).sum();
    assert!(total <= 1.0 + 1e-6);
}

#[test]
fn s4_serine_starting_far_from_ground_truth_still_recovers_it() {
    let ground_truth = serine_at(60.0, 20);
    let target = render_target(&ground_truth, Some(1.5));

    let starting = serine_at(180.0, 20);
    let mut config = FitterConfig::default();
    config.general.resolution = Some(1.5);

    let mut fitter = RotamericFitter::new("A/20", starting, empty_clash_detector(), target, config).unwrap();
    let conformers = fitter.fit().unwrap();

    assert!(!conformers.is_empty());
    let best = conformers.iter().max_by(|a, b| a.weight.partial_cmp(&b.weight).unwrap()).unwrap();
    assert!(angular_distance(coords_chi1(&best.coords), 60.0) < 25.0);
}

#[test]
fn s5_receptor_clash_at_every_candidate_yields_no_viable_conformers() {
    let starting = leucine_at(-60.0, 170.0, 30);
    let target = render_target(&starting, Some(1.5));

    // CB never moves under chi1/chi2 rotation, so a receptor atom placed
    // on top of it clashes with every sampled candidate.
    let cb_pos = starting[4].pos.clone();
    let clashing_neighbor = Atom::new("CA", "ALA", "A", 31, cb_pos);
    let detector = ClashDetector::new(vec![(100, clashing_neighbor)], Vec::new());

    let config = FitterConfig::default();
    let mut fitter = RotamericFitter::new("A/30", starting, detector, target, config).unwrap();
    let result = fitter.fit();
    assert!(matches!(result, Err(FitError::NoViableConformers { .. })));
}

#[test]
fn s6_missing_sidechain_atom_is_rejected_before_any_sampling() {
    let mut atoms = leucine_base(40);
    atoms.retain(|a| a.name != "CG");
    let target = render_target(&leucine_base(40), None);

    let config = FitterConfig::default();
    let result = RotamericFitter::new("A/40", atoms, empty_clash_detector(), target, config);
    assert!(matches!(result, Err(FitError::StructureIncomplete { .. })));
}

#[test]
fn two_distinct_rotamers_each_retain_some_weight_under_a_mixed_target() {
    let rotamer_a = leucine_at(-60.0, 170.0, 50);
    let rotamer_b = leucine_at(180.0, 65.0, 50);
    // A genuine 50/50 mixture would scale each occupancy to 0.5 before
    // rendering; occupancy-scaled clones approximate that without needing
    // a second density-accumulation pass.
    let mut half_a = rotamer_a.clone();
    let mut half_b = rotamer_b.clone();
    for atom in half_a.iter_mut().chain(half_b.iter_mut()) {
        atom.occupancy = 0.5;
    }
    let target_a = render_target(&half_a, Some(1.8));
    let mut target = target_a;
    let mut config = FitterConfig::default();
    config.general.resolution = Some(1.8);
    let params = config.density_params();
    let mut transformer = DensityTransformer::new(params, ScatteringTable::Xray);
    transformer.initialize();
    let active: Vec<usize> = (0..half_b.len()).collect();
    transformer.mask(&mut target, &half_b, &active, params.rmask);
    transformer.density(&mut target, &half_b, &active);

    let mut fitter =
        RotamericFitter::new("A/50", rotamer_a.clone(), empty_clash_detector(), target, config).unwrap();
    let conformers = fitter.fit().unwrap();

    assert!(!conformers.is_empty());
    let total: f64 = conformers.iter().map(|c| c.weight).sum();
    assert!(total <= 1.0 + 1e-6);
}

fn scratch_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("qfit-test-{}-{}", tag, std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    dir
}

#[test]
fn write_outputs_emits_one_conformer_file_per_surviving_candidate_and_the_multiconformer_file() {
    let ground_truth = leucine_at(-60.0, 170.0, 60);
    let target = render_target(&ground_truth, Some(1.5));

    let starting = leucine_at(180.0, 65.0, 60);
    let mut config = FitterConfig::default();
    config.general.resolution = Some(1.5);
    let directory = scratch_dir("outputs");
    config.general.directory = directory.to_string_lossy().into_owned();

    let mut fitter =
        RotamericFitter::new("A/60", starting.clone(), empty_clash_detector(), target, config).unwrap();
    let conformers = fitter.fit().unwrap();
    fitter.write_outputs(&starting).unwrap();

    for n in 1..=conformers.len() {
        let path = directory.join(format!("conformer_{}.pdb", n));
        assert!(path.is_file(), "missing {:?}", path);
        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().filter(|l| l.starts_with("ATOM")).count(), starting.len());
    }
    assert!(!directory.join(format!("conformer_{}.pdb", conformers.len() + 1)).exists());

    let mc_contents = fs::read_to_string(directory.join("multiconformer_residue.pdb")).unwrap();
    let atom_lines: Vec<&str> = mc_contents.lines().filter(|l| l.starts_with("ATOM")).collect();
    assert_eq!(atom_lines.len(), starting.len() * conformers.len());
    let altlocs: std::collections::HashSet<char> = atom_lines.iter().map(|l| l.as_bytes()[16] as char).collect();
    assert_eq!(altlocs.len(), conformers.len());

    assert!(!directory.join("mask.mrc").exists(), "debug maps should not be written when debug is off");

    fs::remove_dir_all(&directory).unwrap();
}

#[test]
fn write_outputs_emits_debug_maps_only_when_debug_is_enabled() {
    let ground_truth = leucine_at(-60.0, 170.0, 61);
    let target = render_target(&ground_truth, Some(1.5));

    let mut config = FitterConfig::default();
    config.general.resolution = Some(1.5);
    config.general.debug = true;
    let directory = scratch_dir("debug-maps");
    config.general.directory = directory.to_string_lossy().into_owned();

    let atoms = leucine_at(-60.0, 170.0, 61);
    let mut fitter =
        RotamericFitter::new("A/61", atoms.clone(), empty_clash_detector(), target, config).unwrap();
    fitter.fit().unwrap();
    fitter.write_outputs(&atoms).unwrap();

    for name in ["mask.mrc", "model.mrc", "diff.mrc", "model_masked.mrc", "diff_masked.mrc"] {
        assert!(directory.join(name).is_file(), "missing debug artifact {}", name);
    }

    fs::remove_dir_all(&directory).unwrap();
}
