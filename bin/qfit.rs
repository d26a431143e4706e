use std::env;
use std::fs::File;
use std::io::BufWriter;
use std::process::exit;

use clap::Parser;
use log::{error, info};

use qfit_core::{
    Atom, ClashDetector, DensityMap, FitError, FitterConfig, PdbStructure, RotamericFitter,
    ScatteringTable,
};

/// Fits rotameric side-chain conformers of one residue against a
/// crystallographic density map.
/// say qfit -h to see options
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// input structure in PDB format
    #[clap(short, long)]
    structure: String,
    /// input density map in CCP4/MRC format
    #[clap(short, long)]
    map: String,
    /// chain identifier of the residue to fit
    #[clap(long)]
    chain: String,
    /// residue sequence number of the residue to fit
    #[clap(long)]
    resi: i32,
    /// PDB insertion code of the residue to fit
    #[clap(long, default_value = " ")]
    icode: char,
    /// where to write the multiconformer structure; defaults to stdout
    #[clap(short, long)]
    output: Option<String>,

    /// directory qfit writes intermediate output to
    #[clap(long, default_value = ".")]
    directory: String,
    /// map resolution in Angstrom; omit for a simple (resolution-blind) forward model
    #[clap(long)]
    resolution: Option<f64>,
    /// lowest resolution shell considered when deriving the mask radius
    #[clap(long)]
    resolution_min: Option<f64>,
    /// scattering-factor table to render atoms with
    #[clap(long, value_enum, default_value = "xray")]
    scattering: Scattering,
    /// fraction of the summed van der Waals radii below which two atoms are considered clashing
    #[clap(long, default_value = "0.80")]
    clash_scaling_factor: f64,
    /// number of chi angles advanced together per sampling iteration
    #[clap(long, default_value = "2")]
    dofs_per_iteration: usize,
    /// step size, in degrees, of the local rotation window sampled around each candidate rotamer
    #[clap(long, default_value = "8.0")]
    dofs_stepsize: f64,
    /// maximum number of conformers the MIQP pass may keep active
    #[clap(long, default_value = "2")]
    cardinality: usize,
    /// minimum occupancy a MIQP-selected conformer may carry
    #[clap(long, default_value = "0.30")]
    threshold: f64,
    /// half-width, in degrees, of the chi-value window that counts a library rotamer as matching
    #[clap(long, default_value = "40.0")]
    rotamer_neighborhood: f64,
    /// atom names to never consider during clash detection or density rendering
    #[clap(long, value_delimiter = ',')]
    exclude_atoms: Vec<String>,

    /// write diagnostic logging and mask/model/diff map artifacts alongside the conformer PDBs
    #[clap(long)]
    debug: bool,
    /// be more verbose and log program actions on the screen
    #[clap(short, long)]
    verbose: bool,
}

#[derive(Copy, Clone, Debug, clap::ValueEnum)]
enum Scattering {
    Xray,
    Electron,
}

impl From<Scattering> for ScatteringTable {
    fn from(value: Scattering) -> Self {
        match value {
            Scattering::Xray => ScatteringTable::Xray,
            Scattering::Electron => ScatteringTable::Electron,
        }
    }
}

fn build_config(args: &Args) -> FitterConfig {
    let mut config = FitterConfig::default();
    config.general.directory = args.directory.clone();
    config.general.debug = args.debug;
    config.general.resolution = args.resolution;
    config.general.resolution_min = args.resolution_min;
    config.general.scattering = args.scattering.into();
    config.general.clash_scaling_factor = args.clash_scaling_factor;
    config.general.dofs_per_iteration = args.dofs_per_iteration;
    config.general.dofs_stepsize = args.dofs_stepsize;
    config.general.cardinality = Some(args.cardinality);
    config.general.threshold = Some(args.threshold);
    config.rotamer.rotamer_neighborhood = args.rotamer_neighborhood;
    config.rotamer.exclude_atoms = args.exclude_atoms.clone();
    config
}

/// Index and atom of the first match for `(chain_id, res_seq, name)` in
/// file order, used to locate the flanking peptide-bond partners of the
/// residue being fit.
fn find_atom(structure: &PdbStructure, chain_id: &str, res_seq: i32, name: &str) -> Option<(usize, Atom)> {
    structure
        .atoms
        .iter()
        .enumerate()
        .find(|(_, a)| a.chain_id == chain_id && a.res_seq == res_seq && a.name == name)
        .map(|(i, a)| (i, a.clone()))
}

fn altloc_char(index: usize) -> char {
    (b'A' + index as u8) as char
}

fn run(args: &Args) -> Result<(), FitError> {
    let structure = PdbStructure::from_pdb_file(&args.structure)?;
    let map_file = File::open(&args.map)?;
    let target_grid = DensityMap::read(map_file)?;

    let target_indices: Vec<usize> = structure
        .atoms
        .iter()
        .enumerate()
        .filter(|(_, a)| a.chain_id == args.chain && a.res_seq == args.resi && a.i_code == args.icode)
        .map(|(i, _)| i)
        .collect();
    if target_indices.is_empty() {
        return Err(FitError::StructureIncomplete { residue_id: format!("{}/{}", args.chain, args.resi) });
    }
    let residue_atoms: Vec<Atom> = target_indices.iter().map(|&i| structure.atoms[i].clone()).collect();

    let residue_n_index = residue_atoms.iter().position(|a| a.name == "N");
    let residue_c_index = residue_atoms.iter().position(|a| a.name == "C");
    let prev_c = find_atom(&structure, &args.chain, args.resi - 1, "C");
    let next_n = find_atom(&structure, &args.chain, args.resi + 1, "N");
    let exclude = ClashDetector::peptide_bond_exclusions(
        residue_n_index,
        residue_c_index,
        prev_c.as_ref().map(|(i, a)| (*i, a)),
        next_n.as_ref().map(|(i, a)| (*i, a)),
        &residue_atoms,
    );

    let receptor_atoms: Vec<(usize, Atom)> = structure
        .atoms
        .iter()
        .enumerate()
        .filter(|(i, _)| !target_indices.contains(i))
        .map(|(i, a)| (i, a.clone()))
        .collect();
    let clash_detector = ClashDetector::new(receptor_atoms, exclude);

    let config = build_config(args);
    let residue_id = format!("{}/{}", args.chain, args.resi);
    info!("fitting residue {} ({} atoms) against {}", residue_id, residue_atoms.len(), args.map);

    let mut fitter =
        RotamericFitter::new(&residue_id, residue_atoms.clone(), clash_detector, target_grid, config)?;
    let conformers = fitter.fit()?;
    info!("selected {} conformer(s) for residue {}", conformers.len(), residue_id);
    fitter.write_outputs(&residue_atoms)?;

    let mut out_structure = structure.clone();
    out_structure.atoms.retain(|a| !(a.chain_id == args.chain && a.res_seq == args.resi && a.i_code == args.icode));

    let original_atoms: Vec<Atom> = target_indices.iter().map(|&i| structure.atoms[i].clone()).collect();
    let tag_altloc = conformers.len() > 1;
    for (ci, conformer) in conformers.iter().enumerate() {
        for (atom, pos) in original_atoms.iter().zip(conformer.coords.iter()) {
            let mut atom = atom.clone();
            atom.pos = pos.clone();
            atom.occupancy = conformer.weight;
            if tag_altloc {
                atom.alt_loc = altloc_char(ci);
            }
            out_structure.atoms.push(atom);
        }
    }
    out_structure.reorder();

    match &args.output {
        Some(path) => out_structure.write_pdb(BufWriter::new(File::create(path)?))?,
        None => out_structure.write_pdb(std::io::stdout().lock())?,
    }

    Ok(())
}

fn main() {
    let args = Args::parse();
    unsafe {
        if env::var("RUST_LOG").is_err() {
            env::set_var("RUST_LOG", "info");
        }
        if args.verbose {
            env::set_var("RUST_LOG", "debug");
        }
    }
    env_logger::init();

    if let Err(err) = run(&args) {
        error!("{}", err);
        exit(err.exit_code());
    }
}
