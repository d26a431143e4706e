use std::fs;
use std::io::{BufRead, Write};
use std::path::Path;

use qfit_geom::UnitCell;

use crate::atom::Atom;
use crate::error::ModelError;

/// A flat, column-array structural model (SPEC_FULL §6A/§9 "Hierarchical
/// structure graph"): every atom in the file, in file order, plus whatever
/// unit cell its `CRYST1` record carried.
#[derive(Clone, Debug, Default)]
pub struct PdbStructure {
    pub atoms: Vec<Atom>,
    pub unit_cell: Option<UnitCell>,
}

/// A borrowed view over one (chain, residue, insertion code) group of atoms.
#[derive(Clone, Debug)]
pub struct ResidueView<'a> {
    pub chain_id: &'a str,
    pub res_seq: i32,
    pub i_code: char,
    pub atoms: Vec<&'a Atom>,
}

impl PdbStructure {
    pub fn new() -> Self {
        PdbStructure::default()
    }

    /// Parses every `ATOM`/`HETATM` line from a reader, and the unit cell
    /// from the first `CRYST1` line encountered, if any.
    pub fn from_pdb_reader<R: BufRead>(reader: R) -> Result<PdbStructure, ModelError> {
        let mut atoms = Vec::new();
        let mut unit_cell = None;
        for line in reader.lines() {
            let line = line.map_err(ModelError::Io)?;
            if line.starts_with("ATOM") || line.starts_with("HETATM") {
                let atom = Atom::from_pdb_line(&line)
                    .ok_or_else(|| ModelError::MalformedLine { line: line.clone() })?;
                atoms.push(atom);
            } else if line.starts_with("CRYST1") {
                unit_cell = Some(UnitCell::from_cryst1_line(&line));
            }
        }
        Ok(PdbStructure { atoms, unit_cell })
    }

    pub fn from_pdb_file<P: AsRef<Path>>(path: P) -> Result<PdbStructure, ModelError> {
        let contents = fs::read_to_string(path).map_err(ModelError::Io)?;
        PdbStructure::from_pdb_reader(contents.as_bytes())
    }

    /// Writes every atom as a fixed-column `ATOM` line, preceded by a
    /// `CRYST1` record if the structure carries a unit cell.
    pub fn write_pdb<W: Write>(&self, mut writer: W) -> Result<(), ModelError> {
        if let Some(uc) = &self.unit_cell {
            writeln!(
                writer,
                "CRYST1{:>9.3}{:>9.3}{:>9.3}{:>7.2}{:>7.2}{:>7.2} {:<11}",
                uc.a, uc.b, uc.c, uc.alpha, uc.beta, uc.gamma, uc.space_group
            )
            .map_err(ModelError::Io)?;
        }
        for atom in &self.atoms {
            writeln!(writer, "{}", atom.to_pdb_line()).map_err(ModelError::Io)?;
        }
        Ok(())
    }

    /// Groups atoms into contiguous `(chain_id, res_seq, i_code)` runs,
    /// preserving file order.
    pub fn residues(&self) -> Vec<ResidueView<'_>> {
        let mut groups: Vec<ResidueView> = Vec::new();
        for atom in &self.atoms {
            let matches_last = groups.last().map(|g| {
                g.chain_id == atom.chain_id.as_str() && g.res_seq == atom.res_seq && g.i_code == atom.i_code
            });
            if matches_last == Some(true) {
                groups.last_mut().unwrap().atoms.push(atom);
            } else {
                groups.push(ResidueView {
                    chain_id: atom.chain_id.as_str(),
                    res_seq: atom.res_seq,
                    i_code: atom.i_code,
                    atoms: vec![atom],
                });
            }
        }
        groups
    }

    /// The first residue matching `(chain_id, res_seq, i_code)`, if present.
    pub fn residue(&self, chain_id: &str, res_seq: i32, i_code: char) -> Option<ResidueView<'_>> {
        self.residues()
            .into_iter()
            .find(|r| r.chain_id == chain_id && r.res_seq == res_seq && r.i_code == i_code)
    }

    /// Concatenates another structure's atoms onto this one, renumbering
    /// serials to stay contiguous (mirrors `Structure::combine`).
    pub fn combine(&mut self, other: &PdbStructure) {
        let mut next_serial = self.atoms.last().map(|a| a.serial + 1).unwrap_or(1);
        for atom in &other.atoms {
            let mut atom = atom.clone();
            atom.serial = next_serial;
            next_serial += 1;
            self.atoms.push(atom);
        }
    }

    /// Stable-sorts atoms by `(chain_id, res_seq, i_code, name, alt_loc)`,
    /// mirroring `Structure::reorder`'s hierarchy-traversal order.
    pub fn reorder(&mut self) {
        self.atoms.sort_by(|a, b| {
            (a.chain_id.as_str(), a.res_seq, a.i_code, a.name.as_str(), a.alt_loc).cmp(&(
                b.chain_id.as_str(),
                b.res_seq,
                b.i_code,
                b.name.as_str(),
                b.alt_loc,
            ))
        });
        for (i, atom) in self.atoms.iter_mut().enumerate() {
            atom.serial = i as i32 + 1;
        }
    }
}

impl<'a> ResidueView<'a> {
    /// Position of the named atom within this residue, if present.
    pub fn atom(&self, name: &str) -> Option<&'a Atom> {
        self.atoms.iter().copied().find(|a| a.name == name)
    }

    pub fn res_name(&self) -> &str {
        self.atoms.first().map(|a| a.res_name.as_str()).unwrap_or("")
    }
}
