use std::collections::HashMap;

use once_cell::sync::Lazy;

/// The shape `build.rs` packs `data/rotamers.csv` into; never constructed by
/// hand outside of the generated `RAW_TABLE`.
pub struct RawResidueEntry {
    pub name: &'static str,
    pub chi_atoms: &'static [&'static [&'static str]],
    pub chi_rotate: &'static [&'static [&'static str]],
    pub rotamers: &'static [&'static [f64]],
    pub bonds: &'static [&'static [&'static str]],
}

include!(concat!(env!("OUT_DIR"), "/rotamer_table.rs"));

/// One residue type's chi-dihedral topology and canonical rotamer list
/// (SPEC_FULL §3 "Rotamer library entry").
#[derive(Clone, Debug)]
pub struct RotamerLibraryEntry {
    res_name: String,
    chi_atoms: Vec<[String; 4]>,
    chi_rotate: Vec<Vec<String>>,
    rotamers: Vec<Vec<f64>>,
    bonds: Vec<(String, String)>,
}

impl RotamerLibraryEntry {
    pub fn res_name(&self) -> &str {
        &self.res_name
    }

    /// Number of free side-chain dihedrals for this residue type.
    pub fn nchi(&self) -> usize {
        self.chi_atoms.len()
    }

    /// The four atom names defining chi `i`, with `i` in `[1, nchi()]`.
    pub fn chi_atoms(&self, i: usize) -> &[String; 4] {
        &self.chi_atoms[i - 1]
    }

    /// Atom names that move when chi `i` is rotated, with `i` in `[1, nchi()]`.
    pub fn chi_rotate_atoms(&self, i: usize) -> &[String] {
        &self.chi_rotate[i - 1]
    }

    /// The library's canonical rotamer tuples, one `nchi()`-length angle
    /// vector per rotamer, in degrees.
    pub fn rotamers(&self) -> &[Vec<f64>] {
        &self.rotamers
    }

    /// The residue's bond graph as a flat list of bonded atom-name pairs.
    pub fn bonds(&self) -> &[(String, String)] {
        &self.bonds
    }
}

/// Process-wide rotamer table, built once on first access (SPEC_FULL §9
/// "Global rotamer table").
static TABLE: Lazy<HashMap<String, RotamerLibraryEntry>> = Lazy::new(build_table);

fn build_table() -> HashMap<String, RotamerLibraryEntry> {
    let mut map = HashMap::with_capacity(RAW_TABLE.len());
    for raw in RAW_TABLE {
        let chi_atoms: Vec<[String; 4]> = raw
            .chi_atoms
            .iter()
            .map(|quad| {
                assert_eq!(quad.len(), 4, "chi definition for {} is not a 4-atom tuple", raw.name);
                [quad[0].to_string(), quad[1].to_string(), quad[2].to_string(), quad[3].to_string()]
            })
            .collect();
        let chi_rotate: Vec<Vec<String>> = raw
            .chi_rotate
            .iter()
            .map(|group| group.iter().map(|s| s.to_string()).collect())
            .collect();
        let rotamers: Vec<Vec<f64>> = raw.rotamers.iter().map(|tuple| tuple.to_vec()).collect();
        let bonds: Vec<(String, String)> = raw
            .bonds
            .iter()
            .map(|pair| {
                assert_eq!(pair.len(), 2, "bond entry for {} is not a pair", raw.name);
                (pair[0].to_string(), pair[1].to_string())
            })
            .collect();

        map.insert(
            raw.name.to_string(),
            RotamerLibraryEntry { res_name: raw.name.to_string(), chi_atoms, chi_rotate, rotamers, bonds },
        );
    }
    map
}

/// Lookup surface over the compiled-in rotamer table.
pub struct RotamerLibrary;

impl RotamerLibrary {
    /// Returns the library entry for a three-letter residue name, if the
    /// residue type has any free side-chain dihedrals.
    pub fn get(res_name: &str) -> Option<&'static RotamerLibraryEntry> {
        TABLE.get(res_name)
    }

    /// All residue type names the table carries an entry for.
    pub fn residue_types() -> impl Iterator<Item = &'static str> {
        TABLE.keys().map(|s| s.as_str())
    }
}
