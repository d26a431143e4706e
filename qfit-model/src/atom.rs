use qfit_geom::Vec3;

/// Atom record as found in a single line of a PDB file (SPEC_FULL §6A), a
/// direct analogue of `bioshell_pdb::PdbAtom` trimmed to the fields the
/// fitting engine actually reads.
#[derive(Clone, Debug, PartialEq)]
pub struct Atom {
    pub serial: i32,
    pub name: String,
    pub alt_loc: char,
    pub res_name: String,
    pub chain_id: String,
    pub res_seq: i32,
    pub i_code: char,
    pub element: String,
    pub pos: Vec3,
    pub occupancy: f64,
    pub temp_factor: f64,
}

impl Atom {
    pub fn new(name: &str, res_name: &str, chain_id: &str, res_seq: i32, pos: Vec3) -> Self {
        let element = name.trim().chars().next().map(|c| c.to_string()).unwrap_or_default();
        Atom {
            serial: 1,
            name: name.to_string(),
            alt_loc: ' ',
            res_name: res_name.to_string(),
            chain_id: chain_id.to_string(),
            res_seq,
            i_code: ' ',
            element,
            pos,
            occupancy: 1.0,
            temp_factor: 0.0,
        }
    }

    /// Parses an `ATOM`/`HETATM` line, following the fixed-column layout of
    /// `bioshell_pdb::PdbAtom::from_atom_line`.
    pub fn from_pdb_line(line: &str) -> Option<Atom> {
        if line.len() < 54 {
            return None;
        }
        let serial = line.get(6..11)?.trim().parse().ok()?;
        let name = line.get(12..16)?.trim().to_string();
        let alt_loc = line.get(16..17)?.chars().next().unwrap_or(' ');
        let res_name = line.get(17..20)?.trim().to_string();
        let chain_id = line.get(21..22)?.trim().to_string();
        let res_seq = line.get(22..26)?.trim().parse().ok()?;
        let i_code = line.get(26..27)?.chars().next().unwrap_or(' ');
        let x = line.get(30..38)?.trim().parse().ok()?;
        let y = line.get(38..46)?.trim().parse().ok()?;
        let z = line.get(46..54)?.trim().parse().ok()?;
        let occupancy = line.get(54..60).and_then(|s| s.trim().parse().ok()).unwrap_or(1.0);
        let temp_factor = line.get(60..66).and_then(|s| s.trim().parse().ok()).unwrap_or(0.0);
        let element = line
            .get(76..78)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| name.chars().next().map(|c| c.to_string()).unwrap_or_default());

        Some(Atom {
            serial,
            name,
            alt_loc,
            res_name,
            chain_id,
            res_seq,
            i_code,
            element,
            pos: Vec3::new(x, y, z),
            occupancy,
            temp_factor,
        })
    }

    /// Renders a fixed-column `ATOM` line, the inverse of [`Atom::from_pdb_line`].
    pub fn to_pdb_line(&self) -> String {
        format!(
            "ATOM  {:>5} {:<4}{}{:<3} {}{:>4}{}   {:>8.3}{:>8.3}{:>8.3}{:>6.2}{:>6.2}          {:>2}",
            self.serial,
            self.name,
            self.alt_loc,
            self.res_name,
            self.chain_id,
            self.res_seq,
            self.i_code,
            self.pos.x,
            self.pos.y,
            self.pos.z,
            self.occupancy,
            self.temp_factor,
            self.element,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atom_line_round_trips_through_parse_and_render() {
        let line = "ATOM    320  CA  PHE A  43      16.101   9.057  19.587  1.00 18.18           C";
        let atom = Atom::from_pdb_line(line).unwrap();
        assert_eq!(atom.name, "CA");
        assert_eq!(atom.res_name, "PHE");
        assert_eq!(atom.chain_id, "A");
        assert_eq!(atom.res_seq, 43);
        assert!((atom.pos.x - 16.101).abs() < 1e-6);
        assert_eq!(atom.element, "C");
    }

    #[test]
    fn short_line_is_rejected() {
        assert!(Atom::from_pdb_line("ATOM    320  CA").is_none());
    }
}
