use std::env;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Packs `data/rotamers.csv` into a static Rust array at compile time, the
/// way `dunbrack` packs its Dunbrack-2010 library into a binary blob:
/// parsing once here means the runtime crate never links a CSV parser.
fn main() {
    println!("cargo:rerun-if-changed=data/rotamers.csv");

    let out_dir = env::var("OUT_DIR").expect("OUT_DIR not set by cargo");
    let dest_path = Path::new(&out_dir).join("rotamer_table.rs");
    let mut out = File::create(&dest_path).expect("failed to create rotamer_table.rs");

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path("data/rotamers.csv")
        .expect("failed to open data/rotamers.csv");

    writeln!(out, "pub static RAW_TABLE: &[RawResidueEntry] = &[").unwrap();

    for record in reader.records() {
        let record = record.expect("malformed row in data/rotamers.csv");
        let res_name = &record[0];
        let chi_atoms = parse_chi_atoms(&record[1]);
        let chi_rotate = parse_chi_rotate(&record[2]);
        let rotamers = parse_rotamers(&record[3]);
        let bonds = parse_chi_rotate(&record[4]);

        writeln!(out, "    RawResidueEntry {{").unwrap();
        writeln!(out, "        name: {:?},", res_name).unwrap();
        writeln!(out, "        chi_atoms: &[{}],", render_str_groups(&chi_atoms)).unwrap();
        writeln!(out, "        chi_rotate: &[{}],", render_str_groups(&chi_rotate)).unwrap();
        writeln!(out, "        rotamers: &[{}],", render_f64_groups(&rotamers)).unwrap();
        writeln!(out, "        bonds: &[{}],", render_str_groups(&bonds)).unwrap();
        writeln!(out, "    }},").unwrap();
    }

    writeln!(out, "];").unwrap();
}

fn parse_chi_atoms(field: &str) -> Vec<Vec<String>> {
    field.split('|').map(|def| def.split(':').map(|s| s.to_string()).collect()).collect()
}

fn parse_chi_rotate(field: &str) -> Vec<Vec<String>> {
    field.split('|').map(|group| group.split(':').map(|s| s.to_string()).collect()).collect()
}

fn parse_rotamers(field: &str) -> Vec<Vec<f64>> {
    field
        .split('|')
        .map(|tuple| {
            tuple
                .split(':')
                .map(|angle| angle.parse::<f64>().expect("non-numeric chi angle in rotamers.csv"))
                .collect()
        })
        .collect()
}

fn render_str_groups(groups: &[Vec<String>]) -> String {
    groups
        .iter()
        .map(|g| {
            let items: Vec<String> = g.iter().map(|s| format!("{:?}", s)).collect();
            format!("&[{}]", items.join(", "))
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn render_f64_groups(groups: &[Vec<f64>]) -> String {
    groups
        .iter()
        .map(|g| {
            let items: Vec<String> = g.iter().map(|v| format!("{:?}_f64", v)).collect();
            format!("&[{}]", items.join(", "))
        })
        .collect::<Vec<_>>()
        .join(", ")
}
