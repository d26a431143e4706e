/// Van-der-Waals radius, in Angstroms, for a single-letter/two-letter
/// element symbol (SPEC_FULL §4.2 "ClashDetector"). Values are the common
/// Bondi radii used by crystallographic model-building tools; unrecognized
/// elements fall back to the carbon radius.
pub fn vdw_radius(element: &str) -> f64 {
    match element.trim().to_ascii_uppercase().as_str() {
        "H" => 1.10,
        "C" => 1.70,
        "N" => 1.55,
        "O" => 1.52,
        "S" => 1.80,
        "P" => 1.80,
        "SE" => 1.90,
        "F" => 1.47,
        "CL" => 1.75,
        "BR" => 1.85,
        "I" => 1.98,
        _ => 1.70,
    }
}
