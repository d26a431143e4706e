/// X-ray vs. electron scattering-factor table selection (SPEC_FULL §6
/// "scattering").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScatteringTable {
    Xray,
    Electron,
}

impl Default for ScatteringTable {
    fn default() -> Self {
        ScatteringTable::Xray
    }
}

/// General fitting options, independent of residue type (mirrors the
/// Python reference's `_BaseQFitOptions`).
#[derive(Clone, Debug)]
pub struct GeneralOptions {
    pub directory: String,
    pub debug: bool,
    pub resolution: Option<f64>,
    pub resolution_min: Option<f64>,
    pub scattering: ScatteringTable,
    pub clash_scaling_factor: f64,
    pub dofs_per_iteration: usize,
    pub dofs_stepsize: f64,
    pub cardinality: Option<usize>,
    pub threshold: Option<f64>,
}

impl Default for GeneralOptions {
    fn default() -> Self {
        GeneralOptions {
            directory: ".".to_string(),
            debug: false,
            resolution: None,
            resolution_min: None,
            scattering: ScatteringTable::default(),
            clash_scaling_factor: 0.80,
            dofs_per_iteration: 2,
            dofs_stepsize: 8.0,
            cardinality: Some(2),
            threshold: Some(0.30),
        }
    }
}

/// Options specific to rotameric side-chain fitting (mirrors the Python
/// reference's `QFitRotamericResidueOptions`).
#[derive(Clone, Debug)]
pub struct RotamerOptions {
    pub rotamer_neighborhood: f64,
    pub exclude_atoms: Vec<String>,
}

impl Default for RotamerOptions {
    fn default() -> Self {
        RotamerOptions { rotamer_neighborhood: 40.0, exclude_atoms: Vec::new() }
    }
}

/// The full set of options consumed by [`crate::fitter::RotamericFitter`],
/// split the way the Python reference splits `_BaseQFitOptions` from
/// `QFitRotamericResidueOptions` rather than copying attributes dynamically
/// onto a single flat object (SPEC_FULL §6D).
#[derive(Clone, Debug, Default)]
pub struct FitterConfig {
    pub general: GeneralOptions,
    pub rotamer: RotamerOptions,
}

impl FitterConfig {
    /// Derives `(smax, smin, rmask, simple)` from the resolution options,
    /// exactly as specified in SPEC_FULL §4.5.
    pub fn density_params(&self) -> DensityParams {
        let (smax, simple) = match self.general.resolution {
            Some(d) => (Some(1.0 / (2.0 * d)), false),
            None => (None, true),
        };
        let (smin, rmask) = match self.general.resolution_min {
            Some(d_min) => (Some(1.0 / (2.0 * d_min)), d_min / 3.0 + 0.5),
            None => (Some(0.0), 1.5),
        };
        DensityParams { smax, smin, rmask, simple }
    }
}

/// Resolution-derived constants that configure [`crate::density::DensityTransformer`].
#[derive(Clone, Copy, Debug)]
pub struct DensityParams {
    pub smax: Option<f64>,
    pub smin: Option<f64>,
    pub rmask: f64,
    pub simple: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_reference_defaults() {
        let config = FitterConfig::default();
        assert_eq!(config.general.clash_scaling_factor, 0.80);
        assert_eq!(config.general.dofs_per_iteration, 2);
        assert_eq!(config.general.cardinality, Some(2));
        assert_eq!(config.general.threshold, Some(0.30));
        assert_eq!(config.rotamer.rotamer_neighborhood, 40.0);
    }

    #[test]
    fn no_resolution_selects_simple_mode_and_default_rmask() {
        let config = FitterConfig::default();
        let params = config.density_params();
        assert!(params.simple);
        assert!(params.smax.is_none());
        assert!((params.rmask - 1.5).abs() < 1e-9);
    }

    #[test]
    fn resolution_selects_complex_mode() {
        let mut config = FitterConfig::default();
        config.general.resolution = Some(1.5);
        config.general.resolution_min = Some(3.0);
        let params = config.density_params();
        assert!(!params.simple);
        assert!((params.smax.unwrap() - 1.0 / 3.0).abs() < 1e-9);
        assert!((params.rmask - 1.5).abs() < 1e-9);
    }
}
