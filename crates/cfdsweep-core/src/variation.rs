//! Variation registry: which parameter a sweep varies, and the cases it yields.
//!
//! Each variation is a plain function from a [`SweepContext`] to the extra case
//! descriptors. The batch for a run is always the baseline case followed by
//! the variation's cases, so `none` still runs the baseline.

use std::path::Path;

use crate::case::CaseDescriptor;
use crate::config::SweepConfig;
use crate::error::{SweepError, SweepResult};
use crate::options::Options;

pub const BASELINE_CASE: &str = "base";
pub const MESH_KEY: &str = "MESH_FILENAME";

/// Inputs a variation may read.
#[derive(Debug, Clone, Copy)]
pub struct SweepContext<'a> {
    pub variation: &'a str,
    pub results_dir: &'a Path,
    pub baseline: &'a Options,
}

pub type VariationFn = fn(&SweepContext<'_>) -> Vec<CaseDescriptor>;

#[derive(Clone, Copy)]
pub struct Variation {
    pub id: &'static str,
    pub description: &'static str,
    build: VariationFn,
}

impl std::fmt::Debug for Variation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Variation")
            .field("id", &self.id)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

impl Variation {
    pub fn cases(&self, ctx: &SweepContext<'_>) -> Vec<CaseDescriptor> {
        (self.build)(ctx)
    }
}

/// Lookup table from variation id to case builder.
#[derive(Debug, Clone, Default)]
pub struct VariationRegistry {
    variations: Vec<Variation>,
}

impl VariationRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with the built-in flat-plate studies.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        let builtins: [(&'static str, &'static str, VariationFn); 7] = [
            ("none", "baseline only", no_variation),
            ("ConvNum", "convective scheme for the mean flow", conv_num),
            ("MeanLimiterCoeff", "slope limiter coefficient", mean_limiter_coeff),
            ("AdCoeffFlow", "artificial dissipation coefficient", ad_coeff_flow),
            ("TurbOrder", "first-order turbulence convection", turb_order),
            ("ViscNumMethod", "viscous gradient method for the mean flow", visc_num_method),
            ("TurbNumMethod", "viscous gradient method for turbulence", turb_num_method),
        ];
        for (id, description, build) in builtins {
            registry.variations.push(Variation {
                id,
                description,
                build,
            });
        }
        registry
    }

    /// Add a variation. Ids must be unique.
    pub fn register(
        &mut self,
        id: &'static str,
        description: &'static str,
        build: VariationFn,
    ) -> SweepResult<()> {
        if self.get(id).is_some() {
            return Err(SweepError::Configuration(format!(
                "variation {id} is already registered"
            )));
        }
        self.variations.push(Variation {
            id,
            description,
            build,
        });
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Variation> {
        self.variations.iter().find(|v| v.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Variation> {
        self.variations.iter()
    }

    pub fn ids(&self) -> Vec<&'static str> {
        self.variations.iter().map(|v| v.id).collect()
    }

    /// Cases for `id`, or a configuration error naming the known ids.
    pub fn cases(&self, id: &str, ctx: &SweepContext<'_>) -> SweepResult<Vec<CaseDescriptor>> {
        let variation = self.get(id).ok_or_else(|| {
            SweepError::Configuration(format!(
                "unrecognized variation {id:?}; expected one of: {}",
                self.ids().join(", ")
            ))
        })?;
        Ok(variation.cases(ctx))
    }

    /// Baseline case plus the variation's cases, each pointing at the mesh in
    /// the data directory.
    pub fn plan(
        &self,
        variation: &str,
        config: &SweepConfig,
        baseline: &Options,
    ) -> SweepResult<Vec<CaseDescriptor>> {
        let ctx = SweepContext {
            variation,
            results_dir: &config.results_dir,
            baseline,
        };
        let mut cases = vec![baseline_case(&config.data_dir)];
        cases.extend(self.cases(variation, &ctx)?);

        let mesh = baseline
            .get(MESH_KEY)
            .map(Path::new)
            .filter(|mesh| mesh.is_relative())
            .map(|mesh| config.data_dir.join(mesh).to_string_lossy().into_owned());
        Ok(match mesh {
            Some(mesh) => cases
                .into_iter()
                .map(|case| case.with_override(MESH_KEY, mesh.clone()))
                .collect(),
            None => cases,
        })
    }
}

/// The unmodified baseline, run in `<data_dir>/base`.
pub fn baseline_case(data_dir: &Path) -> CaseDescriptor {
    CaseDescriptor::new(BASELINE_CASE, data_dir.join(BASELINE_CASE))
}

/// Variant case at `<results>/<variation>/<subkind>`.
pub fn variant_case(ctx: &SweepContext<'_>, subkind: &str) -> CaseDescriptor {
    CaseDescriptor::new(subkind, ctx.results_dir.join(ctx.variation).join(subkind))
        .with_config_file(format!("{subkind}config.cfg"))
        .with_log_file(format!("{subkind}_log.txt"))
}

fn no_variation(_ctx: &SweepContext<'_>) -> Vec<CaseDescriptor> {
    Vec::new()
}

fn conv_num(ctx: &SweepContext<'_>) -> Vec<CaseDescriptor> {
    ["ROE-2ND_ORDER", "AUSM-2ND_ORDER", "HLLC-2ND_ORDER", "ROE_TURKEL_2ND"]
        .into_iter()
        .map(|scheme| variant_case(ctx, scheme).with_override("CONV_NUM_METHOD_FLOW", scheme))
        .collect()
}

fn mean_limiter_coeff(ctx: &SweepContext<'_>) -> Vec<CaseDescriptor> {
    [0.1, 0.3, 0.5]
        .into_iter()
        .map(|coeff: f64| {
            variant_case(ctx, &format!("limitcoeff{coeff}"))
                .with_override("LIMITER_COEFF", coeff.to_string())
        })
        .collect()
}

fn ad_coeff_flow(ctx: &SweepContext<'_>) -> Vec<CaseDescriptor> {
    [0.02, 0.01, 0.005, 0.001]
        .into_iter()
        .map(|coeff: f64| {
            variant_case(ctx, &format!("adcoeff_{coeff}"))
                .with_override("AD_COEFF_FLOW", coeff.to_string())
        })
        .collect()
}

fn turb_order(ctx: &SweepContext<'_>) -> Vec<CaseDescriptor> {
    vec![variant_case(ctx, "firstorder")
        .with_override("CONV_NUM_METHOD_TURB", "Scalar_Upwind-1st_Order")]
}

fn visc_num_method(ctx: &SweepContext<'_>) -> Vec<CaseDescriptor> {
    gradient_methods(ctx, "VISC_NUM_METHOD_FLOW")
}

fn turb_num_method(ctx: &SweepContext<'_>) -> Vec<CaseDescriptor> {
    gradient_methods(ctx, "VISC_NUM_METHOD_TURB")
}

fn gradient_methods(ctx: &SweepContext<'_>, key: &str) -> Vec<CaseDescriptor> {
    [("avggrad", "AVG_GRAD"), ("avggrad_corr", "AVG_GRAD_CORRECTED")]
        .into_iter()
        .map(|(subkind, method)| variant_case(ctx, subkind).with_override(key, method))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn config() -> SweepConfig {
        SweepConfig::from_root(Some(Path::new("/srv")), "study").unwrap()
    }

    fn baseline() -> Options {
        Options::parse("MESH_FILENAME= mesh_flatplate.su2\nLIMITER_COEFF= 0.3\n").unwrap()
    }

    #[test]
    fn test_none_plans_only_baseline() {
        let cases = VariationRegistry::builtin()
            .plan("none", &config(), &baseline())
            .unwrap();
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].name(), "base");
        assert_eq!(cases[0].working_directory(), Path::new("/srv/data/study/base"));
        assert_eq!(cases[0].config_file_name(), "config.cfg");
    }

    #[test]
    fn test_unknown_variation_lists_known_ids() {
        let err = VariationRegistry::builtin()
            .plan("Reynolds", &config(), &baseline())
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Reynolds"));
        assert!(message.contains("ConvNum"));
    }

    #[test]
    fn test_limiter_variants_layout() {
        let cases = VariationRegistry::builtin()
            .plan("MeanLimiterCoeff", &config(), &baseline())
            .unwrap();
        let names: Vec<&str> = cases.iter().map(|c| c.name()).collect();
        assert_eq!(names, ["base", "limitcoeff0.1", "limitcoeff0.3", "limitcoeff0.5"]);

        let first = &cases[1];
        assert_eq!(
            first.working_directory(),
            Path::new("/srv/results/study/MeanLimiterCoeff/limitcoeff0.1")
        );
        assert_eq!(first.config_file_name(), "limitcoeff0.1config.cfg");
        assert_eq!(first.log_destination(), "limitcoeff0.1_log.txt");
        assert_eq!(first.overrides().get("LIMITER_COEFF"), Some("0.1"));
    }

    #[test]
    fn test_ad_coeff_varies_its_own_option() {
        let cases = VariationRegistry::builtin()
            .plan("AdCoeffFlow", &config(), &baseline())
            .unwrap();
        assert_eq!(cases.len(), 5);
        for case in &cases[1..] {
            assert!(case.overrides().get("AD_COEFF_FLOW").is_some());
            assert!(case.overrides().get("LIMITER_COEFF").is_none());
        }
        assert_eq!(cases[3].name(), "adcoeff_0.005");
    }

    #[test]
    fn test_turb_num_method_varies_turbulence_key() {
        let cases = VariationRegistry::builtin()
            .plan("TurbNumMethod", &config(), &baseline())
            .unwrap();
        assert_eq!(cases[2].name(), "avggrad_corr");
        assert_eq!(
            cases[2].overrides().get("VISC_NUM_METHOD_TURB"),
            Some("AVG_GRAD_CORRECTED")
        );
        assert!(cases[2].overrides().get("VISC_NUM_METHOD_FLOW").is_none());
    }

    #[test]
    fn test_turb_num_method_with_solver_default_baseline() {
        let baseline =
            Options::parse("MESH_FILENAME= m.su2\nVISC_NUM_METHOD_FLOW= AVG_GRAD\n").unwrap();
        let cases = VariationRegistry::builtin()
            .plan("TurbNumMethod", &config(), &baseline)
            .unwrap();
        assert_eq!(cases.len(), 3);
        for case in &cases[1..] {
            let concrete = case.prepare_overrides(&baseline).unwrap();
            assert_eq!(
                concrete.get("VISC_NUM_METHOD_TURB"),
                case.overrides().get("VISC_NUM_METHOD_TURB")
            );
            assert_eq!(concrete.get("VISC_NUM_METHOD_FLOW"), Some("AVG_GRAD"));
        }
    }

    #[test]
    fn test_every_case_uses_data_dir_mesh() {
        let cases = VariationRegistry::builtin()
            .plan("ConvNum", &config(), &baseline())
            .unwrap();
        let expected = PathBuf::from("/srv/data/study/mesh_flatplate.su2");
        for case in &cases {
            assert_eq!(
                case.overrides().get(MESH_KEY).map(PathBuf::from),
                Some(expected.clone())
            );
        }
    }

    #[test]
    fn test_register_custom_variation() {
        fn single(ctx: &SweepContext<'_>) -> Vec<CaseDescriptor> {
            vec![variant_case(ctx, "coarse")]
        }
        let mut registry = VariationRegistry::builtin();
        registry.register("Coarse", "coarse mesh", single).unwrap();
        assert!(registry.register("Coarse", "again", single).is_err());

        let cases = registry.plan("Coarse", &config(), &baseline()).unwrap();
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[1].name(), "coarse");
    }

    #[test]
    fn test_builtin_overrides_are_in_domain() {
        let registry = VariationRegistry::builtin();
        let baseline = Options::parse(
            "MESH_FILENAME= m.su2\nCONV_NUM_METHOD_FLOW= ROE-2ND_ORDER\nLIMITER_COEFF= 0.3\n\
             AD_COEFF_FLOW= 0.02\nCONV_NUM_METHOD_TURB= SCALAR_UPWIND-2ND_ORDER\n\
             VISC_NUM_METHOD_FLOW= AVG_GRAD\nVISC_NUM_METHOD_TURB= AVG_GRAD\n",
        )
        .unwrap();
        for id in registry.ids() {
            for case in registry.plan(id, &config(), &baseline).unwrap() {
                case.prepare_overrides(&baseline)
                    .unwrap_or_else(|e| panic!("{id}/{}: {e}", case.name()));
            }
        }
    }
}
