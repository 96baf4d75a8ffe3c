//! End-to-end sweep: plan, materialize, run, report, finalize.

use std::sync::Arc;

use cfdsweep_core::{
    build_artifact, case_lines, finalize_batch, render_summary, Batch, BatchRunner,
    ConcurrencyPolicy, FinalizeOutcome, Options, SweepConfig, VariationRegistry,
};
use tempfile::TempDir;

const BASELINE: &str = "\
% flat plate, SST
MESH_FILENAME= mesh_flatplate_turb_137x97.su2
CONV_NUM_METHOD_FLOW= ROE-2ND_ORDER
LIMITER_COEFF= 0.3
AD_COEFF_FLOW= 0.02
CONV_NUM_METHOD_TURB= SCALAR_UPWIND-2ND_ORDER
VISC_NUM_METHOD_FLOW= AVG_GRAD
VISC_NUM_METHOD_TURB= AVG_GRAD
RESTART_FLOW_FILENAME= restart_flow.dat
SOLUTION_FLOW_FILENAME= solution_flow.dat
";

/// Stand-in solver: writes a restart file, then fails on the corrected
/// gradient scheme so the sweep has a failing case.
const FAKE_SOLVER: &str = r#"cfg="$1"
echo "reading $cfg"
cp "$cfg" restart_flow.dat
if grep -q "AVG_GRAD_CORRECTED" "$cfg"; then
  echo "residuals diverged" >&2
  exit 2
fi
echo "converged"
"#;

struct Fixture {
    _root: TempDir,
    config: SweepConfig,
    baseline: Options,
}

fn fixture() -> Fixture {
    let root = TempDir::new().unwrap();
    let mut config = SweepConfig::from_root(Some(root.path()), "flatplate").unwrap();
    std::fs::create_dir_all(&config.data_dir).unwrap();
    std::fs::write(config.baseline_path(), BASELINE).unwrap();

    let solver = root.path().join("fake_solver.sh");
    std::fs::write(&solver, FAKE_SOLVER).unwrap();
    config.solver = "sh".into();
    config.solver_args = vec![solver.to_string_lossy().into_owned()];
    config.policy = ConcurrencyPolicy::bounded(2).unwrap();
    config.validate().unwrap();

    let baseline = Options::load(&config.baseline_path()).unwrap();
    Fixture {
        _root: root,
        config,
        baseline,
    }
}

#[test]
fn test_none_variation_runs_only_the_baseline() {
    let fx = fixture();
    let cases = VariationRegistry::builtin()
        .plan("none", &fx.config, &fx.baseline)
        .unwrap();
    assert_eq!(cases.len(), 1);

    let batch = Batch::prepare(&fx.baseline, cases).unwrap();
    assert_eq!(batch.len(), 1);
    let written = Options::load(&batch.entries()[0].case.config_path()).unwrap();
    let mesh = fx
        .config
        .data_dir
        .join("mesh_flatplate_turb_137x97.su2")
        .to_string_lossy()
        .into_owned();
    assert_eq!(written.get("MESH_FILENAME"), Some(mesh.as_str()));
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_visc_num_method_sweep_end_to_end() {
    let fx = fixture();
    let cases = VariationRegistry::builtin()
        .plan("ViscNumMethod", &fx.config, &fx.baseline)
        .unwrap();
    let batch = Batch::prepare(&fx.baseline, cases).unwrap();
    assert!(batch.entries().iter().all(|e| e.is_ready()));

    let runner = BatchRunner::new(fx.config.policy, Arc::new(fx.config.launcher()));
    let report = runner.run(&batch).await.unwrap();

    let lines = case_lines(&batch, &report).unwrap();
    let summary = render_summary(&lines);
    let rendered: Vec<&str> = summary.lines().collect();
    assert_eq!(rendered[0], "Case base ran successfully");
    assert_eq!(rendered[1], "Case avggrad ran successfully");
    assert!(rendered[2].starts_with("Error running case avggrad_corr: solver exited with code 2"));
    assert!(rendered[2].contains("residuals diverged"));
    assert_eq!(rendered[3], "2/3 cases succeeded");
    assert_eq!(report.exit_code(), 1);

    let artifact = build_artifact("ViscNumMethod", &batch, &report).unwrap();
    assert_eq!(artifact.total_cases, 3);
    assert_eq!(artifact.passed_cases, 2);

    // Variant cases land under the results tree, the baseline under data.
    let corr_dir = fx.config.results_dir.join("ViscNumMethod/avggrad_corr");
    assert!(corr_dir.join("avggrad_corrconfig.cfg").is_file());
    assert!(corr_dir.join("avggrad_corr_log.txt").is_file());
    assert!(fx.config.data_dir.join("base/base_log.txt").is_file());

    // Finalize runs for every case, including the failed one.
    let first = finalize_batch(&batch, &fx.baseline);
    assert_eq!(first, vec![FinalizeOutcome::Promoted; 3]);
    let solution = corr_dir.join("solution_flow.dat");
    let once = std::fs::read(&solution).unwrap();

    let second = finalize_batch(&batch, &fx.baseline);
    assert_eq!(second, vec![FinalizeOutcome::AlreadyPromoted; 3]);
    assert_eq!(std::fs::read(&solution).unwrap(), once);
}

#[cfg(unix)]
#[tokio::test]
async fn test_rerunning_a_batch_keeps_solution_identical() {
    let fx = fixture();
    let cases = VariationRegistry::builtin()
        .plan("TurbOrder", &fx.config, &fx.baseline)
        .unwrap();
    let batch = Batch::prepare(&fx.baseline, cases).unwrap();
    let runner = BatchRunner::new(ConcurrencyPolicy::Serial, Arc::new(fx.config.launcher()));

    runner.run(&batch).await.unwrap();
    finalize_batch(&batch, &fx.baseline);
    let dir = fx.config.results_dir.join("TurbOrder/firstorder");
    let after_one = std::fs::read(dir.join("solution_flow.dat")).unwrap();

    let report = runner.run(&batch).await.unwrap();
    assert!(report.all_passed());
    finalize_batch(&batch, &fx.baseline);
    let after_two = std::fs::read(dir.join("solution_flow.dat")).unwrap();

    assert_eq!(after_one, after_two);
}
