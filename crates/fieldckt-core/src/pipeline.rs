//! End-to-end flow: load, fit, enforce passivity, synthesize, simulate
//!
//! ```rust,ignore
//! use fieldckt_core::{NgspiceEngine, Pipeline, PipelineConfig};
//!
//! let config = PipelineConfig::from_json_file("fit.json")?;
//! let pipeline = Pipeline::new(config)?;
//! let output = pipeline.run(&files)?;
//! output.netlist.write_to("antenna.cir")?;
//!
//! let engine = NgspiceEngine::load(None)?;
//! let report = pipeline.simulate(&output, engine)?;
//! println!("S11 rms error {:.3e}", report.metrics.rms_error);
//! ```

use std::path::Path;
use std::time::Duration;

use num_complex::Complex64;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::loader::load_files;
use crate::network::NetworkResponse;
use crate::ngspice::{SimulationError, SimulationSession, SpiceEngine};
use crate::synthesis::{synthesize, testbench, CircuitNetlist};
use crate::validation::{compare, model_reflection, s_from_port_waves, validate_model};
use crate::validation::{ErrorMetrics, ModelValidation};
use crate::vector_fitting::{
    enforce_passivity, passivity_test, FitError, FitReport, PassivityTestResult, PoleResidueModel,
    VectorFitter,
};

/// Passivity stage outcome
#[derive(Debug, Clone)]
pub struct PassivityOutcome {
    /// Assessment of the final model
    pub test: PassivityTestResult,
    pub iterations: usize,
    pub d_clipped: bool,
    /// Reason enforcement stopped short; the best-effort model was kept
    pub warning: Option<String>,
}

/// Everything produced by `Pipeline::run`
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub response: NetworkResponse,
    pub fit: FitReport,
    /// Final model (after passivity enforcement when enabled)
    pub model: PoleResidueModel,
    pub passivity: Option<PassivityOutcome>,
    pub netlist: CircuitNetlist,
    pub validation: ModelValidation,
}

/// Simulated versus modelled reflection at the excited port
#[derive(Debug, Clone)]
pub struct SimulationReport {
    pub excited_port: usize,
    pub frequencies: Vec<f64>,
    pub simulated: Vec<Complex64>,
    pub modelled: Vec<Complex64>,
    pub metrics: ErrorMetrics,
    /// Simulator output captured during the session
    pub output: Vec<String>,
}

/// Configured pipeline
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    #[inline]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Load the files and produce a fitted model and its netlist
    pub fn run<P: AsRef<Path>>(&self, files: &[P]) -> Result<PipelineOutput> {
        let response = load_files(files, &self.config.loader)?;
        let fit = VectorFitter::new(self.config.fit.clone())?.fit(&response)?;

        let (model, passivity) = if self.config.passivity.enabled {
            let (model, outcome) = self.passivity_stage(&fit.model)?;
            (model, Some(outcome))
        } else {
            (fit.model.clone(), None)
        };

        let ports = self.config.synthesis.port_names_for(model.nports());
        let netlist = synthesize(&model, &self.config.synthesis.subckt_name, &ports)?;
        let validation = validate_model(&model, &response)?;

        info!(
            model_order = model.model_order(),
            rms_error = validation.overall.rms_error,
            subckt = netlist.name(),
            "pipeline finished"
        );

        Ok(PipelineOutput {
            response,
            fit,
            model,
            passivity,
            netlist,
            validation,
        })
    }

    fn passivity_stage(
        &self,
        model: &PoleResidueModel,
    ) -> Result<(PoleResidueModel, PassivityOutcome)> {
        let config = &self.config.passivity;
        let (model, iterations, d_clipped, warning) = match enforce_passivity(model, config) {
            Ok(result) => (result.model, result.iterations, result.d_clipped, None),
            Err(FitError::PassivityEnforcementFailed {
                iterations,
                worst,
                reason,
                d_clipped,
                model,
            }) => {
                warn!(
                    iterations,
                    worst,
                    reason = %reason,
                    "passivity enforcement did not converge, keeping best-effort model"
                );
                (*model, iterations, d_clipped, Some(reason))
            }
            Err(err) => return Err(err.into()),
        };
        let test = passivity_test(&model, config)?;
        Ok((
            model,
            PassivityOutcome {
                test,
                iterations,
                d_clipped,
                warning,
            },
        ))
    }

    /// Simulate the synthesized netlist and compare S_kk with the model
    pub fn simulate<E: SpiceEngine>(
        &self,
        output: &PipelineOutput,
        engine: E,
    ) -> Result<SimulationReport> {
        let sim = &self.config.simulation;
        let bench = testbench(&output.netlist, sim.excited_port, sim.z0)?;
        let k = bench.excited_port();

        let mut session = SimulationSession::open(engine)?;
        session.load_netlist(bench.text())?;
        session.run(&sim.sweep, Duration::from_micros(sim.poll_interval_us))?;

        let frequencies = session.vector("frequency")?.to_real();
        let voltage = probe(&mut session, &bench.voltage_probes()[k])?.to_complex();
        let current = probe(&mut session, &bench.current_probes()[k])?.to_complex();
        let output_lines = session.quit();

        let simulated = s_from_port_waves(&voltage, &current, sim.z0)?;
        let modelled = model_reflection(&output.model, k, &frequencies, sim.z0)?;
        let metrics = compare(&frequencies, &simulated, &modelled)?;

        info!(
            port = k + 1,
            points = metrics.points,
            rms_error = metrics.rms_error,
            max_error = metrics.max_error,
            "simulation compared with model"
        );

        Ok(SimulationReport {
            excited_port: k,
            frequencies,
            simulated,
            modelled,
            metrics,
            output: output_lines,
        })
    }
}

/// Fetch a probe vector, falling back to ngspice's plain names
/// (`v(node)` as `node`, `i(vsrc)` as `vsrc#branch`)
fn probe<E: SpiceEngine>(
    session: &mut SimulationSession<E>,
    name: &str,
) -> std::result::Result<crate::ngspice::ResultVector, SimulationError> {
    match session.vector(name) {
        Err(SimulationError::VectorNotFound { .. }) => {
            let alias = if let Some(node) = name.strip_prefix("v(").and_then(|n| n.strip_suffix(')')) {
                node.to_string()
            } else if let Some(src) = name.strip_prefix("i(").and_then(|n| n.strip_suffix(')')) {
                format!("{}#branch", src)
            } else {
                return Err(SimulationError::VectorNotFound {
                    name: name.to_string(),
                });
            };
            session.vector(&alias).map_err(|e| match e {
                SimulationError::VectorNotFound { .. } => SimulationError::VectorNotFound {
                    name: name.to_string(),
                },
                other => other,
            })
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_invalid_config() {
        let mut config = PipelineConfig::default();
        config.simulation.z0 = 0.0;
        assert!(Pipeline::new(config).is_err());
    }

    #[test]
    fn test_run_without_files() {
        let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        let files: Vec<&Path> = Vec::new();
        assert!(matches!(
            pipeline.run(&files),
            Err(crate::Error::Load(crate::loader::LoadError::NoInputs))
        ));
    }

    #[test]
    fn test_failed_enforcement_keeps_clipping_flag() {
        use crate::network::ParameterKind;
        use crate::vector_fitting::Pole;
        use ndarray::{Array2, Array3};

        // |S(0)| = 1.6 and D = 1.1: not passive at any frequency
        let model = PoleResidueModel::new(
            vec![Pole::real(-1e9)],
            Array3::from_elem((1, 1, 1), Complex64::new(0.5e9, 0.0)),
            Some(Array2::from_elem((1, 1), 1.1)),
            None,
            ParameterKind::S,
            50.0,
            (1e6, 1e9),
        )
        .unwrap();
        let mut config = PipelineConfig::default();
        config.passivity.max_iterations = 0;
        let pipeline = Pipeline::new(config).unwrap();

        let (kept, outcome) = pipeline.passivity_stage(&model).unwrap();
        assert!(outcome.d_clipped);
        assert_eq!(outcome.iterations, 0);
        assert!(outcome.warning.is_some());
        assert!(kept.constant().unwrap()[[0, 0]] <= 1.0);
    }
}
