//! Network parameter conversion (S <-> Z)

use super::core::{FrequencySample, NetworkResponse, ParameterKind, ResponseError};
use crate::math::transforms::{s2z, z2s};

impl NetworkResponse {
    /// Convert every sample to the requested parameter kind
    ///
    /// `z0` is the real reference impedance applied to every port. Converting
    /// to the kind already held is a cheap clone.
    pub fn to_kind(&self, kind: ParameterKind, z0: f64) -> Result<NetworkResponse, ResponseError> {
        if kind == self.kind() {
            return Ok(self.clone());
        }
        if !z0.is_finite() || z0 <= 0.0 {
            return Err(ResponseError::InvalidReferenceImpedance(z0));
        }

        let z0_ports = vec![z0; self.nports()];
        let samples = self
            .samples()
            .iter()
            .map(|sample| {
                let converted = match kind {
                    ParameterKind::S => z2s(sample.matrix(), &z0_ports),
                    ParameterKind::Z => s2z(sample.matrix(), &z0_ports),
                }
                .ok_or(ResponseError::SingularConversion {
                    frequency: sample.frequency_hz(),
                })?;
                FrequencySample::new(sample.frequency_hz(), converted, kind)
            })
            .collect::<Result<Vec<_>, _>>()?;

        NetworkResponse::new(samples)
    }
}
