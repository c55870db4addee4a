//! Owned simulator result vectors

use num_complex::Complex64;

/// Data of a result vector, decoded by its declared type
#[derive(Debug, Clone, PartialEq)]
pub enum VectorData {
    Real(Vec<f64>),
    Complex(Vec<Complex64>),
}

/// A named simulator output trace copied out of the engine
#[derive(Debug, Clone, PartialEq)]
pub struct ResultVector {
    pub name: String,
    pub data: VectorData,
}

impl ResultVector {
    pub fn new(name: impl Into<String>, data: VectorData) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    pub fn len(&self) -> usize {
        match &self.data {
            VectorData::Real(v) => v.len(),
            VectorData::Complex(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn is_complex(&self) -> bool {
        matches!(self.data, VectorData::Complex(_))
    }

    /// Values as complex numbers (real data gets a zero imaginary part)
    pub fn to_complex(&self) -> Vec<Complex64> {
        match &self.data {
            VectorData::Real(v) => v.iter().map(|&x| Complex64::new(x, 0.0)).collect(),
            VectorData::Complex(v) => v.clone(),
        }
    }

    /// Real values; complex data yields its real part
    ///
    /// An AC plot stores the `frequency` scale as complex with zero imaginary part.
    pub fn to_real(&self) -> Vec<f64> {
        match &self.data {
            VectorData::Real(v) => v.clone(),
            VectorData::Complex(v) => v.iter().map(|c| c.re).collect(),
        }
    }
}
