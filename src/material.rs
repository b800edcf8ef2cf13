//! Multi-group material cross-section data
//!
//! Materials are read-only after construction. All per-group arrays are padded to the vector
//! length and stored aligned, so the solver can consume them directly in the sweep loops. The
//! scatter matrix is row-major with one padded row per destination group:
//! `sigma_s[g_to * padded_groups + g_from]`.

use thiserror::Error as ThisError;

use crate::aligned::{AlignedVec, VectorLength};
use crate::Real;

/// Dense handle of a material in the material slice passed to the solver
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct MaterialId(pub u32);

impl MaterialId {
    /// Returns the handle as an array index
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Error type returned when material data is rejected
#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum MaterialDataError {
    /// A cross-section array has the wrong number of entries
    #[error("material `{name}`: {array} must have {expected} entries, got {got}")]
    WrongLength {
        name: String,
        array: &'static str,
        expected: usize,
        got: usize,
    },
    /// A cross-section array contains a negative entry
    #[error("material `{name}`: negative {array} entry at group index {group}")]
    NegativeEntry {
        name: String,
        array: &'static str,
        group: usize,
    },
}

/// Read-only multi-group cross-sections of one material
#[derive(Clone, Debug)]
pub struct Material<R: Real> {
    name: String,
    num_groups: usize,
    padded_groups: usize,
    sigma_t: AlignedVec<R>,
    sigma_a: AlignedVec<R>,
    nu_sigma_f: AlignedVec<R>,
    chi: AlignedVec<R>,
    sigma_s: AlignedVec<R>,
}

impl<R: Real> Material<R> {
    /// Validates, pads and aligns the given group data
    ///
    /// `sigma_s` is the row-major G x G scatter matrix with the destination group as the row
    /// index: entry `[g_to * num_groups + g_from]` scatters from `g_from` into `g_to`.
    pub fn new(
        name: impl Into<String>,
        sigma_t: &[R],
        sigma_a: &[R],
        nu_sigma_f: &[R],
        chi: &[R],
        sigma_s: &[R],
        vector_length: VectorLength,
    ) -> Result<Self, MaterialDataError> {
        let name = name.into();
        let num_groups = sigma_t.len();

        for (array, data) in [
            ("sigma_a", sigma_a),
            ("nu_sigma_f", nu_sigma_f),
            ("chi", chi),
        ] {
            if data.len() != num_groups {
                return Err(MaterialDataError::WrongLength {
                    name,
                    array,
                    expected: num_groups,
                    got: data.len(),
                });
            }
        }
        if sigma_s.len() != num_groups * num_groups {
            return Err(MaterialDataError::WrongLength {
                name,
                array: "sigma_s",
                expected: num_groups * num_groups,
                got: sigma_s.len(),
            });
        }
        for (array, data) in [
            ("sigma_t", sigma_t),
            ("sigma_a", sigma_a),
            ("nu_sigma_f", nu_sigma_f),
            ("chi", chi),
            ("sigma_s", sigma_s),
        ] {
            if let Some(group) = data.iter().position(|&v| v < R::zero()) {
                return Err(MaterialDataError::NegativeEntry { name, array, group });
            }
        }

        let padded_groups = vector_length.pad(num_groups);
        let mut padded_sigma_s = AlignedVec::zeros(num_groups * padded_groups);
        for g_to in 0..num_groups {
            padded_sigma_s.as_mut_slice()[g_to * padded_groups..g_to * padded_groups + num_groups]
                .copy_from_slice(&sigma_s[g_to * num_groups..(g_to + 1) * num_groups]);
        }

        Ok(Self {
            name,
            num_groups,
            padded_groups,
            sigma_t: AlignedVec::from_slice(sigma_t, padded_groups),
            sigma_a: AlignedVec::from_slice(sigma_a, padded_groups),
            nu_sigma_f: AlignedVec::from_slice(nu_sigma_f, padded_groups),
            chi: AlignedVec::from_slice(chi, padded_groups),
            sigma_s: padded_sigma_s,
        })
    }

    /// Returns the name of the material
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of energy groups (before padding)
    pub fn num_groups(&self) -> usize {
        self.num_groups
    }

    /// Returns the group count after padding to the vector length
    pub fn padded_groups(&self) -> usize {
        self.padded_groups
    }

    /// Total cross-section per group, zero-padded to the vector length
    pub fn sigma_t(&self) -> &[R] {
        self.sigma_t.as_slice()
    }

    /// Absorption cross-section per group, zero-padded to the vector length
    pub fn sigma_a(&self) -> &[R] {
        self.sigma_a.as_slice()
    }

    /// Fission production cross-section per group, zero-padded to the vector length
    pub fn nu_sigma_f(&self) -> &[R] {
        self.nu_sigma_f.as_slice()
    }

    /// Fission spectrum per group, zero-padded to the vector length
    pub fn chi(&self) -> &[R] {
        self.chi.as_slice()
    }

    /// Scatter row into destination group `g_to`, zero-padded to the vector length
    pub fn scatter_row(&self, g_to: usize) -> &[R] {
        &self.sigma_s.as_slice()[g_to * self.padded_groups..(g_to + 1) * self.padded_groups]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padding_and_layout() {
        let material = Material::new(
            "fuel",
            &[1.0f64, 2.0, 3.0],
            &[0.1, 0.2, 0.3],
            &[0.5, 0.0, 0.0],
            &[1.0, 0.0, 0.0],
            &[
                0.1, 0.2, 0.3, //
                0.4, 0.5, 0.6, //
                0.7, 0.8, 0.9,
            ],
            VectorLength::Eight,
        )
        .unwrap();

        assert_eq!(material.num_groups(), 3);
        assert_eq!(material.padded_groups(), 8);
        assert_eq!(material.sigma_t().len(), 8);
        assert_eq!(&material.sigma_t()[..3], &[1.0, 2.0, 3.0]);
        assert!(material.sigma_t()[3..].iter().all(|&v| v == 0.0));
        assert_eq!(material.sigma_t().as_ptr() as usize % 64, 0);

        let row = material.scatter_row(1);
        assert_eq!(row.len(), 8);
        assert_eq!(&row[..3], &[0.4, 0.5, 0.6]);
        assert!(row[3..].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn wrong_lengths_are_rejected() {
        let result = Material::new(
            "bad",
            &[1.0f64, 1.0],
            &[0.1],
            &[0.0, 0.0],
            &[1.0, 0.0],
            &[0.0; 4],
            VectorLength::Four,
        );
        assert!(matches!(
            result,
            Err(MaterialDataError::WrongLength {
                array: "sigma_a",
                expected: 2,
                got: 1,
                ..
            })
        ));
    }

    #[test]
    fn negative_entries_are_rejected() {
        let result = Material::new(
            "bad",
            &[1.0f64, 1.0],
            &[0.1, 0.1],
            &[0.0, -0.2],
            &[1.0, 0.0],
            &[0.0; 4],
            VectorLength::Four,
        );
        assert!(matches!(
            result,
            Err(MaterialDataError::NegativeEntry {
                array: "nu_sigma_f",
                group: 1,
                ..
            })
        ));
    }
}
