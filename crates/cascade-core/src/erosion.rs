//! Erosion resolver: a shared resilience degradation factor driven by one
//! designated module's own tension.

use cascade_network::{ModuleStore, NetworkError};
use cascade_types::ModuleId;

/// Computes the per-tick erosion factor.
///
/// With a source module configured, the factor is
/// `max(floor, 1 - T_src)` capped at `1.0`, where `T_src = beta*E - damping*F`
/// is the source's uneroded instantaneous tension.
/// Without a source the factor is always `1.0`.
///
/// The factor is non-increasing in the source's excitation only while the
/// source's `beta` is non-negative. A negative gain inverts that relation;
/// it is accepted at load and reported as a `CoefficientFlagged` record.
#[derive(Debug, Clone, PartialEq)]
pub struct ErosionResolver {
    source: Option<ModuleId>,
    floor: f64,
}

impl ErosionResolver {
    /// Create a resolver.
    pub const fn new(source: Option<ModuleId>, floor: f64) -> Self {
        Self { source, floor }
    }

    /// A resolver that never erodes.
    pub const fn disabled() -> Self {
        Self {
            source: None,
            floor: 1.0,
        }
    }

    /// The erosion source, if one is configured.
    pub const fn source(&self) -> Option<&ModuleId> {
        self.source.as_ref()
    }

    /// Whether `id` is the erosion source (which never erodes itself).
    pub fn is_source(&self, id: &ModuleId) -> bool {
        self.source.as_ref() == Some(id)
    }

    /// The source module's own tension, if a source is configured.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::ModuleNotFound`] if the source is not in the
    /// store.
    pub fn source_tension(&self, store: &ModuleStore) -> Result<Option<f64>, NetworkError> {
        match self.source {
            Some(ref id) => Ok(Some(store.get(id)?.instantaneous_tension(1.0))),
            None => Ok(None),
        }
    }

    /// The factor for the store's current state, in `[floor, 1.0]`.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::ModuleNotFound`] if the source is not in the
    /// store.
    pub fn erosion_factor(&self, store: &ModuleStore) -> Result<f64, NetworkError> {
        Ok(self
            .source_tension(store)?
            .map_or(1.0, |t| self.factor_for(t)))
    }

    /// The factor for a given source tension.
    pub fn factor_for(&self, source_tension: f64) -> f64 {
        (1.0 - source_tension).max(self.floor).min(1.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use cascade_types::{Coefficients, ModuleState, TensionKind};

    use super::*;

    fn store_with_source(excitation: f64) -> ModuleStore {
        let mut store = ModuleStore::new();
        store
            .insert(ModuleState::new(
                ModuleId::from("viral"),
                TensionKind::Instantaneous,
                excitation,
                0.5,
                Coefficients::new(0.0, 1.2, 0.6),
            ))
            .unwrap();
        store
    }

    #[test]
    fn no_source_means_no_erosion() {
        let resolver = ErosionResolver::new(None, 0.1);
        let factor = resolver.erosion_factor(&store_with_source(5.0)).unwrap();
        assert!((factor - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn factor_follows_source_tension() {
        let resolver = ErosionResolver::new(Some(ModuleId::from("viral")), 0.1);
        // T = 1.2 * 0.5 - 0.6 * 0.5 = 0.3
        let factor = resolver.erosion_factor(&store_with_source(0.5)).unwrap();
        assert!((factor - 0.7).abs() < 1e-12);
    }

    #[test]
    fn factor_is_floored_and_capped() {
        let resolver = ErosionResolver::new(Some(ModuleId::from("viral")), 0.1);
        assert!((resolver.factor_for(3.0) - 0.1).abs() < 1e-12);
        assert!((resolver.factor_for(-2.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn more_excitation_never_raises_the_factor() {
        let resolver = ErosionResolver::new(Some(ModuleId::from("viral")), 0.1);
        let mut previous = f64::INFINITY;
        for step in 0..40_u8 {
            let e = f64::from(step) * 0.05;
            let factor = resolver.erosion_factor(&store_with_source(e)).unwrap();
            assert!(factor <= previous);
            previous = factor;
        }
    }

    #[test]
    fn negative_source_gain_inverts_monotonicity() {
        let resolver = ErosionResolver::new(Some(ModuleId::from("viral")), 0.1);
        let mut store = ModuleStore::new();
        store
            .insert(ModuleState::new(
                ModuleId::from("viral"),
                TensionKind::Instantaneous,
                0.2,
                -2.0,
                Coefficients::new(0.0, -1.0, 0.6),
            ))
            .unwrap();
        // T = -E + 0.6 * 2.0, so the factor falls as E falls
        let low = resolver.erosion_factor(&store).unwrap();
        store.set_excitation(&ModuleId::from("viral"), 1.0).unwrap();
        let high = resolver.erosion_factor(&store).unwrap();
        assert!(high > low);
    }

    #[test]
    fn missing_source_is_not_found() {
        let resolver = ErosionResolver::new(Some(ModuleId::from("ghost")), 0.1);
        assert!(resolver.erosion_factor(&store_with_source(0.1)).is_err());
    }
}
