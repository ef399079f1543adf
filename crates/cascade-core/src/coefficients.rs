//! Coefficient providers: where each module's `{alpha, beta, gamma}` comes
//! from at load time.
//!
//! The [`CoefficientProvider`] trait abstracts the calibration source. It is
//! consulted once per module while an engine is built and never again.
//! [`StaticCoefficients`] serves an in-memory table; [`DirectoryCoefficients`]
//! reads `<root>/<module>/coefficients.json` files shaped
//! `{"coefficients": {"alpha": .., "beta": .., "gamma": ..}}`.

use std::collections::BTreeMap;
use std::path::PathBuf;

use cascade_types::{Coefficients, ModuleId};
use serde::Deserialize;
use tracing::debug;

use crate::config::{ConfigError, ModuleConfig};

/// A source of per-module calibration coefficients.
pub trait CoefficientProvider {
    /// Load the coefficients for one module.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingCoefficients`] when the provider has
    /// nothing for `module`, or a parse/I/O error from the backing store.
    fn load(&self, module: &ModuleId) -> Result<Coefficients, ConfigError>;
}

/// In-memory coefficient table.
#[derive(Debug, Clone, Default)]
pub struct StaticCoefficients {
    table: BTreeMap<ModuleId, Coefficients>,
}

impl StaticCoefficients {
    /// Create an empty table.
    pub const fn new() -> Self {
        Self {
            table: BTreeMap::new(),
        }
    }

    /// Add or replace one module's coefficients.
    #[must_use]
    pub fn with(mut self, module: impl Into<ModuleId>, coefficients: Coefficients) -> Self {
        self.table.insert(module.into(), coefficients);
        self
    }
}

impl CoefficientProvider for StaticCoefficients {
    fn load(&self, module: &ModuleId) -> Result<Coefficients, ConfigError> {
        self.table
            .get(module)
            .copied()
            .ok_or_else(|| ConfigError::MissingCoefficients(module.clone()))
    }
}

/// Reads calibration files from a directory tree.
#[derive(Debug, Clone)]
pub struct DirectoryCoefficients {
    root: PathBuf,
}

/// On-disk shape of a `coefficients.json` file.
#[derive(Deserialize)]
struct CoefficientFile {
    coefficients: Coefficients,
}

impl DirectoryCoefficients {
    /// Serve coefficients from `root/<module>/coefficients.json`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, module: &ModuleId) -> PathBuf {
        self.root.join(module.as_str()).join("coefficients.json")
    }
}

impl CoefficientProvider for DirectoryCoefficients {
    fn load(&self, module: &ModuleId) -> Result<Coefficients, ConfigError> {
        let path = self.path_for(module);
        if !path.is_file() {
            return Err(ConfigError::MissingCoefficients(module.clone()));
        }
        let contents = std::fs::read_to_string(&path)?;
        let file: CoefficientFile = serde_json::from_str(&contents)
            .map_err(|source| ConfigError::Json { path: path.clone(), source })?;
        debug!(module = %module, path = %path.display(), "Loaded coefficients");
        Ok(file.coefficients)
    }
}

/// Resolve a module's coefficients: inline config first, then the provider.
///
/// Non-finite values are rejected. Out-of-range (negative) gains are
/// accepted here and flagged by the engine.
///
/// # Errors
///
/// Returns [`ConfigError::MissingCoefficients`] if neither source has the
/// module, or [`ConfigError::InvalidValue`] for non-finite coefficients.
pub fn resolve(
    module: &ModuleConfig,
    provider: &dyn CoefficientProvider,
) -> Result<Coefficients, ConfigError> {
    let coefficients = match module.coefficients {
        Some(inline) => inline,
        None => provider.load(&module.id)?,
    };
    if !coefficients.is_finite() {
        return Err(ConfigError::InvalidValue {
            field: format!("modules.{}.coefficients", module.id),
            reason: "coefficients must be finite".to_owned(),
        });
    }
    Ok(coefficients)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use cascade_types::TensionKind;

    use super::*;

    fn module(id: &str, inline: Option<Coefficients>) -> ModuleConfig {
        ModuleConfig {
            id: ModuleId::from(id),
            excitation: 0.0,
            resilience: 1.0,
            kind: TensionKind::Instantaneous,
            integrity: None,
            firewall_gamma_multiplier: None,
            coefficients: inline,
        }
    }

    #[test]
    fn inline_coefficients_win() {
        let provider = StaticCoefficients::new().with("urban", Coefficients::new(0.0, 9.0, 9.0));
        let inline = Coefficients::new(0.1, 2.0, 0.5);
        let resolved = resolve(&module("urban", Some(inline)), &provider).unwrap();
        assert_eq!(resolved, inline);
    }

    #[test]
    fn falls_back_to_provider() {
        let provider = StaticCoefficients::new().with("urban", Coefficients::new(0.0, 3.5, 0.8));
        let resolved = resolve(&module("urban", None), &provider).unwrap();
        assert!((resolved.beta - 3.5).abs() < 1e-12);
    }

    #[test]
    fn missing_coefficients_is_config_error() {
        let provider = StaticCoefficients::new();
        let result = resolve(&module("urban", None), &provider);
        assert!(matches!(result, Err(ConfigError::MissingCoefficients(_))));
    }

    #[test]
    fn non_finite_coefficients_are_rejected() {
        let provider = StaticCoefficients::new();
        let bad = Coefficients::new(0.0, f64::NAN, 1.0);
        let result = resolve(&module("urban", Some(bad)), &provider);
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn negative_gains_are_accepted() {
        let provider = StaticCoefficients::new();
        let odd = Coefficients::new(0.0, 1.0, -0.5);
        assert!(resolve(&module("urban", Some(odd)), &provider).is_ok());
    }

    #[test]
    fn reads_coefficient_files() {
        let root = std::env::temp_dir().join(format!("cascade-coeffs-{}", std::process::id()));
        let dir = root.join("social");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("coefficients.json"),
            r#"{"coefficients": {"alpha": 0.05, "beta": 3.5, "gamma": 0.8}}"#,
        )
        .unwrap();
        std::fs::create_dir_all(root.join("broken")).unwrap();
        std::fs::write(root.join("broken").join("coefficients.json"), "{not json").unwrap();

        let provider = DirectoryCoefficients::new(&root);
        let c = provider.load(&ModuleId::from("social")).unwrap();
        assert!((c.gamma - 0.8).abs() < 1e-12);
        assert!(matches!(
            provider.load(&ModuleId::from("finance")),
            Err(ConfigError::MissingCoefficients(_))
        ));
        assert!(matches!(
            provider.load(&ModuleId::from("broken")),
            Err(ConfigError::Json { .. })
        ));

        let _ = std::fs::remove_dir_all(&root);
    }
}
