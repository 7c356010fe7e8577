//! Profile-driven setpoint controller.

use std::sync::Arc;

use pl_core::Real;
use pl_data::{DataError, DataSource};
use pl_net::{CellRef, NetworkModel};
use tracing::trace;

use crate::controller::{Controller, ModelAccess, StepContext};
use crate::error::{ControlError, ControlResult};

/// Writes profile values into `table[indices].column` once per time step.
///
/// Profiles are given either one per index or as a single profile shared
/// by every index. Values are multiplied by `scale_factor` on lookup.
/// After its write in the first control round the controller reports
/// convergence, so a level containing only constant controls needs one
/// correction round per step.
pub struct ConstControl {
    name: String,
    table: String,
    column: String,
    indices: Vec<usize>,
    source: Arc<dyn DataSource>,
    profiles: Vec<String>,
    scale_factor: Real,
    target: Option<Vec<Real>>,
}

impl ConstControl {
    pub fn new(
        table: impl Into<String>,
        column: impl Into<String>,
        indices: Vec<usize>,
        source: Arc<dyn DataSource>,
        profiles: Vec<String>,
    ) -> ControlResult<Self> {
        if indices.is_empty() {
            return Err(ControlError::InvalidArg {
                what: "ConstControl needs at least one element index",
            });
        }
        if profiles.len() != indices.len() && profiles.len() != 1 {
            return Err(ControlError::InvalidArg {
                what: "ConstControl needs one profile per index or a single shared profile",
            });
        }
        let table = table.into();
        let column = column.into();
        Ok(Self {
            name: format!("const {table}.{column}"),
            table,
            column,
            indices,
            source,
            profiles,
            scale_factor: 1.0,
            target: None,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_scale_factor(mut self, scale_factor: Real) -> ControlResult<Self> {
        if !scale_factor.is_finite() {
            return Err(ControlError::InvalidArg {
                what: "scale_factor must be finite",
            });
        }
        self.scale_factor = scale_factor;
        Ok(self)
    }

    /// Target values for the current step, once loaded.
    pub fn target(&self) -> Option<&[Real]> {
        self.target.as_deref()
    }

    fn profile_for(&self, position: usize) -> &str {
        if self.profiles.len() == 1 {
            &self.profiles[0]
        } else {
            &self.profiles[position]
        }
    }

    fn loaded(&self) -> ControlResult<&[Real]> {
        self.target().ok_or_else(|| ControlError::StateError {
            what: format!("'{}' has no target loaded; time_step was not called", self.name),
        })
    }
}

impl Controller for ConstControl {
    fn name(&self) -> &str {
        &self.name
    }

    fn writes(&self) -> Vec<CellRef> {
        self.indices
            .iter()
            .map(|&i| CellRef::new(self.table.as_str(), i, self.column.as_str()))
            .collect()
    }

    fn initialize_run(&mut self, net: &NetworkModel) -> ControlResult<()> {
        for &index in &self.indices {
            net.get(&self.table, index, &self.column)?;
        }
        let known = self.source.profiles();
        for profile in &self.profiles {
            if !known.contains(&profile.as_str()) {
                return Err(DataError::UnknownProfile {
                    profile: profile.clone(),
                }
                .into());
            }
        }
        self.target = None;
        Ok(())
    }

    fn time_step(&mut self, ctx: &StepContext) -> ControlResult<()> {
        let values = (0..self.indices.len())
            .map(|pos| {
                self.source
                    .scaled_value(ctx.time, self.profile_for(pos), self.scale_factor)
            })
            .collect::<Result<Vec<_>, _>>()?;
        trace!(controller = %self.name, time = ctx.time, ?values, "loaded targets");
        self.target = Some(values);
        Ok(())
    }

    fn is_converged(&self, net: &NetworkModel) -> ControlResult<bool> {
        let target = self.loaded()?;
        for (&index, &value) in self.indices.iter().zip(target) {
            if net.get(&self.table, index, &self.column)? != value {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn control_step(&mut self, access: &mut ModelAccess<'_>) -> ControlResult<()> {
        let target = self.loaded()?.to_vec();
        for (&index, value) in self.indices.iter().zip(target) {
            access.write(&self.table, index, &self.column, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control_loop::Visibility;
    use pl_core::s;
    use pl_data::FrameData;
    use pl_net::Row;

    fn source() -> Arc<dyn DataSource> {
        Arc::new(
            FrameData::from_columns([
                ("a", vec![10.0, 20.0, 30.0]),
                ("b", vec![1.0, 2.0, 3.0]),
            ])
            .unwrap(),
        )
    }

    fn net() -> NetworkModel {
        let mut net = NetworkModel::new();
        net.insert_row("load", 0, Row::new().with("p_mw", 0.0)).unwrap();
        net.insert_row("load", 1, Row::new().with("p_mw", 0.0)).unwrap();
        net
    }

    fn apply(ctrl: &mut ConstControl, net: &mut NetworkModel) {
        let solved = net.clone();
        let mut access = ModelAccess::new(net, &solved, Visibility::PriorIteration);
        ctrl.control_step(&mut access).unwrap();
    }

    #[test]
    fn profile_count_must_match() {
        let err = ConstControl::new("load", "p_mw", vec![0, 1, 2], source(), vec!["a".into(), "b".into()]);
        assert!(err.is_err());
        assert!(ConstControl::new("load", "p_mw", vec![], source(), vec!["a".into()]).is_err());
    }

    #[test]
    fn no_target_is_an_error_not_converged() {
        let ctrl = ConstControl::new("load", "p_mw", vec![0], source(), vec!["a".into()]).unwrap();
        assert!(matches!(
            ctrl.is_converged(&net()),
            Err(ControlError::StateError { .. })
        ));
    }

    #[test]
    fn writes_scaled_values_once_per_step() {
        let mut ctrl = ConstControl::new("load", "p_mw", vec![0, 1], source(), vec!["a".into(), "b".into()])
            .unwrap()
            .with_scale_factor(0.5)
            .unwrap();
        let mut net = net();
        ctrl.initialize_run(&net).unwrap();
        ctrl.time_step(&StepContext::new(1, 0, s(0.0))).unwrap();
        assert!(!ctrl.is_converged(&net).unwrap());

        apply(&mut ctrl, &mut net);
        assert!(ctrl.is_converged(&net).unwrap());
        assert_eq!(net.get("load", 0, "p_mw").unwrap(), 10.0);
        assert_eq!(net.get("load", 1, "p_mw").unwrap(), 1.0);
    }

    #[test]
    fn shared_profile_applies_to_every_index() {
        let mut ctrl = ConstControl::new("load", "p_mw", vec![0, 1], source(), vec!["b".into()]).unwrap();
        let mut net = net();
        ctrl.time_step(&StepContext::new(2, 0, s(0.0))).unwrap();
        apply(&mut ctrl, &mut net);
        assert_eq!(net.get("load", 0, "p_mw").unwrap(), 3.0);
        assert_eq!(net.get("load", 1, "p_mw").unwrap(), 3.0);
    }

    #[test]
    fn lookup_errors_propagate() {
        let mut ctrl = ConstControl::new("load", "p_mw", vec![0], source(), vec!["a".into()]).unwrap();
        let err = ctrl.time_step(&StepContext::new(7, 0, s(0.0))).unwrap_err();
        assert_eq!(err, ControlError::Data(DataError::UnknownTimeStep { time: 7 }));
        assert!(ctrl.target().is_none());
    }

    #[test]
    fn initialize_checks_cells_and_profiles() {
        let mut missing_profile =
            ConstControl::new("load", "p_mw", vec![0], source(), vec!["zzz".into()]).unwrap();
        assert!(missing_profile.initialize_run(&net()).is_err());

        let mut missing_cell = ConstControl::new("load", "q_mvar", vec![0], source(), vec!["a".into()]).unwrap();
        assert!(missing_cell.initialize_run(&net()).is_err());
    }
}
