//! Storage state-of-charge bookkeeping.

use std::sync::Arc;

use pl_core::{Energy, Real, Time, in_hours, in_mwh};
use pl_data::DataSource;
use pl_net::names::{P_MW, SOC_PERCENT, STORAGE};
use pl_net::{CellRef, NetworkModel};
use tracing::trace;

use crate::controller::{Controller, ModelAccess, StepContext};
use crate::error::{ControlError, ControlResult};

/// Tracks the state of charge of one storage unit.
///
/// On every new time step the energy exchanged since the last booking is
/// added (`soc += p * dt_h / capacity_mwh * 100`, positive `p` charging) and
/// the SoC is clamped to its bounds. `p` is the power the model held when
/// the previous step finished, and `dt_h` runs on the step clock, so steps
/// this controller never saw are still booked. The next power setpoint is
/// then loaded from the profile, or kept from the model when no profile is
/// configured.
pub struct StorageControl {
    name: String,
    index: usize,
    capacity_mwh: Real,
    soc_percent: Real,
    min_soc: Real,
    max_soc: Real,
    profile: Option<(Arc<dyn DataSource>, String)>,
    scale_factor: Real,
    p_mw: Option<Real>,
    last_applied: Option<Real>,
    booked_at: Option<Time>,
}

impl StorageControl {
    pub fn new(index: usize, capacity: Energy, soc_percent: Real) -> ControlResult<Self> {
        let capacity_mwh = in_mwh(capacity);
        if !(capacity_mwh.is_finite() && capacity_mwh > 0.0) {
            return Err(ControlError::InvalidArg {
                what: "storage capacity must be positive",
            });
        }
        if !(0.0..=100.0).contains(&soc_percent) {
            return Err(ControlError::InvalidArg {
                what: "initial soc_percent must lie in 0..=100",
            });
        }
        Ok(Self {
            name: format!("storage {index}"),
            index,
            capacity_mwh,
            soc_percent,
            min_soc: 0.0,
            max_soc: 100.0,
            profile: None,
            scale_factor: 1.0,
            p_mw: None,
            last_applied: None,
            booked_at: None,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Drive `p_mw` from a profile.
    pub fn with_profile(
        mut self,
        source: Arc<dyn DataSource>,
        profile: impl Into<String>,
        scale_factor: Real,
    ) -> Self {
        self.profile = Some((source, profile.into()));
        self.scale_factor = scale_factor;
        self
    }

    pub fn with_soc_bounds(mut self, min_soc: Real, max_soc: Real) -> ControlResult<Self> {
        if !(0.0 <= min_soc && min_soc < max_soc && max_soc <= 100.0) {
            return Err(ControlError::InvalidArg {
                what: "soc bounds must satisfy 0 <= min < max <= 100",
            });
        }
        self.min_soc = min_soc;
        self.max_soc = max_soc;
        self.soc_percent = self.soc_percent.clamp(min_soc, max_soc);
        Ok(self)
    }

    pub fn soc_percent(&self) -> Real {
        self.soc_percent
    }

    /// Power setpoint for the current step, once known.
    pub fn p_mw(&self) -> Option<Real> {
        self.p_mw
    }

    fn setpoint(&self) -> ControlResult<Real> {
        self.p_mw.ok_or_else(|| ControlError::StateError {
            what: format!("'{}' has no power setpoint; time_step was not called", self.name),
        })
    }
}

impl Controller for StorageControl {
    fn name(&self) -> &str {
        &self.name
    }

    fn writes(&self) -> Vec<CellRef> {
        vec![
            CellRef::new(STORAGE, self.index, P_MW),
            CellRef::new(STORAGE, self.index, SOC_PERCENT),
        ]
    }

    fn initialize_run(&mut self, net: &NetworkModel) -> ControlResult<()> {
        let p = net.get(STORAGE, self.index, P_MW)?;
        if let Some((source, profile)) = &self.profile {
            if !source.profiles().contains(&profile.as_str()) {
                return Err(pl_data::DataError::UnknownProfile {
                    profile: profile.clone(),
                }
                .into());
            }
            self.p_mw = None;
        } else {
            self.p_mw = Some(p);
        }
        self.last_applied = None;
        self.booked_at = None;
        Ok(())
    }

    fn time_step(&mut self, ctx: &StepContext) -> ControlResult<()> {
        if let (Some(p), Some(since)) = (self.last_applied, self.booked_at) {
            let delta = p * in_hours(ctx.clock - since) / self.capacity_mwh * 100.0;
            self.soc_percent = (self.soc_percent + delta).clamp(self.min_soc, self.max_soc);
        }
        self.booked_at = Some(ctx.clock);
        if let Some((source, profile)) = &self.profile {
            self.p_mw = Some(source.scaled_value(ctx.time, profile, self.scale_factor)?);
        }
        trace!(
            controller = %self.name,
            time = ctx.time,
            soc = self.soc_percent,
            p_mw = ?self.p_mw,
            "storage step"
        );
        Ok(())
    }

    fn is_converged(&self, net: &NetworkModel) -> ControlResult<bool> {
        let p = self.setpoint()?;
        Ok(net.get(STORAGE, self.index, P_MW)? == p
            && net.get(STORAGE, self.index, SOC_PERCENT).ok() == Some(self.soc_percent))
    }

    fn control_step(&mut self, access: &mut ModelAccess<'_>) -> ControlResult<()> {
        let p = self.setpoint()?;
        access.write(STORAGE, self.index, P_MW, p)?;
        access.write(STORAGE, self.index, SOC_PERCENT, self.soc_percent)?;
        self.last_applied = Some(p);
        Ok(())
    }

    fn finalize_step(&mut self, net: &NetworkModel, _ctx: &StepContext) -> ControlResult<()> {
        // the loop may never call control_step when the model already matched
        self.last_applied = Some(net.get(STORAGE, self.index, P_MW)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control_loop::Visibility;
    use pl_core::{hours, minutes, mwh};
    use pl_data::FrameData;
    use pl_net::Row;
    use proptest::prelude::*;

    fn net() -> NetworkModel {
        let mut net = NetworkModel::new();
        net.insert_row(STORAGE, 0, Row::new().with(P_MW, 0.0)).unwrap();
        net
    }

    fn apply(ctrl: &mut StorageControl, net: &mut NetworkModel) {
        let solved = net.clone();
        let mut access = ModelAccess::new(net, &solved, Visibility::PriorIteration);
        ctrl.control_step(&mut access).unwrap();
    }

    #[test]
    fn rejects_bad_parameters() {
        assert!(StorageControl::new(0, mwh(0.0), 50.0).is_err());
        assert!(StorageControl::new(0, mwh(1.0), 120.0).is_err());
        assert!(
            StorageControl::new(0, mwh(1.0), 50.0)
                .unwrap()
                .with_soc_bounds(60.0, 40.0)
                .is_err()
        );
    }

    #[test]
    fn books_energy_of_previous_step() {
        let source: Arc<dyn DataSource> =
            Arc::new(FrameData::from_columns([("p", vec![1.0, -2.0, 0.0])]).unwrap());
        let mut ctrl = StorageControl::new(0, mwh(4.0), 50.0)
            .unwrap()
            .with_profile(source, "p", 1.0);
        let mut net = net();
        ctrl.initialize_run(&net).unwrap();

        ctrl.time_step(&StepContext::new(0, 0, hours(0.0))).unwrap();
        assert_eq!(ctrl.soc_percent(), 50.0);
        apply(&mut ctrl, &mut net);
        assert!(ctrl.is_converged(&net).unwrap());

        // 1 MW for 30 minutes into 4 MWh: +12.5 %
        ctrl.time_step(&StepContext::new(1, 1, minutes(30.0))).unwrap();
        assert!((ctrl.soc_percent() - 62.5).abs() < 1e-12);
        assert!(!ctrl.is_converged(&net).unwrap());
        apply(&mut ctrl, &mut net);
        assert_eq!(net.get(STORAGE, 0, P_MW).unwrap(), -2.0);
        assert!((net.get(STORAGE, 0, SOC_PERCENT).unwrap() - 62.5).abs() < 1e-12);

        // -2 MW for 1 hour: -50 %
        let ctx = StepContext::new(2, 2, hours(1.0)).at(minutes(90.0));
        ctrl.time_step(&ctx).unwrap();
        assert!((ctrl.soc_percent() - 12.5).abs() < 1e-12);
    }

    #[test]
    fn soc_is_clamped() {
        let mut ctrl = StorageControl::new(0, mwh(1.0), 90.0).unwrap();
        let mut net = net();
        net.set(STORAGE, 0, P_MW, 5.0).unwrap();
        ctrl.initialize_run(&net).unwrap();
        ctrl.time_step(&StepContext::new(0, 0, hours(0.0))).unwrap();
        apply(&mut ctrl, &mut net);
        ctrl.time_step(&StepContext::new(1, 1, hours(1.0))).unwrap();
        assert_eq!(ctrl.soc_percent(), 100.0);
    }

    #[test]
    fn books_power_found_on_model_at_finalize() {
        let mut ctrl = StorageControl::new(0, mwh(10.0), 50.0).unwrap();
        let mut net = net();
        net.set(STORAGE, 0, P_MW, 1.0).unwrap();
        net.set(STORAGE, 0, SOC_PERCENT, 50.0).unwrap();
        ctrl.initialize_run(&net).unwrap();

        let first = StepContext::new(0, 0, hours(0.0));
        ctrl.time_step(&first).unwrap();
        assert!(ctrl.is_converged(&net).unwrap());
        ctrl.finalize_step(&net, &first).unwrap();

        ctrl.time_step(&StepContext::new(1, 1, hours(1.0))).unwrap();
        assert!((ctrl.soc_percent() - 60.0).abs() < 1e-12);
    }

    #[test]
    fn catches_up_on_steps_it_did_not_see() {
        let mut ctrl = StorageControl::new(0, mwh(10.0), 50.0).unwrap();
        let mut net = net();
        net.set(STORAGE, 0, P_MW, 1.0).unwrap();
        ctrl.initialize_run(&net).unwrap();
        let first = StepContext::new(0, 0, hours(0.0));
        ctrl.time_step(&first).unwrap();
        apply(&mut ctrl, &mut net);
        ctrl.finalize_step(&net, &first).unwrap();

        // step 1 never reached this controller
        let ctx = StepContext::new(2, 1, hours(1.0)).at(hours(2.0));
        ctrl.time_step(&ctx).unwrap();
        assert!((ctrl.soc_percent() - 70.0).abs() < 1e-12);
    }

    #[test]
    fn control_step_is_idempotent() {
        let mut ctrl = StorageControl::new(0, mwh(1.0), 20.0).unwrap();
        let mut net = net();
        net.set(STORAGE, 0, P_MW, 0.3).unwrap();
        ctrl.initialize_run(&net).unwrap();
        ctrl.time_step(&StepContext::new(0, 0, hours(0.0))).unwrap();
        apply(&mut ctrl, &mut net);
        let first = net.clone();
        apply(&mut ctrl, &mut net);
        assert_eq!(first, net);
    }

    proptest! {
        #[test]
        fn soc_accumulates_power_over_capacity(
            powers in prop::collection::vec(-1.0_f64..1.0, 1..12),
            capacity in 10.0_f64..100.0,
        ) {
            let source: Arc<dyn DataSource> =
                Arc::new(FrameData::from_columns([("p", powers.clone())]).unwrap());
            let mut ctrl = StorageControl::new(0, mwh(capacity), 50.0)
                .unwrap()
                .with_profile(source, "p", 1.0);
            let mut net = net();
            ctrl.initialize_run(&net).unwrap();

            let mut expected: f64 = 50.0;
            for (k, p) in powers.iter().enumerate() {
                let elapsed = if k == 0 { hours(0.0) } else { hours(1.0) };
                let ctx = StepContext::new(k, k, elapsed).at(hours(k as f64));
                ctrl.time_step(&ctx).unwrap();
                prop_assert!((ctrl.soc_percent() - expected).abs() < 1e-9);
                apply(&mut ctrl, &mut net);
                expected = (expected + p / capacity * 100.0).clamp(0.0, 100.0);
            }
        }
    }
}
