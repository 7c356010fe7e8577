//! Transformer tap changers.
//!
//! Both controllers observe `res_bus.vm_pu` at the transformer's
//! low-voltage bus (`trafo.lv_bus`) and act on `trafo.tap_pos` within
//! `[trafo.tap_min, trafo.tap_max]`. Transformer parameters are read from the
//! model on every call, so edits between steps are honored.

use pl_core::Real;
use pl_net::names::{LV_BUS, RES_BUS, TAP_MAX, TAP_MIN, TAP_POS, TAP_STEP_PERCENT, TRAFO, VM_PU};
use pl_net::{CellRef, NetworkModel};
use serde::{Deserialize, Serialize};

use crate::controller::{Controller, ModelAccess, StepContext};
use crate::error::{ControlError, ControlResult};

/// Which winding carries the tap changer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TapSide {
    /// Raising the tap lowers the low-voltage side.
    #[default]
    Hv,
    /// Raising the tap raises the low-voltage side.
    Lv,
}

impl TapSide {
    /// Tap movement that raises the observed voltage.
    fn raise(self) -> Real {
        match self {
            TapSide::Hv => -1.0,
            TapSide::Lv => 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct TrafoState {
    voltage: Real,
    tap: Real,
    tap_min: Real,
    tap_max: Real,
}

fn lv_bus(net: &NetworkModel, trafo: usize) -> ControlResult<usize> {
    let raw = net.get(TRAFO, trafo, LV_BUS)?;
    if raw < 0.0 || raw.fract() != 0.0 {
        return Err(ControlError::StateError {
            what: format!("trafo {trafo} has invalid lv_bus {raw}"),
        });
    }
    Ok(raw as usize)
}

fn read_state(net: &NetworkModel, trafo: usize) -> ControlResult<TrafoState> {
    let bus = lv_bus(net, trafo)?;
    Ok(TrafoState {
        voltage: net.get(RES_BUS, bus, VM_PU)?,
        tap: net.get(TRAFO, trafo, TAP_POS)?,
        tap_min: net.get(TRAFO, trafo, TAP_MIN)?,
        tap_max: net.get(TRAFO, trafo, TAP_MAX)?,
    })
}

fn check_trafo(net: &NetworkModel, trafo: usize) -> ControlResult<()> {
    let bus = lv_bus(net, trafo)?;
    for column in [TAP_POS, TAP_MIN, TAP_MAX, TAP_STEP_PERCENT] {
        net.get(TRAFO, trafo, column)?;
    }
    if net.get(TRAFO, trafo, TAP_MIN)? > net.get(TRAFO, trafo, TAP_MAX)? {
        return Err(ControlError::StateError {
            what: format!("trafo {trafo} has tap_min above tap_max"),
        });
    }
    if !net.contains(pl_net::names::BUS, bus) {
        return Err(ControlError::StateError {
            what: format!("trafo {trafo} references missing bus {bus}"),
        });
    }
    Ok(())
}

/// Deadband controller stepping an integer tap position.
///
/// Above the band the tap moves one position towards lower voltage, below
/// the band one position towards higher voltage. Convergence holds inside
/// the band, or when the required move is blocked by a tap limit.
#[derive(Debug, Clone)]
pub struct DiscreteTapControl {
    name: String,
    trafo: usize,
    vm_lower_pu: Real,
    vm_upper_pu: Real,
    side: TapSide,
}

impl DiscreteTapControl {
    pub fn new(trafo: usize, vm_lower_pu: Real, vm_upper_pu: Real) -> ControlResult<Self> {
        if !(vm_lower_pu.is_finite() && vm_upper_pu.is_finite()) {
            return Err(ControlError::InvalidArg {
                what: "voltage band must be finite",
            });
        }
        if vm_lower_pu >= vm_upper_pu {
            return Err(ControlError::InvalidArg {
                what: "vm_lower_pu must be below vm_upper_pu",
            });
        }
        Ok(Self {
            name: format!("discrete tap {trafo}"),
            trafo,
            vm_lower_pu,
            vm_upper_pu,
            side: TapSide::default(),
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_side(mut self, side: TapSide) -> Self {
        self.side = side;
        self
    }

    /// Tap movement required by `voltage`; zero inside the band.
    fn direction(&self, voltage: Real) -> Real {
        if voltage > self.vm_upper_pu {
            -self.side.raise()
        } else if voltage < self.vm_lower_pu {
            self.side.raise()
        } else {
            0.0
        }
    }

    fn target(&self, state: TrafoState) -> Real {
        (state.tap + self.direction(state.voltage)).clamp(state.tap_min, state.tap_max)
    }
}

impl Controller for DiscreteTapControl {
    fn name(&self) -> &str {
        &self.name
    }

    fn writes(&self) -> Vec<CellRef> {
        vec![CellRef::new(TRAFO, self.trafo, TAP_POS)]
    }

    fn initialize_run(&mut self, net: &NetworkModel) -> ControlResult<()> {
        check_trafo(net, self.trafo)
    }

    fn time_step(&mut self, _ctx: &StepContext) -> ControlResult<()> {
        Ok(())
    }

    fn is_converged(&self, net: &NetworkModel) -> ControlResult<bool> {
        let state = read_state(net, self.trafo)?;
        Ok(self.target(state) == state.tap)
    }

    fn control_step(&mut self, access: &mut ModelAccess<'_>) -> ControlResult<()> {
        let state = read_state(access.solved(), self.trafo)?;
        access.write(TRAFO, self.trafo, TAP_POS, self.target(state))?;
        Ok(())
    }
}

/// Controller driving a continuous tap position towards a voltage setpoint.
///
/// Each correction uses the first-order sensitivity
/// `dtap = (v - v_set) / (v * tap_step_percent / 100)`. The tap is clamped to
/// its limits; a setpoint outside the reachable range therefore never
/// converges and the iteration cap fires.
#[derive(Debug, Clone)]
pub struct ContinuousTapControl {
    name: String,
    trafo: usize,
    vm_set_pu: Real,
    tol: Real,
    side: TapSide,
}

impl ContinuousTapControl {
    pub fn new(trafo: usize, vm_set_pu: Real, tol: Real) -> ControlResult<Self> {
        if !(vm_set_pu.is_finite() && vm_set_pu > 0.0) {
            return Err(ControlError::InvalidArg {
                what: "vm_set_pu must be positive",
            });
        }
        if !(tol.is_finite() && tol > 0.0) {
            return Err(ControlError::InvalidArg {
                what: "tol must be positive",
            });
        }
        Ok(Self {
            name: format!("continuous tap {trafo}"),
            trafo,
            vm_set_pu,
            tol,
            side: TapSide::default(),
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_side(mut self, side: TapSide) -> Self {
        self.side = side;
        self
    }
}

impl Controller for ContinuousTapControl {
    fn name(&self) -> &str {
        &self.name
    }

    fn writes(&self) -> Vec<CellRef> {
        vec![CellRef::new(TRAFO, self.trafo, TAP_POS)]
    }

    fn initialize_run(&mut self, net: &NetworkModel) -> ControlResult<()> {
        check_trafo(net, self.trafo)
    }

    fn time_step(&mut self, _ctx: &StepContext) -> ControlResult<()> {
        Ok(())
    }

    fn is_converged(&self, net: &NetworkModel) -> ControlResult<bool> {
        let bus = lv_bus(net, self.trafo)?;
        let v = net.get(RES_BUS, bus, VM_PU)?;
        Ok((v - self.vm_set_pu).abs() <= self.tol)
    }

    fn control_step(&mut self, access: &mut ModelAccess<'_>) -> ControlResult<()> {
        let state = read_state(access.solved(), self.trafo)?;
        let step_percent = access.read_solved(TRAFO, self.trafo, TAP_STEP_PERCENT)?;
        let sensitivity = state.voltage * step_percent / 100.0;
        if sensitivity == 0.0 {
            return Err(ControlError::StateError {
                what: format!("trafo {} has zero tap sensitivity", self.trafo),
            });
        }

        let delta = -self.side.raise() * (state.voltage - self.vm_set_pu) / sensitivity;
        let tap = (state.tap + delta).clamp(state.tap_min, state.tap_max);
        access.write(TRAFO, self.trafo, TAP_POS, tap)?;
        Ok(())
    }
}
