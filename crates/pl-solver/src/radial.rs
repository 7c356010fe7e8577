//! Reference solver: single-source radial feeder.
//!
//! Every bus is supplied from the external grid (`ext_grid[0].vm_pu`),
//! optionally through one tap-changing transformer whose low-voltage side is
//! that bus, across a feeder resistance `bus.r_pu`. With net bus load `p`
//! (per unit on `base_mva`) the bus voltage solves
//!
//! ```text
//! v^2 - v_src * v + r * p = 0
//! ```
//!
//! and the upper root is the physical operating point. Transformer ratio is
//! `1 + (tap_pos - tap_neutral) * tap_step_percent / 100` with the tap on the
//! high-voltage side, so raising the tap lowers the low-voltage side.

use std::collections::BTreeMap;

use nalgebra::{DMatrix, DVector};
use pl_net::NetworkModel;
use pl_net::names::*;
use tracing::trace;

use crate::error::{SolverError, SolverResult};
use crate::newton::{NewtonConfig, NewtonSystem, newton_solve};
use crate::solver::{SolveReport, Solver};

/// Tolerance on tap positions outside their declared range.
const TAP_RANGE_EPS: f64 = 1e-9;

/// Radial feeder solver (see module docs).
#[derive(Debug, Clone)]
pub struct RadialFeederSolver {
    /// Power base for per-unit conversion (MVA)
    pub base_mva: f64,
    /// Newton settings
    pub newton: NewtonConfig,
}

impl Default for RadialFeederSolver {
    fn default() -> Self {
        Self {
            base_mva: 1.0,
            newton: NewtonConfig::default(),
        }
    }
}

impl RadialFeederSolver {
    pub fn new(base_mva: f64) -> Self {
        Self {
            base_mva,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct BusInput {
    index: usize,
    r_pu: f64,
    v_src: f64,
    p_mw: f64,
}

impl Solver for RadialFeederSolver {
    fn solve(&mut self, net: &mut NetworkModel) -> SolverResult<SolveReport> {
        if !(self.base_mva.is_finite() && self.base_mva > 0.0) {
            return Err(SolverError::InvalidInput {
                what: "base_mva must be positive".to_string(),
            });
        }

        let buses = collect_inputs(net)?;
        if buses.is_empty() {
            return Ok(SolveReport::default());
        }

        let base = self.base_mva;
        let system = FeederSystem {
            coeffs: buses
                .iter()
                .map(|b| (b.v_src, b.r_pu * b.p_mw / base))
                .collect(),
        };
        for (bus, (v_src, rp)) in buses.iter().zip(&system.coeffs) {
            // v^2 - v_src v + r p has no real root past the nose of the PV curve
            if v_src * v_src < 4.0 * rp {
                return Err(SolverError::ConvergenceFailed {
                    what: format!(
                        "bus {}: {} MW exceeds the feeder transfer limit {} MW, no real voltage",
                        bus.index,
                        bus.p_mw,
                        v_src * v_src / (4.0 * bus.r_pu) * base
                    ),
                });
            }
        }

        let x0 = DVector::from_iterator(buses.len(), buses.iter().map(|b| b.v_src));
        let result = newton_solve(&system, x0, &self.newton)?;

        let mut p_ext = 0.0;
        for (bus, v) in buses.iter().zip(result.x.iter()) {
            net.set_result(RES_BUS, bus.index, VM_PU, *v)?;
            net.set_result(RES_BUS, bus.index, P_MW, bus.p_mw)?;
            let losses = if bus.r_pu > 0.0 {
                (bus.v_src - v).powi(2) / bus.r_pu * base
            } else {
                0.0
            };
            p_ext += bus.p_mw + losses;
        }
        net.set_result(RES_EXT_GRID, 0, P_MW, p_ext)?;

        trace!(
            iterations = result.iterations,
            residual = result.residual_norm,
            "radial feeder solved"
        );

        Ok(SolveReport {
            iterations: result.iterations,
            residual_norm: result.residual_norm,
        })
    }
}

/// Decoupled bus equations `v^2 - v_src v + r p = 0`, one per bus.
struct FeederSystem {
    coeffs: Vec<(f64, f64)>,
}

impl NewtonSystem for FeederSystem {
    fn mismatch(&self, x: &DVector<f64>) -> DVector<f64> {
        DVector::from_iterator(
            x.len(),
            x.iter()
                .zip(&self.coeffs)
                .map(|(v, (vs, rp))| v * v - vs * v + rp),
        )
    }

    fn jacobian(&self, x: &DVector<f64>) -> DMatrix<f64> {
        let diag = DVector::from_iterator(
            x.len(),
            x.iter().zip(&self.coeffs).map(|(v, (vs, _))| 2.0 * v - vs),
        );
        DMatrix::from_diagonal(&diag)
    }
}

fn collect_inputs(net: &NetworkModel) -> SolverResult<Vec<BusInput>> {
    let v_ext = net.get(EXT_GRID, 0, VM_PU)?;
    if v_ext <= 0.0 {
        return Err(SolverError::InvalidInput {
            what: format!("ext_grid voltage must be positive, got {v_ext}"),
        });
    }

    let mut buses: BTreeMap<usize, BusInput> = BTreeMap::new();
    for index in net.indices(BUS)? {
        let r_pu = net.get(BUS, index, R_PU)?;
        if r_pu < 0.0 {
            return Err(SolverError::InvalidInput {
                what: format!("bus[{index}].r_pu must be non-negative"),
            });
        }
        buses.insert(
            index,
            BusInput {
                index,
                r_pu,
                v_src: v_ext,
                p_mw: 0.0,
            },
        );
    }

    if net.has_table(TRAFO) {
        let mut fed = Vec::new();
        for index in net.indices(TRAFO)? {
            if !in_service(net, TRAFO, index) {
                continue;
            }
            let lv_bus = bus_ref(net, TRAFO, index, LV_BUS)?;
            if fed.contains(&lv_bus) {
                return Err(SolverError::InvalidInput {
                    what: format!("bus {lv_bus} is fed by more than one transformer"),
                });
            }
            fed.push(lv_bus);

            let ratio = transformer_ratio(net, index)?;
            let bus = buses
                .get_mut(&lv_bus)
                .ok_or_else(|| SolverError::InvalidInput {
                    what: format!("trafo[{index}] references unknown bus {lv_bus}"),
                })?;
            bus.v_src = v_ext / ratio;
        }
    }

    for (table, sign) in [(LOAD, 1.0), (STORAGE, 1.0), (SGEN, -1.0)] {
        if !net.has_table(table) {
            continue;
        }
        for index in net.indices(table)? {
            if !in_service(net, table, index) {
                continue;
            }
            let bus_index = bus_ref(net, table, index, BUS_REF)?;
            let p = net.get(table, index, P_MW)?;
            let bus = buses
                .get_mut(&bus_index)
                .ok_or_else(|| SolverError::InvalidInput {
                    what: format!("{table}[{index}] references unknown bus {bus_index}"),
                })?;
            bus.p_mw += sign * p;
        }
    }

    Ok(buses.into_values().collect())
}

fn transformer_ratio(net: &NetworkModel, index: usize) -> SolverResult<f64> {
    let tap_pos = net.get(TRAFO, index, TAP_POS)?;
    let tap_min = net.get(TRAFO, index, TAP_MIN)?;
    let tap_max = net.get(TRAFO, index, TAP_MAX)?;
    let tap_neutral = net.get(TRAFO, index, TAP_NEUTRAL)?;
    let step = net.get(TRAFO, index, TAP_STEP_PERCENT)?;

    if tap_pos < tap_min - TAP_RANGE_EPS || tap_pos > tap_max + TAP_RANGE_EPS {
        return Err(SolverError::InvalidInput {
            what: format!(
                "trafo[{index}].tap_pos = {tap_pos} outside [{tap_min}, {tap_max}]"
            ),
        });
    }

    let ratio = 1.0 + (tap_pos - tap_neutral) * step / 100.0;
    if ratio <= 0.0 {
        return Err(SolverError::InvalidInput {
            what: format!("trafo[{index}] has non-positive ratio {ratio}"),
        });
    }
    Ok(ratio)
}

fn bus_ref(net: &NetworkModel, table: &str, index: usize, column: &str) -> SolverResult<usize> {
    let raw = net.get(table, index, column)?;
    if raw < 0.0 || raw.fract() != 0.0 {
        return Err(SolverError::InvalidInput {
            what: format!("{table}[{index}].{column} = {raw} is not a bus index"),
        });
    }
    Ok(raw as usize)
}

fn in_service(net: &NetworkModel, table: &str, index: usize) -> bool {
    net.get(table, index, "in_service")
        .map(|v| v != 0.0)
        .unwrap_or(true)
}
