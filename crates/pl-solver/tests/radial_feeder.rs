//! Transformer tap behaviour of the reference solver.

use pl_net::names::*;
use pl_net::{NetworkModel, Row};
use pl_solver::{RadialFeederSolver, Solver};

fn tapped_feeder(tap_pos: f64) -> NetworkModel {
    let mut net = NetworkModel::new();
    net.insert_row(EXT_GRID, 0, Row::new().with(VM_PU, 1.0))
        .unwrap();
    net.insert_row(BUS, 1, Row::new().with(R_PU, 0.0)).unwrap();
    net.insert_row(
        TRAFO,
        0,
        Row::new()
            .with(LV_BUS, 1.0)
            .with(TAP_POS, tap_pos)
            .with(TAP_NEUTRAL, 0.0)
            .with(TAP_MIN, -5.0)
            .with(TAP_MAX, 5.0)
            .with(TAP_STEP_PERCENT, 2.5),
    )
    .unwrap();
    net
}

#[test]
fn raising_tap_lowers_secondary_voltage() {
    let mut solver = RadialFeederSolver::default();
    let mut voltages = Vec::new();
    for tap in [-2.0, 0.0, 2.0] {
        let mut net = tapped_feeder(tap);
        solver.solve(&mut net).unwrap();
        voltages.push(net.get(RES_BUS, 1, VM_PU).unwrap());
    }
    assert!(voltages[0] > voltages[1]);
    assert!(voltages[1] > voltages[2]);
    assert!((voltages[2] - 1.0 / 1.05).abs() < 1e-9);
}

#[test]
fn tap_outside_range_is_rejected_not_clamped() {
    let mut net = tapped_feeder(6.0);
    let err = RadialFeederSolver::default().solve(&mut net).unwrap_err();
    assert!(!err.is_non_convergence());
    assert_eq!(net.get(TRAFO, 0, TAP_POS).unwrap(), 6.0);
}

#[test]
fn generation_raises_voltage_and_reports_grid_exchange() {
    let mut net = tapped_feeder(0.0);
    net.set(BUS, 1, R_PU, 0.02).unwrap();
    net.insert_row(SGEN, 0, Row::new().with(BUS_REF, 1.0).with(P_MW, 2.0))
        .unwrap();
    RadialFeederSolver::default().solve(&mut net).unwrap();

    assert!(net.get(RES_BUS, 1, VM_PU).unwrap() > 1.0);
    assert!(net.get(RES_EXT_GRID, 0, P_MW).unwrap() < 0.0);
}
