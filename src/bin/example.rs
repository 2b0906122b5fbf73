//! femedu example - Pratt truss bridge under increasing load

use anyhow::{Context, Result};
use log::info;

use femedu::prelude::*;

const PANELS: usize = 6;
const PANEL_WIDTH: f64 = 4.0; // m
const HEIGHT: f64 = 3.0; // m
const AREA: f64 = 2.0e-3; // m²
const PANEL_LOAD: f64 = 60.0e3; // N

fn build_bridge(system: &mut System) -> Result<(Vec<NodeId>, Vec<NodeId>)> {
    // bottom chord B0..B6, top chord T1..T5, pinned at B0, roller at B6
    let bottom: Vec<NodeId> = (0..=PANELS)
        .map(|i| system.add_node(Node::new(i as f64 * PANEL_WIDTH, 0.0)))
        .collect();
    let top: Vec<NodeId> = (1..PANELS)
        .map(|i| system.add_node(Node::new(i as f64 * PANEL_WIDTH, HEIGHT)))
        .collect();

    // S250 steel with 1% hardening
    let steel = FiberMaterial::new(200.0e9, 250.0e6, 2.0e9)?;
    let mut bar = |i: NodeId, j: NodeId| -> Result<ElementId> {
        let truss = Truss::new(i, j, AREA, Box::new(steel.clone()));
        system
            .add_element(truss)
            .with_context(|| format!("adding bar {} - {}", i, j))
    };

    for w in bottom.windows(2) {
        bar(w[0], w[1])?;
    }
    for w in top.windows(2) {
        bar(w[0], w[1])?;
    }
    for (k, &t) in top.iter().enumerate() {
        bar(bottom[k + 1], t)?;
    }
    // end posts and diagonals falling toward midspan
    bar(bottom[0], top[0])?;
    bar(top[PANELS - 2], bottom[PANELS])?;
    let mid = PANELS / 2;
    for k in 1..mid {
        bar(top[k], bottom[k])?;
    }
    for k in mid..PANELS - 1 {
        bar(top[k - 1], bottom[k + 1])?;
    }

    system.node_mut(bottom[0])?.fix_dof(&[DofCode::Ux, DofCode::Uy]);
    system.node_mut(bottom[PANELS])?.fix_dof(&[DofCode::Uy]);
    for &n in &bottom[1..PANELS] {
        system.node_mut(n)?.add_load(&[DofCode::Uy], &[-PANEL_LOAD])?;
    }

    Ok((bottom, top))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("=== femedu example: Pratt truss bridge ===\n");

    let mut system = System::new();
    let (bottom, _top) = build_bridge(&mut system)?;
    let midspan = bottom[PANELS / 2];

    let options = SolverOptions::new(1e-3, 20)?.with_logging();
    system.set_solver(NewtonRaphsonSolver::new(options));
    system.set_recorder(Recorder::new().track_dof(midspan, DofCode::Uy))?;
    system.start_recorder();
    system.record_this_step();

    let factors: Vec<f64> = (1..=8).map(|k| 0.25 * k as f64).collect();
    let outcomes = system.solve_increments(&factors)?;
    for outcome in &outcomes {
        info!(
            "lambda = {:.2}: {:?} after {} iterations",
            outcome.load_factor, outcome.status, outcome.iterations
        );
    }

    println!("\nLoad-deflection at midspan:");
    for (lam, u) in system.fetch_dof_history(midspan, DofCode::Uy)? {
        println!("  lambda = {:5.2}  uy = {:9.3} mm", lam, u * 1000.0);
    }

    let report = system.report()?;
    if std::env::args().any(|arg| arg == "--json") {
        println!("{}", report.to_json()?);
        return Ok(());
    }
    println!("\n{}", report);
    println!("Max displacement: {:.3} mm", report.max_displacement() * 1000.0);

    Ok(())
}
