use approx::assert_relative_eq;
use femedu::prelude::*;

const HEIGHT: f64 = 0.1;
const EA: f64 = 2000.0;

/// Shallow two-bar arch with a unit downward reference load at the apex
fn shallow_arch() -> (System, NodeId) {
    let mut system = System::new();
    let left = system.add_node(Node::new(-1.0, 0.0));
    let right = system.add_node(Node::new(1.0, 0.0));
    let apex = system.add_node(Node::new(0.0, HEIGHT));
    for support in [left, right] {
        system
            .add_element(Truss::new(support, apex, 1.0, Box::new(ElasticMaterial::new(EA))))
            .unwrap();
        system
            .node_mut(support)
            .unwrap()
            .fix_dof(&[DofCode::Ux, DofCode::Uy]);
    }
    system
        .node_mut(apex)
        .unwrap()
        .add_load(&[DofCode::Uy], &[-1.0])
        .unwrap();
    system.set_solver(NewtonRaphsonSolver::new(SolverOptions::new(1e-9, 20).unwrap()));
    (system, apex)
}

/// Load factor in equilibrium with the apex at height `y`
fn equilibrium_load(y: f64) -> f64 {
    let l0 = (1.0 + HEIGHT * HEIGHT).sqrt();
    let l = (1.0 + y * y).sqrt();
    2.0 * EA * (l0 - l) / l0 * y / l
}

fn apex_height(system: &System, apex: NodeId) -> f64 {
    HEIGHT + system.node(apex).unwrap().disp_for(&[DofCode::Uy]).unwrap()[0]
}

#[test]
fn test_arc_length_traces_snap_through() {
    let (mut system, apex) = shallow_arch();
    let limit = (0..=10_000)
        .map(|i| equilibrium_load(HEIGHT * i as f64 / 10_000.0))
        .fold(0.0, f64::max);

    let first = system.init_arc_length(0.3, 0.0).unwrap();
    assert!(first.is_converged());
    assert_relative_eq!(system.load_factor(), 0.3, epsilon = 1e-12);

    let mut path = vec![(apex_height(&system, apex), system.load_factor())];
    for _ in 0..60 {
        let outcome = system.step_arc_length().unwrap();
        assert!(outcome.is_converged(), "failed at lambda = {}", outcome.load_factor);
        path.push((apex_height(&system, apex), system.load_factor()));
        if apex_height(&system, apex) < -0.5 * HEIGHT {
            break;
        }
    }

    // every converged point lies on the equilibrium path
    for &(y, lam) in &path {
        assert_relative_eq!(lam, equilibrium_load(y), epsilon = 1e-6);
    }
    // the apex moves down monotonically through the inverted position
    assert!(path.windows(2).all(|w| w[1].0 < w[0].0));
    let (y_end, lam_end) = *path.last().unwrap();
    assert!(y_end < -0.5 * HEIGHT);
    assert!(lam_end < 0.0);

    // load factor rises to the limit point and falls past it
    let peak = path.iter().map(|p| p.1).fold(f64::MIN, f64::max);
    assert!(peak > 0.95 * limit && peak < limit + 1e-6, "peak {} limit {}", peak, limit);
}

#[test]
fn test_displacement_control_passes_limit_point() {
    let (mut system, apex) = shallow_arch();
    let mut loads = Vec::new();
    for k in 1..=32 {
        let target = -0.005 * k as f64;
        system
            .set_displacement_control(apex, DofCode::Uy, target)
            .unwrap();
        let outcome = system.solve().unwrap();
        assert!(outcome.is_converged());

        let uy = system.node(apex).unwrap().disp_for(&[DofCode::Uy]).unwrap()[0];
        assert_relative_eq!(uy, target, epsilon = 1e-8);
        assert_relative_eq!(
            system.load_factor(),
            equilibrium_load(HEIGHT + target),
            epsilon = 1e-6
        );
        loads.push(system.load_factor());
    }

    let peak = loads
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
        .unwrap();
    assert!(peak > 0 && peak < loads.len() - 1);
    assert!(*loads.last().unwrap() < 0.0);
}

#[test]
fn test_path_control_needs_newton_solver() {
    let (mut system, apex) = shallow_arch();
    system.set_solver(LinearSolver::new());
    assert!(matches!(
        system.set_displacement_control(apex, DofCode::Uy, -0.01),
        Err(FemError::InvalidInput(_))
    ));
    assert!(system.init_arc_length(0.1, 0.0).is_err());
    assert!(system.step_arc_length().is_err());

    let support = system.elements().next().unwrap().1.nodes()[0];
    system.set_solver(NewtonRaphsonSolver::new(SolverOptions::new(1e-9, 20).unwrap()));
    assert_eq!(
        system.set_displacement_control(support, DofCode::Ux, 0.1),
        Err(FemError::FixedDof(DofCode::Ux))
    );
}

#[test]
fn test_load_control_resumes_after_arc_length() {
    let (mut system, apex) = shallow_arch();
    system.init_arc_length(0.2, 0.0).unwrap();
    system.step_arc_length().unwrap();
    assert!(matches!(
        system.solver().unwrap().control(),
        PathControl::ArcLength { .. }
    ));

    system.set_load_factor(0.1).unwrap();
    assert_eq!(system.solver().unwrap().control(), PathControl::Load);
    let outcome = system.solve().unwrap();
    assert!(outcome.is_converged());
    assert_relative_eq!(
        equilibrium_load(apex_height(&system, apex)),
        0.1,
        epsilon = 1e-6
    );
}
