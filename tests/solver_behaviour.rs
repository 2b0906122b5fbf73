use approx::assert_relative_eq;
use femedu::prelude::*;

/// Cantilever of `n` frame elements along x with a downward tip load
fn cantilever(n: usize, length: f64, load: f64) -> (System, NodeId) {
    let mut system = System::new();
    let nodes: Vec<NodeId> = (0..=n)
        .map(|i| system.add_node(Node::new(length * i as f64 / n as f64, 0.0)))
        .collect();
    for w in nodes.windows(2) {
        let section = ElasticSection::new(1000.0, 1.0, 0.1).unwrap();
        system
            .add_element(Frame2D::new(w[0], w[1], Box::new(section)))
            .unwrap();
    }
    system
        .node_mut(nodes[0])
        .unwrap()
        .fix_dof(&[DofCode::Ux, DofCode::Uy, DofCode::Rz]);
    system
        .node_mut(nodes[n])
        .unwrap()
        .add_load(&[DofCode::Uy], &[-load])
        .unwrap();
    (system, nodes[n])
}

#[test]
fn test_singular_matrix_is_an_error() {
    // no supports at all: rigid body modes
    let mut system = System::new();
    let n0 = system.add_node(Node::new(0.0, 0.0));
    let n1 = system.add_node(Node::new(1.0, 0.0));
    system
        .add_element(Truss::new(n0, n1, 1.0, Box::new(ElasticMaterial::new(1.0))))
        .unwrap();
    system
        .node_mut(n1)
        .unwrap()
        .add_load(&[DofCode::Ux], &[1.0])
        .unwrap();

    system.set_solver(LinearSolver::new());
    assert_eq!(system.solve().unwrap_err(), FemError::SingularMatrix);
    assert_eq!(system.solver().unwrap().state(), SolverState::Failed);

    system.set_solver(NewtonRaphsonSolver::new(SolverOptions::new(1e-8, 10).unwrap()));
    assert_eq!(system.solve().unwrap_err(), FemError::SingularMatrix);
    // the failed step left no trace
    assert_eq!(system.step(), 0);
    assert_eq!(system.nodes()[1].disp().amax(), 0.0);
}

#[test]
fn test_non_convergence_is_an_outcome() {
    // bilinear hardening needs two corrections once the bar yields
    let material = FiberMaterial::new(100.0, 1.0, 1.0).unwrap();
    let mut system = System::new();
    let n0 = system.add_node(Node::new(0.0, 0.0));
    let n1 = system.add_node(Node::new(1.0, 0.0));
    system
        .add_element(Truss::new(n0, n1, 1.0, Box::new(material)))
        .unwrap();
    system.node_mut(n0).unwrap().fix_dof(&[DofCode::Ux, DofCode::Uy]);
    system.node_mut(n1).unwrap().fix_dof(&[DofCode::Uy]);
    system
        .node_mut(n1)
        .unwrap()
        .add_load(&[DofCode::Ux], &[1.0])
        .unwrap();
    system.set_solver(NewtonRaphsonSolver::new(SolverOptions::new(1e-12, 1).unwrap()));

    let outcomes = system.solve_increments(&[0.5, 3.0, 4.0]).unwrap();
    // the elastic step converges, the plastic one runs out of iterations
    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].status, StepStatus::Converged);
    assert_eq!(outcomes[1].status, StepStatus::Failed);
    assert_eq!(system.solver().unwrap().state(), SolverState::Failed);

    // state rolled back to the converged step at lambda = 0.5
    assert_eq!(system.load_factor(), 0.5);
    let ux = system.nodes()[1].disp()[0];
    assert_relative_eq!(ux, 0.005, max_relative = 1e-12);
}

#[test]
fn test_missing_solver() {
    let mut system = System::new();
    system.add_node(Node::new(0.0, 0.0));
    assert_eq!(system.set_load_factor(1.0).unwrap_err(), FemError::NoSolver);
    assert_eq!(system.solve().unwrap_err(), FemError::NoSolver);
}

#[test]
fn test_unknown_node_rejected() {
    let mut other = System::new();
    let far = (0..5).map(|_| other.add_node(Node::new(0.0, 0.0))).last().unwrap();

    let mut system = System::new();
    let n0 = system.add_node(Node::new(0.0, 0.0));
    let truss = Truss::new(n0, far, 1.0, Box::new(ElasticMaterial::new(1.0)));
    assert_eq!(system.add_element(truss).unwrap_err(), FemError::NodeNotFound(4));
}

#[test]
fn test_sparse_and_dense_agree() {
    let (length, load) = (4.0, 0.1);
    let (mut dense, tip) = cantilever(4, length, load);
    dense.set_solver(NewtonRaphsonSolver::new(SolverOptions::new(1e-10, 10).unwrap()));
    assert!(dense.solve().unwrap().is_converged());

    let (mut sparse, _) = cantilever(4, length, load);
    let options = SolverOptions::new(1e-10, 10).unwrap().sparse();
    sparse.set_solver(NewtonRaphsonSolver::new(options));
    assert!(sparse.solve().unwrap().is_converged());

    for (a, b) in dense.nodes().iter().zip(sparse.nodes()) {
        assert_relative_eq!(a.disp(), b.disp(), epsilon = 1e-10);
    }

    // small deflection: close to P L^3 / 3 EI
    let uy = dense.node(tip).unwrap().disp_for(&[DofCode::Uy]).unwrap()[0];
    let ei = 1000.0 * 0.1;
    assert_relative_eq!(uy, -load * length.powi(3) / (3.0 * ei), max_relative = 1e-3);
}

#[test]
fn test_sparse_linear_solver() {
    let (mut dense, _) = cantilever(3, 2.0, 0.01);
    dense.set_solver(LinearSolver::new());
    dense.solve().unwrap();

    let (mut sparse, _) = cantilever(3, 2.0, 0.01);
    sparse.set_solver(LinearSolver::new().sparse());
    sparse.solve().unwrap();

    for (a, b) in dense.nodes().iter().zip(sparse.nodes()) {
        assert_relative_eq!(a.disp(), b.disp(), epsilon = 1e-12);
    }
}

#[test]
#[allow(deprecated)]
fn test_full_assembly_path_matches_condensed() {
    let (mut condensed, _) = cantilever(3, 3.0, 0.05);
    let mut solver = LinearSolver::new();
    solver.solve(&mut condensed).unwrap();

    let (mut full, _) = cantilever(3, 3.0, 0.05);
    let mut solver = LinearSolver::new();
    let outcome = solver.original_solve(&mut full).unwrap();
    assert!(outcome.is_converged());
    assert_eq!(full.step(), 1);

    for (a, b) in condensed.nodes().iter().zip(full.nodes()) {
        assert_relative_eq!(a.disp(), b.disp(), epsilon = 1e-12);
    }
}

#[test]
fn test_stale_element_state_detected() {
    let (mut system, tip) = cantilever(2, 2.0, 0.01);
    system.set_solver(LinearSolver::new());
    system.solve().unwrap();

    let id = system.elements().last().unwrap().0;
    assert!(system.element(id).unwrap().force(system.nodes()).is_ok());

    let mut u = system.node(tip).unwrap().disp();
    u[1] *= 2.0;
    system.node_mut(tip).unwrap().set_disp(u.as_slice()).unwrap();
    let err = system.element(id).unwrap().force(system.nodes()).unwrap_err();
    assert_eq!(err, FemError::StaleState);

    // assembling brings every element up to date again
    system.assemble(1.0, true).unwrap();
    assert!(system.element(id).unwrap().stiffness(system.nodes()).is_ok());
}

#[test]
fn test_load_factor_scales_response() {
    let (mut system, tip) = cantilever(2, 2.0, 0.01);
    system.set_solver(LinearSolver::new());
    system.set_load_factor(0.5).unwrap();
    let outcome = system.solve().unwrap();
    assert_eq!(outcome.load_factor, 0.5);
    assert_eq!(system.load_factor(), 0.5);
    assert_eq!(system.solver().unwrap().load_factor(), 0.5);
    let half = system.node(tip).unwrap().disp_for(&[DofCode::Uy]).unwrap()[0];

    system.reset_disp();
    system.set_load_factor(1.0).unwrap();
    system.solve().unwrap();
    let full = system.node(tip).unwrap().disp_for(&[DofCode::Uy]).unwrap()[0];
    assert_relative_eq!(full, 2.0 * half, max_relative = 1e-12);
}
