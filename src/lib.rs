//! femedu - an object-oriented finite element engine for nonlinear structures
//!
//! A `System` owns nodes and elements, numbers the free degrees of freedom,
//! assembles residual forces and tangent stiffness, and hands itself to an
//! attached solver for each load step:
//! - Elements: `Truss`, `Beam2D`, co-rotational `Frame2D`, `LinearTriangle`,
//!   `Quad`
//! - Materials: elastic and plastic uniaxial laws, J2 plasticity with plane
//!   stress / plane strain projections, fiber and layered plate sections
//! - Solvers: `LinearSolver` and `NewtonRaphsonSolver` under load,
//!   displacement or arc-length control
//! - Recorder for load-displacement histories
//!
//! ## Example
//! ```rust
//! use femedu::prelude::*;
//!
//! let mut system = System::new();
//! let n0 = system.add_node(Node::new(0.0, 0.0));
//! let n1 = system.add_node(Node::new(2.0, 0.0));
//!
//! let truss = Truss::new(n0, n1, 0.01, Box::new(ElasticMaterial::new(200e9)));
//! let bar = system.add_element(truss).unwrap();
//!
//! system.node_mut(n0).unwrap().fix_dof(&[DofCode::Ux, DofCode::Uy]);
//! system.node_mut(n1).unwrap().fix_dof(&[DofCode::Uy]);
//! system.node_mut(n1).unwrap().add_load(&[DofCode::Ux], &[1.0e5]).unwrap();
//!
//! let options = SolverOptions::new(1e-6, 10).unwrap();
//! system.set_solver(NewtonRaphsonSolver::new(options));
//! let outcome = system.solve().unwrap();
//! assert!(outcome.is_converged());
//!
//! let axial = system.element_value(bar, "axial").unwrap();
//! assert!((axial - 1.0e5).abs() < 1e-3);
//! ```

pub mod elements;
pub mod error;
pub mod materials;
pub mod math;
pub mod recorder;
pub mod results;
pub mod solver;
pub mod system;

// Re-export common types
pub mod prelude {
    pub use crate::elements::{
        Beam2D, DofCode, Element, ElementKind, Frame2D, LinearTriangle, Node, Quad,
        Transformation, Truss,
    };
    pub use crate::error::{FemError, FemResult};
    pub use crate::materials::{
        ContinuumMaterial, ElasticIsotropic, ElasticMaterial, ElasticSection, FiberMaterial,
        FiberSection, PlaneMaterial, PlaneStrain, PlaneStress, PlateSection, SectionMaterial,
        UniaxialMaterial, VonMises,
    };
    pub use crate::recorder::{RecordKey, Recorder};
    pub use crate::results::{StepOutcome, StepStatus, SystemReport};
    pub use crate::solver::{
        LinearSolver, NewtonRaphsonSolver, PathControl, Solver, SolverOptions, SolverState,
    };
    pub use crate::system::{ElementId, NodeId, System, TangentFormat};
}
