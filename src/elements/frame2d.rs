//! Co-rotational plane frame element

use nalgebra::Matrix2x3;
use std::f64::consts::PI;

use super::{gather_disp, DofCode, Element, ElementCore, ElementKind, Node};
use crate::error::{FemError, FemResult};
use crate::materials::SectionMaterial;
use crate::math::{gauss_legendre, Mat, Mat3, Vec2, Vec3, Vector};
use crate::system::NodeId;

const CODES: &[DofCode] = &[DofCode::Ux, DofCode::Uy, DofCode::Rz];

/// Default number of Gauss points along the element
pub const DEFAULT_INTEGRATION_POINTS: usize = 3;

/// Wrap an angle into (-π, π]
fn wrap(angle: f64) -> f64 {
    let mut a = angle % (2.0 * PI);
    if a > PI {
        a -= 2.0 * PI;
    } else if a <= -PI {
        a += 2.0 * PI;
    }
    a
}

/// Two-node Euler-Bernoulli frame with co-rotational kinematics
///
/// Rigid body motion is removed by a frame that follows the chord. In that
/// frame the element deforms by the chord elongation and the two end
/// rotations relative to the chord; axial strain and curvature are fed to a
/// section at each Gauss point. Large rotations are exact; local deformations
/// are assumed small.
#[derive(Debug, Clone)]
pub struct Frame2D {
    core: ElementCore,
    sections: Vec<Box<dyn SectionMaterial>>,
    points: Vec<(f64, f64)>,
    reference: [f64; 2],
    length: f64,
    angle: f64,
    distributed_load: f64,
    local_forces: Vec3,
}

impl Frame2D {
    pub fn new(i: NodeId, j: NodeId, section: Box<dyn SectionMaterial>) -> Self {
        Self {
            core: ElementCore::new(vec![i, j]),
            sections: vec![section],
            points: Vec::new(),
            reference: [0.0; 2],
            length: 0.0,
            angle: 0.0,
            distributed_load: 0.0,
            local_forces: Vec3::zeros(),
        }
    }

    /// Number of Gauss points (1 to 5); must be set before the element is added
    pub fn with_integration_points(mut self, n: usize) -> FemResult<Self> {
        self.points = gauss_legendre(n)?;
        Ok(self)
    }

    /// Uniform load per unit length perpendicular to the undeformed axis,
    /// positive toward the element's local +y side
    pub fn distributed_load(&self) -> f64 {
        self.distributed_load
    }

    pub fn length(&self) -> f64 {
        self.length
    }

    /// Local generalized forces `[N, M_i, M_j]` conjugate to
    /// `[elongation, θ_i, θ_j]` from the last update
    pub fn local_forces(&self) -> Vec3 {
        self.local_forces
    }

    pub fn sections(&self) -> &[Box<dyn SectionMaterial>] {
        &self.sections
    }
}

impl Element for Frame2D {
    fn kind(&self) -> ElementKind {
        ElementKind::Frame2D
    }

    fn core(&self) -> &ElementCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ElementCore {
        &mut self.core
    }

    fn dof_codes(&self) -> &'static [DofCode] {
        CODES
    }

    fn attach(&mut self, nodes: &[Node]) -> FemResult<()> {
        self.core.check_node_count(2)?;
        let ni = self.core.node(nodes, 0)?;
        let nj = self.core.node(nodes, 1)?;
        if ni.dim() != 2 || nj.dim() != 2 {
            return Err(FemError::InvalidGeometry(
                "Frame2D requires nodes in the plane".to_string(),
            ));
        }
        let (xi, xj) = (ni.coords(), nj.coords());
        self.reference = [xj[0] - xi[0], xj[1] - xi[1]];
        self.length = self.reference[0].hypot(self.reference[1]);
        if self.length < 1e-12 {
            return Err(FemError::InvalidGeometry("frame has zero length".to_string()));
        }
        self.angle = self.reference[1].atan2(self.reference[0]);

        if self.points.is_empty() {
            self.points = gauss_legendre(DEFAULT_INTEGRATION_POINTS)?;
        }
        let prototype = self.sections[0].clone();
        self.sections = vec![prototype; self.points.len()];
        Ok(())
    }

    fn update_state(&mut self, nodes: &[Node]) -> FemResult<()> {
        let u = gather_disp(&self.core, nodes, CODES)?;
        let big_l = self.length;

        let dx = self.reference[0] + u[3] - u[0];
        let dy = self.reference[1] + u[4] - u[1];
        let l = dx.hypot(dy);
        if l < 1e-12 * big_l {
            return Err(FemError::InvalidGeometry("frame collapsed to zero length".to_string()));
        }
        let (c, s) = (dx / l, dy / l);
        let rigid = wrap(dy.atan2(dx) - self.angle);

        let elongation = l - big_l;
        let theta_i = wrap(u[2] - rigid);
        let theta_j = wrap(u[5] - rigid);

        // local response: q = [N, M_i, M_j], k_l = dq / d[elongation, θ_i, θ_j]
        let mut q = Vec3::zeros();
        let mut k_local = Mat3::zeros();
        for (&(xi, w), section) in self.points.iter().zip(self.sections.iter_mut()) {
            let b1 = (-4.0 + 6.0 * xi) / big_l;
            let b2 = (-2.0 + 6.0 * xi) / big_l;
            // rows map [elongation, θ_i, θ_j] to [ε, κ]
            let b_bar = Matrix2x3::new(1.0 / big_l, 0.0, 0.0, 0.0, b1, b2);

            let strain = b_bar * Vec3::new(elongation, theta_i, theta_j);
            section.set_strain(&Vec2::new(strain[0], strain[1]))?;
            let stress = section.stress();
            let k_s = section.stiffness();

            q += b_bar.transpose() * stress * (w * big_l);
            k_local += b_bar.transpose() * k_s * b_bar * (w * big_l);
        }
        self.local_forces = q;

        let r = Vector::from_vec(vec![-c, -s, 0.0, c, s, 0.0]);
        let z = Vector::from_vec(vec![s, -c, 0.0, -s, c, 0.0]);
        let mut b = Mat::zeros(3, 6);
        b.set_row(0, &r.transpose());
        let zl = &z / l;
        b.set_row(1, &(-&zl).transpose());
        b.set_row(2, &(-&zl).transpose());
        b[(1, 2)] += 1.0;
        b[(2, 5)] += 1.0;

        let q_dyn = Vector::from_column_slice(q.as_slice());
        let k_dyn = Mat::from_column_slice(3, 3, k_local.as_slice());

        let force = b.transpose() * &q_dyn;
        let rz = &r * z.transpose();
        let stiffness = b.transpose() * k_dyn * &b
            + &z * z.transpose() * (q[0] / l)
            + (&rz + rz.transpose()) * ((q[1] + q[2]) / (l * l));

        self.core.store(nodes, force, stiffness)
    }

    fn value_names(&self) -> &'static [&'static str] {
        &["axial", "moment_i", "moment_j"]
    }

    fn value(&self, name: &str) -> Option<f64> {
        match name {
            "axial" => Some(self.local_forces[0]),
            "moment_i" => Some(-self.local_forces[1]),
            "moment_j" => Some(self.local_forces[2]),
            _ => None,
        }
    }

    fn commit(&mut self) {
        for section in &mut self.sections {
            section.commit();
        }
    }

    fn revert(&mut self) {
        for section in &mut self.sections {
            section.revert();
        }
        self.core.invalidate();
    }

    fn element_load(&self) -> Option<Vector> {
        if self.distributed_load == 0.0 {
            return None;
        }
        let (w, l) = (self.distributed_load, self.length);
        let (s, c) = self.angle.sin_cos();
        let (v, m) = (w * l / 2.0, w * l * l / 12.0);
        Some(Vector::from_vec(vec![-s * v, c * v, m, -s * v, c * v, -m]))
    }

    fn set_distributed_load(&mut self, w: f64) -> FemResult<()> {
        self.distributed_load = w;
        Ok(())
    }

    fn reset_loads(&mut self) {
        self.distributed_load = 0.0;
    }

    fn reset_state(&mut self) {
        for section in &mut self.sections {
            section.reset();
        }
        self.core.invalidate();
    }
}
