//! Bilinear quadrilateral with finite deformation

use nalgebra::{Matrix2, Vector2};

use super::membrane::{integrate_point, von_mises};
use super::{gather_disp, DofCode, Element, ElementCore, ElementKind, Node};
use crate::error::{FemError, FemResult};
use crate::materials::PlaneMaterial;
use crate::math::{gauss_legendre, Mat, Vec3, Vector};
use crate::system::NodeId;

const CODES: &[DofCode] = &[DofCode::Ux, DofCode::Uy];

/// Natural coordinates of the corner nodes, counter-clockwise
const CORNERS: [(f64, f64); 4] = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];

/// Reference data of one integration point
#[derive(Debug, Clone)]
struct GaussPoint {
    gradients: [Vector2<f64>; 4],
    /// Reference area represented by the point (det J times weight)
    area: f64,
}

/// Four-node isoparametric membrane element in total Lagrangian form
///
/// Nodes are numbered counter-clockwise. A 2x2 Gauss rule integrates the
/// internal force and the tangent; every integration point carries its own
/// copy of the plane material. Reported values are averages over the
/// integration points.
#[derive(Debug, Clone)]
pub struct Quad {
    core: ElementCore,
    materials: Vec<Box<dyn PlaneMaterial>>,
    points: Vec<GaussPoint>,
}

impl Quad {
    pub fn new(nodes: [NodeId; 4], material: Box<dyn PlaneMaterial>) -> Self {
        Self {
            core: ElementCore::new(nodes.to_vec()),
            materials: vec![material],
            points: Vec::new(),
        }
    }

    /// Reference area
    pub fn area(&self) -> f64 {
        self.points.iter().map(|p| p.area).sum()
    }

    /// Green-Lagrange strain `[E11, E22, 2 E12]` averaged over the integration points
    pub fn strain(&self) -> Vec3 {
        self.average(|m| m.strain())
    }

    /// Second Piola-Kirchhoff stress `[S11, S22, S12]` averaged over the integration points
    pub fn stress(&self) -> Vec3 {
        self.average(|m| m.stress())
    }

    /// Material state of each integration point
    pub fn materials(&self) -> impl Iterator<Item = &dyn PlaneMaterial> {
        self.materials.iter().map(|m| m.as_ref())
    }

    fn average(&self, f: impl Fn(&dyn PlaneMaterial) -> Vec3) -> Vec3 {
        let sum = self
            .materials
            .iter()
            .fold(Vec3::zeros(), |acc, m| acc + f(m.as_ref()));
        sum / self.materials.len() as f64
    }

    fn shape_derivatives(xi: f64, eta: f64) -> [Vector2<f64>; 4] {
        CORNERS.map(|(xa, ya)| {
            Vector2::new(0.25 * xa * (1.0 + eta * ya), 0.25 * ya * (1.0 + xi * xa))
        })
    }
}

impl Element for Quad {
    fn kind(&self) -> ElementKind {
        ElementKind::Quad
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
        self.core.check_node_count(4)?;
        let mut x = [Vector2::zeros(); 4];
        for (a, xa) in x.iter_mut().enumerate() {
            let node = self.core.node(nodes, a)?;
            if node.dim() != 2 {
                return Err(FemError::InvalidGeometry(
                    "Quad requires nodes in the plane".to_string(),
                ));
            }
            *xa = Vector2::new(node.pos()[0], node.pos()[1]);
        }
        let scale = (0..4).map(|a| (x[(a + 1) % 4] - x[a]).norm()).fold(0.0, f64::max);

        // 2x2 rule on [-1, 1]²
        let rule: Vec<(f64, f64)> = gauss_legendre(2)?
            .into_iter()
            .map(|(s, w)| (2.0 * s - 1.0, 2.0 * w))
            .collect();

        let mut points = Vec::with_capacity(4);
        for &(eta, w_eta) in &rule {
            for &(xi, w_xi) in &rule {
                let dn = Self::shape_derivatives(xi, eta);
                // J[i][j] = ∂X_i / ∂ξ_j
                let j = dn
                    .iter()
                    .zip(&x)
                    .fold(Matrix2::<f64>::zeros(), |acc, (d, xa)| acc + xa * d.transpose());
                let det = j.determinant();
                if det <= 1e-12 * scale * scale {
                    return Err(FemError::InvalidGeometry(
                        "quad is degenerate or not numbered counter-clockwise".to_string(),
                    ));
                }
                let j_inv = j.try_inverse().ok_or(FemError::SingularMatrix)?;
                points.push(GaussPoint {
                    gradients: dn.map(|d| j_inv.transpose() * d),
                    area: det * w_xi * w_eta,
                });
            }
        }

        let template = self.materials[0].clone();
        self.materials = vec![template; points.len()];
        self.points = points;
        Ok(())
    }

    fn update_state(&mut self, nodes: &[Node]) -> FemResult<()> {
        let u = gather_disp(&self.core, nodes, CODES)?;
        let mut force = Vector::zeros(8);
        let mut stiffness = Mat::zeros(8, 8);
        for (point, material) in self.points.iter().zip(self.materials.iter_mut()) {
            let volume = point.area * material.thickness();
            integrate_point(
                &point.gradients,
                &u,
                material.as_mut(),
                volume,
                &mut force,
                &mut stiffness,
            )?;
        }
        self.core.store(nodes, force, stiffness)
    }

    fn value_names(&self) -> &'static [&'static str] {
        &["sxx", "syy", "sxy", "von_mises", "exx", "eyy", "gxy"]
    }

    fn value(&self, name: &str) -> Option<f64> {
        let s = self.stress();
        let e = self.strain();
        match name {
            "sxx" => Some(s[0]),
            "syy" => Some(s[1]),
            "sxy" => Some(s[2]),
            "von_mises" => {
                let sum: f64 = self
                    .materials
                    .iter()
                    .map(|m| von_mises(&m.stress(), m.out_of_plane_stress()))
                    .sum();
                Some(sum / self.materials.len() as f64)
            }
            "exx" => Some(e[0]),
            "eyy" => Some(e[1]),
            "gxy" => Some(e[2]),
            _ => None,
        }
    }

    fn commit(&mut self) {
        for material in &mut self.materials {
            material.commit();
        }
    }

    fn revert(&mut self) {
        for material in &mut self.materials {
            material.revert();
        }
        self.core.invalidate();
    }

    fn reset_state(&mut self) {
        for material in &mut self.materials {
            material.reset();
        }
        self.core.invalidate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::testing::{attach, check_tangent, set_element_disp};
    use crate::materials::{PlaneStrain, PlaneStress, VonMises};
    use approx::assert_relative_eq;

    /// Distorted quad so the Jacobian varies over the element
    fn quad(material: Box<dyn PlaneMaterial>) -> (Quad, Vec<Node>) {
        let ids = [NodeId::new(0), NodeId::new(1), NodeId::new(2), NodeId::new(3)];
        let mut q = Quad::new(ids, material);
        let nodes = attach(
            &mut q,
            vec![
                Node::new(0.0, 0.0),
                Node::new(2.0, 0.2),
                Node::new(2.3, 1.6),
                Node::new(-0.2, 1.2),
            ],
        );
        (q, nodes)
    }

    #[test]
    fn test_reference_area() {
        let material = PlaneStress::elastic(1000.0, 0.3, 0.1).unwrap();
        let (q, _) = quad(Box::new(material));
        // shoelace formula
        let x = [(0.0, 0.0), (2.0, 0.2), (2.3, 1.6), (-0.2, 1.2)];
        let twice: f64 = (0..4)
            .map(|a| {
                let b = (a + 1) % 4;
                x[a].0 * x[b].1 - x[b].0 * x[a].1
            })
            .sum();
        assert_relative_eq!(q.area(), twice / 2.0, epsilon = 1e-12);
        assert_eq!(q.materials().count(), 4);
    }

    #[test]
    fn test_patch_uniform_stretch() {
        let (e, nu) = (1000.0, 0.25);
        let material = PlaneStress::elastic(e, nu, 0.1).unwrap();
        let (mut q, mut nodes) = quad(Box::new(material));
        // linear field u = 0.01 x, v = -0.002 y
        let u: Vec<f64> = nodes
            .iter()
            .flat_map(|n| [0.01 * n.pos()[0], -0.002 * n.pos()[1]])
            .collect();
        set_element_disp(&mut nodes, 2, &u);
        q.update_state(&nodes).unwrap();

        let exx = 0.01 + 0.5 * 0.01 * 0.01;
        let eyy = -0.002 + 0.5 * 0.002 * 0.002;
        let f = e / (1.0 - nu * nu);
        // every integration point sees the same state
        for m in q.materials() {
            assert_relative_eq!(m.strain()[0], exx, epsilon = 1e-14);
            assert_relative_eq!(m.strain()[1], eyy, epsilon = 1e-14);
            assert_relative_eq!(m.strain()[2], 0.0, epsilon = 1e-14);
            assert_relative_eq!(m.stress()[0], f * (exx + nu * eyy), epsilon = 1e-9);
        }
        assert_relative_eq!(q.value("syy").unwrap(), f * (eyy + nu * exx), epsilon = 1e-9);

        // internal forces are self-equilibrated
        let force = q.force(&nodes).unwrap();
        let fx: f64 = (0..4).map(|a| force[2 * a]).sum();
        let fy: f64 = (0..4).map(|a| force[2 * a + 1]).sum();
        assert_relative_eq!(fx, 0.0, epsilon = 1e-12);
        assert_relative_eq!(fy, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_rigid_rotation_is_strain_free() {
        let material = PlaneStrain::elastic(1000.0, 0.3, 1.0).unwrap();
        let (mut q, mut nodes) = quad(Box::new(material));
        let (s, c) = 1.1_f64.sin_cos();
        let u: Vec<f64> = nodes
            .iter()
            .flat_map(|n| {
                let (x, y) = (n.pos()[0], n.pos()[1]);
                [c * x - s * y - x, s * x + c * y - y]
            })
            .collect();
        set_element_disp(&mut nodes, 2, &u);
        q.update_state(&nodes).unwrap();
        assert!(q.strain().amax() < 1e-14);
        assert!(q.force(&nodes).unwrap().amax() < 1e-10);
    }

    #[test]
    fn test_consistent_tangent_elastic() {
        let material = PlaneStress::elastic(1000.0, 0.3, 0.1).unwrap();
        let (mut q, mut nodes) = quad(Box::new(material));
        set_element_disp(&mut nodes, 2, &[0.0, 0.01, 0.3, -0.1, 0.1, 0.2, -0.2, 0.25]);
        check_tangent(&mut q, &mut nodes, 1e-7, 1e-6);
    }

    #[test]
    fn test_consistent_tangent_plastic() {
        let vm = VonMises::new(200.0, 0.3, 1.0).unwrap().with_hardening(20.0, 10.0).unwrap();
        let material = PlaneStrain::new(vm, 0.1).unwrap();
        let (mut q, mut nodes) = quad(Box::new(material));
        set_element_disp(&mut nodes, 2, &[0.0, 0.0, 0.03, 0.01, 0.02, 0.03, -0.01, 0.02]);
        check_tangent(&mut q, &mut nodes, 1e-8, 1e-5);
    }

    #[test]
    fn test_clockwise_quad_rejected() {
        let ids = [NodeId::new(0), NodeId::new(1), NodeId::new(2), NodeId::new(3)];
        let material = PlaneStress::elastic(1.0, 0.0, 1.0).unwrap();
        let mut q = Quad::new(ids, Box::new(material));
        let nodes = vec![
            Node::new(0.0, 0.0),
            Node::new(0.0, 1.0),
            Node::new(1.0, 1.0),
            Node::new(1.0, 0.0),
        ];
        assert!(matches!(q.attach(&nodes), Err(FemError::InvalidGeometry(_))));
    }
}
