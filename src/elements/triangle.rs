//! Constant-strain triangle with finite deformation

use nalgebra::Vector2;

use super::membrane::{integrate_point, von_mises};
use super::{gather_disp, DofCode, Element, ElementCore, ElementKind, Node};
use crate::error::{FemError, FemResult};
use crate::materials::PlaneMaterial;
use crate::math::{Mat, Vec3, Vector};
use crate::system::NodeId;

const CODES: &[DofCode] = &[DofCode::Ux, DofCode::Uy];

/// Three-node membrane element in total Lagrangian form
///
/// Green-Lagrange strain `E = (FᵀF - I) / 2` is constant over the element
/// and drives a plane material returning second Piola-Kirchhoff stress.
/// The tangent includes the initial-stress term. `"von_mises"` includes the
/// through-thickness stress of plane strain materials.
#[derive(Debug, Clone)]
pub struct LinearTriangle {
    core: ElementCore,
    material: Box<dyn PlaneMaterial>,
    gradients: [Vector2<f64>; 3],
    area: f64,
}

impl LinearTriangle {
    pub fn new(nodes: [NodeId; 3], material: Box<dyn PlaneMaterial>) -> Self {
        Self {
            core: ElementCore::new(nodes.to_vec()),
            material,
            gradients: [Vector2::zeros(); 3],
            area: 0.0,
        }
    }

    /// Reference area
    pub fn area(&self) -> f64 {
        self.area
    }

    /// Green-Lagrange strain `[E11, E22, 2 E12]` from the last update
    pub fn strain(&self) -> Vec3 {
        self.material.strain()
    }

    /// Second Piola-Kirchhoff stress `[S11, S22, S12]` from the last update
    pub fn stress(&self) -> Vec3 {
        self.material.stress()
    }

    pub fn material(&self) -> &dyn PlaneMaterial {
        self.material.as_ref()
    }
}

impl Element for LinearTriangle {
    fn kind(&self) -> ElementKind {
        ElementKind::LinearTriangle
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
        self.core.check_node_count(3)?;
        let mut x = [[0.0; 2]; 3];
        for (a, xa) in x.iter_mut().enumerate() {
            let node = self.core.node(nodes, a)?;
            if node.dim() != 2 {
                return Err(FemError::InvalidGeometry(
                    "LinearTriangle requires nodes in the plane".to_string(),
                ));
            }
            xa.copy_from_slice(node.pos());
        }

        let two_a = (x[1][0] - x[0][0]) * (x[2][1] - x[0][1]) - (x[2][0] - x[0][0]) * (x[1][1] - x[0][1]);
        let scale = (0..3)
            .map(|a| {
                let b = (a + 1) % 3;
                (x[b][0] - x[a][0]).hypot(x[b][1] - x[a][1])
            })
            .fold(0.0, f64::max);
        if two_a.abs() <= 1e-12 * scale * scale {
            return Err(FemError::InvalidGeometry("triangle is degenerate".to_string()));
        }

        for a in 0..3 {
            let (b, c) = ((a + 1) % 3, (a + 2) % 3);
            self.gradients[a] = Vector2::new(x[b][1] - x[c][1], x[c][0] - x[b][0]) / two_a;
        }
        self.area = two_a.abs() / 2.0;
        Ok(())
    }

    fn update_state(&mut self, nodes: &[Node]) -> FemResult<()> {
        let u = gather_disp(&self.core, nodes, CODES)?;
        let volume = self.area * self.material.thickness();
        let mut force = Vector::zeros(6);
        let mut stiffness = Mat::zeros(6, 6);
        integrate_point(
            &self.gradients,
            &u,
            self.material.as_mut(),
            volume,
            &mut force,
            &mut stiffness,
        )?;
        self.core.store(nodes, force, stiffness)
    }

    fn value_names(&self) -> &'static [&'static str] {
        &["sxx", "syy", "sxy", "von_mises", "exx", "eyy", "gxy"]
    }

    fn value(&self, name: &str) -> Option<f64> {
        let s = self.material.stress();
        let e = self.material.strain();
        match name {
            "sxx" => Some(s[0]),
            "syy" => Some(s[1]),
            "sxy" => Some(s[2]),
            "von_mises" => Some(von_mises(&s, self.material.out_of_plane_stress())),
            "exx" => Some(e[0]),
            "eyy" => Some(e[1]),
            "gxy" => Some(e[2]),
            _ => None,
        }
    }

    fn commit(&mut self) {
        self.material.commit();
    }

    fn revert(&mut self) {
        self.material.revert();
        self.core.invalidate();
    }

    fn reset_state(&mut self) {
        self.material.reset();
        self.core.invalidate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::testing::{attach, check_tangent, set_element_disp};
    use crate::materials::{PlaneStrain, PlaneStress, PlateSection, VonMises};
    use approx::assert_relative_eq;

    fn triangle(material: Box<dyn PlaneMaterial>) -> (LinearTriangle, Vec<Node>) {
        let ids = [NodeId::new(0), NodeId::new(1), NodeId::new(2)];
        let mut tri = LinearTriangle::new(ids, material);
        let nodes = attach(
            &mut tri,
            vec![Node::new(0.0, 0.0), Node::new(2.0, 0.2), Node::new(0.5, 1.5)],
        );
        (tri, nodes)
    }

    #[test]
    fn test_uniform_stretch() {
        let material = PlaneStress::elastic(1000.0, 0.0, 0.1).unwrap();
        let (mut tri, mut nodes) = triangle(Box::new(material));
        // u = 0.01 x
        set_element_disp(&mut nodes, 2, &[0.0, 0.0, 0.02, 0.0, 0.005, 0.0]);
        tri.update_state(&nodes).unwrap();

        let exx = 0.01 + 0.5 * 0.01 * 0.01;
        assert_relative_eq!(tri.value("exx").unwrap(), exx, epsilon = 1e-14);
        assert_relative_eq!(tri.value("sxx").unwrap(), 1000.0 * exx, epsilon = 1e-10);
        assert_relative_eq!(tri.value("eyy").unwrap(), 0.0, epsilon = 1e-14);

        // internal forces are self-equilibrated
        let f = tri.force(&nodes).unwrap();
        assert_relative_eq!(f[0] + f[2] + f[4], 0.0, epsilon = 1e-12);
        assert_relative_eq!(f[1] + f[3] + f[5], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_rigid_rotation_is_strain_free() {
        let material = PlaneStrain::elastic(1000.0, 0.3, 1.0).unwrap();
        let (mut tri, mut nodes) = triangle(Box::new(material));
        let (s, c) = 0.8_f64.sin_cos();
        let u: Vec<f64> = [[0.0, 0.0], [2.0, 0.2], [0.5, 1.5]]
            .iter()
            .flat_map(|x| [c * x[0] - s * x[1] - x[0], s * x[0] + c * x[1] - x[1]])
            .collect();
        set_element_disp(&mut nodes, 2, &u);
        tri.update_state(&nodes).unwrap();
        assert!(tri.strain().amax() < 1e-14);
        assert!(tri.force(&nodes).unwrap().amax() < 1e-10);
    }

    #[test]
    fn test_consistent_tangent_elastic() {
        let material = PlaneStress::elastic(1000.0, 0.3, 0.1).unwrap();
        let (mut tri, mut nodes) = triangle(Box::new(material));
        set_element_disp(&mut nodes, 2, &[0.0, 0.01, 0.3, -0.1, -0.2, 0.25]);
        check_tangent(&mut tri, &mut nodes, 1e-7, 1e-6);
    }

    #[test]
    fn test_consistent_tangent_plastic() {
        let vm = VonMises::new(200.0, 0.3, 1.0).unwrap().with_hardening(20.0, 10.0).unwrap();
        let material = PlaneStress::new(vm, 0.1).unwrap();
        let (mut tri, mut nodes) = triangle(Box::new(material));
        set_element_disp(&mut nodes, 2, &[0.0, 0.0, 0.03, 0.01, -0.01, 0.02]);
        check_tangent(&mut tri, &mut nodes, 1e-8, 1e-5);
    }

    #[test]
    fn test_layered_membrane() {
        let ply = PlaneStress::elastic(1000.0, 0.25, 1.0).unwrap();
        let plate = PlateSection::layered(&ply, 0.2, 2).unwrap();
        let (mut tri, mut nodes) = triangle(Box::new(plate));
        set_element_disp(&mut nodes, 2, &[0.0, 0.0, 0.01, 0.0, 0.0, 0.02]);
        check_tangent(&mut tri, &mut nodes, 1e-7, 1e-6);
    }

    #[test]
    fn test_plane_strain_von_mises() {
        let (e, nu) = (1000.0, 0.3);
        let material = PlaneStrain::elastic(e, nu, 1.0).unwrap();
        let (mut tri, mut nodes) = triangle(Box::new(material));
        // uniaxial strain, u = 0.001 x
        set_element_disp(&mut nodes, 2, &[0.0, 0.0, 0.002, 0.0, 0.0005, 0.0]);
        tri.update_state(&nodes).unwrap();

        let (sxx, syy) = (tri.value("sxx").unwrap(), tri.value("syy").unwrap());
        let szz = nu * (sxx + syy);
        let expected = (0.5 * ((sxx - syy).powi(2) + (syy - szz).powi(2) + (szz - sxx).powi(2))).sqrt();
        assert_relative_eq!(tri.value("von_mises").unwrap(), expected, max_relative = 1e-10);
        // the plane stress formula would overestimate it
        let plane = (sxx * sxx - sxx * syy + syy * syy).sqrt();
        assert!(expected < 0.9 * plane);
    }

    #[test]
    fn test_degenerate_triangle_rejected() {
        let ids = [NodeId::new(0), NodeId::new(1), NodeId::new(2)];
        let material = PlaneStress::elastic(1.0, 0.0, 1.0).unwrap();
        let mut tri = LinearTriangle::new(ids, Box::new(material));
        let nodes = vec![Node::new(0.0, 0.0), Node::new(1.0, 1.0), Node::new(2.0, 2.0)];
        assert!(tri.attach(&nodes).is_err());
    }
}
