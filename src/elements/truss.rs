//! Truss (axial bar) element with large displacements

use super::{gather_disp, DofCode, Element, ElementCore, ElementKind, Node};
use crate::error::{FemError, FemResult};
use crate::materials::UniaxialMaterial;
use crate::math::{Mat, Vector};
use crate::system::NodeId;

const CODES_2D: &[DofCode] = &[DofCode::Ux, DofCode::Uy];
const CODES_3D: &[DofCode] = &[DofCode::Ux, DofCode::Uy, DofCode::Uz];

/// Two-node bar carrying axial force only, in 2D or 3D
///
/// Strain is the engineering strain `(l - L) / L` of the current chord, so
/// the element captures large rotations exactly.
#[derive(Debug, Clone)]
pub struct Truss {
    core: ElementCore,
    area: f64,
    material: Box<dyn UniaxialMaterial>,
    dim: usize,
    reference: [f64; 3],
    length: f64,
    axial: f64,
}

impl Truss {
    pub fn new(i: NodeId, j: NodeId, area: f64, material: Box<dyn UniaxialMaterial>) -> Self {
        Self {
            core: ElementCore::new(vec![i, j]),
            area,
            material,
            dim: 2,
            reference: [0.0; 3],
            length: 0.0,
            axial: 0.0,
        }
    }

    /// Undeformed length
    pub fn length(&self) -> f64 {
        self.length
    }

    /// Axial force from the last update (tension positive)
    pub fn axial_force(&self) -> f64 {
        self.axial
    }

    pub fn material(&self) -> &dyn UniaxialMaterial {
        self.material.as_ref()
    }
}

impl Element for Truss {
    fn kind(&self) -> ElementKind {
        ElementKind::Truss
    }

    fn core(&self) -> &ElementCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ElementCore {
        &mut self.core
    }

    fn dof_codes(&self) -> &'static [DofCode] {
        if self.dim == 3 {
            CODES_3D
        } else {
            CODES_2D
        }
    }

    fn attach(&mut self, nodes: &[Node]) -> FemResult<()> {
        self.core.check_node_count(2)?;
        if self.area <= 0.0 {
            return Err(FemError::InvalidInput(format!(
                "truss area must be positive, got {}",
                self.area
            )));
        }
        let ni = self.core.node(nodes, 0)?;
        let nj = self.core.node(nodes, 1)?;
        if ni.dim() != nj.dim() {
            return Err(FemError::InvalidGeometry(
                "truss connects nodes of different dimension".to_string(),
            ));
        }
        self.dim = ni.dim();

        let (xi, xj) = (ni.coords(), nj.coords());
        let mut length2 = 0.0;
        for k in 0..3 {
            self.reference[k] = xj[k] - xi[k];
            length2 += self.reference[k] * self.reference[k];
        }
        self.length = length2.sqrt();
        if self.length < 1e-12 {
            return Err(FemError::InvalidGeometry("truss has zero length".to_string()));
        }
        Ok(())
    }

    fn update_state(&mut self, nodes: &[Node]) -> FemResult<()> {
        let d = self.dim;
        let u = gather_disp(&self.core, nodes, self.dof_codes())?;

        let chord = Vector::from_fn(d, |k, _| self.reference[k] + u[d + k] - u[k]);
        let l = chord.norm();
        if l < 1e-12 * self.length {
            return Err(FemError::InvalidGeometry("truss collapsed to zero length".to_string()));
        }
        let n = chord / l;

        let strain = (l - self.length) / self.length;
        self.material.set_strain(strain);
        let axial = self.material.stress() * self.area;
        let ea = self.material.stiffness() * self.area;
        self.axial = axial;

        let mut force = Vector::zeros(2 * d);
        force.rows_mut(0, d).copy_from(&(-&n * axial));
        force.rows_mut(d, d).copy_from(&(&n * axial));

        let nn = &n * n.transpose();
        let kjj = &nn * (ea / self.length) + (Mat::identity(d, d) - &nn) * (axial / l);
        let mut stiffness = Mat::zeros(2 * d, 2 * d);
        stiffness.view_mut((0, 0), (d, d)).copy_from(&kjj);
        stiffness.view_mut((d, d), (d, d)).copy_from(&kjj);
        stiffness.view_mut((0, d), (d, d)).copy_from(&(-&kjj));
        stiffness.view_mut((d, 0), (d, d)).copy_from(&(-&kjj));

        self.core.store(nodes, force, stiffness)
    }

    fn value_names(&self) -> &'static [&'static str] {
        &["axial", "stress", "strain"]
    }

    fn value(&self, name: &str) -> Option<f64> {
        match name {
            "axial" => Some(self.axial),
            "stress" => Some(self.material.stress()),
            "strain" => Some(self.material.strain()),
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
    use crate::materials::{ElasticMaterial, FiberMaterial};
    use approx::assert_relative_eq;

    fn truss_2d(material: Box<dyn UniaxialMaterial>) -> (Truss, Vec<Node>) {
        let mut truss = Truss::new(NodeId::new(0), NodeId::new(1), 0.5, material);
        let nodes = attach(&mut truss, vec![Node::new(0.0, 0.0), Node::new(3.0, 4.0)]);
        (truss, nodes)
    }

    #[test]
    fn test_axial_force_under_stretch() {
        let (mut truss, mut nodes) = truss_2d(Box::new(ElasticMaterial::new(100.0)));
        assert_relative_eq!(truss.length(), 5.0);

        // stretch along the bar axis by 0.05 (1%)
        set_element_disp(&mut nodes, 2, &[0.0, 0.0, 0.03, 0.04]);
        truss.update_state(&nodes).unwrap();
        assert_relative_eq!(truss.axial_force(), 100.0 * 0.01 * 0.5, epsilon = 1e-12);

        let f = truss.force(&nodes).unwrap();
        assert_relative_eq!(f[2], 0.5 * 0.6, epsilon = 1e-12);
        assert_relative_eq!(f[0] + f[2], 0.0, epsilon = 1e-14);
    }

    #[test]
    fn test_rigid_rotation_is_stress_free() {
        let (mut truss, mut nodes) = truss_2d(Box::new(ElasticMaterial::new(100.0)));
        let angle: f64 = 0.7;
        let (s, c) = angle.sin_cos();
        let (x, y) = (3.0 * c - 4.0 * s, 3.0 * s + 4.0 * c);
        set_element_disp(&mut nodes, 2, &[0.0, 0.0, x - 3.0, y - 4.0]);
        truss.update_state(&nodes).unwrap();
        assert_relative_eq!(truss.axial_force(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_consistent_tangent_2d() {
        let (mut truss, mut nodes) = truss_2d(Box::new(ElasticMaterial::new(100.0)));
        set_element_disp(&mut nodes, 2, &[0.1, -0.2, 0.3, 0.15]);
        check_tangent(&mut truss, &mut nodes, 1e-6, 1e-6);
    }

    #[test]
    fn test_consistent_tangent_3d_plastic() {
        let material = FiberMaterial::new(100.0, 0.5, 10.0).unwrap();
        let mut truss = Truss::new(NodeId::new(0), NodeId::new(1), 0.5, Box::new(material));
        let mut nodes = attach(
            &mut truss,
            vec![Node::new_3d(0.0, 0.0, 0.0), Node::new_3d(1.0, 2.0, 2.0)],
        );
        set_element_disp(&mut nodes, 3, &[0.0, 0.0, 0.0, 0.1, 0.2, 0.25]);
        check_tangent(&mut truss, &mut nodes, 1e-7, 1e-6);
    }

    #[test]
    fn test_stale_state_detected() {
        let (mut truss, mut nodes) = truss_2d(Box::new(ElasticMaterial::new(100.0)));
        assert_eq!(truss.force(&nodes).unwrap_err(), FemError::NotUpdated);

        truss.update_state(&nodes).unwrap();
        assert!(truss.force(&nodes).is_ok());

        nodes[1].set_disp(&[0.01, 0.0]).unwrap();
        assert_eq!(truss.stiffness(&nodes).unwrap_err(), FemError::StaleState);
    }

    #[test]
    fn test_zero_length_rejected() {
        let mut truss = Truss::new(
            NodeId::new(0),
            NodeId::new(1),
            1.0,
            Box::new(ElasticMaterial::new(1.0)),
        );
        let nodes = vec![Node::new(1.0, 1.0), Node::new(1.0, 1.0)];
        assert!(matches!(truss.attach(&nodes), Err(FemError::InvalidGeometry(_))));
    }
}
